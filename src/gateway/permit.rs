// src/gateway/permit.rs
//! EIP-712 hashing for EIP-2612 permits.

use ethers::abi::{Token, encode};
use ethers::types::{Address, H256, Signature, U256};
use ethers::utils::keccak256;

use crate::error::GatewayError;

const DOMAIN_TYPE: &str =
    "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";
const PERMIT_TYPE: &str =
    "Permit(address owner,address spender,uint256 value,uint256 nonce,uint256 deadline)";

pub fn domain_separator(name: &str, chain_id: u64, verifying_contract: Address) -> H256 {
    H256::from(keccak256(encode(&[
        Token::FixedBytes(keccak256(DOMAIN_TYPE).to_vec()),
        Token::FixedBytes(keccak256(name).to_vec()),
        Token::FixedBytes(keccak256("1").to_vec()),
        Token::Uint(U256::from(chain_id)),
        Token::Address(verifying_contract),
    ])))
}

/// Digest an owner signs to authorize `spender` for `value` until `deadline`.
pub fn permit_digest(
    domain: H256,
    owner: Address,
    spender: Address,
    value: U256,
    nonce: U256,
    deadline: U256,
) -> H256 {
    let struct_hash = keccak256(encode(&[
        Token::FixedBytes(keccak256(PERMIT_TYPE).to_vec()),
        Token::Address(owner),
        Token::Address(spender),
        Token::Uint(value),
        Token::Uint(nonce),
        Token::Uint(deadline),
    ]));

    let mut preimage = Vec::with_capacity(66);
    preimage.extend_from_slice(&[0x19, 0x01]);
    preimage.extend_from_slice(domain.as_bytes());
    preimage.extend_from_slice(&struct_hash);
    H256::from(keccak256(preimage))
}

pub fn recover_signer(digest: H256, v: u8, r: H256, s: H256) -> Result<Address, GatewayError> {
    let signature = Signature {
        r: U256::from_big_endian(r.as_bytes()),
        s: U256::from_big_endian(s.as_bytes()),
        v: u64::from(v),
    };
    signature
        .recover(digest)
        .map_err(|e| GatewayError::InvalidSignature(e.to_string()))
}

/// Splits a signature into the `(v, r, s)` components a permit call takes.
pub fn split_signature(signature: &Signature) -> (u8, H256, H256) {
    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    signature.r.to_big_endian(&mut r);
    signature.s.to_big_endian(&mut s);
    (signature.v as u8, H256::from(r), H256::from(s))
}
