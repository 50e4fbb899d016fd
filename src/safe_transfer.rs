// src/safe_transfer.rs
//! Checked token movements. Whatever way a token misbehaves (reverting,
//! answering `false`, being unknown) the caller sees one error per asset kind.

use ethers::types::{Address, U256};
use tracing::warn;

use crate::error::{GatewayError, ProtocolError, Result};
use crate::gateway::TokenGateway;

fn checked(token: Address, outcome: std::result::Result<bool, GatewayError>) -> Result<()> {
    match outcome {
        Ok(true) => Ok(()),
        Ok(false) => {
            warn!(token = ?token, "token returned false");
            Err(ProtocolError::SafeERC20FailedOperation(token))
        }
        Err(err) => {
            warn!(token = ?token, error = %err, "token call reverted");
            Err(ProtocolError::SafeERC20FailedOperation(token))
        }
    }
}

pub fn safe_transfer(
    gateway: &dyn TokenGateway,
    token: Address,
    from: Address,
    to: Address,
    amount: U256,
) -> Result<()> {
    checked(token, gateway.transfer(token, from, to, amount))
}

pub fn safe_transfer_from(
    gateway: &dyn TokenGateway,
    token: Address,
    spender: Address,
    from: Address,
    to: Address,
    amount: U256,
) -> Result<()> {
    checked(token, gateway.transfer_from(token, spender, from, to, amount))
}

/// Wraps `value` of the payer's native currency and credits it to `to`.
pub fn wrap_native(
    gateway: &dyn TokenGateway,
    wrapped: Address,
    payer: Address,
    to: Address,
    value: U256,
) -> Result<()> {
    gateway.deposit(wrapped, payer, to, value).map_err(|err| {
        warn!(wrapped = ?wrapped, payer = ?payer, error = %err, "wrap failed");
        ProtocolError::from(err)
    })
}

/// Unwraps `amount` held by `holder` and sends the native currency to `to`.
pub fn unwrap_native_to(
    gateway: &dyn TokenGateway,
    wrapped: Address,
    holder: Address,
    to: Address,
    amount: U256,
) -> Result<()> {
    gateway.withdraw_to(wrapped, holder, to, amount).map_err(|err| {
        warn!(wrapped = ?wrapped, to = ?to, error = %err, "native send failed");
        ProtocolError::TransferFailed
    })
}
