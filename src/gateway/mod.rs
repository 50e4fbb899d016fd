// src/gateway/mod.rs
//! Boundary to the token contracts the protocol consumes. The protocol never
//! stores balances itself; it moves value through these calls and keeps only
//! its own accounting.

pub mod memory;
pub mod permit;

use ethers::types::{Address, Bytes, H256, U256};

use crate::error::GatewayError;
use crate::types::Timestamp;

/// EIP-2612 permit arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermitRequest {
    pub owner: Address,
    pub spender: Address,
    pub value: U256,
    pub deadline: U256,
    pub v: u8,
    pub r: H256,
    pub s: H256,
}

/// ERC20, wrapped-native and native-currency operations. `caller` is the
/// `msg.sender` of the token call.
///
/// `transfer` and `transfer_from` mirror the ERC20 `bool` return: a token may
/// report `Ok(false)` without reverting.
pub trait TokenGateway: Send + Sync {
    fn balance_of(&self, token: Address, account: Address) -> U256;

    fn transfer(
        &self,
        token: Address,
        caller: Address,
        to: Address,
        amount: U256,
    ) -> Result<bool, GatewayError>;

    fn transfer_from(
        &self,
        token: Address,
        caller: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<bool, GatewayError>;

    fn permit(
        &self,
        token: Address,
        request: &PermitRequest,
        now: Timestamp,
    ) -> Result<(), GatewayError>;

    fn native_balance(&self, account: Address) -> U256;

    /// `deposit()` on the wrapped-native token paid by `payer`, with the
    /// minted balance credited to `to`.
    fn deposit(
        &self,
        wrapped: Address,
        payer: Address,
        to: Address,
        value: U256,
    ) -> Result<(), GatewayError>;

    /// `withdrawTo(to, amount)` on the wrapped-native token called by `holder`.
    fn withdraw_to(
        &self,
        wrapped: Address,
        holder: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), GatewayError>;

    /// `withdraw(amount)`: unwraps back to the holder.
    fn withdraw(&self, wrapped: Address, holder: Address, amount: U256) -> Result<(), GatewayError> {
        self.withdraw_to(wrapped, holder, holder, amount)
    }
}

/// Read access to deployed code, used to validate implementation targets.
pub trait CodeInspector: Send + Sync {
    fn code_size(&self, account: Address) -> usize;

    /// `proxiableUUID()` of a UUPS implementation, `None` if it has none.
    fn proxiable_uuid(&self, implementation: Address) -> Option<H256>;

    /// Delegate-calls `data` into `implementation` as a post-upgrade
    /// initialization.
    fn initialize(&self, implementation: Address, data: &Bytes) -> Result<(), GatewayError>;

    fn is_contract(&self, account: Address) -> bool {
        self.code_size(account) > 0
    }
}
