// src/types.rs
use ethers::types::{Address, H256, U256};
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};

/// Numeric pool identifier, allocated sequentially by the registry.
pub type PoolId = U256;

/// Seconds since the unix epoch.
pub type Timestamp = u64;

/// `bytes32` role identifier.
pub type Role = H256;

pub const DEFAULT_ADMIN_ROLE: Role = H256([0u8; 32]);

pub fn manager_role() -> Role {
    H256::from(keccak256("MANAGER_ROLE"))
}

/// Per-call execution context: the caller, the native value attached to the
/// call and the time the call executes at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    pub sender: Address,
    pub value: U256,
    pub timestamp: Timestamp,
}

impl CallContext {
    pub fn new(sender: Address, timestamp: Timestamp) -> Self {
        Self {
            sender,
            value: U256::zero(),
            timestamp,
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    /// Context for a call made by a contract on behalf of the current call.
    pub fn forwarded(&self, sender: Address) -> Self {
        Self {
            sender,
            value: U256::zero(),
            timestamp: self.timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PoolStatus {
    Active,
    Paused,
}

impl PoolStatus {
    pub fn accepts_deposits(self) -> bool {
        matches!(self, PoolStatus::Active)
    }
}

/// Which side of the router a stake entered through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssetKind {
    Native,
    Erc20,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolInfo {
    pub pool_id: PoolId,
    pub pool_address: Address,
    pub staking_token: Address,
    pub implementation: Address,
    pub created_at: Timestamp,
    pub status: PoolStatus,
    pub min_stake_amount: U256,
    pub total_staked: U256,
    pub reward_tokens: Vec<Address>,
}

/// Staking position of one user in one pool. `reward_tokens` and
/// `pending_rewards` are index aligned.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStakingInfo {
    pub staked_amount: U256,
    pub reward_tokens: Vec<Address>,
    pub pending_rewards: Vec<U256>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manager_role_is_hash_of_name() {
        assert_eq!(
            format!("{:?}", manager_role()),
            "0x241ecf16d79d0f8dbfb92cbc07fe17840425976cf0667f022fe9877caa831b08"
        );
        assert!(DEFAULT_ADMIN_ROLE.is_zero());
    }

    #[test]
    fn only_active_pools_accept_deposits() {
        assert!(PoolStatus::Active.accepts_deposits());
        assert!(!PoolStatus::Paused.accepts_deposits());
    }
}
