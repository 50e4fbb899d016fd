// src/events.rs
//! Append-only event log. Every state change in the protocol is recorded
//! here with the address of the emitting component, and every event can be
//! rendered as the EVM log the deployed contracts would have produced.

use ethers::abi::{RawLog, Token, encode};
use ethers::types::{Address, H256, U256};
use ethers::utils::keccak256;
use serde::Serialize;
use std::sync::{Mutex, PoisonError};

use crate::types::{PoolId, PoolStatus, Role, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Event {
    PoolCreated {
        pool_id: PoolId,
        pool_address: Address,
        staking_token: Address,
    },
    PoolImplementationSet {
        previous: Address,
        implementation: Address,
    },
    RouterSet {
        previous: Address,
        router: Address,
    },
    PoolStatusUpdated {
        pool_id: PoolId,
        status: PoolStatus,
    },
    MinStakeAmountUpdated {
        pool_id: PoolId,
        previous: U256,
        amount: U256,
    },
    RewardTokenAdded {
        pool_id: PoolId,
        token: Address,
    },
    RewardTokenRemoved {
        pool_id: PoolId,
        token: Address,
    },
    RewardsFunded {
        pool_id: PoolId,
        token: Address,
        funder: Address,
        amount: U256,
    },
    RewardsClaimed {
        pool_id: PoolId,
        user: Address,
        token: Address,
        amount: U256,
    },
    StakedERC20 {
        user: Address,
        pool_id: PoolId,
        token: Address,
        amount: U256,
    },
    StakedNative {
        user: Address,
        pool_id: PoolId,
        amount: U256,
    },
    UnstakedERC20 {
        user: Address,
        pool_id: PoolId,
        token: Address,
        amount: U256,
    },
    UnstakedNative {
        user: Address,
        pool_id: PoolId,
        amount: U256,
    },
    DepositedERC20 {
        user: Address,
        token: Address,
        amount: U256,
    },
    DepositedNative {
        user: Address,
        amount: U256,
    },
    WithdrawnERC20 {
        user: Address,
        token: Address,
        amount: U256,
    },
    WithdrawnNative {
        user: Address,
        amount: U256,
    },
    WithdrawnFromPool {
        pool_id: PoolId,
        token: Address,
        to: Address,
        amount: U256,
    },
    RoleGranted {
        role: Role,
        account: Address,
        sender: Address,
    },
    RoleRevoked {
        role: Role,
        account: Address,
        sender: Address,
    },
    RoleAdminChanged {
        role: Role,
        previous_admin_role: Role,
        new_admin_role: Role,
    },
    DefaultAdminTransferScheduled {
        new_admin: Address,
        accept_schedule: Timestamp,
    },
    DefaultAdminTransferCanceled,
    DefaultAdminDelayChangeScheduled {
        new_delay: u64,
        effect_schedule: Timestamp,
    },
    DefaultAdminDelayChangeCanceled,
    Upgraded {
        implementation: Address,
    },
    Initialized {
        version: u64,
    },
}

impl Event {
    /// Canonical Solidity event signature.
    pub fn signature(&self) -> &'static str {
        match self {
            Event::PoolCreated { .. } => "PoolCreated(uint256,address,address)",
            Event::PoolImplementationSet { .. } => "PoolImplementationSet(address,address)",
            Event::RouterSet { .. } => "RouterSet(address,address)",
            Event::PoolStatusUpdated { .. } => "PoolStatusUpdated(uint256,uint8)",
            Event::MinStakeAmountUpdated { .. } => "MinStakeAmountUpdated(uint256,uint256,uint256)",
            Event::RewardTokenAdded { .. } => "RewardTokenAdded(uint256,address)",
            Event::RewardTokenRemoved { .. } => "RewardTokenRemoved(uint256,address)",
            Event::RewardsFunded { .. } => "RewardsFunded(uint256,address,address,uint256)",
            Event::RewardsClaimed { .. } => "RewardsClaimed(uint256,address,address,uint256)",
            Event::StakedERC20 { .. } => "StakedERC20(address,uint256,address,uint256)",
            Event::StakedNative { .. } => "StakedNative(address,uint256,uint256)",
            Event::UnstakedERC20 { .. } => "UnstakedERC20(address,uint256,address,uint256)",
            Event::UnstakedNative { .. } => "UnstakedNative(address,uint256,uint256)",
            Event::DepositedERC20 { .. } => "DepositedERC20(address,address,uint256)",
            Event::DepositedNative { .. } => "DepositedNative(address,uint256)",
            Event::WithdrawnERC20 { .. } => "WithdrawnERC20(address,address,uint256)",
            Event::WithdrawnNative { .. } => "WithdrawnNative(address,uint256)",
            Event::WithdrawnFromPool { .. } => "WithdrawnFromPool(uint256,address,address,uint256)",
            Event::RoleGranted { .. } => "RoleGranted(bytes32,address,address)",
            Event::RoleRevoked { .. } => "RoleRevoked(bytes32,address,address)",
            Event::RoleAdminChanged { .. } => "RoleAdminChanged(bytes32,bytes32,bytes32)",
            Event::DefaultAdminTransferScheduled { .. } => {
                "DefaultAdminTransferScheduled(address,uint48)"
            }
            Event::DefaultAdminTransferCanceled => "DefaultAdminTransferCanceled()",
            Event::DefaultAdminDelayChangeScheduled { .. } => {
                "DefaultAdminDelayChangeScheduled(uint48,uint48)"
            }
            Event::DefaultAdminDelayChangeCanceled => "DefaultAdminDelayChangeCanceled()",
            Event::Upgraded { .. } => "Upgraded(address)",
            Event::Initialized { .. } => "Initialized(uint64)",
        }
    }

    pub fn topic0(&self) -> H256 {
        H256::from(keccak256(self.signature()))
    }

    /// Splits the event fields into indexed and data tokens.
    fn tokens(&self) -> (Vec<Token>, Vec<Token>) {
        use Token::{Address as A, FixedBytes as B, Uint as N};

        let role = |r: &Role| B(r.as_bytes().to_vec());
        match self {
            Event::PoolCreated {
                pool_id,
                pool_address,
                staking_token,
            } => (vec![N(*pool_id), A(*pool_address), A(*staking_token)], vec![]),
            Event::PoolImplementationSet {
                previous,
                implementation,
            } => (vec![A(*previous), A(*implementation)], vec![]),
            Event::RouterSet { previous, router } => (vec![A(*previous), A(*router)], vec![]),
            Event::PoolStatusUpdated { pool_id, status } => {
                let code = match status {
                    PoolStatus::Active => 0u8,
                    PoolStatus::Paused => 1u8,
                };
                (vec![N(*pool_id)], vec![N(U256::from(code))])
            }
            Event::MinStakeAmountUpdated {
                pool_id,
                previous,
                amount,
            } => (vec![N(*pool_id)], vec![N(*previous), N(*amount)]),
            Event::RewardTokenAdded { pool_id, token }
            | Event::RewardTokenRemoved { pool_id, token } => {
                (vec![N(*pool_id), A(*token)], vec![])
            }
            Event::RewardsFunded {
                pool_id,
                token,
                funder,
                amount,
            } => (vec![N(*pool_id), A(*token), A(*funder)], vec![N(*amount)]),
            Event::RewardsClaimed {
                pool_id,
                user,
                token,
                amount,
            } => (vec![N(*pool_id), A(*user), A(*token)], vec![N(*amount)]),
            Event::StakedERC20 {
                user,
                pool_id,
                token,
                amount,
            }
            | Event::UnstakedERC20 {
                user,
                pool_id,
                token,
                amount,
            } => (vec![A(*user), N(*pool_id), A(*token)], vec![N(*amount)]),
            Event::StakedNative {
                user,
                pool_id,
                amount,
            }
            | Event::UnstakedNative {
                user,
                pool_id,
                amount,
            } => (vec![A(*user), N(*pool_id)], vec![N(*amount)]),
            Event::DepositedERC20 {
                user,
                token,
                amount,
            }
            | Event::WithdrawnERC20 {
                user,
                token,
                amount,
            } => (vec![A(*user), A(*token)], vec![N(*amount)]),
            Event::DepositedNative { user, amount } | Event::WithdrawnNative { user, amount } => {
                (vec![A(*user)], vec![N(*amount)])
            }
            Event::WithdrawnFromPool {
                pool_id,
                token,
                to,
                amount,
            } => (vec![N(*pool_id), A(*token), A(*to)], vec![N(*amount)]),
            Event::RoleGranted {
                role: r,
                account,
                sender,
            }
            | Event::RoleRevoked {
                role: r,
                account,
                sender,
            } => (vec![role(r), A(*account), A(*sender)], vec![]),
            Event::RoleAdminChanged {
                role: r,
                previous_admin_role,
                new_admin_role,
            } => (
                vec![role(r), role(previous_admin_role), role(new_admin_role)],
                vec![],
            ),
            Event::DefaultAdminTransferScheduled {
                new_admin,
                accept_schedule,
            } => (vec![A(*new_admin)], vec![N(U256::from(*accept_schedule))]),
            Event::DefaultAdminDelayChangeScheduled {
                new_delay,
                effect_schedule,
            } => (
                vec![],
                vec![N(U256::from(*new_delay)), N(U256::from(*effect_schedule))],
            ),
            Event::DefaultAdminTransferCanceled | Event::DefaultAdminDelayChangeCanceled => {
                (vec![], vec![])
            }
            Event::Upgraded { implementation } => (vec![A(*implementation)], vec![]),
            Event::Initialized { version } => (vec![], vec![N(U256::from(*version))]),
        }
    }

    /// Encodes the event as an EVM log: topic0 is the signature hash, indexed
    /// fields follow as topics and the remaining fields are ABI encoded.
    pub fn to_raw_log(&self) -> RawLog {
        let (indexed, data) = self.tokens();
        let mut topics = Vec::with_capacity(indexed.len() + 1);
        topics.push(self.topic0());
        topics.extend(indexed.into_iter().map(|t| H256::from_slice(&encode(&[t]))));
        RawLog {
            topics,
            data: encode(&data),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub index: usize,
    pub emitter: Address,
    pub topic0: H256,
    #[serde(flatten)]
    pub event: Event,
}

#[derive(Debug, Default)]
pub struct EventLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&self, emitter: Address, event: Event) {
        tracing::info!(emitter = ?emitter, ?event, "event");
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let index = entries.len();
        entries.push(LogEntry {
            index,
            emitter,
            topic0: event.topic0(),
            event,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.since(0)
    }

    /// Entries appended at or after `index`.
    pub fn since(&self, index: usize) -> Vec<LogEntry> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.iter().skip(index).cloned().collect()
    }

    pub fn events(&self) -> Vec<Event> {
        self.entries().into_iter().map(|e| e.event).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexed_fields_become_topics() {
        let user = Address::repeat_byte(0x11);
        let event = Event::StakedNative {
            user,
            pool_id: U256::from(7),
            amount: U256::from(5_000),
        };
        let log = event.to_raw_log();

        assert_eq!(log.topics.len(), 3);
        assert_eq!(log.topics[0], H256::from(keccak256("StakedNative(address,uint256,uint256)")));
        assert_eq!(log.topics[1], H256::from(user));
        assert_eq!(log.topics[2], H256::from_low_u64_be(7));
        assert_eq!(U256::from_big_endian(&log.data), U256::from(5_000));
    }

    #[test]
    fn log_keeps_insertion_order() {
        let log = EventLog::new();
        let emitter = Address::repeat_byte(1);
        log.emit(emitter, Event::Initialized { version: 1 });
        log.emit(emitter, Event::DefaultAdminTransferCanceled);

        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].index, 1);
        assert_eq!(log.since(1)[0].event, Event::DefaultAdminTransferCanceled);
    }
}
