// src/registry/pool.rs
//! One pool's sub-ledger: user stakes, the reward-token set and the
//! per-token reward accumulators.

use ethers::abi::{Token, encode};
use ethers::types::{Address, U256};
use ethers::utils::get_create2_address;
use std::collections::HashMap;

use crate::error::{ProtocolError, Result};
use crate::types::{PoolId, PoolInfo, PoolStatus, Timestamp, UserStakingInfo};

/// Reward accumulators are scaled by 1e18.
const PRECISION: u64 = 1_000_000_000_000_000_000;

const CLONE_PREFIX: [u8; 20] = [
    0x3d, 0x60, 0x2d, 0x80, 0x60, 0x0a, 0x3d, 0x39, 0x81, 0xf3, 0x36, 0x3d, 0x3d, 0x37, 0x3d, 0x3d,
    0x3d, 0x36, 0x3d, 0x73,
];
const CLONE_SUFFIX: [u8; 15] = [
    0x5a, 0xf4, 0x3d, 0x82, 0x80, 0x3e, 0x90, 0x3d, 0x91, 0x60, 0x2b, 0x57, 0xfd, 0x5b, 0xf3,
];

/// CREATE2 address of the EIP-1167 minimal proxy the registry deploys for
/// `pool_id` in front of `implementation`.
pub fn clone_address(deployer: Address, pool_id: PoolId, implementation: Address) -> Address {
    let mut init_code = Vec::with_capacity(55);
    init_code.extend_from_slice(&CLONE_PREFIX);
    init_code.extend_from_slice(implementation.as_bytes());
    init_code.extend_from_slice(&CLONE_SUFFIX);
    let salt = encode(&[Token::Uint(pool_id)]);
    get_create2_address(deployer, salt, init_code)
}

#[derive(Debug, Clone)]
struct RewardTrack {
    token: Address,
    reward_per_token_stored: U256,
    /// Funded and not yet claimed.
    outstanding: U256,
}

#[derive(Debug, Clone, Copy, Default)]
struct UserReward {
    reward_per_token_paid: U256,
    accrued: U256,
}

#[derive(Debug, Clone)]
pub struct PoolLedger {
    id: PoolId,
    address: Address,
    staking_token: Address,
    implementation: Address,
    created_at: Timestamp,
    status: PoolStatus,
    min_stake_amount: U256,
    total_staked: U256,
    stakes: HashMap<Address, U256>,
    rewards: Vec<RewardTrack>,
    user_rewards: HashMap<(Address, Address), UserReward>,
    /// Taken off the ledger but not yet paid out, per token.
    in_flight: HashMap<Address, U256>,
}

impl PoolLedger {
    pub fn new(
        id: PoolId,
        address: Address,
        staking_token: Address,
        implementation: Address,
        min_stake_amount: U256,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            address,
            staking_token,
            implementation,
            created_at,
            status: PoolStatus::Active,
            min_stake_amount,
            total_staked: U256::zero(),
            stakes: HashMap::new(),
            rewards: Vec::new(),
            user_rewards: HashMap::new(),
            in_flight: HashMap::new(),
        }
    }

    pub fn id(&self) -> PoolId {
        self.id
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn staking_token(&self) -> Address {
        self.staking_token
    }

    pub fn status(&self) -> PoolStatus {
        self.status
    }

    pub fn set_status(&mut self, status: PoolStatus) {
        self.status = status;
    }

    pub fn min_stake_amount(&self) -> U256 {
        self.min_stake_amount
    }

    /// Returns the previous minimum.
    pub fn set_min_stake_amount(&mut self, amount: U256) -> U256 {
        std::mem::replace(&mut self.min_stake_amount, amount)
    }

    pub fn total_staked(&self) -> U256 {
        self.total_staked
    }

    pub fn staked(&self, user: Address) -> U256 {
        self.stakes.get(&user).copied().unwrap_or_default()
    }

    pub fn reward_tokens(&self) -> Vec<Address> {
        self.rewards.iter().map(|r| r.token).collect()
    }

    pub fn has_reward_token(&self, token: Address) -> bool {
        self.rewards.iter().any(|r| r.token == token)
    }

    pub fn info(&self) -> PoolInfo {
        PoolInfo {
            pool_id: self.id,
            pool_address: self.address,
            staking_token: self.staking_token,
            implementation: self.implementation,
            created_at: self.created_at,
            status: self.status,
            min_stake_amount: self.min_stake_amount,
            total_staked: self.total_staked,
            reward_tokens: self.reward_tokens(),
        }
    }

    /// Rejects a deposit the pool would not accept, without touching state.
    pub fn check_deposit(&self, amount: U256) -> Result<()> {
        if amount.is_zero() {
            return Err(ProtocolError::InvalidAmount);
        }
        if !self.status.accepts_deposits() {
            return Err(ProtocolError::PoolNotActive(self.id));
        }
        if amount < self.min_stake_amount {
            return Err(ProtocolError::BelowMinStakeAmount {
                amount,
                minimum: self.min_stake_amount,
            });
        }
        Ok(())
    }

    /// Credits `amount` to `user`; returns the new stake.
    pub fn deposit(&mut self, user: Address, amount: U256) -> Result<U256> {
        self.check_deposit(amount)?;
        self.credit(user, amount)
    }

    fn credit(&mut self, user: Address, amount: U256) -> Result<U256> {
        let staked = self.staked(user);
        let next = staked
            .checked_add(amount)
            .ok_or(ProtocolError::ArithmeticOverflow)?;
        let total = self
            .total_staked
            .checked_add(amount)
            .ok_or(ProtocolError::ArithmeticOverflow)?;
        self.settle(user);
        self.stakes.insert(user, next);
        self.total_staked = total;
        Ok(next)
    }

    /// Zeroes the user's stake and returns what it was.
    pub fn withdraw_all(&mut self, user: Address) -> Result<U256> {
        let staked = self.staked(user);
        if staked.is_zero() {
            return Err(ProtocolError::NoDepositFound {
                pool_id: self.id,
                account: user,
            });
        }
        self.settle(user);
        self.stakes.remove(&user);
        self.total_staked -= staked;
        self.hold(self.staking_token, staked);
        Ok(staked)
    }

    /// Puts back a stake taken by `withdraw_all` whose payout failed. Status
    /// and minimum do not apply.
    pub fn restore(&mut self, user: Address, amount: U256) -> Result<U256> {
        let staked = self.credit(user, amount)?;
        self.release(self.staking_token, amount);
        Ok(staked)
    }

    fn hold(&mut self, token: Address, amount: U256) {
        let held = self.in_flight.entry(token).or_default();
        *held = held.saturating_add(amount);
    }

    /// Drops a held payout once it has left the pool or was put back.
    pub fn release(&mut self, token: Address, amount: U256) {
        if let Some(held) = self.in_flight.get_mut(&token) {
            *held = held.saturating_sub(amount);
            if held.is_zero() {
                self.in_flight.remove(&token);
            }
        }
    }

    /// Takes back a credit from `deposit` whose tokens never arrived.
    pub fn revert_deposit(&mut self, user: Address, amount: U256) -> Result<U256> {
        let staked = self.staked(user);
        let next = staked
            .checked_sub(amount)
            .ok_or(ProtocolError::NoDepositFound {
                pool_id: self.id,
                account: user,
            })?;
        self.settle(user);
        if next.is_zero() {
            self.stakes.remove(&user);
        } else {
            self.stakes.insert(user, next);
        }
        self.total_staked -= amount;
        Ok(next)
    }

    /// Adds `token` to the reward set; false if it was already a member.
    pub fn add_reward_token(&mut self, token: Address) -> bool {
        if self.has_reward_token(token) {
            return false;
        }
        self.rewards.push(RewardTrack {
            token,
            reward_per_token_stored: U256::zero(),
            outstanding: U256::zero(),
        });
        true
    }

    /// Removes `token` and its accrued rewards; false if it wasn't a member.
    pub fn remove_reward_token(&mut self, token: Address) -> bool {
        let before = self.rewards.len();
        self.rewards.retain(|r| r.token != token);
        if self.rewards.len() == before {
            return false;
        }
        self.user_rewards.retain(|(_, t), _| *t != token);
        true
    }

    /// Fails unless `amount` of `token` can be distributed to current stakers.
    pub fn check_fund(&self, token: Address, amount: U256) -> Result<()> {
        if amount.is_zero() {
            return Err(ProtocolError::InvalidAmount);
        }
        if !self.has_reward_token(token) {
            return Err(ProtocolError::RewardTokenNotFound {
                pool_id: self.id,
                token,
            });
        }
        if self.total_staked.is_zero() {
            return Err(ProtocolError::NothingStaked(self.id));
        }
        Ok(())
    }

    /// Distributes `amount` of `token` pro rata over the current stakes.
    pub fn fund(&mut self, token: Address, amount: U256) -> Result<()> {
        self.check_fund(token, amount)?;
        let increment = amount
            .checked_mul(U256::from(PRECISION))
            .ok_or(ProtocolError::ArithmeticOverflow)?
            / self.total_staked;
        let track = self
            .rewards
            .iter_mut()
            .find(|r| r.token == token)
            .ok_or(ProtocolError::RewardTokenNotFound {
                pool_id: self.id,
                token,
            })?;
        track.reward_per_token_stored = track
            .reward_per_token_stored
            .checked_add(increment)
            .ok_or(ProtocolError::ArithmeticOverflow)?;
        track.outstanding = track.outstanding.saturating_add(amount);
        Ok(())
    }

    fn earned(&self, user: Address, track: &RewardTrack) -> U256 {
        let paid = self
            .user_rewards
            .get(&(user, track.token))
            .copied()
            .unwrap_or_default();
        let delta = track
            .reward_per_token_stored
            .saturating_sub(paid.reward_per_token_paid);
        (self.staked(user).saturating_mul(delta) / U256::from(PRECISION))
            .saturating_add(paid.accrued)
    }

    /// Moves everything earned so far into `accrued` before a stake change.
    fn settle(&mut self, user: Address) {
        let snapshots: Vec<(Address, U256, U256)> = self
            .rewards
            .iter()
            .map(|track| (track.token, track.reward_per_token_stored, self.earned(user, track)))
            .collect();
        for (token, stored, earned) in snapshots {
            self.user_rewards.insert(
                (user, token),
                UserReward {
                    reward_per_token_paid: stored,
                    accrued: earned,
                },
            );
        }
    }

    pub fn pending_reward(&self, user: Address, token: Address) -> U256 {
        self.rewards
            .iter()
            .find(|r| r.token == token)
            .map(|track| self.earned(user, track))
            .unwrap_or_default()
    }

    /// Takes the user's whole pending reward in `token`.
    pub fn take_reward(&mut self, user: Address, token: Address) -> Result<U256> {
        if !self.has_reward_token(token) {
            return Err(ProtocolError::RewardTokenNotFound {
                pool_id: self.id,
                token,
            });
        }
        let amount = self.pending_reward(user, token);
        if amount.is_zero() {
            return Err(ProtocolError::NoRewardFound {
                pool_id: self.id,
                token,
                account: user,
            });
        }
        self.settle(user);
        if let Some(entry) = self.user_rewards.get_mut(&(user, token)) {
            entry.accrued = U256::zero();
        }
        if let Some(track) = self.rewards.iter_mut().find(|r| r.token == token) {
            track.outstanding = track.outstanding.saturating_sub(amount);
        }
        self.hold(token, amount);
        Ok(amount)
    }

    /// Returns a reward taken by `take_reward` whose payout failed.
    pub fn restore_reward(&mut self, user: Address, token: Address, amount: U256) {
        self.release(token, amount);
        if let Some(track) = self.rewards.iter_mut().find(|r| r.token == token) {
            track.outstanding = track.outstanding.saturating_add(amount);
            let entry = self.user_rewards.entry((user, token)).or_default();
            entry.accrued = entry.accrued.saturating_add(amount);
        }
    }

    /// Part of the pool's `token` balance that belongs to stakers, payouts
    /// still in flight included.
    pub fn reserved(&self, token: Address) -> U256 {
        let staked = if token == self.staking_token {
            self.total_staked
        } else {
            U256::zero()
        };
        let rewards = self
            .rewards
            .iter()
            .find(|r| r.token == token)
            .map(|r| r.outstanding)
            .unwrap_or_default();
        let held = self.in_flight.get(&token).copied().unwrap_or_default();
        staked.saturating_add(rewards).saturating_add(held)
    }

    pub fn user_info(&self, user: Address) -> UserStakingInfo {
        UserStakingInfo {
            staked_amount: self.staked(user),
            reward_tokens: self.reward_tokens(),
            pending_rewards: self
                .rewards
                .iter()
                .map(|track| self.earned(user, track))
                .collect(),
        }
    }
}
