// src/registry/mod.rs
//! Pool registry: creates pools, keeps the id/address/staking-token indexes
//! consistent, and owns every pool's ledger. Ledger writes from users only
//! arrive through the registered router.

pub mod pool;

use ethers::types::{Address, U256};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

use crate::error::{ProtocolError, Result};
use crate::events::{Event, EventLog};
use crate::gateway::{CodeInspector, TokenGateway};
use crate::governance::Governance;
use crate::safe_transfer::{safe_transfer, safe_transfer_from};
use crate::types::{
    AssetKind, CallContext, DEFAULT_ADMIN_ROLE, PoolId, PoolInfo, PoolStatus, UserStakingInfo,
    manager_role,
};
use pool::{PoolLedger, clone_address};

#[derive(Debug, Default)]
struct RegistryState {
    next_pool_id: PoolId,
    pools: BTreeMap<PoolId, PoolLedger>,
    by_address: HashMap<Address, PoolId>,
    by_staking_token: HashMap<Address, Vec<PoolId>>,
    pool_implementation: Address,
    router: Address,
}

impl RegistryState {
    fn pool(&self, pool_id: PoolId) -> Result<&PoolLedger> {
        self.pools
            .get(&pool_id)
            .ok_or(ProtocolError::PoolNotFound(pool_id))
    }

    fn pool_mut(&mut self, pool_id: PoolId) -> Result<&mut PoolLedger> {
        self.pools
            .get_mut(&pool_id)
            .ok_or(ProtocolError::PoolNotFound(pool_id))
    }

    fn check_router(&self, caller: Address) -> Result<()> {
        if self.router.is_zero() || caller != self.router {
            return Err(ProtocolError::OnlyRouter(caller));
        }
        Ok(())
    }
}

pub struct PoolRegistry {
    address: Address,
    governance: Arc<Governance>,
    gateway: Arc<dyn TokenGateway>,
    inspector: Arc<dyn CodeInspector>,
    events: Arc<EventLog>,
    state: RwLock<RegistryState>,
}

impl PoolRegistry {
    pub fn new(
        address: Address,
        pool_implementation: Address,
        governance: Arc<Governance>,
        gateway: Arc<dyn TokenGateway>,
        inspector: Arc<dyn CodeInspector>,
        events: Arc<EventLog>,
    ) -> Result<Self> {
        if !pool_implementation.is_zero() && !inspector.is_contract(pool_implementation) {
            return Err(ProtocolError::ERC1967InvalidImplementation(pool_implementation));
        }
        Ok(Self {
            address,
            governance,
            gateway,
            inspector,
            events,
            state: RwLock::new(RegistryState {
                pool_implementation,
                ..RegistryState::default()
            }),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn governance(&self) -> &Arc<Governance> {
        &self.governance
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: Event) {
        self.events.emit(self.address, event);
    }

    pub fn create_pool(
        &self,
        ctx: &CallContext,
        staking_token: Address,
        min_stake_amount: U256,
    ) -> Result<(PoolId, Address)> {
        self.governance.check_role(manager_role(), ctx.sender)?;
        if staking_token.is_zero() {
            return Err(ProtocolError::CanNotZeroAddress);
        }

        let mut state = self.write();
        if state.pool_implementation.is_zero() {
            return Err(ProtocolError::PoolImplementationNotSet);
        }
        let pool_id = state.next_pool_id;
        let next_pool_id = pool_id
            .checked_add(U256::one())
            .ok_or(ProtocolError::ArithmeticOverflow)?;
        let implementation = state.pool_implementation;
        let pool_address = clone_address(self.address, pool_id, implementation);

        state.next_pool_id = next_pool_id;
        state.pools.insert(
            pool_id,
            PoolLedger::new(
                pool_id,
                pool_address,
                staking_token,
                implementation,
                min_stake_amount,
                ctx.timestamp,
            ),
        );
        state.by_address.insert(pool_address, pool_id);
        state
            .by_staking_token
            .entry(staking_token)
            .or_default()
            .push(pool_id);
        drop(state);

        info!(pool_id = %pool_id, pool = ?pool_address, token = ?staking_token, "pool created");
        self.emit(Event::PoolCreated {
            pool_id,
            pool_address,
            staking_token,
        });
        Ok((pool_id, pool_address))
    }

    pub fn get_pool_info(&self, pool_id: PoolId) -> Result<PoolInfo> {
        let state = self.read();
        let pool = state.pool(pool_id)?;
        if pool.staking_token().is_zero() {
            return Err(ProtocolError::PoolNotFound(pool_id));
        }
        Ok(pool.info())
    }

    pub fn get_pool_address(&self, pool_id: PoolId) -> Result<Address> {
        Ok(self.read().pool(pool_id)?.address())
    }

    pub fn get_pool_id_by_address(&self, pool_address: Address) -> Option<PoolId> {
        self.read().by_address.get(&pool_address).copied()
    }

    pub fn staking_token(&self, pool_id: PoolId) -> Result<Address> {
        Ok(self.read().pool(pool_id)?.staking_token())
    }

    pub fn pool_count(&self) -> U256 {
        self.read().next_pool_id
    }

    pub fn get_all_pool_ids(&self) -> Vec<PoolId> {
        self.read().pools.keys().copied().collect()
    }

    pub fn get_active_pool_ids(&self) -> Vec<PoolId> {
        self.read()
            .pools
            .values()
            .filter(|pool| pool.status() == PoolStatus::Active)
            .map(PoolLedger::id)
            .collect()
    }

    pub fn get_pool_ids_by_staking_token(&self, staking_token: Address) -> Vec<PoolId> {
        self.read()
            .by_staking_token
            .get(&staking_token)
            .cloned()
            .unwrap_or_default()
    }

    /// Address of the `index`-th pool created for `staking_token`.
    pub fn pool_by_staking_token_at(&self, staking_token: Address, index: usize) -> Result<Address> {
        let state = self.read();
        let pool_id = state
            .by_staking_token
            .get(&staking_token)
            .and_then(|ids| ids.get(index))
            .copied()
            .ok_or(ProtocolError::PoolIndexOutOfBounds {
                token: staking_token,
                index,
            })?;
        Ok(state.pool(pool_id)?.address())
    }

    pub fn staked_amount(&self, pool_id: PoolId, user: Address) -> Result<U256> {
        Ok(self.read().pool(pool_id)?.staked(user))
    }

    pub fn get_user_staking_info(&self, pool_id: PoolId, user: Address) -> Result<UserStakingInfo> {
        debug!(pool_id = %pool_id, user = ?user, "user staking info");
        Ok(self.read().pool(pool_id)?.user_info(user))
    }

    pub fn set_pool_status(&self, ctx: &CallContext, pool_id: PoolId, status: PoolStatus) -> Result<()> {
        self.governance.check_role(manager_role(), ctx.sender)?;
        self.write().pool_mut(pool_id)?.set_status(status);
        self.emit(Event::PoolStatusUpdated { pool_id, status });
        Ok(())
    }

    pub fn update_min_stake_amount(&self, ctx: &CallContext, pool_id: PoolId, amount: U256) -> Result<()> {
        self.governance.check_role(manager_role(), ctx.sender)?;
        let previous = self.write().pool_mut(pool_id)?.set_min_stake_amount(amount);
        self.emit(Event::MinStakeAmountUpdated {
            pool_id,
            previous,
            amount,
        });
        Ok(())
    }

    /// Adds `token` to the pool's reward set. Returns false, and emits
    /// nothing, when it is already a member.
    pub fn add_reward_token(&self, ctx: &CallContext, pool_id: PoolId, token: Address) -> Result<bool> {
        self.governance.check_role(manager_role(), ctx.sender)?;
        if token.is_zero() {
            return Err(ProtocolError::CanNotZeroAddress);
        }
        let added = self.write().pool_mut(pool_id)?.add_reward_token(token);
        if added {
            self.emit(Event::RewardTokenAdded { pool_id, token });
        }
        Ok(added)
    }

    /// Removes `token` from the reward set. Returns false when it wasn't a
    /// member.
    pub fn remove_reward_token(&self, ctx: &CallContext, pool_id: PoolId, token: Address) -> Result<bool> {
        self.governance.check_role(manager_role(), ctx.sender)?;
        if token.is_zero() {
            return Err(ProtocolError::CanNotZeroAddress);
        }
        let removed = self.write().pool_mut(pool_id)?.remove_reward_token(token);
        if removed {
            self.emit(Event::RewardTokenRemoved { pool_id, token });
        }
        Ok(removed)
    }

    /// Pulls `amount` of a reward token from the caller into the pool and
    /// distributes it over the current stakes.
    pub fn fund_rewards(&self, ctx: &CallContext, pool_id: PoolId, token: Address, amount: U256) -> Result<()> {
        self.governance.check_role(manager_role(), ctx.sender)?;
        let pool_address = {
            let state = self.read();
            let pool = state.pool(pool_id)?;
            pool.check_fund(token, amount)?;
            pool.address()
        };

        safe_transfer_from(
            self.gateway.as_ref(),
            token,
            self.address,
            ctx.sender,
            pool_address,
            amount,
        )?;
        if let Err(err) = self.write().pool_mut(pool_id)?.fund(token, amount) {
            warn!(pool_id = %pool_id, error = %err, "refunding reward deposit");
            safe_transfer(self.gateway.as_ref(), token, pool_address, ctx.sender, amount)?;
            return Err(err);
        }

        self.emit(Event::RewardsFunded {
            pool_id,
            token,
            funder: ctx.sender,
            amount,
        });
        Ok(())
    }

    /// Sweeps the part of the pool's `token` balance that no staker or
    /// reward claim is owed, and returns the amount sent.
    pub fn withdraw_from_pool(&self, ctx: &CallContext, pool_id: PoolId, token: Address, to: Address) -> Result<U256> {
        self.governance.check_role(manager_role(), ctx.sender)?;
        if token.is_zero() || to.is_zero() {
            return Err(ProtocolError::CanNotZeroAddress);
        }
        let (pool_address, reserved) = {
            let state = self.read();
            let pool = state.pool(pool_id)?;
            (pool.address(), pool.reserved(token))
        };

        let balance = self.gateway.balance_of(token, pool_address);
        let amount = balance.saturating_sub(reserved);
        if amount.is_zero() {
            return Err(ProtocolError::InvalidAmount);
        }
        safe_transfer(self.gateway.as_ref(), token, pool_address, to, amount)?;

        self.emit(Event::WithdrawnFromPool {
            pool_id,
            token,
            to,
            amount,
        });
        Ok(amount)
    }

    pub fn pool_implementation(&self) -> Address {
        self.read().pool_implementation
    }

    /// Points future pools at `implementation`. Existing pools keep theirs.
    pub fn set_pool_implementation(&self, ctx: &CallContext, implementation: Address) -> Result<()> {
        self.governance.check_role(manager_role(), ctx.sender)?;
        if implementation.is_zero() {
            return Err(ProtocolError::CanNotZeroAddress);
        }
        if !self.inspector.is_contract(implementation) {
            return Err(ProtocolError::ERC1967InvalidImplementation(implementation));
        }
        let previous = std::mem::replace(&mut self.write().pool_implementation, implementation);
        self.emit(Event::PoolImplementationSet {
            previous,
            implementation,
        });
        Ok(())
    }

    pub fn router(&self) -> Address {
        self.read().router
    }

    pub fn set_router(&self, ctx: &CallContext, router: Address) -> Result<()> {
        self.governance.check_role(DEFAULT_ADMIN_ROLE, ctx.sender)?;
        if router.is_zero() {
            return Err(ProtocolError::CanNotZeroAddress);
        }
        let previous = std::mem::replace(&mut self.write().router, router);
        self.emit(Event::RouterSet { previous, router });
        Ok(())
    }

    /// Validates a deposit before any tokens move. Returns the pool address
    /// and its staking token.
    pub fn check_deposit(&self, pool_id: PoolId, amount: U256) -> Result<(Address, Address)> {
        let state = self.read();
        let pool = state.pool(pool_id)?;
        pool.check_deposit(amount)?;
        Ok((pool.address(), pool.staking_token()))
    }

    /// Credits a deposit before the router moves any tokens, so the stake is
    /// already reserved while the transfer runs. Returns the pool address and
    /// its staking token. The deposit event follows in `confirm_deposit`.
    pub fn deposit_for(
        &self,
        ctx: &CallContext,
        pool_id: PoolId,
        user: Address,
        amount: U256,
    ) -> Result<(Address, Address)> {
        let mut state = self.write();
        state.check_router(ctx.sender)?;
        let pool = state.pool_mut(pool_id)?;
        pool.deposit(user, amount)?;
        Ok((pool.address(), pool.staking_token()))
    }

    pub fn confirm_deposit(
        &self,
        ctx: &CallContext,
        pool_id: PoolId,
        user: Address,
        amount: U256,
        kind: AssetKind,
    ) -> Result<()> {
        let token = {
            let state = self.read();
            state.check_router(ctx.sender)?;
            state.pool(pool_id)?.staking_token()
        };
        self.emit(match kind {
            AssetKind::Erc20 => Event::DepositedERC20 { user, token, amount },
            AssetKind::Native => Event::DepositedNative { user, amount },
        });
        Ok(())
    }

    /// Reverts a `deposit_for` whose transfer into the pool failed.
    pub fn revert_deposit(&self, ctx: &CallContext, pool_id: PoolId, user: Address, amount: U256) -> Result<()> {
        let mut state = self.write();
        state.check_router(ctx.sender)?;
        state.pool_mut(pool_id)?.revert_deposit(user, amount)?;
        warn!(pool_id = %pool_id, user = ?user, amount = %amount, "deposit reverted after failed transfer");
        Ok(())
    }

    /// Zeroes the user's stake and returns the amount the router must pay
    /// out. The ledger is updated before any tokens leave the pool; the
    /// withdrawal event follows in `confirm_withdrawal` once the payout landed.
    pub fn withdraw_for(&self, ctx: &CallContext, pool_id: PoolId, user: Address) -> Result<U256> {
        let mut state = self.write();
        state.check_router(ctx.sender)?;
        state.pool_mut(pool_id)?.withdraw_all(user)
    }

    pub fn confirm_withdrawal(
        &self,
        ctx: &CallContext,
        pool_id: PoolId,
        user: Address,
        amount: U256,
        kind: AssetKind,
    ) -> Result<()> {
        let token = {
            let mut state = self.write();
            state.check_router(ctx.sender)?;
            let pool = state.pool_mut(pool_id)?;
            let token = pool.staking_token();
            pool.release(token, amount);
            token
        };
        self.emit(match kind {
            AssetKind::Erc20 => Event::WithdrawnERC20 { user, token, amount },
            AssetKind::Native => Event::WithdrawnNative { user, amount },
        });
        Ok(())
    }

    /// Reverts a `withdraw_for` whose payout failed.
    pub fn restore_stake(&self, ctx: &CallContext, pool_id: PoolId, user: Address, amount: U256) -> Result<()> {
        let mut state = self.write();
        state.check_router(ctx.sender)?;
        state.pool_mut(pool_id)?.restore(user, amount)?;
        warn!(pool_id = %pool_id, user = ?user, amount = %amount, "stake restored after failed payout");
        Ok(())
    }

    pub fn take_reward(&self, ctx: &CallContext, pool_id: PoolId, user: Address, token: Address) -> Result<U256> {
        let mut state = self.write();
        state.check_router(ctx.sender)?;
        state.pool_mut(pool_id)?.take_reward(user, token)
    }

    /// Releases a reward payout taken by `take_reward` once it has landed.
    pub fn confirm_reward(&self, ctx: &CallContext, pool_id: PoolId, token: Address, amount: U256) -> Result<()> {
        let mut state = self.write();
        state.check_router(ctx.sender)?;
        state.pool_mut(pool_id)?.release(token, amount);
        Ok(())
    }

    pub fn restore_reward(&self, ctx: &CallContext, pool_id: PoolId, user: Address, token: Address, amount: U256) -> Result<()> {
        let mut state = self.write();
        state.check_router(ctx.sender)?;
        state.pool_mut(pool_id)?.restore_reward(user, token, amount);
        warn!(pool_id = %pool_id, user = ?user, token = ?token, "reward restored after failed payout");
        Ok(())
    }
}
