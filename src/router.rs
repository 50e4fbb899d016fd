// src/router.rs
//! Staking router. Normalizes native-currency and ERC20 staking into ledger
//! calls on the registry and moves the tokens. Holds no state of its own.

use ethers::types::{Address, H256, U256};
use std::sync::Arc;
use tracing::info;

use crate::error::{ProtocolError, Result};
use crate::events::{Event, EventLog};
use crate::gateway::{PermitRequest, TokenGateway};
use crate::registry::PoolRegistry;
use crate::safe_transfer::{safe_transfer, safe_transfer_from, unwrap_native_to, wrap_native};
use crate::types::{AssetKind, CallContext, PoolId, UserStakingInfo};

pub struct Router {
    address: Address,
    wcross: Address,
    registry: Arc<PoolRegistry>,
    gateway: Arc<dyn TokenGateway>,
    events: Arc<EventLog>,
}

impl Router {
    pub fn new(
        address: Address,
        wcross: Address,
        registry: Arc<PoolRegistry>,
        gateway: Arc<dyn TokenGateway>,
        events: Arc<EventLog>,
    ) -> Result<Self> {
        if address.is_zero() || wcross.is_zero() {
            return Err(ProtocolError::CanNotZeroAddress);
        }
        Ok(Self {
            address,
            wcross,
            registry,
            gateway,
            events,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Wrapped-native token address.
    pub fn wcross(&self) -> Address {
        self.wcross
    }

    pub fn registry(&self) -> &Arc<PoolRegistry> {
        &self.registry
    }

    fn emit(&self, event: Event) {
        self.events.emit(self.address, event);
    }

    pub fn is_native_pool(&self, pool_id: PoolId) -> Result<bool> {
        Ok(self.registry.staking_token(pool_id)? == self.wcross)
    }

    fn require_native_pool(&self, pool_id: PoolId) -> Result<()> {
        if self.is_native_pool(pool_id)? {
            Ok(())
        } else {
            Err(ProtocolError::NotWCROSSPool(pool_id))
        }
    }

    /// Wraps the attached native value and stakes it for the caller.
    pub fn stake_native(&self, ctx: &CallContext, pool_id: PoolId) -> Result<U256> {
        self.require_native_pool(pool_id)?;
        let amount = ctx.value;
        if amount.is_zero() {
            return Err(ProtocolError::InvalidAmount);
        }
        let forwarded = ctx.forwarded(self.address);
        let (pool_address, _) = self.registry.deposit_for(&forwarded, pool_id, ctx.sender, amount)?;

        if let Err(err) = wrap_native(self.gateway.as_ref(), self.wcross, ctx.sender, pool_address, amount) {
            self.registry.revert_deposit(&forwarded, pool_id, ctx.sender, amount)?;
            return Err(err);
        }
        self.registry
            .confirm_deposit(&forwarded, pool_id, ctx.sender, amount, AssetKind::Native)?;

        info!(user = ?ctx.sender, pool_id = %pool_id, amount = %amount, "staked native");
        self.emit(Event::StakedNative {
            user: ctx.sender,
            pool_id,
            amount,
        });
        Ok(amount)
    }

    /// Pulls `amount` of the pool's staking token from the caller, who must
    /// have approved the router.
    pub fn stake_erc20(&self, ctx: &CallContext, pool_id: PoolId, amount: U256) -> Result<U256> {
        if amount.is_zero() {
            return Err(ProtocolError::InvalidAmount);
        }
        let forwarded = ctx.forwarded(self.address);
        let (pool_address, token) = self.registry.deposit_for(&forwarded, pool_id, ctx.sender, amount)?;

        let moved = safe_transfer_from(
            self.gateway.as_ref(),
            token,
            self.address,
            ctx.sender,
            pool_address,
            amount,
        );
        if let Err(err) = moved {
            self.registry.revert_deposit(&forwarded, pool_id, ctx.sender, amount)?;
            return Err(err);
        }
        self.registry
            .confirm_deposit(&forwarded, pool_id, ctx.sender, amount, AssetKind::Erc20)?;

        info!(user = ?ctx.sender, pool_id = %pool_id, amount = %amount, "staked erc20");
        self.emit(Event::StakedERC20 {
            user: ctx.sender,
            pool_id,
            token,
            amount,
        });
        Ok(amount)
    }

    /// `stake_erc20` preceded by an EIP-2612 permit granting the router
    /// `amount` on the caller's behalf.
    #[allow(clippy::too_many_arguments)]
    pub fn stake_erc20_with_permit(
        &self,
        ctx: &CallContext,
        pool_id: PoolId,
        amount: U256,
        deadline: U256,
        v: u8,
        r: H256,
        s: H256,
    ) -> Result<U256> {
        if amount.is_zero() {
            return Err(ProtocolError::InvalidAmount);
        }
        if U256::from(ctx.timestamp) > deadline {
            return Err(ProtocolError::ExpiredSignature(deadline));
        }
        let (_, token) = self.registry.check_deposit(pool_id, amount)?;

        let request = PermitRequest {
            owner: ctx.sender,
            spender: self.address,
            value: amount,
            deadline,
            v,
            r,
            s,
        };
        self.gateway.permit(token, &request, ctx.timestamp)?;
        self.stake_erc20(ctx, pool_id, amount)
    }

    /// Returns the caller's whole stake in the pool's staking token.
    pub fn unstake_erc20(&self, ctx: &CallContext, pool_id: PoolId) -> Result<U256> {
        let (amount, token, pool_address) = self.take_stake(ctx, pool_id)?;
        let forwarded = ctx.forwarded(self.address);

        if let Err(err) = safe_transfer(self.gateway.as_ref(), token, pool_address, ctx.sender, amount) {
            self.registry.restore_stake(&forwarded, pool_id, ctx.sender, amount)?;
            return Err(err);
        }
        self.registry
            .confirm_withdrawal(&forwarded, pool_id, ctx.sender, amount, AssetKind::Erc20)?;

        info!(user = ?ctx.sender, pool_id = %pool_id, amount = %amount, "unstaked erc20");
        self.emit(Event::UnstakedERC20 {
            user: ctx.sender,
            pool_id,
            token,
            amount,
        });
        Ok(amount)
    }

    /// Returns the caller's whole stake unwrapped to native currency.
    pub fn unstake_native(&self, ctx: &CallContext, pool_id: PoolId) -> Result<U256> {
        self.require_native_pool(pool_id)?;
        let (amount, _, pool_address) = self.take_stake(ctx, pool_id)?;
        let forwarded = ctx.forwarded(self.address);

        if let Err(err) = unwrap_native_to(self.gateway.as_ref(), self.wcross, pool_address, ctx.sender, amount) {
            self.registry.restore_stake(&forwarded, pool_id, ctx.sender, amount)?;
            return Err(err);
        }
        self.registry
            .confirm_withdrawal(&forwarded, pool_id, ctx.sender, amount, AssetKind::Native)?;

        info!(user = ?ctx.sender, pool_id = %pool_id, amount = %amount, "unstaked native");
        self.emit(Event::UnstakedNative {
            user: ctx.sender,
            pool_id,
            amount,
        });
        Ok(amount)
    }

    /// Zeroes the caller's ledger entry before anything is paid out.
    fn take_stake(&self, ctx: &CallContext, pool_id: PoolId) -> Result<(U256, Address, Address)> {
        let pool_address = self.registry.get_pool_address(pool_id)?;
        let token = self.registry.staking_token(pool_id)?;
        if self.registry.staked_amount(pool_id, ctx.sender)?.is_zero() {
            return Err(ProtocolError::NoStakeFound {
                pool_id,
                account: ctx.sender,
            });
        }
        let amount = self
            .registry
            .withdraw_for(&ctx.forwarded(self.address), pool_id, ctx.sender)
            .map_err(|err| match err {
                ProtocolError::NoDepositFound { pool_id, account } => {
                    ProtocolError::NoStakeFound { pool_id, account }
                }
                other => other,
            })?;
        Ok((amount, token, pool_address))
    }

    /// Pays out the caller's pending reward in `token`.
    pub fn claim_rewards(&self, ctx: &CallContext, pool_id: PoolId, token: Address) -> Result<U256> {
        let pool_address = self.registry.get_pool_address(pool_id)?;
        let forwarded = ctx.forwarded(self.address);
        let amount = self.registry.take_reward(&forwarded, pool_id, ctx.sender, token)?;

        if let Err(err) = safe_transfer(self.gateway.as_ref(), token, pool_address, ctx.sender, amount) {
            self.registry
                .restore_reward(&forwarded, pool_id, ctx.sender, token, amount)?;
            return Err(err);
        }
        self.registry.confirm_reward(&forwarded, pool_id, token, amount)?;

        self.emit(Event::RewardsClaimed {
            pool_id,
            user: ctx.sender,
            token,
            amount,
        });
        Ok(amount)
    }

    pub fn get_user_staking_info(&self, pool_id: PoolId, user: Address) -> Result<UserStakingInfo> {
        self.registry.get_user_staking_info(pool_id, user)
    }
}
