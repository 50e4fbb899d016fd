#![allow(dead_code)]

use cross_staking::gateway::memory::{MemoryChain, TokenBehavior, TokenMetadata};
use cross_staking::governance::ERC1967_IMPLEMENTATION_SLOT;
use cross_staking::types::{CallContext, PoolId, Timestamp};
use cross_staking::{Deployment, StakingProtocol};
use ethers::types::{Address, U256};
use std::sync::Arc;

pub const NOW: Timestamp = 1_700_000_000;
pub const DELAY: u64 = 3 * 24 * 60 * 60;
pub const CHAIN_ID: u64 = 612044;

pub fn admin() -> Address {
    Address::repeat_byte(0xad)
}

pub fn alice() -> Address {
    Address::repeat_byte(0xa1)
}

pub fn bob() -> Address {
    Address::repeat_byte(0xb0)
}

pub struct Fixture {
    pub chain: Arc<MemoryChain>,
    pub protocol: StakingProtocol,
    pub deployment: Deployment,
    /// Plain ERC20 staking token.
    pub token: Address,
    /// ERC20 paid out as rewards.
    pub reward: Address,
}

fn metadata(name: &str, symbol: &str) -> TokenMetadata {
    TokenMetadata {
        name: name.to_string(),
        symbol: symbol.to_string(),
        decimals: 18,
    }
}

pub fn deploy() -> Fixture {
    let deployment = Deployment {
        admin: admin(),
        default_admin_delay: DELAY,
        registry: Address::repeat_byte(0x01),
        router: Address::repeat_byte(0x02),
        registry_implementation: Address::repeat_byte(0x03),
        pool_implementation: Address::repeat_byte(0x04),
        wcross: Address::repeat_byte(0x05),
    };
    let token = Address::repeat_byte(0x10);
    let reward = Address::repeat_byte(0x11);

    let chain = Arc::new(MemoryChain::new(CHAIN_ID));
    chain.deploy_wrapped_native(deployment.wcross, metadata("Wrapped CROSS", "WCROSS"));
    chain.deploy_token(token, metadata("Stake Token", "STK"), TokenBehavior::Standard);
    chain.deploy_token(reward, metadata("Reward Token", "RWD"), TokenBehavior::Standard);
    chain.deploy_contract(deployment.registry_implementation, Some(ERC1967_IMPLEMENTATION_SLOT));
    chain.deploy_contract(deployment.pool_implementation, None);

    let protocol = StakingProtocol::deploy(&deployment, chain.clone(), NOW).unwrap();
    Fixture {
        chain,
        protocol,
        deployment,
        token,
        reward,
    }
}

impl Fixture {
    pub fn ctx(&self, sender: Address) -> CallContext {
        CallContext::new(sender, NOW)
    }

    pub fn admin_ctx(&self) -> CallContext {
        self.ctx(admin())
    }

    pub fn router_address(&self) -> Address {
        self.deployment.router
    }

    pub fn create_pool(&self, staking_token: Address, min_stake_amount: u64) -> PoolId {
        self.protocol
            .registry
            .create_pool(&self.admin_ctx(), staking_token, min_stake_amount.into())
            .unwrap()
            .0
    }

    pub fn native_pool(&self) -> PoolId {
        self.create_pool(self.deployment.wcross, 0)
    }

    /// Mints `amount` of `token` to `account` and approves the router for it.
    pub fn fund(&self, token: Address, account: Address, amount: u64) {
        self.chain.mint(token, account, amount.into()).unwrap();
        self.chain
            .approve(token, account, self.router_address(), U256::MAX)
            .unwrap();
    }

    pub fn stake(&self, pool_id: PoolId, account: Address, amount: u64) {
        self.protocol
            .router
            .stake_erc20(&self.ctx(account), pool_id, amount.into())
            .unwrap();
    }
}
