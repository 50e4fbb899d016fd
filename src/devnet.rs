// src/devnet.rs
//! Boots an in-memory chain from a genesis file: tokens, balances, the
//! protocol contracts and the initial pools.

use anyhow::{Context, Result as AnyhowResult};
use std::sync::Arc;
use tracing::info;

use crate::config::{Genesis, TokenBehaviorSpec};
use crate::gateway::memory::{MemoryChain, TokenBehavior, TokenMetadata};
use crate::governance::ERC1967_IMPLEMENTATION_SLOT;
use crate::protocol::StakingProtocol;
use crate::types::{CallContext, Timestamp};
use crate::utils::from_whole_tokens;

pub struct Devnet {
    pub chain: Arc<MemoryChain>,
    pub protocol: StakingProtocol,
}

impl From<TokenBehaviorSpec> for TokenBehavior {
    fn from(spec: TokenBehaviorSpec) -> Self {
        match spec {
            TokenBehaviorSpec::Standard => TokenBehavior::Standard,
            TokenBehaviorSpec::ReturnsFalse => TokenBehavior::ReturnsFalse,
            TokenBehaviorSpec::Reverts => TokenBehavior::Reverts,
        }
    }
}

fn decimals_of(genesis: &Genesis, token: ethers::types::Address) -> u8 {
    if token == genesis.deployment.wcross {
        return genesis.wcross.decimals;
    }
    genesis
        .tokens
        .iter()
        .find(|t| t.address == token)
        .map(|t| t.decimals)
        .unwrap_or(18)
}

pub fn bootstrap(genesis: &Genesis, now: Timestamp) -> AnyhowResult<Devnet> {
    let chain = Arc::new(MemoryChain::new(genesis.chain_id));
    let deployment = &genesis.deployment;

    chain.deploy_wrapped_native(
        deployment.wcross,
        TokenMetadata {
            name: genesis.wcross.name.clone(),
            symbol: genesis.wcross.symbol.clone(),
            decimals: genesis.wcross.decimals,
        },
    );
    for token in &genesis.tokens {
        chain.deploy_token(
            token.address,
            TokenMetadata {
                name: token.name.clone(),
                symbol: token.symbol.clone(),
                decimals: token.decimals,
            },
            token.behavior.into(),
        );
    }
    chain.deploy_contract(deployment.registry_implementation, Some(ERC1967_IMPLEMENTATION_SLOT));
    chain.deploy_contract(deployment.pool_implementation, None);

    for account in &genesis.accounts {
        let native = from_whole_tokens(account.native, 18)
            .with_context(|| format!("Native allocation of {:?} overflows", account.address))?;
        chain.set_native_balance(account.address, native);
        for allocation in &account.balances {
            let amount = from_whole_tokens(allocation.amount, decimals_of(genesis, allocation.token))
                .with_context(|| format!("Allocation of {:?} to {:?} overflows", allocation.token, account.address))?;
            chain
                .mint(allocation.token, account.address, amount)
                .with_context(|| format!("Failed to allocate {:?} to {:?}", allocation.token, account.address))?;
        }
    }

    let protocol = StakingProtocol::deploy(deployment, chain.clone(), now).context("Failed to deploy protocol")?;

    let admin = CallContext::new(deployment.admin, now);
    for pool in &genesis.pools {
        let min_stake = from_whole_tokens(pool.min_stake_amount, decimals_of(genesis, pool.staking_token))
            .with_context(|| format!("Minimum stake for {:?} overflows", pool.staking_token))?;
        let (pool_id, _) = protocol
            .registry
            .create_pool(&admin, pool.staking_token, min_stake)
            .with_context(|| format!("Failed to create pool for {:?}", pool.staking_token))?;
        for token in &pool.reward_tokens {
            protocol
                .registry
                .add_reward_token(&admin, pool_id, *token)
                .with_context(|| format!("Failed to add reward token {token:?} to pool {pool_id}"))?;
        }
    }

    info!(
        chain_id = genesis.chain_id,
        pools = %protocol.registry.pool_count(),
        "devnet ready"
    );
    Ok(Devnet { chain, protocol })
}
