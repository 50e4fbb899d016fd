// src/config.rs
use anyhow::{Context, Result as AnyhowResult};
use ethers::types::Address;
use serde::Deserialize;
use std::collections::HashSet;
use std::env;
use std::net::SocketAddr;

use crate::protocol::Deployment;
use crate::utils::MAX_DECIMALS;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSpec {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
    #[serde(default)]
    pub behavior: TokenBehaviorSpec,
}

fn default_decimals() -> u8 {
    18
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TokenBehaviorSpec {
    #[default]
    Standard,
    ReturnsFalse,
    Reverts,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrappedNativeSpec {
    pub name: String,
    pub symbol: String,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
}

/// Whole-token amount of one token held by an account.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenAllocation {
    pub token: Address,
    pub amount: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountAllocation {
    pub address: Address,
    #[serde(default)]
    pub native: u64,
    #[serde(default)]
    pub balances: Vec<TokenAllocation>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSpec {
    pub staking_token: Address,
    #[serde(default)]
    pub min_stake_amount: u64,
    #[serde(default)]
    pub reward_tokens: Vec<Address>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Genesis {
    pub chain_id: u64,
    pub deployment: Deployment,
    pub wcross: WrappedNativeSpec,
    #[serde(default)]
    pub tokens: Vec<TokenSpec>,
    #[serde(default)]
    pub accounts: Vec<AccountAllocation>,
    #[serde(default)]
    pub pools: Vec<PoolSpec>,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_addr: SocketAddr,
    pub genesis: Genesis,
}

pub fn read_default_genesis() -> AnyhowResult<Genesis> {
    let content = include_str!("../config/genesis.json");
    serde_json::from_str(content).context("Failed to parse embedded genesis")
}

pub fn read_genesis(path: &str) -> AnyhowResult<Genesis> {
    let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read genesis {path}"))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse genesis {path}"))
}

/// Reads `BIND_ADDR`, `GENESIS_PATH`, `CHAIN_ID`, `ADMIN_ADDRESS` and
/// `DEFAULT_ADMIN_DELAY`; the last three override the genesis file.
pub fn from_env() -> AnyhowResult<NodeConfig> {
    let bind_addr = env::var("BIND_ADDR")
        .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string())
        .parse::<SocketAddr>()
        .context("BIND_ADDR is not a socket address")?;

    let mut genesis = match env::var("GENESIS_PATH") {
        Ok(path) => read_genesis(&path)?,
        Err(_) => read_default_genesis()?,
    };
    if let Ok(chain_id) = env::var("CHAIN_ID") {
        genesis.chain_id = chain_id.parse().context("CHAIN_ID is not a number")?;
    }
    if let Ok(admin) = env::var("ADMIN_ADDRESS") {
        genesis.deployment.admin = admin.parse::<Address>().context("ADMIN_ADDRESS is not an address")?;
    }
    if let Ok(delay) = env::var("DEFAULT_ADMIN_DELAY") {
        genesis.deployment.default_admin_delay = delay.parse().context("DEFAULT_ADMIN_DELAY is not a number")?;
    }

    validate_genesis(&genesis).map_err(anyhow::Error::msg)?;
    Ok(NodeConfig { bind_addr, genesis })
}

/// Rejects a genesis where two system contracts or tokens share an address,
/// or where accounts and pools reference tokens that don't exist.
pub fn validate_genesis(genesis: &Genesis) -> Result<(), String> {
    let deployment = &genesis.deployment;
    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();
    let contracts = [
        deployment.registry,
        deployment.router,
        deployment.registry_implementation,
        deployment.pool_implementation,
        deployment.wcross,
    ]
    .into_iter()
    .chain(genesis.tokens.iter().map(|t| t.address));
    for address in contracts {
        if address.is_zero() || !seen.insert(address) {
            duplicates.push(format!("0x{address:x}"));
        }
    }

    let known_token = |token: &Address| *token == deployment.wcross || genesis.tokens.iter().any(|t| t.address == *token);
    let mut unknown: Vec<String> = genesis
        .accounts
        .iter()
        .flat_map(|a| a.balances.iter().map(|b| b.token))
        .chain(genesis.pools.iter().flat_map(|p| {
            std::iter::once(p.staking_token).chain(p.reward_tokens.iter().copied())
        }))
        .filter(|token| !known_token(token))
        .map(|token| format!("0x{token:x}"))
        .collect();
    unknown.sort();
    unknown.dedup();

    let oversized: Vec<String> = genesis
        .tokens
        .iter()
        .filter(|t| t.decimals > MAX_DECIMALS)
        .map(|t| format!("0x{:x} ({} decimals)", t.address, t.decimals))
        .chain(
            (genesis.wcross.decimals > MAX_DECIMALS)
                .then(|| format!("wcross ({} decimals)", genesis.wcross.decimals)),
        )
        .collect();

    if duplicates.is_empty() && unknown.is_empty() && oversized.is_empty() && !deployment.admin.is_zero() {
        return Ok(());
    }

    let mut report = String::from("\ninvalid genesis configuration\n");
    if deployment.admin.is_zero() {
        report.push_str("\n- deployment.admin must not be the zero address\n");
    }
    if !duplicates.is_empty() {
        report.push_str(&format!(
            "\n- zero or duplicated contract addresses:\n{}\n",
            duplicates.join("\n")
        ));
    }
    if !unknown.is_empty() {
        report.push_str(&format!(
            "\n- tokens referenced but not declared in `tokens` or as wcross:\n{}\n",
            unknown.join("\n")
        ));
    }
    if !oversized.is_empty() {
        report.push_str(&format!(
            "\n- decimals above {MAX_DECIMALS}:\n{}\n",
            oversized.join("\n")
        ));
    }
    Err(report)
}
