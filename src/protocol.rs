// src/protocol.rs
use ethers::types::Address;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::error::Result;
use crate::events::EventLog;
use crate::gateway::{CodeInspector, TokenGateway};
use crate::governance::Governance;
use crate::registry::PoolRegistry;
use crate::router::Router;
use crate::types::{CallContext, Timestamp, manager_role};

/// Addresses and parameters the protocol is deployed with.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub admin: Address,
    pub default_admin_delay: u64,
    pub registry: Address,
    pub router: Address,
    pub registry_implementation: Address,
    pub pool_implementation: Address,
    pub wcross: Address,
}

/// A deployed protocol: governance, registry and router sharing one event log.
pub struct StakingProtocol {
    pub governance: Arc<Governance>,
    pub registry: Arc<PoolRegistry>,
    pub router: Arc<Router>,
    pub events: Arc<EventLog>,
}

impl StakingProtocol {
    /// Deploys and wires every component. The admin receives both the default
    /// admin and the manager role, and the router is registered with the
    /// registry.
    pub fn deploy<C>(deployment: &Deployment, chain: Arc<C>, now: Timestamp) -> Result<Self>
    where
        C: TokenGateway + CodeInspector + 'static,
    {
        let gateway: Arc<dyn TokenGateway> = chain.clone();
        let inspector: Arc<dyn CodeInspector> = chain;
        let events = Arc::new(EventLog::new());

        let governance = Arc::new(Governance::new(
            deployment.registry,
            deployment.admin,
            deployment.default_admin_delay,
            deployment.registry_implementation,
            events.clone(),
            inspector.clone(),
        )?);
        let registry = Arc::new(PoolRegistry::new(
            deployment.registry,
            deployment.pool_implementation,
            governance.clone(),
            gateway.clone(),
            inspector,
            events.clone(),
        )?);
        let router = Arc::new(Router::new(
            deployment.router,
            deployment.wcross,
            registry.clone(),
            gateway,
            events.clone(),
        )?);

        let admin = CallContext::new(deployment.admin, now);
        governance.grant_role(&admin, manager_role(), deployment.admin)?;
        registry.set_router(&admin, deployment.router)?;

        info!(
            registry = ?deployment.registry,
            router = ?deployment.router,
            wcross = ?deployment.wcross,
            "protocol deployed"
        );
        Ok(Self {
            governance,
            registry,
            router,
            events,
        })
    }
}
