// src/lib.rs
pub mod api;
pub mod config;
pub mod devnet;
pub mod error;
pub mod events;
pub mod gateway;
pub mod governance;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod safe_transfer;
pub mod types;
pub mod utils;

pub use error::{GatewayError, ProtocolError};
pub use events::{Event, EventLog, LogEntry};
pub use gateway::memory::MemoryChain;
pub use gateway::{CodeInspector, TokenGateway};
pub use governance::Governance;
pub use protocol::{Deployment, StakingProtocol};
pub use registry::PoolRegistry;
pub use router::Router;
pub use types::{CallContext, DEFAULT_ADMIN_ROLE, PoolId, PoolInfo, PoolStatus, UserStakingInfo, manager_role};
