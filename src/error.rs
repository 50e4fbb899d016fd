// src/error.rs
use ethers::types::{Address, H256, U256};
use thiserror::Error;

use crate::types::{PoolId, Role, Timestamp};

/// Failures reported by the token boundary (ERC20, wrapped native, native sends).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("unknown token {0:?}")]
    UnknownToken(Address),
    #[error("insufficient balance for {account:?}: needed {needed}, available {available}")]
    InsufficientBalance {
        account: Address,
        needed: U256,
        available: U256,
    },
    #[error("insufficient allowance for {spender:?}: needed {needed}, allowed {allowed}")]
    InsufficientAllowance {
        spender: Address,
        needed: U256,
        allowed: U256,
    },
    #[error("permit expired at {0}")]
    ExpiredSignature(U256),
    #[error("permit signed by {signer:?}, expected {owner:?}")]
    InvalidSigner { signer: Address, owner: Address },
    #[error("malformed signature: {0}")]
    InvalidSignature(String),
    #[error("native transfer to {0:?} rejected")]
    NativeTransferRejected(Address),
    #[error("call reverted: {0}")]
    Reverted(String),
}

/// Typed protocol failures. Every failing operation leaves state unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    // input validation
    #[error("amount must be greater than zero")]
    InvalidAmount,
    #[error("zero address is not allowed")]
    CanNotZeroAddress,
    #[error("pool {0} not found")]
    PoolNotFound(PoolId),
    #[error("no pool at index {index} for staking token {token:?}")]
    PoolIndexOutOfBounds { token: Address, index: usize },
    #[error("amount {amount} is below the pool minimum {minimum}")]
    BelowMinStakeAmount { amount: U256, minimum: U256 },
    #[error("permit deadline {0} has passed")]
    ExpiredSignature(U256),

    // state preconditions
    #[error("pool {0} is not a WCROSS pool")]
    NotWCROSSPool(PoolId),
    #[error("pool {0} does not accept deposits")]
    PoolNotActive(PoolId),
    #[error("no stake found for {account:?} in pool {pool_id}")]
    NoStakeFound { pool_id: PoolId, account: Address },
    #[error("no deposit found for {account:?} in pool {pool_id}")]
    NoDepositFound { pool_id: PoolId, account: Address },
    #[error("no reward in {token:?} for {account:?} in pool {pool_id}")]
    NoRewardFound {
        pool_id: PoolId,
        token: Address,
        account: Address,
    },
    #[error("{token:?} is not a reward token of pool {pool_id}")]
    RewardTokenNotFound { pool_id: PoolId, token: Address },
    #[error("pool {0} has nothing staked")]
    NothingStaked(PoolId),
    #[error("pool implementation is not set")]
    PoolImplementationNotSet,
    #[error("arithmetic overflow")]
    ArithmeticOverflow,

    // authorization
    #[error("account {account:?} is missing role {role:?}")]
    AccessControlUnauthorizedAccount { account: Address, role: Role },
    #[error("role can only be renounced by its holder")]
    AccessControlBadConfirmation,
    #[error("{0:?} is not the pending default admin")]
    AccessControlInvalidDefaultAdmin(Address),
    #[error("default admin role is managed through the transfer timelock")]
    AccessControlEnforcedDefaultAdminRules,
    #[error("default admin timelock not satisfied (schedule {0})")]
    AccessControlEnforcedDefaultAdminDelay(Timestamp),
    #[error("caller {0:?} is not the router")]
    OnlyRouter(Address),

    // upgrades
    #[error("invalid implementation {0:?}")]
    ERC1967InvalidImplementation(Address),
    #[error("unsupported proxiable uuid {0:?}")]
    UUPSUnsupportedProxiableUUID(H256),
    #[error("upgrade without initialization call cannot carry value")]
    ERC1967NonPayable,

    // external calls
    #[error("native transfer failed")]
    TransferFailed,
    #[error("token operation failed for {0:?}")]
    SafeERC20FailedOperation(Address),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;
