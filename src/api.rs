// src/api.rs
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use ethers::types::serde_helpers::deserialize_stringified_numeric;
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

use crate::devnet::Devnet;
use crate::error::ProtocolError;
use crate::events::LogEntry;
use crate::gateway::TokenGateway;
use crate::governance::AdminSnapshot;
use crate::types::{CallContext, PoolId, PoolInfo, PoolStatus, Timestamp, UserStakingInfo};
use crate::utils::to_human_amount;

pub struct AppState {
    pub devnet: Devnet,
    pub clock: fn() -> Timestamp,
    tx_lock: Mutex<()>,
}

impl AppState {
    pub fn new(devnet: Devnet, clock: fn() -> Timestamp) -> Self {
        Self {
            devnet,
            clock,
            tx_lock: Mutex::new(()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

pub struct ApiError(StatusCode, String);

impl From<ProtocolError> for ApiError {
    fn from(err: ProtocolError) -> Self {
        let status = match err {
            ProtocolError::PoolNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        };
        ApiError(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(ErrorBody { error: self.1 })).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/pools", get(all_pools))
        .route("/pools/active", get(active_pools))
        .route("/pools/{id}", get(pool_info))
        .route("/pools/{id}/users/{user}", get(user_info))
        .route("/tokens/{token}/pools", get(pools_by_token))
        .route("/governance", get(governance))
        .route("/events", get(events))
        .route("/balances/{account}", get(native_balance))
        .route("/balances/{account}/{token}", get(token_balance))
        .route("/tx", post(submit_tx))
        .with_state(state)
}

fn pool_infos(state: &AppState, ids: Vec<PoolId>) -> ApiResult<Vec<PoolInfo>> {
    let registry = &state.devnet.protocol.registry;
    let pools = ids
        .into_iter()
        .map(|id| registry.get_pool_info(id))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(pools))
}

async fn all_pools(State(state): State<Arc<AppState>>) -> ApiResult<Vec<PoolInfo>> {
    let ids = state.devnet.protocol.registry.get_all_pool_ids();
    pool_infos(&state, ids)
}

async fn active_pools(State(state): State<Arc<AppState>>) -> ApiResult<Vec<PoolInfo>> {
    let ids = state.devnet.protocol.registry.get_active_pool_ids();
    pool_infos(&state, ids)
}

async fn pool_info(State(state): State<Arc<AppState>>, Path(id): Path<u64>) -> ApiResult<PoolInfo> {
    Ok(Json(state.devnet.protocol.registry.get_pool_info(id.into())?))
}

async fn user_info(
    State(state): State<Arc<AppState>>,
    Path((id, user)): Path<(u64, Address)>,
) -> ApiResult<UserStakingInfo> {
    Ok(Json(state.devnet.protocol.router.get_user_staking_info(id.into(), user)?))
}

async fn pools_by_token(State(state): State<Arc<AppState>>, Path(token): Path<Address>) -> Json<Vec<PoolId>> {
    Json(state.devnet.protocol.registry.get_pool_ids_by_staking_token(token))
}

async fn governance(State(state): State<Arc<AppState>>) -> Json<AdminSnapshot> {
    Json(state.devnet.protocol.governance.snapshot((state.clock)()))
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    since: Option<usize>,
}

async fn events(State(state): State<Arc<AppState>>, Query(query): Query<EventsQuery>) -> Json<Vec<LogEntry>> {
    Json(state.devnet.protocol.events.since(query.since.unwrap_or(0)))
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub account: Address,
    pub token: Option<Address>,
    pub balance: U256,
    pub formatted: String,
}

async fn native_balance(State(state): State<Arc<AppState>>, Path(account): Path<Address>) -> Json<Balance> {
    let balance = state.devnet.chain.native_balance(account);
    Json(Balance {
        account,
        token: None,
        balance,
        formatted: to_human_amount(balance, 18),
    })
}

async fn token_balance(
    State(state): State<Arc<AppState>>,
    Path((account, token)): Path<(Address, Address)>,
) -> ApiResult<Balance> {
    let metadata = state.devnet.chain.metadata(token).ok_or(ApiError(
        StatusCode::NOT_FOUND,
        format!("unknown token {token:?}"),
    ))?;
    let balance = state.devnet.chain.balance_of(token, account);
    Ok(Json(Balance {
        account,
        token: Some(token),
        balance,
        formatted: to_human_amount(balance, metadata.decimals),
    }))
}

/// One protocol call, made as if `from` had sent it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxRequest {
    pub from: Address,
    #[serde(default, deserialize_with = "deserialize_stringified_numeric")]
    pub value: U256,
    pub call: Call,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Call {
    StakeNative {
        pool_id: u64,
    },
    StakeErc20 {
        pool_id: u64,
        #[serde(deserialize_with = "deserialize_stringified_numeric")]
        amount: U256,
    },
    UnstakeNative {
        pool_id: u64,
    },
    UnstakeErc20 {
        pool_id: u64,
    },
    ClaimRewards {
        pool_id: u64,
        token: Address,
    },
    CreatePool {
        staking_token: Address,
        #[serde(default, deserialize_with = "deserialize_stringified_numeric")]
        min_stake_amount: U256,
    },
    SetPoolStatus {
        pool_id: u64,
        status: PoolStatus,
    },
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TxStatus {
    Success,
    Reverted,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub status: TxStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub logs: Vec<LogEntry>,
}

fn execute(state: &AppState, ctx: &CallContext, call: Call) -> Result<serde_json::Value, ProtocolError> {
    let protocol = &state.devnet.protocol;
    let value = match call {
        Call::StakeNative { pool_id } => serde_json::json!(protocol.router.stake_native(ctx, pool_id.into())?),
        Call::StakeErc20 { pool_id, amount } => {
            serde_json::json!(protocol.router.stake_erc20(ctx, pool_id.into(), amount)?)
        }
        Call::UnstakeNative { pool_id } => serde_json::json!(protocol.router.unstake_native(ctx, pool_id.into())?),
        Call::UnstakeErc20 { pool_id } => serde_json::json!(protocol.router.unstake_erc20(ctx, pool_id.into())?),
        Call::ClaimRewards { pool_id, token } => {
            serde_json::json!(protocol.router.claim_rewards(ctx, pool_id.into(), token)?)
        }
        Call::CreatePool {
            staking_token,
            min_stake_amount,
        } => {
            let (pool_id, pool_address) = protocol.registry.create_pool(ctx, staking_token, min_stake_amount)?;
            serde_json::json!({ "poolId": pool_id, "poolAddress": pool_address })
        }
        Call::SetPoolStatus { pool_id, status } => {
            protocol.registry.set_pool_status(ctx, pool_id.into(), status)?;
            serde_json::Value::Null
        }
    };
    Ok(value)
}

async fn submit_tx(State(state): State<Arc<AppState>>, Json(tx): Json<TxRequest>) -> Json<Receipt> {
    let _guard = state.tx_lock.lock().unwrap_or_else(PoisonError::into_inner);
    let ctx = CallContext::new(tx.from, (state.clock)()).with_value(tx.value);
    let first_log = state.devnet.protocol.events.len();
    debug!(from = ?tx.from, call = ?tx.call, "executing tx");

    let receipt = match execute(&state, &ctx, tx.call) {
        Ok(result) => Receipt {
            status: TxStatus::Success,
            result: Some(result),
            error: None,
            logs: state.devnet.protocol.events.since(first_log),
        },
        Err(err) => {
            warn!(from = ?tx.from, error = %err, "tx reverted");
            Receipt {
                status: TxStatus::Reverted,
                result: None,
                error: Some(err.to_string()),
                logs: Vec::new(),
            }
        }
    };
    Json(receipt)
}
