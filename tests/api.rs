use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use cross_staking::api::{self, AppState};
use cross_staking::config::{Genesis, read_default_genesis};
use cross_staking::devnet::bootstrap;
use cross_staking::types::Timestamp;
use ethers::types::{Address, U256};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

const NOW: Timestamp = 1_700_000_000;

fn clock() -> Timestamp {
    NOW
}

fn app() -> (axum::Router, Genesis) {
    let genesis = read_default_genesis().unwrap();
    let devnet = bootstrap(&genesis, NOW).unwrap();
    (api::router(Arc::new(AppState::new(devnet, clock))), genesis)
}

async fn get(app: &axum::Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

async fn send(app: &axum::Router, tx: Value) -> Value {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/tx")
                .header("content-type", "application/json")
                .body(Body::from(tx.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn staker(genesis: &Genesis) -> Address {
    genesis.accounts[1].address
}

#[tokio::test]
async fn lists_genesis_pools() {
    let (app, genesis) = app();

    let (status, pools) = get(&app, "/pools").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pools.as_array().unwrap().len(), genesis.pools.len());
    assert_eq!(pools[0]["stakingToken"], json!(genesis.deployment.wcross));
    assert_eq!(pools[1]["rewardTokens"], json!(genesis.pools[1].reward_tokens));

    let (status, active) = get(&app, "/pools/active").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(active, pools);

    let (status, ids) = get(&app, &format!("/tokens/{:?}/pools", genesis.deployment.wcross)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids, json!([U256::zero()]));

    let (status, body) = get(&app, "/pools/99").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn native_stake_through_tx_endpoint() {
    let (app, genesis) = app();
    let user = staker(&genesis);

    let receipt = send(
        &app,
        json!({
            "from": user,
            "value": "5000",
            "call": { "method": "stakeNative", "poolId": 0 }
        }),
    )
    .await;
    assert_eq!(receipt["status"], "success");
    assert_eq!(receipt["result"], json!(U256::from(5_000)));
    let logged: Vec<&str> = receipt["logs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|log| log["event"].as_str().unwrap())
        .collect();
    assert_eq!(logged, vec!["depositedNative", "stakedNative"]);

    let (status, info) = get(&app, &format!("/pools/0/users/{user:?}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(info["stakedAmount"], json!(U256::from(5_000)));
    assert_eq!(info["rewardTokens"].as_array().unwrap().len(), info["pendingRewards"].as_array().unwrap().len());

    let receipt = send(
        &app,
        json!({ "from": user, "call": { "method": "unstakeNative", "poolId": 0 } }),
    )
    .await;
    assert_eq!(receipt["status"], "success");

    let (_, balance) = get(&app, &format!("/balances/{user:?}")).await;
    assert_eq!(balance["formatted"], "10000");
}

#[tokio::test]
async fn reverted_calls_report_the_error() {
    let (app, genesis) = app();
    let user = staker(&genesis);
    let before = get(&app, "/events").await.1.as_array().unwrap().len();

    let receipt = send(
        &app,
        json!({ "from": user, "call": { "method": "unstakeErc20", "poolId": 1 } }),
    )
    .await;
    assert_eq!(receipt["status"], "reverted");
    assert!(receipt["error"].as_str().unwrap().contains("no stake found"));
    assert!(receipt["logs"].as_array().unwrap().is_empty());

    let receipt = send(
        &app,
        json!({
            "from": user,
            "call": { "method": "createPool", "stakingToken": genesis.tokens[0].address }
        }),
    )
    .await;
    assert_eq!(receipt["status"], "reverted");
    assert!(receipt["error"].as_str().unwrap().contains("missing role"));

    let after = get(&app, &format!("/events?since={before}")).await.1;
    assert!(after.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn admin_manages_pools_over_http() {
    let (app, genesis) = app();
    let admin = genesis.deployment.admin;

    let receipt = send(
        &app,
        json!({
            "from": admin,
            "call": {
                "method": "createPool",
                "stakingToken": genesis.tokens[0].address,
                "minStakeAmount": 10
            }
        }),
    )
    .await;
    assert_eq!(receipt["status"], "success");
    assert_eq!(receipt["result"]["poolId"], json!(U256::from(genesis.pools.len())));

    let receipt = send(
        &app,
        json!({
            "from": admin,
            "call": { "method": "setPoolStatus", "poolId": 0, "status": "paused" }
        }),
    )
    .await;
    assert_eq!(receipt["status"], "success");
    assert_eq!(receipt["logs"][0]["event"], "poolStatusUpdated");

    let (_, active) = get(&app, "/pools/active").await;
    assert_eq!(active.as_array().unwrap().len(), genesis.pools.len());

    let (_, governance) = get(&app, "/governance").await;
    assert_eq!(governance["defaultAdmin"], json!(admin));
    assert_eq!(governance["defaultAdminDelay"], json!(genesis.deployment.default_admin_delay));
}

#[tokio::test]
async fn token_balances_are_formatted_with_decimals() {
    let (app, genesis) = app();
    let user = staker(&genesis);
    let token = genesis.tokens[0].address;

    let (status, balance) = get(&app, &format!("/balances/{user:?}/{token:?}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(balance["formatted"], "10000");

    let (status, _) = get(&app, &format!("/balances/{user:?}/{:?}", Address::repeat_byte(0x77))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
