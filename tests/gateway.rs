#![cfg(feature = "gateway")]

mod common;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use common::mint_keys;
use kitty_ledger::{
    blockchain::BlockChain,
    chaindb::MemoryChain,
    config::GatewayState,
    handlers::{connectivity_router, gateway_router},
    state::MemoryState,
    transaction::Transaction,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

async fn state() -> GatewayState {
    let chain = BlockChain::new(Arc::new(MemoryChain::new()), Arc::new(MemoryState::new()), mint_keys().0)
        .await
        .unwrap();
    GatewayState { chain }
}

async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn inject_req(tx: &Transaction) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/iko/inject")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "tx": hex::encode(tx.encode()) }).to_string()))
        .unwrap()
}

#[tokio::test]
async fn inject_then_query() {
    let app = gateway_router(state().await, true);
    let (mint_pk, mint_sk) = mint_keys();
    let genesis = Transaction::new_genesis(0, &mint_sk);

    let (status, body) = call(&app, inject_req(&genesis)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["seq"], 0);
    assert_eq!(body["hash"], genesis.hash().to_hex());

    let (status, body) = call(&app, get("/api/iko/kitty/0")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["address"], hex::encode(mint_pk.to_bytes()));

    let owner = hex::encode(mint_pk.to_bytes());
    let (status, body) = call(&app, get(&format!("/api/iko/address/{owner}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kitties"], json!([0]));

    let (status, body) = call(&app, get(&format!("/api/iko/tx/hash/{}", genesis.hash()))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kitty_id"], 0);

    let (status, body) = call(&app, get("/api/iko/txs?start=0&page_size=10")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(1));

    let (status, body) = call(&app, get("/api/iko/head")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["len"], 1);
}

#[tokio::test]
async fn errors_map_to_status_codes() {
    let app = gateway_router(state().await, true);

    assert_eq!(call(&app, get("/api/iko/head")).await.0, StatusCode::NOT_FOUND);
    assert_eq!(call(&app, get("/api/iko/kitty/9")).await.0, StatusCode::NOT_FOUND);
    assert_eq!(call(&app, get("/api/iko/tx/seq/5")).await.0, StatusCode::NOT_FOUND);
    assert_eq!(call(&app, get("/api/iko/address/zz")).await.0, StatusCode::BAD_REQUEST);
    assert_eq!(call(&app, get("/api/iko/txs?start=0&page_size=0")).await.0, StatusCode::BAD_REQUEST);

    let (stranger, _) = common::user("stranger");
    let bad = Transaction::new_genesis(1, &stranger);
    assert_eq!(call(&app, inject_req(&bad)).await.0, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn follower_router_has_no_inject() {
    let app = gateway_router(state().await, false);
    let (_, mint_sk) = mint_keys();
    let status = call(&app, inject_req(&Transaction::new_genesis(0, &mint_sk))).await.0;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn connectivity_reports_status() {
    let app = connectivity_router(state().await);
    let (status, body) = call(&app, get("/api/connectivity/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"]["name"], "CONNECTED");
    assert_eq!(body["statuses"].as_array().map(Vec::len), Some(4));
}
