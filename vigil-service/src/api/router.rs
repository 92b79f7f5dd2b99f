use super::handlers::{
    handle_get_leader, handle_get_nonces, handle_health, handle_privval, handle_pub_key, handle_sign_block, handle_sign_share,
    handle_transfer_leadership,
};
use super::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use log::{error, info};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use vigil_core::infrastructure::transport::messages::{
    ROUTE_BLOCK, ROUTE_HEALTH, ROUTE_LEADER, ROUTE_NONCES, ROUTE_PUBKEY, ROUTE_SIGN, ROUTE_TRANSFER_LEADERSHIP,
};
use vigil_core::VigilError;

pub const ROUTE_PRIVVAL: &str = "/v1/privval";

pub async fn run_server(addr: SocketAddr, state: AppState) -> Result<(), VigilError> {
    info!("binding peer rpc server addr={}", addr);
    let app = build_router(state);
    let listener = TcpListener::bind(addr).await?;
    info!("peer rpc server accepting connections addr={}", addr);
    axum::serve(listener, app.into_make_service()).await.map_err(|err| {
        error!("peer rpc server terminated unexpectedly addr={} error={}", addr, err);
        VigilError::TransportError { operation: "serve".to_string(), details: err.to_string() }
    })
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(ROUTE_NONCES, post(handle_get_nonces))
        .route(ROUTE_SIGN, post(handle_sign_share))
        .route(ROUTE_BLOCK, post(handle_sign_block))
        .route(ROUTE_PRIVVAL, post(handle_privval))
        .route(ROUTE_LEADER, get(handle_get_leader))
        .route(ROUTE_TRANSFER_LEADERSHIP, post(handle_transfer_leadership))
        .route(ROUTE_PUBKEY, get(handle_pub_key))
        .route(ROUTE_HEALTH, get(handle_health))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .with_state(state)
}
