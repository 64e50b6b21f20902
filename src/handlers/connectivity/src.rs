use crate::{config::GatewayState, net::Status};
use super::models::{ReconnectResp, StatusResp};
use axum::{Json, extract::State};

pub async fn status_handler(State(state): State<GatewayState>) -> Json<StatusResp> {
    Json(StatusResp {
        status:   state.chain.status().info(),
        statuses: Status::all(),
    })
}

pub async fn reconnect_handler(State(state): State<GatewayState>) -> Json<ReconnectResp> {
    Json(ReconnectResp { ok: state.chain.reconnect() })
}
