use crate::{
    config::GatewayState,
    handlers::{HttpError, to_http_err},
};
use super::models::ChainTip;
use axum::{
    Json,
    extract::State,
};

pub async fn get_chain_tip_handler(
    State(state): State<GatewayState>,
) -> Result<Json<ChainTip>, HttpError> {
    let head = state.chain.head().await.map_err(to_http_err)?;

    let tip = ChainTip {
        len:     state.chain.len().await,
        applied: state.chain.applied().await,
        head:    head.into(),
    };
    Ok(Json(tip))
}
