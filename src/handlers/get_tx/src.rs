use crate::{
    config::GatewayState,
    crypto::Hash,
    handlers::{HttpError, to_http_err},
};
use super::models::TxView;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

pub async fn get_tx_of_hash_handler(
    State(state): State<GatewayState>,
    Path(hash): Path<String>,
) -> Result<Json<TxView>, HttpError> {
    let hash = Hash::from_hex(&hash)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("{:#}", e)))?;

    let w = state.chain.get_tx_of_hash(&hash).await.map_err(to_http_err)?;
    Ok(Json(TxView::from(w)))
}

pub async fn get_tx_of_seq_handler(
    State(state): State<GatewayState>,
    Path(seq): Path<u64>,
) -> Result<Json<TxView>, HttpError> {
    let w = state.chain.get_tx_of_seq(seq).await.map_err(to_http_err)?;
    Ok(Json(TxView::from(w)))
}
