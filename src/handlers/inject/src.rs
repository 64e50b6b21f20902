use crate::{
    config::GatewayState,
    handlers::{HttpError, get_tx::models::TxView, to_http_err},
    objstore,
    transaction::Transaction,
};
use super::models::InjectReq;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
};

pub async fn inject_handler(
    State(state): State<GatewayState>,
    Json(req): Json<InjectReq>,
) -> Result<(StatusCode, Json<TxView>), HttpError> {
    let raw = hex::decode(req.tx.trim())
        .map_err(|_| (StatusCode::BAD_REQUEST, "tx is not valid hex".into()))?;
    let tx: Transaction = objstore::decode(&raw)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let stored = state.chain.inject(tx).await.map_err(to_http_err)?;
    Ok((StatusCode::CREATED, Json(stored.into())))
}
