use crate::{
    config::GatewayState,
    handlers::{HttpError, get_tx::models::TxView, to_http_err},
};
use super::models::{DEFAULT_PAGE_SIZE, ListTxsReq};
use axum::{
    Json,
    extract::{Query, State},
};

pub async fn get_list_txs_handler(
    State(state): State<GatewayState>,
    Query(params): Query<ListTxsReq>,
) -> Result<Json<Vec<TxView>>, HttpError> {
    let start = params.start.unwrap_or(0);
    let page_size = params.page_size.unwrap_or(DEFAULT_PAGE_SIZE);

    let page = state
        .chain
        .get_txs_of_seq_range(start, page_size)
        .await
        .map_err(to_http_err)?;

    Ok(Json(page.into_iter().map(Into::into).collect()))
}
