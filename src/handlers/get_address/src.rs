use crate::{config::GatewayState, crypto::Address, handlers::HttpError};
use super::models::AddressView;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

// unknown addresses answer with an empty state, never 404
pub async fn get_address_handler(
    State(state): State<GatewayState>,
    Path(address): Path<String>,
) -> Result<Json<AddressView>, HttpError> {
    let address = Address::from_hex(&address)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("{:#}", e)))?;

    let st = state.chain.get_address_state(&address);
    Ok(Json(AddressView::new(&address, st)))
}
