use crate::{config::GatewayState, handlers::HttpError, kitty::KittyId};
use super::models::KittyView;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

pub async fn get_kitty_handler(
    State(state): State<GatewayState>,
    Path(kitty_id): Path<KittyId>,
) -> Result<Json<KittyView>, HttpError> {
    let kitty = state
        .chain
        .get_kitty_state(kitty_id)
        .ok_or((StatusCode::NOT_FOUND, format!("kitty of id '{}' does not exist", kitty_id)))?;

    Ok(Json(KittyView::new(kitty_id, kitty)))
}
