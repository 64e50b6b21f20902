//! HTTP gateway over the orchestrator.

pub mod connectivity { pub mod models; pub mod src; }
pub mod get_address { pub mod models; pub mod src; }
pub mod get_chain_tip { pub mod models; pub mod src; }
pub mod get_kitty { pub mod models; pub mod src; }
pub mod get_list_txs { pub mod models; pub mod src; }
pub mod get_tx { pub mod models; pub mod src; }
pub mod inject { pub mod models; pub mod src; }

use crate::{config::GatewayState, error::ChainError};
use axum::{
    Router,
    http::StatusCode,
    routing::{get, post},
};

pub type HttpError = (StatusCode, String);

pub(crate) fn to_http_err(e: ChainError) -> HttpError {
    let code = match &e {
        e if e.is_not_found() => StatusCode::NOT_FOUND,
        ChainError::Rejected(_)
        | ChainError::State(_)
        | ChainError::InvalidPageSize(_)
        | ChainError::InvalidStartSeq(_) => StatusCode::BAD_REQUEST,
        ChainError::NotAuthority => StatusCode::FORBIDDEN,
        ChainError::Disabled | ChainError::Uninitialized => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (code, e.to_string())
}

/// Query routes plus, on the authority, the inject route.
pub fn gateway_router(state: GatewayState, with_inject: bool) -> Router {
    let mut router = Router::new()
        .route("/api/iko/kitty/{kitty_id}", get(get_kitty::src::get_kitty_handler))
        .route("/api/iko/address/{address}", get(get_address::src::get_address_handler))
        .route("/api/iko/tx/hash/{hash}", get(get_tx::src::get_tx_of_hash_handler))
        .route("/api/iko/tx/seq/{seq}", get(get_tx::src::get_tx_of_seq_handler))
        .route("/api/iko/txs", get(get_list_txs::src::get_list_txs_handler))
        .route("/api/iko/head", get(get_chain_tip::src::get_chain_tip_handler));
    if with_inject {
        router = router.route("/api/iko/inject", post(inject::src::inject_handler));
    }
    router.with_state(state)
}

pub fn connectivity_router(state: GatewayState) -> Router {
    Router::new()
        .route("/api/connectivity/status", get(connectivity::src::status_handler))
        .route("/api/connectivity/reconnect", post(connectivity::src::reconnect_handler))
        .with_state(state)
}
