use crate::handlers::get_tx::models::TxView;
use serde::Serialize;

#[derive(Serialize)]
pub struct ChainTip {
    pub len:     u64,
    pub applied: u64,
    pub head:    TxView,
}
