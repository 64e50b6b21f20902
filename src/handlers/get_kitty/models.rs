use crate::kitty::{KittyId, KittyState};
use serde::Serialize;

#[derive(Serialize)]
pub struct KittyView {
    pub kitty_id:     KittyId,
    pub address:      String,
    pub transactions: Vec<String>,      // hex tx hashes, oldest first
}

impl KittyView {
    pub fn new(kitty_id: KittyId, state: KittyState) -> Self {
        KittyView {
            kitty_id,
            address:      state.address.to_hex(),
            transactions: state.transactions.iter().map(|h| h.to_hex()).collect(),
        }
    }
}
