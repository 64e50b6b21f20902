use crate::{
    crypto::Address,
    kitty::{AddressState, KittyId},
};
use serde::Serialize;

#[derive(Serialize)]
pub struct AddressView {
    pub address:      String,
    pub kitties:      Vec<KittyId>,     // ascending
    pub transactions: Vec<String>,
}

impl AddressView {
    pub fn new(address: &Address, state: AddressState) -> Self {
        AddressView {
            address:      address.to_hex(),
            kitties:      state.kitties.as_slice().to_vec(),
            transactions: state.transactions.iter().map(|h| h.to_hex()).collect(),
        }
    }
}
