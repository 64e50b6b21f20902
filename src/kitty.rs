use crate::{
    crypto::Address,
    transaction::TxHash,
};
use serde::{Deserialize, Serialize};

pub type KittyId = u64;

/// Ascending, duplicate-free set of kitty ids.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KittyIds(Vec<KittyId>);

impl KittyIds {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn add(&mut self, id: KittyId) {
        if let Err(pos) = self.0.binary_search(&id) {
            self.0.insert(pos, id);
        }
    }

    pub fn remove(&mut self, id: KittyId) {
        if let Ok(pos) = self.0.binary_search(&id) {
            self.0.remove(pos);
        }
    }

    pub fn contains(&self, id: KittyId) -> bool {
        self.0.binary_search(&id).is_ok()
    }

    pub fn as_slice(&self) -> &[KittyId] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<KittyId> for KittyIds {
    fn from_iter<I: IntoIterator<Item = KittyId>>(iter: I) -> Self {
        let mut ids = KittyIds::new();
        for id in iter {
            ids.add(id);
        }
        ids
    }
}

// State of a kitty as compiled from the chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KittyState {
    pub address: Address,
    pub transactions: Vec<TxHash>,
}

// State of an address as compiled from the chain.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressState {
    pub kitties: KittyIds,
    pub transactions: Vec<TxHash>,
}
