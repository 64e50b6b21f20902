use crate::{
    crypto::Address,
    error::StateError,
    kitty::{AddressState, KittyId, KittyIds, KittyState},
    transaction::TxHash,
};
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

/// Ownership state compiled from the chain.
pub trait StateDb: Send + Sync {
    /// Current owner and history of a kitty, `None` if it was never minted.
    fn get_kitty_state(&self, kitty_id: KittyId) -> Option<KittyState>;

    /// Hash of the latest transaction of a kitty.
    fn get_kitty_unspent_tx(&self, kitty_id: KittyId) -> Option<TxHash>;

    /// Never fails; unknown addresses get an empty state.
    fn get_address_state(&self, address: &Address) -> AddressState;

    /// Fails if the kitty already exists.
    fn add_kitty(&self, tx: TxHash, kitty_id: KittyId, address: Address) -> Result<(), StateError>;

    /// Fails if `from == to`, the kitty does not exist, or `from` is not its owner.
    fn move_kitty(
        &self,
        tx: TxHash,
        kitty_id: KittyId,
        from: Address,
        to: Address,
    ) -> Result<(), StateError>;

    fn kitty_count(&self) -> usize;
}

#[derive(Default)]
struct Maps {
    kitties: HashMap<KittyId, KittyState>,
    addresses: HashMap<Address, AddressState>,
}

#[derive(Default)]
pub struct MemoryState {
    inner: Mutex<Maps>,
}

impl MemoryState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Maps> {
        // mutations validate before writing, so a poisoned map is still whole
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl StateDb for MemoryState {
    fn get_kitty_state(&self, kitty_id: KittyId) -> Option<KittyState> {
        self.lock().kitties.get(&kitty_id).cloned()
    }

    fn get_kitty_unspent_tx(&self, kitty_id: KittyId) -> Option<TxHash> {
        self.lock()
            .kitties
            .get(&kitty_id)
            .and_then(|k| k.transactions.last().copied())
    }

    fn get_address_state(&self, address: &Address) -> AddressState {
        self.lock().addresses.get(address).cloned().unwrap_or_default()
    }

    fn add_kitty(&self, tx: TxHash, kitty_id: KittyId, address: Address) -> Result<(), StateError> {
        let mut maps = self.lock();
        if maps.kitties.contains_key(&kitty_id) {
            return Err(StateError::AlreadyExists(kitty_id));
        }
        maps.kitties.insert(
            kitty_id,
            KittyState {
                address,
                transactions: vec![tx],
            },
        );
        let a = maps.addresses.entry(address).or_default();
        a.kitties.add(kitty_id);
        a.transactions.push(tx);
        Ok(())
    }

    fn move_kitty(
        &self,
        tx: TxHash,
        kitty_id: KittyId,
        from: Address,
        to: Address,
    ) -> Result<(), StateError> {
        let mut maps = self.lock();
        if from == to {
            return Err(StateError::NoopTransfer {
                kitty_id,
                address: from,
            });
        }
        let kitty = maps
            .kitties
            .get_mut(&kitty_id)
            .ok_or(StateError::NoSuchKitty(kitty_id))?;
        if kitty.address != from {
            return Err(StateError::NotOwner {
                kitty_id,
                address: from,
            });
        }
        kitty.address = to;
        kitty.transactions.push(tx);

        let from_state = maps.addresses.entry(from).or_default();
        from_state.kitties.remove(kitty_id);
        from_state.transactions.push(tx);

        let to_state = maps.addresses.entry(to).or_insert_with(|| AddressState {
            kitties: KittyIds::new(),
            transactions: Vec::new(),
        });
        to_state.kitties.add(kitty_id);
        to_state.transactions.push(tx);
        Ok(())
    }

    fn kitty_count(&self) -> usize {
        self.lock().kitties.len()
    }
}
