use super::{ChainDb, NOTIFY_CAPACITY, page_range};
use crate::{
    error::ChainError,
    net::Status,
    transaction::{TxChecker, TxHash, Wrapper},
};
use async_trait::async_trait;
use std::{collections::HashMap, sync::Mutex as StdMutex};
use tokio::sync::{Mutex, mpsc};

#[derive(Default)]
struct Entries {
    list: Vec<Wrapper>,
    by_hash: HashMap<TxHash, u64>,
}

/// Unreplicated ledger held in process memory. Every node owning one is its
/// own authority.
pub struct MemoryChain {
    entries: Mutex<Entries>,
    accepted: mpsc::Sender<Wrapper>,
    notifications: StdMutex<Option<mpsc::Receiver<Wrapper>>>,
}

impl MemoryChain {
    pub fn new() -> Self {
        let (accepted, rx) = mpsc::channel(NOTIFY_CAPACITY);
        MemoryChain {
            entries: Mutex::new(Entries::default()),
            accepted,
            notifications: StdMutex::new(Some(rx)),
        }
    }
}

impl Default for MemoryChain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChainDb for MemoryChain {
    async fn head(&self) -> Result<Wrapper, ChainError> {
        let entries = self.entries.lock().await;
        entries.list.last().cloned().ok_or(ChainError::NoEntries)
    }

    async fn len(&self) -> u64 {
        self.entries.lock().await.list.len() as u64
    }

    async fn add_tx(&self, mut wrapper: Wrapper, check: &TxChecker) -> Result<Wrapper, ChainError> {
        check(&wrapper.tx)?;

        let mut entries = self.entries.lock().await;
        let seq = entries.list.len() as u64;
        wrapper.meta.seq = seq;
        entries.by_hash.insert(wrapper.tx.hash(), seq);
        entries.list.push(wrapper.clone());

        tracing::debug!(tx_seq = seq, kitty_id = wrapper.tx.kitty_id, "entry appended");
        let _ = self.accepted.try_send(wrapper.clone());
        Ok(wrapper)
    }

    async fn get_tx_of_hash(&self, hash: &TxHash) -> Result<Wrapper, ChainError> {
        let entries = self.entries.lock().await;
        entries
            .by_hash
            .get(hash)
            .map(|&seq| entries.list[seq as usize].clone())
            .ok_or(ChainError::TxNotFound(*hash))
    }

    async fn get_tx_of_seq(&self, seq: u64) -> Result<Wrapper, ChainError> {
        let entries = self.entries.lock().await;
        entries
            .list
            .get(seq as usize)
            .cloned()
            .ok_or(ChainError::SeqNotFound(seq))
    }

    async fn get_txs_of_seq_range(&self, start: u64, page_size: u64) -> Result<Vec<Wrapper>, ChainError> {
        let entries = self.entries.lock().await;
        let range = page_range(start, page_size, entries.list.len() as u64)?;
        Ok(entries.list[range.start as usize..range.end as usize].to_vec())
    }

    fn take_notifications(&self) -> Option<mpsc::Receiver<Wrapper>> {
        self.notifications.lock().unwrap_or_else(|p| p.into_inner()).take()
    }

    async fn bootstrap_ledger(&self) -> Result<(), ChainError> {
        Ok(())
    }

    fn is_authority(&self) -> bool {
        true
    }

    fn status(&self) -> Status {
        Status::Connected
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        crypto::keypair_from_seed,
        transaction::{Transaction, accept_all},
    };

    #[tokio::test]
    async fn add_tx_assigns_seq_and_notifies() {
        let chain = MemoryChain::new();
        let mut rx = chain.take_notifications().unwrap();
        assert!(chain.take_notifications().is_none());

        let (_, sk) = keypair_from_seed(b"genesis seed");
        for i in 0..3 {
            let w = Wrapper::new(Transaction::new_genesis(i, &sk), 99);
            let stored = chain.add_tx(w, &*accept_all()).await.unwrap();
            assert_eq!(stored.meta.seq, i);
        }
        assert_eq!(chain.len().await, 3);
        assert_eq!(rx.recv().await.unwrap().meta.seq, 0);
        assert_eq!(chain.head().await.unwrap().tx.kitty_id, 2);
    }
}
