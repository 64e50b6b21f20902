//! Orchestrator tying the ledger store to the ownership state.
//!
//! State is derived from the ledger only. A single cursor (`applied`) records
//! how many ledger entries have been folded into state; injection and catch-up
//! both advance it under one lock, so every entry is applied exactly once no
//! matter whether it was appended locally or replicated in.

use crate::{
    chaindb::ChainDb,
    crypto::Address,
    error::ChainError,
    kitty::{AddressState, KittyId, KittyState},
    net::Status,
    state::StateDb,
    transaction::{Transaction, TxChecker, TxHash, Wrapper, signature_policy},
};
use ed25519_dalek::VerifyingKey;
use std::{
    sync::{Arc, Mutex as StdMutex, Weak},
    time::Duration,
};
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

const REPLAY_PAGE: u64 = 256;
// notifications may be dropped, so the ledger is also polled
const SYNC_INTERVAL: Duration = Duration::from_secs(1);

pub struct BlockChain {
    chain: Arc<dyn ChainDb>,
    state: Arc<dyn StateDb>,
    mint_key: VerifyingKey,
    checker: Arc<TxChecker>,
    applied: Mutex<u64>,
    sync: StdMutex<Option<JoinHandle<()>>>,
}

impl BlockChain {
    /// Builds the orchestrator with the default [`signature_policy`].
    pub async fn new(
        chain: Arc<dyn ChainDb>,
        state: Arc<dyn StateDb>,
        mint_key: VerifyingKey,
    ) -> Result<Arc<Self>, ChainError> {
        Self::with_checker(chain, state, mint_key, signature_policy(mint_key)).await
    }

    /// Replays the ledger into an empty `state` before returning, then keeps
    /// following the ledger in the background.
    pub async fn with_checker(
        chain: Arc<dyn ChainDb>,
        state: Arc<dyn StateDb>,
        mint_key: VerifyingKey,
        checker: Arc<TxChecker>,
    ) -> Result<Arc<Self>, ChainError> {
        // a pre-populated state is taken as already reflecting the ledger
        let applied = match state.kitty_count() {
            0 => 0,
            _ => chain.len().await,
        };
        let bc = Arc::new(BlockChain {
            chain,
            state,
            mint_key,
            checker,
            applied: Mutex::new(applied),
            sync: StdMutex::new(None),
        });

        let replayed = bc.catch_up().await?;
        info!(entries = replayed, kitties = bc.state.kitty_count(), "state replayed from ledger");

        if let Some(notifications) = bc.chain.take_notifications() {
            let task = tokio::spawn(sync_loop(Arc::downgrade(&bc), notifications));
            *bc.sync.lock().unwrap_or_else(|p| p.into_inner()) = Some(task);
        }
        Ok(bc)
    }

    pub fn checker(&self) -> Arc<TxChecker> {
        self.checker.clone()
    }

    pub fn chain(&self) -> &Arc<dyn ChainDb> {
        &self.chain
    }

    /// Validates `tx` against the current owner chain and appends it.
    pub async fn inject(&self, tx: Transaction) -> Result<Wrapper, ChainError> {
        let mut applied = self.applied.lock().await;
        self.fold_pending(&mut applied).await?;

        let prev = match self.state.get_kitty_unspent_tx(tx.kitty_id) {
            Some(hash) => Some(self.chain.get_tx_of_hash(&hash).await?.tx),
            None => None,
        };
        tx.verify_with(prev.as_ref(), &self.mint_key)?;
        (self.checker)(&tx)?;

        let stored = self.chain.add_tx(Wrapper::new(tx, 0), &*self.checker).await?;
        self.fold_pending(&mut applied).await?;

        info!(
            tx_hash = %stored.tx.hash(),
            tx_seq = stored.meta.seq,
            kitty_id = stored.tx.kitty_id,
            "transaction injected"
        );
        Ok(stored)
    }

    /// Folds every ledger entry not yet applied into state. Returns how many
    /// entries were folded.
    pub async fn catch_up(&self) -> Result<u64, ChainError> {
        let mut applied = self.applied.lock().await;
        self.fold_pending(&mut applied).await
    }

    async fn fold_pending(&self, applied: &mut u64) -> Result<u64, ChainError> {
        let start = *applied;
        let len = self.chain.len().await;
        while *applied < len {
            let page = self.chain.get_txs_of_seq_range(*applied, REPLAY_PAGE).await?;
            if page.is_empty() {
                break;
            }
            for wrapper in page {
                if let Err(e) = self.apply(&wrapper.tx) {
                    warn!(tx_seq = wrapper.meta.seq, error = %e, "ledger entry not applicable to state");
                }
                *applied += 1;
            }
        }
        Ok(*applied - start)
    }

    fn apply(&self, tx: &Transaction) -> Result<(), ChainError> {
        let hash = tx.hash();
        if tx.is_mint(&self.mint_key) {
            self.state.add_kitty(hash, tx.kitty_id, tx.to)?;
        } else {
            self.state.move_kitty(hash, tx.kitty_id, tx.from, tx.to)?;
        }
        Ok(())
    }

    pub fn get_kitty_state(&self, kitty_id: KittyId) -> Option<KittyState> {
        self.state.get_kitty_state(kitty_id)
    }

    pub fn get_address_state(&self, address: &Address) -> AddressState {
        self.state.get_address_state(address)
    }

    pub async fn get_tx_of_hash(&self, hash: &TxHash) -> Result<Wrapper, ChainError> {
        self.chain.get_tx_of_hash(hash).await
    }

    pub async fn get_tx_of_seq(&self, seq: u64) -> Result<Wrapper, ChainError> {
        self.chain.get_tx_of_seq(seq).await
    }

    pub async fn get_txs_of_seq_range(&self, start: u64, page_size: u64) -> Result<Vec<Wrapper>, ChainError> {
        self.chain.get_txs_of_seq_range(start, page_size).await
    }

    pub async fn head(&self) -> Result<Wrapper, ChainError> {
        self.chain.head().await
    }

    pub async fn len(&self) -> u64 {
        self.chain.len().await
    }

    /// Entries folded into state so far.
    pub async fn applied(&self) -> u64 {
        *self.applied.lock().await
    }

    pub fn status(&self) -> Status {
        self.chain.status()
    }

    pub fn reconnect(&self) -> bool {
        self.chain.reconnect()
    }

    /// Stops following the ledger and closes the store.
    pub async fn close(&self) {
        let sync = self.sync.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(task) = sync {
            task.abort();
            let _ = task.await;
        }
        self.chain.close().await;
    }
}

async fn sync_loop(bc: Weak<BlockChain>, mut notifications: mpsc::Receiver<Wrapper>) {
    let mut tick = tokio::time::interval(SYNC_INTERVAL);
    loop {
        tokio::select! {
            note = notifications.recv() => {
                if note.is_none() {
                    break;
                }
                while notifications.try_recv().is_ok() {}
            }
            _ = tick.tick() => {}
        }
        let Some(bc) = bc.upgrade() else { break };
        match bc.catch_up().await {
            Ok(0) => {}
            Ok(n) => debug!(entries = n, "state caught up"),
            Err(e) => warn!(error = %e, "catching up with ledger failed"),
        }
    }
}
