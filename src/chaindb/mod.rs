//! Ledger store: the append-only sequence of [`Wrapper`] entries.
//!
//! [`ChainDb`] is implemented by the replicated store ([`CxoChain`]), a plain
//! in-process store ([`MemoryChain`]) and a placeholder that refuses every
//! operation ([`DisabledChain`]). [`open_chain`] picks one from config.
//!
//! Notifications are best-effort: each appended entry is offered once to the
//! channel returned by [`ChainDb::take_notifications`] and dropped if the
//! channel is full. Consumers that need every entry read them back by seq.

mod disabled;
mod memory;
mod replicated;

pub use disabled::DisabledChain;
pub use memory::MemoryChain;
pub use replicated::CxoChain;

use crate::{
    config::{Authority, Backend, ChainConfig},
    error::ChainError,
    net::{
        Feed, Status,
        tcp::{TcpConfig, TcpTransport},
    },
    objstore::{MemoryObjects, ObjectStore},
    transaction::{TxChecker, TxHash, Wrapper},
};
use anyhow::Context;
use async_trait::async_trait;
use std::{ops::Range, sync::Arc};
use tokio::sync::mpsc;

/// Capacity of the public notification channel.
pub const NOTIFY_CAPACITY: usize = 256;

#[async_trait]
pub trait ChainDb: Send + Sync {
    /// Last entry, `NoEntries` on an empty ledger.
    async fn head(&self) -> Result<Wrapper, ChainError>;

    async fn len(&self) -> u64;

    /// Appends `wrapper` after running `check` on it. Only the authority may
    /// append; `meta.seq` is assigned here and the stored entry is returned.
    async fn add_tx(&self, wrapper: Wrapper, check: &TxChecker) -> Result<Wrapper, ChainError>;

    async fn get_tx_of_hash(&self, hash: &TxHash) -> Result<Wrapper, ChainError>;

    async fn get_tx_of_seq(&self, seq: u64) -> Result<Wrapper, ChainError>;

    /// Up to `page_size` entries starting at `start`, clamped to the ledger end.
    async fn get_txs_of_seq_range(&self, start: u64, page_size: u64) -> Result<Vec<Wrapper>, ChainError>;

    /// Hands out the notification receiver; `None` after the first call.
    fn take_notifications(&self) -> Option<mpsc::Receiver<Wrapper>>;

    /// Creates the empty ledger if none exists yet. Authority only.
    async fn bootstrap_ledger(&self) -> Result<(), ChainError>;

    fn is_authority(&self) -> bool;

    fn status(&self) -> Status {
        Status::Unknown
    }

    fn reconnect(&self) -> bool {
        false
    }

    async fn close(&self);
}

/// Resolves a page request against a ledger of `len` entries.
pub(crate) fn page_range(start: u64, page_size: u64, len: u64) -> Result<Range<u64>, ChainError> {
    if page_size == 0 {
        return Err(ChainError::InvalidPageSize(page_size));
    }
    if start >= len {
        return Err(ChainError::InvalidStartSeq(start));
    }
    let end = start.saturating_add(page_size).min(len);
    Ok(start..end)
}

/// Builds the ledger store selected by `cfg.backend`. `checker` is applied to
/// every entry before it is appended or accepted from the authority.
pub async fn open_chain(
    cfg: &ChainConfig,
    authority: &Authority,
    checker: Arc<TxChecker>,
) -> anyhow::Result<Arc<dyn ChainDb>> {
    match cfg.backend {
        Backend::Disabled => {
            tracing::warn!("ledger backend disabled");
            Ok(Arc::new(DisabledChain))
        }
        Backend::Memory => Ok(Arc::new(MemoryChain::new())),
        Backend::Replicated => {
            let objects = open_objects(cfg)?;
            let feed = Feed {
                public_key: authority.public_key.to_bytes(),
                nonce: authority.nonce,
            };
            let (transport, events) = TcpTransport::start(
                TcpConfig {
                    listen: cfg.listen.clone(),
                    discovery: cfg.discovery.clone(),
                    feed,
                },
                objects.clone(),
            )
            .await
            .context("starting object store transport")?;

            let chain = CxoChain::open(authority.clone(), objects, transport, events, checker)
                .await
                .context("restoring ledger from object store")?;
            Ok(chain)
        }
    }
}

#[cfg(feature = "sled")]
fn open_objects(cfg: &ChainConfig) -> anyhow::Result<Arc<dyn ObjectStore>> {
    match (&cfg.dir, cfg.memory) {
        (Some(dir), false) => Ok(Arc::new(crate::storage::SledObjects::open(dir)?)),
        _ => Ok(Arc::new(MemoryObjects::new())),
    }
}

#[cfg(not(feature = "sled"))]
fn open_objects(cfg: &ChainConfig) -> anyhow::Result<Arc<dyn ObjectStore>> {
    if cfg.dir.is_some() && !cfg.memory {
        anyhow::bail!("persistent ledger requires the `sled` feature");
    }
    Ok(Arc::new(MemoryObjects::new()))
}
