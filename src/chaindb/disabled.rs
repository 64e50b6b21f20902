use super::ChainDb;
use crate::{
    error::ChainError,
    transaction::{TxChecker, TxHash, Wrapper},
};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Ledger stand-in for nodes started without a chain. Checks still run on
/// submitted entries so callers see policy errors first.
pub struct DisabledChain;

#[async_trait]
impl ChainDb for DisabledChain {
    async fn head(&self) -> Result<Wrapper, ChainError> {
        Err(ChainError::Disabled)
    }

    async fn len(&self) -> u64 {
        0
    }

    async fn add_tx(&self, wrapper: Wrapper, check: &TxChecker) -> Result<Wrapper, ChainError> {
        check(&wrapper.tx)?;
        Err(ChainError::Disabled)
    }

    async fn get_tx_of_hash(&self, _hash: &TxHash) -> Result<Wrapper, ChainError> {
        Err(ChainError::Disabled)
    }

    async fn get_tx_of_seq(&self, _seq: u64) -> Result<Wrapper, ChainError> {
        Err(ChainError::Disabled)
    }

    async fn get_txs_of_seq_range(&self, _start: u64, _page_size: u64) -> Result<Vec<Wrapper>, ChainError> {
        Err(ChainError::Disabled)
    }

    fn take_notifications(&self) -> Option<mpsc::Receiver<Wrapper>> {
        None
    }

    async fn bootstrap_ledger(&self) -> Result<(), ChainError> {
        Err(ChainError::Disabled)
    }

    fn is_authority(&self) -> bool {
        false
    }

    async fn close(&self) {}
}
