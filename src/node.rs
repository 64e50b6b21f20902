use crate::{
    blockchain::BlockChain,
    chaindb::open_chain,
    config::{NodeConfig, TestMode},
    crypto::secret_key_from_hex,
    state::MemoryState,
    transaction::{Transaction, signature_policy},
};
#[cfg(feature = "gateway")]
use crate::{
    config::GatewayState,
    handlers::{connectivity_router, gateway_router},
};

use anyhow::{Context, Result, bail};
use ed25519_dalek::VerifyingKey;
use std::sync::Arc;
use tracing::{debug, info};

/// Config → ledger store → orchestrator, with test kitties minted if asked.
pub async fn start(cfg: &mut NodeConfig) -> Result<Arc<BlockChain>> {
    let authority = cfg.chain.process()?;
    let mint_key = cfg.mint_key()?;
    if mint_key == authority.public_key {
        bail!("`tx_public_key` must differ from `master_root_pk`");
    }
    let checker = signature_policy(mint_key);

    let chain = open_chain(&cfg.chain, &authority, checker.clone()).await?;
    if cfg.chain.init {
        chain.bootstrap_ledger().await.context("bootstrapping ledger")?;
    }

    let state = Arc::new(MemoryState::new());
    let bc = BlockChain::with_checker(chain, state, mint_key, checker)
        .await
        .context("replaying ledger into state")?;

    if let Some(test) = &cfg.test_mode {
        mint_test_kitties(&bc, test, &mint_key).await?;
    }
    Ok(bc)
}

pub async fn mint_test_kitties(bc: &BlockChain, test: &TestMode, mint_key: &VerifyingKey) -> Result<()> {
    let sk = secret_key_from_hex(&test.tx_secret_key).context("parsing `tx_secret_key`")?;
    if sk.verifying_key() != *mint_key {
        bail!("`tx_secret_key` does not pair with `tx_public_key`");
    }
    for kitty_id in 0..test.tx_count {
        let tx = Transaction::new_genesis(kitty_id, &sk);
        debug!(%tx, "test: injecting");
        bc.inject(tx)
            .await
            .with_context(|| format!("minting test kitty {}", kitty_id))?;
    }
    info!(count = test.tx_count, "test kitties minted");
    Ok(())
}

/// Serves the gateway (and connectivity endpoints when configured) until
/// ctrl-c, then closes the ledger.
#[cfg(feature = "gateway")]
pub async fn serve(cfg: &NodeConfig, bc: Arc<BlockChain>, with_inject: bool) -> Result<()> {
    let state = GatewayState { chain: bc.clone() };
    let mut servers = Vec::new();

    if let Some(addr) = &cfg.chain.rpc_address {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding rpc address `{}`", addr))?;
        info!(%addr, "connectivity endpoints listening");
        let app = connectivity_router(state.clone());
        servers.push(tokio::spawn(async move { axum::serve(listener, app).await }));
    }

    if let Some(addr) = &cfg.gateway_listen {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding gateway address `{}`", addr))?;
        info!(%addr, inject = with_inject, "gateway listening");
        let app = gateway_router(state, with_inject);
        servers.push(tokio::spawn(async move { axum::serve(listener, app).await }));
    }

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutting down");

    for server in servers {
        server.abort();
    }
    bc.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Backend, crypto::keypair_from_seed};

    fn memory_cfg(test_count: u64) -> NodeConfig {
        let (root_pk, root_sk) = keypair_from_seed(b"root seed");
        let (tx_pk, tx_sk) = keypair_from_seed(b"genesis seed");
        let s = format!(
            r#"
tx_public_key = "{}"

[chain]
backend = "memory"
master = true
master_root_pk = "{}"
master_root_sk = "{}"
nonce = 1

[test_mode]
tx_count = {}
tx_secret_key = "{}"
"#,
            hex::encode(tx_pk.to_bytes()),
            hex::encode(root_pk.to_bytes()),
            hex::encode(root_sk.to_bytes()),
            test_count,
            hex::encode(tx_sk.to_bytes()),
        );
        NodeConfig::parse(&s).unwrap()
    }

    #[tokio::test]
    async fn test_mode_mints_kitties() {
        let mut cfg = memory_cfg(5);
        assert_eq!(cfg.chain.backend, Backend::Memory);
        assert!(cfg.chain.memory && cfg.chain.init);

        let bc = start(&mut cfg).await.unwrap();
        assert_eq!(bc.len().await, 5);
        let (tx_pk, _) = keypair_from_seed(b"genesis seed");
        let owner = crate::crypto::Address::from_public_key(&tx_pk);
        assert_eq!(bc.get_address_state(&owner).kitties.as_slice(), &[0, 1, 2, 3, 4]);
        bc.close().await;
    }

    #[tokio::test]
    async fn test_mode_rejects_unpaired_secret() {
        let mut cfg = memory_cfg(1);
        let (_, other) = keypair_from_seed(b"other");
        cfg.test_mode.as_mut().unwrap().tx_secret_key = hex::encode(other.to_bytes());
        assert!(start(&mut cfg).await.is_err());
    }
}
