#![allow(dead_code)]

use ed25519_dalek::{SigningKey, VerifyingKey};
use kitty_ledger::{
    chaindb::{ChainDb, CxoChain},
    config::Authority,
    crypto::{Address, keypair_from_seed},
    net::local::LocalNetwork,
    objstore::ObjectStore,
    transaction::signature_policy,
};
use std::{sync::Arc, time::Duration};

pub const NONCE: u64 = 12345;

pub fn root_keys() -> (VerifyingKey, SigningKey) {
    keypair_from_seed(b"root seed")
}

pub fn mint_keys() -> (VerifyingKey, SigningKey) {
    keypair_from_seed(b"genesis seed")
}

pub fn user(name: &str) -> (SigningKey, Address) {
    let (_, sk) = keypair_from_seed(name.as_bytes());
    let addr = Address::from_secret_key(&sk);
    (sk, addr)
}

pub fn authority(with_secret: bool) -> Authority {
    let (pk, sk) = root_keys();
    Authority {
        public_key: pk,
        secret_key: with_secret.then_some(sk),
        nonce: NONCE,
    }
}

pub async fn join(net: &LocalNetwork, objects: Arc<dyn ObjectStore>, with_secret: bool) -> Arc<CxoChain> {
    let (transport, events) = net.join(objects.clone());
    CxoChain::open(
        authority(with_secret),
        objects,
        transport,
        events,
        signature_policy(mint_keys().0),
    )
    .await
    .unwrap()
}

pub async fn wait_for_len(chain: &dyn ChainDb, want: u64) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while chain.len().await != want {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("ledger did not reach {} entries", want));
}
