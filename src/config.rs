use crate::crypto::{public_key_from_hex, secret_key_from_hex};
#[cfg(feature = "gateway")]
use crate::blockchain::BlockChain;

use anyhow::{Context, Result, bail};
use ed25519_dalek::{SigningKey, VerifyingKey};
use serde::Deserialize;
use std::{fs, path::PathBuf};
#[cfg(feature = "gateway")]
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Replicated,
    Memory,
    Disabled,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChainConfig {
    #[serde(default)]
    pub backend: Backend,
    pub dir: Option<PathBuf>,               // object store db, ex "/var/lib/kitty/cxo"
    #[serde(default)]
    pub memory: bool,                       // keep objects in memory only
    pub listen: Option<String>,             // object store transport, ex 0.0.0.0:8998
    pub rpc_address: Option<String>,        // connectivity endpoints, ex 127.0.0.1:8997
    #[serde(default)]
    pub discovery: Vec<String>,             // peers to dial
    #[serde(default)]
    pub master: bool,
    pub master_root_pk: String,             // hex
    pub master_root_sk: Option<String>,     // hex, authority only
    pub nonce: u64,
    #[serde(default)]
    pub init: bool,                         // bootstrap an empty ledger on start
}

/// Authority identity after key parsing.
#[derive(Clone, Debug)]
pub struct Authority {
    pub public_key: VerifyingKey,
    pub secret_key: Option<SigningKey>,
    pub nonce: u64,
}

impl ChainConfig {
    /// Parses and cross-checks the authority keys.
    pub fn process(&mut self) -> Result<Authority> {
        if self.memory {
            self.dir = None;
        }
        if self.init && !self.master {
            bail!("only a master node may `init` the ledger");
        }
        let public_key = public_key_from_hex(&self.master_root_pk)
            .context("parsing `master_root_pk`")?;

        let secret_key = match (&self.master_root_sk, self.master) {
            (Some(sk), true) => {
                let sk = secret_key_from_hex(sk).context("parsing `master_root_sk`")?;
                if sk.verifying_key() != public_key {
                    bail!("`master_root_sk` does not match `master_root_pk`");
                }
                Some(sk)
            }
            (None, true) => bail!("a master node requires `master_root_sk`"),
            (Some(_), false) => bail!("a non-master node must not be given `master_root_sk`"),
            (None, false) => None,
        };

        Ok(Authority {
            public_key,
            secret_key,
            nonce: self.nonce,
        })
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct TestMode {
    pub tx_count: u64,                      // kitties minted on start
    pub tx_secret_key: String,              // hex, must pair with `tx_public_key`
}

#[derive(Clone, Debug, Deserialize)]
pub struct NodeConfig {
    pub gateway_listen: Option<String>,     // ex 127.0.0.1:8080
    pub tx_public_key: String,              // hex, trusted minting key
    pub chain: ChainConfig,
    pub test_mode: Option<TestMode>,
}

impl NodeConfig {
    pub fn load(path: &str) -> Result<Self> {
        let s = fs::read_to_string(path)
            .with_context(|| format!("reading config file `{}`", path))?;
        Self::parse(&s).with_context(|| format!("parsing `{}` as TOML", path))
    }

    pub fn parse(s: &str) -> Result<Self> {
        let mut cfg: NodeConfig = toml::from_str(s)?;
        if cfg.test_mode.is_some() {
            // test ledgers are throwaway
            cfg.chain.memory = true;
            cfg.chain.init = true;
        }
        Ok(cfg)
    }

    pub fn mint_key(&self) -> Result<VerifyingKey> {
        public_key_from_hex(&self.tx_public_key).context("parsing `tx_public_key`")
    }
}

#[derive(Clone)]
#[cfg(feature = "gateway")]
pub struct GatewayState {
    pub chain: Arc<BlockChain>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keypair_from_seed;

    fn toml_for(master: bool, sk: Option<&SigningKey>) -> String {
        let (root_pk, _) = keypair_from_seed(b"root seed");
        let (tx_pk, _) = keypair_from_seed(b"genesis seed");
        let sk_line = sk
            .map(|sk| format!("master_root_sk = \"{}\"\n", hex::encode(sk.to_bytes())))
            .unwrap_or_default();
        format!(
            "tx_public_key = \"{}\"\n\n[chain]\nbackend = \"replicated\"\nmaster = {}\nmaster_root_pk = \"{}\"\n{}nonce = 12345\n",
            hex::encode(tx_pk.to_bytes()),
            master,
            hex::encode(root_pk.to_bytes()),
            sk_line,
        )
    }

    #[test]
    fn authority_keys_must_pair() {
        let (_, root_sk) = keypair_from_seed(b"root seed");
        let mut cfg = NodeConfig::parse(&toml_for(true, Some(&root_sk))).unwrap();
        let auth = cfg.chain.process().unwrap();
        assert!(auth.secret_key.is_some());
        assert_eq!(auth.nonce, 12345);

        let (_, other) = keypair_from_seed(b"other");
        let mut cfg = NodeConfig::parse(&toml_for(true, Some(&other))).unwrap();
        assert!(cfg.chain.process().is_err());
    }

    #[test]
    fn follower_must_not_hold_secret() {
        let (_, root_sk) = keypair_from_seed(b"root seed");
        let mut cfg = NodeConfig::parse(&toml_for(false, Some(&root_sk))).unwrap();
        assert!(cfg.chain.process().is_err());

        let mut cfg = NodeConfig::parse(&toml_for(false, None)).unwrap();
        assert!(cfg.chain.process().unwrap().secret_key.is_none());
        assert_eq!(cfg.chain.backend, Backend::Replicated);
    }
}
