use crate::{
    crypto::{self, Hash},
    error::StoreError,
    objstore::{self, ObjectStore, Root},
};

use anyhow::Context;
use ed25519_dalek::VerifyingKey;
use std::path::Path;

const OBJECTS_TREE: &str = "objects";
const ROOTS_TREE: &str = "roots";

/// Object store persisted in a sled database; its last root per
/// (public key, nonce) is the ledger's restart checkpoint.
pub struct SledObjects {
    db: sled::Db,
    objects: sled::Tree,
    roots: sled::Tree,
}

impl SledObjects {
    pub fn open(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating object store dir `{}`", dir.display()))?;
        let db = sled::open(dir)
            .with_context(|| format!("opening sled db at `{}`", dir.display()))?;
        let objects = db.open_tree(OBJECTS_TREE)
            .context("opening sled tree `objects`")?;
        let roots = db.open_tree(ROOTS_TREE)
            .context("opening sled tree `roots`")?;

        tracing::info!(
            path    = %dir.display(),
            objects = objects.len(),
            roots   = roots.len(),
            "object store opened"
        );
        Ok(Self { db, objects, roots })
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

impl ObjectStore for SledObjects {
    fn get(&self, hash: &Hash) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.objects.get(hash.0)?.map(|v| v.to_vec()))
    }

    fn put(&self, bytes: &[u8]) -> Result<Hash, StoreError> {
        let hash = crypto::hash_bytes(bytes);
        if !self.objects.contains_key(hash.0)? {
            self.objects.insert(hash.0, bytes)?;
        }
        Ok(hash)
    }

    fn contains(&self, hash: &Hash) -> Result<bool, StoreError> {
        Ok(self.objects.contains_key(hash.0)?)
    }

    fn last_root(&self, pk: &VerifyingKey, nonce: u64) -> Result<Option<Root>, StoreError> {
        match self.roots.get(objstore::root_key(pk.as_bytes(), nonce))? {
            Some(raw) => Ok(Some(objstore::decode(&raw)?)),
            None => Ok(None),
        }
    }

    fn save_root(&self, root: &Root) -> Result<(), StoreError> {
        let val = objstore::encode(root)?;
        self.roots.insert(objstore::root_key(&root.public_key, root.nonce), val)?;
        // objects written since the previous root become durable together with it
        self.flush()?;

        tracing::debug!(
            seq   = root.seq,
            nonce = root.nonce,
            "root persisted"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keypair_from_seed;
    use tempfile::tempdir;

    #[test]
    fn root_survives_reopen() {
        let dir = tempdir().unwrap();
        let (pk, sk) = keypair_from_seed(b"root seed");

        let h = {
            let store = SledObjects::open(dir.path()).unwrap();
            let h = store.put(b"payload").unwrap();
            store.save_root(&Root::new_signed(&sk, 1, 3, vec![h])).unwrap();
            h
        };

        let store = SledObjects::open(dir.path()).unwrap();
        let root = store.last_root(&pk, 1).unwrap().unwrap();
        assert_eq!(root.seq, 3);
        assert_eq!(root.refs, vec![h]);
        assert!(root.verify(&pk));
        assert_eq!(store.get(&h).unwrap().as_deref(), Some(&b"payload"[..]));
    }
}
