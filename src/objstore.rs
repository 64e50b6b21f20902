//! Content-addressed object store holding the replicated ledger.
//!
//! Every object is keyed by the blake3 hash of its bytes. The ledger is a
//! Merkle tree of entry references: leaves hold up to [`PAGE_ENTRIES`]
//! (transaction, metadata) pairs, branches up to [`FANOUT`] child hashes. A
//! [`ContainerHead`] records the entry count, depth and top node, and a
//! signed [`Root`] per (public key, nonce) points at the current head.
//!
//! Appending rewrites only the nodes on the right-most path, so each new
//! version shares every completed subtree with the previous one.

use crate::{
    crypto::{self, Hash},
    error::StoreError,
};
use bincode::{
    config::standard,
    serde::{decode_from_slice, encode_to_vec},
};
use ed25519_dalek::{PUBLIC_KEY_LENGTH, Signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{
    collections::HashMap,
    sync::RwLock,
};

/// Entries per leaf page.
pub const PAGE_ENTRIES: usize = 256;
/// Children per branch node.
pub const FANOUT: usize = 64;

/// Object references of one ledger entry. Transaction and metadata refs
/// always travel together.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryRef {
    pub tx: Hash,
    pub meta: Hash,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefNode {
    Leaf(Vec<EntryRef>),
    Branch(Vec<Hash>),
}

/// The object a root points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerHead {
    pub len: u64,
    pub depth: u32,
    pub top: Hash,
}

/// Entries a subtree of `depth` can hold.
pub fn span(depth: u32) -> u64 {
    (0..depth).fold(PAGE_ENTRIES as u64, |acc, _| acc.saturating_mul(FANOUT as u64))
}

impl ContainerHead {
    /// Writes the empty leaf and returns a head pointing at it.
    pub fn empty(store: &dyn ObjectStore) -> Result<Self, StoreError> {
        let top = put_value(store, &RefNode::Leaf(Vec::new()))?;
        Ok(ContainerHead { len: 0, depth: 0, top })
    }

    /// Persists the path to a new last entry and returns the new head.
    pub fn append(&self, store: &dyn ObjectStore, entry: EntryRef) -> Result<Self, StoreError> {
        let (mut top, mut depth) = (self.top, self.depth);
        if self.len == span(depth) {
            top = put_value(store, &RefNode::Branch(vec![top]))?;
            depth += 1;
        }
        let top = insert(store, Some(&top), depth, self.len, entry)?;
        Ok(ContainerHead {
            len: self.len + 1,
            depth,
            top,
        })
    }

    /// Entry refs from `from` to the end, read from the local store.
    pub fn collect(&self, store: &dyn ObjectStore, from: u64) -> Result<Vec<EntryRef>, StoreError> {
        let mut out = Vec::with_capacity(self.len.saturating_sub(from) as usize);
        collect_node(store, &self.top, self.depth, 0, from, &mut out)?;
        if out.len() as u64 != self.len.saturating_sub(from) {
            return Err(StoreError::CorruptNode(self.top));
        }
        Ok(out)
    }
}

pub fn load_node(store: &dyn ObjectStore, hash: &Hash) -> Result<RefNode, StoreError> {
    get_value(store, hash)?.ok_or(StoreError::MissingNode(*hash))
}

fn insert(
    store: &dyn ObjectStore,
    node: Option<&Hash>,
    depth: u32,
    index: u64,
    entry: EntryRef,
) -> Result<Hash, StoreError> {
    let mut current = match node {
        Some(h) => load_node(store, h)?,
        None if depth == 0 => RefNode::Leaf(Vec::new()),
        None => RefNode::Branch(Vec::new()),
    };
    match (&mut current, depth) {
        (RefNode::Leaf(entries), 0) if entries.len() as u64 == index => entries.push(entry),
        (RefNode::Branch(children), d) if d > 0 => {
            let child_span = span(d - 1);
            let slot = (index / child_span) as usize;
            let child = insert(store, children.get(slot), d - 1, index % child_span, entry)?;
            match slot.cmp(&children.len()) {
                std::cmp::Ordering::Less => children[slot] = child,
                std::cmp::Ordering::Equal => children.push(child),
                std::cmp::Ordering::Greater => return Err(StoreError::CorruptNode(child)),
            }
        }
        _ => return Err(StoreError::CorruptNode(node.copied().unwrap_or_default())),
    }
    put_value(store, &current)
}

fn collect_node(
    store: &dyn ObjectStore,
    hash: &Hash,
    depth: u32,
    start: u64,
    from: u64,
    out: &mut Vec<EntryRef>,
) -> Result<(), StoreError> {
    match (load_node(store, hash)?, depth) {
        (RefNode::Leaf(entries), 0) => {
            let skip = from.saturating_sub(start) as usize;
            out.extend(entries.into_iter().skip(skip));
        }
        (RefNode::Branch(children), d) if d > 0 => {
            let child_span = span(d - 1);
            for (i, child) in children.iter().enumerate() {
                let child_start = start + i as u64 * child_span;
                if child_start.saturating_add(child_span) > from {
                    collect_node(store, child, d - 1, child_start, from, out)?;
                }
            }
        }
        _ => return Err(StoreError::CorruptNode(*hash)),
    }
    Ok(())
}

/// Materialized ledger: the persisted head plus every entry ref, in order.
#[derive(Clone, Debug, Default)]
pub struct Container {
    pub head: Option<ContainerHead>,
    pub entries: Vec<EntryRef>,
}

impl Container {
    pub fn len(&self) -> u64 {
        self.entries.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Versioned, signed pointer to the current [`ContainerHead`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Root {
    pub public_key: [u8; PUBLIC_KEY_LENGTH],
    pub nonce: u64,
    pub seq: u64,
    pub refs: Vec<Hash>,
    pub sig: Signature,
}

#[derive(Serialize)]
struct RootBody<'a> {
    public_key: &'a [u8; PUBLIC_KEY_LENGTH],
    nonce: u64,
    seq: u64,
    refs: &'a [Hash],
}

impl Root {
    pub fn new_signed(sk: &SigningKey, nonce: u64, seq: u64, refs: Vec<Hash>) -> Self {
        let mut root = Root {
            public_key: sk.verifying_key().to_bytes(),
            nonce,
            seq,
            refs,
            sig: Signature::from_bytes(&[0u8; 64]),
        };
        root.sig = crypto::sign_hash(&root.content_hash(), sk);
        root
    }

    pub fn content_hash(&self) -> Hash {
        let body = RootBody {
            public_key: &self.public_key,
            nonce: self.nonce,
            seq: self.seq,
            refs: &self.refs,
        };
        let bytes = encode_to_vec(&body, standard()).expect("bincode encode root body");
        crypto::hash_bytes(&bytes)
    }

    pub fn verify(&self, pk: &VerifyingKey) -> bool {
        pk.as_bytes() == &self.public_key
            && crypto::verify_hash(&self.content_hash(), &self.sig, pk).is_ok()
    }

    pub fn container_ref(&self) -> Result<Hash, StoreError> {
        self.refs.first().copied().ok_or(StoreError::CorruptRoot)
    }
}

/// Local persisted half of the object store. The network half lives behind
/// [`crate::net::Transport`].
pub trait ObjectStore: Send + Sync {
    fn get(&self, hash: &Hash) -> Result<Option<Vec<u8>>, StoreError>;

    /// Stores `bytes` under their content hash and returns it.
    fn put(&self, bytes: &[u8]) -> Result<Hash, StoreError>;

    fn contains(&self, hash: &Hash) -> Result<bool, StoreError> {
        Ok(self.get(hash)?.is_some())
    }

    fn last_root(&self, pk: &VerifyingKey, nonce: u64) -> Result<Option<Root>, StoreError>;

    /// Replaces the last root of (root.public_key, root.nonce) and flushes.
    fn save_root(&self, root: &Root) -> Result<(), StoreError>;
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    Ok(encode_to_vec(value, standard())?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    let (value, _) = decode_from_slice(bytes, standard())?;
    Ok(value)
}

pub fn get_value<T: DeserializeOwned>(
    store: &dyn ObjectStore,
    hash: &Hash,
) -> Result<Option<T>, StoreError> {
    match store.get(hash)? {
        Some(raw) => Ok(Some(decode(&raw)?)),
        None => Ok(None),
    }
}

pub fn put_value<T: Serialize>(store: &dyn ObjectStore, value: &T) -> Result<Hash, StoreError> {
    store.put(&encode(value)?)
}

pub(crate) fn root_key(public_key: &[u8; PUBLIC_KEY_LENGTH], nonce: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(PUBLIC_KEY_LENGTH + 8);
    key.extend_from_slice(public_key);
    key.extend_from_slice(&nonce.to_be_bytes());
    key
}

/// Volatile store for memory mode and tests.
#[derive(Default)]
pub struct MemoryObjects {
    objects: RwLock<HashMap<Hash, Vec<u8>>>,
    roots: RwLock<HashMap<Vec<u8>, Root>>,
}

impl MemoryObjects {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ObjectStore for MemoryObjects {
    fn get(&self, hash: &Hash) -> Result<Option<Vec<u8>>, StoreError> {
        let objects = self.objects.read().unwrap_or_else(|p| p.into_inner());
        Ok(objects.get(hash).cloned())
    }

    fn put(&self, bytes: &[u8]) -> Result<Hash, StoreError> {
        let hash = crypto::hash_bytes(bytes);
        let mut objects = self.objects.write().unwrap_or_else(|p| p.into_inner());
        objects.entry(hash).or_insert_with(|| bytes.to_vec());
        Ok(hash)
    }

    fn last_root(&self, pk: &VerifyingKey, nonce: u64) -> Result<Option<Root>, StoreError> {
        let roots = self.roots.read().unwrap_or_else(|p| p.into_inner());
        Ok(roots.get(&root_key(pk.as_bytes(), nonce)).cloned())
    }

    fn save_root(&self, root: &Root) -> Result<(), StoreError> {
        let mut roots = self.roots.write().unwrap_or_else(|p| p.into_inner());
        roots.insert(root_key(&root.public_key, root.nonce), root.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keypair_from_seed;

    #[test]
    fn objects_are_content_addressed() {
        let store = MemoryObjects::new();
        let h = store.put(b"hello").unwrap();
        assert_eq!(h, crypto::hash_bytes(b"hello"));
        assert_eq!(store.get(&h).unwrap().as_deref(), Some(&b"hello"[..]));
        assert!(!store.contains(&crypto::hash_bytes(b"other")).unwrap());
    }

    #[test]
    fn root_signature_binds_content() {
        let (pk, sk) = keypair_from_seed(b"root seed");
        let (other, _) = keypair_from_seed(b"other");
        let mut root = Root::new_signed(&sk, 12345, 1, vec![crypto::hash_bytes(b"c")]);
        assert!(root.verify(&pk));
        assert!(!root.verify(&other));

        root.seq = 2;
        assert!(!root.verify(&pk));
    }

    #[test]
    fn roots_are_keyed_by_public_key_and_nonce() {
        let (pk, sk) = keypair_from_seed(b"root seed");
        let store = MemoryObjects::new();
        let root = Root::new_signed(&sk, 7, 0, vec![crypto::hash_bytes(b"c")]);
        store.save_root(&root).unwrap();
        assert_eq!(store.last_root(&pk, 7).unwrap(), Some(root));
        assert_eq!(store.last_root(&pk, 8).unwrap(), None);
    }

    fn entry(i: u64) -> EntryRef {
        EntryRef {
            tx: crypto::hash_bytes(&i.to_be_bytes()),
            meta: crypto::hash_bytes(&(i + 1_000_000).to_be_bytes()),
        }
    }

    /// Store wrapper counting the bytes of every `put`.
    #[derive(Default)]
    struct Counting {
        inner: MemoryObjects,
        written: std::sync::atomic::AtomicUsize,
    }

    impl ObjectStore for Counting {
        fn get(&self, hash: &Hash) -> Result<Option<Vec<u8>>, StoreError> {
            self.inner.get(hash)
        }
        fn put(&self, bytes: &[u8]) -> Result<Hash, StoreError> {
            self.written
                .fetch_add(bytes.len(), std::sync::atomic::Ordering::SeqCst);
            self.inner.put(bytes)
        }
        fn last_root(&self, pk: &VerifyingKey, nonce: u64) -> Result<Option<Root>, StoreError> {
            self.inner.last_root(pk, nonce)
        }
        fn save_root(&self, root: &Root) -> Result<(), StoreError> {
            self.inner.save_root(root)
        }
    }

    #[test]
    fn appended_entries_read_back_in_order() {
        let store = MemoryObjects::new();
        let mut head = ContainerHead::empty(&store).unwrap();
        let n = (PAGE_ENTRIES * 3 + 7) as u64;
        for i in 0..n {
            head = head.append(&store, entry(i)).unwrap();
        }
        assert_eq!(head.len, n);
        assert_eq!(head.depth, 1);

        let all = head.collect(&store, 0).unwrap();
        assert_eq!(all.len() as u64, n);
        assert!(all.iter().enumerate().all(|(i, e)| *e == entry(i as u64)));

        let tail = head.collect(&store, n - 10).unwrap();
        assert_eq!(tail, all[(n - 10) as usize..]);
        assert!(head.collect(&store, n).unwrap().is_empty());
    }

    #[test]
    fn tree_grows_a_level_when_full() {
        let store = MemoryObjects::new();
        let mut head = ContainerHead::empty(&store).unwrap();
        for i in 0..PAGE_ENTRIES as u64 {
            head = head.append(&store, entry(i)).unwrap();
        }
        assert_eq!(head.depth, 0);
        head = head.append(&store, entry(PAGE_ENTRIES as u64)).unwrap();
        assert_eq!(head.depth, 1);
        assert_eq!(span(1), (PAGE_ENTRIES * FANOUT) as u64);
    }

    #[test]
    fn append_cost_stays_bounded() {
        let store = Counting::default();
        let mut head = ContainerHead::empty(&store).unwrap();
        for i in 0..(PAGE_ENTRIES * 4) as u64 {
            head = head.append(&store, entry(i)).unwrap();
        }
        let before = store.written.load(std::sync::atomic::Ordering::SeqCst);
        head.append(&store, entry(head.len)).unwrap();
        let one_append = store.written.load(std::sync::atomic::Ordering::SeqCst) - before;

        // a fresh leaf plus one branch, nowhere near the whole ledger
        let whole_ledger = head.len as usize * 64;
        assert!(one_append < 4 * 1024, "append wrote {} B", one_append);
        assert!(one_append * 4 < whole_ledger);
    }

    #[test]
    fn unchanged_subtrees_are_shared_between_versions() {
        let store = MemoryObjects::new();
        let mut head = ContainerHead::empty(&store).unwrap();
        for i in 0..(PAGE_ENTRIES * 2) as u64 {
            head = head.append(&store, entry(i)).unwrap();
        }
        let next = head.append(&store, entry(head.len)).unwrap();

        let (RefNode::Branch(old), RefNode::Branch(new)) =
            (load_node(&store, &head.top).unwrap(), load_node(&store, &next.top).unwrap())
        else {
            panic!("expected branch tops");
        };
        assert_eq!(old[..], new[..old.len()]);
        assert_eq!(new.len(), old.len() + 1);
    }
}
