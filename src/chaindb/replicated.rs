//! Ledger replicated through the content-addressed object store.
//!
//! The authority appends entries by writing the transaction and its metadata
//! as objects, extending the ref tree (see [`objstore`]) and signing a new
//! [`Root`] that points at the new [`ContainerHead`]. Followers validate
//! every advertised root, pull the tree nodes and entry objects they lack,
//! re-run the acceptance checker on the new entries and only then adopt the
//! root.
//!
//! Transitions:
//! * `on_root_advertised`: provenance checks, then pull and fill.
//! * `pull_missing`: fetch the head, the changed tree nodes and the new entry
//!   objects from peers. Runs without the ledger lock.
//! * `on_root_filled`: Δ = remote − local. Δ < 0 drops the advertisement,
//!   Δ = 0 is a no-op, Δ > 0 validates and adopts `[local, remote)`.
//! * `add_tx`: the authority's append.

use super::{ChainDb, NOTIFY_CAPACITY, page_range};
use crate::{
    config::Authority,
    crypto::{self, Hash},
    error::{ChainError, ReplicationError},
    net::{NetEvent, Status, Transport},
    objstore::{self, Container, ContainerHead, EntryRef, ObjectStore, RefNode, Root},
    transaction::{Transaction, TxChecker, TxHash, TxMeta, Wrapper},
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex as StdMutex, Weak};
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

const RECEIVED_CAPACITY: usize = 1024;
// entry objects requested per fetch while filling a root
const PULL_BATCH: usize = 512;
// tree nodes per fetch; a full leaf is ~16 KiB
const NODE_BATCH: usize = 64;

struct Ledger {
    root: Option<Root>,
    container: Container,
    // internal hand-off to the tx service; taken on close
    received: Option<mpsc::Sender<Wrapper>>,
}

impl Ledger {
    fn is_newer(&self, root: &Root) -> bool {
        self.root.as_ref().is_none_or(|cur| root.seq > cur.seq)
    }
}

// Objects of an advertised root, all held locally. `entries` covers
// `[local, head.len)` for the local length the pull was made against.
struct Fill {
    head: ContainerHead,
    entries: Vec<EntryRef>,
}

pub struct CxoChain {
    authority: Authority,
    objects: Arc<dyn ObjectStore>,
    transport: Arc<dyn Transport>,
    checker: Arc<TxChecker>,
    ledger: Mutex<Ledger>,
    notifications: StdMutex<Option<mpsc::Receiver<Wrapper>>>,
    replication: StdMutex<Option<JoinHandle<()>>>,
    service: StdMutex<Option<JoinHandle<()>>>,
}

impl CxoChain {
    /// Restores the ledger from the last persisted root of the authority's
    /// (public key, nonce) and starts consuming `events`.
    pub async fn open(
        authority: Authority,
        objects: Arc<dyn ObjectStore>,
        transport: Arc<dyn Transport>,
        events: mpsc::UnboundedReceiver<NetEvent>,
        checker: Arc<TxChecker>,
    ) -> Result<Arc<Self>, ChainError> {
        let (root, container) = restore(&*objects, &authority)?;

        let (received_tx, received_rx) = mpsc::channel(RECEIVED_CAPACITY);
        let (accepted_tx, accepted_rx) = mpsc::channel(NOTIFY_CAPACITY);
        let service = tokio::spawn(tx_service(received_rx, accepted_tx));

        let chain = Arc::new(CxoChain {
            authority,
            objects,
            transport,
            checker,
            ledger: Mutex::new(Ledger {
                root,
                container,
                received: Some(received_tx),
            }),
            notifications: StdMutex::new(Some(accepted_rx)),
            replication: StdMutex::new(None),
            service: StdMutex::new(Some(service)),
        });

        let replication = tokio::spawn(replication_loop(Arc::downgrade(&chain), events));
        *chain.replication.lock().unwrap_or_else(|p| p.into_inner()) = Some(replication);
        Ok(chain)
    }

    /// Sequence number of the current root, `None` before bootstrap.
    pub async fn root_seq(&self) -> Option<u64> {
        self.ledger.lock().await.root.as_ref().map(|r| r.seq)
    }

    fn validate_root(&self, root: &Root) -> Result<(), ReplicationError> {
        if root.public_key != self.authority.public_key.to_bytes() {
            return Err(ReplicationError::UntrustedKey);
        }
        if root.nonce != self.authority.nonce {
            return Err(ReplicationError::NonceMismatch {
                expected: self.authority.nonce,
                got: root.nonce,
            });
        }
        if root.refs.is_empty() {
            return Err(ReplicationError::EmptyRefs);
        }
        if !root.verify(&self.authority.public_key) {
            return Err(ReplicationError::BadSignature);
        }
        Ok(())
    }

    /// Handles a root received from a peer. Returns the number of entries
    /// adopted.
    pub async fn on_root_advertised(&self, root: Root) -> Result<u64, ChainError> {
        if self.is_authority() {
            // the authority is the only writer of its own feed
            return Ok(0);
        }
        self.validate_root(&root)?;

        loop {
            let local = {
                let ledger = self.ledger.lock().await;
                if !ledger.is_newer(&root) {
                    return Ok(0);
                }
                ledger.container.len()
            };
            let fill = self.pull_missing(&root, local).await?;

            let mut ledger = self.ledger.lock().await;
            if !ledger.is_newer(&root) {
                return Ok(0);
            }
            if ledger.container.len() == local {
                return self.on_root_filled(&mut ledger, root, fill).await;
            }
            debug!(root_seq = root.seq, "ledger moved during pull, refilling");
        }
    }

    async fn pull_missing(&self, root: &Root, local: u64) -> Result<Fill, ChainError> {
        let head_ref = root.container_ref()?;
        self.pull(&[head_ref]).await?;
        let head: ContainerHead = objstore::get_value(&*self.objects, &head_ref)?
            .ok_or(ReplicationError::MissingObject(head_ref))?;
        if head.len <= local {
            return Ok(Fill {
                head,
                entries: Vec::new(),
            });
        }

        let entries = self.pull_tree(&head, local).await?;
        if entries.len() as u64 != head.len - local {
            return Err(ReplicationError::CorruptObject(head_ref).into());
        }
        let wanted: Vec<Hash> = entries.iter().flat_map(|e| [e.tx, e.meta]).collect();
        for chunk in wanted.chunks(PULL_BATCH) {
            self.pull(chunk).await?;
        }
        Ok(Fill { head, entries })
    }

    // Walks the ref tree a level at a time, fetching only the nodes that
    // cover entries at or past `from`. Returns those entries in order.
    async fn pull_tree(&self, head: &ContainerHead, from: u64) -> Result<Vec<EntryRef>, ChainError> {
        let mut level = vec![(head.top, head.depth, 0u64)];
        let mut entries = Vec::new();
        while !level.is_empty() {
            let hashes: Vec<Hash> = level.iter().map(|(h, _, _)| *h).collect();
            for chunk in hashes.chunks(NODE_BATCH) {
                self.pull(chunk).await?;
            }

            let mut next = Vec::new();
            for (hash, depth, start) in level {
                match (objstore::load_node(&*self.objects, &hash)?, depth) {
                    (RefNode::Leaf(page), 0) => {
                        let skip = from.saturating_sub(start) as usize;
                        entries.extend(page.into_iter().skip(skip));
                    }
                    (RefNode::Branch(children), d) if d > 0 => {
                        let child_span = objstore::span(d - 1);
                        for (i, child) in children.into_iter().enumerate() {
                            let child_start = start.saturating_add((i as u64).saturating_mul(child_span));
                            // subtrees wholly below `from` are already held
                            if child_start.saturating_add(child_span) > from {
                                next.push((child, d - 1, child_start));
                            }
                        }
                    }
                    _ => return Err(ReplicationError::CorruptObject(hash).into()),
                }
            }
            level = next;
        }
        Ok(entries)
    }

    // Fetches the objects of `hashes` not yet held locally.
    async fn pull(&self, hashes: &[Hash]) -> Result<(), ChainError> {
        let mut missing = Vec::new();
        for h in hashes {
            if !self.objects.contains(h)? {
                missing.push(*h);
            }
        }
        if missing.is_empty() {
            return Ok(());
        }

        let objects = self.transport.fetch(&missing).await?;
        if objects.len() < missing.len() {
            return Err(ReplicationError::MissingObject(missing[objects.len()]).into());
        }
        for (h, raw) in missing.iter().zip(&objects) {
            if crypto::hash_bytes(raw) != *h {
                return Err(ReplicationError::CorruptObject(*h).into());
            }
        }
        for raw in &objects {
            self.objects.put(raw)?;
        }
        debug!(count = missing.len(), "objects pulled");
        Ok(())
    }

    async fn on_root_filled(&self, ledger: &mut Ledger, root: Root, fill: Fill) -> Result<u64, ChainError> {
        let local = ledger.container.len();
        let remote = fill.head.len;
        if remote < local {
            return Err(ReplicationError::Shrunk { local, remote }.into());
        }
        if remote == local {
            return Ok(0);
        }

        let mut accepted = Vec::with_capacity(fill.entries.len());
        for (seq, refs) in (local..remote).zip(&fill.entries) {
            let wrapper = self.read_refs(refs)?;
            (self.checker)(&wrapper.tx).map_err(|source| ReplicationError::Rejected { seq, source })?;
            accepted.push(wrapper);
        }

        self.objects.save_root(&root)?;
        info!(height = remote, root_seq = root.seq, "root accepted");
        // pass it on to anyone subscribed to us
        self.transport.publish(&root);
        ledger.root = Some(root);
        ledger.container.head = Some(fill.head);
        ledger.container.entries.extend(fill.entries);

        if let Some(received) = &ledger.received {
            for wrapper in accepted {
                if received.send(wrapper).await.is_err() {
                    debug!("tx service closed, notification dropped");
                    break;
                }
            }
        }
        Ok(remote - local)
    }

    fn read_entry(&self, container: &Container, seq: u64) -> Result<Wrapper, ChainError> {
        let refs = container
            .entries
            .get(seq as usize)
            .ok_or(ChainError::SeqNotFound(seq))?;
        self.read_refs(refs)
    }

    fn read_refs(&self, refs: &EntryRef) -> Result<Wrapper, ChainError> {
        let tx: Transaction = objstore::get_value(&*self.objects, &refs.tx)?
            .ok_or(ReplicationError::MissingObject(refs.tx))?;
        let meta: TxMeta = objstore::get_value(&*self.objects, &refs.meta)?
            .ok_or(ReplicationError::MissingObject(refs.meta))?;
        Ok(Wrapper { tx, meta })
    }
}

fn restore(objects: &dyn ObjectStore, authority: &Authority) -> Result<(Option<Root>, Container), ChainError> {
    let Some(root) = objects.last_root(&authority.public_key, authority.nonce)? else {
        debug!(nonce = authority.nonce, "no persisted root");
        return Ok((None, Container::default()));
    };
    if !root.verify(&authority.public_key) {
        return Err(ReplicationError::BadSignature.into());
    }
    let head_ref = root.container_ref()?;
    let head: ContainerHead = objstore::get_value(objects, &head_ref)?
        .ok_or(ReplicationError::MissingObject(head_ref))?;
    let entries = head.collect(objects, 0)?;

    info!(root_seq = root.seq, height = head.len, "ledger restored");
    Ok((
        Some(root),
        Container {
            head: Some(head),
            entries,
        },
    ))
}

// Forwards accepted entries, in order, to the public channel. A full or
// abandoned channel loses the entry.
async fn tx_service(mut received: mpsc::Receiver<Wrapper>, accepted: mpsc::Sender<Wrapper>) {
    while let Some(wrapper) = received.recv().await {
        if accepted.try_send(wrapper).is_err() {
            debug!("notification dropped");
        }
    }
}

async fn replication_loop(chain: Weak<CxoChain>, mut events: mpsc::UnboundedReceiver<NetEvent>) {
    while let Some(event) = events.recv().await {
        let Some(chain) = chain.upgrade() else { break };
        match event {
            NetEvent::RootAdvertised(root) => {
                let root_seq = root.seq;
                match chain.on_root_advertised(root).await {
                    Ok(0) => {}
                    Ok(n) => debug!(root_seq, new_entries = n, "ledger advanced"),
                    Err(e) => warn!(root_seq, error = %e, "root advertisement dropped"),
                }
            }
            NetEvent::PeerConnected(peer) => info!(%peer, "peer connected"),
            NetEvent::PeerDisconnected(peer) => info!(%peer, "peer disconnected"),
        }
    }
}

#[async_trait]
impl ChainDb for CxoChain {
    async fn head(&self) -> Result<Wrapper, ChainError> {
        let ledger = self.ledger.lock().await;
        match ledger.container.len() {
            0 => Err(ChainError::NoEntries),
            len => self.read_entry(&ledger.container, len - 1),
        }
    }

    async fn len(&self) -> u64 {
        self.ledger.lock().await.container.len()
    }

    async fn add_tx(&self, mut wrapper: Wrapper, check: &TxChecker) -> Result<Wrapper, ChainError> {
        let Some(sk) = &self.authority.secret_key else {
            return Err(ChainError::NotAuthority);
        };
        if let Err(e) = check(&wrapper.tx) {
            warn!(kitty_id = wrapper.tx.kitty_id, error = %e, "entry rejected");
            return Err(e.into());
        }

        let mut ledger = self.ledger.lock().await;
        let (Some(prev_seq), Some(head)) = (ledger.root.as_ref().map(|r| r.seq), ledger.container.head) else {
            return Err(ChainError::Uninitialized);
        };

        let seq = ledger.container.len();
        wrapper.meta.seq = seq;
        let entry = EntryRef {
            tx: self.objects.put(&wrapper.tx.encode())?,
            meta: self.objects.put(&wrapper.meta.encode())?,
        };
        let head = head.append(&*self.objects, entry)?;
        let head_ref = objstore::put_value(&*self.objects, &head)?;

        let root = Root::new_signed(sk, self.authority.nonce, prev_seq + 1, vec![head_ref]);
        self.objects.save_root(&root)?;
        self.transport.publish(&root);
        ledger.root = Some(root);
        ledger.container.head = Some(head);
        ledger.container.entries.push(entry);

        info!(tx_hash = %entry.tx, tx_seq = seq, kitty_id = wrapper.tx.kitty_id, "entry committed");
        if let Some(received) = &ledger.received {
            if received.send(wrapper.clone()).await.is_err() {
                debug!(tx_seq = seq, "tx service closed, notification dropped");
            }
        }
        Ok(wrapper)
    }

    async fn get_tx_of_hash(&self, hash: &TxHash) -> Result<Wrapper, ChainError> {
        let ledger = self.ledger.lock().await;
        let seq = ledger
            .container
            .entries
            .iter()
            .position(|e| e.tx == *hash)
            .ok_or(ChainError::TxNotFound(*hash))?;
        self.read_entry(&ledger.container, seq as u64)
    }

    async fn get_tx_of_seq(&self, seq: u64) -> Result<Wrapper, ChainError> {
        let ledger = self.ledger.lock().await;
        self.read_entry(&ledger.container, seq)
    }

    async fn get_txs_of_seq_range(&self, start: u64, page_size: u64) -> Result<Vec<Wrapper>, ChainError> {
        let ledger = self.ledger.lock().await;
        page_range(start, page_size, ledger.container.len())?
            .map(|seq| self.read_entry(&ledger.container, seq))
            .collect()
    }

    fn take_notifications(&self) -> Option<mpsc::Receiver<Wrapper>> {
        self.notifications.lock().unwrap_or_else(|p| p.into_inner()).take()
    }

    async fn bootstrap_ledger(&self) -> Result<(), ChainError> {
        let Some(sk) = &self.authority.secret_key else {
            return Err(ChainError::NotAuthority);
        };
        let mut ledger = self.ledger.lock().await;
        if ledger.root.is_some() {
            debug!("ledger already bootstrapped");
            return Ok(());
        }

        let head = ContainerHead::empty(&*self.objects)?;
        let head_ref = objstore::put_value(&*self.objects, &head)?;
        let root = Root::new_signed(sk, self.authority.nonce, 0, vec![head_ref]);
        self.objects.save_root(&root)?;
        self.transport.publish(&root);
        ledger.root = Some(root);
        ledger.container.head = Some(head);

        info!(nonce = self.authority.nonce, "ledger bootstrapped");
        Ok(())
    }

    fn is_authority(&self) -> bool {
        self.authority.secret_key.is_some()
    }

    fn status(&self) -> Status {
        self.transport.status()
    }

    fn reconnect(&self) -> bool {
        self.transport.reconnect()
    }

    async fn close(&self) {
        let replication = self.replication.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(task) = replication {
            task.abort();
            let _ = task.await;
        }

        // dropping the sender lets the service drain what is queued and exit
        self.ledger.lock().await.received.take();
        let service = self.service.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(task) = service {
            let _ = task.await;
        }

        self.transport.close().await;
        info!("ledger store closed");
    }
}
