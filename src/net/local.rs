//! In-process network: every joined node sees every other node's
//! advertisements and can pull from its object store.

use super::{NetEvent, Status, Transport};
use crate::{
    crypto::Hash,
    error::NetError,
    objstore::{ObjectStore, Root},
};
use async_trait::async_trait;
use std::{
    collections::BTreeMap,
    sync::{
        Arc, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::sync::mpsc;

struct LocalPeer {
    objects: Arc<dyn ObjectStore>,
    events: mpsc::UnboundedSender<NetEvent>,
}

#[derive(Clone, Default)]
pub struct LocalNetwork {
    peers: Arc<RwLock<BTreeMap<u64, LocalPeer>>>,
    next_id: Arc<AtomicU64>,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(
        &self,
        objects: Arc<dyn ObjectStore>,
    ) -> (Arc<LocalTransport>, mpsc::UnboundedReceiver<NetEvent>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (events, rx) = mpsc::unbounded_channel();
        self.peers
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(id, LocalPeer { objects, events });
        let transport = LocalTransport {
            id,
            network: self.clone(),
        };
        (Arc::new(transport), rx)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    fn leave(&self, id: u64) {
        self.peers
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&id);
    }
}

pub struct LocalTransport {
    id: u64,
    network: LocalNetwork,
}

#[async_trait]
impl Transport for LocalTransport {
    fn publish(&self, root: &Root) {
        let peers = self.network.peers.read().unwrap_or_else(|p| p.into_inner());
        for (id, peer) in peers.iter() {
            if *id != self.id {
                let _ = peer.events.send(NetEvent::RootAdvertised(root.clone()));
            }
        }
    }

    async fn fetch(&self, hashes: &[Hash]) -> Result<Vec<Vec<u8>>, NetError> {
        let peers = self.network.peers.read().unwrap_or_else(|p| p.into_inner());
        let mut out = Vec::with_capacity(hashes.len());
        'next: for hash in hashes {
            for (id, peer) in peers.iter() {
                if *id == self.id {
                    continue;
                }
                if let Ok(Some(raw)) = peer.objects.get(hash) {
                    out.push(raw);
                    continue 'next;
                }
            }
            return Err(NetError::NoPeers);
        }
        Ok(out)
    }

    fn status(&self) -> Status {
        if self.network.peer_count() > 1 {
            Status::Connected
        } else {
            Status::Disconnected
        }
    }

    fn reconnect(&self) -> bool {
        true
    }

    async fn close(&self) {
        self.network.leave(self.id);
    }
}

impl Drop for LocalTransport {
    fn drop(&mut self) {
        self.network.leave(self.id);
    }
}
