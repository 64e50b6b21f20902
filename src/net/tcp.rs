use super::{
    Feed, NetEvent, Status, Transport,
    framing::{Frame, read_frame, write_frame},
};
use crate::{
    crypto::Hash,
    error::NetError,
    objstore::{ObjectStore, Root},
};
use anyhow::Context;
use async_trait::async_trait;
use ed25519_dalek::VerifyingKey;
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{Notify, mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

const MIN_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub struct TcpConfig {
    pub listen: Option<String>,
    pub discovery: Vec<String>,
    pub feed: Feed,
}

struct Conn {
    peer: String,
    out: mpsc::UnboundedSender<Frame>,
    subscribed: bool,
}

struct Shared {
    feed: Feed,
    objects: Arc<dyn ObjectStore>,
    events: mpsc::UnboundedSender<NetEvent>,
    conns: Mutex<HashMap<u64, Conn>>,
    pending: Mutex<HashMap<u64, oneshot::Sender<Vec<Option<Vec<u8>>>>>>,
    next_id: AtomicU64,
    dialing: AtomicUsize,
    wake: Notify,
    closed: AtomicBool,
    // connection tasks of accepted sockets
    served: Mutex<Vec<JoinHandle<()>>>,
}

/// Object-store transport over TCP. Nodes listening on `listen` serve
/// objects and push roots to subscribers; nodes dial every `discovery`
/// address, subscribe to the feed and redial with exponential backoff.
pub struct TcpTransport {
    shared: Arc<Shared>,
    local_addr: Option<std::net::SocketAddr>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl TcpTransport {
    pub async fn start(
        cfg: TcpConfig,
        objects: Arc<dyn ObjectStore>,
    ) -> anyhow::Result<(Arc<Self>, mpsc::UnboundedReceiver<NetEvent>)> {
        let (events, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            feed: cfg.feed,
            objects,
            events,
            conns: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            dialing: AtomicUsize::new(0),
            wake: Notify::new(),
            closed: AtomicBool::new(false),
            served: Mutex::new(Vec::new()),
        });

        let mut tasks = Vec::new();
        let mut local_addr = None;

        if let Some(listen) = &cfg.listen {
            let listener = TcpListener::bind(listen)
                .await
                .with_context(|| format!("binding object store transport on `{}`", listen))?;
            local_addr = Some(listener.local_addr()?);
            info!(addr = %listener.local_addr()?, "object store transport listening");
            tasks.push(tokio::spawn(accept_loop(shared.clone(), listener)));
        }

        for addr in cfg.discovery {
            tasks.push(tokio::spawn(dial_loop(shared.clone(), addr)));
        }

        let transport = TcpTransport {
            shared,
            local_addr,
            tasks: Mutex::new(tasks),
        };
        Ok((Arc::new(transport), rx))
    }

    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.local_addr
    }

    fn senders(&self) -> Vec<mpsc::UnboundedSender<Frame>> {
        let conns = self.shared.conns.lock().unwrap_or_else(|p| p.into_inner());
        conns.values().map(|c| c.out.clone()).collect()
    }

    async fn fetch_from(
        &self,
        out: &mpsc::UnboundedSender<Frame>,
        hashes: &[Hash],
    ) -> Result<Vec<Option<Vec<u8>>>, NetError> {
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.shared
            .pending
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(id, tx);

        let sent = out.send(Frame::GetObjects {
            id,
            hashes: hashes.to_vec(),
        });
        let res = match sent {
            Ok(()) => match tokio::time::timeout(FETCH_TIMEOUT, rx).await {
                Ok(Ok(objects)) => Ok(objects),
                Ok(Err(_)) => Err(NetError::Closed),
                Err(_) => Err(NetError::Timeout),
            },
            Err(_) => Err(NetError::Closed),
        };
        self.shared
            .pending
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&id);
        res
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn publish(&self, root: &Root) {
        let conns = self.shared.conns.lock().unwrap_or_else(|p| p.into_inner());
        for conn in conns.values().filter(|c| c.subscribed) {
            debug!(peer = %conn.peer, seq = root.seq, "advertising root");
            let _ = conn.out.send(Frame::Root(root.clone()));
        }
    }

    async fn fetch(&self, hashes: &[Hash]) -> Result<Vec<Vec<u8>>, NetError> {
        for out in self.senders() {
            match self.fetch_from(&out, hashes).await {
                Ok(objects) if objects.iter().all(Option::is_some) => {
                    return Ok(objects.into_iter().flatten().collect());
                }
                Ok(_) => debug!("peer is missing requested objects"),
                Err(e) => warn!(error = %e, "object fetch failed"),
            }
        }
        Err(NetError::NoPeers)
    }

    fn status(&self) -> Status {
        let connected = !self
            .shared
            .conns
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .is_empty();
        if connected {
            Status::Connected
        } else if self.shared.dialing.load(Ordering::SeqCst) > 0 {
            Status::Connecting
        } else {
            Status::Disconnected
        }
    }

    fn reconnect(&self) -> bool {
        self.shared.wake.notify_waiters();
        true
    }

    async fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        let tasks: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .drain(..)
            .collect();
        let served: Vec<_> = self
            .shared
            .served
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .drain(..)
            .collect();
        for task in tasks.into_iter().chain(served) {
            task.abort();
            let _ = task.await;
        }
        self.shared
            .conns
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clear();
    }
}

async fn accept_loop(shared: Arc<Shared>, listener: TcpListener) {
    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "accept error");
                continue;
            }
        };
        if shared.closed.load(Ordering::SeqCst) {
            break;
        }
        debug!(%peer, "new connection");
        let task = tokio::spawn(run_conn(shared.clone(), socket, peer.to_string(), false));
        let mut served = shared.served.lock().unwrap_or_else(|p| p.into_inner());
        served.retain(|t| !t.is_finished());
        served.push(task);
    }
}

async fn dial_loop(shared: Arc<Shared>, addr: String) {
    let mut backoff = MIN_BACKOFF;
    while !shared.closed.load(Ordering::SeqCst) {
        shared.dialing.fetch_add(1, Ordering::SeqCst);
        let res = TcpStream::connect(&addr).await;
        shared.dialing.fetch_sub(1, Ordering::SeqCst);

        match res {
            Ok(socket) => {
                backoff = MIN_BACKOFF;
                run_conn(shared.clone(), socket, addr.clone(), true).await;
            }
            Err(e) => debug!(%addr, error = %e, "dial failed"),
        }
        if shared.closed.load(Ordering::SeqCst) {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(backoff) => backoff = (backoff * 2).min(MAX_BACKOFF),
            _ = shared.wake.notified() => backoff = MIN_BACKOFF,
        }
    }
}

async fn run_conn(shared: Arc<Shared>, socket: TcpStream, peer: String, dialed: bool) {
    let _ = socket.set_nodelay(true);
    let (mut rd, mut wr) = socket.into_split();
    let (out, mut out_rx) = mpsc::unbounded_channel::<Frame>();
    let id = shared.next_id.fetch_add(1, Ordering::SeqCst);

    shared.conns.lock().unwrap_or_else(|p| p.into_inner()).insert(
        id,
        Conn {
            peer: peer.clone(),
            out: out.clone(),
            subscribed: false,
        },
    );
    let _ = shared.events.send(NetEvent::PeerConnected(peer.clone()));

    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if let Err(e) = write_frame(&mut wr, &frame).await {
                debug!(error = %e, "write failed");
                break;
            }
        }
    });

    if dialed {
        let _ = out.send(Frame::Subscribe {
            public_key: shared.feed.public_key,
            nonce: shared.feed.nonce,
        });
    }

    loop {
        match read_frame(&mut rd).await {
            Ok(Some(frame)) => handle_frame(&shared, id, &out, frame),
            Ok(None) => break,
            Err(e) => {
                warn!(%peer, error = %e, "dropping connection");
                break;
            }
        }
    }

    shared.conns.lock().unwrap_or_else(|p| p.into_inner()).remove(&id);
    writer.abort();
    let _ = shared.events.send(NetEvent::PeerDisconnected(peer));
}

fn handle_frame(shared: &Shared, conn_id: u64, out: &mpsc::UnboundedSender<Frame>, frame: Frame) {
    match frame {
        Frame::Subscribe { public_key, nonce } => {
            if public_key != shared.feed.public_key || nonce != shared.feed.nonce {
                warn!(nonce, "subscription for unknown feed");
                return;
            }
            if let Some(conn) = shared
                .conns
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .get_mut(&conn_id)
            {
                conn.subscribed = true;
            }
            // a fresh subscriber catches up from our latest root
            let latest = VerifyingKey::from_bytes(&public_key)
                .ok()
                .and_then(|pk| shared.objects.last_root(&pk, nonce).ok().flatten());
            if let Some(root) = latest {
                let _ = out.send(Frame::Root(root));
            }
        }
        Frame::Root(root) => {
            let _ = shared.events.send(NetEvent::RootAdvertised(root));
        }
        Frame::GetObjects { id, hashes } => {
            let objects = hashes
                .iter()
                .map(|h| shared.objects.get(h).ok().flatten())
                .collect();
            let _ = out.send(Frame::Objects { id, objects });
        }
        Frame::Objects { id, objects } => {
            let waiter = shared
                .pending
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .remove(&id);
            if let Some(tx) = waiter {
                let _ = tx.send(objects);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{crypto::keypair_from_seed, objstore::MemoryObjects};

    fn feed() -> Feed {
        let (pk, _) = keypair_from_seed(b"root seed");
        Feed {
            public_key: pk.to_bytes(),
            nonce: 12345,
        }
    }

    #[tokio::test]
    async fn subscriber_receives_latest_root_and_pulls_objects() {
        let (_, sk) = keypair_from_seed(b"root seed");
        let served = Arc::new(MemoryObjects::new());
        let h = served.put(b"container").unwrap();
        let root = Root::new_signed(&sk, 12345, 4, vec![h]);
        served.save_root(&root).unwrap();

        let (server, _server_rx) = TcpTransport::start(
            TcpConfig {
                listen: Some("127.0.0.1:0".into()),
                discovery: vec![],
                feed: feed(),
            },
            served,
        )
        .await
        .unwrap();
        let addr = server.local_addr().unwrap().to_string();

        let (client, mut client_rx) = TcpTransport::start(
            TcpConfig {
                listen: None,
                discovery: vec![addr],
                feed: feed(),
            },
            Arc::new(MemoryObjects::new()),
        )
        .await
        .unwrap();

        let advertised = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(NetEvent::RootAdvertised(r)) = client_rx.recv().await {
                    return r;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(advertised, root);
        assert_eq!(client.status(), Status::Connected);

        let objects = client.fetch(&[h]).await.unwrap();
        assert_eq!(objects, vec![b"container".to_vec()]);

        client.close().await;
        server.close().await;
    }

    #[tokio::test]
    async fn close_drops_served_connections() {
        let served = Arc::new(MemoryObjects::new());
        let h = served.put(b"object").unwrap();
        let (server, _server_rx) = TcpTransport::start(
            TcpConfig {
                listen: Some("127.0.0.1:0".into()),
                discovery: vec![],
                feed: feed(),
            },
            served,
        )
        .await
        .unwrap();
        let addr = server.local_addr().unwrap().to_string();

        let (client, _client_rx) = TcpTransport::start(
            TcpConfig {
                listen: None,
                discovery: vec![addr],
                feed: feed(),
            },
            Arc::new(MemoryObjects::new()),
        )
        .await
        .unwrap();

        let wait_for = |want: bool| {
            let client = client.clone();
            async move {
                tokio::time::timeout(Duration::from_secs(5), async {
                    while (client.status() == Status::Connected) != want {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                })
                .await
                .unwrap()
            }
        };
        wait_for(true).await;
        assert_eq!(client.fetch(&[h]).await.unwrap(), vec![b"object".to_vec()]);

        server.close().await;
        wait_for(false).await;
        assert!(client.fetch(&[h]).await.is_err());

        client.close().await;
    }
}
