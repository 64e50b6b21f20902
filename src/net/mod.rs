//! Network half of the object store: root advertisements and object pulls.
//!
//! The replication state machine only sees [`Transport`] and the stream of
//! [`NetEvent`]s it was constructed with, so it runs the same over TCP
//! ([`tcp::TcpTransport`]) and in-process ([`local::LocalNetwork`]).

pub mod framing;
pub mod local;
pub mod tcp;

use crate::{
    crypto::Hash,
    error::NetError,
    objstore::Root,
};
use async_trait::async_trait;
use ed25519_dalek::PUBLIC_KEY_LENGTH;
use serde::Serialize;

/// Identity of one ledger instance on the network.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Feed {
    pub public_key: [u8; PUBLIC_KEY_LENGTH],
    pub nonce: u64,
}

#[derive(Clone, Debug)]
pub enum NetEvent {
    RootAdvertised(Root),
    PeerConnected(String),
    PeerDisconnected(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Advertise `root` to every subscribed peer. Never blocks.
    fn publish(&self, root: &Root);

    /// Pull the objects behind `hashes` from connected peers, in request order.
    async fn fetch(&self, hashes: &[Hash]) -> Result<Vec<Vec<u8>>, NetError>;

    fn status(&self) -> Status;

    /// Re-dial discovery addresses.
    fn reconnect(&self) -> bool;

    async fn close(&self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Connected,
    Disconnected,
    Connecting,
    Unknown,
}

#[derive(Clone, Debug, Serialize)]
pub struct StatusInfo {
    pub code: Status,
    pub name: &'static str,
    pub description: &'static str,
}

impl Status {
    pub fn info(self) -> StatusInfo {
        let (name, description) = match self {
            Status::Connected => ("CONNECTED", "Connection is established."),
            Status::Disconnected => ("DISCONNECTED", "Connection is not established."),
            Status::Connecting => ("CONNECTING", "Attempting to connect."),
            Status::Unknown => ("UNKNOWN", "Unable to determine connection status."),
        };
        StatusInfo {
            code: self,
            name,
            description,
        }
    }

    pub fn all() -> Vec<StatusInfo> {
        [
            Status::Connected,
            Status::Disconnected,
            Status::Connecting,
            Status::Unknown,
        ]
        .into_iter()
        .map(Status::info)
        .collect()
    }
}
