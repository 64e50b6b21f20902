use crate::{
    crypto::{Address, Hash},
    kitty::KittyId,
};
use thiserror::Error;

/// Structural or policy rejection of a single transaction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TxError {
    #[error("input hash mismatch: expected {expected}, got {got}")]
    PrevMismatch { expected: Hash, got: Hash },

    #[error("transfer of kitty {0} has no previous transaction")]
    MissingPrev(KittyId),

    #[error("genesis transaction must have from == to")]
    GenesisAddressMismatch,

    #[error("kitty id mismatch: previous tx is for {prev}, this tx is for {this}")]
    KittyMismatch { prev: KittyId, this: KittyId },

    #[error("address {from} does not own kitty {kitty_id} (owner is {owner})")]
    OwnershipMismatch {
        kitty_id: KittyId,
        from: Address,
        owner: Address,
    },

    #[error("invalid signature: {0}")]
    BadSignature(String),

    #[error("rejected by policy: {0}")]
    Policy(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("kitty of id '{0}' already exists")]
    AlreadyExists(KittyId),

    #[error("kitty of id '{0}' does not exist")]
    NoSuchKitty(KittyId),

    #[error("kitty of id '{kitty_id}' already belongs to address '{address}'")]
    NoopTransfer { kitty_id: KittyId, address: Address },

    #[error("kitty of id '{kitty_id}' does not belong to address '{address}'")]
    NotOwner { kitty_id: KittyId, address: Address },
}

/// Reasons a root advertisement is dropped by a follower.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplicationError {
    #[error("received root is not of master public key")]
    UntrustedKey,

    #[error("received root is not of master nonce (expected {expected}, got {got})")]
    NonceMismatch { expected: u64, got: u64 },

    #[error("received root has empty refs")]
    EmptyRefs,

    #[error("received root has a bad signature")]
    BadSignature,

    #[error("received new root has less transactions ({remote} < {local})")]
    Shrunk { local: u64, remote: u64 },

    #[error("object {0} is unavailable")]
    MissingObject(Hash),

    #[error("object {0} failed its content hash check")]
    CorruptObject(Hash),

    #[error("replicated entry {seq} rejected: {source}")]
    Rejected {
        seq: u64,
        #[source]
        source: TxError,
    },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[cfg(feature = "sled")]
    #[error("database error: {0}")]
    Database(#[from] sled::Error),

    #[error("encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("corrupt root, invalid ref count")]
    CorruptRoot,

    #[error("ledger node {0} is not held locally")]
    MissingNode(Hash),

    #[error("ledger node {0} is malformed")]
    CorruptNode(Hash),
}

#[derive(Error, Debug)]
pub enum NetError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame of {0} B exceeds the {1} B cap")]
    FrameTooLarge(usize, usize),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("no connected peer could serve the request")]
    NoPeers,

    #[error("request timed out")]
    Timeout,

    #[error("transport closed")]
    Closed,
}

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("not master node")]
    NotAuthority,

    #[error("no transactions available")]
    NoEntries,

    #[error("no transaction of hash {0}")]
    TxNotFound(Hash),

    #[error("no transaction of seq {0}")]
    SeqNotFound(u64),

    #[error("invalid pageSize: {0}")]
    InvalidPageSize(u64),

    #[error("invalid startSeq: {0}")]
    InvalidStartSeq(u64),

    #[error("blockchain not initialized")]
    Uninitialized,

    #[error("ledger is disabled")]
    Disabled,

    #[error(transparent)]
    Rejected(#[from] TxError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Replication(#[from] ReplicationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Net(#[from] NetError),
}

impl ChainError {
    /// True for the typed "nothing there" conditions callers should render as 404.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ChainError::NoEntries | ChainError::TxNotFound(_) | ChainError::SeqNotFound(_)
        )
    }
}

impl From<bincode::error::EncodeError> for ChainError {
    fn from(e: bincode::error::EncodeError) -> Self {
        ChainError::Store(StoreError::Encode(e))
    }
}

impl From<bincode::error::DecodeError> for ChainError {
    fn from(e: bincode::error::DecodeError) -> Self {
        ChainError::Store(StoreError::Decode(e))
    }
}
