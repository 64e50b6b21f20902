pub mod blockchain;     // orchestrator: validation, append, state folding
pub mod chaindb;        // ledger store trait + replicated / memory / disabled variants
pub mod config;         // loads authority.toml or follower.toml
pub mod crypto;         // hashing (blake3), signing (ed25519), addresses
pub mod error;          // typed errors per layer
pub mod kitty;          // kitty and address state records
pub mod net;            // object store transport: tcp + in-process
pub mod node;           // assembly of a running node
pub mod objstore;       // content-addressed objects, containers, signed roots
pub mod state;          // ownership state tracker
#[cfg(feature = "sled")]
pub mod storage;        // sled-backed object store
pub mod transaction;    // transactions, metadata, acceptance policy

pub mod mode;           // per-mode orchestration logic
#[cfg(feature = "gateway")]
pub mod handlers;       // handlers for Axum API
