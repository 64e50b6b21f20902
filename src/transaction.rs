//! Signed ownership transfers and the checks applied to them.
//!
//! Every kitty has its own chain: the genesis (mint) transaction references
//! the zero hash, each transfer references the hash of the one before it.
//! A transaction's identity is the blake3 hash of its canonical bincode
//! encoding, which is also its address in the object store.

use crate::{
    crypto::{self, Address, Hash},
    error::TxError,
    kitty::KittyId,
};
use bincode::{config::standard, serde::encode_to_vec};
use ed25519_dalek::{Signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

pub type TxHash = Hash;

/// External acceptance rule layered on top of structural verification.
pub type TxChecker = dyn Fn(&Transaction) -> Result<(), TxError> + Send + Sync;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub prev: TxHash,
    pub kitty_id: KittyId,
    pub from: Address,
    pub to: Address,
    pub sig: Signature,
}

// Signed portion of a transaction.
#[derive(Serialize)]
struct TxBody<'a> {
    prev: &'a TxHash,
    kitty_id: KittyId,
    from: &'a Address,
    to: &'a Address,
}

impl Transaction {
    /// Mint `kitty_id` to the address of `minting_key`.
    pub fn new_genesis(kitty_id: KittyId, minting_key: &SigningKey) -> Self {
        let addr = Address::from_secret_key(minting_key);
        Self::signed(Hash::ZERO, kitty_id, addr, addr, minting_key)
    }

    /// Transfer the kitty of `prev` to `dest`, signed by its current owner.
    pub fn new_transfer(
        prev: &Transaction,
        dest: Address,
        owner_key: &SigningKey,
    ) -> Result<Self, TxError> {
        let from = Address::from_secret_key(owner_key);
        if from != prev.to {
            return Err(TxError::OwnershipMismatch {
                kitty_id: prev.kitty_id,
                from,
                owner: prev.to,
            });
        }
        Ok(Self::signed(prev.hash(), prev.kitty_id, from, dest, owner_key))
    }

    fn signed(prev: TxHash, kitty_id: KittyId, from: Address, to: Address, sk: &SigningKey) -> Self {
        let mut tx = Transaction {
            prev,
            kitty_id,
            from,
            to,
            sig: Signature::from_bytes(&[0u8; 64]),
        };
        tx.sig = crypto::sign_hash(&tx.hash_inner(), sk);
        tx
    }

    /// Hash of the signed fields (everything but the signature).
    pub fn hash_inner(&self) -> Hash {
        let body = TxBody {
            prev: &self.prev,
            kitty_id: self.kitty_id,
            from: &self.from,
            to: &self.to,
        };
        let bytes = encode_to_vec(&body, standard()).expect("bincode encode tx body");
        crypto::hash_bytes(&bytes)
    }

    /// Identity of the transaction: hash of the full canonical encoding.
    pub fn hash(&self) -> TxHash {
        crypto::hash_bytes(&self.encode())
    }

    pub fn encode(&self) -> Vec<u8> {
        encode_to_vec(self, standard()).expect("bincode encode tx")
    }

    pub fn verify_signature(&self, pk: &VerifyingKey) -> Result<(), TxError> {
        crypto::verify_hash(&self.hash_inner(), &self.sig, pk)
            .map_err(|e| TxError::BadSignature(e.to_string()))
    }

    /// Checks this transaction against the previous one in its kitty's chain.
    /// `prev == None` means this must be a genesis signed by `trusted`.
    pub fn verify_with(&self, prev: Option<&Transaction>, trusted: &VerifyingKey) -> Result<(), TxError> {
        match prev {
            None => {
                if !self.prev.is_zero() {
                    return Err(TxError::MissingPrev(self.kitty_id));
                }
                if self.from != self.to {
                    return Err(TxError::GenesisAddressMismatch);
                }
                self.verify_signature(trusted)
            }
            Some(prev) => {
                let expected = prev.hash();
                if self.prev != expected {
                    return Err(TxError::PrevMismatch {
                        expected,
                        got: self.prev,
                    });
                }
                if prev.kitty_id != self.kitty_id {
                    return Err(TxError::KittyMismatch {
                        prev: prev.kitty_id,
                        this: self.kitty_id,
                    });
                }
                if self.from != prev.to {
                    return Err(TxError::OwnershipMismatch {
                        kitty_id: self.kitty_id,
                        from: self.from,
                        owner: prev.to,
                    });
                }
                let pk = self
                    .from
                    .verifying_key()
                    .map_err(|e| TxError::BadSignature(e.to_string()))?;
                self.verify_signature(&pk)
            }
        }
    }

    pub fn is_mint(&self, trusted: &VerifyingKey) -> bool {
        self.prev.is_zero() && self.verify_signature(trusted).is_ok()
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tx(kitty={} prev={} from={} to={})",
            self.kitty_id, self.prev, self.from, self.to
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxMeta {
    pub seq: u64,
    pub timestamp: i64, // unix nanos, informational
}

impl TxMeta {
    pub fn now(seq: u64) -> Self {
        TxMeta {
            seq,
            timestamp: chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        encode_to_vec(self, standard()).expect("bincode encode tx meta")
    }
}

/// One ledger entry: a transaction body and its metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wrapper {
    pub tx: Transaction,
    pub meta: TxMeta,
}

impl Wrapper {
    pub fn new(tx: Transaction, seq: u64) -> Self {
        Wrapper {
            tx,
            meta: TxMeta::now(seq),
        }
    }
}

/// Acceptance rule shared by the authority and every follower: a genesis must
/// be signed by the trusted minting key, a transfer by its `from` key.
pub fn signature_policy(mint_key: VerifyingKey) -> Arc<TxChecker> {
    Arc::new(move |tx: &Transaction| {
        if tx.prev.is_zero() {
            if tx.from != tx.to {
                return Err(TxError::GenesisAddressMismatch);
            }
            if !tx.is_mint(&mint_key) {
                return Err(TxError::Policy(
                    "genesis transaction is not signed by the trusted minting key".into(),
                ));
            }
            return Ok(());
        }
        let pk = tx
            .from
            .verifying_key()
            .map_err(|e| TxError::BadSignature(e.to_string()))?;
        tx.verify_signature(&pk)
    })
}

pub fn accept_all() -> Arc<TxChecker> {
    Arc::new(|_: &Transaction| Ok(()))
}
