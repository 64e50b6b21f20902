use crate::transaction::Wrapper;
use serde::Serialize;

#[derive(Serialize)]
pub struct TxView {
    pub hash:      String,              // hex(blake3 of the encoded tx)
    pub prev:      String,
    pub kitty_id:  u64,
    pub from:      String,
    pub to:        String,
    pub sig:       String,              // hex(ed25519 signature)
    pub seq:       u64,
    pub timestamp: i64,                 // unix nanos
}

impl From<Wrapper> for TxView {
    fn from(w: Wrapper) -> Self {
        TxView {
            hash:      w.tx.hash().to_hex(),
            prev:      w.tx.prev.to_hex(),
            kitty_id:  w.tx.kitty_id,
            from:      w.tx.from.to_hex(),
            to:        w.tx.to.to_hex(),
            sig:       hex::encode(w.tx.sig.to_bytes()),
            seq:       w.meta.seq,
            timestamp: w.meta.timestamp,
        }
    }
}
