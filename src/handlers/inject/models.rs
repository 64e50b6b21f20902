use serde::Deserialize;

#[derive(Deserialize)]
pub struct InjectReq {
    pub tx: String,                     // hex(bincode-encoded transaction)
}
