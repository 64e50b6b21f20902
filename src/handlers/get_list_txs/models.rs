use serde::Deserialize;

pub const DEFAULT_PAGE_SIZE: u64 = 50;

#[derive(Deserialize)]
pub struct ListTxsReq {
    pub start: Option<u64>,
    pub page_size: Option<u64>,
}
