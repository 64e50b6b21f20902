use crate::net::StatusInfo;
use serde::Serialize;

#[derive(Serialize)]
pub struct StatusResp {
    pub status:   StatusInfo,
    pub statuses: Vec<StatusInfo>,
}

#[derive(Serialize)]
pub struct ReconnectResp {
    pub ok: bool,
}
