use crate::{config::NodeConfig, node};

use anyhow::bail;
use tracing::info;

pub async fn run(mut cfg: NodeConfig) -> anyhow::Result<()> {
    if cfg.chain.master {
        bail!("follower must run with `master = false`");
    }
    if cfg.test_mode.is_some() {
        bail!("test mode is only available on the authority");
    }
    let bc = node::start(&mut cfg).await?;

    info!(
        len       = bc.len().await,
        discovery = ?cfg.chain.discovery,
        "follower ready"
    );
    // followers never accept submissions
    node::serve(&cfg, bc, false).await
}
