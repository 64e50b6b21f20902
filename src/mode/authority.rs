use crate::{config::NodeConfig, node};

use anyhow::bail;
use tracing::info;

pub async fn run(mut cfg: NodeConfig) -> anyhow::Result<()> {
    if !cfg.chain.master {
        bail!("authority requires `master = true`");
    }
    let bc = node::start(&mut cfg).await?;

    info!(
        len     = bc.len().await,
        applied = bc.applied().await,
        "authority ready"
    );
    node::serve(&cfg, bc, true).await
}
