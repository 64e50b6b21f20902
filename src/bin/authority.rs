use anyhow::Result;
use kitty_ledger::config;
use kitty_ledger::mode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "config/authority.toml".into());
    let cfg = config::NodeConfig::load(&path)?;

    mode::authority::run(cfg).await
}
