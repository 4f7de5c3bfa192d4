// labnoted: standalone daemon entry point.

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("starting labnote daemon");
    labnote_daemon::runtime::run_standalone()
        .await
        .context("labnote daemon terminated unexpectedly")
}
