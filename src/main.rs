use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use telemetry_ingest::{Cli, Server, ServerState};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match &cli.log {
        Some(directive) => EnvFilter::try_new(directive)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = cli.into_config()?;
    let state = ServerState::new(config.feed_capacity);

    let server = Server::bind(config, state).await?;

    server
        .run_until(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("shutdown requested"),
                Err(err) => {
                    tracing::warn!(error = %err, "cannot listen for Ctrl-C, running until killed");
                    std::future::pending::<()>().await;
                }
            }
        })
        .await?;

    Ok(())
}
