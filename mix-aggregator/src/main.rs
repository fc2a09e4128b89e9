use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use interfaces::Config;
use mix_aggregator::server::{self, AppState};
use mix_aggregator::{telemetry, FetchConfig, Fetcher, SourceManager};
use tokio::net::TcpListener;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "mixproxy", about = "Merge TV site repositories, guides and playlists")]
struct Cli {
    /// Config file; defaults to $MIXPROXY_CONFIG or ./mixproxy.toml
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Overrides `server_port` from the config file
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.server_port = port;
    }
    info!("Starting MixProxy with {} sources", config.sources.len());

    let fetcher = Fetcher::new(FetchConfig::from(config.fetch.clone())).context("building HTTP client")?;
    let sources = SourceManager::new(config.sources.clone(), Arc::new(fetcher));
    let scheduler = sources.start(Duration::from_secs(config.check_period_secs.max(1)));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let state = AppState::new(config, sources.clone());

    if let Err(e) = server::prerun(&state).await {
        error!("Initial merge failed: {}", e);
        sources.close();
        return Err(e).context("initial merge");
    }
    sources.trigger_refresh(false);

    let listener = TcpListener::bind(addr).await.with_context(|| format!("binding {addr}"))?;
    server::serve(listener, state, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutting down");
    })
    .await?;

    sources.close();
    if let Some(handle) = scheduler {
        let _ = handle.await;
    }
    Ok(())
}
