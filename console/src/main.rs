mod api;
mod chat;
mod config;
mod console;
mod gate;
mod notify;
mod registry;
mod store;
mod sync;
mod types;

use crate::config::Config;
use crate::types::SessionId;
use anyhow::Result;
use clap::Parser;
use tracing::info;

#[derive(Parser)]
#[command(name = "tradechat", about = "Terminal chat console for the autonomous trading agent")]
struct Cli {
    /// Backend base URL (overrides API_URL)
    #[arg(long)]
    api_url: Option<String>,

    /// Override log poll interval (seconds)
    #[arg(long)]
    interval: Option<u64>,

    /// Load config from a specific .env file
    #[arg(long)]
    config_file: Option<String>,

    /// Open this session instead of the most recent one
    #[arg(long)]
    session: Option<String>,

    /// Ping the backend and exit
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the transcript; logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut cfg = Config::from_env_file(cli.config_file.as_deref())?;

    if let Some(url) = cli.api_url {
        cfg.api_url = url.trim_end_matches('/').to_string();
    }
    if let Some(secs) = cli.interval {
        cfg.poll_interval_secs = secs.max(1);
    }

    if cli.health {
        return console::health_check(&cfg).await;
    }

    info!("==============================================");
    info!("  TRADECHAT  {}", cfg.api_url);
    info!("  Poll: {}s | Retry: {} x {}ms", cfg.poll_interval_secs, cfg.retry_attempts, cfg.retry_delay_ms);
    info!("  Trading marker: \"{}\" | Ordering: {:?}", cfg.trading_status, cfg.response_ordering);
    info!("  Stop: /quit or Ctrl+C");
    info!("==============================================");

    console::run(cfg, cli.session.map(SessionId::new)).await
}
