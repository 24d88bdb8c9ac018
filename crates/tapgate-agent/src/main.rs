use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::info;

use tapgate_agent::config::AgentConfig;
use tapgate_agent::presentation::LogPresentation;
use tapgate_core::file_store::FileStore;
use tapgate_core::session::SessionEngine;
use tapgate_core::tag::{NoopTagLink, TagSequencer};
use tapgate_core::tcp::TcpTransport;

/// Cadence of the combined scheduling loop.
const TICK_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Parser)]
#[command(name = "tapgate-agent")]
#[command(about = "Tapgate reader agent - NFC access reader daemon")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "tapgate_agent={},tapgate_core={}",
            args.log_level, args.log_level
        ))
        .init();

    info!("Starting tapgate-agent");

    let config = if let Some(config_path) = &args.config {
        AgentConfig::load_from_file(config_path)?
    } else {
        AgentConfig::load_from_env()
    };
    config.validate()?;

    let reader_config = config.reader_config();
    let store = Arc::new(FileStore::new(&config.identity_path));

    let mut engine = SessionEngine::boot(reader_config.clone(), TcpTransport::new(), store).await?;
    engine.set_presentation(Arc::new(LogPresentation));

    // The bus driver is a hardware seam; builds without one run the no-op
    // link and simply never see tags.
    let mut tags = TagSequencer::new(NoopTagLink);
    tags.set_scan_cadence(
        reader_config.scan_interval_ms,
        Duration::from_millis(reader_config.detect_timeout_ms),
    );

    let started = Instant::now();
    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!("tapgate-agent started");
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
            _ = ticker.tick() => {
                let now_ms = started.elapsed().as_millis() as u64;
                if let Some(event) = tags.tick(now_ms) {
                    engine.publish_tag_event(event).await;
                }
                engine.tick(now_ms, &mut tags).await;
            }
        }
    }

    info!("tapgate-agent stopped");
    Ok(())
}
