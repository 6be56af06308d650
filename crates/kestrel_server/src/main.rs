use anyhow::Result;
use clap::Parser;

use kestrel_common::{config::KestrelConfig, PageId};
use kestrel_server::{IngestPipeline, IngestServer};

#[derive(Parser, Debug)]
#[command(name = "kestrel", about = "KestrelDB — time-series ingest core")]
struct Cli {
    /// Config file path.
    #[arg(short, long, default_value = "kestrel.toml")]
    config: String,

    /// Ingest listen address (overrides config).
    #[arg(long)]
    listen_addr: Option<String>,

    /// Out-of-order tolerance window in timestamp units (overrides config).
    #[arg(long)]
    window_size: Option<u64>,

    /// Print the default configuration as TOML and exit.
    #[arg(long)]
    print_default_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.print_default_config {
        let default_config = KestrelConfig::default();
        println!("{}", toml::to_string_pretty(&default_config)?);
        return Ok(());
    }

    init_tracing();
    tracing::info!("Starting KestrelDB ingest core...");

    let mut config = load_config(&cli.config);
    if let Some(ref addr) = cli.listen_addr {
        config.server.listen_addr = addr.clone();
    }
    if let Some(window) = cli.window_size {
        config.sequencer.window_size = window;
    }
    tracing::info!("Config: {:?}", config);

    let pipeline = IngestPipeline::start(
        PageId(config.sequencer.page_id),
        config.sequencer.window_size,
        config.sequencer.ingest_queue_depth,
    );
    let server = IngestServer::new(config.server.clone(), pipeline.sender());

    tokio::select! {
        result = server.run() => {
            if let Err(error) = result {
                tracing::error!(%error, "ingest listener failed");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("SIGINT received — draining ingest");
        }
    }

    // The listener task is gone; drain whatever the sequencer still holds.
    let stats = tokio::task::spawn_blocking(move || pipeline.shutdown()).await?;
    tracing::info!(
        accepted = stats.accepted,
        late_rejected = stats.late_rejected,
        flushed = stats.flushed,
        "shutdown complete"
    );
    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,kestrel=debug"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn load_config(path: &str) -> KestrelConfig {
    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!("Loaded config from {}", path);
                config
            }
            Err(e) => {
                tracing::warn!("Failed to parse config {}: {}, using defaults", path, e);
                KestrelConfig::default()
            }
        },
        Err(_) => {
            tracing::info!("Config file {} not found, using defaults", path);
            KestrelConfig::default()
        }
    }
}
