//! Paylane node binary.
//!
//! Loads configuration, opens durable storage, restores engine state, and
//! runs the stream-flush sweep and snapshot loop until interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use paylane_channel::adapters::InternalLedgerAdapter;
use paylane_core::{EngineConfig, TracingSink};
use paylane_node::{PaylaneNode, Storage};

/// Paylane — off-chain M2M payment channel engine.
#[derive(Parser, Debug)]
#[command(name = "paylane-node", version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply if it does not
    /// exist.
    #[arg(short, long, default_value = "paylane.toml")]
    config: PathBuf,

    /// Override the data directory from the configuration.
    #[arg(long)]
    data_dir: Option<String>,
}

fn load_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        return Ok(EngineConfig::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(name = %config.name, data_dir = %config.data_dir, "starting paylane node");

    let storage = Arc::new(Storage::open(Path::new(&config.data_dir))?);
    let node = PaylaneNode::new(
        config,
        storage,
        Arc::new(InternalLedgerAdapter::new()),
        Arc::new(TracingSink),
    );

    node.restore()?;
    node.run().await
}
