/// # Pillar Node
///
/// Entry point of the pillar service. Loads the configuration, assembles the
/// pillar and serves the HTTP ingress until the process is stopped.
use clap::{Parser, Subcommand};
use pillar_node::api::ApiServer;
use pillar_node::config::{ensure_default_config, PillarConfig};
use pillar_node::node::PillarNode;
use std::path::PathBuf;
use std::process;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments of the pillar node.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pillar
    Run,

    /// Write a default configuration file if none exists
    InitConfig,
}

#[tokio::main]
pub async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    if let Some(Commands::InitConfig) = cli.command {
        init_tracing("info");
        ensure_default_config(&cli.config)?;
        info!("Configuration available at {:?}", cli.config);
        return Ok(());
    }

    let loaded = PillarConfig::load(&cli.config);
    let level = loaded
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());
    init_tracing(&level);

    info!("Loading configuration from {:?}", cli.config);
    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let bind_address = config.api.bind_address.clone();
    let node = match PillarNode::from_config(config) {
        Ok(node) => node,
        Err(e) => {
            error!("Failed to assemble pillar: {}", e);
            process::exit(1);
        }
    };

    info!(
        "Pillar '{}' running. Press Ctrl+C to stop.",
        node.config().pillar.pillar_id
    );

    let server = ApiServer::new(node.mediator(), bind_address);
    if let Err(e) = server.start().await {
        error!("Server error: {}", e);
        process::exit(1);
    }

    Ok(())
}

/// `RUST_LOG` wins over the configured level.
fn init_tracing(default_level: &str) {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_level.to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
