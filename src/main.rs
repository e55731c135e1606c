mod access;
mod config;
mod error;
mod models;
mod store;
mod tester;
mod web;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::{AppConfig, DEFAULT_CONFIG_FILE};
use store::DataLayout;

#[derive(Parser)]
#[command(name = "api-docs-creator")]
#[command(about = "Self-hosted API documentation and request testing")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the documentation server
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
        /// Mount path for the UI and API
        #[arg(long)]
        path: Option<String>,
        #[arg(short, long)]
        data_dir: Option<PathBuf>,
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Allow edits from hosts other than localhost
        #[arg(long)]
        allow_external_edit: bool,
        /// Directory with the built UI assets
        #[arg(long)]
        static_dir: Option<PathBuf>,
        #[arg(long, default_value = "127.0.0.1")]
        host: IpAddr,
    },
    /// Create the data directory, the sample endpoint and a config file
    Init {
        #[arg(short, long)]
        data_dir: Option<PathBuf>,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            path,
            data_dir,
            config,
            allow_external_edit,
            static_dir,
            host,
        } => {
            let (mut settings, config_file) = AppConfig::load(config.as_deref())?;
            if let Some(port) = port {
                settings.port = port;
            }
            if let Some(path) = path {
                settings.path = path;
            }
            if let Some(data_dir) = data_dir {
                settings.data_dir = data_dir;
            }
            if let Some(static_dir) = static_dir {
                settings.static_dir = Some(static_dir);
            }
            settings.allow_external_edit |= allow_external_edit;

            web::run_server(settings, config_file, host).await?;
        }
        Commands::Init { data_dir, config } => {
            let config_path = config.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            let mut settings = if config_path.is_file() {
                AppConfig::load(Some(&config_path))?.0
            } else {
                AppConfig::default()
            };
            if let Some(data_dir) = data_dir {
                settings.data_dir = data_dir;
            }

            let layout = DataLayout::new(&settings.data_dir);
            let seeded = layout
                .initialize()
                .with_context(|| format!("failed to initialize {}", layout.root.display()))?;
            info!(data_dir = %layout.root.display(), seeded, "data directory ready");

            if config_path.is_file() {
                info!(config = %config_path.display(), "config file already exists, leaving it alone");
            } else {
                settings
                    .save(&config_path)
                    .with_context(|| format!("failed to write {}", config_path.display()))?;
                info!(config = %config_path.display(), "wrote default config");
            }
        }
    }

    Ok(())
}
