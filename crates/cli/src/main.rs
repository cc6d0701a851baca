//! Mirroring CLI: `stillage sync`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use figment::Figment;
use figment::providers::{Format, Yaml};
use stillage_core::config::MirrorConfig;
use stillage_sync::Syncer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

/// Environment variable carrying full configuration content (YAML as a
/// string); overrides `--config` when set.
const CONFIG_ENV: &str = "STILLAGE_CONFIG";

#[derive(Parser)]
#[command(name = "stillage")]
#[command(about = "Mirrors RPM and Debian repositories to a directory or an S3 bucket")]
#[command(version)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short = 'c', long, default_value = "stillage.yaml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synchronize all configured repositories from their remote origins
    Sync,
}

fn parse_config(figment: Figment) -> Result<MirrorConfig> {
    let config: MirrorConfig = figment.extract().context("configuration parse error")?;
    config
        .storage
        .validate()
        .map_err(|reason| anyhow::anyhow!("configuration parse error: {reason}"))?;
    Ok(config)
}

fn load_config(path: &str) -> Result<MirrorConfig> {
    let figment = match std::env::var(CONFIG_ENV) {
        Ok(content) => Figment::from(Yaml::string(&content)),
        Err(_) => Figment::from(Yaml::file(path)),
    };
    parse_config(figment)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Sync => sync(&cli.config).await,
    }
}

/// Process every configured repository sequentially; exit non-zero if any
/// of them ultimately failed.
async fn sync(config_path: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let options = config.sync.options();

    let mut failed = false;
    for repo in &config.http {
        let url = Url::parse(&repo.url)
            .with_context(|| format!("invalid repository URL: {}", repo.url))?;
        let storage = stillage_storage::from_config(&config.storage, url.path()).await?;
        let syncer = Syncer::new(url.clone(), repo.archs.clone(), storage, &options)?;

        tracing::info!(repo = %url, "processing repository");
        match syncer.store_repo().await {
            Ok(()) => tracing::info!(repo = %url, "done"),
            Err(err) => {
                tracing::error!(repo = %url, error = %err, "repository sync failed");
                failed = true;
            }
        }
    }

    if failed {
        std::process::exit(1);
    }
    Ok(())
}
