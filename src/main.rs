// src/main.rs

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use modpack::{Converter, RebuildOutcome};
use tracing::{info, warn};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = cli.load_settings().context("Failed to load settings")?;
    info!("Converting modules under {}", settings.source.display());

    let mut converter = Converter::from_settings(settings).context("Failed to initialize converter")?;

    match cli.command {
        Commands::Scan => {
            let loaded = converter.scan()?;
            info!(
                "Scan complete: {} new module(s), {} artifact(s) cached",
                loaded.len(),
                converter.cache().len()
            );
        }
        Commands::Sync => {
            let report = converter.sync()?;
            report.log_summary();
        }
        Commands::Rebuild { file } => match converter.rebuild(&file)? {
            RebuildOutcome::Built(identity) => info!("Rebuilt {}", identity),
            RebuildOutcome::Removed(identity) => info!("Removed {}", identity),
            RebuildOutcome::Skipped => info!("{} skipped", file.display()),
            RebuildOutcome::Failed(identity, reason) => warn!("Unable to rebuild {}: {}", identity, reason),
        },
    }

    Ok(())
}
