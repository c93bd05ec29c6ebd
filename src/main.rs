//! CLI entry point for the export-files backup tool.

use anyhow::{Context, Result};
use clap::Parser;
use export_files_core::{BackupConfig, Downloader};
use tracing::{debug, info};

mod app_config;
mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let loaded = app_config::load_file_config(args.config.as_deref())?;
    let mut config = BackupConfig::default();
    if let Some(file_config) = &loaded.config {
        debug!(path = ?loaded.path, "applying config file");
        file_config.apply_to(&mut config);
    }
    args.apply_to(&mut config);
    config.validate().context("Invalid configuration")?;

    info!(
        input_dir = %args.input_dir.display(),
        output_dir = %args.output_dir.display(),
        "export-files starting"
    );

    let downloader = Downloader::new(config)?;
    let summary = downloader
        .run_all(&args.input_dir, &args.output_dir, args.token.clone())
        .await
        .context("Backup aborted")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if !args.quiet {
        println!(
            "Backed up {} of {} references ({} downloaded, {} already present, {} unavailable, {} abandoned, {} deferred, {} expired)",
            summary.downloaded + summary.already_present,
            summary.discovered,
            summary.downloaded,
            summary.already_present,
            summary.unavailable,
            summary.abandoned,
            summary.deferred,
            summary.expired,
        );
    }

    Ok(())
}
