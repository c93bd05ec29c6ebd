//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use export_files_core::{BackupConfig, BearerToken};

/// Back up every file referenced by a JSON message-archive export.
///
/// Walks INPUT_DIR, finds every file URL in the JSON documents it contains
/// and downloads each one into OUTPUT_DIR. Runs are idempotent: files
/// already present are skipped, and files failing at the network level are
/// retried on later runs until their retry window expires.
#[derive(Parser, Debug)]
#[command(name = "export-files")]
#[command(author, version, about)]
pub struct Args {
    /// Root of the export tree (one JSON document per file)
    pub input_dir: PathBuf,

    /// Directory the backed-up files are written to (created if missing)
    pub output_dir: PathBuf,

    /// Bearer token sent to the private file host
    #[arg(long, env = "EXPORT_FILES_TOKEN", hide_env_values = true, value_parser = parse_token)]
    pub token: Option<BearerToken>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Number of concurrent download workers (1-64)
    #[arg(short = 'w', long, value_parser = clap::value_parser!(u16).range(1..=64))]
    pub workers: Option<u16>,

    /// Attempts per run for a file failing at the network level (1-10)
    #[arg(short = 'a', long, value_parser = clap::value_parser!(u32).range(1..=10))]
    pub max_attempts: Option<u32>,

    /// Redirects followed per attempt before a file is abandoned (0-20)
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..=20))]
    pub max_redirects: Option<u32>,

    /// Hours after the first network failure during which a file keeps being retried
    #[arg(long)]
    pub retry_window_hours: Option<u64>,

    /// Connect timeout in seconds, including the TLS handshake (1-3600)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub connect_timeout: Option<u64>,

    /// Read timeout in seconds (1-3600)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub read_timeout: Option<u64>,

    /// Path to a config file (default: $XDG_CONFIG_HOME/export-files/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

impl Args {
    /// Overrides `config` with every value given on the command line.
    pub fn apply_to(&self, config: &mut BackupConfig) {
        if let Some(workers) = self.workers {
            config.workers = usize::from(workers);
        }
        if let Some(max_attempts) = self.max_attempts {
            config.max_attempts = max_attempts;
        }
        if let Some(max_redirects) = self.max_redirects {
            config.max_redirects = max_redirects;
        }
        if let Some(hours) = self.retry_window_hours {
            config.retry_window = Duration::from_secs(hours.saturating_mul(60 * 60));
        }
        if let Some(secs) = self.connect_timeout {
            config.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.read_timeout {
            config.read_timeout = Duration::from_secs(secs);
        }
    }
}

fn parse_token(raw: &str) -> Result<BearerToken, String> {
    let token = raw.trim();
    if token.is_empty() {
        return Err("token must not be empty".to_string());
    }
    Ok(BearerToken::new(token))
}
