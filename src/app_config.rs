//! Application configuration loading for CLI defaults.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};

use export_files_core::BackupConfig;

/// Key = value file configuration for backup defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Number of concurrent download workers.
    pub workers: Option<usize>,
    /// Attempts per run for a file failing at the network level.
    pub max_attempts: Option<u32>,
    /// Redirects followed per attempt.
    pub max_redirects: Option<u32>,
    /// Retry window across runs, in hours.
    pub retry_window_hours: Option<u64>,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// Read timeout in seconds.
    pub read_timeout_secs: Option<u64>,
    /// Fixed backoff between attempts, in milliseconds.
    pub backoff_base_ms: Option<u64>,
    /// Upper bound of the random backoff, in milliseconds.
    pub backoff_jitter_ms: Option<u64>,
    /// Host whose HTTPS files need the bearer credential.
    pub file_host: Option<String>,
    /// Domain whose subdomains are skipped.
    pub service_domain: Option<String>,
}

impl FileConfig {
    /// Copies every value present in the file onto `config`.
    pub fn apply_to(&self, config: &mut BackupConfig) {
        if let Some(workers) = self.workers {
            config.workers = workers;
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
        if let Some(secs) = self.connect_timeout_secs {
            config.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.read_timeout_secs {
            config.read_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = self.backoff_base_ms {
            config.backoff_base = Duration::from_millis(ms);
        }
        if let Some(ms) = self.backoff_jitter_ms {
            config.backoff_jitter = Duration::from_millis(ms);
        }
        if let Some(host) = &self.file_host {
            config.file_host.clone_from(host);
        }
        if let Some(domain) = &self.service_domain {
            config.service_domain.clone_from(domain);
        }
    }
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if one is known.
    pub path: Option<PathBuf>,
    /// Parsed file config when a config file exists and was valid.
    pub config: Option<FileConfig>,
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/export-files/config.toml`
/// 2. `$HOME/.config/export-files/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    config_path_from(
        env_var_non_empty_os("XDG_CONFIG_HOME"),
        env_var_non_empty_os("HOME"),
    )
}

fn config_path_from(xdg_config_home: Option<OsString>, home: Option<OsString>) -> Option<PathBuf> {
    if let Some(xdg_config_home) = xdg_config_home {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("export-files")
                .join("config.toml"),
        );
    }

    let home = home?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("export-files")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config file.
///
/// An explicit path must exist. The default path is optional.
pub fn load_file_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        let config = read_file_config(path)?;
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config: Some(config),
        });
    }

    let path = resolve_default_config_path();
    let config = match path.as_deref() {
        Some(path_ref) if path_ref.exists() => Some(read_file_config(path_ref)?),
        _ => None,
    };
    Ok(LoadedConfig { path, config })
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        let line_no = line_index + 1;

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let invalid = || format!("Invalid `{key}` value on line {line_no}");

        match key {
            "workers" => {
                let parsed = parse_integer_u64(value).with_context(invalid)?;
                cfg.workers = Some(usize::try_from(parsed).with_context(invalid)?);
            }
            "max_attempts" => {
                let parsed = parse_integer_u64(value).with_context(invalid)?;
                cfg.max_attempts = Some(u32::try_from(parsed).with_context(invalid)?);
            }
            "max_redirects" => {
                let parsed = parse_integer_u64(value).with_context(invalid)?;
                cfg.max_redirects = Some(u32::try_from(parsed).with_context(invalid)?);
            }
            "retry_window_hours" => {
                cfg.retry_window_hours = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "connect_timeout_secs" => {
                cfg.connect_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "read_timeout_secs" => {
                cfg.read_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "backoff_base_ms" => {
                cfg.backoff_base_ms = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "backoff_jitter_ms" => {
                cfg.backoff_jitter_ms = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "file_host" => {
                cfg.file_host = Some(parse_string_literal(value).with_context(invalid)?);
            }
            "service_domain" => {
                cfg.service_domain = Some(parse_string_literal(value).with_context(invalid)?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_no}");
            }
        }
    }
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}
