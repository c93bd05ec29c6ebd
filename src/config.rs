//! Run configuration for a backup.
//!
//! [`BackupConfig`] carries every tunable of the download engine. Defaults
//! match production behaviour; tests shrink the delays.

use std::time::Duration;

use thiserror::Error;

use crate::parser::UrlClassifier;

/// Canonical host serving files that require the bearer credential.
pub const DEFAULT_FILE_HOST: &str = "files.slack.com";

/// Service domain whose subdomains serve pages rather than files.
pub const DEFAULT_SERVICE_DOMAIN: &str = "slack.com";

/// Default number of download workers.
pub const DEFAULT_WORKERS: usize = 4;

/// Default attempts per run for a file that fails at the network level.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default number of redirects followed within one attempt.
pub const DEFAULT_MAX_REDIRECTS: u32 = 3;

/// Default connect timeout (TCP connect and TLS handshake).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default read timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(15);

/// Default window, measured from the first network failure, before a file is given up on.
pub const DEFAULT_RETRY_WINDOW: Duration = Duration::from_secs(2 * 24 * 60 * 60);

/// Default fixed part of the backoff between attempts.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Default upper bound of the random part of the backoff.
pub const DEFAULT_BACKOFF_JITTER: Duration = Duration::from_secs(1);

const MAX_WORKERS: usize = 64;
const MAX_ATTEMPTS_LIMIT: u32 = 10;
const MAX_REDIRECTS_LIMIT: u32 = 20;

/// Invalid configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A numeric setting is outside its accepted range.
    #[error("invalid value {value} for `{field}`: expected {min}..={max}")]
    OutOfRange {
        /// Name of the setting.
        field: &'static str,
        /// Value that was rejected.
        value: u64,
        /// Smallest accepted value.
        min: u64,
        /// Largest accepted value.
        max: u64,
    },

    /// A timeout was zero.
    #[error("`{field}` must be greater than zero")]
    ZeroTimeout {
        /// Name of the setting.
        field: &'static str,
    },

    /// A host setting was empty.
    #[error("`{field}` must not be empty")]
    EmptyHost {
        /// Name of the setting.
        field: &'static str,
    },
}

/// Everything a backup run can be tuned with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupConfig {
    /// Number of concurrent download workers.
    pub workers: usize,
    /// Attempts per run for a file failing at the network level.
    pub max_attempts: u32,
    /// Redirects followed within one attempt before giving up on the file.
    pub max_redirects: u32,
    /// Connect timeout, including the TLS handshake.
    pub connect_timeout: Duration,
    /// Timeout for each read from the server.
    pub read_timeout: Duration,
    /// How long after the first network failure a file keeps being retried across runs.
    pub retry_window: Duration,
    /// Fixed part of the delay between attempts.
    pub backoff_base: Duration,
    /// Upper bound of the random part of the delay between attempts.
    pub backoff_jitter: Duration,
    /// Host whose HTTPS files need the bearer credential.
    pub file_host: String,
    /// Domain whose subdomains are skipped.
    pub service_domain: String,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            retry_window: DEFAULT_RETRY_WINDOW,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_jitter: DEFAULT_BACKOFF_JITTER,
            file_host: DEFAULT_FILE_HOST.to_string(),
            service_domain: DEFAULT_SERVICE_DOMAIN.to_string(),
        }
    }
}

impl BackupConfig {
    /// Checks every value against its accepted range.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("workers", self.workers as u64, 1, MAX_WORKERS as u64)?;
        check_range(
            "max_attempts",
            u64::from(self.max_attempts),
            1,
            u64::from(MAX_ATTEMPTS_LIMIT),
        )?;
        check_range(
            "max_redirects",
            u64::from(self.max_redirects),
            0,
            u64::from(MAX_REDIRECTS_LIMIT),
        )?;
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout {
                field: "connect_timeout",
            });
        }
        if self.read_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout {
                field: "read_timeout",
            });
        }
        if self.file_host.trim().is_empty() {
            return Err(ConfigError::EmptyHost { field: "file_host" });
        }
        if self.service_domain.trim().is_empty() {
            return Err(ConfigError::EmptyHost {
                field: "service_domain",
            });
        }
        Ok(())
    }

    /// Builds the URL classifier for the configured hosts.
    #[must_use]
    pub fn classifier(&self) -> UrlClassifier {
        UrlClassifier::new(&self.file_host, &self.service_domain)
    }
}

fn check_range(field: &'static str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}
