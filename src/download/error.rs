//! Error types for the download module.
//!
//! [`DownloadError`] covers both network faults, which the retry loop treats
//! as transient, and local faults, which abort the run. The split is made by
//! [`DownloadError::is_transient`].

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while fetching a file.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused or reset, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request or body read timed out.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Writing the streamed body failed part way through.
    #[error("write to {path} failed while streaming {url}: {source}")]
    PartialWrite {
        /// The URL being streamed.
        url: String,
        /// The partial file that was being written.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// File system error outside of body streaming (create, rename, stat, delete).
    #[error("IO error on {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {source}")]
    ClientBuild {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error, folding timeouts into [`DownloadError::Timeout`].
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            return Self::Timeout { url: url.into() };
        }
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a streaming write error.
    pub fn partial_write(
        url: impl Into<String>,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::PartialWrite {
            url: url.into(),
            path: path.into(),
            source,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the failure may go away on its own and is worth another attempt.
    ///
    /// Network faults, timeouts and a write that broke mid-stream are transient.
    /// Everything else is a local or programming fault.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::Timeout { .. } | Self::PartialWrite { .. }
        )
    }
}

// Note on From trait implementations:
// We intentionally do NOT implement `From<reqwest::Error>` or `From<std::io::Error>`
// because our error variants require context (url, path) that the source errors
// don't provide.
