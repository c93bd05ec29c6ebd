//! Export Files Core Library
//!
//! Backs up every file referenced by a JSON message-archive export into a
//! flat directory, one file per distinct source URL.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`parser`] - URL classification and reference extraction from JSON documents
//! - [`source`] - Walk of the export tree feeding references to a sink
//! - [`download`] - Per-file download state machine, failure markers and worker pool
//! - [`config`] - Tunables with defaults and validation
//!
//! A backup run is idempotent: files already present are never fetched
//! again, and files that keep failing at the network level are retried on
//! later runs until their retry window expires.

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod download;
pub mod parser;
pub mod source;
#[cfg(test)]
pub(crate) mod test_support;
mod user_agent;

// Re-export commonly used types
pub use config::{BackupConfig, ConfigError};
pub use download::{
    BackupError, BackupStats, BackupSummary, BearerToken, DownloadError, DownloadOutcome,
    Downloader, FileDownloader, HttpClient, TargetId,
};
pub use parser::{Classification, FileReference, UrlClassifier, Visibility, extract_references};
pub use source::{ScanSummary, SourceError, scan_tree};
