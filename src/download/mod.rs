//! Download pipeline: per-file state machine, failure tracking and worker pool.
//!
//! Every file reference resolves to a [`TargetId`] (a digest of its raw source
//! string) which names its destination file, its `.err` failure marker and its
//! lock key. [`FileDownloader`] drives one reference through redirects and
//! retries; [`Downloader`] runs a pool of workers over a whole export tree.
//!
//! # Features
//!
//! - Streaming downloads written through a `.part` file and renamed in place
//! - Manual redirect handling with loop and hop-limit detection
//! - Bearer credential sent only to the private file host
//! - Bounded retries per run with jittered backoff
//! - Failure markers that survive across runs and expire after a retry window
//!
//! # Example
//!
//! ```no_run
//! use export_files_core::download::{FileDownloader, HttpClient};
//! use export_files_core::parser::UrlClassifier;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let downloader = FileDownloader::new(HttpClient::new()?, "./backup");
//! let reference = UrlClassifier::default()
//!     .classify("https://example.com/logo.png")
//!     .into_reference("https://example.com/logo.png");
//! if let Some(reference) = reference {
//!     println!("{:?}", downloader.download(reference).await?);
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod constants;
mod engine;
mod error;
mod locks;
mod retry;
mod target;
mod task;
mod tracker;

pub use client::{BearerToken, HttpClient, save_body};
pub use constants::{FAILURE_MARKER_SUFFIX, PARTIAL_SUFFIX};
pub use engine::{BackupError, BackupStats, BackupSummary, Downloader};
pub use error::DownloadError;
pub use locks::KeyedLocks;
pub use retry::RetryPolicy;
pub use target::{TargetId, marker_path, partial_path};
pub use task::{DownloadOutcome, FileDownloader, RedirectAnomaly};
pub use tracker::{FailureTracker, RetryDecision};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
