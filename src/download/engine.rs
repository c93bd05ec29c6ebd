//! Worker pool that backs up every file referenced by an export tree.
//!
//! # Overview
//!
//! [`Downloader::run_all`] starts one producer and a fixed pool of workers
//! sharing an unbounded FIFO queue:
//!
//! - the producer walks the export tree on a blocking thread, extracts file
//!   references from each document and pushes them onto the queue, closing
//!   it when the walk is done;
//! - each worker pops references until the queue is closed and drained,
//!   takes the [`KeyedLocks`] guard for the reference's [`TargetId`], and runs
//!   the [`FileDownloader`] state machine under it.
//!
//! A target that failed at the network level earlier in the same run is
//! skipped without a new request; its durable state stays with the failure
//! marker on disk. Any fault other than a handled download failure aborts
//! the whole run.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use export_files_core::config::BackupConfig;
//! use export_files_core::download::{BearerToken, Downloader};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let downloader = Downloader::new(BackupConfig::default())?;
//! let summary = downloader
//!     .run_all(
//!         Path::new("./export"),
//!         Path::new("./backup"),
//!         Some(BearerToken::new("xoxp-token")),
//!     )
//!     .await?;
//! println!("downloaded {}, deferred {}", summary.downloaded, summary.deferred);
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_channel::Receiver;
use dashmap::DashSet;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{Instrument, Span, debug, info, instrument, warn};

use super::client::{BearerToken, HttpClient};
use super::error::DownloadError;
use super::locks::KeyedLocks;
use super::target::TargetId;
use super::task::{DownloadOutcome, FileDownloader};
use crate::config::{BackupConfig, ConfigError};
use crate::parser::FileReference;
use crate::source::{SourceError, scan_tree};

/// Fatal errors that abort a backup run.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    /// The configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The export tree could not be walked or read.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// A local fault while downloading (output directory, markers, client).
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// The output directory could not be created.
    #[error("failed to create output directory {path}: {source}")]
    OutputDir {
        /// The output directory.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A worker or the producer panicked.
    #[error("backup task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Counters for one backup run.
///
/// Uses atomic counters for thread-safe updates from concurrent workers.
#[derive(Debug, Default)]
pub struct BackupStats {
    discovered: AtomicUsize,
    downloaded: AtomicUsize,
    already_present: AtomicUsize,
    unavailable: AtomicUsize,
    abandoned: AtomicUsize,
    deferred: AtomicUsize,
    expired: AtomicUsize,
    skipped_failed: AtomicUsize,
    documents: AtomicUsize,
    skipped_documents: AtomicUsize,
}

impl BackupStats {
    /// Creates a new stats tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record_discovered(&self) {
        self.discovered.fetch_add(1, Ordering::SeqCst);
    }

    fn record_skipped_failed(&self) {
        self.skipped_failed.fetch_add(1, Ordering::SeqCst);
    }

    fn record_documents(&self, parsed: usize, skipped: usize) {
        self.documents.fetch_add(parsed, Ordering::SeqCst);
        self.skipped_documents.fetch_add(skipped, Ordering::SeqCst);
    }

    fn record(&self, outcome: &DownloadOutcome) {
        let counter = match outcome {
            DownloadOutcome::AlreadyPresent => &self.already_present,
            DownloadOutcome::Downloaded { .. } => &self.downloaded,
            DownloadOutcome::Unavailable { .. } => &self.unavailable,
            DownloadOutcome::Abandoned(_) => &self.abandoned,
            DownloadOutcome::RetryLater { .. } => &self.deferred,
            DownloadOutcome::Expired { .. } => &self.expired,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    /// Returns a plain copy of the counters.
    #[must_use]
    pub fn snapshot(&self) -> BackupSummary {
        BackupSummary {
            documents: self.documents.load(Ordering::SeqCst),
            skipped_documents: self.skipped_documents.load(Ordering::SeqCst),
            discovered: self.discovered.load(Ordering::SeqCst),
            downloaded: self.downloaded.load(Ordering::SeqCst),
            already_present: self.already_present.load(Ordering::SeqCst),
            unavailable: self.unavailable.load(Ordering::SeqCst),
            abandoned: self.abandoned.load(Ordering::SeqCst),
            deferred: self.deferred.load(Ordering::SeqCst),
            expired: self.expired.load(Ordering::SeqCst),
            skipped_failed: self.skipped_failed.load(Ordering::SeqCst),
        }
    }
}

/// Final counts of a backup run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BackupSummary {
    /// Export documents parsed.
    pub documents: usize,
    /// Files in the export tree that were not valid JSON.
    pub skipped_documents: usize,
    /// File references found (duplicates included).
    pub discovered: usize,
    /// Files fetched and saved.
    pub downloaded: usize,
    /// References whose destination already existed.
    pub already_present: usize,
    /// Files the server refused with a final status (empty destination written).
    pub unavailable: usize,
    /// Files abandoned on a broken redirect chain.
    pub abandoned: usize,
    /// Files left for a later run after network failures.
    pub deferred: usize,
    /// Files given up on after the retry window (empty destination written).
    pub expired: usize,
    /// Duplicate references skipped because the target already failed this run.
    pub skipped_failed: usize,
}

impl BackupSummary {
    /// References that reached any outcome.
    #[must_use]
    pub fn processed(&self) -> usize {
        self.downloaded
            + self.already_present
            + self.unavailable
            + self.abandoned
            + self.deferred
            + self.expired
            + self.skipped_failed
    }
}

/// Coordinates the producer, the work queue and the worker pool.
#[derive(Debug)]
pub struct Downloader {
    config: BackupConfig,
    client: HttpClient,
    locks: Arc<KeyedLocks>,
}

impl Downloader {
    /// Creates a downloader, building an HTTP client from the configured timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::Config`] for an invalid configuration and
    /// [`BackupError::Download`] if the HTTP client cannot be built.
    pub fn new(config: BackupConfig) -> Result<Self, BackupError> {
        config.validate()?;
        let client = HttpClient::from_config(&config)?;
        Self::with_client(config, client)
    }

    /// Creates a downloader with an existing HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::Config`] for an invalid configuration.
    #[instrument(level = "debug", skip(client))]
    pub fn with_client(config: BackupConfig, client: HttpClient) -> Result<Self, BackupError> {
        config.validate()?;
        debug!(
            workers = config.workers,
            max_attempts = config.max_attempts,
            max_redirects = config.max_redirects,
            retry_window_secs = config.retry_window.as_secs(),
            "creating downloader"
        );
        Ok(Self {
            config,
            client,
            locks: Arc::new(KeyedLocks::new()),
        })
    }

    #[must_use]
    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    /// The per-target lock table shared by the workers.
    #[must_use]
    pub fn locks(&self) -> &KeyedLocks {
        &self.locks
    }

    /// Backs up every file referenced under `source_root` into `output_dir`.
    ///
    /// Returns once the producer has walked the whole tree and every worker
    /// has drained the queue.
    ///
    /// # Errors
    ///
    /// Individual download failures never fail the run. Errors are returned
    /// only for fatal faults: the tree cannot be walked, the output directory
    /// cannot be written, or a task panicked. The first such fault stops the
    /// producer and cancels the remaining workers.
    #[instrument(skip(self, credential), fields(source_root = %source_root.display(), output_dir = %output_dir.display()))]
    pub async fn run_all(
        &self,
        source_root: &Path,
        output_dir: &Path,
        credential: Option<BearerToken>,
    ) -> Result<BackupSummary, BackupError> {
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|source| BackupError::OutputDir {
                path: output_dir.to_path_buf(),
                source,
            })?;

        if credential.is_none() {
            warn!("no credential supplied; private files will likely be unavailable");
        }

        let downloader = Arc::new(
            FileDownloader::from_config(self.client.clone(), output_dir, &self.config)
                .with_credential(credential),
        );
        let stats = Arc::new(BackupStats::new());
        let failed_this_run: Arc<DashSet<TargetId>> = Arc::new(DashSet::new());
        let (sender, receiver) = async_channel::unbounded::<FileReference>();

        info!(workers = self.config.workers, "starting backup");

        let mut tasks: JoinSet<Result<(), BackupError>> = JoinSet::new();

        // Spawned tasks start detached; carry the run span into each of them.
        for worker_id in 0..self.config.workers {
            tasks.spawn(
                run_worker(
                    worker_id,
                    receiver.clone(),
                    Arc::clone(&downloader),
                    Arc::clone(&self.locks),
                    Arc::clone(&failed_this_run),
                    Arc::clone(&stats),
                )
                .instrument(Span::current()),
            );
        }

        let classifier = self.config.classifier();
        let root = source_root.to_path_buf();
        let producer_stats = Arc::clone(&stats);
        let producer_span = Span::current();
        tasks.spawn_blocking(move || {
            let _entered = producer_span.enter();
            // The sender is dropped when this closure returns, closing the queue.
            let summary = scan_tree(&root, &classifier, |reference| {
                producer_stats.record_discovered();
                sender.send_blocking(reference).is_ok()
            })?;
            producer_stats.record_documents(summary.documents, summary.skipped_documents);
            info!(
                documents = summary.documents,
                skipped_documents = summary.skipped_documents,
                references = summary.references,
                "export tree scanned"
            );
            Ok(())
        });

        while let Some(joined) = tasks.join_next().await {
            let failure = match joined {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(e) => BackupError::Task(e),
            };
            warn!(error = %failure, "aborting backup");
            receiver.close();
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
            return Err(failure);
        }

        let summary = stats.snapshot();
        info!(
            discovered = summary.discovered,
            downloaded = summary.downloaded,
            already_present = summary.already_present,
            unavailable = summary.unavailable,
            abandoned = summary.abandoned,
            deferred = summary.deferred,
            expired = summary.expired,
            skipped_failed = summary.skipped_failed,
            "backup complete"
        );
        Ok(summary)
    }
}

/// Pops references until the queue is closed and empty.
async fn run_worker(
    worker_id: usize,
    receiver: Receiver<FileReference>,
    downloader: Arc<FileDownloader>,
    locks: Arc<KeyedLocks>,
    failed_this_run: Arc<DashSet<TargetId>>,
    stats: Arc<BackupStats>,
) -> Result<(), BackupError> {
    debug!(worker_id, "worker started");
    let downloader = downloader.as_ref();
    let failed_this_run = failed_this_run.as_ref();

    while let Ok(reference) = receiver.recv().await {
        let target = TargetId::from_source(reference.source());
        let target_ref = &target;

        let outcome = locks
            .with_lock(target.as_str(), || async move {
                if failed_this_run.contains(target_ref) {
                    debug!(target = %target_ref, "already failed this run, skipping");
                    return Ok(None);
                }
                let outcome = downloader.download(reference).await?;
                if outcome.is_transient_failure() {
                    failed_this_run.insert(target_ref.clone());
                }
                Ok::<_, DownloadError>(Some(outcome))
            })
            .await?;

        match outcome {
            Some(outcome) => stats.record(&outcome),
            None => stats.record_skipped_failed(),
        }
    }

    debug!(worker_id, "worker finished");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::download::task::RedirectAnomaly;

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = BackupConfig {
            workers: 0,
            ..BackupConfig::default()
        };
        let result = Downloader::new(config);
        assert!(matches!(result, Err(BackupError::Config(_))));
    }

    #[test]
    fn test_new_keeps_config() {
        let config = BackupConfig {
            workers: 2,
            ..BackupConfig::default()
        };
        let downloader = Downloader::new(config.clone()).unwrap();
        assert_eq!(downloader.config(), &config);
        assert!(downloader.locks().is_empty());
    }

    #[test]
    fn test_stats_record_each_outcome() {
        let stats = BackupStats::new();
        stats.record(&DownloadOutcome::AlreadyPresent);
        stats.record(&DownloadOutcome::Downloaded {
            bytes: 1,
            attempts: 1,
        });
        stats.record(&DownloadOutcome::Unavailable { status: 404 });
        stats.record(&DownloadOutcome::Abandoned(RedirectAnomaly::MissingLocation));
        stats.record(&DownloadOutcome::RetryLater { attempts: 3 });
        stats.record(&DownloadOutcome::Expired { attempts: 3 });
        stats.record_skipped_failed();

        let summary = stats.snapshot();
        assert_eq!(summary.already_present, 1);
        assert_eq!(summary.downloaded, 1);
        assert_eq!(summary.unavailable, 1);
        assert_eq!(summary.abandoned, 1);
        assert_eq!(summary.deferred, 1);
        assert_eq!(summary.expired, 1);
        assert_eq!(summary.skipped_failed, 1);
        assert_eq!(summary.processed(), 7);
    }

    #[test]
    fn test_stats_thread_safe() {
        use std::thread;

        let stats = Arc::new(BackupStats::new());
        let mut handles = Vec::new();

        for _ in 0..10 {
            let stats = Arc::clone(&stats);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    stats.record_discovered();
                    stats.record(&DownloadOutcome::AlreadyPresent);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let summary = stats.snapshot();
        assert_eq!(summary.discovered, 1000);
        assert_eq!(summary.already_present, 1000);
    }

    #[test]
    fn test_summary_serializes_as_json() {
        let summary = BackupSummary {
            downloaded: 2,
            ..BackupSummary::default()
        };
        let json = serde_json::to_value(summary).unwrap();
        assert_eq!(json["downloaded"], 2);
        assert_eq!(json["deferred"], 0);
    }
}
