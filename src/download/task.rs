//! Per-file download state machine.
//!
//! [`FileDownloader::download`] takes one [`FileReference`] to a terminal
//! [`DownloadOutcome`]:
//!
//! ```text
//! NotStarted ─► (Redirect)* ─► Downloaded          content at destination
//!                          ├─► Unavailable         empty destination, never retried
//!                          ├─► Abandoned           redirect dead end, no file
//!                          └─► network failure ─► retry (bounded) ─► FailureTracker
//!                                                                    ├─► RetryLater (next run)
//!                                                                    └─► Expired (empty destination)
//! ```
//!
//! A present destination file, empty or not, means the target is settled and
//! no request is made for it again.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use reqwest::header::{HeaderMap, LOCATION};
use tracing::{Level, debug, error, info, instrument, warn};
use url::Url;

use super::client::{BearerToken, HttpClient, save_body};
use super::error::DownloadError;
use super::retry::RetryPolicy;
use super::target::TargetId;
use super::tracker::{FailureTracker, RetryDecision};
use crate::config::{BackupConfig, DEFAULT_MAX_REDIRECTS};
use crate::parser::FileReference;

/// Why a redirect chain was given up on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectAnomaly {
    /// A 301/302 without a usable `Location` header.
    MissingLocation,
    /// The `Location` resolves to something other than an absolute HTTP(S) URI.
    NotHttp {
        /// The raw header value.
        location: String,
    },
    /// The chain came back to a URI it already visited (including itself).
    Loop {
        /// The URI that was seen twice.
        uri: String,
    },
    /// More redirects than allowed in one attempt.
    TooManyRedirects {
        /// The configured limit.
        limit: u32,
    },
}

impl fmt::Display for RedirectAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingLocation => f.write_str("redirect without Location header"),
            Self::NotHttp { location } => write!(f, "redirect to non-HTTP target {location}"),
            Self::Loop { uri } => write!(f, "redirect loop back to {uri}"),
            Self::TooManyRedirects { limit } => write!(f, "more than {limit} redirects"),
        }
    }
}

/// Terminal result of downloading one reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The destination already existed; nothing was requested.
    AlreadyPresent,
    /// The body was saved at the destination.
    Downloaded {
        /// Size of the saved body.
        bytes: u64,
        /// Attempts used in this run.
        attempts: u32,
    },
    /// The server answered with a status that will not change; an empty destination was written.
    Unavailable {
        /// The HTTP status received.
        status: u16,
    },
    /// The redirect chain was a dead end; no file was written.
    Abandoned(RedirectAnomaly),
    /// Network failures used up this run's attempts; a later run retries.
    RetryLater {
        /// Attempts used in this run.
        attempts: u32,
    },
    /// Network failures outlasted the retry window; an empty destination was written.
    Expired {
        /// Attempts used in this run.
        attempts: u32,
    },
}

impl DownloadOutcome {
    /// Whether the target failed at the network level and stays retryable.
    #[must_use]
    pub fn is_transient_failure(&self) -> bool {
        matches!(self, Self::RetryLater { .. })
    }
}

/// Result of one attempt, which may span several redirects.
#[derive(Debug)]
enum AttemptOutcome {
    Downloaded { bytes: u64 },
    Unavailable { status: u16 },
    Abandoned(RedirectAnomaly),
    Transient(DownloadError),
}

/// Downloads single references into a content-addressed output directory.
///
/// # Example
///
/// ```no_run
/// use export_files_core::download::{BearerToken, FileDownloader, HttpClient};
/// use export_files_core::parser::UrlClassifier;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let downloader = FileDownloader::new(HttpClient::new()?, "./backup")
///     .with_credential(Some(BearerToken::new("xoxp-token")));
/// let reference = UrlClassifier::default()
///     .classify("https://files.slack.com/files-pri/T1-F1/report.pdf")
///     .into_reference("https://files.slack.com/files-pri/T1-F1/report.pdf")
///     .expect("private file");
/// let outcome = downloader.download(reference).await?;
/// println!("{outcome:?}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FileDownloader {
    client: HttpClient,
    output_dir: PathBuf,
    credential: Option<BearerToken>,
    retry_policy: RetryPolicy,
    tracker: FailureTracker,
    max_redirects: u32,
}

impl FileDownloader {
    /// Creates a downloader with default retry, redirect and window settings.
    #[must_use]
    pub fn new(client: HttpClient, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            output_dir: output_dir.into(),
            credential: None,
            retry_policy: RetryPolicy::default(),
            tracker: FailureTracker::default(),
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }

    /// Creates a downloader using the retry, redirect and window settings of `config`.
    #[must_use]
    pub fn from_config(
        client: HttpClient,
        output_dir: impl Into<PathBuf>,
        config: &BackupConfig,
    ) -> Self {
        Self::new(client, output_dir)
            .with_retry_policy(RetryPolicy::new(
                config.max_attempts,
                config.backoff_base,
                config.backoff_jitter,
            ))
            .with_tracker(FailureTracker::new(config.retry_window))
            .with_max_redirects(config.max_redirects)
    }

    #[must_use]
    pub fn with_credential(mut self, credential: Option<BearerToken>) -> Self {
        self.credential = credential;
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    #[must_use]
    pub fn with_tracker(mut self, tracker: FailureTracker) -> Self {
        self.tracker = tracker;
        self
    }

    #[must_use]
    pub fn with_max_redirects(mut self, max_redirects: u32) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    /// Destination path of a reference.
    #[must_use]
    pub fn destination_for(&self, reference: &FileReference) -> PathBuf {
        TargetId::from_source(reference.source()).destination(&self.output_dir)
    }

    /// Drives one reference to a terminal outcome.
    ///
    /// Callers must serialize calls for the same source string; the engine
    /// does so with [`KeyedLocks`](super::KeyedLocks).
    ///
    /// # Errors
    ///
    /// Only local faults are returned: the output directory cannot be
    /// inspected or written, or a failure marker cannot be managed. Every
    /// network or HTTP failure is folded into the outcome.
    #[instrument(skip(self, reference), fields(source = %reference.source(), visibility = reference.visibility().as_str()))]
    pub async fn download(
        &self,
        mut reference: FileReference,
    ) -> Result<DownloadOutcome, DownloadError> {
        let destination = self.destination_for(&reference);

        if tokio::fs::try_exists(&destination)
            .await
            .map_err(|e| DownloadError::io(destination.clone(), e))?
        {
            debug!(path = %destination.display(), "destination present, skipping");
            return Ok(DownloadOutcome::AlreadyPresent);
        }

        let mut attempt = 0u32;
        let last_error = loop {
            attempt += 1;
            debug!(attempt, uri = %reference.uri(), "attempting download");

            match self.attempt(&mut reference, &destination).await? {
                AttemptOutcome::Downloaded { bytes } => {
                    self.tracker.clear(&destination).await?;
                    info!(path = %destination.display(), bytes, attempts = attempt, "download complete");
                    return Ok(DownloadOutcome::Downloaded {
                        bytes,
                        attempts: attempt,
                    });
                }
                AttemptOutcome::Unavailable { status } => {
                    if reference.visibility().unavailable_level() == Level::ERROR {
                        error!(status, uri = %reference.uri(), "private file unavailable");
                    } else {
                        warn!(status, uri = %reference.uri(), "file unavailable");
                    }
                    self.settle_permanently(&destination).await?;
                    return Ok(DownloadOutcome::Unavailable { status });
                }
                AttemptOutcome::Abandoned(anomaly) => {
                    warn!(uri = %reference.uri(), reason = %anomaly, "abandoning redirect chain");
                    return Ok(DownloadOutcome::Abandoned(anomaly));
                }
                AttemptOutcome::Transient(e) => {
                    if !self.retry_policy.has_attempts_left(attempt) {
                        break e;
                    }
                    let delay = self.retry_policy.backoff_delay();
                    info!(
                        attempt,
                        max_attempts = self.retry_policy.max_attempts(),
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "retrying download"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        };

        match self.tracker.record_failure(&destination).await? {
            RetryDecision::RetryLater => {
                warn!(attempts = attempt, error = %last_error, "download failed, will retry on a later run");
                Ok(DownloadOutcome::RetryLater { attempts: attempt })
            }
            RetryDecision::RetryWindowExpired => {
                warn!(
                    attempts = attempt,
                    window_secs = self.tracker.retry_window().as_secs(),
                    error = %last_error,
                    "retry window expired, giving up"
                );
                self.settle_permanently(&destination).await?;
                Ok(DownloadOutcome::Expired { attempts: attempt })
            }
        }
    }

    /// One attempt: GET, follow up to `max_redirects` redirects, save on 200.
    async fn attempt(
        &self,
        reference: &mut FileReference,
        destination: &Path,
    ) -> Result<AttemptOutcome, DownloadError> {
        let mut visited = HashSet::from([reference.uri().as_str().to_string()]);
        let mut redirects = 0u32;

        loop {
            let response = match self.client.get(reference, self.credential.as_ref()).await {
                Ok(response) => response,
                Err(e) => return transient_or_fatal(e),
            };

            match response.status().as_u16() {
                200 => {
                    let url = reference.uri().as_str().to_string();
                    return match save_body(response, &url, destination).await {
                        Ok(bytes) => Ok(AttemptOutcome::Downloaded { bytes }),
                        Err(e) => transient_or_fatal(e),
                    };
                }
                301 | 302 => {
                    if redirects >= self.max_redirects {
                        return Ok(AttemptOutcome::Abandoned(
                            RedirectAnomaly::TooManyRedirects {
                                limit: self.max_redirects,
                            },
                        ));
                    }
                    let next = match resolve_location(reference.uri(), response.headers()) {
                        Ok(next) => next,
                        Err(anomaly) => return Ok(AttemptOutcome::Abandoned(anomaly)),
                    };
                    if !visited.insert(next.as_str().to_string()) {
                        return Ok(AttemptOutcome::Abandoned(RedirectAnomaly::Loop {
                            uri: next.to_string(),
                        }));
                    }
                    debug!(from = %reference.uri(), to = %next, "following redirect");
                    if !reference.follow(next.clone()) {
                        return Ok(AttemptOutcome::Abandoned(RedirectAnomaly::NotHttp {
                            location: next.to_string(),
                        }));
                    }
                    redirects += 1;
                }
                status => return Ok(AttemptOutcome::Unavailable { status }),
            }
        }
    }

    /// Marks a target as settled for good: empty destination, no marker.
    async fn settle_permanently(&self, destination: &Path) -> Result<(), DownloadError> {
        tokio::fs::write(destination, b"")
            .await
            .map_err(|e| DownloadError::io(destination, e))?;
        self.tracker.clear(destination).await
    }
}

fn transient_or_fatal(error: DownloadError) -> Result<AttemptOutcome, DownloadError> {
    if error.is_transient() {
        Ok(AttemptOutcome::Transient(error))
    } else {
        Err(error)
    }
}

/// Resolves a `Location` header against the URI that returned it.
fn resolve_location(current: &Url, headers: &HeaderMap) -> Result<Url, RedirectAnomaly> {
    let location = headers
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(RedirectAnomaly::MissingLocation)?;

    match current.join(location) {
        Ok(next) if matches!(next.scheme(), "http" | "https") && next.has_host() => Ok(next),
        _ => Err(RedirectAnomaly::NotHttp {
            location: location.to_string(),
        }),
    }
}
