//! Failure markers that bound retries across runs.
//!
//! When a file keeps failing at the network level, a marker file is created
//! next to its destination on the first failure and never rewritten. Its
//! modification time is therefore the time of the first failure, and every
//! later failure compares the elapsed time against the retry window. Once the
//! window has passed the file is given up on for good.

use std::path::Path;
use std::time::{Duration, SystemTime};

use tokio::fs::OpenOptions;
use tracing::{debug, instrument};

use super::error::DownloadError;
use super::target::marker_path;
use crate::config::DEFAULT_RETRY_WINDOW;

/// What to do with a target whose attempts for this run are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Leave the destination absent; a later run tries again.
    RetryLater,
    /// The window since the first failure has passed; give up permanently.
    RetryWindowExpired,
}

/// Records first-failure times as marker files next to destinations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureTracker {
    retry_window: Duration,
}

impl Default for FailureTracker {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_WINDOW)
    }
}

impl FailureTracker {
    #[must_use]
    pub fn new(retry_window: Duration) -> Self {
        Self { retry_window }
    }

    #[must_use]
    pub fn retry_window(&self) -> Duration {
        self.retry_window
    }

    /// Records a network-level failure of the target stored at `destination`.
    ///
    /// The first failure creates the marker. Later failures leave it untouched
    /// so the window is measured from the first occurrence. When the window
    /// has passed the marker is removed.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Io`] if the marker cannot be created, inspected or removed.
    #[instrument(skip(self), fields(destination = %destination.display()))]
    pub async fn record_failure(&self, destination: &Path) -> Result<RetryDecision, DownloadError> {
        let marker = marker_path(destination);

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&marker)
            .await
        {
            Ok(_) => {
                debug!(marker = %marker.display(), "first failure recorded");
                return Ok(RetryDecision::RetryLater);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(DownloadError::io(marker, e)),
        }

        let first_failure = tokio::fs::metadata(&marker)
            .await
            .and_then(|meta| meta.modified())
            .map_err(|e| DownloadError::io(marker.clone(), e))?;
        // A marker from the future (clock moved back) counts as brand new.
        let elapsed = SystemTime::now()
            .duration_since(first_failure)
            .unwrap_or(Duration::ZERO);

        if elapsed < self.retry_window {
            debug!(
                elapsed_secs = elapsed.as_secs(),
                window_secs = self.retry_window.as_secs(),
                "still inside retry window"
            );
            return Ok(RetryDecision::RetryLater);
        }

        remove_if_present(&marker).await?;
        debug!(elapsed_secs = elapsed.as_secs(), "retry window expired");
        Ok(RetryDecision::RetryWindowExpired)
    }

    /// Removes the marker of the target at `destination`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Io`] if an existing marker cannot be removed.
    pub async fn clear(&self, destination: &Path) -> Result<(), DownloadError> {
        remove_if_present(&marker_path(destination)).await
    }
}

pub(super) async fn remove_if_present(path: &Path) -> Result<(), DownloadError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DownloadError::io(path, e)),
    }
}
