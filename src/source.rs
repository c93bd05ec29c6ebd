//! Walks an export tree and feeds the file references it contains to a sink.
//!
//! Every regular file under the root is expected to hold one JSON document.
//! Files that do not parse are skipped with a warning; a tree that cannot be
//! walked or read is an environment fault and stops the scan.

use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

use crate::parser::{FileReference, UrlClassifier, extract_references};

/// Errors that stop a scan.
#[derive(Debug, Error)]
pub enum SourceError {
    /// A directory entry could not be listed.
    #[error("failed to walk export tree at {path}: {source}")]
    Walk {
        /// Path being walked when the error occurred.
        path: PathBuf,
        /// Underlying walkdir error.
        #[source]
        source: walkdir::Error,
    },

    /// A document could not be read.
    #[error("failed to read document {path}: {source}")]
    Read {
        /// The document path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Counts from one scan of an export tree.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanSummary {
    /// Documents parsed successfully.
    pub documents: usize,
    /// Files skipped because they were not valid JSON.
    pub skipped_documents: usize,
    /// References handed to the sink.
    pub references: usize,
    /// Whether the sink stopped the scan early.
    pub stopped: bool,
}

/// Scans every file under `root` in file-name order.
///
/// `sink` receives each reference and returns `false` to stop the scan (for
/// example when the work queue has been closed).
///
/// # Errors
///
/// Returns [`SourceError`] if the tree cannot be walked or a file cannot be read.
#[instrument(skip(classifier, sink), fields(root = %root.display()))]
pub fn scan_tree<F>(
    root: &Path,
    classifier: &UrlClassifier,
    mut sink: F,
) -> Result<ScanSummary, SourceError>
where
    F: FnMut(FileReference) -> bool,
{
    let mut summary = ScanSummary::default();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|source| SourceError::Walk {
            path: source
                .path()
                .map_or_else(|| root.to_path_buf(), Path::to_path_buf),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let raw = std::fs::read(path).map_err(|source| SourceError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let document: Value = match serde_json::from_slice(&raw) {
            Ok(document) => document,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping document that is not valid JSON");
                summary.skipped_documents += 1;
                continue;
            }
        };
        summary.documents += 1;

        let mut found = 0usize;
        for reference in extract_references(classifier, &document) {
            found += 1;
            if !sink(reference) {
                summary.references += found;
                summary.stopped = true;
                debug!(path = %path.display(), "scan stopped by sink");
                return Ok(summary);
            }
        }
        summary.references += found;
        debug!(path = %path.display(), references = found, "scanned document");
    }

    Ok(summary)
}
