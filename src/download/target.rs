//! Content-addressed identity of a download target.

use std::fmt;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use super::constants::{FAILURE_MARKER_SUFFIX, PARTIAL_SUFFIX};

/// Hex SHA-256 digest of a reference's raw source string.
///
/// Redirects never change it: the same source string always maps to the same
/// lock key, destination file and failure marker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(String);

impl TargetId {
    /// Derives the identity of a raw source string.
    #[must_use]
    pub fn from_source(source: &str) -> Self {
        Self(format!("{:x}", Sha256::digest(source.as_bytes())))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Where the downloaded content lives.
    #[must_use]
    pub fn destination(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(&self.0)
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Failure marker path for a destination.
#[must_use]
pub fn marker_path(destination: &Path) -> PathBuf {
    with_suffix(destination, FAILURE_MARKER_SUFFIX)
}

/// In-progress path for a destination.
#[must_use]
pub fn partial_path(destination: &Path) -> PathBuf {
    with_suffix(destination, PARTIAL_SUFFIX)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw = path.as_os_str().to_os_string();
    raw.push(suffix);
    PathBuf::from(raw)
}
