//! File-name constants for the destination directory.

/// Suffix of the marker recording the first network failure of a target.
pub const FAILURE_MARKER_SUFFIX: &str = ".err";

/// Suffix of the file a body is streamed into before it is moved into place.
pub const PARTIAL_SUFFIX: &str = ".part";
