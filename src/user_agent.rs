//! User-Agent string for download requests.

/// Product token sent with every request.
const PRODUCT: &str = "export-files";

/// Default User-Agent for download requests (identifies the tool).
#[must_use]
pub(crate) fn default_download_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("{PRODUCT}/{version} (archive-backup)")
}
