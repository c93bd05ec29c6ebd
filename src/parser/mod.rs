//! Discovery of file references inside export documents.
//!
//! # Overview
//!
//! - [`UrlClassifier`] decides what a single string is: not a file, a service
//!   page that is deliberately skipped, a public file, or a private file
//!   that needs the bearer credential.
//! - [`extract_references`] walks an arbitrary JSON document and yields a
//!   [`FileReference`] for every string the classifier accepts.
//!
//! # Example
//!
//! ```
//! use export_files_core::parser::{UrlClassifier, Visibility, extract_references};
//! use serde_json::json;
//!
//! let classifier = UrlClassifier::default();
//! let message = json!({
//!     "text": "see attached",
//!     "files": [{"url_private": "https://files.slack.com/files-pri/T1-F1/notes.txt"}]
//! });
//! let references: Vec<_> = extract_references(&classifier, &message).collect();
//! assert_eq!(references.len(), 1);
//! assert_eq!(references[0].visibility(), Visibility::Private);
//! ```

mod classify;
mod extract;

pub use classify::{Classification, FileReference, UrlClassifier, Visibility};
pub use extract::{References, extract_references};
