//! Lazy extraction of file references from nested JSON documents.

use serde_json::Value;
use tracing::trace;

use super::classify::{FileReference, UrlClassifier};

/// Iterator over every file reference reachable from a JSON value.
///
/// Arrays are walked in index order and objects in the map's own iteration
/// order, depth first. Only string scalars are classified; skipped hosts and
/// non-file strings are dropped. Duplicate strings produce duplicate
/// references.
#[derive(Debug)]
pub struct References<'a> {
    classifier: &'a UrlClassifier,
    stack: Vec<&'a Value>,
}

impl<'a> References<'a> {
    fn new(classifier: &'a UrlClassifier, root: &'a Value) -> Self {
        Self {
            classifier,
            stack: vec![root],
        }
    }
}

impl Iterator for References<'_> {
    type Item = FileReference;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(value) = self.stack.pop() {
            match value {
                Value::Array(items) => self.stack.extend(items.iter().rev()),
                Value::Object(map) => self.stack.extend(map.values().rev()),
                Value::String(candidate) => {
                    let classification = self.classifier.classify(candidate);
                    if let Some(reference) = classification.into_reference(candidate) {
                        trace!(source = %candidate, visibility = reference.visibility().as_str(), "found file reference");
                        return Some(reference);
                    }
                }
                Value::Null | Value::Bool(_) | Value::Number(_) => {}
            }
        }
        None
    }
}

/// Returns a lazy sequence of the file references in `document`.
///
/// Calling this again on the same document yields the same sequence.
#[must_use]
pub fn extract_references<'a>(classifier: &'a UrlClassifier, document: &'a Value) -> References<'a> {
    References::new(classifier, document)
}
