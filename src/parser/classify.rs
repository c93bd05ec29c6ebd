//! URL classification for strings found in export documents.
//!
//! Every scalar string in an export is a candidate. [`UrlClassifier::classify`]
//! decides whether it names a downloadable file, and if so whether the file
//! needs the bearer credential to fetch.

use std::sync::LazyLock;

use regex::Regex;
use url::{Origin, Url};

use crate::config::{DEFAULT_FILE_HOST, DEFAULT_SERVICE_DOMAIN};

/// A dot followed by word characters at the very end of a URL path.
#[allow(clippy::expect_used)]
static EXTENSION_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.\w+$").expect("extension regex is valid")); // Static pattern, safe to panic

/// Whether a file reference requires the authorization credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    /// Fetched anonymously.
    Public,
    /// Fetched with `Authorization: Bearer <token>`.
    Private,
}

impl Visibility {
    /// Log level used when the remote answers with an unusable status.
    ///
    /// A private file going missing means the credential or the export is
    /// broken, which an operator has to look at; a dead public link is routine.
    #[must_use]
    pub fn unavailable_level(self) -> tracing::Level {
        match self {
            Self::Private => tracing::Level::ERROR,
            Self::Public => tracing::Level::WARN,
        }
    }

    /// Returns the stable label used in logs and summaries.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

/// A downloadable file discovered in an export document.
///
/// `source` is the string exactly as it appeared in the document and is the
/// identity of the reference. `uri` starts out as the parsed source and moves
/// along redirects; `visibility` never changes once assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReference {
    source: String,
    uri: Url,
    visibility: Visibility,
    credential_origin: Option<Origin>,
}

impl FileReference {
    /// Creates a reference to a file fetched without credentials.
    #[must_use]
    pub fn public(source: impl Into<String>, uri: Url) -> Self {
        Self {
            source: source.into(),
            uri,
            visibility: Visibility::Public,
            credential_origin: None,
        }
    }

    /// Creates a reference to a file that requires the bearer credential.
    ///
    /// The credential is only ever sent to the origin (scheme, host and port)
    /// the reference started on.
    #[must_use]
    pub fn private(source: impl Into<String>, uri: Url) -> Self {
        let credential_origin = Some(uri.origin());
        Self {
            source: source.into(),
            uri,
            visibility: Visibility::Private,
            credential_origin,
        }
    }

    /// The raw string this reference was extracted from.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The URI the next request will be sent to.
    #[must_use]
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    #[must_use]
    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// Moves the reference to a redirect target.
    ///
    /// Only absolute HTTP(S) targets are accepted; anything else leaves the
    /// reference untouched and returns `false`.
    pub fn follow(&mut self, target: Url) -> bool {
        if !is_web_scheme(&target) {
            return false;
        }
        self.uri = target;
        true
    }

    /// Whether a request to the current URI should carry the credential.
    #[must_use]
    pub fn wants_credential(&self) -> bool {
        self.visibility == Visibility::Private
            && self.credential_origin.as_ref() == Some(&self.uri.origin())
    }
}

/// Result of classifying one string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Not an HTTP(S) URL, or a URL that does not look like a file.
    NotAFile,
    /// A page on the service itself; valid, but never downloaded.
    SkipHost,
    /// A file that can be fetched anonymously.
    PublicFile(Url),
    /// A file on the canonical file host that needs the bearer credential.
    PrivateFile(Url),
}

impl Classification {
    /// Turns a file classification into a [`FileReference`] for `source`.
    ///
    /// Returns `None` for [`Classification::NotAFile`] and [`Classification::SkipHost`].
    #[must_use]
    pub fn into_reference(self, source: &str) -> Option<FileReference> {
        match self {
            Self::PublicFile(uri) => Some(FileReference::public(source, uri)),
            Self::PrivateFile(uri) => Some(FileReference::private(source, uri)),
            Self::NotAFile | Self::SkipHost => None,
        }
    }
}

/// Host rules used to classify URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlClassifier {
    file_host: String,
    service_domain: String,
}

impl Default for UrlClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_FILE_HOST, DEFAULT_SERVICE_DOMAIN)
    }
}

impl UrlClassifier {
    /// Creates a classifier for the given private file host and service domain.
    ///
    /// Both names are compared case-insensitively.
    #[must_use]
    pub fn new(file_host: &str, service_domain: &str) -> Self {
        Self {
            file_host: file_host.trim().to_ascii_lowercase(),
            service_domain: service_domain
                .trim()
                .trim_start_matches("*.")
                .trim_start_matches('.')
                .to_ascii_lowercase(),
        }
    }

    #[must_use]
    pub fn file_host(&self) -> &str {
        &self.file_host
    }

    #[must_use]
    pub fn service_domain(&self) -> &str {
        &self.service_domain
    }

    /// Classifies a string. Never fails: anything unparseable is [`Classification::NotAFile`].
    #[must_use]
    pub fn classify(&self, candidate: &str) -> Classification {
        let Ok(uri) = Url::parse(candidate) else {
            return Classification::NotAFile;
        };
        if !is_web_scheme(&uri) {
            return Classification::NotAFile;
        }
        let Some(host) = uri.host_str().map(str::to_ascii_lowercase) else {
            return Classification::NotAFile;
        };

        if uri.scheme() == "https" && host == self.file_host {
            return Classification::PrivateFile(uri);
        }

        if self.is_service_host(&host) {
            return Classification::SkipHost;
        }

        if EXTENSION_SUFFIX.is_match(uri.path()) {
            Classification::PublicFile(uri)
        } else {
            Classification::NotAFile
        }
    }

    /// Matches `*.<service_domain>`; the bare domain itself is not a match.
    fn is_service_host(&self, host: &str) -> bool {
        host.strip_suffix(self.service_domain.as_str())
            .is_some_and(|prefix| prefix.len() > 1 && prefix.ends_with('.'))
    }
}

fn is_web_scheme(uri: &Url) -> bool {
    matches!(uri.scheme(), "http" | "https")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn classifier() -> UrlClassifier {
        UrlClassifier::default()
    }

    #[test]
    fn test_private_file_on_https_file_host() {
        let result = classifier().classify("https://files.slack.com/files-pri/T1-F1/report.pdf");
        let Classification::PrivateFile(uri) = result else {
            panic!("expected private file, got {result:?}");
        };
        assert_eq!(uri.scheme(), "https");
        assert_eq!(uri.host_str(), Some("files.slack.com"));
    }

    #[test]
    fn test_private_file_without_extension() {
        let result = classifier().classify("https://files.slack.com/files-pri/T1-F1/download");
        assert!(matches!(result, Classification::PrivateFile(_)));
    }

    #[test]
    fn test_file_host_over_plain_http_is_skipped() {
        let result = classifier().classify("http://files.slack.com/files-pri/T1-F1/report.pdf");
        assert_eq!(result, Classification::SkipHost);
    }

    #[test]
    fn test_service_subdomain_skipped_regardless_of_path() {
        for candidate in [
            "https://acme.slack.com/archives/C123/p1",
            "https://acme.slack.com/files/U1/F1/image.png",
            "http://app.slack.com/client",
        ] {
            assert_eq!(
                classifier().classify(candidate),
                Classification::SkipHost,
                "{candidate}"
            );
        }
    }

    #[test]
    fn test_bare_service_domain_is_not_a_subdomain() {
        assert_eq!(
            classifier().classify("https://slack.com/help/logo.png"),
            Classification::PublicFile(Url::parse("https://slack.com/help/logo.png").unwrap())
        );
        assert_eq!(
            classifier().classify("https://notslack.com/a.png"),
            Classification::PublicFile(Url::parse("https://notslack.com/a.png").unwrap())
        );
    }

    #[test]
    fn test_public_file_requires_extension_suffix() {
        assert!(matches!(
            classifier().classify("https://example.com/img/cat.jpeg?size=large"),
            Classification::PublicFile(_)
        ));
        assert_eq!(
            classifier().classify("https://example.com/articles/42"),
            Classification::NotAFile
        );
        assert_eq!(
            classifier().classify("https://example.com/dir/"),
            Classification::NotAFile
        );
    }

    #[test]
    fn test_non_web_strings_are_not_files() {
        for candidate in [
            "",
            "hello world",
            "see https://example.com/a.png",
            "ftp://example.com/a.png",
            "mailto:someone@example.com",
            "file:///etc/passwd.txt",
            "https://",
            "://broken.png",
            "U012AB3CD",
        ] {
            assert_eq!(
                classifier().classify(candidate),
                Classification::NotAFile,
                "{candidate:?}"
            );
        }
    }

    #[test]
    fn test_host_comparison_is_case_insensitive() {
        let custom = UrlClassifier::new("Files.Example.ORG", "*.Example.org");
        assert!(matches!(
            custom.classify("https://FILES.example.org/x"),
            Classification::PrivateFile(_)
        ));
        assert_eq!(
            custom.classify("https://Team.EXAMPLE.org/page.html"),
            Classification::SkipHost
        );
    }

    #[test]
    fn test_into_reference_filters_non_files() {
        assert!(Classification::NotAFile.into_reference("x").is_none());
        assert!(Classification::SkipHost.into_reference("x").is_none());

        let uri = Url::parse("https://example.com/a.png").unwrap();
        let reference = Classification::PublicFile(uri.clone())
            .into_reference("https://example.com/a.png")
            .unwrap();
        assert_eq!(reference.visibility(), Visibility::Public);
        assert_eq!(reference.uri(), &uri);
        assert_eq!(reference.source(), "https://example.com/a.png");
    }

    #[test]
    fn test_follow_rejects_non_web_targets() {
        let uri = Url::parse("https://files.slack.com/a.png").unwrap();
        let mut reference = FileReference::private(uri.as_str(), uri.clone());

        assert!(!reference.follow(Url::parse("ftp://files.slack.com/a.png").unwrap()));
        assert_eq!(reference.uri(), &uri);

        let next = Url::parse("https://cdn.example.com/a.png").unwrap();
        assert!(reference.follow(next.clone()));
        assert_eq!(reference.uri(), &next);
        assert_eq!(reference.visibility(), Visibility::Private);
        assert_eq!(reference.source(), uri.as_str());
    }

    #[test]
    fn test_credential_only_sent_to_original_host() {
        let uri = Url::parse("https://files.slack.com/a.png").unwrap();
        let mut reference = FileReference::private(uri.as_str().to_string(), uri);
        assert!(reference.wants_credential());

        reference.follow(Url::parse("https://files.slack.com/b.png").unwrap());
        assert!(reference.wants_credential());

        reference.follow(Url::parse("https://cdn.example.com/a.png").unwrap());
        assert!(!reference.wants_credential());

        let public = FileReference::public("x", Url::parse("https://example.com/a.png").unwrap());
        assert!(!public.wants_credential());
    }

    #[test]
    fn test_credential_dropped_on_scheme_or_port_change() {
        let uri = Url::parse("https://files.slack.com/files-pri/T1-F1/a.png").unwrap();
        let mut reference = FileReference::private(uri.as_str().to_string(), uri);

        let downgraded = Url::parse("http://files.slack.com/files-pri/T1-F1/a.png").unwrap();
        assert!(reference.follow(downgraded));
        assert_eq!(reference.uri().scheme(), "http");
        assert!(!reference.wants_credential());

        reference.follow(Url::parse("https://files.slack.com:8443/a.png").unwrap());
        assert!(!reference.wants_credential());

        // Explicit default port is the same origin.
        reference.follow(Url::parse("https://files.slack.com:443/a.png").unwrap());
        assert!(reference.wants_credential());
    }

    #[test]
    fn test_unavailable_level_by_visibility() {
        assert_eq!(Visibility::Private.unavailable_level(), tracing::Level::ERROR);
        assert_eq!(Visibility::Public.unavailable_level(), tracing::Level::WARN);
    }
}
