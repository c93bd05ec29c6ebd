//! HTTP client wrapper for fetching referenced files.
//!
//! This module provides the `HttpClient` struct, which issues single GET
//! requests with redirects disabled (the download state machine follows them
//! itself) and streams bodies to disk without ever leaving a truncated file
//! at the destination.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::AUTHORIZATION;
use reqwest::redirect::Policy;
use reqwest::{Client, Response};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, trace};

use super::error::DownloadError;
use super::target::partial_path;
use super::tracker::remove_if_present;
use crate::config::{BackupConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT};
use crate::parser::FileReference;
use crate::user_agent;

/// Bearer credential for private files.
///
/// `Debug` never prints the token.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    fn header_value(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(<redacted>)")
    }
}

/// HTTP client for downloading files with streaming support.
///
/// This client is designed to be created once and shared by every worker,
/// taking advantage of connection pooling.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Creates a client with the default 15 second connect and read timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::ClientBuild`] if the TLS backend cannot be initialised.
    pub fn new() -> Result<Self, DownloadError> {
        Self::with_timeouts(DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT)
    }

    /// Creates a client with the timeouts of a backup configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::ClientBuild`] if the TLS backend cannot be initialised.
    pub fn from_config(config: &BackupConfig) -> Result<Self, DownloadError> {
        Self::with_timeouts(config.connect_timeout, config.read_timeout)
    }

    /// Creates a client with explicit timeouts.
    ///
    /// The connect timeout covers the TCP connect and the TLS handshake; the
    /// read timeout bounds every individual read of headers and body.
    ///
    /// There is no write timeout. reqwest exposes none, and a GET only writes
    /// its request head, so a peer that stops reading stalls the connection
    /// until the read timeout fires waiting for the response.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::ClientBuild`] if the TLS backend cannot be initialised.
    pub fn with_timeouts(
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .redirect(Policy::none())
            .gzip(true)
            .user_agent(user_agent::default_download_user_agent())
            .build()
            .map_err(|source| DownloadError::ClientBuild { source })?;
        Ok(Self { client })
    }

    /// Sends one GET to the reference's current URI.
    ///
    /// The credential is attached only when the reference asks for it (a
    /// private file still on its original host). The response is returned
    /// whatever its status; redirects are not followed.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Network`] or [`DownloadError::Timeout`] when
    /// no response arrives.
    pub async fn get(
        &self,
        reference: &FileReference,
        credential: Option<&BearerToken>,
    ) -> Result<Response, DownloadError> {
        let url = reference.uri().as_str();
        let mut request = self.client.get(reference.uri().clone());
        if reference.wants_credential()
            && let Some(token) = credential
        {
            trace!("attaching bearer credential");
            request = request.header(AUTHORIZATION, token.header_value());
        }

        request
            .send()
            .await
            .map_err(|e| DownloadError::network(url, e))
    }
}

/// Streams a response body into `destination`, returning the byte count.
///
/// The body goes to a sibling partial file which is renamed onto the
/// destination only after a complete flush. If the body breaks off, the
/// partial file is deleted and a transient error is returned.
///
/// # Errors
///
/// - [`DownloadError::Network`] / [`DownloadError::Timeout`] if the body read fails (transient)
/// - [`DownloadError::PartialWrite`] if writing a chunk fails (transient)
/// - [`DownloadError::Io`] if the partial file cannot be created or moved into place (fatal)
pub async fn save_body(
    response: Response,
    url: &str,
    destination: &Path,
) -> Result<u64, DownloadError> {
    let partial = partial_path(destination);
    let mut file = File::create(&partial)
        .await
        .map_err(|e| DownloadError::io(partial.clone(), e))?;

    let streamed = stream_to_file(&mut file, response, url, &partial).await;
    drop(file);

    let bytes_written = match streamed {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(path = %partial.display(), "cleaning up partial file after error");
            remove_if_present(&partial).await?;
            return Err(e);
        }
    };

    tokio::fs::rename(&partial, destination)
        .await
        .map_err(|e| DownloadError::io(destination, e))?;
    Ok(bytes_written)
}

/// Streams response body to file, returning bytes written.
async fn stream_to_file(
    file: &mut File,
    response: Response,
    url: &str,
    file_path: &Path,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::network(url, e))?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::partial_write(url, file_path, e))?;

        bytes_written += chunk.len() as u64;
    }

    // Ensure all data is flushed to disk
    writer
        .flush()
        .await
        .map_err(|e| DownloadError::partial_write(url, file_path, e))?;

    Ok(bytes_written)
}
