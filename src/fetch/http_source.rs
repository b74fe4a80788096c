//! HTTP(S) archive source backed by reqwest.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::ArchiveSource;
use crate::error::FetchError;
use crate::locator::Locator;

/// Default whole-transfer timeout.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(120);

/// Default redirect limit.
pub const DEFAULT_MAX_REDIRECTS: usize = 5;

/// Settings for [`HttpArchiveSource`].
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent sent with every request
    pub user_agent: String,

    /// Timeout covering connect, headers and body
    pub timeout: Duration,

    /// Maximum redirects to follow
    pub max_redirects: usize,

    /// Optional cap on the archive size in bytes
    pub max_bytes: Option<u64>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("folio-streamer/{}", env!("CARGO_PKG_VERSION")),
            timeout: DEFAULT_FETCH_TIMEOUT,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            max_bytes: None,
        }
    }
}

/// Streams archives over HTTP(S) to disk.
///
/// Certificates are verified (rustls with webpki roots), redirects are bounded
/// and the transfer is subject to a single overall timeout.
#[derive(Clone)]
pub struct HttpArchiveSource {
    client: Client,
    config: FetchConfig,
}

impl HttpArchiveSource {
    /// Build a source with the given settings.
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .build()
            .map_err(|e| FetchError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    fn map_error(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout {
                seconds: self.config.timeout.as_secs(),
            }
        } else if let Some(status) = err.status() {
            FetchError::Status {
                status: status.as_u16(),
            }
        } else {
            FetchError::Network(err.to_string())
        }
    }

    fn check_size(&self, size: u64) -> Result<(), FetchError> {
        match self.config.max_bytes {
            Some(limit) if size > limit => Err(FetchError::TooLarge { size, limit }),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ArchiveSource for HttpArchiveSource {
    async fn fetch(&self, locator: &Locator, dest: &Path) -> Result<u64, FetchError> {
        let mut response = self
            .client
            .get(locator.source_url().as_str())
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }
        if let Some(len) = response.content_length() {
            self.check_size(len)?;
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| FetchError::Io(e.to_string()))?;

        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await.map_err(|e| self.map_error(e))? {
            written += chunk.len() as u64;
            self.check_size(written)?;
            file.write_all(&chunk)
                .await
                .map_err(|e| FetchError::Io(e.to_string()))?;
        }
        file.flush().await.map_err(|e| FetchError::Io(e.to_string()))?;
        file.sync_all()
            .await
            .map_err(|e| FetchError::Io(e.to_string()))?;

        debug!(
            hash = locator.hash(),
            bytes = written,
            "Downloaded {}",
            locator.source_url()
        );
        Ok(written)
    }
}
