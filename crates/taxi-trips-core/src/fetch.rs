//! Remote fetch of partition files.
//!
//! The cache never talks HTTP directly; it goes through [`PartitionFetcher`]
//! so callers can swap in a fetcher with timeouts, concurrency limits or a
//! canned response set (tests) without touching the cache contract.

use std::time::Duration;

use bytes::Bytes;
use snafu::prelude::*;

/// What a single fetch attempt produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The remote returned 200 with this body.
    Body(Bytes),
    /// The remote answered with a non-200 status; the partition does not
    /// exist upstream (for example a month that is not published yet).
    Missing {
        /// HTTP status code that was returned.
        status: u16,
    },
}

/// Transport-level failures. A non-200 status is not an error.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum FetchError {
    /// Building the HTTP client failed.
    #[snafu(display("Failed to build HTTP client: {source}"))]
    BuildClient {
        /// Underlying reqwest error.
        source: reqwest::Error,
    },

    /// The request could not be sent or the body could not be read.
    #[snafu(display("Request to {url} failed: {source}"))]
    Request {
        /// URL that was requested.
        url: String,
        /// Underlying reqwest error.
        source: reqwest::Error,
    },
}

/// Fetches a partition file by URL.
#[async_trait::async_trait]
pub trait PartitionFetcher: Send + Sync + 'static {
    /// Issue one request for `url`. No retries.
    async fn fetch(&self, url: &str) -> Result<FetchOutcome, FetchError>;
}

/// [`PartitionFetcher`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Client without a request timeout.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(None)
    }

    /// Client with an optional whole-request timeout.
    pub fn with_timeout(timeout: Option<Duration>) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context(BuildClientSnafu)?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl PartitionFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchOutcome, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context(RequestSnafu { url })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Ok(FetchOutcome::Missing {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.context(RequestSnafu { url })?;
        Ok(FetchOutcome::Body(body))
    }
}
