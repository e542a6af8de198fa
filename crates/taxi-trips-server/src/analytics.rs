//! Per-request timing records for the trips endpoint.
//!
//! Records are shipped on a spawned task after the response is produced;
//! sink failures are only logged.

use std::{sync::Arc, time::Instant};

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use snafu::prelude::*;
use tracing::{debug, error};

/// One timed request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestRecord {
    pub endpoint: String,
    pub method: String,
    /// Wall time spent handling the request, in seconds.
    pub process_time: f64,
    /// When the record was taken (RFC 3339, UTC).
    pub timestamp: String,
}

#[derive(Debug, Snafu)]
pub enum AnalyticsError {
    #[snafu(display("Failed to send analytics record to {url}: {source}"))]
    Send { url: String, source: reqwest::Error },

    #[snafu(display("Analytics sink {url} rejected record with status {status}"))]
    Rejected { url: String, status: u16 },
}

/// Destination for request records.
#[async_trait::async_trait]
pub trait AnalyticsSink: Send + Sync + 'static {
    async fn record(&self, record: RequestRecord) -> Result<(), AnalyticsError>;
}

/// Indexes each record as a document in an Elasticsearch index.
#[derive(Debug, Clone)]
pub struct ElasticsearchSink {
    client: reqwest::Client,
    url: String,
}

impl ElasticsearchSink {
    pub fn new(host: &str, index: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            url: format!("{}/{index}/_doc", host.trim_end_matches('/')),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl AnalyticsSink for ElasticsearchSink {
    async fn record(&self, record: RequestRecord) -> Result<(), AnalyticsError> {
        let response = self
            .client
            .post(&self.url)
            .json(&record)
            .send()
            .await
            .context(SendSnafu { url: &self.url })?;

        let status = response.status();
        ensure!(
            status.is_success(),
            RejectedSnafu {
                url: &self.url,
                status: status.as_u16(),
            }
        );
        Ok(())
    }
}

/// Middleware timing each request it wraps and handing the record to `sink`.
pub async fn record_request_timing(
    State(sink): State<Arc<dyn AnalyticsSink>>,
    request: Request,
    next: Next,
) -> Response {
    let endpoint = request.uri().path().to_string();
    let method = request.method().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    let record = RequestRecord {
        endpoint,
        method,
        process_time: started.elapsed().as_secs_f64(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
    };
    debug!(
        "{} {} took {:.6}s",
        record.method, record.endpoint, record.process_time
    );

    tokio::spawn(async move {
        if let Err(e) = sink.record(record).await {
            error!("Dropping analytics record: {e}");
        }
    });

    response
}
