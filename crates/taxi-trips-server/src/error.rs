use std::net::SocketAddr;

use snafu::Snafu;
use taxi_trips_core::{CacheError, FetchError, InvalidPartitionKey, QueryError};

pub type ServerResult<T> = std::result::Result<T, ServerError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ServerError {
    #[snafu(display("Failed to build the partition fetcher: {source}"))]
    BuildFetcher { source: FetchError },

    #[snafu(display(
        "Failed to open cache directory {path}. \
         Ensure the directory is writable."
    ))]
    OpenCache {
        path: String,
        #[snafu(source(from(CacheError, Box::new)))]
        source: Box<CacheError>,
    },

    #[snafu(display("Failed to build the analytics client: {source}"))]
    BuildAnalytics { source: reqwest::Error },

    #[snafu(display("Failed to bind {addr}: {source}"))]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[snafu(display("Server error: {source}"))]
    Serve { source: std::io::Error },

    #[snafu(display("Invalid partition: {source}"))]
    InvalidPartition { source: InvalidPartitionKey },

    #[snafu(display("Failed to load partition: {source}"))]
    Inspect {
        #[snafu(source(from(QueryError, Box::new)))]
        source: Box<QueryError>,
    },

    #[snafu(display("Failed to render trip: {source}"))]
    Render { source: serde_json::Error },
}
