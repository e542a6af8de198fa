//! Command-line and environment configuration.
//!
//! Every option can be given as a flag or through the environment variable
//! named next to it; flags win.

use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use clap::Args;
use snafu::ResultExt;
use taxi_trips_core::{
    CacheRoot, HttpFetcher, PartitionCache, PartitionSource,
    query::DEFAULT_MAX_RESULTS,
    source::{DEFAULT_BASE_URL, DEFAULT_DATASET},
};

use crate::{
    analytics::ElasticsearchSink,
    error::{BuildAnalyticsSnafu, BuildFetcherSnafu, OpenCacheSnafu, ServerResult},
};

/// Where partitions are cached and fetched from.
#[derive(Debug, Clone, Args)]
pub struct CacheArgs {
    /// Directory holding downloaded partition files
    #[arg(long, env = "CACHE_DIR", default_value = "/tmp/taxi-data-api")]
    pub cache_dir: PathBuf,

    /// Base URL the monthly Parquet files are published under
    #[arg(long, env = "TRIP_DATA_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub source_base_url: String,

    /// Dataset prefix of the file names (e.g. yellow_tripdata)
    #[arg(long, env = "TRIP_DATASET", default_value = DEFAULT_DATASET)]
    pub dataset: String,

    /// Whole-request timeout for partition downloads; unset means no timeout
    #[arg(long, env = "TRIP_FETCH_TIMEOUT_SECS")]
    pub fetch_timeout_secs: Option<u64>,
}

impl CacheArgs {
    /// Create the cache directory and a cache over it.
    pub async fn open_cache(&self) -> ServerResult<PartitionCache> {
        let fetcher = HttpFetcher::with_timeout(self.fetch_timeout_secs.map(Duration::from_secs))
            .context(BuildFetcherSnafu)?;

        PartitionCache::open(
            CacheRoot::local(self.cache_dir.clone()),
            PartitionSource::new(&self.source_base_url, &self.dataset),
            Arc::new(fetcher),
        )
        .await
        .context(OpenCacheSnafu {
            path: self.cache_dir.display().to_string(),
        })
    }
}

/// Request analytics sink.
#[derive(Debug, Clone, Args)]
pub struct AnalyticsArgs {
    /// Record /trips request timings to Elasticsearch
    #[arg(long = "analytics", env = "TAXI_TRIPS_ANALYTICS", default_value_t = false)]
    pub enabled: bool,

    #[arg(long, env = "ELASTICSEARCH_HOST", default_value = "http://localhost:9200")]
    pub elasticsearch_host: String,

    #[arg(long, env = "ELASTICSEARCH_INDEX", default_value = "taxi_data_api")]
    pub elasticsearch_index: String,
}

impl AnalyticsArgs {
    /// The configured sink, or `None` when analytics is disabled.
    pub fn sink(&self) -> ServerResult<Option<ElasticsearchSink>> {
        if !self.enabled {
            return Ok(None);
        }
        let sink = ElasticsearchSink::new(&self.elasticsearch_host, &self.elasticsearch_index)
            .context(BuildAnalyticsSnafu)?;
        Ok(Some(sink))
    }
}

/// Options for `taxi-trips serve`.
#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Listen address
    #[arg(long, env = "TAXI_TRIPS_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Upper bound on trips returned per page, whatever n_results asks for
    #[arg(long, env = "TAXI_TRIPS_MAX_RESULTS", default_value_t = DEFAULT_MAX_RESULTS)]
    pub max_results: usize,

    #[command(flatten)]
    pub cache: CacheArgs,

    #[command(flatten)]
    pub analytics: AnalyticsArgs,
}
