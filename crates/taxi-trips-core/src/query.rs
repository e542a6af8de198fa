//! Cursor-based paging over one monthly partition.
//!
//! A query names an exclusive lower bound (`from_ms`) and a page size. The
//! service resolves the month containing `from_ms`, makes sure that month's
//! file is cached, loads it and returns the next `n_results` trips picked up
//! strictly after `from_ms`.
//!
//! Pages never cross into the following month. When a month is exhausted the
//! caller sees a short or empty page and must issue a new query with a cursor
//! inside the next month.
//!
//! A missing upstream file and an unreadable local file both produce an empty
//! page. [`PartitionStatus`] keeps the two apart for callers that care.

use std::sync::Arc;

use chrono::{Local, TimeZone};
use log::{info, warn};
use snafu::prelude::*;

use crate::{
    cache::{CacheError, CacheLookup, PartitionCache},
    loader,
    partition::PartitionKey,
    trip::Trip,
};

/// Default cap on page size.
pub const DEFAULT_MAX_RESULTS: usize = 10_000;

/// Failures that abort a query (as opposed to producing an empty page).
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum QueryError {
    /// The partition could not be cached because of a transport or local
    /// filesystem failure.
    #[snafu(display("Failed to cache partition {key}: {source}"))]
    Cache {
        /// Partition being resolved.
        key: PartitionKey,
        /// Underlying cache error.
        source: CacheError,
    },
}

/// How the partition behind a page was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionStatus {
    /// The partition was cached and loaded.
    Found,
    /// Upstream has no file for this month.
    NotFound {
        /// HTTP status returned by upstream.
        status: u16,
    },
    /// A local file exists but could not be loaded.
    LoadFailed {
        /// Rendered load error.
        reason: String,
    },
}

/// Every trip of one partition, or why there are none to read.
#[derive(Debug, Clone, PartialEq)]
pub enum PartitionLoad {
    /// All in-month trips, sorted by pickup.
    Trips(Vec<Trip>),
    /// Upstream has no file for this month.
    NotFound {
        /// HTTP status returned by upstream.
        status: u16,
    },
    /// A local file exists but could not be loaded.
    LoadFailed {
        /// Rendered load error.
        reason: String,
    },
}

/// One page of trips.
#[derive(Debug, Clone, PartialEq)]
pub struct TripPage {
    /// Partition the page was read from.
    pub partition: PartitionKey,
    /// How that partition was resolved.
    pub status: PartitionStatus,
    /// Trips in ascending pickup order, all picked up after the cursor.
    pub trips: Vec<Trip>,
    /// Cursor for the following page; `None` when `trips` is empty.
    pub next_from_ms: Option<i64>,
}

impl TripPage {
    fn empty(partition: PartitionKey, status: PartitionStatus) -> Self {
        Self {
            partition,
            status,
            trips: Vec::new(),
            next_from_ms: None,
        }
    }

    /// `true` if the page has no trips.
    pub fn is_empty(&self) -> bool {
        self.trips.is_empty()
    }
}

/// Slice the page after `from_ms` out of a pickup-sorted partition.
fn page_after(mut trips: Vec<Trip>, from_ms: i64, n_results: usize) -> Vec<Trip> {
    let start = trips.partition_point(|t| t.pickup_ms() <= from_ms);
    let end = start.saturating_add(n_results).min(trips.len());
    trips.truncate(end);
    trips.drain(..start);
    trips
}

/// Resolves cursors to partitions and pages through them.
#[derive(Debug)]
pub struct TripQueryService<Tz: TimeZone = Local> {
    cache: Arc<PartitionCache>,
    max_results: usize,
    tz: Tz,
}

impl TripQueryService<Local> {
    /// Service resolving cursors in the local time zone.
    pub fn new(cache: Arc<PartitionCache>) -> Self {
        Self::with_timezone(cache, Local)
    }
}

impl<Tz: TimeZone> TripQueryService<Tz> {
    /// Service resolving cursors in `tz`.
    pub fn with_timezone(cache: Arc<PartitionCache>, tz: Tz) -> Self {
        Self {
            cache,
            max_results: DEFAULT_MAX_RESULTS,
            tz,
        }
    }

    /// Cap every page at `max_results` trips regardless of the request.
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// Page size cap.
    pub fn max_results(&self) -> usize {
        self.max_results
    }

    /// The underlying cache.
    pub fn cache(&self) -> &Arc<PartitionCache> {
        &self.cache
    }

    /// Return up to `n_results` trips picked up strictly after `from_ms`,
    /// from the month that contains `from_ms`.
    pub async fn query(&self, from_ms: i64, n_results: usize) -> Result<TripPage, QueryError> {
        let key = PartitionKey::from_cursor_in(from_ms, &self.tz);
        info!("Query from_ms={from_ms} n_results={n_results} resolved to partition {key}");

        let trips = match self.load(key).await? {
            PartitionLoad::Trips(trips) => trips,
            PartitionLoad::NotFound { status } => {
                return Ok(TripPage::empty(key, PartitionStatus::NotFound { status }));
            }
            PartitionLoad::LoadFailed { reason } => {
                return Ok(TripPage::empty(key, PartitionStatus::LoadFailed { reason }));
            }
        };

        let trips = page_after(trips, from_ms, n_results.min(self.max_results));
        let next_from_ms = trips.last().map(Trip::pickup_ms);
        info!("Returning {} trips from partition {key}", trips.len());

        Ok(TripPage {
            partition: key,
            status: PartitionStatus::Found,
            trips,
            next_from_ms,
        })
    }

    /// Load every trip of `key`, or the reason the partition is unavailable.
    pub async fn load(&self, key: PartitionKey) -> Result<PartitionLoad, QueryError> {
        let path = match self
            .cache
            .ensure_local(key)
            .await
            .context(CacheSnafu { key })?
        {
            CacheLookup::Local(path) => path,
            CacheLookup::NotFound { status, .. } => {
                info!("No trips found for partition {key}");
                return Ok(PartitionLoad::NotFound { status });
            }
        };

        match loader::load_partition(key, &path).await {
            Ok(trips) => Ok(PartitionLoad::Trips(trips)),
            Err(e) => {
                warn!("Failed to load partition {key} from {}: {e}", path.display());
                Ok(PartitionLoad::LoadFailed {
                    reason: e.to_string(),
                })
            }
        }
    }
}
