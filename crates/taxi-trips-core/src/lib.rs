//! Core query path for monthly taxi-trip partitions.
//!
//! This crate provides the pieces behind the `/trips` endpoint of
//! `taxi-trips-server`:
//!
//! - Mapping a millisecond cursor to the calendar month that contains it
//!   (`partition` module).
//! - The remote naming scheme for monthly Parquet files (`source` module).
//! - A local, write-once file cache that downloads partitions on first use
//!   (`storage`, `fetch` and `cache` modules).
//! - Loading a partition into chronologically ordered [`trip::Trip`] values
//!   (`loader` module).
//! - Paging over a loaded partition with an exclusive lower-bound cursor
//!   (`query` module).
//!
//! The HTTP surface lives in the server crate; everything here is usable on
//! its own (for example from tests or a debugging command).
#![deny(missing_docs)]
pub mod cache;
pub mod fetch;
pub mod loader;
pub mod partition;
pub mod query;
pub mod source;
pub mod storage;
pub mod trip;

#[cfg(test)]
pub(crate) mod test_util;

pub use cache::{CacheError, CacheLookup, PartitionCache};
pub use fetch::{FetchError, FetchOutcome, HttpFetcher, PartitionFetcher};
pub use loader::{LoadError, load_partition};
pub use partition::{InvalidPartitionKey, PartitionKey};
pub use query::{PartitionLoad, PartitionStatus, QueryError, TripPage, TripQueryService};
pub use source::PartitionSource;
pub use storage::{CacheRoot, StorageError};
pub use trip::Trip;
