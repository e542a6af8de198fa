//! Write-once local cache of partition files.
//!
//! [`PartitionCache::ensure_local`] returns the path of a cached partition,
//! downloading it on first access. Once a file is present it is used as-is
//! forever: there is no freshness check, TTL or eviction.
//!
//! Concurrent first accesses to the same partition are serialised on a
//! per-key async mutex, so a partition is fetched at most once even under
//! load. Different partitions download in parallel.

use std::{collections::HashMap, path::PathBuf, sync::Arc};

use log::{info, warn};
use snafu::prelude::*;
use tokio::sync::Mutex;

use crate::{
    fetch::{FetchError, FetchOutcome, PartitionFetcher},
    partition::PartitionKey,
    source::PartitionSource,
    storage::{self, CacheRoot, StorageError},
};

/// Errors that abort a cache lookup.
///
/// A partition that simply does not exist upstream is not an error; see
/// [`CacheLookup::NotFound`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CacheError {
    /// Local filesystem failure (cache root, probe, or write).
    #[snafu(display("Cache storage error: {source}"))]
    Storage {
        /// Underlying storage error.
        source: StorageError,
    },

    /// Transport failure while fetching a partition.
    #[snafu(display("Failed to fetch partition {key}: {source}"))]
    Fetch {
        /// Partition being fetched.
        key: PartitionKey,
        /// Underlying fetch error.
        source: FetchError,
    },
}

/// Result of [`PartitionCache::ensure_local`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// The partition is available at this local path.
    Local(PathBuf),
    /// Upstream has no such partition; nothing was written locally.
    NotFound {
        /// URL that was requested.
        url: String,
        /// HTTP status returned by upstream.
        status: u16,
    },
}

/// Local partition cache backed by a [`PartitionFetcher`].
pub struct PartitionCache {
    root: CacheRoot,
    source: PartitionSource,
    fetcher: Arc<dyn PartitionFetcher>,
    key_locks: Mutex<HashMap<PartitionKey, Arc<Mutex<()>>>>,
}

impl std::fmt::Debug for PartitionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionCache")
            .field("root", &self.root)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl PartitionCache {
    /// Create the cache root directory if needed and return a cache over it.
    pub async fn open(
        root: CacheRoot,
        source: PartitionSource,
        fetcher: Arc<dyn PartitionFetcher>,
    ) -> Result<Self, CacheError> {
        root.create().await.context(StorageSnafu)?;
        Ok(Self {
            root,
            source,
            fetcher,
            key_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Cache root directory.
    pub fn root(&self) -> &CacheRoot {
        &self.root
    }

    /// Where the partition for `key` lives (or would live) on disk.
    pub fn local_path(&self, key: PartitionKey) -> PathBuf {
        self.root.join(self.source.file_name(key))
    }

    async fn key_lock(&self, key: PartitionKey) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().await;
        Arc::clone(locks.entry(key).or_default())
    }

    /// Make sure the partition for `key` is on local disk.
    ///
    /// Existing files are returned without any network traffic. Otherwise one
    /// request is made: a 200 body is written atomically and its path
    /// returned; any other status yields [`CacheLookup::NotFound`].
    pub async fn ensure_local(&self, key: PartitionKey) -> Result<CacheLookup, CacheError> {
        let path = self.local_path(key);

        if storage::file_exists(&path).await.context(StorageSnafu)? {
            info!("Partition {key} already cached at {}", path.display());
            return Ok(CacheLookup::Local(path));
        }

        let lock = self.key_lock(key).await;
        let _guard = lock.lock().await;

        // Another request may have finished the download while we waited.
        if storage::file_exists(&path).await.context(StorageSnafu)? {
            info!("Partition {key} cached by a concurrent request");
            return Ok(CacheLookup::Local(path));
        }

        let url = self.source.url(key);
        info!("Downloading partition {key} from {url}");

        match self
            .fetcher
            .fetch(&url)
            .await
            .context(FetchSnafu { key })?
        {
            FetchOutcome::Body(body) => {
                storage::write_atomic(&path, &body)
                    .await
                    .context(StorageSnafu)?;
                info!(
                    "Partition {key} downloaded ({} bytes) to {}",
                    body.len(),
                    path.display()
                );
                Ok(CacheLookup::Local(path))
            }
            FetchOutcome::Missing { status } => {
                warn!("Partition {key} not available upstream (HTTP {status})");
                Ok(CacheLookup::NotFound { url, status })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{FakeFetcher, TestResult};
    use bytes::Bytes;
    use tempfile::TempDir;

    fn key(year: i32, month: u32) -> PartitionKey {
        PartitionKey::new(year, month).unwrap()
    }

    async fn open_cache(
        tmp: &TempDir,
        fetcher: Arc<FakeFetcher>,
    ) -> Result<PartitionCache, CacheError> {
        PartitionCache::open(
            CacheRoot::local(tmp.path().join("cache")),
            PartitionSource::new("http://upstream.test/trip-data", "yellow_tripdata"),
            fetcher,
        )
        .await
    }

    #[tokio::test]
    async fn open_creates_cache_root() -> TestResult {
        let tmp = TempDir::new()?;
        let cache = open_cache(&tmp, Arc::new(FakeFetcher::default())).await?;
        assert!(cache.root().path().is_dir());
        Ok(())
    }

    #[tokio::test]
    async fn existing_file_is_returned_without_fetching() -> TestResult {
        let tmp = TempDir::new()?;
        let fetcher = Arc::new(FakeFetcher::default());
        let cache = open_cache(&tmp, fetcher.clone()).await?;

        let path = cache.local_path(key(2023, 1));
        std::fs::write(&path, b"already here")?;

        let lookup = cache.ensure_local(key(2023, 1)).await?;

        assert_eq!(lookup, CacheLookup::Local(path));
        assert_eq!(fetcher.calls(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn miss_downloads_once_and_then_hits() -> TestResult {
        let tmp = TempDir::new()?;
        let fetcher = Arc::new(FakeFetcher::default().with_body(
            "http://upstream.test/trip-data/yellow_tripdata_2023-01.parquet",
            Bytes::from_static(b"remote bytes"),
        ));
        let cache = open_cache(&tmp, fetcher.clone()).await?;

        let first = cache.ensure_local(key(2023, 1)).await?;
        let second = cache.ensure_local(key(2023, 1)).await?;

        let expected = tmp.path().join("cache/yellow_tripdata_2023-01.parquet");
        assert_eq!(first, CacheLookup::Local(expected.clone()));
        assert_eq!(second, first);
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(std::fs::read(&expected)?, b"remote bytes");
        Ok(())
    }

    #[tokio::test]
    async fn non_ok_status_is_not_found_and_writes_nothing() -> TestResult {
        let tmp = TempDir::new()?;
        let fetcher = Arc::new(FakeFetcher::default());
        let cache = open_cache(&tmp, fetcher.clone()).await?;

        let lookup = cache.ensure_local(key(2099, 6)).await?;

        assert_eq!(
            lookup,
            CacheLookup::NotFound {
                url: "http://upstream.test/trip-data/yellow_tripdata_2099-06.parquet".to_string(),
                status: 403,
            }
        );
        assert!(!cache.local_path(key(2099, 6)).exists());

        // Missing partitions are not remembered; the next call asks again.
        cache.ensure_local(key(2099, 6)).await?;
        assert_eq!(fetcher.calls(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn transport_failure_propagates() -> TestResult {
        let tmp = TempDir::new()?;
        let fetcher = Arc::new(FakeFetcher::default().failing());
        let cache = open_cache(&tmp, fetcher).await?;

        let err = cache
            .ensure_local(key(2023, 2))
            .await
            .expect_err("transport failure should surface");

        assert!(matches!(err, CacheError::Fetch { .. }));
        assert!(!cache.local_path(key(2023, 2)).exists());
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_first_access_fetches_once() -> TestResult {
        let tmp = TempDir::new()?;
        let fetcher = Arc::new(
            FakeFetcher::default()
                .with_body(
                    "http://upstream.test/trip-data/yellow_tripdata_2023-03.parquet",
                    Bytes::from_static(b"march"),
                )
                .with_delay(std::time::Duration::from_millis(50)),
        );
        let cache = Arc::new(open_cache(&tmp, fetcher.clone()).await?);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.ensure_local(key(2023, 3)).await })
            })
            .collect();

        for result in futures::future::join_all(tasks).await {
            let lookup = result??;
            assert!(matches!(lookup, CacheLookup::Local(_)));
        }
        assert_eq!(fetcher.calls(), 1);
        Ok(())
    }
}
