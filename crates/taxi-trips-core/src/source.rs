//! Remote naming scheme for monthly trip files.
//!
//! Files are published as `<base_url>/<dataset>_<year>-<MM>.parquet`, for
//! example `https://d37ci6vzurychx.cloudfront.net/trip-data/yellow_tripdata_2023-01.parquet`.
//! The same file name is used for the local cached copy.

use crate::partition::PartitionKey;

/// Default public location of the NYC TLC trip record files.
pub const DEFAULT_BASE_URL: &str = "https://d37ci6vzurychx.cloudfront.net/trip-data";

/// Default dataset prefix (yellow cab trips).
pub const DEFAULT_DATASET: &str = "yellow_tripdata";

/// Extension shared by remote and cached partition files.
pub const PARTITION_EXT: &str = "parquet";

/// Where partitions come from and how their files are named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSource {
    base_url: String,
    dataset: String,
}

impl PartitionSource {
    /// Create a source rooted at `base_url` for the given dataset prefix.
    ///
    /// A trailing `/` on `base_url` is ignored.
    pub fn new(base_url: impl Into<String>, dataset: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            dataset: dataset.into(),
        }
    }

    /// Dataset prefix used in file names.
    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    /// `<dataset>_<year>-<MM>.parquet`
    pub fn file_name(&self, key: PartitionKey) -> String {
        format!(
            "{}_{}-{:02}.{PARTITION_EXT}",
            self.dataset,
            key.year(),
            key.month()
        )
    }

    /// Full remote URL of the partition file.
    pub fn url(&self, key: PartitionKey) -> String {
        format!("{}/{}", self.base_url, self.file_name(key))
    }
}

impl Default for PartitionSource {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL, DEFAULT_DATASET)
    }
}
