//! Local cache directory and file helpers.
//!
//! All filesystem access for cached partitions goes through this module. A
//! [`CacheRoot`] is constructed once (usually from configuration) and handed
//! to the [`crate::cache::PartitionCache`]; nothing here reads ambient process
//! state.
//!
//! Writes use write-then-rename so a crash or failed download never leaves a
//! half-written Parquet file under its final name.

use snafu::{Backtrace, IntoError, prelude::*};
use std::{
    io,
    path::{Path, PathBuf},
};
use tokio::{fs, io::AsyncWriteExt};

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Root directory under which partition files are cached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheRoot(PathBuf);

impl CacheRoot {
    /// Wrap a local directory path.
    pub fn local(root: impl Into<PathBuf>) -> Self {
        CacheRoot(root.into())
    }

    /// The directory path.
    pub fn path(&self) -> &Path {
        &self.0
    }

    /// Resolve a path relative to the root.
    pub fn join(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.0.join(rel)
    }

    /// Create the root directory (and parents) if missing.
    pub async fn create(&self) -> StorageResult<()> {
        fs::create_dir_all(&self.0).await.context(OtherIoSnafu {
            path: self.0.display().to_string(),
        })
    }
}

/// Failures touching the cache directory.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    /// A cached partition file the caller expected is not on disk.
    #[snafu(display("Cached file not found: {path}"))]
    NotFound {
        /// Missing file.
        path: String,
        /// Underlying I/O error.
        source: io::Error,
        /// Backtrace captured at the failure site.
        backtrace: Backtrace,
    },

    /// Any other I/O failure inside the cache directory.
    #[snafu(display("Cache I/O error at {path}: {source}"))]
    OtherIo {
        /// File or directory being accessed.
        path: String,
        /// Underlying I/O error.
        source: io::Error,
        /// Backtrace captured at the failure site.
        backtrace: Backtrace,
    },
}

/// `true` if a cached partition is present at `path`.
///
/// A directory at `path` counts as absent.
pub async fn file_exists(path: &Path) -> StorageResult<bool> {
    match fs::metadata(path).await {
        Ok(meta) => Ok(meta.is_file()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).context(OtherIoSnafu {
            path: path.display().to_string(),
        }),
    }
}

/// Read a whole cached partition into memory.
pub async fn read_all_bytes(path: &Path) -> StorageResult<Vec<u8>> {
    let path_str = path.display().to_string();
    fs::read(path).await.map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            NotFoundSnafu { path: path_str }.into_error(e)
        } else {
            OtherIoSnafu { path: path_str }.into_error(e)
        }
    })
}

async fn ensure_parent(path: &Path) -> StorageResult<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    fs::create_dir_all(parent).await.context(OtherIoSnafu {
        path: parent.display().to_string(),
    })
}

/// A download being written next to its final partition path.
///
/// The `.tmp` sibling is deleted on drop unless [`PartialDownload::commit`]
/// moved it into place.
struct PartialDownload {
    tmp: PathBuf,
    committed: bool,
}

impl PartialDownload {
    fn beside(target: &Path) -> Self {
        Self {
            tmp: target.with_extension("tmp"),
            committed: false,
        }
    }

    async fn write(&self, contents: &[u8]) -> io::Result<()> {
        let mut file = fs::File::create(&self.tmp).await?;
        file.write_all(contents).await?;
        file.sync_all().await
    }

    async fn commit(mut self, target: &Path) -> io::Result<()> {
        fs::rename(&self.tmp, target).await?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PartialDownload {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.tmp);
        }
    }
}

/// Persist a downloaded partition at `path`.
///
/// Readers either see no file or the complete body: the bytes are synced to
/// a sibling `.tmp` file first and then renamed over `path`.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> StorageResult<()> {
    ensure_parent(path).await?;

    let partial = PartialDownload::beside(path);
    partial.write(contents).await.context(OtherIoSnafu {
        path: partial.tmp.display().to_string(),
    })?;
    partial.commit(path).await.context(OtherIoSnafu {
        path: path.display().to_string(),
    })
}
