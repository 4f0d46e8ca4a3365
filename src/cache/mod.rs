//! Content-addressed layer cache
//!
//! Layer blobs live under `<cache_dir>/blobs/sha256/<hash>`; the record of
//! what each blob was built from lives in `<cache_dir>/metadata.json`.
//!
//! # Consistency
//!
//! - A blob is renamed into place only after its digest has been computed
//!   from the bytes actually written.
//! - Metadata is updated only after the blob it points at is in place.
//! - Metadata writes are serialized and land by atomic rename, and every read
//!   goes back to disk, so a reader sees either the previous or the new
//!   document, never a partial one.
//! - Blobs that no metadata entry references are harmless leftovers.

pub mod checker;
pub mod metadata;
pub mod writer;

pub use checker::CacheChecker;
pub use metadata::{CacheMetadata, CachedLayerWithMetadata, LayerFilter, LayerType};
pub use writer::CacheWriter;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use layercake_oci::DescriptorDigest;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::{Error, Result};

const METADATA_FILE: &str = "metadata.json";

/// Handle to a cache directory. Share it between tasks behind an `Arc`.
pub struct Cache {
    cache_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl Cache {
    /// Open (creating if needed) the cache rooted at `cache_dir`.
    pub fn open(cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let cache = Self {
            cache_dir: cache_dir.into(),
            write_lock: Mutex::new(()),
        };
        let blobs_dir = cache.blobs_dir();
        fs::create_dir_all(&blobs_dir)
            .map_err(|e| Error::io(format!("failed to create {}", blobs_dir.display()), e))?;
        Ok(cache)
    }

    /// Return a reference to the underlying cache directory.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Directory that holds all blobs: `<cache_dir>/blobs/sha256/`.
    pub fn blobs_dir(&self) -> PathBuf {
        self.cache_dir.join("blobs").join("sha256")
    }

    /// Return the path for a blob with the given digest.
    pub fn blob_path(&self, digest: &DescriptorDigest) -> PathBuf {
        self.blobs_dir().join(digest.hash())
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.cache_dir.join(METADATA_FILE)
    }

    /// Load the current metadata from disk. A missing file is an empty cache.
    pub fn metadata(&self) -> Result<CacheMetadata> {
        let path = self.metadata_path();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(CacheMetadata::default()),
            Err(e) => return Err(Error::io(format!("failed reading {}", path.display()), e)),
        };
        CacheMetadata::from_json(&bytes, &path, &self.blobs_dir())
    }

    /// Move a fully written temporary blob to its content address.
    pub(crate) fn persist_blob(&self, tmp: NamedTempFile, digest: &DescriptorDigest) -> Result<PathBuf> {
        let path = self.blob_path(digest);
        tmp.as_file()
            .sync_all()
            .map_err(|e| Error::io(format!("failed to sync blob {}", digest), e))?;
        tmp.persist(&path)
            .map_err(|e| Error::io(format!("failed to move blob into {}", path.display()), e.error))?;
        debug!(path = %path.display(), "stored blob");
        Ok(path)
    }

    /// Record `entry` in the metadata document.
    pub(crate) fn commit(&self, entry: CachedLayerWithMetadata) -> Result<()> {
        let _g = self
            .write_lock
            .lock()
            .map_err(|_| Error::io("cache write lock", io::Error::other("lock poisoned")))?;

        let mut metadata = self.metadata()?;
        metadata.upsert(entry)?;
        self.write_metadata(&metadata)
    }

    fn write_metadata(&self, metadata: &CacheMetadata) -> Result<()> {
        let path = self.metadata_path();
        let data = metadata.to_json()?;

        let mut tmp = NamedTempFile::new_in(&self.cache_dir)
            .map_err(|e| Error::io(format!("failed to create temp file in {}", self.cache_dir.display()), e))?;
        tmp.write_all(&data)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| Error::io(format!("failed writing {}", tmp.path().display()), e))?;
        tmp.persist(&path)
            .map_err(|e| Error::io(format!("failed writing {}", path.display()), e.error))?;
        debug!(path = %path.display(), layers = metadata.layers().len(), "wrote cache metadata");
        Ok(())
    }
}

/// Current time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
