use std::path::{Path, PathBuf};

use crate::blob::{Blob, BlobDescriptor};
use crate::digest::DescriptorDigest;
use crate::{OciError, Result};

/// Content identity shared by every layer variant.
///
/// `blob_descriptor` describes the (possibly compressed) blob as stored or
/// pushed; `diff_id` is the digest of the uncompressed tar stream. The two are
/// computed separately and never assumed to match.
pub trait Layer {
    fn blob_descriptor(&self) -> Result<&BlobDescriptor>;

    fn diff_id(&self) -> Result<&DescriptorDigest>;

    /// Digest of the layer blob.
    fn digest(&self) -> Result<&DescriptorDigest> {
        self.blob_descriptor()?
            .digest()
            .ok_or_else(|| OciError::LayerPropertyMissing("layer blob has no digest".to_string()))
    }
}

// ---------------------------------------------------------------------------
// ReferenceLayer
// ---------------------------------------------------------------------------

/// A layer known only from a remote manifest. There is no local content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceLayer {
    blob_descriptor: BlobDescriptor,
    diff_id: Option<DescriptorDigest>,
}

impl ReferenceLayer {
    pub fn new(blob_descriptor: BlobDescriptor) -> Self {
        Self {
            blob_descriptor,
            diff_id: None,
        }
    }

    pub fn with_diff_id(mut self, diff_id: DescriptorDigest) -> Self {
        self.diff_id = Some(diff_id);
        self
    }
}

impl Layer for ReferenceLayer {
    fn blob_descriptor(&self) -> Result<&BlobDescriptor> {
        Ok(&self.blob_descriptor)
    }

    fn diff_id(&self) -> Result<&DescriptorDigest> {
        self.diff_id.as_ref().ok_or_else(|| {
            OciError::LayerPropertyMissing(format!(
                "diff ID of reference layer {} is unknown",
                describe(&self.blob_descriptor)
            ))
        })
    }
}

// ---------------------------------------------------------------------------
// CachedLayer
// ---------------------------------------------------------------------------

/// A layer whose blob has been written to the local cache.
///
/// The descriptor and diff ID must describe the file at `content_path`; they
/// are produced by the writer that created the file and not rechecked here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedLayer {
    content_path: PathBuf,
    blob_descriptor: BlobDescriptor,
    diff_id: DescriptorDigest,
}

impl CachedLayer {
    pub fn new(
        content_path: PathBuf,
        blob_descriptor: BlobDescriptor,
        diff_id: DescriptorDigest,
    ) -> Self {
        Self {
            content_path,
            blob_descriptor,
            diff_id,
        }
    }

    /// Absolute path to the cached blob on disk.
    pub fn content_path(&self) -> &Path {
        &self.content_path
    }

    /// A fresh [`Blob`] reading the cached content.
    pub fn blob(&self) -> Blob {
        Blob::from_file(&self.content_path)
    }
}

impl Layer for CachedLayer {
    fn blob_descriptor(&self) -> Result<&BlobDescriptor> {
        Ok(&self.blob_descriptor)
    }

    fn diff_id(&self) -> Result<&DescriptorDigest> {
        Ok(&self.diff_id)
    }
}

// ---------------------------------------------------------------------------
// AnyLayer
// ---------------------------------------------------------------------------

/// Either layer variant, for collections that mix base and application layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnyLayer {
    Reference(ReferenceLayer),
    Cached(CachedLayer),
}

impl Layer for AnyLayer {
    fn blob_descriptor(&self) -> Result<&BlobDescriptor> {
        match self {
            AnyLayer::Reference(l) => l.blob_descriptor(),
            AnyLayer::Cached(l) => l.blob_descriptor(),
        }
    }

    fn diff_id(&self) -> Result<&DescriptorDigest> {
        match self {
            AnyLayer::Reference(l) => l.diff_id(),
            AnyLayer::Cached(l) => l.diff_id(),
        }
    }
}

impl From<ReferenceLayer> for AnyLayer {
    fn from(layer: ReferenceLayer) -> Self {
        AnyLayer::Reference(layer)
    }
}

impl From<CachedLayer> for AnyLayer {
    fn from(layer: CachedLayer) -> Self {
        AnyLayer::Cached(layer)
    }
}

fn describe(descriptor: &BlobDescriptor) -> String {
    match descriptor.digest() {
        Some(d) => d.to_string(),
        None => format!("<undigested, {} bytes>", descriptor.size()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
