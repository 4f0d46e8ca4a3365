use std::collections::BTreeSet;
use std::io::BufWriter;

use flate2::{Compression, GzBuilder};
use layercake_oci::blob::CountingDigestWriter;
use layercake_oci::compression::uncompressed_descriptor;
use layercake_oci::{Blob, BlobDescriptor, CachedLayer, DescriptorDigest, OciError};
use tempfile::NamedTempFile;
use tracing::info;

use super::{now_ms, Cache, CachedLayerWithMetadata, LayerType};
use crate::builder::LayerBuilder;
use crate::{Error, Result};

/// Stores layers in a [`Cache`].
///
/// Content goes to a temporary file in the blob directory and is renamed to
/// its digest only once that digest has been computed from the written bytes.
/// The metadata entry is recorded last.
pub struct CacheWriter<'a> {
    cache: &'a Cache,
}

impl<'a> CacheWriter<'a> {
    pub fn new(cache: &'a Cache) -> Self {
        Self { cache }
    }

    /// Build the layer described by `builder`, store it gzip-compressed and
    /// record it as `layer_type`.
    ///
    /// The diff ID is hashed over the tar stream and the blob digest over the
    /// compressed bytes, both in the same pass. The recorded build time is
    /// taken before any source is read, so an edit made while the layer is
    /// being written still counts as a modification.
    pub fn write_layer(&self, builder: &LayerBuilder, layer_type: LayerType) -> Result<CachedLayer> {
        let built_at = now_ms();
        let tmp = self.temp_blob()?;

        let compressed = CountingDigestWriter::new(BufWriter::new(tmp));
        let gzip = GzBuilder::new().mtime(0).write(compressed, Compression::default());
        let uncompressed = builder.write_tar(CountingDigestWriter::new(gzip))?;

        let (gzip, uncompressed_descriptor) = uncompressed
            .finish()
            .map_err(|e| Error::io("failed to finish layer stream", e))?;
        let compressed = gzip
            .finish()
            .map_err(|e| Error::io("failed to finish gzip stream", e))?;
        let (buffered, blob_descriptor) = compressed
            .finish()
            .map_err(|e| Error::io("failed to flush layer blob", e))?;
        let tmp = buffered
            .into_inner()
            .map_err(|e| Error::io("failed to flush layer blob", e.into_error()))?;

        let digest = required_digest(&blob_descriptor)?;
        let diff_id = required_digest(&uncompressed_descriptor)?;
        let content_path = self.cache.persist_blob(tmp, &digest)?;
        let layer = CachedLayer::new(content_path, blob_descriptor.clone(), diff_id.clone());

        self.cache.commit(
            CachedLayerWithMetadata::new(
                layer.clone(),
                layer_type,
                builder.source_files().clone(),
                built_at,
            )
            .with_extraction_path(builder.extraction_path()),
        )?;

        info!(
            layer_type = %layer_type,
            digest = %digest,
            diff_id = %diff_id,
            size = blob_descriptor.size(),
            "cached layer",
        );
        Ok(layer)
    }

    /// Store a compressed base-image layer blob as pulled from a registry.
    ///
    /// The digest is computed from the compressed bytes as they are written;
    /// the diff ID by decompressing the stored file according to `media_type`.
    pub fn write_base_layer(&self, compressed_blob: Blob, media_type: &str) -> Result<CachedLayer> {
        let received_at = now_ms();
        let mut tmp = self.temp_blob()?;

        let blob_descriptor = {
            let mut out = BufWriter::new(tmp.as_file_mut());
            let descriptor = compressed_blob.write_to(&mut out)?;
            out.into_inner()
                .map_err(|e| Error::io("failed to flush base layer blob", e.into_error()))?;
            descriptor
        };
        let digest = required_digest(&blob_descriptor)?;

        let stored = tmp
            .reopen()
            .map_err(|e| Error::io(format!("failed to reopen {}", tmp.path().display()), e))?;
        let diff_id = required_digest(&uncompressed_descriptor(media_type, stored)?)?;

        let content_path = self.cache.persist_blob(tmp, &digest)?;
        let layer = CachedLayer::new(content_path, blob_descriptor, diff_id);
        self.cache.commit(CachedLayerWithMetadata::new(
            layer.clone(),
            LayerType::Base,
            BTreeSet::new(),
            received_at,
        ))?;

        info!(digest = %digest, media_type, "cached base layer");
        Ok(layer)
    }

    fn temp_blob(&self) -> Result<NamedTempFile> {
        let dir = self.cache.blobs_dir();
        NamedTempFile::new_in(&dir)
            .map_err(|e| Error::io(format!("failed to create temp blob in {}", dir.display()), e))
    }
}

fn required_digest(descriptor: &BlobDescriptor) -> Result<DescriptorDigest> {
    descriptor.digest().cloned().ok_or_else(|| {
        OciError::LayerPropertyMissing(format!(
            "blob of {} bytes has no digest",
            descriptor.size()
        ))
        .into()
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
