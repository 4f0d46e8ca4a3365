use serde::{Deserialize, Serialize};

use crate::blob::BlobDescriptor;
use crate::digest::{DescriptorDigest, Digest};
use crate::image::ImageLayers;
use crate::layer::ReferenceLayer;
use crate::{OciError, Result};

// ---------------------------------------------------------------------------
// Schema 2.1 manifest
// ---------------------------------------------------------------------------

/// A Docker image manifest, schema version 2.1.
///
/// Lists layers top-most first; [`V21ManifestTemplate::layers`] returns them
/// in application order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct V21ManifestTemplate {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,

    #[serde(rename = "fsLayers", default)]
    pub fs_layers: Vec<LayerObject>,

    #[serde(default)]
    pub history: Vec<V1Compatibility>,
}

/// A layer reference inside a schema 2.1 manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerObject {
    #[serde(rename = "blobSum")]
    pub blob_sum: Digest,
}

/// The V1-compatible JSON string kept alongside each schema 2.1 layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct V1Compatibility {
    #[serde(rename = "v1Compatibility")]
    pub v1_compatibility: String,
}

/// The fields of a V1-compatible layer JSON this crate reads.
#[derive(Debug, Default, Deserialize)]
struct V1CompatibilityFields {
    #[serde(rename = "Size", default)]
    size: u64,
}

impl V21ManifestTemplate {
    pub fn layer_digest(&self, index: usize) -> Option<&Digest> {
        self.fs_layers.get(index).map(|l| &l.blob_sum)
    }

    pub fn v1_compatibility(&self, index: usize) -> Option<&str> {
        self.history.get(index).map(|h| h.v1_compatibility.as_str())
    }

    /// Reference layers in application order (bottom-most first).
    ///
    /// Schema 2.1 does not carry blob sizes; the size recorded in the
    /// V1-compatible history entry is used when present, otherwise 0.
    pub fn layers(&self) -> Result<ImageLayers<ReferenceLayer>> {
        let mut layers = ImageLayers::new();
        for (index, layer) in self.fs_layers.iter().enumerate().rev() {
            let size = self
                .v1_compatibility(index)
                .and_then(|raw| serde_json::from_str::<V1CompatibilityFields>(raw).ok())
                .unwrap_or_default()
                .size;
            let digest = DescriptorDigest::from(layer.blob_sum.clone());
            layers.add(ReferenceLayer::new(BlobDescriptor::new(size, digest)))?;
        }
        Ok(layers)
    }
}

// ---------------------------------------------------------------------------
// Schema 2.2 / OCI manifest
// ---------------------------------------------------------------------------

/// A Docker schema 2.2 or OCI image manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct V22ManifestTemplate {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,

    #[serde(rename = "mediaType", default)]
    pub media_type: String,

    pub config: Descriptor,

    pub layers: Vec<Descriptor>,
}

/// A content-addressable descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Descriptor {
    #[serde(rename = "mediaType")]
    pub media_type: String,

    pub digest: DescriptorDigest,

    pub size: u64,
}

impl V22ManifestTemplate {
    /// Reference layers in manifest (application) order.
    pub fn layers(&self) -> Result<ImageLayers<ReferenceLayer>> {
        let mut layers = ImageLayers::new();
        for desc in &self.layers {
            layers.add(ReferenceLayer::new(BlobDescriptor::new(
                desc.size,
                desc.digest.clone(),
            )))?;
        }
        Ok(layers)
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// A parsed manifest of either supported schema.
#[derive(Debug, Clone)]
pub enum ManifestTemplate {
    V21(V21ManifestTemplate),
    V22(V22ManifestTemplate),
}

impl ManifestTemplate {
    pub fn layers(&self) -> Result<ImageLayers<ReferenceLayer>> {
        match self {
            ManifestTemplate::V21(m) => m.layers(),
            ManifestTemplate::V22(m) => m.layers(),
        }
    }
}

#[derive(Deserialize)]
struct SchemaHeader {
    #[serde(rename = "schemaVersion")]
    schema_version: u32,
    #[serde(rename = "mediaType", default)]
    media_type: String,
}

/// Parse manifest JSON, selecting the template by `schemaVersion`.
pub fn parse_manifest(bytes: &[u8]) -> Result<ManifestTemplate> {
    let header: SchemaHeader = serde_json::from_slice(bytes)?;
    match header.schema_version {
        1 => Ok(ManifestTemplate::V21(serde_json::from_slice(bytes)?)),
        2 if header.media_type.is_empty() || is_manifest_media_type(&header.media_type) => {
            Ok(ManifestTemplate::V22(serde_json::from_slice(bytes)?))
        }
        2 => Err(OciError::Manifest(format!(
            "unsupported manifest media type: {}",
            header.media_type
        ))),
        other => Err(OciError::Manifest(format!(
            "unsupported schema version: {}",
            other
        ))),
    }
}

// ---------------------------------------------------------------------------
// Media type constants
// ---------------------------------------------------------------------------

pub const MEDIA_TYPE_OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const MEDIA_TYPE_DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const MEDIA_TYPE_DOCKER_LAYER_GZIP: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";
pub const MEDIA_TYPE_OCI_LAYER_GZIP: &str = "application/vnd.oci.image.layer.v1.tar+gzip";

/// Returns `true` when `media_type` is a single image manifest.
pub fn is_manifest_media_type(media_type: &str) -> bool {
    media_type == MEDIA_TYPE_OCI_MANIFEST || media_type == MEDIA_TYPE_DOCKER_MANIFEST
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
