//! Cache metadata: which layers are cached, what built them, and when.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use layercake_oci::{BlobDescriptor, CachedLayer, DescriptorDigest, ImageLayers, Layer};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// What a cached layer holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerType {
    /// A layer of the base image, pulled rather than built.
    Base,
    Dependencies,
    Resources,
    Classes,
}

impl LayerType {
    /// Application layer types in on-disk application order.
    pub const APPLICATION: [LayerType; 3] =
        [LayerType::Dependencies, LayerType::Resources, LayerType::Classes];
}

impl fmt::Display for LayerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Base => "base",
            Self::Dependencies => "dependencies",
            Self::Resources => "resources",
            Self::Classes => "classes",
        };
        write!(f, "{}", name)
    }
}

// ---------------------------------------------------------------------------
// CachedLayerWithMetadata
// ---------------------------------------------------------------------------

/// A cached layer together with the inputs and time of its build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedLayerWithMetadata {
    layer: CachedLayer,
    layer_type: LayerType,
    source_files: BTreeSet<PathBuf>,
    extraction_path: Option<PathBuf>,
    last_modified_time: u64,
}

impl CachedLayerWithMetadata {
    pub fn new(
        layer: CachedLayer,
        layer_type: LayerType,
        source_files: BTreeSet<PathBuf>,
        last_modified_time: u64,
    ) -> Self {
        Self {
            layer,
            layer_type,
            source_files,
            extraction_path: None,
            last_modified_time,
        }
    }

    /// Record the root the layer's sources were placed under.
    pub fn with_extraction_path(mut self, extraction_path: impl Into<PathBuf>) -> Self {
        self.extraction_path = Some(extraction_path.into());
        self
    }

    pub fn layer(&self) -> &CachedLayer {
        &self.layer
    }

    pub fn into_layer(self) -> CachedLayer {
        self.layer
    }

    pub fn layer_type(&self) -> LayerType {
        self.layer_type
    }

    /// Source files the layer was built from; empty for base layers.
    pub fn source_files(&self) -> &BTreeSet<PathBuf> {
        &self.source_files
    }

    /// Root the source files were archived under; `None` for base layers.
    pub fn extraction_path(&self) -> Option<&Path> {
        self.extraction_path.as_deref()
    }

    /// Build time in milliseconds since the Unix epoch.
    pub fn last_modified_time(&self) -> u64 {
        self.last_modified_time
    }
}

impl Layer for CachedLayerWithMetadata {
    fn blob_descriptor(&self) -> layercake_oci::Result<&BlobDescriptor> {
        self.layer.blob_descriptor()
    }

    fn diff_id(&self) -> layercake_oci::Result<&DescriptorDigest> {
        self.layer.diff_id()
    }
}

// ---------------------------------------------------------------------------
// CacheMetadata
// ---------------------------------------------------------------------------

/// Every layer recorded in a cache.
#[derive(Debug, Clone, Default)]
pub struct CacheMetadata {
    layers: ImageLayers<CachedLayerWithMetadata>,
}

impl CacheMetadata {
    pub fn layers(&self) -> &ImageLayers<CachedLayerWithMetadata> {
        &self.layers
    }

    pub fn filter_layers(&self) -> LayerFilter<'_> {
        LayerFilter {
            metadata: self,
            layer_type: None,
            source_files: None,
            extraction_path: None,
        }
    }

    /// Record `entry`, retiring entries it supersedes: the same digest, or a
    /// non-base layer of the same type built from the same source files under
    /// the same extraction path.
    pub(crate) fn upsert(&mut self, entry: CachedLayerWithMetadata) -> Result<()> {
        let digest = entry.digest()?.clone();
        let retained = self.layers.filter(|existing| {
            let same_digest = existing.digest().map(|d| *d == digest).unwrap_or(false);
            let same_inputs = entry.layer_type != LayerType::Base
                && existing.layer_type == entry.layer_type
                && existing.source_files == entry.source_files
                && existing.extraction_path == entry.extraction_path;
            !same_digest && !same_inputs
        });
        self.layers = retained;
        self.layers.add(entry)?;
        Ok(())
    }

    /// Decode the on-disk document. Blob paths are resolved under `blobs_dir`.
    pub(crate) fn from_json(bytes: &[u8], path: &Path, blobs_dir: &Path) -> Result<Self> {
        let template: MetadataTemplate =
            serde_json::from_slice(bytes).map_err(|e| Error::corrupted(path, e.to_string()))?;

        let mut layers = ImageLayers::new();
        for entry in template.layers {
            if entry.layer_type == LayerType::Base
                && (!entry.source_files.is_empty() || entry.extraction_path.is_some())
            {
                return Err(Error::corrupted(
                    path,
                    format!("base layer {} lists build inputs", entry.digest),
                ));
            }
            let layer = CachedLayer::new(
                blobs_dir.join(entry.digest.hash()),
                BlobDescriptor::new(entry.size, entry.digest.clone()),
                entry.diff_id,
            );
            let mut with_metadata = CachedLayerWithMetadata::new(
                layer,
                entry.layer_type,
                entry.source_files,
                entry.last_modified_time,
            );
            with_metadata.extraction_path = entry.extraction_path;
            layers
                .add(with_metadata)
                .map_err(|e| Error::corrupted(path, e.to_string()))?;
        }
        Ok(Self { layers })
    }

    pub(crate) fn to_json(&self) -> Result<Vec<u8>> {
        let mut entries = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            entries.push(LayerEntryTemplate {
                digest: layer.digest()?.clone(),
                size: layer.blob_descriptor()?.size(),
                diff_id: layer.diff_id()?.clone(),
                layer_type: layer.layer_type,
                source_files: layer.source_files.clone(),
                extraction_path: layer.extraction_path.clone(),
                last_modified_time: layer.last_modified_time,
            });
        }
        serde_json::to_vec_pretty(&MetadataTemplate { layers: entries })
            .map_err(|e| Error::Config(format!("serialize cache metadata failed: {e}")))
    }
}

// ---------------------------------------------------------------------------
// LayerFilter
// ---------------------------------------------------------------------------

/// Narrows [`CacheMetadata`] by layer type, exact source-file set and
/// extraction path.
pub struct LayerFilter<'a> {
    metadata: &'a CacheMetadata,
    layer_type: Option<LayerType>,
    source_files: Option<&'a BTreeSet<PathBuf>>,
    extraction_path: Option<&'a Path>,
}

impl<'a> LayerFilter<'a> {
    pub fn by_type(mut self, layer_type: LayerType) -> Self {
        self.layer_type = Some(layer_type);
        self
    }

    /// Keep layers built from exactly `source_files`.
    pub fn by_source_files(mut self, source_files: &'a BTreeSet<PathBuf>) -> Self {
        self.source_files = Some(source_files);
        self
    }

    pub fn by_extraction_path(mut self, extraction_path: &'a Path) -> Self {
        self.extraction_path = Some(extraction_path);
        self
    }

    pub fn filter(self) -> ImageLayers<CachedLayerWithMetadata> {
        self.metadata.layers.filter(|layer| {
            self.layer_type.map_or(true, |t| layer.layer_type == t)
                && self
                    .source_files
                    .map_or(true, |files| layer.source_files == *files)
                && self
                    .extraction_path
                    .map_or(true, |root| layer.extraction_path() == Some(root))
        })
    }
}

// ---------------------------------------------------------------------------
// On-disk templates
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct MetadataTemplate {
    #[serde(default)]
    layers: Vec<LayerEntryTemplate>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LayerEntryTemplate {
    digest: DescriptorDigest,
    size: u64,
    diff_id: DescriptorDigest,
    #[serde(rename = "type")]
    layer_type: LayerType,
    #[serde(default)]
    source_files: BTreeSet<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    extraction_path: Option<PathBuf>,
    last_modified_time: u64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
