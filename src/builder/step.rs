//! Build-or-reuse orchestration for the application layers.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::sync::Arc;

use layercake_oci::{CachedLayer, Image, ImageLayers, Layer, ReferenceLayer};
use tracing::info;

use super::{LayerBuilder, LayerSources, SourceFilesConfiguration};
use crate::cache::{Cache, CacheChecker, CacheWriter, LayerType};
use crate::{Error, Result};

/// A unit of the image build with a typed result.
#[async_trait::async_trait]
pub trait Step: Send + Sync {
    type Output: Send;

    async fn run(&self) -> Result<Self::Output>;
}

/// Whether an application layer came from the cache or was rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerOutcome {
    Reused,
    Built,
}

impl fmt::Display for LayerOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reused => write!(f, "reused"),
            Self::Built => write!(f, "built"),
        }
    }
}

/// The application layers in application order plus how each was obtained.
#[derive(Debug)]
pub struct ApplicationLayers {
    layers: ImageLayers<CachedLayer>,
    outcomes: BTreeMap<LayerType, LayerOutcome>,
}

impl ApplicationLayers {
    pub fn layers(&self) -> &ImageLayers<CachedLayer> {
        &self.layers
    }

    pub fn into_layers(self) -> ImageLayers<CachedLayer> {
        self.layers
    }

    pub fn outcome(&self, layer_type: LayerType) -> Option<LayerOutcome> {
        self.outcomes.get(&layer_type).copied()
    }

    /// Outcomes in application order.
    pub fn outcomes(&self) -> impl Iterator<Item = (LayerType, LayerOutcome)> + '_ {
        self.outcomes.iter().map(|(t, o)| (*t, *o))
    }
}

/// For each of dependencies, resources and classes, reuse the up-to-date
/// cached layer or build and cache a new one.
///
/// The three layer types are handled concurrently on blocking worker threads
/// and always assembled as dependencies, resources, classes.
pub struct BuildAndCacheApplicationLayersStep {
    source_files: SourceFilesConfiguration,
    cache: Arc<Cache>,
}

impl BuildAndCacheApplicationLayersStep {
    pub fn new(source_files: SourceFilesConfiguration, cache: Arc<Cache>) -> Self {
        Self { source_files, cache }
    }

    async fn spawn(&self, layer_type: LayerType, sources: LayerSources) -> Result<(CachedLayer, LayerOutcome)> {
        let cache = Arc::clone(&self.cache);
        tokio::task::spawn_blocking(move || build_or_reuse(&cache, layer_type, &sources))
            .await
            .map_err(|e| Error::io(format!("{layer_type} layer task failed"), io::Error::other(e)))?
    }
}

#[async_trait::async_trait]
impl Step for BuildAndCacheApplicationLayersStep {
    type Output = ApplicationLayers;

    async fn run(&self) -> Result<ApplicationLayers> {
        let (dependencies, resources, classes) = tokio::try_join!(
            self.spawn(LayerType::Dependencies, self.source_files.dependencies.clone()),
            self.spawn(LayerType::Resources, self.source_files.resources.clone()),
            self.spawn(LayerType::Classes, self.source_files.classes.clone()),
        )?;

        let mut layers = ImageLayers::new();
        let mut outcomes = BTreeMap::new();
        for (layer_type, (layer, outcome)) in LayerType::APPLICATION
            .into_iter()
            .zip([dependencies, resources, classes])
        {
            layers.add(layer)?;
            outcomes.insert(layer_type, outcome);
        }

        Ok(ApplicationLayers { layers, outcomes })
    }
}

/// Reuse the freshest cached `layer_type` layer for exactly `sources`, or
/// build one.
fn build_or_reuse(
    cache: &Cache,
    layer_type: LayerType,
    sources: &LayerSources,
) -> Result<(CachedLayer, LayerOutcome)> {
    let reusable = CacheChecker::new(cache).up_to_date_layer(
        layer_type,
        sources.files(),
        sources.extraction_path(),
    )?;
    if let Some(cached) = reusable {
        info!(
            layer_type = %layer_type,
            digest = %cached.layer().digest()?,
            "reusing cached layer",
        );
        return Ok((cached.into_layer(), LayerOutcome::Reused));
    }

    info!(layer_type = %layer_type, files = sources.files().len(), "building layer");
    let builder = LayerBuilder::new(sources.files().clone(), sources.extraction_path());
    let layer = CacheWriter::new(cache).write_layer(&builder, layer_type)?;
    Ok((layer, LayerOutcome::Built))
}

/// Put the base image layers, then the application layers, into an [`Image`].
pub fn assemble_image(
    base_layers: ImageLayers<ReferenceLayer>,
    application_layers: ImageLayers<CachedLayer>,
    environment: impl IntoIterator<Item = (String, String)>,
    entrypoint: Vec<String>,
) -> Result<Image> {
    let mut image = Image::new();
    for layer in base_layers {
        image.add_layer(layer)?;
    }
    for layer in application_layers {
        image.add_layer(layer)?;
    }
    for (name, value) in environment {
        image.set_environment_variable(name, value);
    }
    image.set_entrypoint(entrypoint);
    Ok(image)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
