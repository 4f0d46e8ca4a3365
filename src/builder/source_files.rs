use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::cache::LayerType;

pub const DEFAULT_DEPENDENCIES_EXTRACTION_PATH: &str = "/app/libs";
pub const DEFAULT_RESOURCES_EXTRACTION_PATH: &str = "/app/resources";
pub const DEFAULT_CLASSES_EXTRACTION_PATH: &str = "/app/classes";

/// Source paths of one application layer and where they land in the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSources {
    files: BTreeSet<PathBuf>,
    extraction_path: PathBuf,
}

impl LayerSources {
    pub fn new(files: impl IntoIterator<Item = PathBuf>, extraction_path: impl Into<PathBuf>) -> Self {
        Self {
            files: files.into_iter().collect(),
            extraction_path: extraction_path.into(),
        }
    }

    pub fn files(&self) -> &BTreeSet<PathBuf> {
        &self.files
    }

    pub fn extraction_path(&self) -> &Path {
        &self.extraction_path
    }
}

/// Source files for the three application layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFilesConfiguration {
    pub dependencies: LayerSources,
    pub resources: LayerSources,
    pub classes: LayerSources,
}

impl SourceFilesConfiguration {
    /// Sources for an application layer type; `None` for [`LayerType::Base`].
    pub fn for_type(&self, layer_type: LayerType) -> Option<&LayerSources> {
        match layer_type {
            LayerType::Base => None,
            LayerType::Dependencies => Some(&self.dependencies),
            LayerType::Resources => Some(&self.resources),
            LayerType::Classes => Some(&self.classes),
        }
    }
}

impl Default for SourceFilesConfiguration {
    fn default() -> Self {
        Self {
            dependencies: LayerSources::new([], DEFAULT_DEPENDENCIES_EXTRACTION_PATH),
            resources: LayerSources::new([], DEFAULT_RESOURCES_EXTRACTION_PATH),
            classes: LayerSources::new([], DEFAULT_CLASSES_EXTRACTION_PATH),
        }
    }
}
