//! Build configuration files.
//!
//! YAML (`.yaml`/`.yml`) or JSON. Relative paths are resolved against the
//! directory holding the configuration file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use layercake_oci::manifest::parse_manifest;
use layercake_oci::{ImageLayers, ReferenceLayer};

use crate::builder::source_files::{
    DEFAULT_CLASSES_EXTRACTION_PATH, DEFAULT_DEPENDENCIES_EXTRACTION_PATH,
    DEFAULT_RESOURCES_EXTRACTION_PATH,
};
use crate::builder::{LayerSources, SourceFilesConfiguration};
use crate::{Error, Result};

/// Overrides `cache_dir` when set.
pub const CACHE_DIR_ENV: &str = "LAYERCAKE_CACHE_DIR";

const DEFAULT_CACHE_DIR: &str = ".layercake-cache";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default)]
    pub source_files: SourceFilesSpec,
    /// Path to a schema 2.1 or 2.2 manifest of the base image.
    #[serde(default)]
    pub base_image_manifest: Option<PathBuf>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub entrypoint: Vec<String>,
    #[serde(skip)]
    base_dir: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceFilesSpec {
    #[serde(default)]
    pub dependencies: LayerSpec,
    #[serde(default)]
    pub resources: LayerSpec,
    #[serde(default)]
    pub classes: LayerSpec,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayerSpec {
    #[serde(default)]
    pub files: Vec<PathBuf>,
    #[serde(default)]
    pub extraction_path: Option<PathBuf>,
}

fn default_api_version() -> String {
    "v1".to_string()
}

impl BuildConfig {
    /// Directory relative paths are resolved against.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Cache directory, honoring [`CACHE_DIR_ENV`].
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir_with(env::var_os(CACHE_DIR_ENV).map(PathBuf::from))
    }

    fn cache_dir_with(&self, env_override: Option<PathBuf>) -> PathBuf {
        let dir = env_override
            .or_else(|| self.cache_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR));
        self.resolve(&dir)
    }

    /// Source files per application layer with paths resolved and default
    /// extraction paths filled in.
    pub fn source_files_configuration(&self) -> SourceFilesConfiguration {
        let layer = |spec: &LayerSpec, default_extraction: &str| {
            LayerSources::new(
                spec.files.iter().map(|f| self.resolve(f)),
                spec.extraction_path
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(default_extraction)),
            )
        };
        SourceFilesConfiguration {
            dependencies: layer(&self.source_files.dependencies, DEFAULT_DEPENDENCIES_EXTRACTION_PATH),
            resources: layer(&self.source_files.resources, DEFAULT_RESOURCES_EXTRACTION_PATH),
            classes: layer(&self.source_files.classes, DEFAULT_CLASSES_EXTRACTION_PATH),
        }
    }

    /// Reference layers of the base image, in application order. Empty when
    /// no base manifest is configured.
    pub fn base_layers(&self) -> Result<ImageLayers<ReferenceLayer>> {
        let Some(manifest) = &self.base_image_manifest else {
            return Ok(ImageLayers::new());
        };
        let path = self.resolve(manifest);
        let bytes = fs::read(&path)
            .map_err(|e| Error::io(format!("failed to read manifest {}", path.display()), e))?;
        Ok(parse_manifest(&bytes)?.layers()?)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

pub fn load_config(path: &Path) -> Result<BuildConfig> {
    let raw = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;

    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
        .unwrap_or(false);

    let mut config: BuildConfig = if is_yaml {
        serde_yaml::from_str(&raw)
            .map_err(|e| Error::Config(format!("invalid YAML config {}: {}", path.display(), e)))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("invalid JSON config {}: {}", path.display(), e)))?
    };
    config.base_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &BuildConfig) -> Result<()> {
    if config.api_version != "v1" {
        return Err(Error::Config(format!(
            "unsupported api_version '{}', expected 'v1'",
            config.api_version
        )));
    }

    for (name, spec) in [
        ("dependencies", &config.source_files.dependencies),
        ("resources", &config.source_files.resources),
        ("classes", &config.source_files.classes),
    ] {
        if let Some(extraction) = &spec.extraction_path {
            if !extraction.is_absolute() {
                return Err(Error::Config(format!(
                    "source_files.{}.extraction_path must be absolute, got '{}'",
                    name,
                    extraction.display()
                )));
            }
        }
        if spec.files.iter().any(|f| f.as_os_str().is_empty()) {
            return Err(Error::Config(format!(
                "source_files.{}.files cannot contain empty paths",
                name
            )));
        }
    }

    for key in config.environment.keys() {
        if key.is_empty() || key.contains('=') {
            return Err(Error::Config(format!("invalid environment variable name '{}'", key)));
        }
    }

    Ok(())
}
