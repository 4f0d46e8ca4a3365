//! Layer construction and the application-layer build step.

pub mod layer_builder;
pub mod source_files;
pub mod step;

pub use layer_builder::LayerBuilder;
pub use source_files::{LayerSources, SourceFilesConfiguration};
pub use step::{assemble_image, ApplicationLayers, BuildAndCacheApplicationLayersStep, LayerOutcome, Step};
