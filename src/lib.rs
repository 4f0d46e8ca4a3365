//! layercake: content-addressed caching of application image layers
//!
//! Splits an application into dependencies, resources and classes layers,
//! builds each as a deterministic gzip tar, and caches it by digest together
//! with the source files and time it was built from. A later build reuses a
//! cached layer for exactly the same source files as long as none of them has
//! been modified since.
//!
//! # Key Features
//!
//! - **One-pass hashing**: blob digest, diff ID and size computed while the
//!   layer is written
//! - **Staleness by mtime**: a recursive, stack-based walk with early exit
//! - **Atomic cache updates**: blobs and metadata land by rename
//! - **Concurrent layer builds**: the three layer types run in parallel and
//!   are always assembled in the same order
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use layercake::builder::{BuildAndCacheApplicationLayersStep, LayerSources, SourceFilesConfiguration, Step};
//! use layercake::cache::Cache;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache = Arc::new(Cache::open(".layercake-cache")?);
//!     let sources = SourceFilesConfiguration {
//!         dependencies: LayerSources::new(["build/libs".into()], "/app/libs"),
//!         resources: LayerSources::new(["src/main/resources".into()], "/app/resources"),
//!         classes: LayerSources::new(["build/classes".into()], "/app/classes"),
//!     };
//!
//!     let layers = BuildAndCacheApplicationLayersStep::new(sources, cache).run().await?;
//!     for (layer_type, outcome) in layers.outcomes() {
//!         println!("{layer_type}: {outcome}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod cache;
pub mod config;
pub mod error;
pub mod walk;

// Re-exports for convenience
pub use error::{Error, Result};
pub use layercake_oci::{
    AnyLayer, Authorization, Blob, BlobDescriptor, CachedLayer, DescriptorDigest, Digest, Image,
    ImageLayers, Layer, OciError, ReferenceLayer,
};
