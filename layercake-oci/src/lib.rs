//! Content identity and image model for layercake.
//!
//! SHA-256 digests, one-pass hashing blobs, layer variants, ordered
//! digest-unique layer collections, and the manifest templates that yield
//! base-image reference layers.

pub mod auth;
pub mod blob;
pub mod compression;
pub mod digest;
pub mod error;
pub mod image;
pub mod layer;
pub mod manifest;

pub use auth::Authorization;
pub use blob::{Blob, BlobDescriptor, CountingDigestWriter};
pub use digest::{DescriptorDigest, Digest};
pub use error::{OciError, Result};
pub use image::{Image, ImageLayers};
pub use layer::{AnyLayer, CachedLayer, Layer, ReferenceLayer};
