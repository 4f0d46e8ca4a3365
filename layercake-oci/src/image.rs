use std::collections::{HashMap, HashSet};

use crate::digest::DescriptorDigest;
use crate::layer::{AnyLayer, Layer};
use crate::{OciError, Result};

// ---------------------------------------------------------------------------
// ImageLayers
// ---------------------------------------------------------------------------

/// Ordered layers of an image, unique by blob digest.
///
/// Insertion order is the order in which the layers are applied to the image
/// filesystem.
#[derive(Debug, Clone)]
pub struct ImageLayers<T> {
    layers: Vec<T>,
    digests: HashSet<DescriptorDigest>,
}

impl<T> Default for ImageLayers<T> {
    fn default() -> Self {
        Self {
            layers: Vec::new(),
            digests: HashSet::new(),
        }
    }
}

impl<T: Layer> ImageLayers<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `layer`, rejecting a digest that is already present.
    pub fn add(&mut self, layer: T) -> Result<()> {
        let digest = layer.digest()?.clone();
        if self.digests.contains(&digest) {
            return Err(OciError::DuplicateLayer(digest.to_string()));
        }
        self.digests.insert(digest);
        self.layers.push(layer);
        Ok(())
    }

    pub fn has(&self, digest: &DescriptorDigest) -> bool {
        self.digests.contains(digest)
    }

    /// Look up a layer by blob digest.
    pub fn get(&self, digest: &DescriptorDigest) -> Option<&T> {
        if !self.has(digest) {
            return None;
        }
        self.layers
            .iter()
            .find(|l| l.digest().map(|d| d == digest).unwrap_or(false))
    }

    /// Keep only the layers matching `predicate`, preserving order.
    pub fn filter<P>(&self, mut predicate: P) -> Self
    where
        T: Clone,
        P: FnMut(&T) -> bool,
    {
        let mut out = Self::new();
        for layer in &self.layers {
            if !predicate(layer) {
                continue;
            }
            // Digests are already unique and present.
            if let Ok(d) = layer.digest() {
                out.digests.insert(d.clone());
                out.layers.push(layer.clone());
            }
        }
        out
    }
}

impl<T> ImageLayers<T> {
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.layers.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.layers
    }

    pub fn into_vec(self) -> Vec<T> {
        self.layers
    }
}

impl<'a, T> IntoIterator for &'a ImageLayers<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.layers.iter()
    }
}

impl<T> IntoIterator for ImageLayers<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.layers.into_iter()
    }
}

// ---------------------------------------------------------------------------
// Image
// ---------------------------------------------------------------------------

/// An image under construction: layers, environment and entrypoint.
#[derive(Debug, Clone, Default)]
pub struct Image {
    layers: ImageLayers<AnyLayer>,
    environment: HashMap<String, String>,
    entrypoint: Vec<String>,
}

impl Image {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn environment(&self) -> &HashMap<String, String> {
        &self.environment
    }

    pub fn set_environment_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.environment.insert(name.into(), value.into());
    }

    pub fn entrypoint(&self) -> &[String] {
        &self.entrypoint
    }

    pub fn set_entrypoint(&mut self, entrypoint: Vec<String>) {
        self.entrypoint = entrypoint;
    }

    pub fn layers(&self) -> &ImageLayers<AnyLayer> {
        &self.layers
    }

    pub fn add_layer(&mut self, layer: impl Into<AnyLayer>) -> Result<()> {
        self.layers.add(layer.into())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
