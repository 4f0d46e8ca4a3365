use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use layercake_oci::{ImageLayers, Layer, ReferenceLayer};
use tracing::debug;

use super::{Cache, CachedLayerWithMetadata, LayerType};
use crate::walk::{modified_millis, SourceWalker};
use crate::Result;

/// Read-only freshness queries against a [`Cache`].
///
/// Staleness is judged by modification time, not content: a layer is
/// outdated when any of its source files (or anything beneath a source
/// directory) has an mtime strictly newer than the layer's build time.
pub struct CacheChecker<'a> {
    cache: &'a Cache,
}

impl<'a> CacheChecker<'a> {
    pub fn new(cache: &'a Cache) -> Self {
        Self { cache }
    }

    /// Returns `true` if every layer in `base_image_layers` is cached as a
    /// base layer.
    pub fn are_base_image_layers_cached(
        &self,
        base_image_layers: &ImageLayers<ReferenceLayer>,
    ) -> Result<bool> {
        let cached = self
            .cache
            .metadata()?
            .filter_layers()
            .by_type(LayerType::Base)
            .filter();

        if cached.len() < base_image_layers.len() {
            return Ok(false);
        }

        for layer in base_image_layers {
            if !cached.has(layer.digest()?) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Returns `true` if no cached layer built from exactly `source_files` is
    /// up to date, i.e. a rebuild is needed.
    pub fn are_source_files_modified(&self, source_files: &BTreeSet<PathBuf>) -> Result<bool> {
        Ok(self.up_to_date_layer_by_source_files(source_files)?.is_none())
    }

    /// The most recently built cached layer for exactly `source_files` that
    /// none of those files is newer than.
    pub fn up_to_date_layer_by_source_files(
        &self,
        source_files: &BTreeSet<PathBuf>,
    ) -> Result<Option<CachedLayerWithMetadata>> {
        let metadata = self.cache.metadata()?;
        let candidates = metadata.filter_layers().by_source_files(source_files).filter();
        freshest(candidates.into_vec(), source_files)
    }

    /// The most recently built `layer_type` layer for exactly `source_files`
    /// archived under `extraction_path` that none of those files is newer
    /// than. This is the lookup a build uses before reusing a layer.
    pub fn up_to_date_layer(
        &self,
        layer_type: LayerType,
        source_files: &BTreeSet<PathBuf>,
        extraction_path: &Path,
    ) -> Result<Option<CachedLayerWithMetadata>> {
        let metadata = self.cache.metadata()?;
        let candidates = metadata
            .filter_layers()
            .by_type(layer_type)
            .by_source_files(source_files)
            .by_extraction_path(extraction_path)
            .filter();
        freshest(candidates.into_vec(), source_files)
    }
}

/// Newest candidate first; the first one with no modified source wins.
fn freshest(
    mut candidates: Vec<CachedLayerWithMetadata>,
    source_files: &BTreeSet<PathBuf>,
) -> Result<Option<CachedLayerWithMetadata>> {
    candidates.sort_by(|a, b| b.last_modified_time().cmp(&a.last_modified_time()));

    for candidate in candidates {
        if is_modified_since(SourceWalker::new(source_files), candidate.last_modified_time())? {
            debug!(
                digest = %candidate.layer().digest()?,
                built_at = candidate.last_modified_time(),
                "cached layer is outdated",
            );
            continue;
        }
        return Ok(Some(candidate));
    }
    Ok(None)
}

/// Whether any file `walker` visits has an mtime after `built_at_ms`.
/// Stops at the first newer file.
fn is_modified_since(walker: SourceWalker, built_at_ms: u64) -> Result<bool> {
    for visited in walker {
        let (path, metadata) = visited?;
        if modified_millis(&path, &metadata)? > built_at_ms {
            debug!(path = %path.display(), "source file modified since layer build");
            return Ok(true);
        }
    }
    Ok(false)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::now_ms;
    use layercake_oci::{BlobDescriptor, CachedLayer, DescriptorDigest};
    use std::fs::{self, File};
    use std::time::{Duration, UNIX_EPOCH};

    fn digest(c: char) -> DescriptorDigest {
        DescriptorDigest::from_hash(&c.to_string().repeat(64)).unwrap()
    }

    fn record(cache: &Cache, c: char, layer_type: LayerType, files: &BTreeSet<PathBuf>, built_at: u64) {
        let layer = CachedLayer::new(
            cache.blob_path(&digest(c)),
            BlobDescriptor::new(1, digest(c)),
            digest(c),
        );
        cache
            .commit(CachedLayerWithMetadata::new(layer, layer_type, files.clone(), built_at))
            .unwrap();
    }

    fn set_mtime(path: &Path, ms: u64) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(UNIX_EPOCH + Duration::from_millis(ms)).unwrap();
    }

    fn references(chars: &[char]) -> ImageLayers<ReferenceLayer> {
        let mut layers = ImageLayers::new();
        for &c in chars {
            layers.add(ReferenceLayer::new(BlobDescriptor::new(1, digest(c)))).unwrap();
        }
        layers
    }

    #[test]
    fn base_layers_cached() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = Cache::open(tmp.path()).unwrap();
        let none = BTreeSet::new();
        record(&cache, 'a', LayerType::Base, &none, 1);
        record(&cache, 'b', LayerType::Base, &none, 1);
        let checker = CacheChecker::new(&cache);

        assert!(checker.are_base_image_layers_cached(&references(&['a', 'b'])).unwrap());
        assert!(checker.are_base_image_layers_cached(&references(&['a'])).unwrap());
        assert!(!checker.are_base_image_layers_cached(&references(&['a', 'b', 'c'])).unwrap());
        assert!(!checker.are_base_image_layers_cached(&references(&['c'])).unwrap());
    }

    #[test]
    fn application_layers_do_not_count_as_base() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = Cache::open(tmp.path()).unwrap();
        let files: BTreeSet<PathBuf> = [tmp.path().join("x")].into_iter().collect();
        record(&cache, 'a', LayerType::Classes, &files, 1);

        let checker = CacheChecker::new(&cache);
        assert!(!checker.are_base_image_layers_cached(&references(&['a'])).unwrap());
    }

    #[test]
    fn unchanged_files_are_fresh() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(src.join("pkg")).unwrap();
        fs::write(src.join("pkg/A.class"), "a").unwrap();
        fs::write(src.join("B.class"), "b").unwrap();

        let built_at = now_ms() + 1_000;
        let cache = Cache::open(tmp.path().join("cache")).unwrap();
        let files: BTreeSet<PathBuf> = [src.clone()].into_iter().collect();
        record(&cache, 'a', LayerType::Classes, &files, built_at);

        let checker = CacheChecker::new(&cache);
        assert!(!checker.are_source_files_modified(&files).unwrap());
        let layer = checker.up_to_date_layer_by_source_files(&files).unwrap().unwrap();
        assert_eq!(layer.layer().digest().unwrap(), &digest('a'));
    }

    #[test]
    fn touching_nested_file_marks_modified() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(src.join("pkg/deep")).unwrap();
        let nested = src.join("pkg/deep/A.class");
        fs::write(&nested, "a").unwrap();
        let outside = tmp.path().join("Other.class");
        fs::write(&outside, "o").unwrap();

        let built_at = now_ms() + 1_000;
        let cache = Cache::open(tmp.path().join("cache")).unwrap();
        let files: BTreeSet<PathBuf> = [src.clone()].into_iter().collect();
        record(&cache, 'a', LayerType::Classes, &files, built_at);
        let checker = CacheChecker::new(&cache);

        // Files outside the set do not matter.
        set_mtime(&outside, built_at + 60_000);
        assert!(!checker.are_source_files_modified(&files).unwrap());

        // Equal to build time is not newer.
        set_mtime(&nested, built_at);
        assert!(!checker.are_source_files_modified(&files).unwrap());

        set_mtime(&nested, built_at + 1);
        assert!(checker.are_source_files_modified(&files).unwrap());
    }

    #[test]
    fn different_file_set_is_never_a_substitute() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a.txt");
        let b = tmp.path().join("b.txt");
        fs::write(&a, "a").unwrap();
        fs::write(&b, "b").unwrap();

        let cache = Cache::open(tmp.path().join("cache")).unwrap();
        let set_a: BTreeSet<PathBuf> = [a.clone()].into_iter().collect();
        let set_ab: BTreeSet<PathBuf> = [a, b].into_iter().collect();
        record(&cache, 'a', LayerType::Resources, &set_a, now_ms() + 1_000);

        let checker = CacheChecker::new(&cache);
        assert!(!checker.are_source_files_modified(&set_a).unwrap());
        assert!(checker.are_source_files_modified(&set_ab).unwrap());
    }

    #[test]
    fn no_cached_layer_means_modified() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = Cache::open(tmp.path()).unwrap();
        let files: BTreeSet<PathBuf> = [tmp.path().join("whatever")].into_iter().collect();
        assert!(CacheChecker::new(&cache).are_source_files_modified(&files).unwrap());
    }

    #[test]
    fn fresh_candidate_wins_over_outdated_one() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("res.txt");
        fs::write(&src, "r").unwrap();
        let cache = Cache::open(tmp.path().join("cache")).unwrap();
        let files: BTreeSet<PathBuf> = [src.clone()].into_iter().collect();

        // Two records for the same inputs under different types, one outdated.
        let now = now_ms();
        set_mtime(&src, now);
        record(&cache, 'a', LayerType::Resources, &files, now - 10_000);
        record(&cache, 'b', LayerType::Classes, &files, now + 10_000);

        let fresh = CacheChecker::new(&cache)
            .up_to_date_layer_by_source_files(&files)
            .unwrap()
            .unwrap();
        assert_eq!(fresh.layer().digest().unwrap(), &digest('b'));
    }

    #[test]
    fn missing_source_file_is_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = Cache::open(tmp.path().join("cache")).unwrap();
        let files: BTreeSet<PathBuf> = [tmp.path().join("gone.txt")].into_iter().collect();
        record(&cache, 'a', LayerType::Resources, &files, now_ms());

        let err = CacheChecker::new(&cache).are_source_files_modified(&files).unwrap_err();
        assert!(err.is_io());
    }

    #[test]
    fn corrupted_metadata_fails_both_queries() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = Cache::open(tmp.path()).unwrap();
        fs::write(cache.metadata_path(), "42").unwrap();
        let checker = CacheChecker::new(&cache);

        assert!(matches!(
            checker.are_base_image_layers_cached(&references(&['a'])).unwrap_err(),
            crate::Error::CacheMetadataCorrupted { .. }
        ));
        assert!(matches!(
            checker.are_source_files_modified(&BTreeSet::new()).unwrap_err(),
            crate::Error::CacheMetadataCorrupted { .. }
        ));
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_directory_is_io_error() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("locked");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("f"), "f").unwrap();
        let cache = Cache::open(tmp.path().join("cache")).unwrap();
        let files: BTreeSet<PathBuf> = [dir.clone()].into_iter().collect();
        record(&cache, 'a', LayerType::Resources, &files, now_ms() + 60_000);

        fs::set_permissions(&dir, fs::Permissions::from_mode(0o000)).unwrap();
        let locked = fs::read_dir(&dir).is_err();
        let result = CacheChecker::new(&cache).are_source_files_modified(&files);
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)).unwrap();

        // Privileged users bypass the mode bits; the injected listing
        // failure below covers that case.
        if locked {
            assert!(result.unwrap_err().is_io());
        } else {
            assert!(!result.unwrap());
        }
    }

    #[test]
    fn directory_listing_failure_is_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("res");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("f"), "f").unwrap();

        let walker = SourceWalker::new([&dir])
            .with_dir_lister(|_| Err(std::io::Error::from(std::io::ErrorKind::PermissionDenied)));
        let err = is_modified_since(walker, now_ms() + 60_000).unwrap_err();
        assert!(err.is_io());
    }

    #[test]
    fn typed_lookup_matches_type_and_extraction_path() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("shared");
        fs::create_dir(&src).unwrap();
        fs::write(src.join("a.txt"), "a").unwrap();
        let cache = Cache::open(tmp.path().join("cache")).unwrap();
        let files: BTreeSet<PathBuf> = [src].into_iter().collect();
        let built_at = now_ms() + 10_000;

        for (c, layer_type, root) in [
            ('a', LayerType::Resources, "/app/resources"),
            ('b', LayerType::Classes, "/app/classes"),
        ] {
            let layer = CachedLayer::new(
                cache.blob_path(&digest(c)),
                BlobDescriptor::new(1, digest(c)),
                digest(c),
            );
            cache
                .commit(
                    CachedLayerWithMetadata::new(layer, layer_type, files.clone(), built_at)
                        .with_extraction_path(root),
                )
                .unwrap();
        }
        let checker = CacheChecker::new(&cache);

        let resources = checker
            .up_to_date_layer(LayerType::Resources, &files, Path::new("/app/resources"))
            .unwrap()
            .unwrap();
        assert_eq!(resources.layer().digest().unwrap(), &digest('a'));
        let classes = checker
            .up_to_date_layer(LayerType::Classes, &files, Path::new("/app/classes"))
            .unwrap()
            .unwrap();
        assert_eq!(classes.layer().digest().unwrap(), &digest('b'));

        // Same files and type, different root: nothing to reuse.
        assert!(checker
            .up_to_date_layer(LayerType::Classes, &files, Path::new("/opt/other"))
            .unwrap()
            .is_none());
        // Same files and root, wrong type.
        assert!(checker
            .up_to_date_layer(LayerType::Dependencies, &files, Path::new("/app/classes"))
            .unwrap()
            .is_none());
    }
}
