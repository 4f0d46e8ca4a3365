//! Deterministic layer archives.
//!
//! Entries are sorted by archive path and carry fixed ownership, permissions
//! and timestamps, so the same inputs always produce byte-identical tar
//! streams and therefore stable digests.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use tar::{EntryType, Header};
use tracing::debug;

use crate::walk::SourceWalker;
use crate::{Error, Result};

const DIR_MODE: u32 = 0o755;
const FILE_MODE: u32 = 0o644;

#[derive(Debug, Clone, PartialEq, Eq)]
enum ArchiveEntry {
    Directory,
    File(PathBuf),
}

/// Packages a set of source paths into a tar stream rooted at an extraction
/// path.
///
/// A source path `p` appears in the archive as `<extraction_path>/<name of p>`;
/// directories keep their structure beneath that.
#[derive(Debug, Clone)]
pub struct LayerBuilder {
    source_files: BTreeSet<PathBuf>,
    extraction_path: PathBuf,
}

impl LayerBuilder {
    pub fn new(source_files: BTreeSet<PathBuf>, extraction_path: impl Into<PathBuf>) -> Self {
        Self {
            source_files,
            extraction_path: extraction_path.into(),
        }
    }

    pub fn source_files(&self) -> &BTreeSet<PathBuf> {
        &self.source_files
    }

    pub fn extraction_path(&self) -> &Path {
        &self.extraction_path
    }

    /// Write the uncompressed tar stream to `out` and hand `out` back.
    pub fn write_tar<W: Write>(&self, out: W) -> Result<W> {
        let entries = self.collect_entries()?;

        let mut builder = tar::Builder::new(out);
        builder.mode(tar::HeaderMode::Deterministic);

        for (archive_path, entry) in &entries {
            let mut header = Header::new_gnu();
            header.set_mtime(0);
            header.set_uid(0);
            header.set_gid(0);

            match entry {
                ArchiveEntry::Directory => {
                    header.set_entry_type(EntryType::Directory);
                    header.set_mode(DIR_MODE);
                    header.set_size(0);
                    builder
                        .append_data(&mut header, archive_path, io::empty())
                        .map_err(|e| Error::io(format!("failed to archive {archive_path}"), e))?;
                }
                ArchiveEntry::File(source) => {
                    let file = File::open(source)
                        .map_err(|e| Error::io(format!("failed to open {}", source.display()), e))?;
                    let len = file
                        .metadata()
                        .map_err(|e| Error::io(format!("failed to stat {}", source.display()), e))?
                        .len();
                    header.set_entry_type(EntryType::Regular);
                    header.set_mode(FILE_MODE);
                    header.set_size(len);
                    builder
                        .append_data(&mut header, archive_path, file)
                        .map_err(|e| Error::io(format!("failed to archive {}", source.display()), e))?;
                }
            }
        }

        let out = builder
            .into_inner()
            .map_err(|e| Error::io("failed to finish layer archive", e))?;
        debug!(
            extraction_path = %self.extraction_path.display(),
            entries = entries.len(),
            "wrote layer archive",
        );
        Ok(out)
    }

    /// Map every archive path to what it holds, sorted by path.
    fn collect_entries(&self) -> Result<BTreeMap<String, ArchiveEntry>> {
        let base = relative_components(&self.extraction_path);
        let mut entries = BTreeMap::new();

        for depth in 1..=base.len() {
            entries.insert(base[..depth].join("/"), ArchiveEntry::Directory);
        }

        for source in &self.source_files {
            let name = source.file_name().ok_or_else(|| {
                Error::io(
                    format!("source path {} has no file name", source.display()),
                    io::Error::from(io::ErrorKind::InvalidInput),
                )
            })?;
            let mut root = base.clone();
            root.push(name.to_string_lossy().into_owned());

            for visited in SourceWalker::new([source]) {
                let (path, metadata) = visited?;
                let mut parts = root.clone();
                if let Ok(rel) = path.strip_prefix(source) {
                    parts.extend(relative_components(rel));
                }
                let archive_path = parts.join("/");

                let entry = if metadata.is_dir() {
                    ArchiveEntry::Directory
                } else if metadata.is_file() {
                    ArchiveEntry::File(path.clone())
                } else {
                    debug!(path = %path.display(), "skipping special file");
                    continue;
                };

                // Directories merge; a file never shares its path.
                if let Some(previous) = entries.insert(archive_path.clone(), entry.clone()) {
                    if previous != ArchiveEntry::Directory || entry != ArchiveEntry::Directory {
                        return Err(Error::io(
                            format!(
                                "archive path {archive_path} is claimed by {} and another source",
                                path.display()
                            ),
                            io::Error::from(io::ErrorKind::AlreadyExists),
                        ));
                    }
                }
            }
        }

        Ok(entries)
    }
}

/// Normal components of `path` as strings, dropping roots and `.`.
fn relative_components(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Read;
    use std::time::{Duration, UNIX_EPOCH};

    fn entries_of(tar_bytes: &[u8]) -> Vec<(String, EntryType, u32, Vec<u8>)> {
        let mut archive = tar::Archive::new(tar_bytes);
        archive
            .entries()
            .unwrap()
            .map(|e| {
                let mut e = e.unwrap();
                let path = e.path().unwrap().to_string_lossy().trim_end_matches('/').to_string();
                let kind = e.header().entry_type();
                let mode = e.header().mode().unwrap();
                assert_eq!(e.header().mtime().unwrap(), 0);
                assert_eq!(e.header().uid().unwrap(), 0);
                let mut data = Vec::new();
                e.read_to_end(&mut data).unwrap();
                (path, kind, mode, data)
            })
            .collect()
    }

    fn set(paths: &[PathBuf]) -> BTreeSet<PathBuf> {
        paths.iter().cloned().collect()
    }

    #[test]
    fn lays_out_files_under_extraction_path() {
        let tmp = tempfile::tempdir().unwrap();
        let classes = tmp.path().join("classes");
        fs::create_dir_all(classes.join("com/example")).unwrap();
        fs::write(classes.join("com/example/Main.class"), "main").unwrap();
        let lib = tmp.path().join("dep.jar");
        fs::write(&lib, "jar").unwrap();

        let builder = LayerBuilder::new(set(&[classes, lib]), "/app/files");
        let tar = builder.write_tar(Vec::new()).unwrap();
        let entries = entries_of(&tar);

        let paths: Vec<&str> = entries.iter().map(|e| e.0.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "app",
                "app/files",
                "app/files/classes",
                "app/files/classes/com",
                "app/files/classes/com/example",
                "app/files/classes/com/example/Main.class",
                "app/files/dep.jar",
            ]
        );

        let main = entries.iter().find(|e| e.0.ends_with("Main.class")).unwrap();
        assert_eq!(main.1, EntryType::Regular);
        assert_eq!(main.2, FILE_MODE);
        assert_eq!(main.3, b"main");

        let dir = entries.iter().find(|e| e.0 == "app/files/classes").unwrap();
        assert_eq!(dir.1, EntryType::Directory);
        assert_eq!(dir.2, DIR_MODE);
    }

    #[test]
    fn output_is_independent_of_mtimes() {
        let tmp = tempfile::tempdir().unwrap();
        let res = tmp.path().join("res");
        fs::create_dir_all(&res).unwrap();
        let file = res.join("a.properties");
        fs::write(&file, "k=v").unwrap();
        fs::write(res.join("b.properties"), "x=y").unwrap();

        let builder = LayerBuilder::new(set(&[res]), "/app/resources");
        let first = builder.write_tar(Vec::new()).unwrap();

        File::options()
            .write(true)
            .open(&file)
            .unwrap()
            .set_modified(UNIX_EPOCH + Duration::from_secs(1_000_000))
            .unwrap();
        let second = builder.write_tar(Vec::new()).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn empty_sets_differ_only_by_extraction_path() {
        let a = LayerBuilder::new(BTreeSet::new(), "/app/libs").write_tar(Vec::new()).unwrap();
        let b = LayerBuilder::new(BTreeSet::new(), "/app/classes").write_tar(Vec::new()).unwrap();
        let a_again = LayerBuilder::new(BTreeSet::new(), "/app/libs").write_tar(Vec::new()).unwrap();

        assert_ne!(a, b);
        assert_eq!(a, a_again);
    }

    #[test]
    fn content_change_changes_stream() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("app.yml");
        fs::write(&file, "one").unwrap();
        let builder = LayerBuilder::new(set(&[file.clone()]), "/app/resources");
        let before = builder.write_tar(Vec::new()).unwrap();

        fs::write(&file, "two").unwrap();
        let after = builder.write_tar(Vec::new()).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn same_named_files_conflict() {
        let tmp = tempfile::tempdir().unwrap();
        let first = tmp.path().join("a/lib/x.jar");
        let second = tmp.path().join("b/lib/x.jar");
        for (path, body) in [(&first, "one"), (&second, "two")] {
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, body).unwrap();
        }

        let err = LayerBuilder::new(set(&[first, second]), "/app/libs")
            .write_tar(Vec::new())
            .unwrap_err();
        assert!(err.is_io());
        assert!(err.to_string().contains("app/libs/x.jar"), "{err}");
    }

    #[test]
    fn file_cannot_replace_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("a/config");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("app.yml"), "k: v").unwrap();
        let file = tmp.path().join("b/config");
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, "flat").unwrap();

        let err = LayerBuilder::new(set(&[dir, file]), "/app/resources")
            .write_tar(Vec::new())
            .unwrap_err();
        assert!(err.is_io());
    }

    #[test]
    fn same_named_directories_merge() {
        let tmp = tempfile::tempdir().unwrap();
        let first = tmp.path().join("a/static");
        let second = tmp.path().join("b/static");
        fs::create_dir_all(&first).unwrap();
        fs::create_dir_all(&second).unwrap();
        fs::write(first.join("index.html"), "<html/>").unwrap();
        fs::write(second.join("site.css"), "body{}").unwrap();

        let tar = LayerBuilder::new(set(&[first, second]), "/app/resources")
            .write_tar(Vec::new())
            .unwrap();
        let paths: Vec<String> = entries_of(&tar).into_iter().map(|e| e.0).collect();
        assert!(paths.contains(&"app/resources/static/index.html".to_string()));
        assert!(paths.contains(&"app/resources/static/site.css".to_string()));
    }

    #[test]
    fn missing_source_is_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let builder = LayerBuilder::new(set(&[tmp.path().join("nope.jar")]), "/app/libs");
        assert!(builder.write_tar(Vec::new()).unwrap_err().is_io());
    }

    #[test]
    fn relative_components_drop_root() {
        assert_eq!(relative_components(Path::new("/app/./libs")), vec!["app", "libs"]);
        assert!(relative_components(Path::new("/")).is_empty());
    }
}
