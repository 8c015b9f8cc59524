//! Packaging: named blobs → one downloadable archive, and back.
//!
//! The workflow hands a [`PackageWriter`] the manifest and image blobs with
//! their full in-archive names (see [`ArchiveLayout::entries`]); the writer
//! only serializes. [`ZipPackageWriter`] produces a deflate-compressed ZIP in
//! memory. [`read_package`] reads one back for import.

use crate::archive::{AssembledArchive, NamedBlob};
use crate::config::ArchiveConfig;
use std::io::{Cursor, Read, Write};
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

#[derive(Error, Debug)]
pub enum PackageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("Duplicate entry in package: {0}")]
    DuplicateEntry(String),
}

/// Where the manifest and images live inside an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveLayout {
    pub manifest_name: String,
    pub images_dir: String,
}

impl Default for ArchiveLayout {
    fn default() -> Self {
        (&ArchiveConfig::default()).into()
    }
}

impl From<&ArchiveConfig> for ArchiveLayout {
    fn from(config: &ArchiveConfig) -> Self {
        Self {
            manifest_name: config.manifest_name.clone(),
            images_dir: config.images_dir.clone(),
        }
    }
}

impl ArchiveLayout {
    /// In-archive path of an image.
    pub fn image_path(&self, name: &str) -> String {
        format!("{}/{}", self.images_dir, name)
    }

    /// Manifest entry plus image entries with full in-archive names.
    pub fn entries(&self, archive: AssembledArchive) -> (NamedBlob, Vec<NamedBlob>) {
        let manifest = NamedBlob {
            name: self.manifest_name.clone(),
            bytes: archive.manifest_bytes,
        };
        let images = archive
            .images
            .into_iter()
            .map(|blob| NamedBlob {
                name: self.image_path(&blob.name),
                bytes: blob.bytes,
            })
            .collect();
        (manifest, images)
    }
}

/// Serializes named blobs into one binary.
pub trait PackageWriter: Sync {
    fn write_package(&self, manifest: &NamedBlob, images: &[NamedBlob]) -> Result<Vec<u8>, PackageError>;
}

/// Writes a ZIP archive into memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipPackageWriter;

impl ZipPackageWriter {
    pub fn new() -> Self {
        Self
    }
}

impl PackageWriter for ZipPackageWriter {
    fn write_package(&self, manifest: &NamedBlob, images: &[NamedBlob]) -> Result<Vec<u8>, PackageError> {
        let mut seen = std::collections::HashSet::new();
        for entry in std::iter::once(manifest).chain(images) {
            if !seen.insert(entry.name.as_str()) {
                return Err(PackageError::DuplicateEntry(entry.name.clone()));
            }
        }

        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

        zip.start_file(manifest.name.as_str(), options)?;
        zip.write_all(&manifest.bytes)?;

        let mut dirs: Vec<&str> = images
            .iter()
            .filter_map(|blob| blob.name.rsplit_once('/').map(|(dir, _)| dir))
            .collect();
        dirs.dedup();
        for dir in dirs {
            zip.add_directory(format!("{dir}/"), options)?;
        }

        for blob in images {
            // AVIF/JPEG payloads are already compressed
            zip.start_file(
                blob.name.as_str(),
                options.compression_method(CompressionMethod::Stored),
            )?;
            zip.write_all(&blob.bytes)?;
        }

        Ok(zip.finish()?.into_inner())
    }
}

/// Upper bound on the buffer reserved from an entry's declared size. The
/// header is untrusted; larger entries still read fully, growing as needed.
const MAX_ENTRY_RESERVE: u64 = 16 * 1024 * 1024;

fn entry_reserve(declared: u64) -> usize {
    declared.min(MAX_ENTRY_RESERVE) as usize
}

/// Every file entry of a ZIP package, in archive order. Directories are skipped.
pub fn read_package(bytes: &[u8]) -> Result<Vec<NamedBlob>, PackageError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        let mut content = Vec::with_capacity(entry_reserve(file.size()));
        file.read_to_end(&mut content)?;
        entries.push(NamedBlob {
            name: file.name().to_string(),
            bytes: content,
        });
    }
    Ok(entries)
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Package writer that records what it was given and returns a marker.
    #[derive(Default)]
    pub struct RecordingWriter {
        pub fail: bool,
        pub packages: Mutex<Vec<Vec<NamedBlob>>>,
    }

    impl RecordingWriter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        /// Entry names of every package written, manifest first.
        pub fn calls(&self) -> Vec<Vec<String>> {
            self.packages
                .lock()
                .unwrap()
                .iter()
                .map(|p| p.iter().map(|b| b.name.clone()).collect())
                .collect()
        }

        /// Entries of the most recent package, manifest first.
        pub fn last_package(&self) -> Vec<NamedBlob> {
            self.packages.lock().unwrap().last().cloned().unwrap_or_default()
        }
    }

    impl PackageWriter for RecordingWriter {
        fn write_package(&self, manifest: &NamedBlob, images: &[NamedBlob]) -> Result<Vec<u8>, PackageError> {
            let entries = std::iter::once(manifest).chain(images).cloned().collect();
            self.packages.lock().unwrap().push(entries);
            if self.fail {
                return Err(PackageError::Io(std::io::Error::other("disk full")));
            }
            Ok(b"package".to_vec())
        }
    }

    fn blob(name: &str, bytes: &[u8]) -> NamedBlob {
        NamedBlob {
            name: name.into(),
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn zip_contains_manifest_and_images() {
        let manifest = blob("post.json", b"{}");
        let images = vec![
            blob("images/image_1.avif", b"one"),
            blob("images/image_2.png", b"two"),
        ];
        let bytes = ZipPackageWriter::new().write_package(&manifest, &images).unwrap();

        let entries = read_package(&bytes).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["post.json", "images/image_1.avif", "images/image_2.png"]);
        assert_eq!(entries[0].bytes, b"{}");
        assert_eq!(entries[2].bytes, b"two");
    }

    #[test]
    fn zip_rejects_duplicate_names() {
        let manifest = blob("post.json", b"{}");
        let images = vec![blob("images/a.avif", b"1"), blob("images/a.avif", b"2")];
        let err = ZipPackageWriter::new().write_package(&manifest, &images).unwrap_err();
        assert!(matches!(err, PackageError::DuplicateEntry(name) if name == "images/a.avif"));
    }

    #[test]
    fn declared_entry_size_only_caps_the_reserve() {
        assert_eq!(entry_reserve(3), 3);
        assert_eq!(entry_reserve(u64::MAX), MAX_ENTRY_RESERVE as usize);
    }

    #[test]
    fn read_package_rejects_garbage() {
        assert!(matches!(read_package(b"not a zip"), Err(PackageError::Zip(_))));
    }

    #[test]
    fn layout_prefixes_images() {
        let layout = ArchiveLayout::default();
        let archive = AssembledArchive {
            manifest: crate::archive::Manifest {
                id: "x".into(),
                map_id: "de_nuke".into(),
                title: "t".into(),
                tags: vec![],
                method: vec![],
                image_count: 1,
                images: vec!["image_1.avif".into()],
            },
            manifest_bytes: b"{}".to_vec(),
            images: vec![blob("image_1.avif", b"1")],
        };
        let (manifest, images) = layout.entries(archive);
        assert_eq!(manifest.name, "post.json");
        assert_eq!(images[0].name, "images/image_1.avif");
    }
}
