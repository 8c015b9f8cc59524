//! Re-import of exported packages.
//!
//! An archive written by the workflow can be read back into a draft so the
//! post can be edited and re-exported. Images come back as new items (they
//! are not in the catalog); the manifest id, when present, is kept.

use crate::draft::CandidateFile;
use crate::naming;
use crate::package::{ArchiveLayout, PackageError, read_package};
use crate::types::{Method, PostFields, TagAxes};
use serde::Deserialize;
use std::collections::BTreeSet;
use thiserror::Error;

/// Image extensions picked up from the images folder.
pub const IMPORT_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "avif"];

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("package has no {0}")]
    MissingManifest(String),
    #[error("manifest is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("package has no images")]
    NoImages,
    #[error("invalid manifest: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Package(#[from] PackageError),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportManifest {
    id: Option<String>,
    map_id: Option<String>,
    title: Option<String>,
    tags: Option<Vec<String>>,
    method: Option<Vec<String>>,
    #[serde(default)]
    images: Vec<String>,
}

/// A package read back into draft-ready pieces.
#[derive(Debug)]
pub struct ImportedPost {
    pub id: Option<String>,
    pub fields: PostFields,
    /// Images in manifest order; unlisted files follow by name.
    pub images: Vec<CandidateFile>,
    /// Labels or files that were skipped.
    pub notices: Vec<String>,
}

/// Parse a package produced by the workflow.
pub fn import_archive(bytes: &[u8], layout: &ArchiveLayout) -> Result<ImportedPost, ImportError> {
    let entries = read_package(bytes)?;

    let manifest_entry = entries
        .iter()
        .find(|e| e.name == layout.manifest_name)
        .ok_or_else(|| ImportError::MissingManifest(layout.manifest_name.clone()))?;
    let manifest: ImportManifest = serde_json::from_slice(&manifest_entry.bytes)?;

    let map_id = manifest.map_id.ok_or(ImportError::MissingField("mapId"))?;
    let title = manifest.title.ok_or(ImportError::MissingField("title"))?;
    let tags = manifest.tags.ok_or(ImportError::MissingField("tags"))?;
    let method_labels = manifest.method.ok_or(ImportError::MissingField("method"))?;

    let (tags, ignored) = TagAxes::from_labels(&tags);
    let mut notices: Vec<String> = ignored
        .into_iter()
        .map(|label| format!("ignored label {label:?}"))
        .collect();
    let mut method = BTreeSet::new();
    for label in method_labels {
        match label.parse::<Method>() {
            Ok(m) => {
                method.insert(m);
            }
            Err(_) => notices.push(format!("ignored label {label:?}")),
        }
    }

    let prefix = format!("{}/", layout.images_dir);
    let mut images: Vec<(usize, CandidateFile)> = Vec::new();
    for entry in entries {
        let Some(name) = entry.name.strip_prefix(&prefix) else {
            continue;
        };
        if name.contains('/') {
            continue;
        }
        let supported = naming::extension_from_file_name(name)
            .is_some_and(|ext| IMPORT_EXTENSIONS.contains(&ext.as_str()));
        if !supported {
            notices.push(format!("skipped {}", entry.name));
            continue;
        }
        let rank = manifest
            .images
            .iter()
            .position(|listed| listed == name)
            .unwrap_or(usize::MAX);
        images.push((rank, CandidateFile::from_name(name, entry.bytes)));
    }
    if images.is_empty() {
        return Err(ImportError::NoImages);
    }
    images.sort_by(|(ra, a), (rb, b)| ra.cmp(rb).then_with(|| a.name.cmp(&b.name)));

    Ok(ImportedPost {
        id: manifest.id.filter(|id| !id.trim().is_empty()),
        fields: PostFields {
            title,
            map_id: Some(map_id),
            method,
            tags,
        },
        images: images.into_iter().map(|(_, file)| file).collect(),
        notices,
    })
}
