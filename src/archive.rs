//! Archive assembly: transcoded images + validated fields → manifest and named blobs.
//!
//! Pure transformation, no I/O. Transcodes may finish in any order, so each
//! [`TranscodedImage`] carries the draft position it came from; assembly
//! restores that order before assigning canonical names. Whatever positions
//! survive are renumbered densely from `image_1`.

use crate::naming;
use crate::types::PostFields;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("no images to package")]
    EmptyImageSet,
    #[error("post has no map")]
    MissingMap,
    #[error("manifest serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// One image ready to be packaged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodedImage {
    /// Zero-based position in the draft at submit time.
    pub position: usize,
    pub bytes: Vec<u8>,
    /// Extension without the dot, e.g. `avif`.
    pub extension: String,
}

/// The manifest document written at the archive root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub id: String,
    pub map_id: String,
    pub title: String,
    pub tags: Vec<String>,
    pub method: Vec<String>,
    pub image_count: usize,
    pub images: Vec<String>,
}

/// A file for the package writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedBlob {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Assembled archive contents, image names relative to the images folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledArchive {
    pub manifest: Manifest,
    /// Manifest serialized as indented JSON.
    pub manifest_bytes: Vec<u8>,
    pub images: Vec<NamedBlob>,
}

/// Build the manifest and canonically named images for a post.
pub fn assemble(
    id: &str,
    fields: &PostFields,
    mut transcoded: Vec<TranscodedImage>,
) -> Result<AssembledArchive, ArchiveError> {
    if transcoded.is_empty() {
        return Err(ArchiveError::EmptyImageSet);
    }
    let map_id = fields.map_id.clone().ok_or(ArchiveError::MissingMap)?;

    // Vec::sort_by_key is stable
    transcoded.sort_by_key(|t| t.position);

    let images: Vec<NamedBlob> = transcoded
        .into_iter()
        .enumerate()
        .map(|(i, t)| NamedBlob {
            name: naming::image_file_name(i, &t.extension),
            bytes: t.bytes,
        })
        .collect();

    let manifest = Manifest {
        id: id.to_string(),
        map_id,
        title: fields.title.trim().to_string(),
        tags: fields.tags.flatten(),
        method: fields.method_labels(),
        image_count: images.len(),
        images: images.iter().map(|b| b.name.clone()).collect(),
    };
    let manifest_bytes = serde_json::to_vec_pretty(&manifest)?;

    Ok(AssembledArchive {
        manifest,
        manifest_bytes,
        images,
    })
}
