//! Shared test utilities.
//!
//! Synthetic images are encoded in memory with the `image` crate so tests
//! never depend on fixture files. Draft and post fixtures use mock image
//! sources (`b"<width>x<height>"`) understood by `MockBackend`.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};

use crate::draft::{CandidateFile, Draft, DraftLimits, PreviewStore};
use crate::types::{Method, Post, Side, Utility};

// =========================================================================
// Synthetic images
// =========================================================================

fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), format).unwrap();
    out
}

/// A gradient PNG with an alpha channel.
pub fn synthetic_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, 128, 200])
    });
    encode(DynamicImage::ImageRgba8(img), ImageFormat::Png)
}

/// A gradient JPEG.
pub fn synthetic_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, 64, (y % 256) as u8])
    });
    encode(DynamicImage::ImageRgb8(img), ImageFormat::Jpeg)
}

// =========================================================================
// Draft and post fixtures
// =========================================================================

/// A PNG candidate whose bytes are the mock source `800x600`.
pub fn candidate(name: &str) -> CandidateFile {
    CandidateFile::from_name(name, b"800x600".to_vec())
}

/// A candidate with explicit bytes.
pub fn candidate_with(name: &str, bytes: &[u8]) -> CandidateFile {
    CandidateFile::from_name(name, bytes.to_vec())
}

/// A catalog post with the given tags and two mirage-style images.
pub fn sample_post(id: &str, map_id: &str, tags: &[&str]) -> Post {
    Post {
        id: id.to_string(),
        map_id: map_id.to_string(),
        title: format!("Post {id}"),
        images: vec![format!("{id}/1.png"), format!("{id}/2.png")],
        tags: tags.iter().map(|t| t.to_string()).collect(),
        method: vec!["THROW".to_string()],
        tip: None,
    }
}

/// A valid draft: "Smoke A Site" on de_mirage, THROW+JUMP, T/A/SMOKE, with
/// the given existing paths followed by new images named `new`.
pub fn filled_draft(existing: &[&str], new: &[&str]) -> (Draft, PreviewStore) {
    let store = PreviewStore::new();
    let post = Post {
        id: "unused".to_string(),
        map_id: "de_mirage".to_string(),
        title: "Smoke A Site".to_string(),
        images: existing.iter().map(|p| p.to_string()).collect(),
        tags: vec![],
        method: vec![],
        tip: None,
    };
    let (mut draft, _) = Draft::from_post(&post, DraftLimits::default(), store.clone());
    draft.set_methods([Method::Throw, Method::Jump]);
    draft.set_side(Some(Side::T));
    draft.set_site(Some("A".parse().unwrap()));
    draft.set_utility(Some(Utility::Smoke));
    if !new.is_empty() {
        draft.add_images(new.iter().map(|n| candidate(n)).collect());
    }
    (draft, store)
}
