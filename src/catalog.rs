//! Read-only catalog of maps, posts and their image bytes.
//!
//! The authoring pipeline only ever reads through the [`Catalog`] trait, so a
//! session can run against a catalog directory ([`DirCatalog`]) or an
//! in-memory fixture ([`MemoryCatalog`]).
//!
//! ## Directory layout
//!
//! ```text
//! catalog/
//! ├── config.toml               # optional
//! ├── posts/
//! │   ├── ancient.json          # each file: JSON array of posts
//! │   └── mirage.json
//! └── assets/
//!     ├── maps/
//!     │   ├── de_mirage.png     # one image per map; file stem = map id
//!     │   └── de_nuke.webp
//!     └── posts/
//!         └── mirage/x.jpg      # addressed by a post's `images` entries
//! ```
//!
//! Post files are read in file-name order and concatenated.

use crate::naming;
use crate::types::{Post, Side, Site, Utility};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use walkdir::WalkDir;

/// Preferred map order; maps not listed follow alphabetically.
pub const MAP_ORDER: &[&str] = &[
    "de_inferno",
    "de_anubis",
    "de_dust2",
    "de_ancient",
    "de_nuke",
    "de_overpass",
    "de_mirage",
];

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Invalid post file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Catalog root not found: {0}")]
    MissingRoot(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapEntry {
    pub id: String,
    pub label: String,
}

impl MapEntry {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            label: naming::map_label(id),
        }
    }
}

/// Read-only view of the catalog.
///
/// `Sync` because existing images are resolved from rayon workers.
pub trait Catalog: Sync {
    /// Bytes of a post image by its catalog path, if the catalog has them.
    fn resolve_existing_image_bytes(&self, path: &str) -> Option<Vec<u8>>;

    fn list_posts(&self) -> &[Post];

    /// Maps in display order.
    fn list_maps(&self) -> &[MapEntry];

    fn find_post(&self, id: &str) -> Option<&Post> {
        self.list_posts().iter().find(|p| p.id == id)
    }
}

/// Sort map entries by [`MAP_ORDER`], unknown ids after, alphabetically.
pub fn sort_maps(maps: &mut [MapEntry]) {
    maps.sort_by(|a, b| {
        let rank = |id: &str| MAP_ORDER.iter().position(|m| *m == id).unwrap_or(MAP_ORDER.len());
        rank(&a.id).cmp(&rank(&b.id)).then_with(|| a.id.cmp(&b.id))
    });
}

/// A catalog-relative path is usable only if it stays inside the catalog.
fn is_safe_relative(path: &str) -> bool {
    let path = Path::new(path);
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

// =============================================================================
// Directory catalog
// =============================================================================

/// Catalog loaded from a directory on disk. Posts and maps are read once at
/// open; image bytes are read on demand.
#[derive(Debug)]
pub struct DirCatalog {
    root: PathBuf,
    posts: Vec<Post>,
    maps: Vec<MapEntry>,
}

impl DirCatalog {
    pub fn open(root: &Path) -> Result<Self, CatalogError> {
        if !root.is_dir() {
            return Err(CatalogError::MissingRoot(root.to_path_buf()));
        }
        let posts = load_posts(&root.join("posts"))?;
        let maps = load_maps(&root.join("assets").join("maps"))?;
        Ok(Self {
            root: root.to_path_buf(),
            posts,
            maps,
        })
    }

    fn image_path(&self, path: &str) -> Option<PathBuf> {
        is_safe_relative(path).then(|| self.root.join("assets").join("posts").join(path))
    }
}

/// Files directly inside `dir`, in file-name order. A missing dir is empty.
fn files_in(dir: &Path) -> Result<Vec<PathBuf>, CatalogError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn load_posts(dir: &Path) -> Result<Vec<Post>, CatalogError> {
    let mut posts = Vec::new();
    for path in files_in(dir)? {
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let content = fs::read_to_string(&path)?;
        let batch: Vec<Post> =
            serde_json::from_str(&content).map_err(|source| CatalogError::Json {
                path: path.clone(),
                source,
            })?;
        posts.extend(batch);
    }
    Ok(posts)
}

fn load_maps(dir: &Path) -> Result<Vec<MapEntry>, CatalogError> {
    let mut maps: Vec<MapEntry> = files_in(dir)?
        .iter()
        .filter(|p| naming::content_type_for_name(&p.to_string_lossy()).starts_with("image/"))
        .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(MapEntry::new))
        .collect();
    sort_maps(&mut maps);
    maps.dedup_by(|a, b| a.id == b.id);
    Ok(maps)
}

impl Catalog for DirCatalog {
    fn resolve_existing_image_bytes(&self, path: &str) -> Option<Vec<u8>> {
        fs::read(self.image_path(path)?).ok()
    }

    fn list_posts(&self) -> &[Post] {
        &self.posts
    }

    fn list_maps(&self) -> &[MapEntry] {
        &self.maps
    }
}

// =============================================================================
// In-memory catalog
// =============================================================================

/// Catalog held entirely in memory. Records every image lookup.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    posts: Vec<Post>,
    maps: Vec<MapEntry>,
    images: BTreeMap<String, Vec<u8>>,
    lookups: Mutex<Vec<String>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_map(mut self, id: &str) -> Self {
        if !self.maps.iter().any(|m| m.id == id) {
            self.maps.push(MapEntry::new(id));
            sort_maps(&mut self.maps);
        }
        self
    }

    pub fn with_post(mut self, post: Post) -> Self {
        self.posts.push(post);
        self
    }

    pub fn with_image(mut self, path: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.images.insert(path.to_string(), bytes.into());
        self
    }

    /// Paths requested through [`Catalog::resolve_existing_image_bytes`] so far.
    pub fn lookups(&self) -> Vec<String> {
        self.lookups
            .lock()
            .map(|l| l.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl Catalog for MemoryCatalog {
    fn resolve_existing_image_bytes(&self, path: &str) -> Option<Vec<u8>> {
        match self.lookups.lock() {
            Ok(mut lookups) => lookups.push(path.to_string()),
            Err(poisoned) => poisoned.into_inner().push(path.to_string()),
        }
        if !is_safe_relative(path) {
            return None;
        }
        self.images.get(path).cloned()
    }

    fn list_posts(&self) -> &[Post] {
        &self.posts
    }

    fn list_maps(&self) -> &[MapEntry] {
        &self.maps
    }
}

// =============================================================================
// Browsing
// =============================================================================

/// Gallery filter. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostFilter {
    pub map_id: Option<String>,
    pub side: Option<Side>,
    pub site: Option<Site>,
    /// A post matches if it carries any of these.
    pub utilities: Vec<Utility>,
}

impl PostFilter {
    pub fn matches(&self, post: &Post) -> bool {
        if self.map_id.as_ref().is_some_and(|m| *m != post.map_id) {
            return false;
        }
        if self.side.is_some_and(|s| !post.has_tag(s.as_str())) {
            return false;
        }
        if self.site.as_ref().is_some_and(|s| !post.has_tag(s.as_str())) {
            return false;
        }
        self.utilities.is_empty() || self.utilities.iter().any(|u| post.has_tag(u.as_str()))
    }
}

/// Posts matching `filter`, in catalog order.
pub fn filter_posts<'a>(posts: &'a [Post], filter: &PostFilter) -> Vec<&'a Post> {
    posts.iter().filter(|p| filter.matches(p)).collect()
}
