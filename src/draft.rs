//! Editable post draft.
//!
//! A [`Draft`] is the in-memory authoring state for one post: the shared
//! [`PostFields`] plus an ordered list of [`ImageItem`]s. Images are either
//! *existing* (a catalog path, bytes fetched at submit time) or *new*
//! (user-supplied bytes plus a preview handle).
//!
//! The image count never exceeds the configured maximum. Preview handles are
//! owned by their item and released when it is dropped, so removing an item
//! or dropping the whole draft needs no extra bookkeeping from callers.

use crate::config::PostsConfig;
use crate::naming;
use crate::types::{Method, Post, PostFields, Side, Site, Utility};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

// =============================================================================
// Preview handles
// =============================================================================

#[derive(Debug, Default)]
struct PreviewRegistry {
    next_id: u64,
    live: BTreeMap<u64, String>,
}

/// Issues display-only handles for new images and tracks which are outstanding.
///
/// Cloning is cheap; clones share one registry.
#[derive(Debug, Clone, Default)]
pub struct PreviewStore {
    registry: Arc<Mutex<PreviewRegistry>>,
}

fn lock(registry: &Mutex<PreviewRegistry>) -> MutexGuard<'_, PreviewRegistry> {
    // The registry holds plain data; a panic elsewhere cannot leave it half-updated.
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl PreviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a preview for `label` (usually the source file name).
    pub fn create(&self, label: &str) -> PreviewHandle {
        let mut registry = lock(&self.registry);
        registry.next_id += 1;
        let id = registry.next_id;
        registry.live.insert(id, label.to_string());
        PreviewHandle {
            id,
            registry: Arc::clone(&self.registry),
        }
    }

    /// Number of handles not yet released.
    pub fn live(&self) -> usize {
        lock(&self.registry).live.len()
    }

    pub fn is_live(&self, uri: &str) -> bool {
        uri.strip_prefix("preview:")
            .and_then(|n| n.parse::<u64>().ok())
            .is_some_and(|id| lock(&self.registry).live.contains_key(&id))
    }
}

/// A live preview. Released when dropped.
pub struct PreviewHandle {
    id: u64,
    registry: Arc<Mutex<PreviewRegistry>>,
}

impl PreviewHandle {
    pub fn uri(&self) -> String {
        format!("preview:{}", self.id)
    }
}

impl fmt::Debug for PreviewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PreviewHandle").field(&self.uri()).finish()
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        lock(&self.registry).live.remove(&self.id);
    }
}

// =============================================================================
// Images
// =============================================================================

/// A file offered to [`Draft::add_images`].
#[derive(Debug, Clone)]
pub struct CandidateFile {
    pub name: String,
    /// Declared MIME type; only `image/*` is accepted.
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl CandidateFile {
    /// Candidate whose content type is derived from the file name's extension.
    pub fn from_name(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        let content_type = naming::content_type_for_name(&name).to_string();
        Self {
            name,
            content_type,
            bytes,
        }
    }

    fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }
}

/// A user-supplied image held by the draft.
#[derive(Debug)]
pub struct NewImage {
    /// Draft-local identifier, unique within one draft.
    pub local_id: u64,
    pub name: String,
    pub content_type: String,
    pub bytes: Arc<[u8]>,
    preview: PreviewHandle,
}

impl NewImage {
    pub fn preview_uri(&self) -> String {
        self.preview.uri()
    }
}

#[derive(Debug)]
pub enum ImageItem {
    /// Already in the catalog; bytes resolved by path at submit time.
    Existing { path: String },
    New(NewImage),
}

impl ImageItem {
    /// Path for existing images, file name for new ones.
    pub fn label(&self) -> &str {
        match self {
            ImageItem::Existing { path } => path,
            ImageItem::New(image) => &image.name,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, ImageItem::New(_))
    }
}

/// Result of [`Draft::add_images`]. None of these are errors; they are
/// user-facing notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// Every candidate image was appended.
    Added(usize),
    /// No candidate had an image content type.
    NoImagesSelected,
    /// The draft was already full; nothing changed.
    LimitReached,
    /// Only `added` images fit; `dropped` were discarded.
    PartialAdd { added: usize, dropped: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    /// Toward index 0.
    Up,
    /// Toward the last index.
    Down,
}

// =============================================================================
// Validation
// =============================================================================

/// First rule a draft fails, checked in declaration order.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("title is required")]
    EmptyTitle,
    #[error("select a map")]
    NoMap,
    #[error("select at least one method")]
    NoMethod,
    #[error("select a side, site or utility tag")]
    NoTags,
    #[error("add at least one image")]
    NoImages,
}

// =============================================================================
// Draft
// =============================================================================

/// Limits a draft enforces on edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DraftLimits {
    pub max_images: usize,
    pub title_max_length: usize,
}

impl Default for DraftLimits {
    fn default() -> Self {
        (&PostsConfig::default()).into()
    }
}

impl From<&PostsConfig> for DraftLimits {
    fn from(config: &PostsConfig) -> Self {
        Self {
            max_images: config.max_images,
            title_max_length: config.title_max_length,
        }
    }
}

#[derive(Debug)]
pub struct Draft {
    fields: PostFields,
    images: Vec<ImageItem>,
    limits: DraftLimits,
    previews: PreviewStore,
    next_local_id: u64,
}

impl Draft {
    /// Empty draft for a new post.
    pub fn new(limits: DraftLimits, previews: PreviewStore) -> Self {
        Self {
            fields: PostFields::default(),
            images: Vec::new(),
            limits,
            previews,
            next_local_id: 0,
        }
    }

    /// Draft pre-populated from a catalog post, all images as existing items.
    ///
    /// Returns notices for anything that could not be carried over: labels
    /// outside the tag vocabulary and images beyond the limit.
    pub fn from_post(post: &Post, limits: DraftLimits, previews: PreviewStore) -> (Self, Vec<String>) {
        let mut draft = Self::new(limits, previews);
        let (fields, ignored) = PostFields::from_post(post);
        let mut notices: Vec<String> = ignored
            .into_iter()
            .map(|label| format!("ignored label {label:?}"))
            .collect();

        draft.fields = fields;
        draft.set_title(&post.title);
        let map_id = draft.fields.map_id.take();
        draft.set_map(map_id);
        for path in &post.images {
            if draft.images.len() >= limits.max_images {
                notices.push(format!("ignored image {path:?} (limit {})", limits.max_images));
                continue;
            }
            draft.images.push(ImageItem::Existing { path: path.clone() });
        }
        (draft, notices)
    }

    pub fn fields(&self) -> &PostFields {
        &self.fields
    }

    pub fn images(&self) -> &[ImageItem] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn limits(&self) -> DraftLimits {
        self.limits
    }

    // -------------------------------------------------------------------------
    // Field edits
    // -------------------------------------------------------------------------

    /// Set the title through the title filter.
    pub fn set_title(&mut self, title: &str) {
        self.fields.title = naming::sanitize_title(title, self.limits.title_max_length);
    }

    pub fn set_map(&mut self, map_id: Option<String>) {
        self.fields.map_id = map_id.filter(|m| !m.trim().is_empty());
    }

    /// Flip one method; returns whether it is now selected.
    pub fn toggle_method(&mut self, method: Method) -> bool {
        if self.fields.method.remove(&method) {
            false
        } else {
            self.fields.method.insert(method);
            true
        }
    }

    pub fn set_methods(&mut self, methods: impl IntoIterator<Item = Method>) {
        self.fields.method = methods.into_iter().collect();
    }

    pub fn set_side(&mut self, side: Option<Side>) {
        self.fields.tags.side = side;
    }

    pub fn set_site(&mut self, site: Option<Site>) {
        self.fields.tags.site = site;
    }

    pub fn set_utility(&mut self, utility: Option<Utility>) {
        self.fields.tags.utility = utility;
    }

    // -------------------------------------------------------------------------
    // Image edits
    // -------------------------------------------------------------------------

    /// Append image candidates as new items, up to the limit.
    pub fn add_images(&mut self, candidates: Vec<CandidateFile>) -> AddOutcome {
        let images: Vec<CandidateFile> = candidates.into_iter().filter(|c| c.is_image()).collect();
        if images.is_empty() {
            return AddOutcome::NoImagesSelected;
        }
        let remaining = self.limits.max_images.saturating_sub(self.images.len());
        if remaining == 0 {
            return AddOutcome::LimitReached;
        }

        let offered = images.len();
        for candidate in images.into_iter().take(remaining) {
            self.next_local_id += 1;
            let preview = self.previews.create(&candidate.name);
            self.images.push(ImageItem::New(NewImage {
                local_id: self.next_local_id,
                name: candidate.name,
                content_type: candidate.content_type,
                bytes: candidate.bytes.into(),
                preview,
            }));
        }

        if offered > remaining {
            AddOutcome::PartialAdd {
                added: remaining,
                dropped: offered - remaining,
            }
        } else {
            AddOutcome::Added(offered)
        }
    }

    /// Remove the image at `index`, releasing its preview. Returns false if
    /// `index` is out of range.
    pub fn remove_image(&mut self, index: usize) -> bool {
        if index >= self.images.len() {
            return false;
        }
        drop(self.images.remove(index));
        true
    }

    /// Swap the image at `index` with its neighbor. Returns false (and leaves
    /// the draft unchanged) if there is no neighbor in that direction.
    pub fn move_image(&mut self, index: usize, direction: MoveDirection) -> bool {
        let neighbor = match direction {
            MoveDirection::Up => index.checked_sub(1),
            MoveDirection::Down => index.checked_add(1),
        };
        match neighbor {
            Some(n) if index < self.images.len() && n < self.images.len() => {
                self.images.swap(index, n);
                true
            }
            _ => false,
        }
    }

    /// Move the image at `from` so that it ends up at `to`. Returns false if
    /// either index is out of range or they are equal.
    pub fn reorder_image(&mut self, from: usize, to: usize) -> bool {
        let len = self.images.len();
        if from >= len || to >= len || from == to {
            return false;
        }
        let item = self.images.remove(from);
        self.images.insert(to, item);
        true
    }

    /// Check the draft can be submitted. Rules run in order; the first failure wins.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.fields.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        if self.fields.map_id.is_none() {
            return Err(ValidationError::NoMap);
        }
        if self.fields.method.is_empty() {
            return Err(ValidationError::NoMethod);
        }
        if self.fields.tags.is_empty() {
            return Err(ValidationError::NoTags);
        }
        if self.images.is_empty() {
            return Err(ValidationError::NoImages);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{candidate, filled_draft};

    fn labels(draft: &Draft) -> Vec<&str> {
        draft.images().iter().map(ImageItem::label).collect()
    }

    fn draft_with(n: usize) -> (Draft, PreviewStore) {
        let store = PreviewStore::new();
        let mut draft = Draft::new(DraftLimits::default(), store.clone());
        let files = (1..=n).map(|i| candidate(&format!("{i}.png"))).collect();
        draft.add_images(files);
        (draft, store)
    }

    // =========================================================================
    // add_images
    // =========================================================================

    #[test]
    fn add_filters_non_images() {
        let (mut draft, _) = draft_with(0);
        let outcome = draft.add_images(vec![
            CandidateFile::from_name("notes.txt", b"hi".to_vec()),
            candidate("a.png"),
        ]);
        assert_eq!(outcome, AddOutcome::Added(1));
        assert_eq!(labels(&draft), ["a.png"]);
    }

    #[test]
    fn add_with_no_images_signals() {
        let (mut draft, store) = draft_with(0);
        let outcome = draft.add_images(vec![CandidateFile::from_name("a.txt", vec![])]);
        assert_eq!(outcome, AddOutcome::NoImagesSelected);
        assert!(draft.is_empty());
        assert_eq!(store.live(), 0);
    }

    #[test]
    fn add_six_to_empty_draft_keeps_four() {
        let (draft, store) = draft_with(6);
        assert_eq!(draft.len(), 4);
        assert_eq!(labels(&draft), ["1.png", "2.png", "3.png", "4.png"]);
        assert_eq!(store.live(), 4);

        let (mut draft, _) = draft_with(0);
        let files = (1..=6).map(|i| candidate(&format!("{i}.png"))).collect();
        assert_eq!(
            draft.add_images(files),
            AddOutcome::PartialAdd {
                added: 4,
                dropped: 2
            }
        );
    }

    #[test]
    fn add_to_full_draft_changes_nothing() {
        let (mut draft, store) = draft_with(4);
        let outcome = draft.add_images(vec![candidate("5.png")]);
        assert_eq!(outcome, AddOutcome::LimitReached);
        assert_eq!(draft.len(), 4);
        assert_eq!(store.live(), 4);
    }

    #[test]
    fn new_items_get_distinct_ids_and_previews() {
        let (draft, store) = draft_with(2);
        let ids: Vec<_> = draft
            .images()
            .iter()
            .map(|item| match item {
                ImageItem::New(img) => (img.local_id, img.preview_uri()),
                ImageItem::Existing { .. } => panic!("expected new image"),
            })
            .collect();
        assert_ne!(ids[0].0, ids[1].0);
        assert_ne!(ids[0].1, ids[1].1);
        assert!(store.is_live(&ids[0].1));
    }

    // =========================================================================
    // remove / move / reorder
    // =========================================================================

    #[test]
    fn remove_releases_preview() {
        let (mut draft, store) = draft_with(3);
        let uri = match &draft.images()[1] {
            ImageItem::New(img) => img.preview_uri(),
            ImageItem::Existing { .. } => unreachable!(),
        };
        assert!(draft.remove_image(1));
        assert!(!store.is_live(&uri));
        assert_eq!(store.live(), 2);
        assert_eq!(labels(&draft), ["1.png", "3.png"]);
    }

    #[test]
    fn remove_out_of_range_is_noop() {
        let (mut draft, _) = draft_with(2);
        assert!(!draft.remove_image(2));
        assert_eq!(draft.len(), 2);
    }

    #[test]
    fn dropping_draft_releases_all_previews() {
        let (draft, store) = draft_with(3);
        assert_eq!(store.live(), 3);
        drop(draft);
        assert_eq!(store.live(), 0);
    }

    #[test]
    fn move_swaps_with_neighbor() {
        let (mut draft, _) = draft_with(3);
        assert!(draft.move_image(0, MoveDirection::Down));
        assert_eq!(labels(&draft), ["2.png", "1.png", "3.png"]);
        assert!(draft.move_image(2, MoveDirection::Up));
        assert_eq!(labels(&draft), ["2.png", "3.png", "1.png"]);
    }

    #[test]
    fn move_past_either_end_is_noop() {
        let (mut draft, _) = draft_with(3);
        assert!(!draft.move_image(0, MoveDirection::Up));
        assert!(!draft.move_image(2, MoveDirection::Down));
        assert!(!draft.move_image(7, MoveDirection::Up));
        assert_eq!(labels(&draft), ["1.png", "2.png", "3.png"]);
    }

    #[test]
    fn reorder_is_positional_move() {
        let (mut draft, _) = draft_with(4);
        assert!(draft.reorder_image(0, 2));
        assert_eq!(labels(&draft), ["2.png", "3.png", "1.png", "4.png"]);
    }

    #[test]
    fn reorder_there_and_back_restores_order() {
        for i in 0..4 {
            for j in 0..4 {
                if i == j {
                    continue;
                }
                let (mut draft, _) = draft_with(4);
                let before: Vec<String> = labels(&draft).iter().map(|s| s.to_string()).collect();
                assert!(draft.reorder_image(i, j));
                assert!(draft.reorder_image(j, i));
                assert_eq!(labels(&draft), before, "reorder({i},{j}) then ({j},{i})");
            }
        }
    }

    #[test]
    fn reorder_invalid_is_noop() {
        let (mut draft, _) = draft_with(3);
        assert!(!draft.reorder_image(1, 1));
        assert!(!draft.reorder_image(0, 3));
        assert!(!draft.reorder_image(5, 0));
        assert_eq!(labels(&draft), ["1.png", "2.png", "3.png"]);
    }

    // =========================================================================
    // Fields and validation
    // =========================================================================

    #[test]
    fn title_goes_through_filter() {
        let (mut draft, _) = draft_with(0);
        draft.set_title("Smoke @ A-site, quick!!");
        assert_eq!(draft.fields().title, "Smoke Asite quick");
    }

    #[test]
    fn toggle_method_flips() {
        let (mut draft, _) = draft_with(0);
        assert!(draft.toggle_method(Method::Run));
        assert!(draft.toggle_method(Method::Throw));
        assert!(!draft.toggle_method(Method::Run));
        assert_eq!(draft.fields().method_labels(), ["THROW"]);
    }

    #[test]
    fn validation_rules_run_in_order() {
        let store = PreviewStore::new();
        let mut draft = Draft::new(DraftLimits::default(), store);
        assert_eq!(draft.validate(), Err(ValidationError::EmptyTitle));
        draft.set_title("   ");
        assert_eq!(draft.validate(), Err(ValidationError::EmptyTitle));
        draft.set_title("Smoke A");
        assert_eq!(draft.validate(), Err(ValidationError::NoMap));
        draft.set_map(Some("de_mirage".into()));
        assert_eq!(draft.validate(), Err(ValidationError::NoMethod));
        draft.toggle_method(Method::Throw);
        assert_eq!(draft.validate(), Err(ValidationError::NoTags));
        draft.set_site(Some("A".parse().unwrap()));
        assert_eq!(draft.validate(), Err(ValidationError::NoImages));
        draft.add_images(vec![candidate("a.png")]);
        assert_eq!(draft.validate(), Ok(()));
    }

    #[test]
    fn filled_draft_is_valid() {
        let (draft, _) = filled_draft(&["mirage/x.jpg"], &["b.png"]);
        assert!(draft.validate().is_ok());
        assert_eq!(labels(&draft), ["mirage/x.jpg", "b.png"]);
    }

    #[test]
    fn from_post_copies_fields_and_existing_images() {
        let post = Post {
            id: "de_nuke-abc".into(),
            map_id: "de_nuke".into(),
            title: "Outside Smoke".into(),
            images: vec!["nuke/1.png".into(), "nuke/2.png".into()],
            tags: vec!["CT".into(), "A".into(), "SMOKE".into()],
            method: vec!["RUN".into(), "THROW".into()],
            tip: None,
        };
        let (draft, notices) = Draft::from_post(&post, DraftLimits::default(), PreviewStore::new());
        assert!(notices.is_empty());
        assert_eq!(draft.fields().map_id.as_deref(), Some("de_nuke"));
        assert_eq!(draft.fields().method_labels(), ["THROW", "RUN"]);
        assert_eq!(labels(&draft), ["nuke/1.png", "nuke/2.png"]);
        assert!(draft.images().iter().all(|i| !i.is_new()));
    }

    #[test]
    fn from_post_enforces_image_limit() {
        let post = Post {
            id: "legacy".into(),
            map_id: "de_nuke".into(),
            title: "Many".into(),
            images: (1..=5).map(|i| format!("nuke/{i}.png")).collect(),
            tags: vec!["T".into()],
            method: vec!["THROW".into()],
            tip: None,
        };
        let (draft, notices) = Draft::from_post(&post, DraftLimits::default(), PreviewStore::new());
        assert_eq!(draft.len(), 4);
        assert_eq!(notices.len(), 1);
        assert!(notices[0].contains("nuke/5.png"));
    }

    #[test]
    fn from_post_with_blank_map_needs_a_map() {
        let post = Post {
            id: "legacy".into(),
            map_id: "  ".into(),
            title: "No Map".into(),
            images: vec!["nuke/1.png".into()],
            tags: vec!["T".into()],
            method: vec!["THROW".into()],
            tip: None,
        };
        let (mut draft, _) = Draft::from_post(&post, DraftLimits::default(), PreviewStore::new());
        assert_eq!(draft.fields().map_id, None);
        assert_eq!(draft.validate(), Err(ValidationError::NoMap));

        draft.set_map(Some("de_nuke".into()));
        assert_eq!(draft.validate(), Ok(()));
    }
}
