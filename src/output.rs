//! CLI output formatting.
//!
//! # Information-First Display
//!
//! Every entity (map, post, draft image) leads with a positional index and its
//! human identity; ids, paths and statuses follow as indented context lines.
//!
//! # Output Format
//!
//! ## Maps and posts
//!
//! ```text
//! 001 Dust2 (2 posts)
//!     Id: de_dust2
//!
//! 001 Xbox Smoke
//!     Id: de_dust2-iyJD37Sl
//!     Map: de_dust2
//!     Tags: T MID SMOKE
//!     Method: JUMP THROW
//!     Images: 2
//! ```
//!
//! ## Submission
//!
//! ```text
//! Validating
//! Transcoding
//!     001 mirage/x.jpg
//!         3840x2160 → 1920x1080
//!     002 fileB.png
//!         800x600 kept (encoder produced no output)
//! Assembling
//! Packaging
//! Packaged cs2-post-smoke-a-site.zip (41 KB)
//! Done
//! ```
//!
//! # Architecture
//!
//! Each display has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure: no I/O, no side effects.

use crate::catalog::MapEntry;
use crate::draft::{AddOutcome, Draft, ImageItem};
use crate::types::Post;
use crate::workflow::{SessionState, SubmitEvent, SubmitOutcome};

// ============================================================================
// Shared entity display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

fn format_size(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else {
        format!("{} KB", bytes.div_ceil(1024))
    }
}

fn state_label(state: SessionState) -> &'static str {
    match state {
        SessionState::Editing => "Editing",
        SessionState::Validating => "Validating",
        SessionState::Transcoding => "Transcoding",
        SessionState::Assembling => "Assembling",
        SessionState::Packaging => "Packaging",
        SessionState::Done => "Done",
        SessionState::Failed => "Failed",
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Maps in display order with their post counts.
pub fn format_maps(maps: &[MapEntry], posts: &[Post]) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, map) in maps.iter().enumerate() {
        let count = posts.iter().filter(|p| p.map_id == map.id).count();
        lines.push(format!(
            "{} {} ({})",
            format_index(i + 1),
            map.label,
            plural(count, "post")
        ));
        lines.push(format!("{}Id: {}", indent(1), map.id));
    }
    lines
}

pub fn print_maps(maps: &[MapEntry], posts: &[Post]) {
    for line in format_maps(maps, posts) {
        println!("{}", line);
    }
}

/// Posts with their tags; methods always in canonical order.
pub fn format_posts(posts: &[&Post]) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, post) in posts.iter().enumerate() {
        lines.push(format!("{} {}", format_index(i + 1), post.title));
        lines.push(format!("{}Id: {}", indent(1), post.id));
        lines.push(format!("{}Map: {}", indent(1), post.map_id));
        if !post.tags.is_empty() {
            lines.push(format!("{}Tags: {}", indent(1), post.tags.join(" ")));
        }
        lines.push(format!(
            "{}Method: {}",
            indent(1),
            post.sorted_method().join(" ")
        ));
        lines.push(format!("{}Images: {}", indent(1), post.images.len()));
        if let Some(tip) = post.tip.as_deref().filter(|t| !t.is_empty()) {
            lines.push(format!("{}Tip: {}", indent(1), tip));
        }
    }
    if posts.is_empty() {
        lines.push("No posts match".to_string());
    }
    lines
}

pub fn print_posts(posts: &[&Post]) {
    for line in format_posts(posts) {
        println!("{}", line);
    }
}

// ============================================================================
// Draft
// ============================================================================

/// The draft's fields and image list.
pub fn format_draft(draft: &Draft) -> Vec<String> {
    let fields = draft.fields();
    let mut lines = vec![
        format!("Title: {}", fields.title.trim()),
        format!("Map: {}", fields.map_id.as_deref().unwrap_or("-")),
        format!("Method: {}", fields.method_labels().join(" ")),
        format!("Tags: {}", fields.tags.flatten().join(" ")),
        format!(
            "Images ({}/{})",
            draft.len(),
            draft.limits().max_images
        ),
    ];
    for (i, item) in draft.images().iter().enumerate() {
        let origin = match item {
            ImageItem::Existing { .. } => "existing".to_string(),
            ImageItem::New(image) => format!("new, {}", image.preview_uri()),
        };
        lines.push(format!(
            "{}{} {} ({})",
            indent(1),
            format_index(i + 1),
            item.label(),
            origin
        ));
    }
    lines
}

pub fn print_draft(draft: &Draft) {
    for line in format_draft(draft) {
        println!("{}", line);
    }
}

/// User-facing notice for an add, if there is one.
pub fn format_add_outcome(outcome: AddOutcome, max_images: usize) -> Option<String> {
    match outcome {
        AddOutcome::Added(_) => None,
        AddOutcome::NoImagesSelected => Some("No image files selected".to_string()),
        AddOutcome::LimitReached => Some(format!("A post holds at most {max_images} images")),
        AddOutcome::PartialAdd { added, dropped } => Some(format!(
            "Only {} fit (limit {max_images}); {} not added",
            plural(added, "image"),
            plural(dropped, "image")
        )),
    }
}

// ============================================================================
// Submission
// ============================================================================

/// Format a single submission progress event as display lines.
pub fn format_submit_event(event: &SubmitEvent) -> Vec<String> {
    match event {
        SubmitEvent::StateChanged(state) => vec![state_label(*state).to_string()],
        SubmitEvent::ImageTranscoded {
            position,
            label,
            original,
            output,
            optimized,
            fallback_reason,
        } => {
            let detail = if *optimized {
                format!(
                    "{}x{} → {}x{}",
                    original.width, original.height, output.width, output.height
                )
            } else {
                format!(
                    "{}x{} kept ({})",
                    original.width,
                    original.height,
                    fallback_reason.as_deref().unwrap_or("not optimized")
                )
            };
            vec![
                format!("{}{} {}", indent(1), format_index(position + 1), label),
                format!("{}{}", indent(2), detail),
            ]
        }
        SubmitEvent::ImageDropped {
            position,
            label,
            reason,
        } => vec![
            format!("{}{} {}", indent(1), format_index(position + 1), label),
            format!("{}dropped: {}", indent(2), reason),
        ],
        SubmitEvent::Packaged { file_name, size } => {
            vec![format!("Packaged {} ({})", file_name, format_size(*size))]
        }
    }
}

/// Summary after a successful submission.
pub fn format_submit_outcome(outcome: &SubmitOutcome, written_to: &str) -> Vec<String> {
    let mut lines = vec![format!(
        "{} → {}",
        outcome.manifest.id, written_to
    )];
    for (i, name) in outcome.manifest.images.iter().enumerate() {
        lines.push(format!("{}{} {}", indent(1), format_index(i + 1), name));
    }
    for warning in &outcome.warnings {
        lines.push(format!("Warning: {}", warning));
    }
    lines
}

pub fn print_submit_outcome(outcome: &SubmitOutcome, written_to: &str) {
    for line in format_submit_outcome(outcome, written_to) {
        println!("{}", line);
    }
}
