//! Naming rules for posts and their exported files.
//!
//! Everything that turns user input into a name lives here so the draft, the
//! assembler and the CLI agree on one set of rules:
//!
//! - Titles: `"Smoke #A site!!"` → `"Smoke A site"` (restricted charset, capped)
//! - Download names: `"Smoke A Site"` → `cs2-post-smoke-a-site.zip`
//! - Image names: position 0, `avif` → `image_1.avif`
//! - Post ids: `de_mirage` → `de_mirage-Xk3_a9Qz`
//! - Map labels: `de_dust2` → `Dust2`

use rand::Rng;
use std::path::Path;

/// Extension used when neither the encoded format nor the source name gives one.
pub const DEFAULT_EXTENSION: &str = "avif";

const ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";
const ID_TOKEN_LEN: usize = 8;

/// Restrict a title to letters, digits and single spaces, capped at `max_len` chars.
///
/// Leading and trailing spaces survive; validation trims.
pub fn sanitize_title(input: &str, max_len: usize) -> String {
    let mut out = String::with_capacity(input.len().min(max_len));
    for c in input.chars().filter(|c| c.is_ascii_alphanumeric() || *c == ' ') {
        if c == ' ' && out.ends_with(' ') {
            continue;
        }
        out.push(c);
    }
    out.chars().take(max_len).collect()
}

/// Lower-case slug: runs of anything outside `[a-z0-9]` become one `-`,
/// with no leading or trailing `-`.
pub fn slugify(title: &str) -> String {
    let lowered = title.trim().to_lowercase();
    let mut slug = String::with_capacity(lowered.len());
    for c in lowered.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Suggested file name for a packaged post: `<prefix>-<slug>.zip`, or
/// `<prefix>.zip` when the title has nothing slug-worthy.
pub fn download_file_name(prefix: &str, title: &str) -> String {
    let slug = slugify(title);
    if slug.is_empty() {
        format!("{prefix}.zip")
    } else {
        format!("{prefix}-{slug}.zip")
    }
}

/// Canonical archive name for the image at zero-based `position`.
pub fn image_file_name(position: usize, extension: &str) -> String {
    format!("image_{}.{}", position + 1, extension)
}

/// Extension implied by a MIME type: the subtype, minus any suffix or parameters.
///
/// `image/jpeg` → `jpeg`, `image/svg+xml` → `svg`. Returns `None` for
/// anything without a usable subtype.
pub fn extension_from_mime(mime: &str) -> Option<String> {
    let (_, subtype) = mime.split_once('/')?;
    let subtype = subtype.split([';', '+']).next()?.trim();
    if subtype.is_empty() || !subtype.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return None;
    }
    Some(subtype.to_ascii_lowercase())
}

/// Lower-cased extension of a file name, if it has one.
pub fn extension_from_file_name(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(str::to_ascii_lowercase)
}

/// Pick the archive extension for an image: encoded MIME first, then the
/// source's declared content type, then the source file name, then the default.
pub fn choose_extension(
    encoded_mime: Option<&str>,
    source_content_type: Option<&str>,
    source_name: Option<&str>,
) -> String {
    encoded_mime
        .and_then(extension_from_mime)
        .or_else(|| source_content_type.and_then(extension_from_mime))
        .or_else(|| source_name.and_then(extension_from_file_name))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

/// Content type for a file name, by extension. Unknown extensions map to
/// `application/octet-stream`, which the draft rejects as a non-image.
pub fn content_type_for_name(name: &str) -> &'static str {
    match extension_from_file_name(name).as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("avif") => "image/avif",
        Some("tif" | "tiff") => "image/tiff",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        _ => "application/octet-stream",
    }
}

/// New post id: `<map_id>-<8 random URL-safe characters>`.
pub fn generate_post_id(map_id: &str, rng: &mut impl Rng) -> String {
    let token: String = (0..ID_TOKEN_LEN)
        .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("{map_id}-{token}")
}

/// Display label for a map id: drop the `de_` prefix, capitalize each
/// `_`-separated word.
pub fn map_label(map_id: &str) -> String {
    let bare = map_id.strip_prefix("de_").unwrap_or(map_id);
    bare.split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
