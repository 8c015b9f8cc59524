//! Catalog configuration.
//!
//! Handles loading, validating, and merging `config.toml`. Stock defaults are
//! overridden by an optional `config.toml` in the catalog root:
//!
//! ```text
//! catalog/
//! ├── config.toml              # Overrides stock defaults
//! ├── posts/
//! └── assets/
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [images]
//! max_dimension = 1920      # Longest side after optimization
//! quality = 90              # AVIF quality (1-100)
//!
//! [posts]
//! max_images = 4            # Images per post
//! title_max_length = 24     # Characters kept by the title filter
//!
//! [archive]
//! manifest_name = "post.json"
//! images_dir = "images"
//! download_prefix = "cs2-post"
//!
//! [processing]
//! max_processes = 4         # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! Config files are sparse: override just the values you want. Unknown keys
//! are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration loaded from `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Image optimization settings.
    pub images: ImagesConfig,
    /// Post authoring limits.
    pub posts: PostsConfig,
    /// Exported archive layout.
    pub archive: ArchiveConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl AppConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.images.quality) {
            return Err(ConfigError::Validation(
                "images.quality must be 1-100".into(),
            ));
        }
        if self.images.max_dimension == 0 {
            return Err(ConfigError::Validation(
                "images.max_dimension must be non-zero".into(),
            ));
        }
        if self.posts.max_images == 0 {
            return Err(ConfigError::Validation(
                "posts.max_images must be at least 1".into(),
            ));
        }
        if self.posts.title_max_length == 0 {
            return Err(ConfigError::Validation(
                "posts.title_max_length must be at least 1".into(),
            ));
        }
        for (key, value) in [
            ("archive.manifest_name", &self.archive.manifest_name),
            ("archive.images_dir", &self.archive.images_dir),
            ("archive.download_prefix", &self.archive.download_prefix),
        ] {
            if value.trim().is_empty() || value.contains('/') || value.contains('\\') {
                return Err(ConfigError::Validation(format!(
                    "{key} must be a non-empty name without path separators"
                )));
            }
        }
        Ok(())
    }
}

/// Image optimization settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    /// Longest side, in pixels, an optimized image may have.
    pub max_dimension: u32,
    /// AVIF encoding quality (1 = worst, 100 = best).
    pub quality: u32,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            max_dimension: 1920,
            quality: 90,
        }
    }
}

/// Post authoring limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PostsConfig {
    pub max_images: usize,
    pub title_max_length: usize,
}

impl Default for PostsConfig {
    fn default() -> Self {
        Self {
            max_images: 4,
            title_max_length: 24,
        }
    }
}

/// Names used inside and for the exported archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveConfig {
    /// Manifest file name at the archive root.
    pub manifest_name: String,
    /// Folder holding the images.
    pub images_dir: String,
    /// Prefix of the suggested download file name.
    pub download_prefix: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            manifest_name: "post.json".into(),
            images_dir: "images".into(),
            download_prefix: "cs2-post".into(),
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel transcoding workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the base layer user overrides are merged on top of.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(AppConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `config.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if the directory has no `config.toml`.
pub fn load_raw_config(dir: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = dir.join("config.toml");
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto the stock defaults, then deserialize and validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<AppConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: AppConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `config.toml` in the catalog root.
pub fn load_config(root: &Path) -> Result<AppConfig, ConfigError> {
    resolve_config(load_raw_config(root)?)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Lineup Kit Configuration
# ========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Place this file at the catalog root: catalog/config.toml
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Image optimization
# ---------------------------------------------------------------------------
[images]
# Longest side in pixels after optimization. Larger images are scaled down,
# smaller ones keep their size.
max_dimension = 1920

# AVIF encoding quality (1 = worst, 100 = best).
quality = 90

# ---------------------------------------------------------------------------
# Post authoring limits
# ---------------------------------------------------------------------------
[posts]
# Maximum number of images in one post.
max_images = 4

# Titles keep letters, digits and single spaces, up to this many characters.
title_max_length = 24

# ---------------------------------------------------------------------------
# Exported archive
# ---------------------------------------------------------------------------
[archive]
# Manifest file at the archive root.
manifest_name = "post.json"

# Folder holding image_1.avif, image_2.avif, ...
images_dir = "images"

# Suggested download name: <prefix>-<title-slug>.zip
download_prefix = "cs2-post"

# ---------------------------------------------------------------------------
# Parallel processing
# ---------------------------------------------------------------------------
[processing]
# Maximum number of parallel transcoding workers.
# Omit or comment out to auto-detect (uses all CPU cores).
# Values larger than the number of cores are clamped down.
# max_processes = 4
"##
}
