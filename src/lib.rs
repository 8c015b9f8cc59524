//! # Lineup Kit
//!
//! Authoring and packaging for utility lineup posts. A post is a titled set of
//! one to four screenshots on a map, tagged with a side, a site and a utility,
//! plus the throwing methods it needs. Submitting a post normalizes every image
//! and bundles them with a JSON manifest into one downloadable archive.
//!
//! # Architecture: Edit, Then Submit
//!
//! ```text
//! Draft      catalog post / files  →  validated fields + ordered images
//! Transcode  image bytes           →  AVIF, longest side bounded (parallel)
//! Assemble   fields + images       →  post.json + image_1..image_N
//! Package    named blobs           →  ZIP archive
//! ```
//!
//! An [`workflow::AuthoringSession`] owns one draft and walks it through these
//! stages, reporting each step on a progress channel. Image decoding, the
//! catalog and the archive writer sit behind traits so the whole pipeline runs
//! in tests without touching disk.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`types`] | Tag vocabularies (`Side`, `Utility`, `Method`, `Site`), catalog `Post`, draft `PostFields` |
//! | [`draft`] | Editable draft: field setters, bounded image list, validation, preview handles |
//! | [`imaging`] | Image transcoding: decode, bounded resize, AVIF encode, keep-original fallback |
//! | [`archive`] | Manifest assembly and canonical image naming |
//! | [`package`] | ZIP writer and reader for assembled archives |
//! | [`import`] | Reads an exported archive back into draft-ready fields and files |
//! | [`catalog`] | Read-only post and map catalog: on-disk and in-memory implementations |
//! | [`workflow`] | Authoring session state machine and the submit pipeline |
//! | [`config`] | `config.toml` loading, stock defaults, validation |
//! | [`naming`] | Titles, slugs, download names, image names, post ids, extensions |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## AVIF Output With Keep-Original Fallback
//!
//! Every image is re-encoded as AVIF with its longest side bounded by
//! `images.max_dimension`. If the encoder fails or produces nothing, the
//! original bytes are kept and the archive entry takes the source's extension.
//! An image that cannot be decoded fails the submission.
//!
//! ## Pure-Rust Imaging
//!
//! The [`imaging`] module uses the `image` crate (Lanczos3 resampling, `ravif`
//! AVIF encoding) and `rav1d` for AVIF decoding. No system libraries are
//! needed, so the binary is self-contained.
//!
//! ## Tags On Axes
//!
//! The catalog stores tags as a flat label list. The draft keeps one optional
//! value per axis, so a post can never carry two sides at once; the flat form
//! is only rebuilt when the manifest is written.

pub mod archive;
pub mod catalog;
pub mod config;
pub mod draft;
pub mod imaging;
pub mod import;
pub mod naming;
pub mod output;
pub mod package;
pub mod types;
pub mod workflow;

#[cfg(test)]
pub(crate) mod test_helpers;
