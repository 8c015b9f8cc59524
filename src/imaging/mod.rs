//! Image transcoding: decode → constrain dimensions → re-encode.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::ImageReader::into_dimensions`, `avif-parse` |
//! | **Decode** | `image` decoders, `rav1d` for AVIF |
//! | **Resize → AVIF** | Lanczos3 + rav1e encoder |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: [`transcode`], combining calculations + backend with the
//!   keep-the-original fallback

pub mod backend;
mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, EncodedImage, ImageBackend};
pub use calculations::constrain_dimensions;
pub use operations::{TranscodeConfig, TranscodeError, Transcoded, transcode};
pub use params::{Quality, ResizeParams};
pub use rust_backend::{OUTPUT_MIME, RustBackend};
