//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the two operations every backend must
//! support: identify (read dimensions from the header) and resize (decode,
//! resample to exact dimensions, re-encode).
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), pure Rust and statically
//! linked. Tests use the recording `MockBackend` in this module.

use super::params::ResizeParams;
use thiserror::Error;

/// Failure classes a backend can report.
///
/// The split matters to callers: a [`Decode`](BackendError::Decode) failure
/// means the input is unusable, while an [`Encode`](BackendError::Encode)
/// failure leaves the original bytes perfectly valid.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Unrecognized image format")]
    UnknownFormat,
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Encode failed: {0}")]
    Encode(String),
}

impl BackendError {
    /// Whether the failure happened while reading the source image.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::UnknownFormat | Self::Decode(_))
    }
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn as_tuple(self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl From<(u32, u32)> for Dimensions {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

/// Bytes produced by an encode, tagged with their MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub mime: &'static str,
}

/// Trait for image processing backends.
///
/// `Sync` because transcodes for one submission run on rayon's pool.
pub trait ImageBackend: Sync {
    /// Get image dimensions without decoding pixel data.
    fn identify(&self, data: &[u8]) -> Result<Dimensions, BackendError>;

    /// Decode `params.source`, resize to exactly `width`×`height`, encode.
    fn resize(&self, params: &ResizeParams<'_>) -> Result<EncodedImage, BackendError>;
}
