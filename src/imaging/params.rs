//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the high-level [`operations`](super::operations) module
//! (which decides the target size of an image) and the
//! [`backend`](super::backend) (which does the pixel work). Keeping them apart
//! lets tests swap in a mock backend without changing operation logic.
//!
//! ## Types
//!
//! - [`Quality`]: lossy encoding quality (1–100, default 90). Clamped on construction.
//! - [`ResizeParams`]: everything one resize needs: source bytes, target dimensions, quality.

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// Parameters for a decode → resize → encode operation.
///
/// `width` and `height` are exact output dimensions; the backend does not
/// preserve aspect ratio on its own; that is the caller's job (see
/// [`constrain_dimensions`](super::calculations::constrain_dimensions)).
#[derive(Debug, Clone, PartialEq)]
pub struct ResizeParams<'a> {
    pub source: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub quality: Quality,
}
