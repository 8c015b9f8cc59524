//! High-level image operations.
//!
//! These functions combine calculations with backend execution. They take
//! configuration, compute parameters, and call the backend.
//!
//! ## Failure policy
//!
//! Optimization is best-effort. Bytes that cannot be identified or decoded
//! are an error ([`TranscodeError::Decode`]); the image is unusable. An encoder
//! that fails, or that returns nothing, is not an error: the original input
//! comes back untouched with [`Transcoded::optimized`] set to `false`.

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::calculations::constrain_dimensions;
use super::params::{Quality, ResizeParams};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("image could not be decoded: {0}")]
    Decode(#[source] BackendError),
}

/// Configuration for the optimization transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TranscodeConfig {
    /// Longest side allowed in the output, in pixels.
    pub max_dimension: u32,
    pub quality: Quality,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            max_dimension: 1920,
            quality: Quality::default(),
        }
    }
}

/// Output of [`transcode`].
#[derive(Debug, Clone, PartialEq)]
pub struct Transcoded {
    pub bytes: Vec<u8>,
    /// MIME type of `bytes` when the encoder produced them. `None` when the
    /// original was kept; callers fall back to the source's declared type.
    pub mime: Option<&'static str>,
    pub original: Dimensions,
    /// Dimensions of `bytes`.
    pub output: Dimensions,
    pub optimized: bool,
    /// Why the original was kept, when it was.
    pub fallback_reason: Option<String>,
}

/// Decode, constrain to `config.max_dimension`, and re-encode one image.
pub fn transcode<B: ImageBackend + ?Sized>(
    backend: &B,
    source: &[u8],
    config: &TranscodeConfig,
) -> Result<Transcoded, TranscodeError> {
    let original = backend.identify(source).map_err(TranscodeError::Decode)?;
    let (width, height) = constrain_dimensions(original.as_tuple(), config.max_dimension);

    let kept = |reason: String| Transcoded {
        bytes: source.to_vec(),
        mime: None,
        original,
        output: original,
        optimized: false,
        fallback_reason: Some(reason),
    };

    match backend.resize(&ResizeParams {
        source,
        width,
        height,
        quality: config.quality,
    }) {
        Ok(encoded) if encoded.bytes.is_empty() => Ok(kept("encoder produced no output".into())),
        Ok(encoded) => Ok(Transcoded {
            bytes: encoded.bytes,
            mime: Some(encoded.mime),
            original,
            output: Dimensions { width, height },
            optimized: true,
            fallback_reason: None,
        }),
        Err(e) if e.is_decode() => Err(TranscodeError::Decode(e)),
        Err(e) => Ok(kept(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};

    fn config() -> TranscodeConfig {
        TranscodeConfig::default()
    }

    #[test]
    fn large_image_is_constrained_to_max_dimension() {
        let backend = MockBackend::new();
        let out = transcode(&backend, b"3840x2160", &config()).unwrap();

        assert!(out.optimized);
        assert_eq!(out.output.as_tuple(), (1920, 1080));
        assert_eq!(out.original.as_tuple(), (3840, 2160));
        assert_eq!(out.mime, Some("image/avif"));
        assert_eq!(out.bytes, b"avif:1920x1080");
    }

    #[test]
    fn small_image_keeps_dimensions_but_is_reencoded() {
        let backend = MockBackend::new();
        let out = transcode(&backend, b"800x600", &config()).unwrap();

        assert!(out.optimized);
        assert_eq!(out.output.as_tuple(), (800, 600));
        let ops = backend.get_operations();
        assert!(matches!(
            &ops[1],
            RecordedOp::Resize {
                width: 800,
                height: 600,
                quality: 90,
                ..
            }
        ));
    }

    #[test]
    fn undecodable_input_is_an_error() {
        let backend = MockBackend::new();
        let err = transcode(&backend, b"garbage", &config()).unwrap_err();
        assert!(matches!(err, TranscodeError::Decode(_)));
        // identify failed, so no resize was attempted
        assert_eq!(backend.get_operations().len(), 1);
    }

    #[test]
    fn encode_failure_falls_back_to_original_bytes() {
        let backend = MockBackend::failing_encode();
        let out = transcode(&backend, b"3840x2160", &config()).unwrap();

        assert!(!out.optimized);
        assert_eq!(out.bytes, b"3840x2160");
        assert_eq!(out.mime, None);
        assert_eq!(out.output, out.original);
        assert!(out.fallback_reason.unwrap().contains("mock encoder refused"));
    }

    #[test]
    fn empty_encoder_output_falls_back_to_original_bytes() {
        let backend = MockBackend::empty_encode();
        let out = transcode(&backend, b"100x100", &config()).unwrap();
        assert!(!out.optimized);
        assert_eq!(out.bytes, b"100x100");
    }

    #[test]
    fn custom_bound_and_quality_reach_the_backend() {
        let backend = MockBackend::new();
        let cfg = TranscodeConfig {
            max_dimension: 100,
            quality: Quality::new(70),
        };
        let out = transcode(&backend, b"400x200", &cfg).unwrap();
        assert_eq!(out.output.as_tuple(), (100, 50));
        assert!(backend
            .get_operations()
            .contains(&RecordedOp::Resize {
                source: "400x200".into(),
                width: 100,
                height: 50,
                quality: 70,
            }));
    }
}
