//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Constrain dimensions so the longer side does not exceed `max_dimension`.
///
/// Images already within the bound are returned unchanged. Larger images are
/// scaled by `max_dimension / longer_side`, and each side is rounded to the
/// nearest integer on its own, so the shorter side may land one pixel off the
/// exact ratio. Neither side is ever rounded down to zero.
///
/// # Examples
/// ```
/// # use lineup_kit::imaging::constrain_dimensions;
/// assert_eq!(constrain_dimensions((3840, 2160), 1920), (1920, 1080));
/// assert_eq!(constrain_dimensions((800, 600), 1920), (800, 600));
/// ```
pub fn constrain_dimensions(original: (u32, u32), max_dimension: u32) -> (u32, u32) {
    let (width, height) = original;
    let longer_side = width.max(height);

    if longer_side <= max_dimension {
        return (width, height);
    }

    let scale = max_dimension as f64 / longer_side as f64;
    let scaled = |side: u32| ((side as f64 * scale).round() as u32).max(1);
    (scaled(width), scaled(height))
}
