//! Pure Rust image processing backend.
//!
//! Everything is statically linked into the binary and works on in-memory
//! byte slices; nothing touches the filesystem.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Sniff format | `image::guess_format` + ISO-BMFF `ftyp` brand check for AVIF |
//! | Decode (JPEG, PNG, TIFF, WebP) | `image::ImageReader` with dimension limits |
//! | Decode (AVIF) | `avif-parse` (container) + `rav1d` (AV1 decode) + BT.601 YUV→RGB |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` |
//! | Encode → AVIF | `image::codecs::avif::AvifEncoder` (rav1e, speed 6) |

use super::backend::{BackendError, Dimensions, EncodedImage, ImageBackend};
use super::params::ResizeParams;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader, Limits};
use std::borrow::Cow;
use std::io::Cursor;
use std::ops::{Deref, DerefMut};

/// MIME type of everything this backend encodes.
pub const OUTPUT_MIME: &str = "image/avif";

/// Largest accepted side; guards against decompression bombs.
const MAX_DECODE_DIMENSION: u32 = 16384;

/// AVIF encoder speed (1 = slowest/best, 10 = fastest).
const AVIF_SPEED: u8 = 6;

/// Formats decoded through the `image` crate.
///
/// AVIF is not listed: the `"avif"` feature only enables the encoder, and
/// `ImageFormat::reading_enabled()` wrongly reports it as readable. AVIF
/// input is routed to [`decode_avif`] instead.
const DECODABLE: &[ImageFormat] = &[
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Tiff,
    ImageFormat::WebP,
];

/// Detected container of an input blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceFormat {
    Raster(ImageFormat),
    Avif,
}

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// ISO-BMFF `ftyp` box with an `avif`/`avis` major or compatible brand.
fn is_avif(data: &[u8]) -> bool {
    if data.len() < 16 || &data[4..8] != b"ftyp" {
        return false;
    }
    let box_len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    let end = box_len.clamp(16, data.len());
    // major brand at 8..12, minor version at 12..16, compatible brands after
    std::iter::once(&data[8..12])
        .chain(data[16..end].chunks_exact(4))
        .any(|brand| brand == b"avif" || brand == b"avis")
}

fn sniff(data: &[u8]) -> Result<SourceFormat, BackendError> {
    if is_avif(data) {
        return Ok(SourceFormat::Avif);
    }
    match image::guess_format(data) {
        Ok(format) if DECODABLE.contains(&format) && format.reading_enabled() => {
            Ok(SourceFormat::Raster(format))
        }
        _ => Err(BackendError::UnknownFormat),
    }
}

fn reader(data: &[u8], format: ImageFormat) -> ImageReader<Cursor<&[u8]>> {
    let mut reader = ImageReader::with_format(Cursor::new(data), format);
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_DECODE_DIMENSION);
    limits.max_image_height = Some(MAX_DECODE_DIMENSION);
    reader.limits(limits);
    reader
}

/// Decode an in-memory image into a pixel surface.
fn load_image(data: &[u8]) -> Result<DynamicImage, BackendError> {
    match sniff(data)? {
        SourceFormat::Avif => decode_avif(data, MAX_DECODE_DIMENSION),
        SourceFormat::Raster(format) => reader(data, format)
            .decode()
            .map_err(|e| BackendError::Decode(format!("{format:?}: {e}"))),
    }
}

/// Reject sources with a side longer than `max_side`.
fn check_decode_limit(dims: Dimensions, max_side: u32) -> Result<Dimensions, BackendError> {
    if dims.width > max_side || dims.height > max_side {
        return Err(BackendError::Decode(format!(
            "{}x{} exceeds the {max_side} px decode limit",
            dims.width, dims.height
        )));
    }
    Ok(dims)
}

/// Extract dimensions from an AVIF container (no AV1 decode needed).
fn identify_avif(data: &[u8], max_side: u32) -> Result<Dimensions, BackendError> {
    let avif = avif_parse::read_avif(&mut Cursor::new(data))
        .map_err(|e| BackendError::Decode(format!("AVIF container: {e:?}")))?;
    avif_frame_size(&avif, max_side)
}

/// Frame size from the AV1 sequence header, checked against `max_side`.
fn avif_frame_size(avif: &avif_parse::AvifData, max_side: u32) -> Result<Dimensions, BackendError> {
    let meta = avif
        .primary_item_metadata()
        .map_err(|e| BackendError::Decode(format!("AVIF metadata: {e:?}")))?;
    check_decode_limit(
        Dimensions {
            width: meta.max_frame_width.get(),
            height: meta.max_frame_height.get(),
        },
        max_side,
    )
}

/// Owns a raw decoder resource and runs its release function on drop.
///
/// rav1d exposes dav1d's C-style API, where contexts and pictures must be
/// closed/unreferenced by hand. Wrapping them here makes every early return
/// in [`decode_avif`] release what was acquired so far.
struct Released<T, F: FnMut(&mut T)> {
    value: T,
    release: F,
}

impl<T, F: FnMut(&mut T)> Released<T, F> {
    fn new(value: T, release: F) -> Self {
        Self { value, release }
    }
}

impl<T, F: FnMut(&mut T)> Deref for Released<T, F> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T, F: FnMut(&mut T)> DerefMut for Released<T, F> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T, F: FnMut(&mut T)> Drop for Released<T, F> {
    fn drop(&mut self) {
        (self.release)(&mut self.value);
    }
}

/// Decode an AVIF blob using avif-parse (container) + rav1d (AV1 payload).
///
/// Frames with a side longer than `max_side` are rejected before and after
/// the AV1 decode.
fn decode_avif(data: &[u8], max_side: u32) -> Result<DynamicImage, BackendError> {
    use rav1d::include::dav1d::data::Dav1dData;
    use rav1d::include::dav1d::dav1d::Dav1dSettings;
    use rav1d::include::dav1d::headers::{
        DAV1D_PIXEL_LAYOUT_I400, DAV1D_PIXEL_LAYOUT_I420, DAV1D_PIXEL_LAYOUT_I422,
        DAV1D_PIXEL_LAYOUT_I444,
    };
    use rav1d::include::dav1d::picture::Dav1dPicture;
    use rav1d::src::lib as dav1d;
    use std::ptr::NonNull;

    let avif = avif_parse::read_avif(&mut Cursor::new(data))
        .map_err(|e| BackendError::Decode(format!("AVIF container: {e:?}")))?;
    avif_frame_size(&avif, max_side)?;
    let av1_bytes: &[u8] = &avif.primary_item;

    let mut settings = std::mem::MaybeUninit::<Dav1dSettings>::uninit();
    unsafe { dav1d::dav1d_default_settings(NonNull::from(&mut settings).cast()) };
    let mut settings = unsafe { settings.assume_init() };
    settings.n_threads = 1;
    settings.max_frame_delay = 1;

    let mut raw_ctx = None;
    let rc = unsafe { dav1d::dav1d_open(NonNull::new(&mut raw_ctx), NonNull::new(&mut settings)) };
    if rc.0 != 0 {
        return Err(BackendError::Decode(format!("rav1d open failed ({})", rc.0)));
    }
    let ctx = Released::new(raw_ctx, |c| unsafe {
        dav1d::dav1d_close(NonNull::new(c));
    });

    let mut input = Dav1dData::default();
    let buf = unsafe { dav1d::dav1d_data_create(NonNull::new(&mut input), av1_bytes.len()) };
    if buf.is_null() {
        return Err(BackendError::Decode("rav1d data_create failed".into()));
    }
    unsafe { std::ptr::copy_nonoverlapping(av1_bytes.as_ptr(), buf, av1_bytes.len()) };

    let rc = unsafe { dav1d::dav1d_send_data(*ctx, NonNull::new(&mut input)) };
    if rc.0 != 0 {
        unsafe { dav1d::dav1d_data_unref(NonNull::new(&mut input)) };
        return Err(BackendError::Decode(format!("rav1d send_data failed ({})", rc.0)));
    }

    let raw_pic: Dav1dPicture = unsafe { std::mem::zeroed() };
    let mut pic = Released::new(raw_pic, |p| unsafe {
        dav1d::dav1d_picture_unref(NonNull::new(p));
    });
    let rc = unsafe { dav1d::dav1d_get_picture(*ctx, NonNull::new(&mut *pic)) };
    if rc.0 != 0 {
        return Err(BackendError::Decode(format!("rav1d get_picture failed ({})", rc.0)));
    }
    check_decode_limit(
        Dimensions {
            width: pic.p.w.max(0) as u32,
            height: pic.p.h.max(0) as u32,
        },
        max_side,
    )?;

    let plane = |i: usize| {
        pic.data[i]
            .map(|p| p.as_ptr() as *const u8)
            .ok_or_else(|| BackendError::Decode(format!("AVIF plane {i} missing")))
    };

    let layout = pic.p.layout;
    let y_ptr = plane(0)?;
    let (u_ptr, v_ptr, ss_x, ss_y, monochrome) = match layout {
        DAV1D_PIXEL_LAYOUT_I400 => (y_ptr, y_ptr, false, false, true),
        DAV1D_PIXEL_LAYOUT_I420 => (plane(1)?, plane(2)?, true, true, false),
        DAV1D_PIXEL_LAYOUT_I422 => (plane(1)?, plane(2)?, true, false, false),
        DAV1D_PIXEL_LAYOUT_I444 => (plane(1)?, plane(2)?, false, false, false),
        other => {
            return Err(BackendError::Decode(format!(
                "unsupported AVIF pixel layout: {other}"
            )));
        }
    };

    let planes = YuvPlanes {
        y_ptr,
        u_ptr,
        v_ptr,
        y_stride: pic.stride[0],
        uv_stride: if monochrome { 0 } else { pic.stride[1] },
        width: pic.p.w as u32,
        height: pic.p.h as u32,
        bpc: pic.p.bpc as u32,
        ss_x,
        ss_y,
        monochrome,
    };
    let (width, height) = (planes.width, planes.height);
    let rgb = planes.to_rgb();

    // Pixels are copied out; release the picture before the context.
    drop(pic);
    drop(ctx);

    image::RgbImage::from_raw(width, height, rgb)
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| BackendError::Decode("decoded AVIF buffer has wrong size".into()))
}

/// Decoded YUV plane data from rav1d, ready for RGB conversion.
///
/// Pointers are only valid while the owning picture is alive.
struct YuvPlanes {
    y_ptr: *const u8,
    u_ptr: *const u8,
    v_ptr: *const u8,
    y_stride: isize,
    uv_stride: isize,
    width: u32,
    height: u32,
    bpc: u32,
    /// Chroma subsampling: horizontal, vertical (e.g. I420 = true, true)
    ss_x: bool,
    ss_y: bool,
    monochrome: bool,
}

impl YuvPlanes {
    /// Convert YUV planes to interleaved RGB8 using BT.601 coefficients.
    fn to_rgb(&self) -> Vec<u8> {
        let max_val = ((1u32 << self.bpc) - 1) as f32;
        let center = (1u32 << (self.bpc - 1)) as f32;
        let scale = 255.0 / max_val;

        let mut rgb = Vec::with_capacity(self.width as usize * self.height as usize * 3);
        for row in 0..self.height {
            for col in 0..self.width {
                let y = self.sample(self.y_ptr, self.y_stride, col, row);
                let [r, g, b] = if self.monochrome {
                    [y; 3]
                } else {
                    let (cx, cy) = (
                        if self.ss_x { col / 2 } else { col },
                        if self.ss_y { row / 2 } else { row },
                    );
                    let cb = self.sample(self.u_ptr, self.uv_stride, cx, cy) - center;
                    let cr = self.sample(self.v_ptr, self.uv_stride, cx, cy) - center;
                    [
                        y + 1.402 * cr,
                        y - 0.344136 * cb - 0.714136 * cr,
                        y + 1.772 * cb,
                    ]
                };
                rgb.extend([r, g, b].map(|c| (c * scale).clamp(0.0, 255.0) as u8));
            }
        }
        rgb
    }

    /// Read one sample; 10/12-bit planes are stored as native-endian u16.
    #[inline]
    fn sample(&self, ptr: *const u8, stride: isize, x: u32, y: u32) -> f32 {
        let row = y as isize * stride;
        if self.bpc <= 8 {
            (unsafe { *ptr.offset(row + x as isize) }) as f32
        } else {
            (unsafe { ptr.offset(row + x as isize * 2).cast::<u16>().read_unaligned() }) as f32
        }
    }
}

/// Encode as AVIF into memory.
///
/// rav1e only takes 8-bit gray/RGB(A), so other layouts are converted first.
fn encode_avif(img: &DynamicImage, quality: u32) -> Result<Vec<u8>, BackendError> {
    let img: Cow<'_, DynamicImage> = match img {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => Cow::Borrowed(img),
        other if other.color().has_alpha() => Cow::Owned(other.to_rgba8().into()),
        other => Cow::Owned(other.to_rgb8().into()),
    };
    let mut out = Vec::new();
    let encoder = image::codecs::avif::AvifEncoder::new_with_speed_quality(
        &mut out,
        AVIF_SPEED,
        quality.clamp(1, 100) as u8,
    );
    img.write_with_encoder(encoder)
        .map_err(|e| BackendError::Encode(format!("AVIF encode failed: {e}")))?;
    Ok(out)
}

impl ImageBackend for RustBackend {
    fn identify(&self, data: &[u8]) -> Result<Dimensions, BackendError> {
        match sniff(data)? {
            SourceFormat::Avif => identify_avif(data, MAX_DECODE_DIMENSION),
            SourceFormat::Raster(format) => {
                let (width, height) = reader(data, format)
                    .into_dimensions()
                    .map_err(|e| BackendError::Decode(format!("{format:?}: {e}")))?;
                check_decode_limit(Dimensions { width, height }, MAX_DECODE_DIMENSION)
            }
        }
    }

    fn resize(&self, params: &ResizeParams<'_>) -> Result<EncodedImage, BackendError> {
        let img = load_image(params.source)?;
        let resized = if img.width() == params.width && img.height() == params.height {
            img
        } else {
            img.resize_exact(params.width, params.height, FilterType::Lanczos3)
        };
        let bytes = encode_avif(&resized, params.quality.value())?;
        Ok(EncodedImage {
            bytes,
            mime: OUTPUT_MIME,
        })
    }
}
