//! Pixel format model and frame geometry
//!
//! Buffer-size math for each supported raw video type, plus removal of the
//! row/column padding hardware capture pipelines add to align buffers to a
//! 16-pixel block size. Padding removal is driven by a per-format plane
//! layout table consumed by one generic copy routine.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Raw video types a capture pipeline can deliver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VideoType {
    /// Planar YUV 4:2:0, Y then V then U
    Yv12,
    /// Packed YUV 4:2:2, Y0 U Y1 V
    Yuy2,
    /// Planar YUV 4:2:0, Y then U then V
    Iyuv,
    /// Planar YUV 4:2:0, identical layout to IYUV
    I420,
    /// Packed 24-bit RGB (B, G, R byte order)
    Rgb24,
    /// Packed 32-bit RGB with alpha (B, G, R, A byte order)
    Argb,
    /// Motion JPEG; variable length, decoded to NV12 by the platform
    Mjpeg,
    /// Semi-planar YUV 4:2:0, Y plane then interleaved UV
    Nv12,
    /// Unrecognized format
    Unknown,
}

impl Default for VideoType {
    fn default() -> Self {
        VideoType::Unknown
    }
}

/// Capture pipelines align buffers to this block size
const PAD_BLOCK: u32 = 16;

/// One plane of a raw frame: subsampling divisors and bytes per sample unit
///
/// Divisors round up, so odd dimensions get the extra chroma column and row.
/// Subsampled packed units (a UV pair, a Y0-U-Y1-V group) are one sample
/// unit with the combined byte width.
struct PlaneSpec {
    width_div: usize,
    height_div: usize,
    bytes_per_unit: usize,
}

const fn plane(width_div: usize, height_div: usize, bytes_per_unit: usize) -> PlaneSpec {
    PlaneSpec {
        width_div,
        height_div,
        bytes_per_unit,
    }
}

const PLANAR_420: &[PlaneSpec] = &[plane(1, 1, 1), plane(2, 2, 1), plane(2, 2, 1)];
const SEMI_PLANAR_420: &[PlaneSpec] = &[plane(1, 1, 1), plane(2, 2, 2)];
const PACKED_422: &[PlaneSpec] = &[plane(2, 1, 4)];
const PACKED_RGB: &[PlaneSpec] = &[plane(1, 1, 3)];
const PACKED_ARGB: &[PlaneSpec] = &[plane(1, 1, 4)];

impl VideoType {
    /// Plane layout for fixed-size formats, `None` for variable-length ones
    fn plane_layout(&self) -> Option<&'static [PlaneSpec]> {
        match self {
            VideoType::Yv12 | VideoType::Iyuv | VideoType::I420 => Some(PLANAR_420),
            VideoType::Nv12 => Some(SEMI_PLANAR_420),
            VideoType::Yuy2 => Some(PACKED_422),
            VideoType::Rgb24 => Some(PACKED_RGB),
            VideoType::Argb => Some(PACKED_ARGB),
            VideoType::Mjpeg | VideoType::Unknown => None,
        }
    }

    /// Tight (unpadded) buffer size for a `width` x `height` frame
    ///
    /// `None` for MJPEG and unknown formats, whose length is variable.
    pub fn expected_size(&self, width: u32, height: u32) -> Option<usize> {
        let layout = self.plane_layout()?;
        Some(plane_bytes(layout, width as usize, height as usize))
    }
}

fn plane_bytes(layout: &[PlaneSpec], width: usize, height: usize) -> usize {
    layout
        .iter()
        .map(|p| width.div_ceil(p.width_div) * p.bytes_per_unit * height.div_ceil(p.height_div))
        .sum()
}

/// A negotiated capture descriptor: geometry, frame rate and raw format
///
/// Immutable once negotiated; set by format matching, consumed by format
/// conversion and buffer-size checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureCapability {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Maximum frames per second
    pub max_fps: u32,
    /// Raw video type delivered by the pipeline
    pub video_type: VideoType,
}

impl CaptureCapability {
    /// Create a new capability descriptor
    pub fn new(width: u32, height: u32, max_fps: u32, video_type: VideoType) -> Self {
        Self {
            width,
            height,
            max_fps,
            video_type,
        }
    }

    /// Tight buffer size for this capability, `None` for variable-length formats
    pub fn expected_size(&self) -> Option<usize> {
        self.video_type.expected_size(self.width, self.height)
    }
}

/// Extra columns a capture pipeline pads `dim` with to reach the block size
fn padding(dim: u32) -> usize {
    ((PAD_BLOCK - dim % PAD_BLOCK) % PAD_BLOCK) as usize
}

/// Strip hardware alignment padding from a captured frame in place
///
/// Applies only when the observed buffer length exceeds the tight size for
/// the capability; running it on an already-tight buffer is a no-op. Each
/// plane is compacted row by row from the padded stride to the tight stride,
/// then the buffer is truncated to the tight size. Packed single-plane
/// formats also arrive padded in columns only on some pipelines and are
/// trimmed the same way.
pub fn remove_padding(frame: &mut Vec<u8>, info: &CaptureCapability) {
    let Some(layout) = info.video_type.plane_layout() else {
        return;
    };
    let width = info.width as usize;
    let height = info.height as usize;
    let tight = plane_bytes(layout, width, height);
    if frame.len() <= tight {
        return;
    }

    let padded_width = width + padding(info.width);
    let mut padded_height = height + padding(info.height);
    if frame.len() < plane_bytes(layout, padded_width, padded_height) {
        let columns_only = plane_bytes(layout, padded_width, height);
        if layout.len() == 1 && frame.len() >= columns_only {
            padded_height = height;
        } else {
            // Longer than tight but shorter than a padded frame; the plane
            // layout cannot be interpreted, leave it for the length check
            // downstream.
            warn!(
                len = frame.len(),
                tight, "frame length matches neither tight nor padded layout"
            );
            return;
        }
    }

    let mut src_base = 0usize;
    let mut dst_base = 0usize;
    for spec in layout {
        let tight_stride = width.div_ceil(spec.width_div) * spec.bytes_per_unit;
        let padded_stride = padded_width.div_ceil(spec.width_div) * spec.bytes_per_unit;
        let rows = height.div_ceil(spec.height_div);
        let padded_rows = padded_height.div_ceil(spec.height_div);
        for row in 0..rows {
            let src = src_base + row * padded_stride;
            let dst = dst_base + row * tight_stride;
            frame.copy_within(src..src + tight_stride, dst);
        }
        src_base += padded_stride * padded_rows;
        dst_base += tight_stride * rows;
    }
    frame.truncate(tight);
}
