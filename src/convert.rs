//! Raw frame conversion to the canonical planar format
//!
//! Every supported raw video type converts to I420, with an optional
//! quarter-turn rotation applied in the same call. Output dimensions swap
//! for 90 and 270 degree rotations. RGB conversion uses the BT.601
//! studio-range matrix.

use crate::error::{CaptureError, CaptureResult};
use crate::format::{CaptureCapability, VideoType};
use crate::orientation::VideoRotation;

/// A canonical planar 4:2:0 frame: Y plane followed by U and V planes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct I420Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl I420Frame {
    fn from_planes(width: u32, height: u32, y: Vec<u8>, u: Vec<u8>, v: Vec<u8>) -> Self {
        let mut data = y;
        data.extend_from_slice(&u);
        data.extend_from_slice(&v);
        Self {
            width,
            height,
            data,
        }
    }

    /// Frame width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Y plane stride in bytes
    pub fn stride_y(&self) -> usize {
        self.width as usize
    }

    /// U and V plane stride in bytes
    pub fn stride_uv(&self) -> usize {
        (self.width as usize + 1) / 2
    }

    /// Full planar payload, Y then U then V
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Y plane bytes
    pub fn y(&self) -> &[u8] {
        &self.data[..self.y_len()]
    }

    /// U plane bytes
    pub fn u(&self) -> &[u8] {
        let y = self.y_len();
        &self.data[y..y + self.uv_len()]
    }

    /// V plane bytes
    pub fn v(&self) -> &[u8] {
        let offset = self.y_len() + self.uv_len();
        &self.data[offset..]
    }

    fn y_len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    fn uv_len(&self) -> usize {
        self.stride_uv() * ((self.height as usize + 1) / 2)
    }
}

/// Convert a raw frame to I420, applying `rotation` in the same pass
///
/// The buffer must be at least the tight size for the capability. MJPEG is
/// rejected here: the platform decodes it to NV12 before delivery, so a
/// literal MJPEG buffer never reaches the converter.
pub fn to_i420(
    raw: &[u8],
    info: &CaptureCapability,
    rotation: VideoRotation,
) -> CaptureResult<I420Frame> {
    let expected = info.expected_size().ok_or(CaptureError::UnsupportedFormat {
        format: format!("{:?}", info.video_type),
    })?;
    if raw.len() < expected {
        return Err(CaptureError::MalformedFrame {
            expected,
            actual: raw.len(),
        });
    }

    let width = info.width as usize;
    let height = info.height as usize;
    let (y, u, v) = match info.video_type {
        VideoType::Iyuv | VideoType::I420 => split_planar_420(raw, width, height, false),
        VideoType::Yv12 => split_planar_420(raw, width, height, true),
        VideoType::Nv12 => from_nv12(raw, width, height),
        VideoType::Yuy2 => from_yuy2(raw, width, height),
        VideoType::Rgb24 => from_bgr(raw, width, height, 3),
        VideoType::Argb => from_bgr(raw, width, height, 4),
        VideoType::Mjpeg | VideoType::Unknown => unreachable!("no expected size"),
    };

    let (cw, ch) = chroma_dims(width, height);
    let (y, yw, yh) = rotate_plane(y, width, height, rotation);
    let (u, _, _) = rotate_plane(u, cw, ch, rotation);
    let (v, _, _) = rotate_plane(v, cw, ch, rotation);
    Ok(I420Frame::from_planes(yw as u32, yh as u32, y, u, v))
}

fn chroma_dims(width: usize, height: usize) -> (usize, usize) {
    ((width + 1) / 2, (height + 1) / 2)
}

fn split_planar_420(raw: &[u8], width: usize, height: usize, v_first: bool) -> Planes {
    let (cw, ch) = chroma_dims(width, height);
    let y_len = width * height;
    let c_len = cw * ch;
    let y = raw[..y_len].to_vec();
    let first = raw[y_len..y_len + c_len].to_vec();
    let second = raw[y_len + c_len..y_len + 2 * c_len].to_vec();
    if v_first {
        (y, second, first)
    } else {
        (y, first, second)
    }
}

type Planes = (Vec<u8>, Vec<u8>, Vec<u8>);

fn from_nv12(raw: &[u8], width: usize, height: usize) -> Planes {
    let (cw, ch) = chroma_dims(width, height);
    let y = raw[..width * height].to_vec();
    let uv = &raw[width * height..];
    let mut u = Vec::with_capacity(cw * ch);
    let mut v = Vec::with_capacity(cw * ch);
    for row in 0..ch {
        // UV rows carry whole interleaved pairs, so odd widths round up
        let base = row * cw * 2;
        for col in 0..cw {
            u.push(uv[base + 2 * col]);
            v.push(uv[base + 2 * col + 1]);
        }
    }
    (y, u, v)
}

fn from_yuy2(raw: &[u8], width: usize, height: usize) -> Planes {
    let (cw, ch) = chroma_dims(width, height);
    // Rows are whole Y0-U-Y1-V groups, so odd widths round up
    let stride = cw * 4;
    let mut y = Vec::with_capacity(width * height);
    for row in 0..height {
        let base = row * stride;
        for col in 0..width {
            y.push(raw[base + 2 * col]);
        }
    }
    // Chroma is horizontally subsampled in the source; average vertical
    // pairs to reach 4:2:0.
    let mut u = Vec::with_capacity(cw * ch);
    let mut v = Vec::with_capacity(cw * ch);
    for chroma_row in 0..ch {
        let r0 = (2 * chroma_row) * stride;
        let r1 = (2 * chroma_row + 1).min(height - 1) * stride;
        for col in 0..cw {
            let u0 = raw[r0 + 4 * col + 1] as u16;
            let u1 = raw[r1 + 4 * col + 1] as u16;
            let v0 = raw[r0 + 4 * col + 3] as u16;
            let v1 = raw[r1 + 4 * col + 3] as u16;
            u.push(((u0 + u1 + 1) / 2) as u8);
            v.push(((v0 + v1 + 1) / 2) as u8);
        }
    }
    (y, u, v)
}

/// BT.601 studio-range RGB to YUV
fn rgb_to_y(r: i32, g: i32, b: i32) -> u8 {
    (((66 * r + 129 * g + 25 * b + 128) >> 8) + 16).clamp(0, 255) as u8
}

fn rgb_to_u(r: i32, g: i32, b: i32) -> u8 {
    (((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128).clamp(0, 255) as u8
}

fn rgb_to_v(r: i32, g: i32, b: i32) -> u8 {
    (((112 * r - 94 * g - 18 * b + 128) >> 8) + 128).clamp(0, 255) as u8
}

fn from_bgr(raw: &[u8], width: usize, height: usize, bytes_per_pixel: usize) -> Planes {
    let (cw, ch) = chroma_dims(width, height);
    let stride = width * bytes_per_pixel;
    let bgr = |row: usize, col: usize| {
        let base = row * stride + col * bytes_per_pixel;
        (
            raw[base + 2] as i32, // R
            raw[base + 1] as i32, // G
            raw[base] as i32,     // B
        )
    };

    let mut y = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let (r, g, b) = bgr(row, col);
            y.push(rgb_to_y(r, g, b));
        }
    }

    // Chroma from the averaged RGB of each 2x2 block, clamping at the
    // right/bottom edge for odd dimensions.
    let mut u = Vec::with_capacity(cw * ch);
    let mut v = Vec::with_capacity(cw * ch);
    for chroma_row in 0..ch {
        for chroma_col in 0..cw {
            let r0 = 2 * chroma_row;
            let c0 = 2 * chroma_col;
            let r1 = (r0 + 1).min(height - 1);
            let c1 = (c0 + 1).min(width - 1);
            let samples = [bgr(r0, c0), bgr(r0, c1), bgr(r1, c0), bgr(r1, c1)];
            let (mut r, mut g, mut b) = (0, 0, 0);
            for (sr, sg, sb) in samples {
                r += sr;
                g += sg;
                b += sb;
            }
            u.push(rgb_to_u(r / 4, g / 4, b / 4));
            v.push(rgb_to_v(r / 4, g / 4, b / 4));
        }
    }
    (y, u, v)
}

/// Rotate one plane by a quarter turn, returning the rotated plane and its
/// new dimensions
fn rotate_plane(
    src: Vec<u8>,
    width: usize,
    height: usize,
    rotation: VideoRotation,
) -> (Vec<u8>, usize, usize) {
    match rotation {
        VideoRotation::Rotate0 => (src, width, height),
        VideoRotation::Rotate180 => {
            let mut dst = src;
            dst.reverse();
            (dst, width, height)
        }
        VideoRotation::Rotate90 => {
            let mut dst = vec![0u8; src.len()];
            for row in 0..height {
                for col in 0..width {
                    dst[col * height + (height - 1 - row)] = src[row * width + col];
                }
            }
            (dst, height, width)
        }
        VideoRotation::Rotate270 => {
            let mut dst = vec![0u8; src.len()];
            for row in 0..height {
                for col in 0..width {
                    dst[(width - 1 - col) * height + row] = src[row * width + col];
                }
            }
            (dst, height, width)
        }
    }
}
