//! Pixel buffers and the merge primitives used during tile assembly.
//!
//! The compositing engine works on plain 8-bit interleaved buffers with one
//! to four bands. Band counts carry their conventional meaning:
//!
//! | bands | layout            |
//! |-------|-------------------|
//! | 1     | gray              |
//! | 2     | gray + alpha      |
//! | 3     | RGB               |
//! | 4     | RGB + alpha       |
//!
//! Merging two buffers first promotes both to a common band count (adding an
//! opaque alpha band or replicating gray into RGB as needed), grows the
//! canvas to cover the incoming extent, then overwrites the target rectangle.
//! There is no alpha blending: later data wins.

use bytes::Bytes;
use image::{codecs::png::PngEncoder, ExtendedColorType, ImageEncoder};

use crate::error::TileError;

/// Value used for newly-introduced alpha bands.
pub const OPAQUE: u8 = 255;

// =============================================================================
// PixelBuffer
// =============================================================================

/// An 8-bit interleaved pixel buffer with 1-4 bands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    bands: u8,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Create a zero-filled buffer.
    pub fn new(width: u32, height: u32, bands: u8) -> Self {
        debug_assert!((1..=4).contains(&bands));
        Self {
            width,
            height,
            bands,
            data: vec![0u8; width as usize * height as usize * bands as usize],
        }
    }

    /// Create a buffer filled with a solid color.
    ///
    /// The band count is taken from the color's length.
    pub fn filled(width: u32, height: u32, color: &[u8]) -> Self {
        debug_assert!((1..=4).contains(&(color.len() as u8)));
        let bands = color.len() as u8;
        let mut data = Vec::with_capacity(width as usize * height as usize * color.len());
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(color);
        }
        Self {
            width,
            height,
            bands,
            data,
        }
    }

    /// Wrap raw interleaved data.
    ///
    /// Returns `None` if the data length does not match the dimensions.
    pub fn from_raw(width: u32, height: u32, bands: u8, data: Vec<u8>) -> Option<Self> {
        if !(1..=4).contains(&bands)
            || data.len() != width as usize * height as usize * bands as usize
        {
            return None;
        }
        Some(Self {
            width,
            height,
            bands,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bands(&self) -> u8 {
        self.bands
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// The pixel at (x, y) as a band slice.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let b = self.bands as usize;
        let idx = (y as usize * self.width as usize + x as usize) * b;
        &self.data[idx..idx + b]
    }

    fn pad_color(bands: u8) -> [u8; 4] {
        // Zero fill, opaque alpha where the layout has one.
        let mut color = [0u8; 4];
        if bands == 2 {
            color[1] = OPAQUE;
        } else if bands == 4 {
            color[3] = OPAQUE;
        }
        color
    }

    /// Convert this buffer to a (strictly larger or equal) band count.
    ///
    /// Supported widenings: gray gains alpha and/or is replicated into RGB;
    /// RGB gains opaque alpha. Narrowing is not supported.
    pub fn with_bands(self, bands: u8) -> Self {
        if bands == self.bands {
            return self;
        }
        debug_assert!(bands > self.bands);
        let mut out = Vec::with_capacity(
            self.width as usize * self.height as usize * bands as usize,
        );
        for px in self.data.chunks_exact(self.bands as usize) {
            match (self.bands, bands) {
                (1, 2) => out.extend_from_slice(&[px[0], OPAQUE]),
                (1, 3) => out.extend_from_slice(&[px[0], px[0], px[0]]),
                (1, 4) => out.extend_from_slice(&[px[0], px[0], px[0], OPAQUE]),
                (2, 4) => out.extend_from_slice(&[px[0], px[0], px[0], px[1]]),
                (3, 4) => out.extend_from_slice(&[px[0], px[1], px[2], OPAQUE]),
                // 2 -> 3 would drop alpha; merge_bands never produces it.
                _ => out.extend_from_slice(&[px[0], px[0], px[0], OPAQUE]),
            }
        }
        Self {
            width: self.width,
            height: self.height,
            bands,
            data: out,
        }
    }

    /// Grow the buffer so it covers at least `width` x `height`.
    ///
    /// The buffer never shrinks. New area is zero-filled, with opaque alpha
    /// where the band layout has an alpha band.
    pub fn grow_to(self, width: u32, height: u32) -> Self {
        if width <= self.width && height <= self.height {
            return self;
        }
        let new_w = self.width.max(width);
        let new_h = self.height.max(height);
        let pad = Self::pad_color(self.bands);
        let mut out = PixelBuffer::filled(new_w, new_h, &pad[..self.bands as usize]);
        out.paste(&self, 0, 0);
        out
    }

    /// Overwrite the rectangle at (x, y) with `other`'s pixels.
    ///
    /// Both buffers must have the same band count. Data falling outside this
    /// buffer is clipped.
    pub fn paste(&mut self, other: &PixelBuffer, x: u32, y: u32) {
        debug_assert_eq!(self.bands, other.bands);
        let b = self.bands as usize;
        let copy_w = other.width.min(self.width.saturating_sub(x)) as usize;
        let copy_h = other.height.min(self.height.saturating_sub(y)) as usize;
        for row in 0..copy_h {
            let src_start = row * other.width as usize * b;
            let dst_start = ((y as usize + row) * self.width as usize + x as usize) * b;
            self.data[dst_start..dst_start + copy_w * b]
                .copy_from_slice(&other.data[src_start..src_start + copy_w * b]);
        }
    }

    /// Nearest-neighbor sample of the region `[left, right) x [top, bottom)`
    /// into an `out_w` x `out_h` buffer.
    ///
    /// Sample points falling outside the buffer are clamped to the edge.
    pub fn sample_region(
        &self,
        left: f64,
        top: f64,
        right: f64,
        bottom: f64,
        out_w: u32,
        out_h: u32,
    ) -> Self {
        let b = self.bands as usize;
        let mut data = Vec::with_capacity(out_w as usize * out_h as usize * b);
        let sx = (right - left) / out_w.max(1) as f64;
        let sy = (bottom - top) / out_h.max(1) as f64;
        for oy in 0..out_h {
            let src_y = (top + (oy as f64 + 0.5) * sy).floor();
            let src_y = (src_y.max(0.0) as u32).min(self.height.saturating_sub(1));
            for ox in 0..out_w {
                let src_x = (left + (ox as f64 + 0.5) * sx).floor();
                let src_x = (src_x.max(0.0) as u32).min(self.width.saturating_sub(1));
                data.extend_from_slice(self.pixel(src_x, src_y));
            }
        }
        Self {
            width: out_w,
            height: out_h,
            bands: self.bands,
            data,
        }
    }

    /// Encode as PNG.
    pub fn to_png(&self) -> Result<Bytes, TileError> {
        let color = match self.bands {
            1 => ExtendedColorType::L8,
            2 => ExtendedColorType::La8,
            3 => ExtendedColorType::Rgb8,
            _ => ExtendedColorType::Rgba8,
        };
        let mut buf = Vec::new();
        PngEncoder::new(&mut buf)
            .write_image(&self.data, self.width, self.height, color)
            .map_err(|e| TileError::Encode(e.to_string()))?;
        Ok(Bytes::from(buf))
    }
}

// =============================================================================
// Merge helpers
// =============================================================================

/// Band count both buffers are promoted to before a merge.
///
/// Mostly the larger of the two; a gray+alpha / RGB pairing is promoted to
/// RGBA so the alpha band survives.
pub fn merge_bands(a: u8, b: u8) -> u8 {
    let (lo, hi) = (a.min(b), a.max(b));
    if lo == 2 && hi == 3 {
        4
    } else {
        hi
    }
}

/// Merge `sub` into `canvas` at offset (x, y), last write winning.
///
/// `canvas` may be `None` if no background pre-fill was required; a sub-image
/// landing at the origin is then adopted as the canvas outright. Otherwise a
/// zero-filled canvas of `fallback_w` x `fallback_h` is allocated first. The
/// canvas grows (never shrinks) to cover the incoming extent.
pub fn merge_into(
    canvas: Option<PixelBuffer>,
    sub: PixelBuffer,
    x: u32,
    y: u32,
    fallback_w: u32,
    fallback_h: u32,
) -> PixelBuffer {
    let canvas = match canvas {
        Some(c) => c,
        None if x == 0 && y == 0 => return sub,
        None => PixelBuffer::new(fallback_w, fallback_h, sub.bands()),
    };
    let bands = merge_bands(canvas.bands(), sub.bands());
    let sub = sub.with_bands(bands);
    let mut canvas = canvas
        .with_bands(bands)
        .grow_to(x + sub.width(), y + sub.height());
    canvas.paste(&sub, x, y);
    canvas
}

// =============================================================================
// Tests
// =============================================================================
