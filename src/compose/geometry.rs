//! Geometric placement of sources in composite space.
//!
//! Each source occupies a bounding box in composite pixel coordinates,
//! computed from its size, an optional crop in source-local coordinates and
//! an optional affine position transform. Crop is applied first, then the
//! 2x2 matrix (each entry multiplied by the uniform scale), then the
//! translation. The box is the min/max of the four transformed corners.
//!
//! A non-identity matrix gets its inverse computed up front; a singular
//! matrix is rejected at open time.

use std::path::Path;

use crate::config::Position;
use crate::error::ConfigError;

/// Determinants smaller than this are treated as singular.
const SINGULAR_EPSILON: f64 = 1e-12;

// =============================================================================
// Affine transforms
// =============================================================================

/// A 2D affine transform with a precomputed inverse matrix.
///
/// `m` is row-major `[m00, m01, m10, m11]`; the full mapping is
/// `p' = M * p + (tx, ty)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub m: [f64; 4],
    pub tx: f64,
    pub ty: f64,
    inv: [f64; 4],
}

impl Affine {
    /// Build a transform, computing the inverse matrix.
    ///
    /// Returns `None` for a singular matrix.
    pub fn new(m: [f64; 4], tx: f64, ty: f64) -> Option<Self> {
        let det = m[0] * m[3] - m[1] * m[2];
        if det.abs() < SINGULAR_EPSILON {
            return None;
        }
        let inv = [m[3] / det, -m[1] / det, -m[2] / det, m[0] / det];
        Some(Self { m, tx, ty, inv })
    }

    /// Map source coordinates to composite coordinates.
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.m[0] * x + self.m[1] * y + self.tx,
            self.m[2] * x + self.m[3] * y + self.ty,
        )
    }

    /// Map composite coordinates back to source coordinates.
    pub fn invert(&self, x: f64, y: f64) -> (f64, f64) {
        let (dx, dy) = (x - self.tx, y - self.ty);
        (
            self.inv[0] * dx + self.inv[1] * dy,
            self.inv[2] * dx + self.inv[3] * dy,
        )
    }

    /// Whether the matrix has no shear or rotation terms.
    ///
    /// Per-axis scaling still counts as axis-aligned; only `m01`/`m10`
    /// disqualify. Sheared or rotated sources cannot be fetched through the
    /// direct sub-region path.
    pub fn is_axis_aligned(&self) -> bool {
        self.m[1] == 0.0 && self.m[2] == 0.0
    }

    fn is_identity_matrix(m: &[f64; 4]) -> bool {
        *m == [1.0, 0.0, 0.0, 1.0]
    }
}

// =============================================================================
// Bounding boxes
// =============================================================================

/// Crop rectangle in source-local coordinates, already clipped to the
/// source extent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropRect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

/// A source's occupied rectangle in composite pixel space.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBox {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    /// Crop in source-local coordinates, when one applies.
    pub crop: Option<CropRect>,
    /// Position transform, `None` when the matrix is the identity (a pure
    /// translation is folded into the box coordinates).
    pub transform: Option<Affine>,
}

impl BoundingBox {
    /// Translation from source-local to composite coordinates for the
    /// identity-matrix case.
    pub fn offset(&self) -> (f64, f64) {
        let (crop_left, crop_top) = match self.crop {
            Some(crop) => (crop.left, crop.top),
            None => (0.0, 0.0),
        };
        (self.left - crop_left, self.top - crop_top)
    }

    /// Whether this box intersects the given composite-space rectangle.
    pub fn intersects(&self, left: f64, top: f64, right: f64, bottom: f64) -> bool {
        self.left < right && self.right > left && self.top < bottom && self.bottom > top
    }

    /// Whether this box fully covers the given composite-space rectangle.
    pub fn covers(&self, left: f64, top: f64, right: f64, bottom: f64) -> bool {
        self.left <= left && self.top <= top && self.right >= right && self.bottom >= bottom
    }

    /// The fetchable region in source-local coordinates: the crop rectangle,
    /// or the full source extent.
    pub fn source_extent(&self, width: u32, height: u32) -> CropRect {
        self.crop.unwrap_or(CropRect {
            left: 0.0,
            top: 0.0,
            right: width as f64,
            bottom: height as f64,
        })
    }
}

// =============================================================================
// Resolution
// =============================================================================

/// Compute a source's bounding box from its size and optional position.
///
/// A singular position matrix is a fatal configuration error.
pub fn resolve_bbox(
    width: u32,
    height: u32,
    position: Option<&Position>,
    path: &Path,
) -> Result<BoundingBox, ConfigError> {
    let pos = position.copied().unwrap_or_default();

    // Crop first: clip into [0, w] x [0, h].
    let crop = pos.crop.map(|c| CropRect {
        left: c.left.unwrap_or(0.0).clamp(0.0, width as f64),
        top: c.top.unwrap_or(0.0).clamp(0.0, height as f64),
        right: c.right.unwrap_or(width as f64).clamp(0.0, width as f64),
        bottom: c.bottom.unwrap_or(height as f64).clamp(0.0, height as f64),
    });
    let extent = crop.unwrap_or(CropRect {
        left: 0.0,
        top: 0.0,
        right: width as f64,
        bottom: height as f64,
    });

    let m = [
        pos.s11 * pos.scale,
        pos.s12 * pos.scale,
        pos.s21 * pos.scale,
        pos.s22 * pos.scale,
    ];
    let affine = Affine::new(m, pos.x, pos.y).ok_or(ConfigError::SingularTransform {
        path: path.to_path_buf(),
        s11: m[0],
        s12: m[1],
        s21: m[2],
        s22: m[3],
    })?;

    let corners = [
        affine.apply(extent.left, extent.top),
        affine.apply(extent.right, extent.top),
        affine.apply(extent.left, extent.bottom),
        affine.apply(extent.right, extent.bottom),
    ];
    let left = corners.iter().map(|c| c.0).fold(f64::INFINITY, f64::min);
    let right = corners.iter().map(|c| c.0).fold(f64::NEG_INFINITY, f64::max);
    let top = corners.iter().map(|c| c.1).fold(f64::INFINITY, f64::min);
    let bottom = corners.iter().map(|c| c.1).fold(f64::NEG_INFINITY, f64::max);

    Ok(BoundingBox {
        left,
        top,
        right,
        bottom,
        crop,
        transform: (!Affine::is_identity_matrix(&m)).then_some(affine),
    })
}

/// Number of power-of-two pyramid levels needed to cover a full-resolution
/// extent with one tile at level 0.
pub fn pyramid_levels(size_x: u32, size_y: u32, tile_width: u32, tile_height: u32) -> u32 {
    let mut levels = 1u32;
    let (mut w, mut h) = (size_x.max(1) as u64, size_y.max(1) as u64);
    while w > tile_width as u64 || h > tile_height as u64 {
        w = w.div_ceil(2);
        h = h.div_ceil(2);
        levels += 1;
    }
    levels
}

// =============================================================================
// Tests
// =============================================================================
