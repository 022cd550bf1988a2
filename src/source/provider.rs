//! The capability contract between the compositing engine and its sources.
//!
//! The engine never decodes image formats itself. Every constituent image is
//! reached through [`TileSource`], a narrow trait a format adapter (or
//! another composite) implements, and opened through a [`SourceOpener`].
//! Optional behavior is advertised through [`SourceCapabilities`], a small
//! struct of named flags queried through a typed method rather than by
//! probing for attributes.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{OpenError, TileError};
use crate::pixel::PixelBuffer;

// =============================================================================
// Metadata
// =============================================================================

/// Per-frame axis indices reported by a multiframe source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameAxes {
    pub index_c: u32,
    pub index_z: u32,
    pub index_t: u32,
    pub index_xy: u32,
}

/// A snapshot of an opened source's metadata.
///
/// Snapshots are taken once at probe time and attached to the source's
/// descriptor; they are immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMetadata {
    /// Full-resolution width in pixels.
    pub size_x: u32,
    /// Full-resolution height in pixels.
    pub size_y: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    /// Pyramid level count; level 0 is the most downsampled level.
    pub levels: u32,
    /// Number of 2D frames. 1 for a plain image.
    pub frames: u32,
    /// Per-frame axis table, when the source can correlate its frames to
    /// c/z/t/xy positions. A multiframe source without this table forces the
    /// whole composite index into sequential mode.
    pub frame_axes: Option<Vec<FrameAxes>>,
    /// Samples per pixel (1-4).
    pub bands: u32,
    /// Channel names, when the source knows them.
    pub channels: Vec<String>,
    pub mm_x: Option<f64>,
    pub mm_y: Option<f64>,
    pub magnification: Option<f64>,
}

impl SourceMetadata {
    /// Axis table entry for a local frame, defaulting to all-zero indices
    /// for single-frame sources or sources without a table.
    pub fn frame_axes_at(&self, frame: u32) -> FrameAxes {
        self.frame_axes
            .as_ref()
            .and_then(|axes| axes.get(frame as usize).copied())
            .unwrap_or_default()
    }
}

/// Optional behaviors a source can advertise.
///
/// Capabilities are declared explicitly; the engine never infers them by
/// reflection over the implementation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceCapabilities {
    /// The source carries associated (non-pyramidal) images such as labels
    /// or macro overviews.
    pub associated_images: bool,

    /// The source honors per-fetch style parameters.
    pub styles: bool,
}

// =============================================================================
// Region requests
// =============================================================================

/// A sub-region fetch against a source.
///
/// The rectangle is in the source's own full-resolution pixel coordinates;
/// the source scales the result to `output_width` x `output_height` using
/// whatever pyramid level suits it best.
#[derive(Debug, Clone)]
pub struct RegionRequest {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub output_width: u32,
    pub output_height: u32,
    /// Local frame number within the source.
    pub frame: u32,
    /// Opaque per-fetch options (ignored by sources without the `styles`
    /// capability).
    pub style: Option<serde_json::Value>,
}

// =============================================================================
// Traits
// =============================================================================

/// A readable tile/region source.
///
/// Implemented by format adapters and by [`crate::composite::CompositeSource`]
/// itself, so a composite can be a constituent of another composite.
#[async_trait]
pub trait TileSource: Send + Sync {
    /// Snapshot of the source's metadata.
    fn metadata(&self) -> SourceMetadata;

    /// Declared optional capabilities.
    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::default()
    }

    /// Fetch a sub-region, scaled to the requested output size.
    ///
    /// A request already clamped to the source bounds that still fails
    /// indicates a genuine source failure and is propagated as-is.
    async fn read_region(&self, request: &RegionRequest) -> Result<PixelBuffer, TileError>;

    /// Keys of associated images, if the `associated_images` capability is
    /// declared.
    async fn associated_image_list(&self) -> Vec<String> {
        Vec::new()
    }

    /// Fetch one associated image by key.
    async fn associated_image(&self, _key: &str) -> Option<PixelBuffer> {
        None
    }

    /// Implementation-specific metadata for diagnostics.
    fn internal_metadata(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}

/// Opens concrete files as [`TileSource`] instances.
///
/// Opening must be idempotent and safe to invoke concurrently for the same
/// path; duplicate concurrent opens may cost redundant I/O but must not
/// corrupt state.
#[async_trait]
pub trait SourceOpener: Send + Sync {
    async fn open(
        &self,
        path: &Path,
        params: Option<&serde_json::Value>,
    ) -> Result<Arc<dyn TileSource>, OpenError>;
}

// =============================================================================
// Tests
// =============================================================================
