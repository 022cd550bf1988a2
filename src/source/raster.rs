//! Plain raster file adapter.
//!
//! Decodes an entire image into memory at open time and serves sub-regions
//! by nearest-neighbor sampling. This backs the common leaf case where a
//! constituent is a single PNG or JPEG rather than another composite; the
//! synthetic pyramid lets small rasters participate in a deep pyramid
//! without any stored overview levels.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use image::DynamicImage;
use tracing::debug;

use crate::compose::geometry::pyramid_levels;
use crate::error::{OpenError, TileError};
use crate::pixel::PixelBuffer;

use super::provider::{RegionRequest, SourceMetadata, SourceOpener, TileSource};

// =============================================================================
// Source
// =============================================================================

pub struct RasterSource {
    pixels: PixelBuffer,
    tile_width: u32,
    tile_height: u32,
}

impl RasterSource {
    fn from_image(image: DynamicImage, tile_width: u32, tile_height: u32) -> Self {
        let width = image.width();
        let height = image.height();
        let (bands, data) = match image {
            DynamicImage::ImageLuma8(img) => (1, img.into_raw()),
            DynamicImage::ImageLumaA8(img) => (2, img.into_raw()),
            DynamicImage::ImageRgb8(img) => (3, img.into_raw()),
            DynamicImage::ImageRgba8(img) => (4, img.into_raw()),
            // Sixteen-bit and float variants are narrowed to eight bits.
            other => (4, other.into_rgba8().into_raw()),
        };
        let pixels = PixelBuffer::from_raw(width, height, bands, data)
            .unwrap_or_else(|| PixelBuffer::new(width, height, bands));
        RasterSource {
            pixels,
            tile_width,
            tile_height,
        }
    }
}

#[async_trait]
impl TileSource for RasterSource {
    fn metadata(&self) -> SourceMetadata {
        SourceMetadata {
            size_x: self.pixels.width(),
            size_y: self.pixels.height(),
            tile_width: self.tile_width,
            tile_height: self.tile_height,
            levels: pyramid_levels(
                self.pixels.width(),
                self.pixels.height(),
                self.tile_width,
                self.tile_height,
            ),
            frames: 1,
            frame_axes: None,
            bands: self.pixels.bands() as u32,
            channels: Vec::new(),
            mm_x: None,
            mm_y: None,
            magnification: None,
        }
    }

    async fn read_region(&self, request: &RegionRequest) -> Result<PixelBuffer, TileError> {
        if request.frame != 0 {
            return Err(TileError::FrameOutOfRange {
                frame: request.frame,
                frames: 1,
            });
        }
        Ok(self.pixels.sample_region(
            request.left,
            request.top,
            request.right,
            request.bottom,
            request.output_width,
            request.output_height,
        ))
    }
}

// =============================================================================
// Opener
// =============================================================================

/// Opens any format the `image` crate can decode.
///
/// Registered last so format-specific openers get first refusal. Decoding
/// runs on the blocking pool; a large raster can take a while.
pub struct RasterOpener {
    tile_width: u32,
    tile_height: u32,
}

impl RasterOpener {
    pub fn new(tile_width: u32, tile_height: u32) -> Self {
        RasterOpener {
            tile_width,
            tile_height,
        }
    }
}

#[async_trait]
impl SourceOpener for RasterOpener {
    async fn open(
        &self,
        path: &Path,
        _params: Option<&serde_json::Value>,
    ) -> Result<Arc<dyn TileSource>, OpenError> {
        if !path.is_file() {
            return Err(OpenError::SourceNotFound {
                path: path.to_path_buf(),
            });
        }
        let owned = path.to_path_buf();
        let image = tokio::task::spawn_blocking(move || image::open(&owned))
            .await
            .map_err(|e| OpenError::SourceRead {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
            .map_err(|e| OpenError::SourceRead {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        debug!(
            path = %path.display(),
            width = image.width(),
            height = image.height(),
            "decoded raster"
        );
        Ok(Arc::new(RasterSource::from_image(
            image,
            self.tile_width,
            self.tile_height,
        )))
    }
}

// =============================================================================
// Tests
// =============================================================================
