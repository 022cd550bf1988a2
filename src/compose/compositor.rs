//! Per-request tile assembly.
//!
//! Given a global frame and the immutable descriptors built at open time,
//! the compositor fetches a sub-region from every contributing source that
//! intersects the requested tile and merges the results into one canvas,
//! later contributions overwriting earlier ones.
//!
//! Axis-aligned placements (including per-axis scaling) are fetched directly
//! at the implied scale, with out-of-bounds edges clamped and the output
//! shrunk proportionally so the result lands at the correct canvas offset.
//! Sheared or rotated placements would need oversample-and-resample, which
//! is deliberately not implemented; they fail deterministically instead of
//! mis-rendering.

use tracing::trace;

use crate::error::TileError;
use crate::pixel::{merge_into, PixelBuffer};
use crate::source::cache::SourceCache;
use crate::source::provider::RegionRequest;

use super::frame_index::GlobalFrame;
use super::SourceDescriptor;

// =============================================================================
// Tiles
// =============================================================================

/// One assembled output tile, tagged with the request that produced it.
#[derive(Debug, Clone)]
pub struct Tile {
    pub x: u32,
    pub y: u32,
    pub level: u32,
    pub frame: u32,
    pub pixels: PixelBuffer,
}

// =============================================================================
// Compositor
// =============================================================================

/// Assembles output tiles from the immutable open-time state.
///
/// The compositor itself is read-only and safe to share across concurrent
/// tile requests; the injected [`SourceCache`] is the only shared mutable
/// collaborator.
#[derive(Debug, Clone)]
pub struct TileCompositor {
    pub size_x: u32,
    pub size_y: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    /// Level 0 is the most downsampled level.
    pub levels: u32,
    /// Fill color for area no source covers, when configured.
    pub background: Option<Vec<u8>>,
    /// Band count for tiles no source contributed to and no background
    /// colors.
    pub default_bands: u8,
}

impl TileCompositor {
    /// Full-resolution pixels per pixel at `level`.
    pub fn scale_for_level(&self, level: u32) -> u64 {
        1u64 << (self.levels - 1 - level)
    }

    /// Pixel dimensions of a pyramid level.
    pub fn level_size(&self, level: u32) -> (u32, u32) {
        let scale = self.scale_for_level(level);
        (
            (self.size_x as u64).div_ceil(scale) as u32,
            (self.size_y as u64).div_ceil(scale) as u32,
        )
    }

    /// Tile grid dimensions of a pyramid level.
    pub fn tile_grid(&self, level: u32) -> (u32, u32) {
        let (w, h) = self.level_size(level);
        (
            w.div_ceil(self.tile_width).max(1),
            h.div_ceil(self.tile_height).max(1),
        )
    }

    /// Assemble the tile at (x, y) of `level` for one global frame.
    pub async fn get_tile(
        &self,
        gframe: &GlobalFrame,
        descriptors: &[SourceDescriptor],
        cache: &SourceCache,
        x: u32,
        y: u32,
        level: u32,
    ) -> Result<Tile, TileError> {
        if level >= self.levels {
            return Err(TileError::LevelOutOfRange {
                level,
                levels: self.levels,
            });
        }
        let (tiles_x, tiles_y) = self.tile_grid(level);
        if x >= tiles_x || y >= tiles_y {
            return Err(TileError::TileOutOfBounds {
                level,
                x,
                y,
                max_x: tiles_x,
                max_y: tiles_y,
            });
        }

        let (level_w, level_h) = self.level_size(level);
        let out_w = self.tile_width.min(level_w - x * self.tile_width);
        let out_h = self.tile_height.min(level_h - y * self.tile_height);

        // Tile corners in full-resolution composite coordinates.
        let scale = self.scale_for_level(level) as f64;
        let left = x as f64 * self.tile_width as f64 * scale;
        let top = y as f64 * self.tile_height as f64 * scale;
        let right = left + out_w as f64 * scale;
        let bottom = top + out_h as f64 * scale;

        let pixels = self
            .compose_region(gframe, descriptors, cache, left, top, right, bottom, out_w, out_h)
            .await?;
        Ok(Tile {
            x,
            y,
            level,
            frame: gframe.frame,
            pixels,
        })
    }

    /// Assemble an arbitrary full-resolution rectangle scaled to
    /// `out_w` x `out_h`.
    ///
    /// This is the whole tile pipeline with the tile grid math stripped
    /// away; it also backs the composite's own region capability so a
    /// composite can serve as a constituent of another composite.
    #[allow(clippy::too_many_arguments)]
    pub async fn compose_region(
        &self,
        gframe: &GlobalFrame,
        descriptors: &[SourceDescriptor],
        cache: &SourceCache,
        left: f64,
        top: f64,
        right: f64,
        bottom: f64,
        out_w: u32,
        out_h: u32,
    ) -> Result<PixelBuffer, TileError> {
        // A background pre-fill is needed unless the first contribution
        // plainly covers the whole request.
        let needs_background = match gframe.sources.first() {
            None => true,
            Some(first) => {
                let d = &descriptors[first.source_index];
                !d.bbox.covers(left, top, right, bottom) || d.bbox.transform.is_some()
            }
        };
        let mut canvas: Option<PixelBuffer> = None;
        if needs_background {
            if let Some(bg) = &self.background {
                canvas = Some(PixelBuffer::filled(out_w, out_h, bg));
            }
        }

        for contribution in &gframe.sources {
            let d = &descriptors[contribution.source_index];
            if !d.bbox.intersects(left, top, right, bottom) {
                continue;
            }

            // Map the request corners into source-local coordinates.
            let (u0, v0, u1, v1) = match &d.bbox.transform {
                None => {
                    let (ox, oy) = d.bbox.offset();
                    (left - ox, top - oy, right - ox, bottom - oy)
                }
                Some(affine) => {
                    if !affine.is_axis_aligned() {
                        return Err(TileError::UnimplementedTransform {
                            path: d.path.clone(),
                        });
                    }
                    let (ax, ay) = affine.invert(left, top);
                    let (bx, by) = affine.invert(right, bottom);
                    (ax.min(bx), ay.min(by), ax.max(bx), ay.max(by))
                }
            };
            if u1 <= u0 || v1 <= v0 {
                continue;
            }

            // Clamp to the fetchable extent (the crop, or the full source)
            // and shrink the output proportionally so the fetched data still
            // lands at the right canvas offset.
            let extent = d.bbox.source_extent(d.metadata.size_x, d.metadata.size_y);
            let cu0 = u0.clamp(extent.left, extent.right);
            let cv0 = v0.clamp(extent.top, extent.bottom);
            let cu1 = u1.clamp(extent.left, extent.right);
            let cv1 = v1.clamp(extent.top, extent.bottom);
            if cu1 <= cu0 || cv1 <= cv0 {
                continue;
            }

            let px0 = ((cu0 - u0) / (u1 - u0) * out_w as f64).round() as u32;
            let px1 = ((cu1 - u0) / (u1 - u0) * out_w as f64).round() as u32;
            let py0 = ((cv0 - v0) / (v1 - v0) * out_h as f64).round() as u32;
            let py1 = ((cv1 - v0) / (v1 - v0) * out_h as f64).round() as u32;
            let sub_w = px1.saturating_sub(px0);
            let sub_h = py1.saturating_sub(py0);
            if sub_w == 0 || sub_h == 0 {
                continue;
            }

            let source = cache
                .get(
                    &d.path,
                    d.entry.source_name.as_deref(),
                    d.entry.params.as_ref(),
                )
                .await?;
            let request = RegionRequest {
                left: cu0,
                top: cv0,
                right: cu1,
                bottom: cv1,
                output_width: sub_w,
                output_height: sub_h,
                frame: contribution.frame,
                style: contribution.style.clone(),
            };
            trace!(
                path = %d.path.display(),
                frame = contribution.frame,
                sub_w,
                sub_h,
                "fetching sub-region"
            );
            // Failures after clamping are genuine source failures.
            let sub = source.read_region(&request).await?;
            canvas = Some(merge_into(canvas, sub, px0, py0, out_w, out_h));
        }

        // A canvas adopted from a partial contribution can be smaller than
        // the request; pad it out so callers always get out_w x out_h.
        Ok(match canvas {
            Some(c) => c.grow_to(out_w, out_h),
            None => match &self.background {
                Some(bg) => PixelBuffer::filled(out_w, out_h, bg),
                None => PixelBuffer::new(out_w, out_h, self.default_bands),
            },
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
