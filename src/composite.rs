//! The composite source: construction pipeline and serving facade.
//!
//! [`CompositeSource::open`] runs the whole open-time pipeline (validate,
//! resolve entries, probe metadata, place geometry, build the frame index)
//! and produces an immutable source. Construction is all-or-nothing: any
//! fatal condition fails the open rather than yielding a partial composite.
//!
//! [`CompositeSource`] itself implements [`TileSource`], and
//! [`CompositeOpener`] is registered in the standard registry, so a
//! composite description can appear as a source inside another composite.

use std::path::Path;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use crate::compose::compositor::{Tile, TileCompositor};
use crate::compose::frame_index::{finalize, FrameIndex, FrameIndexState};
use crate::compose::geometry::{pyramid_levels, resolve_bbox};
use crate::compose::resolver::resolve_entries;
use crate::compose::SourceDescriptor;
use crate::config::{CompositeSpec, DEFAULT_TILE_SIZE};
use crate::error::{ConfigError, OpenError, TileError};
use crate::pixel::PixelBuffer;
use crate::source::cache::{SourceCache, DEFAULT_SOURCE_CACHE_CAPACITY};
use crate::source::provider::{
    FrameAxes, RegionRequest, SourceCapabilities, SourceMetadata, SourceOpener, TileSource,
};
use crate::source::raster::RasterOpener;
use crate::source::registry::OpenerRegistryBuilder;

// =============================================================================
// Composite source
// =============================================================================

pub struct CompositeSource {
    spec: CompositeSpec,
    descriptors: Vec<SourceDescriptor>,
    frame_index: FrameIndex,
    compositor: TileCompositor,
    cache: Arc<SourceCache>,
    /// Capabilities observed on the first constituent at probe time.
    first_capabilities: SourceCapabilities,
}

impl CompositeSource {
    /// Build a composite from a parsed description.
    ///
    /// `spec_path` anchors relative source paths and the self-reference
    /// check; pass `None` for descriptions not read from a file.
    pub async fn open(
        spec: CompositeSpec,
        spec_path: Option<&Path>,
        cache: Arc<SourceCache>,
    ) -> Result<Self, OpenError> {
        spec.validate()?;
        let resolved = resolve_entries(&spec, spec_path)?;
        debug!(sources = resolved.len(), "resolved composite entries");

        // Probe metadata. With uniformSources the first two are probed
        // eagerly; if their snapshots agree the rest inherit the first one
        // and are opened lazily at tile time.
        let mut metadata: Vec<SourceMetadata> = Vec::with_capacity(resolved.len());
        let mut first_capabilities = SourceCapabilities::default();
        let mut inherited: Option<SourceMetadata> = None;
        for (i, source) in resolved.iter().enumerate() {
            if let Some(meta) = &inherited {
                metadata.push(meta.clone());
                continue;
            }
            let opened = cache
                .get(
                    &source.path,
                    source.entry.source_name.as_deref(),
                    source.entry.params.as_ref(),
                )
                .await?;
            let meta = opened.metadata();
            if i == 0 {
                first_capabilities = opened.capabilities();
            }
            if spec.uniform_sources && i == 1 && metadata[0] == meta {
                inherited = Some(metadata[0].clone());
            }
            metadata.push(meta);
        }

        // Place each source in composite space. A singular placement matrix
        // is fatal here, never at tile time.
        let mut descriptors = Vec::with_capacity(resolved.len());
        for (source, meta) in resolved.into_iter().zip(metadata) {
            let bbox = resolve_bbox(
                meta.size_x,
                meta.size_y,
                source.entry.position.as_ref(),
                &source.path,
            )?;
            descriptors.push(SourceDescriptor {
                entry: source.entry,
                path: source.path,
                bbox,
                metadata: meta,
            });
        }

        // Composite extent: explicit dimensions win, otherwise the union of
        // the placed bounding boxes.
        let derived_w = descriptors
            .iter()
            .map(|d| d.bbox.right.ceil() as u32)
            .max()
            .unwrap_or(0);
        let derived_h = descriptors
            .iter()
            .map(|d| d.bbox.bottom.ceil() as u32)
            .max()
            .unwrap_or(0);
        let size_x = spec.width.unwrap_or(derived_w).max(1);
        let size_y = spec.height.unwrap_or(derived_h).max(1);

        let state = descriptors.iter().enumerate().fold(
            FrameIndexState::new(spec.channels.clone()),
            |state, (i, d)| state.add_source(i, &d.entry, &d.metadata),
        );
        let frame_index = finalize(state);

        let default_bands = descriptors
            .iter()
            .map(|d| d.metadata.bands.min(4) as u8)
            .chain(spec.background_color.iter().map(|bg| bg.len() as u8))
            .max()
            .unwrap_or(1)
            .max(1);

        let compositor = TileCompositor {
            size_x,
            size_y,
            tile_width: spec.tile_width(),
            tile_height: spec.tile_height(),
            levels: pyramid_levels(size_x, size_y, spec.tile_width(), spec.tile_height()),
            background: spec.background_color.clone(),
            default_bands,
        };
        info!(
            size_x,
            size_y,
            levels = compositor.levels,
            frames = frame_index.frame_count(),
            sources = descriptors.len(),
            "opened composite"
        );

        Ok(CompositeSource {
            spec,
            descriptors,
            frame_index,
            compositor,
            cache,
            first_capabilities,
        })
    }

    pub fn frame_index(&self) -> &FrameIndex {
        &self.frame_index
    }

    pub fn descriptors(&self) -> &[SourceDescriptor] {
        &self.descriptors
    }

    fn frame(&self, frame: u32) -> Result<&crate::compose::frame_index::GlobalFrame, TileError> {
        self.frame_index
            .frames
            .get(frame as usize)
            .ok_or(TileError::FrameOutOfRange {
                frame,
                frames: self.frame_index.frame_count(),
            })
    }

    /// Assemble one output tile.
    pub async fn get_tile(
        &self,
        frame: u32,
        level: u32,
        x: u32,
        y: u32,
    ) -> Result<Tile, TileError> {
        let gframe = self.frame(frame)?;
        self.compositor
            .get_tile(gframe, &self.descriptors, &self.cache, x, y, level)
            .await
    }
}

#[async_trait]
impl TileSource for CompositeSource {
    fn metadata(&self) -> SourceMetadata {
        let frame_axes = if self.frame_index.axes_mode {
            Some(
                self.frame_index
                    .frames
                    .iter()
                    .map(|f| FrameAxes {
                        index_c: f.index_c.unwrap_or(0),
                        index_z: f.index_z.unwrap_or(0),
                        index_t: f.index_t.unwrap_or(0),
                        index_xy: f.index_xy.unwrap_or(0),
                    })
                    .collect(),
            )
        } else {
            None
        };
        let scale = self.spec.scale.as_ref();
        let first = self.descriptors.first().map(|d| &d.metadata);
        SourceMetadata {
            size_x: self.compositor.size_x,
            size_y: self.compositor.size_y,
            tile_width: self.compositor.tile_width,
            tile_height: self.compositor.tile_height,
            levels: self.compositor.levels,
            frames: self.frame_index.frame_count(),
            frame_axes,
            bands: self.compositor.default_bands as u32,
            channels: self.frame_index.channels.clone(),
            mm_x: scale
                .and_then(|s| s.mm_x)
                .or_else(|| first.and_then(|m| m.mm_x)),
            mm_y: scale
                .and_then(|s| s.mm_y)
                .or_else(|| first.and_then(|m| m.mm_y)),
            magnification: scale
                .and_then(|s| s.magnification)
                .or_else(|| first.and_then(|m| m.magnification)),
        }
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities {
            associated_images: self.first_capabilities.associated_images,
            styles: false,
        }
    }

    async fn read_region(&self, request: &RegionRequest) -> Result<PixelBuffer, TileError> {
        let gframe = self.frame(request.frame)?;
        self.compositor
            .compose_region(
                gframe,
                &self.descriptors,
                &self.cache,
                request.left,
                request.top,
                request.right,
                request.bottom,
                request.output_width,
                request.output_height,
            )
            .await
    }

    async fn associated_image_list(&self) -> Vec<String> {
        if !self.first_capabilities.associated_images {
            return Vec::new();
        }
        match self.first_source().await {
            Ok(source) => source.associated_image_list().await,
            Err(_) => Vec::new(),
        }
    }

    async fn associated_image(&self, key: &str) -> Option<PixelBuffer> {
        if !self.first_capabilities.associated_images {
            return None;
        }
        match self.first_source().await {
            Ok(source) => source.associated_image(key).await,
            Err(_) => None,
        }
    }

    fn internal_metadata(&self) -> serde_json::Value {
        json!({
            "name": self.spec.name,
            "description": self.spec.description,
            "axesMode": self.frame_index.axes_mode,
            "frames": self.frame_index.frame_count(),
            "channels": self.frame_index.channels,
            "sources": self.descriptors.iter().map(|d| {
                json!({
                    "path": d.path.display().to_string(),
                    "bbox": [d.bbox.left, d.bbox.top, d.bbox.right, d.bbox.bottom],
                    "frames": d.metadata.frames,
                    "bands": d.metadata.bands,
                })
            }).collect::<Vec<_>>(),
        })
    }
}

impl CompositeSource {
    async fn first_source(&self) -> Result<Arc<dyn TileSource>, OpenError> {
        let d = self
            .descriptors
            .first()
            .ok_or_else(|| OpenError::Config(ConfigError::Invalid {
                reason: "composite has no sources".into(),
            }))?;
        self.cache
            .get(&d.path, d.entry.source_name.as_deref(), d.entry.params.as_ref())
            .await
    }
}

// =============================================================================
// Opener
// =============================================================================

/// Opens composite description files (JSON).
///
/// The opener needs the shared [`SourceCache`] to open constituents, and the
/// cache needs a registry containing the opener; [`bind`](Self::bind) closes
/// the loop after both exist. [`standard_source_cache`] does the wiring.
///
// TODO: detect indirect composite cycles (A includes B includes A); today
// they hang on the in-flight open of the outer composite instead of failing.
#[derive(Default)]
pub struct CompositeOpener {
    cache: OnceLock<Arc<SourceCache>>,
}

impl CompositeOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the shared cache. Later calls are ignored.
    pub fn bind(&self, cache: Arc<SourceCache>) {
        let _ = self.cache.set(cache);
    }
}

#[async_trait]
impl SourceOpener for CompositeOpener {
    async fn open(
        &self,
        path: &Path,
        _params: Option<&serde_json::Value>,
    ) -> Result<Arc<dyn TileSource>, OpenError> {
        let spec = CompositeSpec::from_file(path)?;
        let cache = self
            .cache
            .get()
            .ok_or_else(|| {
                OpenError::Config(ConfigError::Invalid {
                    reason: "composite opener is not bound to a source cache".into(),
                })
            })?
            .clone();
        let source = CompositeSource::open(spec, Some(path), cache).await?;
        Ok(Arc::new(source))
    }
}

// =============================================================================
// Standard wiring
// =============================================================================

/// Build the standard source cache: composite descriptions first, plain
/// rasters as the generic fallback.
pub fn standard_source_cache(capacity: usize) -> Arc<SourceCache> {
    let composite = Arc::new(CompositeOpener::new());
    let registry = Arc::new(
        OpenerRegistryBuilder::new()
            .register("multi", composite.clone())
            .register(
                "raster",
                Arc::new(RasterOpener::new(DEFAULT_TILE_SIZE, DEFAULT_TILE_SIZE)),
            )
            .freeze(),
    );
    let cache = Arc::new(SourceCache::with_capacity(registry, capacity));
    composite.bind(cache.clone());
    cache
}

/// [`standard_source_cache`] with the default capacity.
pub fn default_source_cache() -> Arc<SourceCache> {
    standard_source_cache(DEFAULT_SOURCE_CACHE_CAPACITY)
}

// =============================================================================
// Tests
// =============================================================================
