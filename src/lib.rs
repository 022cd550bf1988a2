//! # Mosaic Tiler
//!
//! A multi-source compositing tile engine.
//!
//! A composite is described declaratively: a list of sources, each with an
//! optional geometric placement and a position along the c/z/t/xy frame
//! axes. The engine resolves the description into concrete sources, builds a
//! global frame index, and serves pyramidal tiles by fetching and merging
//! sub-regions from the constituents on demand. A composite is itself a
//! source, so composites nest.
//!
//! ## Architecture
//!
//! - [`config`] - declarative composite descriptions and CLI types
//! - [`source`] - the source contract, opener registry, cache, and the
//!   plain raster adapter
//! - [`compose`] - entry resolution, geometry, frame index, and the
//!   per-tile compositor
//! - [`composite`] - the composite source itself and the standard wiring
//! - [`pixel`] - interleaved 8-bit pixel buffers and band merging
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use mosaic_tiler::default_source_cache;
//!
//! #[tokio::main]
//! async fn main() {
//!     let cache = default_source_cache();
//!     let source = cache
//!         .get(Path::new("composite.json"), None, None)
//!         .await
//!         .unwrap();
//!     let meta = source.metadata();
//!     println!("{}x{}, {} frames", meta.size_x, meta.size_y, meta.frames);
//! }
//! ```

pub mod compose;
pub mod composite;
pub mod config;
pub mod error;
pub mod pixel;
pub mod source;

// Re-export commonly used types
pub use compose::compositor::{Tile, TileCompositor};
pub use compose::frame_index::{FrameIndex, GlobalFrame, SourceContribution};
pub use compose::geometry::{pyramid_levels, Affine, BoundingBox};
pub use compose::SourceDescriptor;
pub use composite::{
    default_source_cache, standard_source_cache, CompositeOpener, CompositeSource,
};
pub use config::{Cli, Command, CompositeSpec, Position, SourceEntry, DEFAULT_TILE_SIZE};
pub use error::{ConfigError, OpenError, TileError};
pub use pixel::PixelBuffer;
pub use source::cache::{SourceCache, DEFAULT_SOURCE_CACHE_CAPACITY};
pub use source::provider::{
    FrameAxes, RegionRequest, SourceCapabilities, SourceMetadata, SourceOpener, TileSource,
};
pub use source::raster::RasterOpener;
pub use source::registry::{OpenerRegistry, OpenerRegistryBuilder};
