//! Source access layer: the capability contract every pixel source
//! implements, the opener registry that auto-detects formats, the shared
//! LRU of open sources, and the plain raster adapter.

pub mod cache;
pub mod provider;
pub mod raster;
pub mod registry;

pub use cache::SourceCache;
pub use provider::{RegionRequest, SourceMetadata, SourceOpener, TileSource};
pub use registry::{OpenerRegistry, OpenerRegistryBuilder};
