//! The multi-source compositing engine.
//!
//! Construction runs once at open time: [`resolver`] expands declarative
//! entries into concrete descriptors, [`geometry`] places each source in
//! composite space, and [`frame_index`] builds the global frame list. The
//! results are immutable; [`compositor`] consumes them on every tile
//! request.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                open (once)                   │
//! │  resolver ──▶ geometry ──▶ frame_index       │
//! └──────────────────────┬───────────────────────┘
//!                        │ descriptors + index
//!                        ▼
//! ┌──────────────────────────────────────────────┐
//! │          compositor (per tile request)       │
//! └──────────────────────────────────────────────┘
//! ```

pub mod compositor;
pub mod frame_index;
pub mod geometry;
pub mod resolver;

use std::path::PathBuf;

use crate::config::SourceEntry;
use crate::source::provider::SourceMetadata;

use geometry::BoundingBox;

/// A fully resolved source: the per-match entry plus the fields computed at
/// open time. Immutable once the composite is constructed.
#[derive(Debug, Clone)]
pub struct SourceDescriptor {
    pub entry: SourceEntry,
    pub path: PathBuf,
    /// Occupied rectangle in composite space.
    pub bbox: BoundingBox,
    /// Metadata snapshot taken (or inherited) at probe time.
    pub metadata: SourceMetadata,
}
