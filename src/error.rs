use std::path::PathBuf;

use thiserror::Error;

/// Errors in the declarative composite configuration itself.
///
/// All of these are fatal at open time: a composite with a bad
/// configuration is never constructed, not even partially.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// The position transform matrix of a source is not invertible.
    #[error(
        "singular transform matrix for source {}: \
         [[{s11}, {s12}], [{s21}, {s22}]] has no inverse",
        path.display()
    )]
    SingularTransform {
        path: PathBuf,
        s11: f64,
        s12: f64,
        s21: f64,
        s22: f64,
    },

    /// A source entry resolves to the composite's own file.
    #[error("source {} refers to the composite itself", path.display())]
    SelfReference { path: PathBuf },

    /// A cross-field invariant of the configuration does not hold.
    #[error("invalid composite configuration: {reason}")]
    Invalid { reason: String },

    /// A source names a type for which no opener is registered.
    #[error("unknown source type: {name}")]
    UnknownSourceType { name: String },
}

/// Errors raised while constructing a composite.
///
/// There is no partial-success mode: any of these aborts construction
/// entirely and the composite does not exist afterwards.
#[derive(Debug, Clone, Error)]
pub enum OpenError {
    /// Bad configuration (singular matrix, self-reference, ...).
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A concrete source path does not resolve to an existing file.
    ///
    /// A pattern entry with zero matches is *not* this error; it simply
    /// contributes no descriptors.
    #[error("source not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    /// An eagerly-probed source could not be opened or read.
    #[error("failed to read source {}: {message}", path.display())]
    SourceRead { path: PathBuf, message: String },

    /// The composite description could not be parsed.
    #[error("failed to parse composite description: {0}")]
    Parse(String),
}

/// Errors raised while assembling a single tile.
///
/// These are scoped to the failing tile request; the composite itself
/// remains usable.
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// A lazily-opened source failed while fetching a sub-region.
    #[error("failed to read source {}: {message}", path.display())]
    SourceRead { path: PathBuf, message: String },

    /// A sheared or rotated source intersects the requested tile.
    ///
    /// Affine-warped resampling is deliberately not implemented; this
    /// error is permanent for the (tile, source) pair and is raised
    /// instead of silently mis-rendering.
    #[error(
        "source {} has a sheared or rotated transform; affine resampling is not implemented",
        path.display()
    )]
    UnimplementedTransform { path: PathBuf },

    /// Requested frame is outside the composite frame list.
    #[error("frame {frame} out of range: composite has {frames} frame(s)")]
    FrameOutOfRange { frame: u32, frames: u32 },

    /// Requested pyramid level does not exist.
    #[error("level {level} out of range: composite has {levels} level(s)")]
    LevelOutOfRange { level: u32, levels: u32 },

    /// Requested tile coordinates are outside the level's tile grid.
    #[error("tile ({x}, {y}) out of bounds at level {level}: grid is {max_x} x {max_y}")]
    TileOutOfBounds {
        level: u32,
        x: u32,
        y: u32,
        max_x: u32,
        max_y: u32,
    },

    /// A lazily-opened source failed to open for this tile.
    #[error(transparent)]
    Open(#[from] OpenError),

    /// Tile pixels could not be encoded for output.
    #[error("failed to encode tile: {0}")]
    Encode(String),
}
