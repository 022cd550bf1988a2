//! Declarative composite descriptions.
//!
//! A composite is described by a JSON document (schema validation is the
//! caller's concern; the engine re-checks the cross-field invariants it
//! depends on itself). Recognized top-level keys:
//!
//! - `name`, `description` - informational
//! - `width`, `height` - explicit composite size (otherwise derived from the
//!   source bounding boxes)
//! - `tileWidth`, `tileHeight` - output tile size (default 256)
//! - `channels` - seed list of global channel names
//! - `scale` - `mm_x` / `mm_y` / `magnification` overrides
//! - `backgroundColor` - 1-4 band fill color for uncovered tile area
//! - `basePath` - directory source paths resolve against
//! - `uniformSources` - sources are assumed alike after probing the first two
//! - `sources[]` - the source entries themselves
//!
//! # Example
//!
//! ```
//! use mosaic_tiler::config::CompositeSpec;
//!
//! let spec: CompositeSpec = serde_json::from_str(
//!     r#"{
//!         "sources": [
//!             {"path": "left.png"},
//!             {"path": "right.png", "position": {"x": 1000}}
//!         ]
//!     }"#,
//! )
//! .unwrap();
//! assert_eq!(spec.sources.len(), 2);
//! assert!(spec.uniform_sources);
//! ```

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use crate::error::{ConfigError, OpenError};
use crate::source::cache::DEFAULT_SOURCE_CACHE_CAPACITY;

/// Default output tile edge in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 256;

// =============================================================================
// Axes
// =============================================================================

/// The frame-index axes a source entry can address.
///
/// `Frame` addresses the sequential frame number directly; the others are
/// the multi-dimensional axes of the global index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Frame,
    C,
    Z,
    T,
    XY,
}

impl Axis {
    /// The four positional axes, innermost (fastest-changing) first.
    pub const POSITIONAL: [Axis; 4] = [Axis::C, Axis::Z, Axis::T, Axis::XY];

    pub fn name(&self) -> &'static str {
        match self {
            Axis::Frame => "frame",
            Axis::C => "c",
            Axis::Z => "z",
            Axis::T => "t",
            Axis::XY => "xy",
        }
    }

    /// Parse an axis name, as used in regex capture group names.
    pub fn from_name(name: &str) -> Option<Axis> {
        match name {
            "frame" => Some(Axis::Frame),
            "c" => Some(Axis::C),
            "z" => Some(Axis::Z),
            "t" => Some(Axis::T),
            "xy" => Some(Axis::XY),
            _ => None,
        }
    }
}

// =============================================================================
// Composite description
// =============================================================================

/// Scale / resolution hints for the composite.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ScaleSpec {
    pub mm_x: Option<f64>,
    pub mm_y: Option<f64>,
    pub magnification: Option<f64>,
}

/// A full declarative composite description.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompositeSpec {
    pub name: Option<String>,
    pub description: Option<String>,

    /// Explicit composite width; wins over the derived bounding-box extent.
    pub width: Option<u32>,
    /// Explicit composite height; wins over the derived bounding-box extent.
    pub height: Option<u32>,

    pub tile_width: Option<u32>,
    pub tile_height: Option<u32>,

    /// Seed list of global channel names.
    pub channels: Vec<String>,

    pub scale: Option<ScaleSpec>,

    /// Fill color for tile area no source covers (1-4 bands).
    pub background_color: Option<Vec<u8>>,

    /// Directory that relative source paths resolve against. Defaults to the
    /// directory containing the composite description file.
    pub base_path: Option<PathBuf>,

    /// When true, only the first two sources are probed eagerly; the rest
    /// inherit the first source's metadata snapshot if those two agree.
    pub uniform_sources: bool,

    pub sources: Vec<SourceEntry>,
}

impl Default for CompositeSpec {
    fn default() -> Self {
        Self {
            name: None,
            description: None,
            width: None,
            height: None,
            tile_width: None,
            tile_height: None,
            channels: Vec::new(),
            scale: None,
            background_color: None,
            base_path: None,
            uniform_sources: true,
            sources: Vec::new(),
        }
    }
}

impl CompositeSpec {
    /// Parse a composite description from JSON text.
    pub fn from_json(text: &str) -> Result<Self, OpenError> {
        serde_json::from_str(text).map_err(|e| OpenError::Parse(e.to_string()))
    }

    /// Read and parse a composite description file.
    pub fn from_file(path: &Path) -> Result<Self, OpenError> {
        let text = std::fs::read_to_string(path).map_err(|e| OpenError::SourceRead {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_json(&text)
    }

    pub fn tile_width(&self) -> u32 {
        self.tile_width.unwrap_or(DEFAULT_TILE_SIZE)
    }

    pub fn tile_height(&self) -> u32 {
        self.tile_height.unwrap_or(DEFAULT_TILE_SIZE)
    }

    /// Check the cross-field invariants the engine depends on.
    ///
    /// External schema validation may or may not have run; these checks are
    /// performed unconditionally at open time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(color) = &self.background_color {
            if color.is_empty() || color.len() > 4 {
                return Err(ConfigError::Invalid {
                    reason: format!(
                        "backgroundColor must have 1-4 bands, got {}",
                        color.len()
                    ),
                });
            }
        }
        if self.tile_width() == 0 || self.tile_height() == 0 {
            return Err(ConfigError::Invalid {
                reason: "tileWidth and tileHeight must be non-zero".to_string(),
            });
        }
        if self.width == Some(0) || self.height == Some(0) {
            return Err(ConfigError::Invalid {
                reason: "explicit width and height must be non-zero".to_string(),
            });
        }
        if self.sources.is_empty() && (self.width.is_none() || self.height.is_none()) {
            return Err(ConfigError::Invalid {
                reason: "a composite without sources needs explicit width and height"
                    .to_string(),
            });
        }
        for (i, entry) in self.sources.iter().enumerate() {
            match (&entry.path, &entry.path_pattern) {
                (Some(_), Some(_)) => {
                    return Err(ConfigError::Invalid {
                        reason: format!(
                            "source {i} has both path and pathPattern; exactly one is allowed"
                        ),
                    });
                }
                (None, None) => {
                    return Err(ConfigError::Invalid {
                        reason: format!("source {i} has neither path nor pathPattern"),
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }
}

// =============================================================================
// Source entries
// =============================================================================

/// Crop rectangle in source-local coordinates. Missing edges default to the
/// full source extent.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CropSpec {
    pub left: Option<f64>,
    pub top: Option<f64>,
    pub right: Option<f64>,
    pub bottom: Option<f64>,
}

/// Geometric placement of a source in composite space.
///
/// The effective 2x2 matrix is `[[s11, s12], [s21, s22]] * scale`, applied to
/// the (cropped) source corners, followed by the `(x, y)` translation.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub s11: f64,
    pub s12: f64,
    pub s21: f64,
    pub s22: f64,
    pub scale: f64,
    pub crop: Option<CropSpec>,
}

impl Default for Position {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            s11: 1.0,
            s12: 0.0,
            s21: 0.0,
            s22: 1.0,
            scale: 1.0,
            crop: None,
        }
    }
}

/// One declarative source entry.
///
/// Exactly one of `path` and `path_pattern` must be present. Axis fields come
/// in four flavors per axis: a flat offset (`z`), a hard override (`zSet`),
/// an explicit value sequence (`zValues`) and a per-match stride for pattern
/// entries (`zStep`).
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceEntry {
    pub path: Option<PathBuf>,
    /// Regex over file names in the entry's directory; named capture groups
    /// populate axis fields per match.
    pub path_pattern: Option<String>,

    /// Explicit source-type hint (opener name); otherwise auto-detected.
    pub source_name: Option<String>,

    pub frame: Option<i64>,
    pub c: Option<i64>,
    pub z: Option<i64>,
    pub t: Option<i64>,
    pub xy: Option<i64>,

    pub frame_set: Option<i64>,
    pub c_set: Option<i64>,
    pub z_set: Option<i64>,
    pub t_set: Option<i64>,
    pub xy_set: Option<i64>,

    pub frame_values: Option<Vec<i64>>,
    pub c_values: Option<Vec<i64>>,
    pub z_values: Option<Vec<i64>>,
    pub t_values: Option<Vec<i64>>,
    pub xy_values: Option<Vec<i64>>,

    pub frame_step: Option<i64>,
    pub c_step: Option<i64>,
    pub z_step: Option<i64>,
    pub t_step: Option<i64>,
    pub xy_step: Option<i64>,

    /// Channel name for all of this source's frames.
    pub channel: Option<String>,
    /// Channel names indexed by the source's local channel index.
    pub channels: Option<Vec<String>>,

    pub position: Option<Position>,

    /// Opaque options handed to the opener.
    pub params: Option<serde_json::Value>,
    /// Opaque per-fetch options forwarded with every sub-region request.
    pub style: Option<serde_json::Value>,
}

impl SourceEntry {
    pub fn axis_offset(&self, axis: Axis) -> Option<i64> {
        match axis {
            Axis::Frame => self.frame,
            Axis::C => self.c,
            Axis::Z => self.z,
            Axis::T => self.t,
            Axis::XY => self.xy,
        }
    }

    pub fn set_axis_offset(&mut self, axis: Axis, value: i64) {
        match axis {
            Axis::Frame => self.frame = Some(value),
            Axis::C => self.c = Some(value),
            Axis::Z => self.z = Some(value),
            Axis::T => self.t = Some(value),
            Axis::XY => self.xy = Some(value),
        }
    }

    pub fn axis_set(&self, axis: Axis) -> Option<i64> {
        match axis {
            Axis::Frame => self.frame_set,
            Axis::C => self.c_set,
            Axis::Z => self.z_set,
            Axis::T => self.t_set,
            Axis::XY => self.xy_set,
        }
    }

    pub fn axis_values(&self, axis: Axis) -> Option<&Vec<i64>> {
        match axis {
            Axis::Frame => self.frame_values.as_ref(),
            Axis::C => self.c_values.as_ref(),
            Axis::Z => self.z_values.as_ref(),
            Axis::T => self.t_values.as_ref(),
            Axis::XY => self.xy_values.as_ref(),
        }
    }

    pub fn axis_values_mut(&mut self, axis: Axis) -> Option<&mut Vec<i64>> {
        match axis {
            Axis::Frame => self.frame_values.as_mut(),
            Axis::C => self.c_values.as_mut(),
            Axis::Z => self.z_values.as_mut(),
            Axis::T => self.t_values.as_mut(),
            Axis::XY => self.xy_values.as_mut(),
        }
    }

    pub fn axis_step(&self, axis: Axis) -> Option<i64> {
        match axis {
            Axis::Frame => self.frame_step,
            Axis::C => self.c_step,
            Axis::Z => self.z_step,
            Axis::T => self.t_step,
            Axis::XY => self.xy_step,
        }
    }

    /// Whether any axis placement is configured at all.
    ///
    /// Entries with no axis configuration are auto-assigned the next unused
    /// frame / z slot during index construction.
    pub fn has_axis_config(&self) -> bool {
        [Axis::Frame, Axis::C, Axis::Z, Axis::T, Axis::XY]
            .iter()
            .any(|&axis| {
                self.axis_offset(axis).is_some()
                    || self.axis_set(axis).is_some()
                    || self.axis_values(axis).is_some()
            })
    }
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// Mosaic Tiler - a multi-source compositing tile engine.
///
/// Assembles pyramidal tiles from declarative composites of image files,
/// including composites of composites.
#[derive(Parser, Debug, Clone)]
#[command(name = "mosaic-tiler")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the metadata of a composite or image file as JSON.
    Inspect(InspectConfig),
    /// Render one tile to a PNG file.
    Tile(TileConfig),
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct CommonConfig {
    /// Composite description or image file to open.
    pub path: PathBuf,

    /// Number of open sources kept in memory.
    #[arg(long, default_value_t = DEFAULT_SOURCE_CACHE_CAPACITY, env = "MOSAIC_CACHE_SOURCES")]
    pub cache_sources: usize,

    /// Enable debug logging.
    #[arg(short, long, env = "MOSAIC_VERBOSE")]
    pub verbose: bool,
}

#[derive(Args, Debug, Clone)]
pub struct InspectConfig {
    #[command(flatten)]
    pub common: CommonConfig,

    /// Include per-source diagnostics.
    #[arg(long)]
    pub sources: bool,
}

#[derive(Args, Debug, Clone)]
pub struct TileConfig {
    #[command(flatten)]
    pub common: CommonConfig,

    /// Frame to render.
    #[arg(long, default_value_t = 0)]
    pub frame: u32,

    /// Pyramid level; defaults to the most detailed level.
    #[arg(long)]
    pub level: Option<u32>,

    /// Tile column.
    #[arg(short, default_value_t = 0)]
    pub x: u32,

    /// Tile row.
    #[arg(short, default_value_t = 0)]
    pub y: u32,

    /// Output PNG path.
    #[arg(short, long, default_value = "tile.png")]
    pub output: PathBuf,
}

// =============================================================================
// Tests
// =============================================================================
