//! Mosaic Tiler - inspect composites and render tiles from the command line.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mosaic_tiler::{
    config::{Cli, Command, CommonConfig, InspectConfig, TileConfig},
    standard_source_cache, SourceMetadata, TileSource,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Inspect(config) => run_inspect(config).await,
        Command::Tile(config) => run_tile(config).await,
    }
}

// =============================================================================
// Inspect Command
// =============================================================================

async fn run_inspect(config: InspectConfig) -> ExitCode {
    init_logging(config.common.verbose);

    let source = match open_source(&config.common).await {
        Ok(source) => source,
        Err(code) => return code,
    };

    let meta = source.metadata();
    let mut report = metadata_json(&meta);
    if config.sources {
        report["internal"] = source.internal_metadata();
    }
    match serde_json::to_string_pretty(&report) {
        Ok(text) => {
            println!("{text}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to serialize metadata: {}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Tile Command
// =============================================================================

async fn run_tile(config: TileConfig) -> ExitCode {
    init_logging(config.common.verbose);

    let source = match open_source(&config.common).await {
        Ok(source) => source,
        Err(code) => return code,
    };
    let meta = source.metadata();

    let level = config.level.unwrap_or(meta.levels - 1);
    if level >= meta.levels {
        error!("Level {} out of range (levels: {})", level, meta.levels);
        return ExitCode::FAILURE;
    }

    // Tile grid math in full-resolution coordinates.
    let scale = 1u64 << (meta.levels - 1 - level);
    let level_w = (meta.size_x as u64).div_ceil(scale) as u32;
    let level_h = (meta.size_y as u64).div_ceil(scale) as u32;
    let tiles_x = level_w.div_ceil(meta.tile_width).max(1);
    let tiles_y = level_h.div_ceil(meta.tile_height).max(1);
    if config.x >= tiles_x || config.y >= tiles_y {
        error!(
            "Tile ({}, {}) out of range (grid: {}x{})",
            config.x, config.y, tiles_x, tiles_y
        );
        return ExitCode::FAILURE;
    }

    let out_w = meta.tile_width.min(level_w - config.x * meta.tile_width);
    let out_h = meta.tile_height.min(level_h - config.y * meta.tile_height);
    let left = config.x as f64 * meta.tile_width as f64 * scale as f64;
    let top = config.y as f64 * meta.tile_height as f64 * scale as f64;

    let region = source
        .read_region(&mosaic_tiler::RegionRequest {
            left,
            top,
            right: left + out_w as f64 * scale as f64,
            bottom: top + out_h as f64 * scale as f64,
            output_width: out_w,
            output_height: out_h,
            frame: config.frame,
            style: None,
        })
        .await;
    let region = match region {
        Ok(region) => region,
        Err(e) => {
            error!("Failed to render tile: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let png = match region.to_png() {
        Ok(png) => png,
        Err(e) => {
            error!("Failed to encode tile: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = std::fs::write(&config.output, &png) {
        error!("Failed to write {}: {}", config.output.display(), e);
        return ExitCode::FAILURE;
    }
    info!(
        "Wrote {}x{} tile (frame {}, level {}, {}, {}) to {}",
        out_w,
        out_h,
        config.frame,
        level,
        config.x,
        config.y,
        config.output.display()
    );
    ExitCode::SUCCESS
}

// =============================================================================
// Helpers
// =============================================================================

async fn open_source(common: &CommonConfig) -> Result<Arc<dyn TileSource>, ExitCode> {
    let cache = standard_source_cache(common.cache_sources);
    match cache.get(&common.path, None, None).await {
        Ok(source) => Ok(source),
        Err(e) => {
            error!("Failed to open {}: {}", common.path.display(), e);
            Err(ExitCode::FAILURE)
        }
    }
}

fn metadata_json(meta: &SourceMetadata) -> serde_json::Value {
    json!({
        "sizeX": meta.size_x,
        "sizeY": meta.size_y,
        "tileWidth": meta.tile_width,
        "tileHeight": meta.tile_height,
        "levels": meta.levels,
        "frames": meta.frames,
        "bands": meta.bands,
        "channels": meta.channels,
        "mm_x": meta.mm_x,
        "mm_y": meta.mm_y,
        "magnification": meta.magnification,
        "frameAxes": meta.frame_axes.as_ref().map(|axes| {
            axes.iter()
                .map(|a| json!({
                    "indexC": a.index_c,
                    "indexZ": a.index_z,
                    "indexT": a.index_t,
                    "indexXY": a.index_xy,
                }))
                .collect::<Vec<_>>()
        }),
    })
}

fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "mosaic_tiler=debug"
    } else {
        "mosaic_tiler=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
