//! Test utilities for integration tests.
//!
//! Helpers for writing PNG fixtures and composite description files into a
//! temp directory and opening them through the standard source cache.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{GrayImage, Luma};
use tempfile::TempDir;

use mosaic_tiler::{default_source_cache, PixelBuffer, RegionRequest, TileSource};

/// Write a solid grayscale PNG.
pub fn solid_png(dir: &TempDir, name: &str, width: u32, height: u32, value: u8) -> PathBuf {
    let img = GrayImage::from_pixel(width, height, Luma([value]));
    let path = dir.path().join(name);
    img.save(&path).unwrap();
    path
}

/// Write a grayscale PNG with a deterministic gradient so offsets show up in
/// pixel values.
pub fn gradient_png(dir: &TempDir, name: &str, width: u32, height: u32) -> PathBuf {
    let img = GrayImage::from_fn(width, height, |x, y| Luma([gradient_value(x, y)]));
    let path = dir.path().join(name);
    img.save(&path).unwrap();
    path
}

pub fn gradient_value(x: u32, y: u32) -> u8 {
    ((x * 7 + y * 13) % 251) as u8
}

/// Write a composite description file.
pub fn write_spec(dir: &TempDir, name: &str, spec: serde_json::Value) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, serde_json::to_string_pretty(&spec).unwrap()).unwrap();
    path
}

/// Open any file through a fresh standard source cache.
pub async fn open(path: &Path) -> Arc<dyn TileSource> {
    default_source_cache().get(path, None, None).await.unwrap()
}

/// Read the full extent of a source at native resolution, for one frame.
pub async fn read_full(source: &Arc<dyn TileSource>, frame: u32) -> PixelBuffer {
    let meta = source.metadata();
    source
        .read_region(&RegionRequest {
            left: 0.0,
            top: 0.0,
            right: meta.size_x as f64,
            bottom: meta.size_y as f64,
            output_width: meta.size_x,
            output_height: meta.size_y,
            frame,
            style: None,
        })
        .await
        .unwrap()
}
