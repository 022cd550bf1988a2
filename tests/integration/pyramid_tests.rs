//! Pyramid math and tile retrieval tests.
//!
//! Tests verify:
//! - Level counts derived from the composite extent and tile size
//! - Tile content at full and downsampled resolution
//! - Partial edge tiles
//! - Out-of-range levels, tiles, and frames

use serde_json::json;
use tempfile::TempDir;

use mosaic_tiler::{CompositeSource, CompositeSpec, TileError, TileSource};

use super::test_utils::{solid_png, write_spec};

async fn open_composite(path: &std::path::Path) -> CompositeSource {
    let spec = CompositeSpec::from_file(path).unwrap();
    CompositeSource::open(spec, Some(path), mosaic_tiler::default_source_cache())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_level_count_from_extent() {
    let dir = TempDir::new().unwrap();
    solid_png(&dir, "a.png", 100, 100, 1);
    let spec = write_spec(
        &dir,
        "multi.json",
        json!({
            "width": 1024,
            "height": 1024,
            "sources": [{"path": "a.png"}]
        }),
    );

    let composite = open_composite(&spec).await;
    // 1024 -> 512 -> 256: three levels at tile size 256.
    assert_eq!(composite.metadata().levels, 3);
}

#[tokio::test]
async fn test_full_resolution_tile_content() {
    let dir = TempDir::new().unwrap();
    solid_png(&dir, "a.png", 300, 200, 123);
    let spec = write_spec(
        &dir,
        "multi.json",
        json!({"tileWidth": 256, "tileHeight": 256, "sources": [{"path": "a.png"}]}),
    );

    let composite = open_composite(&spec).await;
    let meta = composite.metadata();
    assert_eq!(meta.levels, 2);

    let tile = composite.get_tile(0, meta.levels - 1, 0, 0).await.unwrap();
    assert_eq!(tile.pixels.width(), 256);
    assert_eq!(tile.pixels.height(), 200);
    assert_eq!(tile.pixels.pixel(100, 100), &[123]);
}

#[tokio::test]
async fn test_edge_tile_is_partial() {
    let dir = TempDir::new().unwrap();
    solid_png(&dir, "a.png", 300, 200, 9);
    let spec = write_spec(
        &dir,
        "multi.json",
        json!({"sources": [{"path": "a.png"}]}),
    );

    let composite = open_composite(&spec).await;
    let level = composite.metadata().levels - 1;
    // Grid at full resolution is 2x1; the right tile is 44 wide.
    let tile = composite.get_tile(0, level, 1, 0).await.unwrap();
    assert_eq!(tile.pixels.width(), 44);
    assert_eq!(tile.pixels.height(), 200);
}

#[tokio::test]
async fn test_downsampled_tile_covers_whole_extent() {
    let dir = TempDir::new().unwrap();
    solid_png(&dir, "a.png", 300, 200, 55);
    let spec = write_spec(
        &dir,
        "multi.json",
        json!({"sources": [{"path": "a.png"}]}),
    );

    let composite = open_composite(&spec).await;
    // Level 0 halves 300x200 to 150x100, one tile.
    let tile = composite.get_tile(0, 0, 0, 0).await.unwrap();
    assert_eq!(tile.pixels.width(), 150);
    assert_eq!(tile.pixels.height(), 100);
    assert_eq!(tile.pixels.pixel(75, 50), &[55]);
}

#[tokio::test]
async fn test_out_of_range_requests() {
    let dir = TempDir::new().unwrap();
    solid_png(&dir, "a.png", 64, 64, 1);
    let spec = write_spec(
        &dir,
        "multi.json",
        json!({"sources": [{"path": "a.png"}]}),
    );

    let composite = open_composite(&spec).await;

    let err = composite.get_tile(0, 5, 0, 0).await.unwrap_err();
    assert!(matches!(err, TileError::LevelOutOfRange { .. }));

    let err = composite.get_tile(0, 0, 3, 0).await.unwrap_err();
    assert!(matches!(err, TileError::TileOutOfBounds { .. }));

    let err = composite.get_tile(7, 0, 0, 0).await.unwrap_err();
    assert!(matches!(err, TileError::FrameOutOfRange { .. }));
}

#[tokio::test]
async fn test_tile_encodes_to_png() {
    let dir = TempDir::new().unwrap();
    solid_png(&dir, "a.png", 64, 64, 200);
    let spec = write_spec(
        &dir,
        "multi.json",
        json!({"sources": [{"path": "a.png"}]}),
    );

    let composite = open_composite(&spec).await;
    let tile = composite.get_tile(0, 0, 0, 0).await.unwrap();
    let png = tile.pixels.to_png().unwrap();
    // PNG signature.
    assert_eq!(&png[..8], &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n']);
}
