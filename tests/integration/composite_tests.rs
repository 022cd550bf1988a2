//! End-to-end composite assembly tests.
//!
//! Tests verify:
//! - A single-source composite reproduces the source exactly
//! - Placement, overlap overwrite, crop, and scale semantics
//! - Background fill and band promotion across mixed sources
//! - Composites nested inside composites

use serde_json::json;
use tempfile::TempDir;

use super::test_utils::{gradient_png, gradient_value, open, read_full, solid_png, write_spec};

// =============================================================================
// Identity and Placement
// =============================================================================

#[tokio::test]
async fn test_single_source_composite_reproduces_source() {
    let dir = TempDir::new().unwrap();
    let png = gradient_png(&dir, "a.png", 60, 45);
    let spec = write_spec(&dir, "multi.json", json!({"sources": [{"path": "a.png"}]}));

    let composite = open(&spec).await;
    let direct = open(&png).await;

    assert_eq!(composite.metadata().size_x, direct.metadata().size_x);
    assert_eq!(composite.metadata().size_y, direct.metadata().size_y);
    assert_eq!(read_full(&composite, 0).await, read_full(&direct, 0).await);
}

#[tokio::test]
async fn test_side_by_side_mosaic() {
    let dir = TempDir::new().unwrap();
    solid_png(&dir, "left.png", 32, 32, 40);
    solid_png(&dir, "right.png", 32, 32, 80);
    let spec = write_spec(
        &dir,
        "multi.json",
        json!({
            "uniformSources": false,
            "sources": [
                {"path": "left.png", "frameSet": 0},
                {"path": "right.png", "frameSet": 0, "position": {"x": 32}}
            ]
        }),
    );

    let composite = open(&spec).await;
    let meta = composite.metadata();
    assert_eq!((meta.size_x, meta.size_y), (64, 32));
    assert_eq!(meta.frames, 1);

    let region = read_full(&composite, 0).await;
    assert_eq!(region.pixel(10, 10), &[40]);
    assert_eq!(region.pixel(50, 10), &[80]);
}

#[tokio::test]
async fn test_overlapping_sources_last_wins() {
    let dir = TempDir::new().unwrap();
    solid_png(&dir, "under.png", 48, 48, 10);
    solid_png(&dir, "over.png", 16, 16, 250);
    let spec = write_spec(
        &dir,
        "multi.json",
        json!({
            "uniformSources": false,
            "sources": [
                {"path": "under.png", "frameSet": 0},
                {"path": "over.png", "frameSet": 0, "position": {"x": 16, "y": 16}}
            ]
        }),
    );

    let region = read_full(&open(&spec).await, 0).await;
    assert_eq!(region.pixel(4, 4), &[10]);
    assert_eq!(region.pixel(24, 24), &[250]);
    assert_eq!(region.pixel(44, 44), &[10]);
}

#[tokio::test]
async fn test_crop_keeps_source_pixels_in_place() {
    let dir = TempDir::new().unwrap();
    gradient_png(&dir, "a.png", 32, 32);
    let spec = write_spec(
        &dir,
        "multi.json",
        json!({
            "width": 32,
            "height": 32,
            "sources": [{
                "path": "a.png",
                "position": {"crop": {"left": 8, "top": 8, "right": 24, "bottom": 24}}
            }]
        }),
    );

    let region = read_full(&open(&spec).await, 0).await;
    // Inside the crop the source shows through at its original location.
    assert_eq!(region.pixel(12, 12), &[gradient_value(12, 12)]);
    // Outside the crop nothing was drawn.
    assert_eq!(region.pixel(2, 2), &[0]);
    assert_eq!(region.pixel(30, 30), &[0]);
}

#[tokio::test]
async fn test_scaled_placement() {
    let dir = TempDir::new().unwrap();
    solid_png(&dir, "a.png", 8, 8, 66);
    let spec = write_spec(
        &dir,
        "multi.json",
        json!({"sources": [{"path": "a.png", "position": {"scale": 4}}]}),
    );

    let composite = open(&spec).await;
    let meta = composite.metadata();
    assert_eq!((meta.size_x, meta.size_y), (32, 32));

    let region = read_full(&composite, 0).await;
    assert_eq!(region.pixel(0, 0), &[66]);
    assert_eq!(region.pixel(31, 31), &[66]);
}

#[tokio::test]
async fn test_partial_coverage_keeps_requested_size() {
    // No background, one small source at the origin of a larger canvas.
    // The returned region must still span the declared extent.
    let dir = TempDir::new().unwrap();
    solid_png(&dir, "a.png", 16, 16, 130);
    let spec = write_spec(
        &dir,
        "multi.json",
        json!({"width": 64, "height": 64, "sources": [{"path": "a.png"}]}),
    );

    let region = read_full(&open(&spec).await, 0).await;
    assert_eq!((region.width(), region.height()), (64, 64));
    assert_eq!(region.pixel(4, 4), &[130]);
    assert_eq!(region.pixel(40, 40), &[0]);
}

// =============================================================================
// Background and Bands
// =============================================================================

#[tokio::test]
async fn test_background_fills_uncovered_area() {
    let dir = TempDir::new().unwrap();
    solid_png(&dir, "a.png", 16, 16, 100);
    let spec = write_spec(
        &dir,
        "multi.json",
        json!({
            "width": 48,
            "height": 48,
            "backgroundColor": [1, 2, 3],
            "sources": [{"path": "a.png"}]
        }),
    );

    let region = read_full(&open(&spec).await, 0).await;
    assert_eq!(&region.pixel(40, 40)[..3], &[1, 2, 3]);
    assert_eq!(&region.pixel(5, 5)[..3], &[100, 100, 100]);
}

#[tokio::test]
async fn test_mixed_band_sources_promote() {
    let dir = TempDir::new().unwrap();
    solid_png(&dir, "gray.png", 32, 32, 50);
    let rgb = image::RgbImage::from_pixel(16, 16, image::Rgb([200, 100, 0]));
    rgb.save(dir.path().join("rgb.png")).unwrap();
    let spec = write_spec(
        &dir,
        "multi.json",
        json!({
            "uniformSources": false,
            "sources": [
                {"path": "gray.png", "frameSet": 0},
                {"path": "rgb.png", "frameSet": 0, "position": {"x": 8, "y": 8}}
            ]
        }),
    );

    let region = read_full(&open(&spec).await, 0).await;
    assert!(region.bands() >= 3);
    assert_eq!(&region.pixel(2, 2)[..3], &[50, 50, 50]);
    assert_eq!(&region.pixel(12, 12)[..3], &[200, 100, 0]);
}

// =============================================================================
// Frames and Channels
// =============================================================================

#[tokio::test]
async fn test_channel_sources_become_frames() {
    let dir = TempDir::new().unwrap();
    solid_png(&dir, "dapi.png", 24, 24, 30);
    solid_png(&dir, "gfp.png", 24, 24, 90);
    let spec = write_spec(
        &dir,
        "multi.json",
        json!({
            "sources": [
                {"path": "dapi.png", "channel": "DAPI"},
                {"path": "gfp.png", "channel": "GFP"}
            ]
        }),
    );

    let composite = open(&spec).await;
    let meta = composite.metadata();
    assert_eq!(meta.frames, 2);
    assert_eq!(meta.channels, vec!["DAPI", "GFP"]);

    assert_eq!(read_full(&composite, 0).await.pixel(5, 5), &[30]);
    assert_eq!(read_full(&composite, 1).await.pixel(5, 5), &[90]);
}

#[tokio::test]
async fn test_z_stack_enumeration() {
    let dir = TempDir::new().unwrap();
    for z in 0..3u8 {
        solid_png(&dir, &format!("z{z}.png"), 16, 16, 10 * (z + 1));
    }
    let spec = write_spec(
        &dir,
        "multi.json",
        json!({
            "sources": [
                {"path": "z0.png", "zSet": 0},
                {"path": "z1.png", "zSet": 1},
                {"path": "z2.png", "zSet": 2}
            ]
        }),
    );

    let composite = open(&spec).await;
    let meta = composite.metadata();
    assert_eq!(meta.frames, 3);
    let axes = meta.frame_axes.unwrap();
    assert_eq!(axes[2].index_z, 2);
    assert_eq!(read_full(&composite, 2).await.pixel(0, 0), &[30]);
}

// =============================================================================
// Nesting
// =============================================================================

#[tokio::test]
async fn test_nested_composite_placement() {
    let dir = TempDir::new().unwrap();
    solid_png(&dir, "a.png", 16, 16, 70);
    write_spec(
        &dir,
        "inner.json",
        json!({
            "width": 24,
            "height": 24,
            "backgroundColor": [5],
            "sources": [{"path": "a.png", "position": {"x": 4, "y": 4}}]
        }),
    );
    let outer = write_spec(
        &dir,
        "outer.json",
        json!({
            "width": 48,
            "height": 48,
            "sources": [{"path": "inner.json", "position": {"x": 12, "y": 12}}]
        }),
    );

    let region = read_full(&open(&outer).await, 0).await;
    // Outside the inner composite: nothing drawn.
    assert_eq!(region.pixel(2, 2), &[0]);
    // Inner background band.
    assert_eq!(region.pixel(13, 13), &[5]);
    // The doubly translated source.
    assert_eq!(region.pixel(20, 20), &[70]);
}
