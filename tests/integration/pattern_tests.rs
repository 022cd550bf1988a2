//! Pattern-based source expansion, end to end.
//!
//! Tests verify:
//! - Capture groups drive frame placement
//! - Lexicographic match ordering is observable in the frame order
//! - basePath redirects resolution

use serde_json::json;
use tempfile::TempDir;

use super::test_utils::{open, read_full, solid_png, write_spec};

#[tokio::test]
async fn test_z_captures_build_a_stack() {
    let dir = TempDir::new().unwrap();
    for z in 1..=3u8 {
        solid_png(&dir, &format!("scan_{z}.png"), 16, 16, 10 * z);
    }
    // One-based capture: scan_1 lands at z=0.
    let spec = write_spec(
        &dir,
        "multi.json",
        json!({"sources": [{"pathPattern": "scan_(?<z1>\\d+)\\.png"}]}),
    );

    let composite = open(&spec).await;
    let meta = composite.metadata();
    assert_eq!(meta.frames, 3);
    for z in 0..3u32 {
        assert_eq!(
            read_full(&composite, z).await.pixel(0, 0),
            &[10 * (z as u8 + 1)]
        );
    }
}

#[tokio::test]
async fn test_lexicographic_order_without_captures() {
    let dir = TempDir::new().unwrap();
    solid_png(&dir, "b_1.png", 8, 8, 1);
    solid_png(&dir, "b_2.png", 8, 8, 2);
    solid_png(&dir, "b_10.png", 8, 8, 10);
    let spec = write_spec(
        &dir,
        "multi.json",
        json!({"sources": [{"pathPattern": "b_\\d+\\.png"}]}),
    );

    let composite = open(&spec).await;
    assert_eq!(composite.metadata().frames, 3);
    // Filename string order: b_1, b_10, b_2.
    assert_eq!(read_full(&composite, 0).await.pixel(0, 0), &[1]);
    assert_eq!(read_full(&composite, 1).await.pixel(0, 0), &[10]);
    assert_eq!(read_full(&composite, 2).await.pixel(0, 0), &[2]);
}

#[tokio::test]
async fn test_base_path_redirects_sources() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("data")).unwrap();
    let img = image::GrayImage::from_pixel(8, 8, image::Luma([42]));
    img.save(dir.path().join("data/a.png")).unwrap();

    let spec = write_spec(
        &dir,
        "multi.json",
        json!({"basePath": "data", "sources": [{"path": "a.png"}]}),
    );

    let composite = open(&spec).await;
    assert_eq!(read_full(&composite, 0).await.pixel(0, 0), &[42]);
}

#[tokio::test]
async fn test_pattern_with_no_matches_yields_background_frame() {
    let dir = TempDir::new().unwrap();
    let spec = write_spec(
        &dir,
        "multi.json",
        json!({
            "width": 16,
            "height": 16,
            "backgroundColor": [77],
            "sources": [{"pathPattern": "missing_\\d+\\.png"}]
        }),
    );

    let composite = open(&spec).await;
    assert_eq!(composite.metadata().frames, 1);
    assert_eq!(read_full(&composite, 0).await.pixel(3, 3), &[77]);
}
