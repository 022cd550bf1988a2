//! Source cache behavior across composites.

use serde_json::json;
use tempfile::TempDir;

use mosaic_tiler::default_source_cache;

use super::test_utils::{read_full, solid_png, write_spec};

#[tokio::test]
async fn test_repeated_opens_share_one_source() {
    let dir = TempDir::new().unwrap();
    let png = solid_png(&dir, "a.png", 16, 16, 5);

    let cache = default_source_cache();
    let first = cache.get(&png, None, None).await.unwrap();
    let second = cache.get(&png, None, None).await.unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));
    assert_eq!(cache.cached_count().await, 1);
}

#[tokio::test]
async fn test_composite_and_constituents_share_the_cache() {
    let dir = TempDir::new().unwrap();
    solid_png(&dir, "a.png", 16, 16, 5);
    let spec = write_spec(&dir, "multi.json", json!({"sources": [{"path": "a.png"}]}));

    let cache = default_source_cache();
    let composite = cache.get(&spec, None, None).await.unwrap();
    // Opening the composite probed (and cached) its constituent.
    assert_eq!(cache.cached_count().await, 2);

    // Serving tiles reuses the cached constituent rather than reopening.
    let region = read_full(&composite, 0).await;
    assert_eq!(region.pixel(0, 0), &[5]);
    assert_eq!(cache.cached_count().await, 2);
}

#[tokio::test]
async fn test_two_composites_share_a_constituent() {
    let dir = TempDir::new().unwrap();
    solid_png(&dir, "a.png", 16, 16, 5);
    write_spec(&dir, "one.json", json!({"sources": [{"path": "a.png"}]}));
    write_spec(
        &dir,
        "two.json",
        json!({"sources": [{"path": "a.png", "position": {"x": 4}}]}),
    );

    let cache = default_source_cache();
    cache.get(&dir.path().join("one.json"), None, None).await.unwrap();
    cache.get(&dir.path().join("two.json"), None, None).await.unwrap();
    // Two composites plus a single shared constituent.
    assert_eq!(cache.cached_count().await, 3);
}

#[tokio::test]
async fn test_clear_empties_the_cache() {
    let dir = TempDir::new().unwrap();
    let png = solid_png(&dir, "a.png", 16, 16, 5);

    let cache = default_source_cache();
    cache.get(&png, None, None).await.unwrap();
    assert_eq!(cache.cached_count().await, 1);
    cache.clear().await;
    assert_eq!(cache.cached_count().await, 0);
}
