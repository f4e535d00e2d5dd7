//! Tile atlas integration tests.
//!
//! Tests verify:
//! - Tiles are downloaded once, stored, and reloaded from disk
//! - Failed downloads leave nothing behind in the store
//! - The viewport requests, retains and evicts the right tiles
//! - Pan and zoom never move the grid off the window

use std::sync::Arc;
use std::time::Duration;

use axum::extract::Path;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use proptest::prelude::*;

use watcher_core::atlas::{
    Atlas, HttpTileFetcher, MemoryTextures, StreamerOptions, Tile, TileCoord, TileStorage,
    TileStreamer, TILE_SIZE,
};

use super::test_utils::{create_test_png, spawn_server, wait_until, RequestCounter};

const TIMEOUT: Duration = Duration::from_secs(10);

/// Tile server that serves every tile except column 1 at zoom 3.
fn tile_router(hits: RequestCounter) -> Router {
    let png = create_test_png([40, 120, 200, 255]);
    Router::new().route(
        "/{zoom}/{x}/{file}",
        get(
            move |Path((zoom, x, file)): Path<(u32, u32, String)>| {
                let png = png.clone();
                let hits = hits.clone();
                async move {
                    hits.hit();
                    if !file.ends_with(".png") || (zoom == 3 && x == 1) {
                        return StatusCode::NOT_FOUND.into_response();
                    }
                    ([(header::CONTENT_TYPE, "image/png")], png).into_response()
                }
            },
        ),
    )
}

struct Fixture {
    dir: tempfile::TempDir,
    base_url: String,
    hits: RequestCounter,
    textures: Arc<MemoryTextures>,
}

impl Fixture {
    async fn start() -> Self {
        let hits = RequestCounter::default();
        let addr = spawn_server(tile_router(hits.clone())).await;
        Self {
            dir: tempfile::tempdir().unwrap(),
            base_url: format!("http://{}", addr),
            hits,
            textures: Arc::new(MemoryTextures::new()),
        }
    }

    fn storage(&self) -> TileStorage {
        TileStorage::new(self.dir.path())
    }

    fn streamer(&self, options: StreamerOptions) -> TileStreamer {
        TileStreamer::new(
            self.storage(),
            HttpTileFetcher::with_timeout(self.base_url.clone(), Duration::from_secs(5)),
            self.textures.clone(),
            options,
        )
        .unwrap()
    }
}

fn options() -> StreamerOptions {
    StreamerOptions {
        max_zoom_levels: 4,
        ..StreamerOptions::default()
    }
}

fn all_loaded(tiles: &[Arc<Tile>]) -> bool {
    tiles.iter().all(|tile| tile.is_loaded())
}

/// Every requested load has finished and been recorded in the cache.
fn settled(streamer: &TileStreamer, cached: usize) -> bool {
    let stats = streamer.stats();
    stats.cached == cached && stats.queued == 0 && stats.loading == 0
}

// =============================================================================
// Download and Storage
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tile_downloaded_once_then_read_from_disk() {
    let fixture = Fixture::start().await;
    let coord = TileCoord::new(0, 0, 0);

    {
        let streamer = fixture.streamer(options());
        let tile = streamer.get(coord, false);
        assert!(wait_until(TIMEOUT, || tile.is_loaded()).await);

        let id = tile.texture().unwrap();
        assert_eq!(fixture.textures.dimensions(id), Some((TILE_SIZE, TILE_SIZE)));
        assert!(fixture.storage().contains(coord));
        assert_eq!(fixture.hits.count(), 1);
    }

    // A fresh streamer over the same store never touches the network.
    let streamer = fixture.streamer(options());
    let tile = streamer.get(coord, false);
    assert!(wait_until(TIMEOUT, || tile.is_loaded()).await);
    assert_eq!(fixture.hits.count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_missing_tile_is_not_stored() {
    let fixture = Fixture::start().await;
    let streamer = fixture.streamer(options());
    let coord = TileCoord::new(1, 0, 3);

    let tile = streamer.get(coord, false);
    let failed = wait_until(TIMEOUT, || {
        streamer
            .snapshot()
            .iter()
            .any(|info| info.coord == coord && info.failed)
    })
    .await;
    assert!(failed);

    assert!(!tile.is_loaded());
    assert!(!fixture.storage().contains(coord));

    // Within the backoff window the same handle comes back without a retry.
    let again = streamer.get(coord, false);
    assert!(Arc::ptr_eq(&tile, &again));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(fixture.hits.count(), 1);
}

// =============================================================================
// Viewport
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_atlas_overview_is_static_and_zoomed_tiles_evict() {
    let fixture = Fixture::start().await;
    let streamer = fixture.streamer(StreamerOptions {
        max_zoom_levels: 4,
        eviction_seconds: 30.0,
        failure_backoff_seconds: 5.0,
    });

    let mut atlas = Atlas::new(256, 256, 4);
    assert_eq!(atlas.min_zoom(), 1);

    let overview = atlas.request_tiles(&streamer, (0.0, 0.0));
    assert_eq!(overview.len(), 4);
    let overview: Vec<Arc<Tile>> = overview.into_iter().map(|p| p.tile).collect();
    assert!(wait_until(TIMEOUT, || all_loaded(&overview)).await);
    assert!(wait_until(TIMEOUT, || settled(&streamer, 4)).await);

    assert!(atlas.zoom_in());
    assert_eq!(atlas.zoom(), 2);

    let placements = atlas.request_tiles(&streamer, (0.0, 0.0));
    let range = atlas.visible_tiles();
    assert_eq!(placements.len(), range.len());
    assert!(placements.iter().all(|p| range.contains(p.tile.coord())));

    let zoomed: Vec<Arc<Tile>> = placements.into_iter().map(|p| p.tile).collect();
    assert!(wait_until(TIMEOUT, || all_loaded(&zoomed)).await);
    assert!(wait_until(TIMEOUT, || settled(&streamer, 4 + zoomed.len())).await);

    let snapshot = streamer.snapshot();
    assert_eq!(snapshot.len(), 4 + zoomed.len());
    assert!(snapshot
        .iter()
        .all(|info| info.is_static == (info.coord.zoom == 1)));

    // Nobody asks for the zoomed tiles again; only the overview survives.
    let zoomed_count = zoomed.len();
    drop(zoomed);
    let live_before = fixture.textures.live();
    assert_eq!(streamer.update(31.0), zoomed_count);
    assert_eq!(streamer.stats().cached, 4);
    assert_eq!(fixture.textures.live(), live_before - zoomed_count);
    assert!(all_loaded(&overview));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_viewport_stays_clamped(
        width in 1u32..2000,
        height in 1u32..2000,
        moves in prop::collection::vec((-3000i64..3000, -3000i64..3000, 0u8..3), 1..24),
    ) {
        let mut atlas = Atlas::new(width, height, 12);

        for (dx, dy, action) in moves {
            match action {
                0 => atlas.pan(dx, dy),
                1 => { atlas.zoom_in(); }
                _ => { atlas.zoom_out(); }
            }

            let grid = i64::from(atlas.stride()) * i64::from(TILE_SIZE);
            let (ox, oy) = atlas.offset();
            prop_assert!(ox <= 0 && oy <= 0);
            prop_assert!(ox >= -(grid - i64::from(width)).max(0));
            prop_assert!(oy >= -(grid - i64::from(height)).max(0));
            prop_assert!(atlas.zoom() >= atlas.min_zoom());
            prop_assert!(atlas.zoom() < 12);

            let range = atlas.visible_tiles();
            prop_assert!(range.max_x <= atlas.stride() && range.max_y <= atlas.stride());
        }
    }
}
