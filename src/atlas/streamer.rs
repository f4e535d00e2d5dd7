//! Background-loaded tile cache with idle eviction.
//!
//! # Concurrency
//!
//! One worker thread per [`TileStreamer`] owns the load pipeline:
//!
//! ```text
//!  get() ──▶ FIFO queue ──▶ loading slot ──▶ disk ──miss──▶ HTTP ──▶ disk
//!                                               │                      │
//!                                               ▼                      ▼
//!                                            cache ◀────────────── decode
//! ```
//!
//! The queue, the loading slot and the cache live in one [`CacheState`]
//! behind a single mutex, so a coordinate is always in exactly one of them.
//! Disk and network I/O happen outside the lock.
//!
//! # Eviction
//!
//! Every non-static entry accumulates idle time in [`TileStreamer::update`]
//! and is dropped once it has gone unrequested for longer than the eviction
//! timeout (30 seconds by default). Static entries, used for the whole-map
//! overview layer, are never evicted.
//!
//! # Failures
//!
//! A failed load leaves the tile without a texture and caches the failure
//! for a short backoff. Requesting the tile after the backoff has elapsed
//! queues a fresh attempt on the same handle.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use image::RgbaImage;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::fetch::TileFetcher;
use super::storage::TileStorage;
use super::tile::{TextureFactory, Tile, TileCoord};
use crate::error::TileError;

/// Idle time after which an unrequested tile is evicted.
pub const DEFAULT_EVICTION_SECONDS: f32 = 30.0;

/// Time a failed tile waits before it may be requested again.
pub const DEFAULT_FAILURE_BACKOFF_SECONDS: f32 = 5.0;

/// Number of zoom levels served by slippy-map tile servers.
pub const DEFAULT_MAX_ZOOM_LEVELS: u32 = 19;

/// How long the worker waits for new requests before re-checking the stop flag.
const IDLE_POLL: Duration = Duration::from_millis(30);

/// Tunables for a [`TileStreamer`].
#[derive(Debug, Clone, PartialEq)]
pub struct StreamerOptions {
    pub eviction_seconds: f32,
    /// 0 retries a failed tile on its next request
    pub failure_backoff_seconds: f32,
    pub max_zoom_levels: u32,
}

impl Default for StreamerOptions {
    fn default() -> Self {
        Self {
            eviction_seconds: DEFAULT_EVICTION_SECONDS,
            failure_backoff_seconds: DEFAULT_FAILURE_BACKOFF_SECONDS,
            max_zoom_levels: DEFAULT_MAX_ZOOM_LEVELS,
        }
    }
}

/// Debug listing entry for one cached tile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedTileInfo {
    pub coord: TileCoord,
    pub is_static: bool,
    pub idle_seconds: f32,
    pub loaded: bool,
    pub failed: bool,
}

/// Entry counts per pipeline stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamerStats {
    pub cached: usize,
    pub queued: usize,
    pub loading: usize,
}

// =============================================================================
// Shared State
// =============================================================================

struct CacheEntry {
    tile: Arc<Tile>,
    is_static: bool,
    idle_seconds: f32,
    /// Remaining backoff of a failed load
    retry_in: Option<f32>,
}

struct LoadRequest {
    tile: Arc<Tile>,
    is_static: bool,
}

#[derive(Default)]
struct CacheState {
    cached: HashMap<TileCoord, CacheEntry>,
    queue: VecDeque<LoadRequest>,
    /// Queued or loading tiles by coordinate
    pending: HashMap<TileCoord, Arc<Tile>>,
    loading: Option<TileCoord>,
}

impl CacheState {
    /// Look up or queue `coord`. The flag is `true` when a load was queued.
    fn get(
        &mut self,
        coord: TileCoord,
        is_static: bool,
        textures: &Arc<dyn TextureFactory>,
    ) -> (Arc<Tile>, bool) {
        if let Some(entry) = self.cached.get_mut(&coord) {
            entry.idle_seconds = 0.0;
            let tile = Arc::clone(&entry.tile);
            if !matches!(entry.retry_in, Some(remaining) if remaining <= 0.0) {
                return (tile, false);
            }

            let is_static = entry.is_static;
            self.cached.remove(&coord);
            self.enqueue(Arc::clone(&tile), is_static);
            return (tile, true);
        }

        if let Some(tile) = self.pending.get(&coord) {
            return (Arc::clone(tile), false);
        }

        let tile = Arc::new(Tile::new(coord, Arc::clone(textures)));
        self.enqueue(Arc::clone(&tile), is_static);
        (tile, true)
    }

    fn enqueue(&mut self, tile: Arc<Tile>, is_static: bool) {
        self.pending.insert(tile.coord(), Arc::clone(&tile));
        self.queue.push_back(LoadRequest { tile, is_static });
    }

    fn next_request(&mut self) -> Option<LoadRequest> {
        let request = self.queue.pop_front()?;
        self.loading = Some(request.tile.coord());
        Some(request)
    }

    fn complete(&mut self, request: LoadRequest, retry_in: Option<f32>) {
        let coord = request.tile.coord();
        self.pending.remove(&coord);
        if self.loading == Some(coord) {
            self.loading = None;
        }
        self.cached.insert(
            coord,
            CacheEntry {
                tile: request.tile,
                is_static: request.is_static,
                idle_seconds: 0.0,
                retry_in,
            },
        );
    }
}

struct Shared {
    state: Mutex<CacheState>,
    wakeup: Condvar,
    stop: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// =============================================================================
// Tile Streamer
// =============================================================================

/// Tile cache backed by a background loader thread.
///
/// Dropping the streamer stops the worker after its current load and joins it.
pub struct TileStreamer {
    shared: Arc<Shared>,
    textures: Arc<dyn TextureFactory>,
    options: StreamerOptions,
    worker: Option<JoinHandle<()>>,
}

impl TileStreamer {
    /// Create the zoom directories under `storage` and start the worker.
    pub fn new<F: TileFetcher>(
        storage: TileStorage,
        fetcher: F,
        textures: Arc<dyn TextureFactory>,
        options: StreamerOptions,
    ) -> Result<Self, TileError> {
        storage.create_dirs(options.max_zoom_levels)?;

        let shared = Arc::new(Shared {
            state: Mutex::new(CacheState::default()),
            wakeup: Condvar::new(),
            stop: AtomicBool::new(false),
        });

        info!(
            root = %storage.root().display(),
            eviction_seconds = options.eviction_seconds,
            "Starting tile streamer"
        );

        let worker = {
            let shared = Arc::clone(&shared);
            let textures = Arc::clone(&textures);
            let backoff = options.failure_backoff_seconds;
            thread::Builder::new()
                .name("tile-streamer".to_string())
                .spawn(move || run_worker(shared, storage, fetcher, textures, backoff))
                .map_err(TileError::Worker)?
        };

        Ok(Self {
            shared,
            textures,
            options,
            worker: Some(worker),
        })
    }

    /// Return the tile at `coord`, queueing a load if it is not cached or
    /// already on its way. Never blocks on I/O.
    ///
    /// The returned tile has no texture until the load completes.
    pub fn get(&self, coord: TileCoord, is_static: bool) -> Arc<Tile> {
        let (tile, queued) = self.shared.lock().get(coord, is_static, &self.textures);
        if queued {
            debug!(%coord, is_static, "Queued tile load");
            self.shared.wakeup.notify_one();
        }
        tile
    }

    /// Advance idle timers by `delta_seconds` and evict expired tiles.
    ///
    /// Returns the number of evicted tiles.
    pub fn update(&self, delta_seconds: f32) -> usize {
        let eviction = self.options.eviction_seconds;
        let evicted: Vec<CacheEntry> = {
            let mut state = self.shared.lock();
            let mut expired = Vec::new();

            for (coord, entry) in state.cached.iter_mut() {
                if let Some(remaining) = entry.retry_in.as_mut() {
                    *remaining -= delta_seconds;
                }
                if entry.is_static {
                    continue;
                }
                entry.idle_seconds += delta_seconds;
                if entry.idle_seconds > eviction {
                    expired.push(*coord);
                }
            }

            expired
                .into_iter()
                .filter_map(|coord| state.cached.remove(&coord))
                .collect()
        };

        // Released outside the lock; textures may go back to the render thread.
        for entry in &evicted {
            debug!(coord = %entry.tile.coord(), "Evicted idle tile");
        }
        evicted.len()
    }

    /// Copy of every cache entry, ordered by coordinate.
    pub fn snapshot(&self) -> Vec<CachedTileInfo> {
        let state = self.shared.lock();
        let mut tiles: Vec<CachedTileInfo> = state
            .cached
            .iter()
            .map(|(coord, entry)| CachedTileInfo {
                coord: *coord,
                is_static: entry.is_static,
                idle_seconds: entry.idle_seconds,
                loaded: entry.tile.is_loaded(),
                failed: entry.retry_in.is_some(),
            })
            .collect();
        drop(state);

        tiles.sort_by_key(|info| (info.coord.zoom, info.coord.y, info.coord.x));
        tiles
    }

    pub fn stats(&self) -> StreamerStats {
        let state = self.shared.lock();
        StreamerStats {
            cached: state.cached.len(),
            queued: state.queue.len(),
            loading: usize::from(state.loading.is_some()),
        }
    }

    /// Drop every cached tile. Queued and in-flight loads are kept.
    pub fn clear(&self) {
        let cached = std::mem::take(&mut self.shared.lock().cached);
        debug!(count = cached.len(), "Cleared tile cache");
    }

    pub fn options(&self) -> &StreamerOptions {
        &self.options
    }
}

impl Drop for TileStreamer {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        self.shared.wakeup.notify_all();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Tile worker panicked");
            }
        }
    }
}

// =============================================================================
// Worker
// =============================================================================

fn run_worker<F: TileFetcher>(
    shared: Arc<Shared>,
    storage: TileStorage,
    mut fetcher: F,
    textures: Arc<dyn TextureFactory>,
    failure_backoff: f32,
) {
    debug!("Tile worker started");

    while !shared.stop.load(Ordering::Acquire) {
        let request = {
            let mut state = shared.lock();
            match state.next_request() {
                Some(request) => request,
                None => {
                    let _ = shared.wakeup.wait_timeout(state, IDLE_POLL);
                    continue;
                }
            }
        };

        let coord = request.tile.coord();
        let result = load_tile(&storage, &mut fetcher, coord).and_then(|image| {
            textures
                .create(&image)
                .ok_or_else(|| TileError::Texture(coord.to_string()))
        });

        let retry_in = match result {
            Ok(id) => {
                request.tile.publish(id);
                debug!(%coord, "Tile loaded");
                None
            }
            Err(e) => {
                warn!(%coord, error = %e, "Tile load failed");
                Some(failure_backoff)
            }
        };

        shared.lock().complete(request, retry_in);
    }

    debug!("Tile worker stopped");
}

/// Load from disk, downloading into the store first on a miss.
fn load_tile<F: TileFetcher>(
    storage: &TileStorage,
    fetcher: &mut F,
    coord: TileCoord,
) -> Result<RgbaImage, TileError> {
    match storage.load(coord) {
        Ok(Some(image)) => return Ok(image),
        Ok(None) => {}
        Err(e) => {
            warn!(%coord, error = %e, "Discarding unreadable stored tile");
            storage.remove(coord)?;
        }
    }

    let bytes = storage.write_with(coord, |dest| fetcher.fetch(coord, dest))?;
    debug!(%coord, bytes, "Stored downloaded tile");

    storage.load(coord)?.ok_or_else(|| TileError::Decode {
        path: storage.tile_path(coord).display().to_string(),
        message: "tile missing after download".to_string(),
    })
}
