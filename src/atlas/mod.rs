//! Tiled map streaming.
//!
//! This module keeps the map tiles needed by a pannable, zoomable viewport
//! resident as textures, loading them in the background from a local tile
//! store or a slippy-map tile server.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │      Atlas (per rendered frame)         │
//! │  visible_tiles() → request_tiles()      │
//! └────────────────────┬────────────────────┘
//!                      │ get(coord, is_static)
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │             TileStreamer                │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │ cache + idle │  │  worker thread  │  │
//! │  │  eviction    │◀─│  (FIFO loads)   │  │
//! │  └──────────────┘  └───────┬─────────┘  │
//! └────────────────────────────┼────────────┘
//!                 ┌────────────┴───────────┐
//!                 ▼                        ▼
//!        ┌─────────────────┐    ┌─────────────────────┐
//!        │   TileStorage   │    │   HttpTileFetcher   │
//!        │ atlas/z/x_y.png │    │ <server>/z/x/y.png  │
//!        └─────────────────┘    └─────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use watcher_core::atlas::{
//!     Atlas, HttpTileFetcher, MemoryTextures, StreamerOptions, TileStorage, TileStreamer,
//! };
//!
//! let streamer = TileStreamer::new(
//!     TileStorage::new("/var/lib/watcher"),
//!     HttpTileFetcher::new("https://tile.openstreetmap.org"),
//!     Arc::new(MemoryTextures::new()),
//!     StreamerOptions::default(),
//! )?;
//!
//! let atlas = Atlas::new(1280, 720, streamer.options().max_zoom_levels);
//!
//! // Once per frame
//! for placement in atlas.request_tiles(&streamer, (0.0, 0.0)) {
//!     if placement.tile.texture().is_none() {
//!         // draw a "loading" placeholder at (placement.screen_x, placement.screen_y)
//!     }
//! }
//! streamer.update(1.0 / 60.0);
//! # Ok::<(), watcher_core::TileError>(())
//! ```

mod fetch;
mod storage;
mod streamer;
mod tile;
mod viewport;

pub use fetch::{HttpTileFetcher, TileFetcher, DEFAULT_FETCH_TIMEOUT};
pub use storage::TileStorage;
pub use streamer::{
    CachedTileInfo, StreamerOptions, StreamerStats, TileStreamer, DEFAULT_EVICTION_SECONDS,
    DEFAULT_FAILURE_BACKOFF_SECONDS, DEFAULT_MAX_ZOOM_LEVELS,
};
pub use tile::{MemoryTextures, TextureFactory, TextureId, Tile, TileCoord, TILE_SIZE};
pub use viewport::{min_zoom_for, project, Atlas, TilePlacement, TileRange, MAX_ZOOM_LEVELS};
