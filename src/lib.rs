//! # Watcher Core
//!
//! Streaming primitives for a camera dashboard: live MJPEG video from network
//! cameras and a background-loaded slippy-map tile atlas.
//!
//! ## Features
//!
//! - **Incremental MJPEG decoding**: Splits `multipart/x-mixed-replace` bodies on
//!   arbitrary chunk boundaries and decodes only the newest frame
//! - **Frame dropping**: A slow consumer never builds a backlog of stale frames
//! - **Tile streaming**: Disk-then-network tile loads on a worker thread, with
//!   request deduplication and idle eviction
//! - **Viewport math**: Visible tile ranges, pan and zoom clamping, and
//!   Web Mercator projection
//!
//! ## Architecture
//!
//! - [`stream`] - Multipart parsing, the MJPEG decoder and its HTTP transport
//! - [`atlas`] - Tile cache, tile store, tile fetcher and viewport
//! - [`config`] - CLI and configuration types
//! - [`error`] - Error types shared by both halves
//!
//! ## Example
//!
//! ```rust,no_run
//! use watcher_core::{FrameTexture, HttpStream, StreamDecoder};
//!
//! #[tokio::main]
//! async fn main() {
//!     let url = url::Url::parse("http://camera.local/video.mjpg").unwrap();
//!     let mut stream = HttpStream::open(reqwest::Client::new(), url, StreamDecoder::new());
//!     let mut texture = FrameTexture::new();
//!
//!     loop {
//!         if stream.update(&mut texture) {
//!             println!("frame {:?}", texture.dimensions());
//!         }
//!         tokio::time::sleep(std::time::Duration::from_millis(16)).await;
//!     }
//! }
//! ```

pub mod atlas;
pub mod config;
pub mod error;
pub mod stream;

// Re-export commonly used types
pub use atlas::{
    Atlas, CachedTileInfo, HttpTileFetcher, MemoryTextures, StreamerOptions, StreamerStats,
    TextureFactory, TextureId, Tile, TileCoord, TileFetcher, TilePlacement, TileRange,
    TileStorage, TileStreamer, TILE_SIZE,
};
pub use config::{AtlasConfig, Cli, Command, StreamConfig, TilesConfig};
pub use error::{StreamError, StreamErrorKind, TileError};
pub use stream::{
    ChunkSource, FrameTexture, FrameView, HttpChunkSource, HttpStream, MultipartBlock,
    StreamDecoder, StreamEvent, StreamState, TextureSink,
};
