//! Configuration management for the `watcher` binary.
//!
//! Options come from command-line arguments via clap, with environment
//! variable fallbacks using the `WATCHER_` prefix and defaults for
//! everything optional.
//!
//! # Example
//!
//! ```ignore
//! use watcher_core::config::{Cli, Command};
//!
//! let cli = Cli::parse();
//! match cli.command {
//!     Command::Stream(config) => println!("Streaming {}", config.url),
//!     Command::Tiles(config) => println!("Tiles in {}", config.atlas.storage_root.display()),
//!     Command::Check(config) => println!("Checking {}", config.tile_server),
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `WATCHER_STREAM_URL` - MJPEG endpoint for `stream`
//! - `WATCHER_STORAGE_ROOT` - Directory holding `atlas/` (default: .)
//! - `WATCHER_TILE_SERVER` - Slippy-map tile server base URL
//! - `WATCHER_FETCH_TIMEOUT` - Tile download timeout in seconds (default: 10)
//! - `WATCHER_EVICTION_SECS` - Idle seconds before a tile is evicted (default: 30)
//! - `WATCHER_FAILURE_BACKOFF_SECS` - Seconds before a failed tile is retried (default: 5)
//! - `WATCHER_MAX_ZOOM_LEVELS` - Number of zoom levels (default: 19)

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use url::Url;

use crate::atlas::{
    StreamerOptions, DEFAULT_EVICTION_SECONDS, DEFAULT_FAILURE_BACKOFF_SECONDS,
    DEFAULT_MAX_ZOOM_LEVELS, MAX_ZOOM_LEVELS,
};
use crate::stream::DEFAULT_MAX_BUFFER_BYTES;

// =============================================================================
// Default Values
// =============================================================================

/// Default tile server.
pub const DEFAULT_TILE_SERVER: &str = "https://tile.openstreetmap.org";

/// Default storage root.
pub const DEFAULT_STORAGE_ROOT: &str = ".";

/// Default tile download timeout in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

/// Default MJPEG connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default window size for `tiles`.
pub const DEFAULT_WINDOW_WIDTH: u32 = 1280;
pub const DEFAULT_WINDOW_HEIGHT: u32 = 720;

/// Default time `tiles` waits for loads to finish.
pub const DEFAULT_WAIT_SECS: u64 = 30;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Watcher - MJPEG camera streams and streamed map tiles.
#[derive(Parser, Debug, Clone)]
#[command(name = "watcher")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Decode frames from an MJPEG camera stream.
    Stream(StreamConfig),

    /// Load the map tiles visible in a viewport.
    Tiles(TilesConfig),

    /// Prepare the tile store and test the tile server.
    Check(AtlasConfig),
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

// =============================================================================
// Stream Configuration
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct StreamConfig {
    /// MJPEG endpoint serving multipart/x-mixed-replace.
    #[arg(env = "WATCHER_STREAM_URL")]
    pub url: String,

    /// Stop after this many decoded frames.
    #[arg(long)]
    pub frames: Option<u64>,

    /// Save the last decoded frame to this path (format from extension).
    #[arg(long)]
    pub save: Option<PathBuf>,

    /// Connect timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS, env = "WATCHER_CONNECT_TIMEOUT")]
    pub connect_timeout: u64,

    /// Maximum bytes buffered while waiting for a boundary.
    #[arg(long, default_value_t = DEFAULT_MAX_BUFFER_BYTES, env = "WATCHER_MAX_BUFFER")]
    pub max_buffer: usize,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl StreamConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.parsed_url()?;

        if self.frames == Some(0) {
            return Err("frames must be greater than 0".to_string());
        }
        if self.connect_timeout == 0 {
            return Err("connect_timeout must be greater than 0".to_string());
        }
        if self.max_buffer < 1024 {
            return Err("max_buffer must be at least 1KB".to_string());
        }

        Ok(())
    }

    pub fn parsed_url(&self) -> Result<Url, String> {
        parse_http_url(&self.url, "stream url")
    }
}

// =============================================================================
// Atlas Configuration
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct AtlasConfig {
    /// Directory under which tiles are stored as atlas/<zoom>/<x>_<y>.png.
    #[arg(long, default_value = DEFAULT_STORAGE_ROOT, env = "WATCHER_STORAGE_ROOT")]
    pub storage_root: PathBuf,

    /// Tile server base URL, queried as <server>/<zoom>/<x>/<y>.png.
    #[arg(long, default_value = DEFAULT_TILE_SERVER, env = "WATCHER_TILE_SERVER")]
    pub tile_server: String,

    /// Tile download timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_FETCH_TIMEOUT_SECS, env = "WATCHER_FETCH_TIMEOUT")]
    pub fetch_timeout: u64,

    /// Idle seconds after which an unrequested tile is evicted.
    #[arg(long, default_value_t = DEFAULT_EVICTION_SECONDS, env = "WATCHER_EVICTION_SECS")]
    pub eviction_secs: f32,

    /// Seconds before a failed tile may be loaded again (0 retries immediately).
    #[arg(
        long,
        default_value_t = DEFAULT_FAILURE_BACKOFF_SECONDS,
        env = "WATCHER_FAILURE_BACKOFF_SECS"
    )]
    pub failure_backoff_secs: f32,

    /// Number of zoom levels provided by the tile server.
    #[arg(long, default_value_t = DEFAULT_MAX_ZOOM_LEVELS, env = "WATCHER_MAX_ZOOM_LEVELS")]
    pub max_zoom_levels: u32,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl AtlasConfig {
    pub fn validate(&self) -> Result<(), String> {
        parse_http_url(&self.tile_server, "tile server")?;

        if self.fetch_timeout == 0 {
            return Err("fetch_timeout must be greater than 0".to_string());
        }
        if self.eviction_secs.is_nan() || self.eviction_secs <= 0.0 {
            return Err("eviction_secs must be greater than 0".to_string());
        }
        if self.failure_backoff_secs.is_nan() || self.failure_backoff_secs < 0.0 {
            return Err("failure_backoff_secs must not be negative".to_string());
        }
        if self.max_zoom_levels == 0 || self.max_zoom_levels > MAX_ZOOM_LEVELS {
            return Err(format!(
                "max_zoom_levels must be between 1 and {}",
                MAX_ZOOM_LEVELS
            ));
        }

        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout)
    }

    pub fn streamer_options(&self) -> StreamerOptions {
        StreamerOptions {
            eviction_seconds: self.eviction_secs,
            failure_backoff_seconds: self.failure_backoff_secs,
            max_zoom_levels: self.max_zoom_levels,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct TilesConfig {
    #[command(flatten)]
    pub atlas: AtlasConfig,

    /// Viewport width in pixels.
    #[arg(long, default_value_t = DEFAULT_WINDOW_WIDTH)]
    pub width: u32,

    /// Viewport height in pixels.
    #[arg(long, default_value_t = DEFAULT_WINDOW_HEIGHT)]
    pub height: u32,

    /// Zoom level (defaults to the minimum zoom for the window).
    #[arg(long)]
    pub zoom: Option<u32>,

    /// Horizontal pan in pixels, applied after centring.
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pub pan_x: i64,

    /// Vertical pan in pixels, applied after centring.
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pub pan_y: i64,

    /// Seconds to wait for all visible tiles to load.
    #[arg(long, default_value_t = DEFAULT_WAIT_SECS)]
    pub wait_secs: u64,

    /// Print the cache listing as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

impl TilesConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.atlas.validate()?;

        if self.width == 0 || self.height == 0 {
            return Err("width and height must be greater than 0".to_string());
        }
        if let Some(zoom) = self.zoom {
            if zoom >= self.atlas.max_zoom_levels {
                return Err(format!(
                    "zoom must be below max_zoom_levels ({})",
                    self.atlas.max_zoom_levels
                ));
            }
        }

        Ok(())
    }
}

fn parse_http_url(value: &str, what: &str) -> Result<Url, String> {
    let url = Url::parse(value).map_err(|e| format!("Invalid {}: {}", what, e))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(format!(
            "Invalid {}: unsupported scheme '{}' (expected http or https)",
            what, scheme
        )),
    }
}

// =============================================================================
// Tests
// =============================================================================
