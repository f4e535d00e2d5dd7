//! Watcher - MJPEG camera streams and streamed map tiles.
//!
//! This binary wires the library components into three commands: `stream`
//! decodes frames from a camera, `tiles` loads the tiles visible in a
//! viewport, and `check` verifies the tile store and tile server.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use watcher_core::{
    atlas::{
        Atlas, HttpTileFetcher, MemoryTextures, TileCoord, TileFetcher, TileStorage, TileStreamer,
    },
    config::{AtlasConfig, Cli, Command, StreamConfig, TilesConfig},
    stream::{FrameTexture, HttpStream, StreamDecoder, StreamState},
};

/// Poll interval standing in for a render loop.
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Stream(config) => run_stream(config).await,
        Command::Tiles(config) => run_blocking(move || run_tiles(config)).await,
        Command::Check(config) => run_blocking(move || run_check(config)).await,
    }
}

// The tile pipeline uses blocking I/O, so it stays off the async workers.
async fn run_blocking<F>(f: F) -> ExitCode
where
    F: FnOnce() -> ExitCode + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(code) => code,
        Err(e) => {
            error!("Command panicked: {}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Stream Command
// =============================================================================

async fn run_stream(config: StreamConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let url = match config.parsed_url() {
        Ok(url) => url,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let client = match reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(config.connect_timeout))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to create HTTP client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Opening MJPEG stream: {}", url);
    let decoder = StreamDecoder::with_max_buffer(config.max_buffer);
    let mut stream = HttpStream::open(client, url, decoder);
    let mut texture = FrameTexture::new();
    let started = Instant::now();

    loop {
        if stream.update(&mut texture) {
            let (width, height) = texture.dimensions();
            info!(
                frame = texture.generation(),
                width,
                height,
                dropped = stream.decoder().frames_dropped(),
                "Frame decoded"
            );
            if config.frames.is_some_and(|n| texture.generation() >= n) {
                break;
            }
        }

        let finished = matches!(stream.state(), StreamState::Error | StreamState::Terminated);
        if finished && !stream.decoder().has_pending_block() {
            break;
        }

        tokio::time::sleep(FRAME_INTERVAL).await;
    }

    let decoder = stream.decoder();
    info!(
        "Stream finished after {:.1}s: {} decoded, {} dropped",
        started.elapsed().as_secs_f32(),
        decoder.frames_decoded(),
        decoder.frames_dropped()
    );

    if let Some(path) = &config.save {
        match texture.to_image() {
            Some(image) => match image.save(path) {
                Ok(()) => info!("Saved last frame to {}", path.display()),
                Err(e) => {
                    error!("Failed to save {}: {}", path.display(), e);
                    return ExitCode::FAILURE;
                }
            },
            None => warn!("No frame decoded, nothing saved"),
        }
    }

    if let Some(e) = stream.transport_error() {
        error!("Transport error: {}", e);
        return ExitCode::FAILURE;
    }
    if let Some(kind) = stream.last_error() {
        error!("Stream error: {}", kind);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

// =============================================================================
// Tiles Command
// =============================================================================

fn run_tiles(config: TilesConfig) -> ExitCode {
    init_logging(config.atlas.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let textures = Arc::new(MemoryTextures::new());
    let streamer = match create_streamer(&config.atlas, textures.clone()) {
        Ok(streamer) => streamer,
        Err(code) => return code,
    };

    let mut atlas = Atlas::new(config.width, config.height, config.atlas.max_zoom_levels);
    if let Some(zoom) = config.zoom {
        atlas.set_zoom(zoom);
    }
    atlas.pan(config.pan_x, config.pan_y);

    let range = atlas.visible_tiles();
    info!(
        "Viewport {}x{} at zoom {} (min {}): {} tiles, x {}..{}, y {}..{}",
        atlas.width(),
        atlas.height(),
        atlas.zoom(),
        atlas.min_zoom(),
        range.len(),
        range.min_x,
        range.max_x,
        range.min_y,
        range.max_y
    );

    let deadline = Instant::now() + Duration::from_secs(config.wait_secs);
    let mut last_tick = Instant::now();
    let complete = loop {
        let placements = atlas.request_tiles(&streamer, (0.0, 0.0));
        let loaded = placements.iter().filter(|p| p.tile.is_loaded()).count();
        if loaded == placements.len() {
            break true;
        }
        if Instant::now() >= deadline {
            warn!("Timed out with {}/{} tiles loaded", loaded, placements.len());
            break false;
        }

        std::thread::sleep(FRAME_INTERVAL);
        let now = Instant::now();
        streamer.update(now.duration_since(last_tick).as_secs_f32());
        last_tick = now;
    };

    let snapshot = streamer.snapshot();
    if config.json {
        match serde_json::to_string_pretty(&snapshot) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to serialize tile listing: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        for info in &snapshot {
            let status = if info.loaded {
                "loaded"
            } else if info.failed {
                "failed"
            } else {
                "pending"
            };
            let kind = if info.is_static { "static" } else { "dynamic" };
            println!(
                "{:<12} {:<8} {:<8} idle {:.1}s",
                info.coord.to_string(),
                status,
                kind,
                info.idle_seconds
            );
        }
        let stats = streamer.stats();
        println!();
        println!(
            "{} cached, {} queued, {} loading, {} textures",
            stats.cached,
            stats.queued,
            stats.loading,
            textures.live()
        );
    }

    if complete {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn create_streamer(
    config: &AtlasConfig,
    textures: Arc<MemoryTextures>,
) -> Result<TileStreamer, ExitCode> {
    let fetcher = HttpTileFetcher::with_timeout(config.tile_server.clone(), config.fetch_timeout());

    info!("Configuration:");
    info!("  Storage: {}", config.storage_root.display());
    info!("  Tile server: {}", config.tile_server);
    info!(
        "  Eviction: {}s idle, failure backoff {}s",
        config.eviction_secs, config.failure_backoff_secs
    );

    TileStreamer::new(
        TileStorage::new(&config.storage_root),
        fetcher,
        textures,
        config.streamer_options(),
    )
    .map_err(|e| {
        error!("Failed to start tile streamer: {}", e);
        ExitCode::FAILURE
    })
}

// =============================================================================
// Check Command
// =============================================================================

fn run_check(config: AtlasConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    println!("Watcher Configuration Check");
    println!("═══════════════════════════");
    println!();

    if let Err(e) = config.validate() {
        println!("✗ Configuration: {}", e);
        return ExitCode::FAILURE;
    }
    println!("✓ Tile server: {}", config.tile_server);

    let storage = TileStorage::new(&config.storage_root);
    match storage.create_dirs(config.max_zoom_levels) {
        Ok(()) => println!("✓ Tile store: {}", storage.root().display()),
        Err(e) => {
            println!("✗ Tile store: {}", e);
            return ExitCode::FAILURE;
        }
    }
    println!();

    print!("Fetching tile 0/0/0... ");
    let coord = TileCoord::new(0, 0, 0);
    let mut fetcher =
        HttpTileFetcher::with_timeout(config.tile_server.clone(), config.fetch_timeout());

    match storage.write_with(coord, |dest| fetcher.fetch(coord, dest)) {
        Ok(bytes) => println!("✓ ({} bytes)", bytes),
        Err(e) => {
            println!("✗");
            println!();
            println!("Error: {}", e);
            println!();
            println!("Please check:");
            println!("  - The tile server URL is correct");
            println!("  - The server allows requests from this host");
            return ExitCode::FAILURE;
        }
    }

    match storage.load(coord) {
        Ok(Some(image)) => {
            println!("✓ Decoded tile ({}x{})", image.width(), image.height());
        }
        Ok(None) => {
            println!("✗ Tile missing after download");
            return ExitCode::FAILURE;
        }
        Err(e) => {
            println!("✗ Decode failed: {}", e);
            return ExitCode::FAILURE;
        }
    }

    println!();
    println!("Configuration OK");
    ExitCode::SUCCESS
}

// =============================================================================
// Logging
// =============================================================================

/// Initialize the tracing subscriber for logging.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "watcher_core=debug,watcher=debug"
    } else {
        "watcher_core=info,watcher=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
