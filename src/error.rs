use std::fmt;

use thiserror::Error;

/// Terminal decoding failures of an MJPEG stream.
///
/// These are recorded as decoder state rather than returned, see
/// [`StreamDecoder::last_error`](crate::stream::StreamDecoder::last_error).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamErrorKind {
    /// Malformed or incomplete multipart segment
    InvalidBlock,

    /// Non-JPEG payload or non-multipart response
    UnsupportedContentType,

    /// Boundary parameter missing or unparseable
    UnknownBoundary,

    /// JPEG codec failure
    DecodingError,

    /// Payload could not be wrapped for decoding
    UnknownError,
}

impl StreamErrorKind {
    /// Human-readable description shown next to a failed stream.
    pub fn description(&self) -> &'static str {
        match self {
            StreamErrorKind::InvalidBlock => "Invalid multipart block",
            StreamErrorKind::UnsupportedContentType => "Unsupported content type",
            StreamErrorKind::UnknownBoundary => "Unknown multipart boundary",
            StreamErrorKind::DecodingError => "Failed to decode JPEG frame",
            StreamErrorKind::UnknownError => "Unknown error",
        }
    }
}

impl fmt::Display for StreamErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Transport errors raised by a [`ChunkSource`](crate::stream::ChunkSource).
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    /// Request could not be built or sent
    #[error("HTTP error: {0}")]
    Http(String),

    /// Server answered with a non-success status
    #[error("Unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    /// Connection dropped while reading the body
    #[error("Connection error: {0}")]
    Connection(String),
}

impl StreamError {
    /// Decoder state a transport failure ends the stream in.
    ///
    /// A non-success status means the server answered with something other
    /// than a multipart stream.
    pub fn kind(&self) -> StreamErrorKind {
        match self {
            StreamError::Status { .. } => StreamErrorKind::UnsupportedContentType,
            StreamError::Http(_) | StreamError::Connection(_) => StreamErrorKind::UnknownError,
        }
    }
}

/// Errors raised while loading a map tile.
///
/// The tile streamer logs these and leaves the tile unloaded.
#[derive(Debug, Error)]
pub enum TileError {
    /// Filesystem error on the tile store
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Network failure while downloading a tile
    #[error("Fetch error for {url}: {message}")]
    Fetch { url: String, message: String },

    /// Tile server answered with a non-success status
    #[error("Tile server returned {status} for {url}")]
    Status { status: u16, url: String },

    /// Stored tile could not be decoded
    #[error("Failed to decode tile {path}: {message}")]
    Decode { path: String, message: String },

    /// Loaded tile could not be turned into a texture
    #[error("Texture upload failed for tile {0}")]
    Texture(String),

    /// Background loader thread could not be started
    #[error("Failed to start tile worker: {0}")]
    Worker(#[source] std::io::Error),
}

impl TileError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        TileError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
