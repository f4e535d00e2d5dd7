//! MJPEG stream decoding.
//!
//! This module turns a `multipart/x-mixed-replace` HTTP response into a
//! sequence of decoded frames written into a caller-owned texture slot.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │   ChunkSource (HttpChunkSource, ...)    │
//! └────────────────────┬────────────────────┘
//!                      │ headers + body chunks (tokio task)
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              HttpStream                 │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │StreamDecoder │  │ MultipartBlock  │  │
//! │  │ (boundary,   │─▶│ (headers +      │  │
//! │  │  buffering)  │  │  payload)       │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │ update() per rendered frame
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │        TextureSink (FrameTexture)       │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use watcher_core::stream::{FrameTexture, StreamDecoder, StreamState};
//!
//! let mut decoder = StreamDecoder::new();
//! decoder.on_header("Content-Type: multipart/x-mixed-replace; boundary=frame");
//! decoder.on_body(b"--frame\r\n");
//!
//! let mut texture = FrameTexture::new();
//! assert!(!decoder.update(&mut texture));
//! assert_eq!(decoder.state(), StreamState::Streaming);
//! ```

mod boundary;
mod decoder;
mod multipart;
mod source;
mod texture;

pub use boundary::{find_marker, parse_boundary, MIXED_REPLACE};
pub use decoder::{StreamDecoder, StreamState, DEFAULT_MAX_BUFFER_BYTES};
pub use multipart::MultipartBlock;
pub use source::{ChunkSource, HttpChunkSource, HttpStream, StreamEvent};
pub use texture::{FrameTexture, FrameView, TextureSink};
