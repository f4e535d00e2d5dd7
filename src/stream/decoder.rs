//! Incremental `multipart/x-mixed-replace` decoder.
//!
//! The decoder is push-driven: the transport hands it response header lines
//! through [`StreamDecoder::on_header`] and raw body chunks of any size
//! through [`StreamDecoder::on_body`]. Decoding and texture upload happen in
//! [`StreamDecoder::update`], which the caller polls once per rendered frame.
//!
//! # State Machine
//!
//! ```text
//!  Initialising ──first header──▶ Streaming ──transport done──▶ Terminated
//!        │                            │
//!        └──────────── any failure ───┴──────────▶ Error (sticky)
//! ```
//!
//! # Frame Dropping
//!
//! Only one undecoded block is held. When the producer outruns `update()`,
//! each newly completed segment replaces the pending one, so the texture
//! always shows the most recent complete frame.

use std::io::Cursor;

use bytes::{Buf, BytesMut};
use image::{DynamicImage, ImageError, ImageFormat, ImageReader, Limits};
use tracing::{debug, info, warn};

use super::boundary::{find_marker, parse_boundary, MIXED_REPLACE};
use super::multipart::MultipartBlock;
use super::texture::{FrameView, TextureSink};
use crate::error::StreamErrorKind;

/// Default cap on bytes buffered while waiting for a boundary: 16MB.
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 16 * 1024 * 1024;

const CONTENT_TYPE_PREFIX: &str = "content-type:";
const JPEG_CONTENT_TYPE: &str = "image/jpeg";

/// Lifecycle of one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Initialising,
    Streaming,
    Error,
    Terminated,
}

/// Decoder for one MJPEG stream.
#[derive(Debug)]
pub struct StreamDecoder {
    state: StreamState,
    last_error: Option<StreamErrorKind>,
    boundary_marker: Option<String>,
    response_buffer: BytesMut,
    /// Buffer offset already known not to start a marker
    scan_offset: usize,
    pending_block: Option<MultipartBlock>,
    frame_ready: bool,
    frames_decoded: u64,
    frames_dropped: u64,
    max_buffer_bytes: usize,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::with_max_buffer(DEFAULT_MAX_BUFFER_BYTES)
    }

    /// Create a decoder that fails the stream once `max_buffer_bytes` are
    /// buffered without a boundary.
    pub fn with_max_buffer(max_buffer_bytes: usize) -> Self {
        Self {
            state: StreamState::Initialising,
            last_error: None,
            boundary_marker: None,
            response_buffer: BytesMut::new(),
            scan_offset: 0,
            pending_block: None,
            frame_ready: false,
            frames_decoded: 0,
            frames_dropped: 0,
            max_buffer_bytes,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// The first error that stopped this stream.
    pub fn last_error(&self) -> Option<StreamErrorKind> {
        self.last_error
    }

    /// Human-readable status for an error indicator.
    pub fn error_description(&self) -> Option<&'static str> {
        self.last_error.map(|kind| kind.description())
    }

    /// Marker in wire form, e.g. `--frame\r\n`.
    pub fn boundary_marker(&self) -> Option<&str> {
        self.boundary_marker.as_deref()
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    /// Segments replaced before they could be decoded.
    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    pub fn buffered_len(&self) -> usize {
        self.response_buffer.len()
    }

    pub fn has_pending_block(&self) -> bool {
        self.pending_block.is_some()
    }

    fn is_finished(&self) -> bool {
        matches!(self.state, StreamState::Error | StreamState::Terminated)
    }

    /// Record a terminal error. The first error wins.
    pub fn set_error(&mut self, kind: StreamErrorKind) {
        if self.state == StreamState::Error {
            return;
        }
        warn!(error = %kind, "MJPEG stream failed");
        self.state = StreamState::Error;
        self.last_error = Some(kind);
        self.pending_block = None;
        self.frame_ready = false;
    }

    /// Mark the transport as finished.
    pub fn terminate(&mut self) {
        if self.is_finished() {
            return;
        }
        info!(frames = self.frames_decoded, "MJPEG stream terminated");
        self.state = StreamState::Terminated;
    }

    /// Feed one response header line, e.g. `Content-Type: multipart/...`.
    pub fn on_header(&mut self, line: &str) {
        if self.is_finished() {
            return;
        }
        if self.state == StreamState::Initialising {
            self.state = StreamState::Streaming;
        }

        let line = line.trim_end();
        if line.len() < CONTENT_TYPE_PREFIX.len()
            || !line.is_char_boundary(CONTENT_TYPE_PREFIX.len())
            || !line[..CONTENT_TYPE_PREFIX.len()].eq_ignore_ascii_case(CONTENT_TYPE_PREFIX)
        {
            return;
        }

        let value = line[CONTENT_TYPE_PREFIX.len()..].trim();
        if !value.starts_with(MIXED_REPLACE) {
            debug!(content_type = value, "Response is not multipart/x-mixed-replace");
            self.set_error(StreamErrorKind::UnsupportedContentType);
            return;
        }

        match parse_boundary(value) {
            Some(marker) => {
                debug!(marker = marker.trim_end(), "Discovered multipart boundary");
                self.boundary_marker = Some(marker);
                self.scan_offset = 0;
            }
            None => self.set_error(StreamErrorKind::UnknownBoundary),
        }
    }

    /// Feed one body chunk of arbitrary size.
    pub fn on_body(&mut self, chunk: &[u8]) {
        if self.is_finished() {
            return;
        }
        if self.state == StreamState::Initialising {
            self.state = StreamState::Streaming;
        }

        self.response_buffer.extend_from_slice(chunk);

        if let Some(marker) = self.boundary_marker.take() {
            self.split_segments(marker.as_bytes());
            self.boundary_marker = Some(marker);
        }

        if self.response_buffer.len() > self.max_buffer_bytes {
            warn!(
                buffered = self.response_buffer.len(),
                limit = self.max_buffer_bytes,
                "No multipart boundary within buffer limit"
            );
            self.set_error(StreamErrorKind::InvalidBlock);
            self.response_buffer.clear();
        }
    }

    fn split_segments(&mut self, marker: &[u8]) {
        loop {
            let Some(found) = find_marker(&self.response_buffer[self.scan_offset..], marker) else {
                // A marker may straddle the end of the buffer.
                self.scan_offset = self
                    .response_buffer
                    .len()
                    .saturating_sub(marker.len() - 1);
                return;
            };
            let index = self.scan_offset + found;

            if index > 0 {
                let block = MultipartBlock::parse(&self.response_buffer[..index]);
                debug!(
                    bytes = index,
                    content_type = block.content_type(),
                    "Completed multipart block"
                );
                if self.pending_block.replace(block).is_some() {
                    self.frames_dropped += 1;
                }
            }

            self.response_buffer.advance(index + marker.len());
            self.scan_offset = 0;
            self.frame_ready = true;
        }
    }

    /// Decode the pending block, if any, into `texture`.
    ///
    /// Returns `true` when a new frame was uploaded. Failures move the stream
    /// into [`StreamState::Error`] instead of being returned.
    pub fn update<T: TextureSink + ?Sized>(&mut self, texture: &mut T) -> bool {
        if self.state == StreamState::Error || !self.frame_ready {
            return false;
        }
        let Some(block) = self.pending_block.take() else {
            return false;
        };
        self.frame_ready = false;

        if !block.is_valid() {
            debug!(
                content_type = block.content_type(),
                declared = block.declared_length(),
                actual = block.bytes().len(),
                "Rejecting multipart block"
            );
            self.set_error(StreamErrorKind::InvalidBlock);
            return false;
        }
        if block.content_type() != JPEG_CONTENT_TYPE {
            self.set_error(StreamErrorKind::UnsupportedContentType);
            return false;
        }

        let image = match decode_jpeg(block.bytes()) {
            Ok(image) => image,
            Err(e) => {
                debug!(error = %e, "JPEG decode failed");
                self.set_error(match e {
                    ImageError::Limits(_) | ImageError::Parameter(_) | ImageError::Encoding(_) => {
                        StreamErrorKind::UnknownError
                    }
                    _ => StreamErrorKind::DecodingError,
                });
                return false;
            }
        };

        let (channels, pixels) = match &image {
            DynamicImage::ImageRgb8(rgb) => (3, rgb.as_raw().as_slice()),
            DynamicImage::ImageRgba8(rgba) => (4, rgba.as_raw().as_slice()),
            other => {
                debug!(color = ?other.color(), "Skipping frame with unsupported pixel depth");
                return false;
            }
        };

        texture.upload(FrameView {
            width: image.width(),
            height: image.height(),
            channels,
            pixels,
        });
        self.frames_decoded += 1;
        true
    }
}

/// Decode a JPEG frame under the default allocation limits.
fn decode_jpeg(data: &[u8]) -> Result<DynamicImage, ImageError> {
    let mut reader = ImageReader::with_format(Cursor::new(data), ImageFormat::Jpeg);
    reader.limits(Limits::default());
    reader.decode()
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}
