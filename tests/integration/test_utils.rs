//! Test utilities for integration tests.
//!
//! Helpers for building JPEG frames, multipart bodies and PNG tiles, and for
//! serving them from a local axum server.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ImageEncoder, Rgb, RgbImage, Rgba, RgbaImage};

// =============================================================================
// Frame Builders
// =============================================================================

pub const BOUNDARY: &str = "frame";

/// Encode a small gradient as a baseline JPEG.
pub fn create_test_jpeg(width: u32, height: u32, shade: u8) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([shade, (x * 8) as u8, (y * 8) as u8])
    });
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, 85);
    encoder.encode_image(&img).unwrap();
    buf
}

/// One multipart part: marker, headers, payload and trailing CRLF.
pub fn multipart_part(content_type: &str, payload: &[u8]) -> Vec<u8> {
    let mut out = format!(
        "--{}\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n",
        BOUNDARY,
        content_type,
        payload.len()
    )
    .into_bytes();
    out.extend_from_slice(payload);
    out.extend_from_slice(b"\r\n");
    out
}

/// A full `multipart/x-mixed-replace` body. The trailing marker closes the
/// last part.
pub fn mjpeg_body(frames: &[Vec<u8>]) -> Vec<u8> {
    let mut body = Vec::new();
    for frame in frames {
        body.extend_from_slice(&multipart_part("image/jpeg", frame));
    }
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body
}

pub fn mixed_replace_content_type() -> String {
    format!("multipart/x-mixed-replace; boundary={}", BOUNDARY)
}

/// Encode a solid-colour 256x256 PNG tile.
pub fn create_test_png(color: [u8; 4]) -> Vec<u8> {
    let img = RgbaImage::from_pixel(256, 256, Rgba(color));
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf)
        .write_image(img.as_raw(), 256, 256, image::ExtendedColorType::Rgba8)
        .unwrap();
    buf
}

// =============================================================================
// Test Server
// =============================================================================

/// Serve `router` on an ephemeral local port.
pub async fn spawn_server(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Shared request counter for handlers.
#[derive(Clone, Default)]
pub struct RequestCounter(Arc<AtomicUsize>);

impl RequestCounter {
    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
