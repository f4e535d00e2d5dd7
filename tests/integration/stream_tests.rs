//! MJPEG stream integration tests.
//!
//! Tests verify:
//! - Frames served over HTTP reach the texture
//! - Non-multipart responses and HTTP errors are reported
//! - Decoding does not depend on how the body is chunked

use std::time::Duration;

use axum::http::{header, StatusCode};
use axum::routing::get;
use axum::Router;
use proptest::prelude::*;
use url::Url;

use watcher_core::error::{StreamError, StreamErrorKind};
use watcher_core::stream::{FrameTexture, HttpStream, StreamDecoder, StreamState};

use super::test_utils::{
    create_test_jpeg, mixed_replace_content_type, mjpeg_body, multipart_part, spawn_server,
    wait_until, BOUNDARY,
};

const TIMEOUT: Duration = Duration::from_secs(10);

fn mjpeg_router(body: Vec<u8>) -> Router {
    Router::new().route(
        "/video.mjpg",
        get(move || {
            let body = body.clone();
            async move { ([(header::CONTENT_TYPE, mixed_replace_content_type())], body) }
        }),
    )
}

/// Poll the stream like a render loop until it stops.
async fn drain(stream: &mut HttpStream, texture: &mut FrameTexture) -> bool {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        stream.update(texture);
        if matches!(stream.state(), StreamState::Error | StreamState::Terminated) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn open(addr: std::net::SocketAddr, path: &str) -> HttpStream {
    let url = Url::parse(&format!("http://{}{}", addr, path)).unwrap();
    HttpStream::open(reqwest::Client::new(), url, StreamDecoder::new())
}

// =============================================================================
// HTTP Streams
// =============================================================================

#[tokio::test]
async fn test_http_stream_delivers_latest_frame() {
    let frames = vec![
        create_test_jpeg(4, 4, 10),
        create_test_jpeg(8, 8, 120),
        create_test_jpeg(16, 8, 240),
    ];
    let addr = spawn_server(mjpeg_router(mjpeg_body(&frames))).await;

    let mut stream = open(addr, "/video.mjpg");
    let mut texture = FrameTexture::new();
    assert!(drain(&mut stream, &mut texture).await);

    assert_eq!(stream.state(), StreamState::Terminated);
    assert!(stream.last_error().is_none());
    assert!(stream.transport_error().is_none());
    assert_eq!(stream.decoder().boundary_marker(), Some("--frame\r\n"));

    // However the body was chunked, the final frame is the one on screen.
    assert_eq!(texture.dimensions(), (16, 8));
    assert_eq!(texture.channels(), 3);
    let decoder = stream.decoder();
    assert_eq!(decoder.frames_decoded() + decoder.frames_dropped(), 3);
    assert_eq!(texture.generation(), decoder.frames_decoded());
}

#[tokio::test]
async fn test_http_stream_rejects_plain_response() {
    let router = Router::new().route(
        "/index.html",
        get(|| async { ([(header::CONTENT_TYPE, "text/html")], "<html></html>") }),
    );
    let addr = spawn_server(router).await;

    let mut stream = open(addr, "/index.html");
    let mut texture = FrameTexture::new();
    assert!(drain(&mut stream, &mut texture).await);

    assert_eq!(stream.state(), StreamState::Error);
    assert_eq!(
        stream.last_error(),
        Some(StreamErrorKind::UnsupportedContentType)
    );
    assert_eq!(texture.generation(), 0);
}

#[tokio::test]
async fn test_http_stream_corrupt_frame() {
    let mut body = multipart_part("image/jpeg", &[0xFF, 0xD8, 0x00, 0x01, 0x02, 0x03]);
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    let addr = spawn_server(mjpeg_router(body)).await;

    let mut stream = open(addr, "/video.mjpg");
    let mut texture = FrameTexture::new();
    assert!(drain(&mut stream, &mut texture).await);

    assert_eq!(stream.state(), StreamState::Error);
    assert_eq!(stream.last_error(), Some(StreamErrorKind::DecodingError));
    assert_eq!(
        stream.decoder().error_description(),
        Some("Failed to decode JPEG frame")
    );
}

#[tokio::test]
async fn test_http_stream_status_error() {
    let router = Router::new().route(
        "/video.mjpg",
        get(|| async { (StatusCode::NOT_FOUND, "no camera") }),
    );
    let addr = spawn_server(router).await;

    let mut stream = open(addr, "/video.mjpg");
    let mut texture = FrameTexture::new();
    assert!(drain(&mut stream, &mut texture).await);

    assert_eq!(stream.state(), StreamState::Error);
    assert_eq!(
        stream.last_error(),
        Some(StreamErrorKind::UnsupportedContentType)
    );
    assert!(matches!(
        stream.transport_error(),
        Some(StreamError::Status { status: 404, .. })
    ));
}

#[tokio::test]
async fn test_http_stream_connection_refused() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut stream = open(addr, "/video.mjpg");
    let mut texture = FrameTexture::new();

    let stopped = wait_until(TIMEOUT, || {
        stream.update(&mut texture);
        stream.state() == StreamState::Error
    })
    .await;

    assert!(stopped);
    assert_eq!(stream.last_error(), Some(StreamErrorKind::UnknownError));
    assert!(matches!(
        stream.transport_error(),
        Some(StreamError::Http(_))
    ));
}

// =============================================================================
// Chunking
// =============================================================================

fn decode_in_chunks(body: &[u8], sizes: &[usize]) -> (FrameTexture, u64, u64) {
    let mut decoder = StreamDecoder::new();
    let mut texture = FrameTexture::new();
    decoder.on_header("HTTP/1.1 200 OK");
    decoder.on_header(&format!("Content-Type: {}", mixed_replace_content_type()));

    let mut rest = body;
    let mut sizes = sizes.iter().cycle();
    while !rest.is_empty() {
        let n = (*sizes.next().unwrap()).min(rest.len());
        decoder.on_body(&rest[..n]);
        decoder.update(&mut texture);
        rest = &rest[n..];
    }
    decoder.terminate();
    decoder.update(&mut texture);

    assert!(decoder.last_error().is_none());
    (texture, decoder.frames_decoded(), decoder.frames_dropped())
}

#[test]
fn test_single_byte_chunks() {
    let frames = vec![create_test_jpeg(8, 8, 1), create_test_jpeg(4, 12, 2)];
    let body = mjpeg_body(&frames);

    let (texture, decoded, dropped) = decode_in_chunks(&body, &[1]);
    assert_eq!(texture.dimensions(), (4, 12));
    assert_eq!(decoded, 2);
    assert_eq!(dropped, 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_chunking_does_not_change_final_frame(
        sizes in prop::collection::vec(1usize..512, 1..16),
    ) {
        let frames = vec![
            create_test_jpeg(8, 8, 30),
            create_test_jpeg(12, 4, 90),
            create_test_jpeg(4, 16, 200),
        ];
        let body = mjpeg_body(&frames);

        let (whole, _, _) = decode_in_chunks(&body, &[body.len()]);
        let (split, decoded, dropped) = decode_in_chunks(&body, &sizes);

        prop_assert_eq!(split.dimensions(), (4, 16));
        prop_assert_eq!(split.pixels(), whole.pixels());
        prop_assert_eq!(decoded + dropped, 3);
    }
}
