//! Integration tests for Watcher.
//!
//! These tests verify end-to-end functionality including:
//! - MJPEG decoding from a live HTTP multipart response
//! - Transport failures surfacing through `HttpStream`
//! - Chunk-size independence of the decoder
//! - Tile loading from an HTTP tile server into the on-disk store
//! - Viewport pan and zoom clamping

mod integration {
    pub mod test_utils;

    pub mod atlas_tests;
    pub mod stream_tests;
}
