//! Texture sink for decoded frames.

use image::{DynamicImage, RgbImage, RgbaImage};

/// Borrowed view of a decoded frame's pixels.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    pub width: u32,
    pub height: u32,
    /// Bytes per pixel, 3 (RGB) or 4 (RGBA)
    pub channels: u8,
    pub pixels: &'a [u8],
}

/// Destination for decoded frames, typically a GPU texture slot.
///
/// Uploads happen on the thread that calls
/// [`StreamDecoder::update`](super::StreamDecoder::update), so a GPU-backed
/// sink must only be driven from the thread owning the graphics context.
pub trait TextureSink {
    fn upload(&mut self, frame: FrameView<'_>);
}

/// CPU-side texture slot that keeps the most recent frame.
#[derive(Debug, Clone, Default)]
pub struct FrameTexture {
    width: u32,
    height: u32,
    channels: u8,
    pixels: Vec<u8>,
    generation: u64,
}

impl FrameTexture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Number of uploads received so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Copy the current frame into an image, `None` before the first upload.
    pub fn to_image(&self) -> Option<DynamicImage> {
        match self.channels {
            3 => RgbImage::from_raw(self.width, self.height, self.pixels.clone())
                .map(DynamicImage::ImageRgb8),
            4 => RgbaImage::from_raw(self.width, self.height, self.pixels.clone())
                .map(DynamicImage::ImageRgba8),
            _ => None,
        }
    }
}

impl TextureSink for FrameTexture {
    fn upload(&mut self, frame: FrameView<'_>) {
        self.width = frame.width;
        self.height = frame.height;
        self.channels = frame.channels;
        self.pixels.clear();
        self.pixels.extend_from_slice(frame.pixels);
        self.generation += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_replaces_frame() {
        let mut texture = FrameTexture::new();
        assert!(texture.to_image().is_none());

        texture.upload(FrameView {
            width: 1,
            height: 1,
            channels: 3,
            pixels: &[1, 2, 3],
        });
        texture.upload(FrameView {
            width: 1,
            height: 2,
            channels: 4,
            pixels: &[1, 2, 3, 4, 5, 6, 7, 8],
        });

        assert_eq!(texture.generation(), 2);
        assert_eq!(texture.dimensions(), (1, 2));
        assert_eq!(texture.channels(), 4);
        let image = texture.to_image().unwrap();
        assert_eq!(image.width(), 1);
        assert_eq!(image.height(), 2);
    }
}
