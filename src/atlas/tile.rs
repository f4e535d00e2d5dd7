//! Tile identity and texture ownership.

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use image::RgbaImage;
use serde::Serialize;

/// Edge length of a map tile in pixels.
pub const TILE_SIZE: u32 = 256;

/// Slippy-map tile coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TileCoord {
    /// Column, 0-indexed from the antimeridian
    pub x: u32,

    /// Row, 0-indexed from the north edge
    pub y: u32,

    /// Zoom level, 0 = whole world in one tile
    pub zoom: u32,
}

impl TileCoord {
    pub fn new(x: u32, y: u32, zoom: u32) -> Self {
        Self { x, y, zoom }
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// Opaque GPU texture handle. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(NonZeroU32);

impl TextureId {
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

/// Creates and releases tile textures.
///
/// `create` is called from the tile streamer's worker thread. Implementations
/// backed by a graphics API must marshal the upload to the thread that owns
/// the context.
pub trait TextureFactory: Send + Sync {
    /// Upload `image`, returning `None` if no texture could be created.
    fn create(&self, image: &RgbaImage) -> Option<TextureId>;

    fn release(&self, id: TextureId);
}

/// One map tile: immutable identity plus a texture set once after loading.
pub struct Tile {
    coord: TileCoord,
    texture: AtomicU32,
    textures: Arc<dyn TextureFactory>,
}

impl Tile {
    pub(crate) fn new(coord: TileCoord, textures: Arc<dyn TextureFactory>) -> Self {
        Self {
            coord,
            texture: AtomicU32::new(0),
            textures,
        }
    }

    pub fn coord(&self) -> TileCoord {
        self.coord
    }

    /// The tile's texture, `None` until loading completes.
    pub fn texture(&self) -> Option<TextureId> {
        TextureId::new(self.texture.load(Ordering::Acquire))
    }

    pub fn is_loaded(&self) -> bool {
        self.texture().is_some()
    }

    /// Publish the loaded texture. Only the first call takes effect; a
    /// texture offered to an already-loaded tile is released.
    pub(crate) fn publish(&self, id: TextureId) -> bool {
        let published = self
            .texture
            .compare_exchange(0, id.get(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if !published {
            self.textures.release(id);
        }
        published
    }
}

impl fmt::Debug for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tile")
            .field("coord", &self.coord)
            .field("texture", &self.texture())
            .finish()
    }
}

impl Drop for Tile {
    fn drop(&mut self) {
        if let Some(id) = TextureId::new(*self.texture.get_mut()) {
            self.textures.release(id);
        }
    }
}

// =============================================================================
// In-Memory Textures
// =============================================================================

/// [`TextureFactory`] that only records texture sizes.
///
/// Used by the CLI and tests, where there is no graphics context.
#[derive(Debug, Default)]
pub struct MemoryTextures {
    inner: Mutex<MemoryTexturesInner>,
}

#[derive(Debug, Default)]
struct MemoryTexturesInner {
    next_id: u32,
    live: HashMap<u32, (u32, u32)>,
    released: usize,
}

impl MemoryTextures {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of textures created and not yet released.
    pub fn live(&self) -> usize {
        self.lock().live.len()
    }

    /// Number of textures released so far.
    pub fn released(&self) -> usize {
        self.lock().released
    }

    pub fn dimensions(&self, id: TextureId) -> Option<(u32, u32)> {
        self.lock().live.get(&id.get()).copied()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryTexturesInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl TextureFactory for MemoryTextures {
    fn create(&self, image: &RgbaImage) -> Option<TextureId> {
        let mut inner = self.lock();
        inner.next_id = inner.next_id.checked_add(1)?;
        let id = inner.next_id;
        inner.live.insert(id, image.dimensions());
        TextureId::new(id)
    }

    fn release(&self, id: TextureId) {
        let mut inner = self.lock();
        if inner.live.remove(&id.get()).is_some() {
            inner.released += 1;
        }
    }
}
