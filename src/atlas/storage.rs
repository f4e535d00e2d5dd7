//! On-disk tile store.
//!
//! Tiles are kept as PNG files under `<storage_root>/atlas/<zoom>/<x>_<y>.png`.

use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use image::{ImageFormat, RgbaImage};
use tracing::debug;

use super::tile::TileCoord;
use crate::error::TileError;

/// Directory under the storage root holding all tiles.
const ATLAS_DIR: &str = "atlas";

#[derive(Debug, Clone)]
pub struct TileStorage {
    root: PathBuf,
}

impl TileStorage {
    /// Create a store rooted at `<storage_root>/atlas`. Nothing is touched on
    /// disk until [`TileStorage::create_dirs`].
    pub fn new(storage_root: impl AsRef<Path>) -> Self {
        Self {
            root: storage_root.as_ref().join(ATLAS_DIR),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create one directory per zoom level in `[0, max_zoom_levels)`.
    pub fn create_dirs(&self, max_zoom_levels: u32) -> Result<(), TileError> {
        for zoom in 0..max_zoom_levels {
            let dir = self.root.join(zoom.to_string());
            fs::create_dir_all(&dir).map_err(|e| TileError::io(&dir, e))?;
        }
        Ok(())
    }

    pub fn tile_path(&self, coord: TileCoord) -> PathBuf {
        self.root
            .join(coord.zoom.to_string())
            .join(format!("{}_{}.png", coord.x, coord.y))
    }

    pub fn contains(&self, coord: TileCoord) -> bool {
        self.tile_path(coord).is_file()
    }

    /// Load a stored tile. `Ok(None)` when the tile is not on disk.
    pub fn load(&self, coord: TileCoord) -> Result<Option<RgbaImage>, TileError> {
        let path = self.tile_path(coord);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(TileError::io(&path, e)),
        };

        let image = image::load_from_memory_with_format(&data, ImageFormat::Png).map_err(|e| {
            TileError::Decode {
                path: path.display().to_string(),
                message: e.to_string(),
            }
        })?;

        Ok(Some(image.into_rgba8()))
    }

    /// Create the tile's file and let `fill` write its contents.
    ///
    /// If `fill` or the final flush fails, the partially written file is
    /// removed and the error returned.
    pub fn write_with<F>(&self, coord: TileCoord, fill: F) -> Result<u64, TileError>
    where
        F: FnOnce(&mut dyn Write) -> Result<u64, TileError>,
    {
        let path = self.tile_path(coord);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| TileError::io(parent, e))?;
        }

        let file = File::create(&path).map_err(|e| TileError::io(&path, e))?;
        let mut writer = BufWriter::new(file);

        let result = fill(&mut writer).and_then(|written| {
            writer
                .flush()
                .map(|_| written)
                .map_err(|e| TileError::io(&path, e))
        });
        drop(writer);

        if result.is_err() {
            debug!(path = %path.display(), "Removing partially written tile");
            let _ = fs::remove_file(&path);
        }
        result
    }

    /// Delete a stored tile. Missing tiles are not an error.
    pub fn remove(&self, coord: TileCoord) -> Result<(), TileError> {
        let path = self.tile_path(coord);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TileError::io(&path, e)),
        }
    }
}
