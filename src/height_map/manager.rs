//! Per-tile height maps, generated on demand and cached on disk.

use glam::Mat4;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use tracing::{debug, info, warn};

use super::HeightMap;
use crate::mesh::TriangleMesh;

/// Anything that can hand out the height map of a world tile.
pub trait HeightMapSource: Send + Sync {
    fn height_map_of_tile(&self, tile_id: u32) -> Option<Arc<HeightMap>>;
}

/// Geometry provider the manager samples height maps from.
pub trait TileGeometry: Send + Sync {
    /// Mesh and world placement of a tile, or `None` if the tile is unknown.
    fn tile_mesh(&self, tile_id: u32) -> Option<(TriangleMesh, Mat4)>;

    /// File name of the cached height map inside the cache directory.
    fn cache_file_name(&self, tile_id: u32) -> String {
        format!("tile_{}.hmp", tile_id)
    }
}

type Slot = Arc<OnceLock<Option<Arc<HeightMap>>>>;

/// Hands out one shared height map per tile.
///
/// Lookup order: memory, then `cache_dir/<name>`, then generation from the
/// tile geometry (written back to the cache directory). Concurrent first
/// requests for the same tile build it once; failures are remembered.
pub struct HeightMapManager {
    geometry: Arc<dyn TileGeometry>,
    cache_dir: PathBuf,
    x_samples: usize,
    y_samples: usize,
    filter: bool,
    maps: Mutex<HashMap<u32, Slot>>,
}

impl HeightMapManager {
    pub fn new(geometry: Arc<dyn TileGeometry>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            geometry,
            cache_dir: cache_dir.into(),
            x_samples: 64,
            y_samples: 64,
            filter: true,
            maps: Mutex::new(HashMap::new()),
        }
    }

    /// Grid resolution and blur for newly generated maps.
    pub fn with_resolution(mut self, x_samples: usize, y_samples: usize, filter: bool) -> Self {
        self.x_samples = x_samples;
        self.y_samples = y_samples;
        self.filter = filter;
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Height map of `tile_id`, building it on first use.
    pub fn get(&self, tile_id: u32) -> Option<Arc<HeightMap>> {
        let slot = {
            let mut maps = match self.maps.lock() {
                Ok(maps) => maps,
                Err(poisoned) => {
                    warn!("Recovering poisoned height map cache");
                    poisoned.into_inner()
                }
            };
            Arc::clone(maps.entry(tile_id).or_default())
        };
        slot.get_or_init(|| self.build(tile_id)).clone()
    }

    /// Drop all in-memory maps; files stay.
    pub fn clear(&self) {
        match self.maps.lock() {
            Ok(mut maps) => maps.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }

    fn build(&self, tile_id: u32) -> Option<Arc<HeightMap>> {
        let path = self.cache_dir.join(self.geometry.cache_file_name(tile_id));
        if path.exists() {
            match HeightMap::load(&path) {
                Ok(map) => return Some(Arc::new(map)),
                Err(e) => warn!("Regenerating height map for tile {}: {}", tile_id, e),
            }
        }

        let Some((mesh, world)) = self.geometry.tile_mesh(tile_id) else {
            debug!("No geometry for tile {}", tile_id);
            return None;
        };
        let map = match HeightMap::generate_from_mesh(
            &mesh,
            world,
            self.x_samples,
            self.y_samples,
            self.filter,
        ) {
            Ok(map) => map,
            Err(e) => {
                warn!("Cannot build height map for tile {}: {}", tile_id, e);
                return None;
            }
        };
        info!("Generated height map for tile {}", tile_id);

        if let Err(e) = std::fs::create_dir_all(&self.cache_dir) {
            warn!("Cannot create height map cache {:?}: {}", self.cache_dir, e);
        } else if let Err(e) = map.write_to_file(&path) {
            warn!("Cannot cache height map for tile {}: {}", tile_id, e);
        }
        Some(Arc::new(map))
    }
}

impl HeightMapSource for HeightMapManager {
    fn height_map_of_tile(&self, tile_id: u32) -> Option<Arc<HeightMap>> {
        self.get(tile_id)
    }
}
