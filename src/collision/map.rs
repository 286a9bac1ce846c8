//! Static collision geometry of the world tiles.

use anyhow::{Context, Result};
use glam::{Quat, Vec3};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::{CollisionData, CollisionLineSetFactory, CollisionObject};
use crate::config::CollisionMapConfig;
use crate::transform::TransformationData;

/// Registry of line-set shapes and the tiles using them.
///
/// Several tiles may share one shape. Shapes carry the rotation from the
/// configuration; the tile position is supplied at query time.
#[derive(Debug, Default)]
pub struct CollisionMap {
    /// Shapes in load order.
    objects: Vec<CollisionObject>,
    /// Configured map id -> index into `objects`.
    by_map_id: HashMap<u32, usize>,
    /// Tile id -> index into `objects`.
    tiles: HashMap<u32, usize>,
    /// Probe shape for [`Self::check_collision`].
    probe: Option<CollisionObject>,
}

impl CollisionMap {
    /// An empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty map with a probe shape for whole-map queries.
    pub fn with_probe(probe: CollisionObject) -> Self {
        info!("Collision map probe is a {:?}", probe.shape.kind());
        Self {
            probe: Some(probe),
            ..Self::default()
        }
    }

    /// Load a collision-world configuration file.
    ///
    /// Geometry file names resolve against `tiles_dir`. Shapes whose geometry
    /// fails to load are skipped with an error; tiles referring to them stay
    /// unmapped.
    pub fn load_collision_world(
        &mut self,
        config_file: impl AsRef<Path>,
        tiles_dir: impl AsRef<Path>,
        factory: &dyn CollisionLineSetFactory,
    ) -> Result<()> {
        let config_file = config_file.as_ref();
        info!("Loading collision world from {:?}", config_file);
        let config = CollisionMapConfig::from_file(config_file)
            .with_context(|| format!("Failed to load collision world {:?}", config_file))?;
        self.apply_config(&config, tiles_dir.as_ref(), factory);
        Ok(())
    }

    /// Build shapes and tile mapping from an already parsed configuration.
    pub fn apply_config(
        &mut self,
        config: &CollisionMapConfig,
        tiles_dir: &Path,
        factory: &dyn CollisionLineSetFactory,
    ) {
        for entry in &config.collision_maps {
            let trans = TransformationData::from_position_orientation(
                Vec3::ZERO,
                Quat::from_rotation_y(entry.y_rotation.to_radians()),
            );
            let path = tiles_dir.join(&entry.file_name);
            match self.load_collision_line_set(&path, &entry.file_type, trans, factory) {
                Ok(index) => {
                    self.by_map_id.insert(entry.id, index);
                }
                Err(e) => error!("Skipping collision map {}: {:#}", entry.id, e),
            }
        }

        for tile in &config.tiles {
            match self.by_map_id.get(&tile.collision_map_id) {
                Some(&index) => {
                    self.tiles.insert(tile.tile_type, index);
                }
                None => warn!(
                    "Tile {} refers to unknown collision map {}",
                    tile.tile_type, tile.collision_map_id
                ),
            }
        }
        info!(
            "Collision world has {} shapes for {} tiles",
            self.objects.len(),
            self.tiles.len()
        );
    }

    /// Load one line set, give it `trans`, and register it.
    ///
    /// Returns the shape's index.
    pub fn load_collision_line_set(
        &mut self,
        path: &Path,
        file_type: &str,
        trans: TransformationData,
        factory: &dyn CollisionLineSetFactory,
    ) -> Result<usize> {
        if !path.exists() {
            anyhow::bail!("Cannot read collision geometry {:?}", path);
        }
        let lines = factory.create(file_type, path)?;
        let mut object = CollisionObject::line_set(Arc::new(lines));
        object.set_transformation(trans);
        Ok(self.add_object(object))
    }

    /// Register a shape directly. Returns its index.
    pub fn add_object(&mut self, object: CollisionObject) -> usize {
        self.objects.push(object);
        self.objects.len() - 1
    }

    /// Use the shape at `index` for `tile_id`.
    pub fn map_tile(&mut self, tile_id: u32, index: usize) {
        if index < self.objects.len() {
            self.tiles.insert(tile_id, index);
        } else {
            warn!("Cannot map tile {} to missing shape {}", tile_id, index);
        }
    }

    /// Shape registered for a tile, if any.
    pub fn tile_collision_map(&self, tile_id: u32) -> Option<&CollisionObject> {
        self.tiles.get(&tile_id).and_then(|&i| self.objects.get(i))
    }

    pub fn objects(&self) -> &[CollisionObject] {
        &self.objects
    }

    /// Test the probe at `trans` against every registered shape.
    ///
    /// Normals in the result belong to the probe (`normal1`). Superseded by
    /// per-body checks in the 2D simulation; kept for transformation
    /// modifiers that only know a pose.
    pub fn check_collision(&self, trans: TransformationData) -> Vec<CollisionData> {
        let Some(probe) = &self.probe else {
            warn!("Collision map has no probe shape");
            return Vec::new();
        };
        let mut probe = probe.clone();
        probe.set_transformation(trans);

        let mut dst = Vec::new();
        for object in &self.objects {
            probe.check_collision_into(object, &mut dst);
        }
        dst
    }
}
