//! Transformation-pipe stage that keeps a user from walking through walls.

use anyhow::Result;
use glam::Vec3;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use super::{CollisionLineSetFactory, CollisionMap, CollisionObject};
use crate::transform::{PipeDescriptor, TransformationData, TransformationModifier};

/// Movement into a wall below this is ignored.
const CORRECTION_THRESHOLD: f32 = -0.0001;

/// Removes the part of each frame's movement that points into colliding
/// geometry.
///
/// The last emitted pose is remembered per user; the first pose of a user
/// passes unchanged.
pub struct CheckCollisionModifier {
    map: CollisionMap,
    last: HashMap<u32, TransformationData>,
    /// Extra correction passes after the first one. Default: 0.
    pub max_repeats: u32,
}

impl CheckCollisionModifier {
    /// Use `map`, which must have a probe shape.
    pub fn new(map: CollisionMap) -> Self {
        Self {
            map,
            last: HashMap::new(),
            max_repeats: 0,
        }
    }

    /// A circle probe of `radius` against the line set in `path`.
    pub fn from_file(
        radius: f32,
        path: &Path,
        file_type: &str,
        factory: &dyn CollisionLineSetFactory,
    ) -> Result<Self> {
        let mut map = CollisionMap::with_probe(CollisionObject::circle(radius));
        map.load_collision_line_set(path, file_type, TransformationData::identity(), factory)?;
        Ok(Self::new(map))
    }

    /// Correct `current` for user `user_id`.
    pub fn correct(&mut self, user_id: u32, current: TransformationData) -> TransformationData {
        let Some(last) = self.last.get(&user_id).copied() else {
            self.last.insert(user_id, current);
            return current;
        };

        let mut result = current;
        let collisions = self.map.check_collision(current);
        let mut movement = current.position - last.position;

        let mut repeats = 0;
        loop {
            let mut corrected = false;
            for data in &collisions {
                let normal = -Vec3::new(data.normal1.x, 0.0, data.normal1.y).normalize_or_zero();
                let fraction = movement.dot(normal);
                if fraction < CORRECTION_THRESHOLD {
                    let correction = normal * -fraction;
                    result.position += correction;
                    movement += correction;
                    corrected = true;
                }
            }
            if !corrected || repeats >= self.max_repeats {
                break;
            }
            repeats += 1;
        }
        if repeats > 0 {
            debug!("Collision correction for user {} needed {} repeats", user_id, repeats);
        }

        self.last.insert(user_id, result);
        result
    }
}

impl TransformationModifier for CheckCollisionModifier {
    fn execute(
        &mut self,
        last_stage: TransformationData,
        pipe: &PipeDescriptor,
    ) -> TransformationData {
        self.correct(pipe.user_id, last_stage)
    }
}
