//! 2D collision detection in the XZ plane.
//!
//! # Architecture
//!
//! 1. [`CollisionShape`] is a closed set of primitives (circle, line set)
//! 2. [`CollisionObject`] pairs a shape with its current world pose
//! 3. Pair tests are looked up in a table keyed by the two shape kinds; when
//!    only the reversed pairing is implemented it runs with the operands
//!    swapped and the normals exchanged afterwards
//! 4. [`CollisionMap`] owns the static line sets of the world tiles
//!
//! The Y (up) coordinate of every pose is ignored by the tests.

pub mod circle;
pub mod line_set;
pub mod map;
pub mod modifier;

pub use circle::CollisionCircle;
pub use line_set::{
    CollisionLine, CollisionLineSet, CollisionLineSetFactory, MeshLineSetFactory,
    TextLineSetFactory,
};
pub use map::CollisionMap;
pub use modifier::CheckCollisionModifier;

use glam::{Vec2, Vec3};
use std::sync::Arc;
use tracing::error;

use crate::transform::TransformationData;

/// One contact produced by a pair test.
///
/// `normal1` points from the first object toward the collision point and
/// `normal2` from the second; they are always exact negations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionData {
    pub normal1: Vec2,
    pub normal2: Vec2,
    /// Collision point in world XZ coordinates.
    pub point: Vec2,
    /// Penetration depth. Zero for line-line intersections.
    pub penetration: f32,
}

impl CollisionData {
    /// Build a contact from the first object's normal.
    pub fn new(normal1: Vec2, point: Vec2, penetration: f32) -> Self {
        Self {
            normal1,
            normal2: -normal1,
            point,
            penetration,
        }
    }

    /// The same contact seen from the other object.
    pub fn swapped(self) -> Self {
        Self {
            normal1: self.normal2,
            normal2: self.normal1,
            ..self
        }
    }
}

/// Collision primitives.
#[derive(Debug, Clone)]
pub enum CollisionShape {
    Circle(CollisionCircle),
    /// Line sets are immutable once loaded and shared between tiles.
    LineSet(Arc<CollisionLineSet>),
}

/// Discriminant of [`CollisionShape`], used as the dispatch key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    Circle,
    LineSet,
}

impl CollisionShape {
    pub fn kind(&self) -> ShapeKind {
        match self {
            CollisionShape::Circle(_) => ShapeKind::Circle,
            CollisionShape::LineSet(_) => ShapeKind::LineSet,
        }
    }
}

/// A shape together with its world pose.
///
/// The pose must be updated before every query.
#[derive(Debug, Clone)]
pub struct CollisionObject {
    pub shape: CollisionShape,
    pub transformation: TransformationData,
}

/// Narrow-phase test appending contacts seen from the first object.
pub type PairTest = fn(&CollisionObject, &CollisionObject, &mut Vec<CollisionData>);

/// Implemented pairings. A pairing listed as (A, B) also serves (B, A).
const PAIR_TESTS: &[(ShapeKind, ShapeKind, PairTest)] = &[
    (ShapeKind::Circle, ShapeKind::Circle, circle::circle_circle),
    (ShapeKind::LineSet, ShapeKind::Circle, line_set::line_set_circle),
    (ShapeKind::LineSet, ShapeKind::LineSet, line_set::line_set_line_set),
];

/// Find the test for a pairing and whether the operands must be swapped.
pub fn pair_test(a: ShapeKind, b: ShapeKind) -> Option<(PairTest, bool)> {
    PAIR_TESTS
        .iter()
        .find(|(ka, kb, _)| *ka == a && *kb == b)
        .map(|(_, _, test)| (*test, false))
        .or_else(|| {
            PAIR_TESTS
                .iter()
                .find(|(ka, kb, _)| *ka == b && *kb == a)
                .map(|(_, _, test)| (*test, true))
        })
}

impl CollisionObject {
    pub fn new(shape: CollisionShape) -> Self {
        Self {
            shape,
            transformation: TransformationData::identity(),
        }
    }

    /// A circle of the given radius at the origin.
    pub fn circle(radius: f32) -> Self {
        Self::new(CollisionShape::Circle(CollisionCircle::new(radius)))
    }

    /// A shared line set at the origin.
    pub fn line_set(lines: Arc<CollisionLineSet>) -> Self {
        Self::new(CollisionShape::LineSet(lines))
    }

    pub fn set_transformation(&mut self, trans: TransformationData) {
        self.transformation = trans;
    }

    pub fn transformation(&self) -> &TransformationData {
        &self.transformation
    }

    /// Position projected into the XZ plane.
    pub fn position_2d(&self) -> Vec2 {
        xz(self.transformation.position)
    }

    /// Test against `opponent`, returning contacts seen from `self`.
    pub fn check_collision(&self, opponent: &CollisionObject) -> Vec<CollisionData> {
        let mut dst = Vec::new();
        self.check_collision_into(opponent, &mut dst);
        dst
    }

    /// Test against `opponent`, appending contacts seen from `self` to `dst`.
    ///
    /// Pairings without an implemented test log an error and add nothing.
    pub fn check_collision_into(&self, opponent: &CollisionObject, dst: &mut Vec<CollisionData>) {
        let (a, b) = (self.shape.kind(), opponent.shape.kind());
        match pair_test(a, b) {
            Some((test, false)) => test(self, opponent, dst),
            Some((test, true)) => {
                let start = dst.len();
                test(opponent, self, dst);
                for data in &mut dst[start..] {
                    *data = data.swapped();
                }
            }
            None => error!("No collision test implemented between {:?} and {:?}", a, b),
        }
    }
}

/// Project a 3D point onto the XZ plane.
pub fn xz(v: Vec3) -> Vec2 {
    Vec2::new(v.x, v.z)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn circle_at(radius: f32, x: f32, z: f32) -> CollisionObject {
        let mut obj = CollisionObject::circle(radius);
        obj.set_transformation(TransformationData::from_position(Vec3::new(x, 0.0, z)));
        obj
    }

    fn square_walls() -> CollisionObject {
        let lines = CollisionLineSet::new(vec![
            CollisionLine::new(Vec2::new(-5.0, -5.0), Vec2::new(5.0, -5.0)),
            CollisionLine::new(Vec2::new(5.0, -5.0), Vec2::new(5.0, 5.0)),
        ])
        .unwrap();
        CollisionObject::line_set(Arc::new(lines))
    }

    #[test]
    fn test_dispatch_table_lookup() {
        assert!(matches!(
            pair_test(ShapeKind::Circle, ShapeKind::Circle),
            Some((_, false))
        ));
        assert!(matches!(
            pair_test(ShapeKind::LineSet, ShapeKind::Circle),
            Some((_, false))
        ));
        assert!(matches!(
            pair_test(ShapeKind::Circle, ShapeKind::LineSet),
            Some((_, true))
        ));
    }

    #[test]
    fn test_swapped_dispatch_keeps_normals_from_caller() {
        let walls = square_walls();
        let ball = circle_at(1.0, 4.5, 0.0);

        let from_ball = ball.check_collision(&walls);
        let from_walls = walls.check_collision(&ball);
        assert_eq!(from_ball.len(), 1);
        assert_eq!(from_walls.len(), 1);

        // The ball's normal points toward the wall at x = 5.
        let eps = 1e-5;
        assert!((from_ball[0].normal1 - Vec2::X).length() < eps);
        assert!((from_walls[0].normal2 - Vec2::X).length() < eps);
        assert!((from_ball[0].normal1 + from_ball[0].normal2).length() < eps);
    }

    #[test]
    fn test_normals_are_opposite_for_every_pairing() {
        let walls = square_walls();
        let objects = [circle_at(1.0, 0.0, 0.0), circle_at(1.0, 1.5, 0.0), circle_at(0.7, 4.6, -4.6)];
        for a in &objects {
            for b in objects.iter().chain(std::iter::once(&walls)) {
                if std::ptr::eq(a, b) {
                    continue;
                }
                for data in a.check_collision(b) {
                    assert!(
                        (data.normal1 + data.normal2).length() < 1e-6,
                        "normals not opposite: {:?}",
                        data
                    );
                }
            }
        }
    }
}
