//! Circle primitive.

use glam::Vec2;

use super::{CollisionData, CollisionObject, CollisionShape};

/// A circle in the XZ plane centred on the object's position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionCircle {
    pub radius: f32,
}

impl CollisionCircle {
    pub fn new(radius: f32) -> Self {
        Self { radius }
    }
}

/// Circle-circle test.
///
/// Reports a contact iff the centre distance is below the sum of the radii.
/// The collision point sits in the middle of the overlapping region.
pub fn circle_vs_circle(c1: Vec2, r1: f32, c2: Vec2, r2: f32) -> Option<CollisionData> {
    let diff = c2 - c1;
    let dist = diff.length();
    let penetration = r1 + r2 - dist;
    if penetration <= 0.0 {
        return None;
    }

    // Coincident centres: any direction separates them.
    let normal = if dist > 1e-6 { diff / dist } else { Vec2::X };
    let point = c1 + normal * (r1 - 0.5 * penetration);
    Some(CollisionData::new(normal, point, penetration))
}

pub(super) fn circle_circle(a: &CollisionObject, b: &CollisionObject, dst: &mut Vec<CollisionData>) {
    let (CollisionShape::Circle(ca), CollisionShape::Circle(cb)) = (&a.shape, &b.shape) else {
        return;
    };
    if let Some(data) = circle_vs_circle(a.position_2d(), ca.radius, b.position_2d(), cb.radius) {
        dst.push(data);
    }
}
