//! Bounding-circle pruning.

use super::RigidBody;

/// Whether two bodies are close enough to need a narrow-phase test.
///
/// A negative bounding radius on either body disables pruning for the pair.
pub fn could_collide(a: &RigidBody, b: &RigidBody) -> bool {
    let (r1, r2) = (a.bounding_radius(), b.bounding_radius());
    if r1 < 0.0 || r2 < 0.0 {
        return true;
    }
    a.position_2d().distance(b.position_2d()) <= r1 + r2
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn body(x: f32, z: f32, radius: f32) -> RigidBody {
        let mut body = RigidBody::new();
        body.set_position(Vec3::new(x, 0.0, z));
        body.set_bounding_radius(radius);
        body
    }

    #[test]
    fn test_unbounded_always_passes() {
        assert!(could_collide(&body(0.0, 0.0, -1.0), &body(1000.0, 0.0, 1.0)));
        assert!(could_collide(&body(0.0, 0.0, 1.0), &body(0.0, -500.0, -1.0)));
    }

    #[test]
    fn test_distance_against_radii() {
        assert!(could_collide(&body(0.0, 0.0, 1.0), &body(1.5, 0.0, 1.0)));
        assert!(could_collide(&body(0.0, 0.0, 1.0), &body(0.0, 2.0, 1.0)));
        assert!(!could_collide(&body(0.0, 0.0, 1.0), &body(0.0, 2.5, 1.0)));
    }

    #[test]
    fn test_height_is_ignored() {
        let a = body(0.0, 0.0, 1.0);
        let mut b = body(1.0, 0.0, 1.0);
        b.set_position(Vec3::new(1.0, 50.0, 0.0));
        assert!(could_collide(&a, &b));
    }
}
