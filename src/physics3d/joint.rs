//! Spring-damper coupling between two bodies.

use glam::{Quat, Vec3};

use super::world::{BodyId, RigidWorld};

/// Pulls `body_b` toward the pose of `body_a` and vice versa.
///
/// Linear part: `k * (pa - pb) + c * (va - vb)` on `b`, negated on `a`.
/// Angular part works the same on the shortest rotation from `b` to `a`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpringDamperJoint {
    pub body_a: BodyId,
    pub body_b: BodyId,
    pub linear_spring: f32,
    pub linear_damping: f32,
    pub angular_spring: f32,
    pub angular_damping: f32,
}

impl SpringDamperJoint {
    /// A joint with all constants zero; set them with the builder methods.
    pub fn new(body_a: BodyId, body_b: BodyId) -> Self {
        Self {
            body_a,
            body_b,
            linear_spring: 0.0,
            linear_damping: 0.0,
            angular_spring: 0.0,
            angular_damping: 0.0,
        }
    }

    pub fn with_linear_constants(mut self, spring: f32, damping: f32) -> Self {
        self.linear_spring = spring;
        self.linear_damping = damping;
        self
    }

    pub fn with_angular_constants(mut self, spring: f32, damping: f32) -> Self {
        self.angular_spring = spring;
        self.angular_damping = damping;
        self
    }

    pub fn connects(&self, body: BodyId) -> bool {
        self.body_a == body || self.body_b == body
    }

    /// Accumulate the joint's force and torque on both bodies.
    pub fn apply(&self, world: &mut RigidWorld) {
        let Some((a, b)) = world.body_pair_mut(self.body_a, self.body_b) else {
            return;
        };

        let force = (a.position - b.position) * self.linear_spring
            + (a.linear_velocity - b.linear_velocity) * self.linear_damping;

        let (axis, angle) = shortest_rotation(a.orientation * b.orientation.inverse());
        let torque = axis * angle * self.angular_spring
            + (a.angular_velocity - b.angular_velocity) * self.angular_damping;

        b.add_force(force);
        b.add_torque(torque);
        a.add_force(-force);
        a.add_torque(-torque);
    }
}

/// Axis and angle in `[0, π]` of a rotation.
pub(crate) fn shortest_rotation(q: Quat) -> (Vec3, f32) {
    let q = if q.w < 0.0 { -q } else { q };
    let (axis, angle) = q.normalize().to_axis_angle();
    if angle.is_finite() && axis.is_finite() {
        (axis, angle)
    } else {
        (Vec3::X, 0.0)
    }
}
