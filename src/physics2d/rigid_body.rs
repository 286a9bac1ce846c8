//! State of a body in the 2D simulation.

use glam::{Mat3, Quat, Vec2, Vec3};
use std::fmt;

use super::simulation::CollisionCallbackData;
use crate::collision::CollisionObject;
use crate::transform::TransformationData;

/// Body-local axes in the identity orientation.
pub const RIGHT: Vec3 = Vec3::X;
pub const UP: Vec3 = Vec3::Y;
pub const FORWARD: Vec3 = Vec3::Z;

/// Non-owning reference to the entity a body represents.
///
/// Packs into the 32-bit type based id used by pipe descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityId {
    pub entity_type: u16,
    pub id: u16,
}

impl EntityId {
    pub fn new(entity_type: u16, id: u16) -> Self {
        Self { entity_type, id }
    }

    /// `type << 16 | id`.
    pub fn type_based_id(&self) -> u32 {
        (self.entity_type as u32) << 16 | self.id as u32
    }

    pub fn from_type_based_id(value: u32) -> Self {
        Self {
            entity_type: (value >> 16) as u16,
            id: (value & 0xFFFF) as u16,
        }
    }
}

/// Called with the contact before the response is applied.
pub type CollisionCallback = Box<dyn FnMut(&CollisionCallbackData) + Send>;

/// A rigid body moving on the ground plane.
///
/// `force` and `torque` accumulate during a step and are reset to their
/// constant parts afterwards.
pub struct RigidBody {
    pub(crate) x: Vec3,
    pub(crate) v: Vec3,
    pub(crate) ang_v: Vec3,
    pub(crate) constant_force: Vec3,
    pub(crate) force: Vec3,
    pub(crate) constant_torque: Vec3,
    pub(crate) torque: Vec3,
    pub(crate) inv_mass: f32,
    pub(crate) orientation: Quat,
    pub(crate) right: Vec3,
    pub(crate) up: Vec3,
    pub(crate) forward: Vec3,
    /// Negative disables the broad phase for this body.
    pub(crate) bounding_radius: f32,
    pub(crate) shape: Option<CollisionObject>,
    pub(crate) movable: bool,
    pub(crate) entity: Option<EntityId>,
    pub(crate) collision_callback: Option<CollisionCallback>,
}

impl Default for RigidBody {
    fn default() -> Self {
        Self {
            x: Vec3::ZERO,
            v: Vec3::ZERO,
            ang_v: Vec3::ZERO,
            constant_force: Vec3::ZERO,
            force: Vec3::ZERO,
            constant_torque: Vec3::ZERO,
            torque: Vec3::ZERO,
            inv_mass: 1.0,
            orientation: Quat::IDENTITY,
            right: RIGHT,
            up: UP,
            forward: FORWARD,
            bounding_radius: -1.0,
            shape: None,
            movable: true,
            entity: None,
            collision_callback: None,
        }
    }
}

impl fmt::Debug for RigidBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RigidBody")
            .field("x", &self.x)
            .field("v", &self.v)
            .field("ang_v", &self.ang_v)
            .field("inv_mass", &self.inv_mass)
            .field("orientation", &self.orientation)
            .field("bounding_radius", &self.bounding_radius)
            .field("movable", &self.movable)
            .field("entity", &self.entity)
            .field("notify_at_collision", &self.collision_callback.is_some())
            .finish_non_exhaustive()
    }
}

impl RigidBody {
    pub fn new() -> Self {
        Self::default()
    }

    /// A movable body with a circle shape whose radius doubles as bounding radius.
    pub fn circle(position: Vec3, radius: f32) -> Self {
        let mut body = Self {
            x: position,
            bounding_radius: radius,
            ..Self::default()
        };
        body.set_shape(CollisionObject::circle(radius));
        body
    }

    pub fn position(&self) -> Vec3 {
        self.x
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.x = position;
    }

    /// Position projected onto the ground plane, `(x, z)`.
    pub fn position_2d(&self) -> Vec2 {
        Vec2::new(self.x.x, self.x.z)
    }

    pub fn velocity(&self) -> Vec3 {
        self.v
    }

    pub fn set_velocity(&mut self, velocity: Vec3) {
        self.v = velocity;
    }

    pub fn angular_velocity(&self) -> Vec3 {
        self.ang_v
    }

    pub fn set_angular_velocity(&mut self, angular_velocity: Vec3) {
        self.ang_v = angular_velocity;
    }

    /// Component of the velocity along `direction`, as a vector.
    pub fn collision_velocity(&self, direction: Vec3) -> Vec3 {
        direction.normalize_or_zero() * self.v.dot(direction)
    }

    pub fn orientation(&self) -> Quat {
        self.orientation
    }

    /// Set the orientation and rotate the body axes with it.
    pub fn set_orientation(&mut self, orientation: Quat) {
        self.orientation = orientation;
        self.right = orientation * RIGHT;
        self.up = orientation * UP;
        self.forward = orientation * FORWARD;
    }

    pub fn right(&self) -> Vec3 {
        self.right
    }

    pub fn up(&self) -> Vec3 {
        self.up
    }

    pub fn forward(&self) -> Vec3 {
        self.forward
    }

    /// Lean the body onto `up`, keeping its heading as far as possible.
    pub fn set_up(&mut self, up: Vec3) {
        self.up = up.normalize_or(self.up);
        self.adjust_orientation();
    }

    /// Replace the right axis and rebuild the basis around it.
    pub fn set_right(&mut self, right: Vec3) {
        self.right = right.normalize_or(self.right);
        self.forward = self.right.cross(self.up).normalize_or(self.forward);
        self.up = self.forward.cross(self.right).normalize_or(self.up);
        self.orientation = Quat::from_mat3(&Mat3::from_cols(self.right, self.up, self.forward))
            .normalize();
    }

    /// Replace the forward axis and rebuild the basis around it.
    pub fn set_forward(&mut self, forward: Vec3) {
        self.forward = forward.normalize_or(self.forward);
        self.right = self.up.cross(self.forward).normalize_or(self.right);
        self.up = self.forward.cross(self.right).normalize_or(self.up);
        self.orientation = Quat::from_mat3(&Mat3::from_cols(self.right, self.up, self.forward))
            .normalize();
    }

    /// Re-orthonormalize right and forward around the current up axis and
    /// derive the orientation from the basis.
    pub fn adjust_orientation(&mut self) {
        self.right = self.up.cross(self.forward).normalize_or(self.right);
        self.forward = self.right.cross(self.up).normalize_or(self.forward);
        self.orientation = Quat::from_mat3(&Mat3::from_cols(self.right, self.up, self.forward))
            .normalize();
    }

    /// Inverse mass; zero means immovable.
    pub fn inv_mass(&self) -> f32 {
        self.inv_mass
    }

    pub fn set_inv_mass(&mut self, inv_mass: f32) {
        self.inv_mass = inv_mass;
    }

    /// Set the mass. Zero or non-finite inverse mass makes the body immovable.
    pub fn set_mass(&mut self, mass: f32) {
        let inv = 1.0 / mass;
        self.inv_mass = if inv.is_finite() { inv } else { 0.0 };
    }

    pub fn force(&self) -> Vec3 {
        self.force
    }

    pub fn torque(&self) -> Vec3 {
        self.torque
    }

    /// Add a force for the next step only.
    pub fn add_force(&mut self, force: Vec3) {
        self.force += force;
    }

    pub fn add_torque(&mut self, torque: Vec3) {
        self.torque += torque;
    }

    /// Replace the standing force; only the difference reaches the accumulator.
    pub fn set_constant_force(&mut self, force: Vec3) {
        self.force = self.force - self.constant_force + force;
        self.constant_force = force;
    }

    pub fn set_constant_torque(&mut self, torque: Vec3) {
        self.torque = self.torque - self.constant_torque + torque;
        self.constant_torque = torque;
    }

    pub fn constant_force(&self) -> Vec3 {
        self.constant_force
    }

    pub fn constant_torque(&self) -> Vec3 {
        self.constant_torque
    }

    pub fn bounding_radius(&self) -> f32 {
        self.bounding_radius
    }

    pub fn set_bounding_radius(&mut self, radius: f32) {
        self.bounding_radius = radius;
    }

    pub fn shape(&self) -> Option<&CollisionObject> {
        self.shape.as_ref()
    }

    pub fn set_shape(&mut self, mut shape: CollisionObject) {
        shape.set_transformation(self.transformation());
        self.shape = Some(shape);
    }

    pub fn is_movable(&self) -> bool {
        self.movable
    }

    pub fn set_movable(&mut self, movable: bool) {
        self.movable = movable;
    }

    /// Fixed bodies are neither integrated nor pushed by collisions.
    pub fn is_fixed(&self) -> bool {
        !self.movable || self.inv_mass == 0.0
    }

    pub fn entity(&self) -> Option<EntityId> {
        self.entity
    }

    pub fn set_entity(&mut self, entity: Option<EntityId>) {
        self.entity = entity;
    }

    /// Opt in to collision notifications.
    pub fn set_collision_callback(&mut self, callback: CollisionCallback) {
        self.collision_callback = Some(callback);
    }

    pub fn clear_collision_callback(&mut self) {
        self.collision_callback = None;
    }

    pub fn notify_at_collision(&self) -> bool {
        self.collision_callback.is_some()
    }

    /// Current pose with unit scale.
    pub fn transformation(&self) -> TransformationData {
        TransformationData::from_position_orientation(self.x, self.orientation)
    }

    /// Model-to-world matrix built from the body axes and position.
    pub fn model_to_world(&self) -> glam::Mat4 {
        glam::Mat4::from_cols(
            self.right.extend(0.0),
            self.up.extend(0.0),
            self.forward.extend(0.0),
            self.x.extend(1.0),
        )
    }

    /// Copy the pose onto the collision shape.
    pub(crate) fn sync_shape(&mut self) {
        let trans = self.transformation();
        if let Some(shape) = &mut self.shape {
            shape.set_transformation(trans);
        }
    }

    /// `normal` (XZ) lifted into 3D and projected into the body's up plane.
    pub(crate) fn in_plane_normal(&self, normal: Vec2) -> Vec3 {
        let vec = Vec3::new(normal.x, 0.0, normal.y);
        (vec - vec.dot(self.up) * self.up).normalize_or_zero()
    }
}
