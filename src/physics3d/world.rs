//! Minimal rigid-body backend the façade can drive.
//!
//! Semi-implicit Euler with unit inertia: good enough for manipulation
//! and tests, not a general-purpose solver.

use glam::{Quat, Vec3};

use super::joint::SpringDamperJoint;
use super::{Simulation, StepFunction};
use crate::transform::TransformationData;

/// Generational handle of a body inside a [`RigidWorld`].
///
/// Slots are reused after removal; a stale id never resolves to the new
/// occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyId {
    index: usize,
    generation: u32,
}

/// Generational handle of a joint inside a [`RigidWorld`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JointId {
    index: usize,
    generation: u32,
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot storage with a free list.
#[derive(Debug)]
struct Slots<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
}

impl<T> Slots<T> {
    fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    fn insert(&mut self, value: T) -> (usize, u32) {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    value: None,
                });
                self.slots.len() - 1
            }
        };
        let slot = &mut self.slots[index];
        slot.value = Some(value);
        (index, slot.generation)
    }

    fn take(&mut self, index: usize) -> Option<T> {
        let slot = self.slots.get_mut(index)?;
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
        Some(value)
    }

    fn remove(&mut self, index: usize, generation: u32) -> Option<T> {
        self.get(index, generation)?;
        self.take(index)
    }

    fn get(&self, index: usize, generation: u32) -> Option<&T> {
        self.slots
            .get(index)
            .filter(|s| s.generation == generation)
            .and_then(|s| s.value.as_ref())
    }

    fn get_mut(&mut self, index: usize, generation: u32) -> Option<&mut T> {
        self.slots
            .get_mut(index)
            .filter(|s| s.generation == generation)
            .and_then(|s| s.value.as_mut())
    }

    fn iter(&self) -> impl Iterator<Item = (usize, u32, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.value.as_ref().map(|v| (i, s.generation, v)))
    }

    fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.slots.iter_mut().filter_map(|s| s.value.as_mut())
    }

    fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }
}

/// A 3D rigid body.
#[derive(Debug, Clone)]
pub struct Body3d {
    pub position: Vec3,
    pub orientation: Quat,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    /// 0 for kinematic bodies that only move when told to.
    pub inv_mass: f32,
    pub gravity_enabled: bool,
    force: Vec3,
    torque: Vec3,
}

impl Body3d {
    pub fn new(position: Vec3, mass: f32) -> Self {
        let mut body = Self {
            position,
            orientation: Quat::IDENTITY,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            inv_mass: 0.0,
            gravity_enabled: true,
            force: Vec3::ZERO,
            torque: Vec3::ZERO,
        };
        body.set_mass(mass);
        body
    }

    /// A body that ignores forces and gravity.
    pub fn kinematic(trans: TransformationData) -> Self {
        Self {
            orientation: trans.orientation,
            gravity_enabled: false,
            ..Self::new(trans.position, 0.0)
        }
    }

    /// Non-positive or non-finite masses make the body kinematic.
    pub fn set_mass(&mut self, mass: f32) {
        self.inv_mass = if mass.is_finite() && mass > 0.0 {
            1.0 / mass
        } else {
            0.0
        };
    }

    /// Infinite for kinematic bodies.
    pub fn mass(&self) -> f32 {
        if self.inv_mass > 0.0 {
            1.0 / self.inv_mass
        } else {
            f32::INFINITY
        }
    }

    pub fn is_dynamic(&self) -> bool {
        self.inv_mass > 0.0
    }

    pub fn add_force(&mut self, force: Vec3) {
        self.force += force;
    }

    /// Apply `force` at world point `at`, adding the induced torque.
    pub fn add_force_at_position(&mut self, force: Vec3, at: Vec3) {
        self.force += force;
        self.torque += (at - self.position).cross(force);
    }

    pub fn add_torque(&mut self, torque: Vec3) {
        self.torque += torque;
    }

    pub fn force(&self) -> Vec3 {
        self.force
    }

    pub fn torque(&self) -> Vec3 {
        self.torque
    }

    /// World velocity of a point rigidly attached to the body.
    pub fn point_velocity(&self, at: Vec3) -> Vec3 {
        self.linear_velocity + self.angular_velocity.cross(at - self.position)
    }

    pub fn transformation(&self) -> TransformationData {
        TransformationData::from_position_orientation(self.position, self.orientation)
    }

    /// Teleport. Velocities are kept.
    pub fn set_transformation(&mut self, trans: &TransformationData) {
        self.position = trans.position;
        self.orientation = trans.orientation.normalize();
    }

    fn integrate(&mut self, gravity: Vec3, dt: f32) {
        if !self.is_dynamic() {
            return;
        }
        let gravity = if self.gravity_enabled { gravity } else { Vec3::ZERO };
        self.linear_velocity += (self.force * self.inv_mass + gravity) * dt;
        // Unit inertia scaled with mass.
        self.angular_velocity += self.torque * self.inv_mass * dt;

        self.position += self.linear_velocity * dt;

        let omega = self.angular_velocity;
        if omega.length_squared() > 1e-10 {
            let omega_quat = Quat::from_xyzw(omega.x, omega.y, omega.z, 0.0);
            let q_dot = omega_quat * self.orientation * 0.5;
            self.orientation = Quat::from_xyzw(
                self.orientation.x + q_dot.x * dt,
                self.orientation.y + q_dot.y * dt,
                self.orientation.z + q_dot.z * dt,
                self.orientation.w + q_dot.w * dt,
            )
            .normalize();
        }
    }

    fn clear_forces(&mut self) {
        self.force = Vec3::ZERO;
        self.torque = Vec3::ZERO;
    }
}

/// Bodies and joints stepped with a fixed step size.
#[derive(Debug)]
pub struct RigidWorld {
    bodies: Slots<Body3d>,
    joints: Slots<SpringDamperJoint>,
    gravity: Vec3,
    step_size: f32,
    step_function: StepFunction,
}

impl RigidWorld {
    pub fn new() -> Self {
        Self {
            bodies: Slots::new(),
            joints: Slots::new(),
            gravity: Vec3::new(0.0, -9.81, 0.0),
            step_size: 0.01,
            step_function: StepFunction::default(),
        }
    }

    pub fn add_body(&mut self, body: Body3d) -> BodyId {
        let (index, generation) = self.bodies.insert(body);
        BodyId { index, generation }
    }

    /// Remove a body together with every joint attached to it.
    pub fn remove_body(&mut self, id: BodyId) -> Option<Body3d> {
        let body = self.bodies.remove(id.index, id.generation)?;
        let attached: Vec<usize> = self
            .joints
            .iter()
            .filter(|(_, _, j)| j.connects(id))
            .map(|(index, _, _)| index)
            .collect();
        for index in attached {
            self.joints.take(index);
        }
        Some(body)
    }

    pub fn body(&self, id: BodyId) -> Option<&Body3d> {
        self.bodies.get(id.index, id.generation)
    }

    pub fn body_mut(&mut self, id: BodyId) -> Option<&mut Body3d> {
        self.bodies.get_mut(id.index, id.generation)
    }

    pub fn bodies(&self) -> impl Iterator<Item = (BodyId, &Body3d)> {
        self.bodies
            .iter()
            .map(|(index, generation, b)| (BodyId { index, generation }, b))
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn add_joint(&mut self, joint: SpringDamperJoint) -> JointId {
        let (index, generation) = self.joints.insert(joint);
        JointId { index, generation }
    }

    pub fn remove_joint(&mut self, id: JointId) -> Option<SpringDamperJoint> {
        self.joints.remove(id.index, id.generation)
    }

    pub fn joint(&self, id: JointId) -> Option<&SpringDamperJoint> {
        self.joints.get(id.index, id.generation)
    }

    pub fn joint_mut(&mut self, id: JointId) -> Option<&mut SpringDamperJoint> {
        self.joints.get_mut(id.index, id.generation)
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn gravity(&self) -> Vec3 {
        self.gravity
    }

    pub fn step_size(&self) -> f32 {
        self.step_size
    }

    pub fn step_function(&self) -> StepFunction {
        self.step_function
    }

    /// Mutable access to two distinct live bodies at once.
    pub(crate) fn body_pair_mut(
        &mut self,
        a: BodyId,
        b: BodyId,
    ) -> Option<(&mut Body3d, &mut Body3d)> {
        if a.index == b.index {
            return None;
        }
        let (lo, hi, swapped) = if a.index < b.index { (a, b, false) } else { (b, a, true) };
        if hi.index >= self.bodies.slots.len() {
            return None;
        }
        let (left, right) = self.bodies.slots.split_at_mut(hi.index);
        let first = &mut left[lo.index];
        let second = &mut right[0];
        if first.generation != lo.generation || second.generation != hi.generation {
            return None;
        }
        let first = first.value.as_mut()?;
        let second = second.value.as_mut()?;
        Some(if swapped { (second, first) } else { (first, second) })
    }
}

impl Default for RigidWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulation for RigidWorld {
    fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = gravity;
    }

    fn set_step_size(&mut self, step_size: f32) {
        self.step_size = step_size;
    }

    fn set_step_function(&mut self, step_function: StepFunction) {
        self.step_function = step_function;
    }

    fn step(&mut self) {
        let substeps = self.step_function.substeps();
        let h = self.step_size / substeps as f32;
        for _ in 0..substeps {
            // Joint forces are recomputed per substep, external forces persist
            // for the whole step.
            let external: Vec<(Vec3, Vec3)> = self
                .bodies
                .slots
                .iter()
                .map(|s| s.value.as_ref().map_or((Vec3::ZERO, Vec3::ZERO), |b| (b.force, b.torque)))
                .collect();

            for i in 0..self.joints.capacity() {
                if let Some(joint) = self.joints.slots[i].value {
                    joint.apply(self);
                }
            }
            let gravity = self.gravity;
            for body in self.bodies.values_mut() {
                body.integrate(gravity, h);
            }
            for (slot, (force, torque)) in self.bodies.slots.iter_mut().zip(external) {
                if let Some(body) = &mut slot.value {
                    body.force = force;
                    body.torque = torque;
                }
            }
        }
        for body in self.bodies.values_mut() {
            body.clear_forces();
        }
    }
}
