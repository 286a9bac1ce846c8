//! Dragging a body around with a tracked cursor.
//!
//! The host thread writes the cursor pose into a [`CursorHandle`] (directly,
//! or through a [`CursorFeed`] registered as a system thread listener) and
//! the connector, registered as a simulation step listener, pulls the body
//! toward it every step. The cursor-to-body offset is captured once when the
//! connector is attached, so the body keeps the grab point it was picked at.

use std::f32::consts::PI;
use std::sync::{Arc, Mutex};

use glam::{Quat, Vec3};
use tracing::{debug, warn};

use super::joint::{shortest_rotation, SpringDamperJoint};
use super::listeners::{SimulationStepListener, SystemThreadListener};
use super::world::{Body3d, BodyId, JointId, RigidWorld};
use super::lock;
use crate::transform::TransformationData;

/// How the connector moves the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionMode {
    /// Set velocities that close the gap.
    Velocity,
    /// Apply clamped spring-damper force and torque.
    Spring,
    /// Reserved; the body is left alone.
    ForceTorque,
    /// Move a kinematic proxy body joined to the target by a spring-damper.
    #[default]
    Joint,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CursorSpringConfig {
    pub mode: ConnectionMode,
    pub linear_spring: f32,
    pub linear_damping: f32,
    pub angular_spring: f32,
    pub angular_damping: f32,
    /// Orientation differences beyond this are taken the other way round.
    pub angular_threshold: f32,
    pub max_force: f32,
    pub max_torque: f32,
}

impl Default for CursorSpringConfig {
    fn default() -> Self {
        Self {
            mode: ConnectionMode::Joint,
            linear_spring: 1.0,
            linear_damping: 100.0,
            angular_spring: 0.01,
            angular_damping: 10.0,
            angular_threshold: PI,
            max_force: 2500.0,
            max_torque: 1250.0,
        }
    }
}

/// Shared cursor pose, written by the host and read on the physics thread.
#[derive(Debug, Clone)]
pub struct CursorHandle(Arc<Mutex<TransformationData>>);

impl CursorHandle {
    pub fn new(trans: TransformationData) -> Self {
        Self(Arc::new(Mutex::new(trans)))
    }

    pub fn set(&self, trans: TransformationData) {
        *lock(&self.0) = trans;
    }

    pub fn get(&self) -> TransformationData {
        *lock(&self.0)
    }

    /// A system thread listener copying `source` into this handle every frame.
    pub fn feed<F>(&self, source: F) -> CursorFeed
    where
        F: FnMut() -> TransformationData + Send + 'static,
    {
        CursorFeed {
            handle: self.clone(),
            source: Box::new(source),
        }
    }
}

/// Polls a cursor source from the system thread.
pub struct CursorFeed {
    handle: CursorHandle,
    source: Box<dyn FnMut() -> TransformationData + Send>,
}

impl SystemThreadListener for CursorFeed {
    fn system_update(&mut self, _dt: f32) {
        self.handle.set((self.source)());
    }
}

#[derive(Debug)]
pub struct CursorSpringConnector {
    body: BodyId,
    cursor: CursorHandle,
    config: CursorSpringConfig,
    cursor_to_body: TransformationData,
    body_to_cursor: TransformationData,
    last_cursor: TransformationData,
    proxy: Option<(BodyId, JointId)>,
}

impl CursorSpringConnector {
    /// Grab `body` at the current cursor pose. `None` if the body does not
    /// exist.
    pub fn attach(
        world: &mut RigidWorld,
        body: BodyId,
        cursor: CursorHandle,
        config: CursorSpringConfig,
    ) -> Option<Self> {
        let Some(body_trans) = world.body(body).map(Body3d::transformation) else {
            warn!("Cannot attach cursor: body {:?} not found", body);
            return None;
        };
        let cursor_trans = cursor.get();

        let cursor_to_body = cursor_trans.inverse().multiply(&body_trans);
        let body_to_cursor = body_trans.inverse().multiply(&cursor_trans);

        let proxy = match config.mode {
            ConnectionMode::Joint => {
                let proxy = world.add_body(Body3d::kinematic(body_trans));
                let joint = world.add_joint(
                    SpringDamperJoint::new(proxy, body)
                        .with_linear_constants(config.linear_spring, config.linear_damping)
                        .with_angular_constants(config.angular_spring, config.angular_damping),
                );
                Some((proxy, joint))
            }
            ConnectionMode::ForceTorque => {
                warn!("ForceTorque cursor mode is not implemented, body {:?} stays put", body);
                None
            }
            _ => None,
        };

        Some(Self {
            body,
            cursor,
            config,
            cursor_to_body,
            body_to_cursor,
            last_cursor: cursor_trans,
            proxy,
        })
    }

    /// Remove the proxy body and joint, if any.
    pub fn detach(self, world: &mut RigidWorld) {
        if let Some((proxy, joint)) = self.proxy {
            world.remove_joint(joint);
            world.remove_body(proxy);
        }
    }

    pub fn body(&self) -> BodyId {
        self.body
    }

    pub fn mode(&self) -> ConnectionMode {
        self.config.mode
    }

    pub fn cursor(&self) -> &CursorHandle {
        &self.cursor
    }

    /// Proxy body driven in [`ConnectionMode::Joint`].
    pub fn proxy_body(&self) -> Option<BodyId> {
        self.proxy.map(|(body, _)| body)
    }

    /// Cursor pose used in the previous step.
    pub fn last_cursor(&self) -> TransformationData {
        self.last_cursor
    }

    fn execute_velocity(&self, dt: f32, cursor: &TransformationData, body: &mut Body3d) {
        let target = cursor.multiply(&self.cursor_to_body);
        let position_diff = target.position - body.position;
        let (axis, angle) = shortest_rotation(target.orientation * body.orientation.inverse());

        body.linear_velocity = position_diff * (0.5 / dt);
        body.angular_velocity = axis * angle / dt;
    }

    fn execute_spring(&self, cursor: &TransformationData, body: &mut Body3d) {
        if !body.is_dynamic() {
            return;
        }
        let mass = body.mass();
        let anchor = body.transformation().multiply(&self.body_to_cursor);

        let mut force = (cursor.position - anchor.position) * self.config.linear_spring;
        // Cursor velocity is left out; it makes the forces explode.
        force -= body.point_velocity(anchor.position) * self.config.linear_damping;
        force *= mass;
        if force.length() > self.config.max_force {
            debug!("Cursor force {} clamped to {}", force.length(), self.config.max_force);
            force = force.normalize_or_zero() * self.config.max_force;
        }
        body.add_force_at_position(force, anchor.position);

        let (axis, angle) = self.wrapped_axis_angle(cursor.orientation * anchor.orientation.inverse());
        let mut torque = axis * angle * self.config.angular_spring;
        torque -= body.angular_velocity * self.config.angular_damping;
        torque *= mass;
        if torque.length() > self.config.max_torque {
            debug!("Cursor torque {} clamped to {}", torque.length(), self.config.max_torque);
            torque = torque.normalize_or_zero() * self.config.max_torque;
        }
        body.add_torque(torque);
    }

    /// Axis and angle with the angle folded into `(threshold - 2π, threshold]`.
    fn wrapped_axis_angle(&self, q: Quat) -> (Vec3, f32) {
        let (axis, mut angle) = q.normalize().to_axis_angle();
        if !angle.is_finite() || !axis.is_finite() {
            return (Vec3::X, 0.0);
        }
        if angle > self.config.angular_threshold {
            angle -= 2.0 * PI;
        } else if angle < -self.config.angular_threshold {
            angle += 2.0 * PI;
        }
        (axis, angle)
    }

    fn execute_joint(&self, cursor: &TransformationData, world: &mut RigidWorld) {
        let Some((proxy, _)) = self.proxy else {
            return;
        };
        let target = cursor.multiply(&self.cursor_to_body);
        if let Some(proxy) = world.body_mut(proxy) {
            proxy.set_transformation(&target);
        }
    }
}

impl SimulationStepListener<RigidWorld> for CursorSpringConnector {
    fn step(&mut self, dt: f32, _simulation_time: u32, world: &mut RigidWorld) {
        let cursor = self.cursor.get();
        let mode = self.config.mode;
        match mode {
            ConnectionMode::Joint => self.execute_joint(&cursor, world),
            ConnectionMode::ForceTorque => {}
            ConnectionMode::Velocity | ConnectionMode::Spring => {
                let Some(body) = world.body_mut(self.body) else {
                    warn!("Cursor body {:?} not found in simulation", self.body);
                    return;
                };
                if mode == ConnectionMode::Velocity {
                    self.execute_velocity(dt, &cursor, body);
                } else {
                    self.execute_spring(&cursor, body);
                }
            }
        }
        self.last_cursor = cursor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics3d::{Physics, PhysicsConfig, Simulation};

    fn setup(mode: ConnectionMode, mass: f32) -> (RigidWorld, BodyId, CursorHandle, CursorSpringConnector) {
        let mut world = RigidWorld::new();
        world.set_gravity(Vec3::ZERO);
        let body = world.add_body(Body3d::new(Vec3::new(1.0, 0.0, 0.0), mass));
        let cursor = CursorHandle::new(TransformationData::identity());
        let config = CursorSpringConfig {
            mode,
            ..CursorSpringConfig::default()
        };
        let connector = CursorSpringConnector::attach(&mut world, body, cursor.clone(), config).unwrap();
        (world, body, cursor, connector)
    }

    #[test]
    fn test_missing_body() {
        let mut world = RigidWorld::new();
        let removed = world.add_body(Body3d::new(Vec3::ZERO, 1.0));
        world.remove_body(removed);
        let cursor = CursorHandle::new(TransformationData::identity());
        assert!(CursorSpringConnector::attach(&mut world, removed, cursor, CursorSpringConfig::default()).is_none());
    }

    #[test]
    fn test_velocity_mode_keeps_grab_offset() {
        let (mut world, body, cursor, mut connector) = setup(ConnectionMode::Velocity, 1.0);
        cursor.set(TransformationData::from_position(Vec3::new(1.0, 0.0, 0.0)));
        connector.step(0.01, 0, &mut world);

        let eps = 1e-3;
        let v = world.body(body).unwrap().linear_velocity;
        assert!((v - Vec3::new(50.0, 0.0, 0.0)).length() < eps, "v = {:?}", v);
        assert!(world.body(body).unwrap().angular_velocity.length() < eps);
        assert_eq!(connector.last_cursor().position, Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_spring_force_scaled_by_mass() {
        let (mut world, body, cursor, mut connector) = setup(ConnectionMode::Spring, 2.0);
        cursor.set(TransformationData::from_position(Vec3::new(1.0, 0.0, 0.0)));
        connector.step(0.01, 0, &mut world);

        let eps = 1e-4;
        let force = world.body(body).unwrap().force();
        assert!((force - Vec3::new(2.0, 0.0, 0.0)).length() < eps, "force = {:?}", force);
        assert!(world.body(body).unwrap().torque().length() < eps);
    }

    #[test]
    fn test_spring_force_clamped() {
        let (mut world, body, cursor, mut connector) = setup(ConnectionMode::Spring, 2.0);
        cursor.set(TransformationData::from_position(Vec3::new(0.0, 10_000.0, 0.0)));
        connector.step(0.01, 0, &mut world);

        let eps = 1e-2;
        let force = world.body(body).unwrap().force();
        assert!((force.length() - 2500.0).abs() < eps, "|force| = {}", force.length());
        assert!(force.y > 0.0);
    }

    #[test]
    fn test_spring_torque_takes_short_way() {
        let mut world = RigidWorld::new();
        let body = world.add_body(Body3d::new(Vec3::ZERO, 1.0));
        let cursor = CursorHandle::new(TransformationData::identity());
        let config = CursorSpringConfig {
            mode: ConnectionMode::Spring,
            ..CursorSpringConfig::default()
        };
        let mut connector = CursorSpringConnector::attach(&mut world, body, cursor.clone(), config).unwrap();
        cursor.set(TransformationData::from_position_orientation(
            Vec3::ZERO,
            Quat::from_rotation_y(1.5 * PI),
        ));
        connector.step(0.01, 0, &mut world);

        let eps = 1e-4;
        let torque = world.body(body).unwrap().torque();
        let expected = -0.5 * PI * 0.01;
        assert!((torque.y - expected).abs() < eps, "torque = {:?}", torque);
    }

    #[test]
    fn test_joint_mode_proxy_follows_cursor() {
        let (mut world, body, cursor, mut connector) = setup(ConnectionMode::Joint, 1.0);
        let proxy = connector.proxy_body().unwrap();
        assert_eq!(world.body_count(), 2);
        assert!(!world.body(proxy).unwrap().is_dynamic());

        cursor.set(TransformationData::from_position(Vec3::new(1.0, 0.0, 0.0)));
        for _ in 0..50 {
            connector.step(0.01, 0, &mut world);
            world.step();
        }
        let eps = 1e-4;
        assert!((world.body(proxy).unwrap().position.x - 2.0).abs() < eps);
        let x = world.body(body).unwrap().position.x;
        assert!(x > 1.0 && x < 2.0, "x = {}", x);

        connector.detach(&mut world);
        assert_eq!(world.body_count(), 1);
    }

    #[test]
    fn test_force_torque_mode_is_inert() {
        let (mut world, body, cursor, mut connector) = setup(ConnectionMode::ForceTorque, 1.0);
        cursor.set(TransformationData::from_position(Vec3::new(5.0, 0.0, 0.0)));
        connector.step(0.01, 0, &mut world);
        assert_eq!(world.body(body).unwrap().force(), Vec3::ZERO);
        assert_eq!(world.body(body).unwrap().linear_velocity, Vec3::ZERO);
        assert!(connector.proxy_body().is_none());
    }

    #[test]
    fn test_feed_and_physics_wiring() {
        let config = PhysicsConfig {
            gravity: Vec3::ZERO,
            ..PhysicsConfig::default()
        };
        let physics = Physics::new(RigidWorld::new(), &config).unwrap();
        let cursor = CursorHandle::new(TransformationData::identity());
        let body = physics.with_simulation(|world| world.add_body(Body3d::new(Vec3::ZERO, 1.0)));
        let connector = physics
            .with_simulation(|world| {
                let config = CursorSpringConfig {
                    mode: ConnectionMode::Velocity,
                    ..CursorSpringConfig::default()
                };
                CursorSpringConnector::attach(world, body, cursor.clone(), config)
            })
            .unwrap();
        physics.add_simulation_step_listener(Box::new(connector));
        physics.add_system_thread_listener(Box::new(
            cursor.feed(|| TransformationData::from_position(Vec3::new(0.0, 0.0, 1.0))),
        ));

        physics.update(0.016);
        assert_eq!(cursor.get().position, Vec3::new(0.0, 0.0, 1.0));

        physics.step();
        let eps = 1e-3;
        let z = physics.with_simulation(|world| world.body(body).unwrap().position.z);
        // v = 1 * 0.5 / 0.01, integrated over one step.
        assert!((z - 0.5).abs() < eps, "z = {}", z);
    }
}
