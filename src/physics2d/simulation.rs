//! The 2D stepping loop.

use anyhow::Result;
use glam::{Quat, Vec3};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use super::broadphase::could_collide;
use super::contact::Contact;
use super::rigid_body::{EntityId, RigidBody};
use super::sync_event::SynchronisePhysicsEvent;
use super::world::{TransformationPipe, TransformationPipes, WorldLookup};
use crate::collision::{CollisionData, CollisionMap};
use crate::config::Simulation2dConfig;
use crate::height_map::HeightMapSource;
use crate::transform::PipeDescriptor;

/// Module id written as the source of emitted pipes.
pub const PHYSICS_MODULE_ID: u32 = 10;
/// Module id written as the destination of emitted pipes.
pub const WORLD_DATABASE_ID: u32 = 4;
/// Priority of emitted pipes.
pub const PIPE_PRIORITY: u32 = 0x0E00_0000;

/// Stable reference to a body in a [`Simulation2d`].
///
/// Handles of removed bodies never match a later body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyHandle {
    index: u32,
    generation: u32,
}

/// Handed to a body's collision callback.
#[derive(Debug, Clone, Copy)]
pub struct CollisionCallbackData {
    /// The movable body the response is computed for.
    pub body1: BodyHandle,
    pub body2: Option<BodyHandle>,
    pub data: CollisionData,
    pub v_rel1: f32,
    pub v_rel2: f32,
}

#[derive(Default)]
struct Slot {
    generation: u32,
    body: Option<RigidBody>,
}

/// Rigid bodies on tiled terrain.
///
/// # Architecture
///
/// Each [`step`](Self::step) runs, in order:
///
/// 1. Response to the contacts found by the previous step
/// 2. Explicit Euler integration of every non-fixed body
/// 3. Terrain coupling: the body leans onto the height-map normal of its tile
///    and is held on the ground
/// 4. Pose emission into the body's transformation pipe
/// 5. Collision detection between bodies and against tile geometry
///
/// Missing collaborators (no tile, no height map, no shape) disable the
/// dependent behavior for that body only.
pub struct Simulation2d {
    config: Simulation2dConfig,
    slots: Vec<Slot>,
    free: Vec<u32>,
    contacts: Vec<Contact>,
    collision_map: Option<Arc<CollisionMap>>,
    world: Option<Arc<dyn WorldLookup>>,
    height_maps: Option<Arc<dyn HeightMapSource>>,
    pipe_manager: Option<Box<dyn TransformationPipes>>,
    pipes: BTreeMap<BodyHandle, Box<dyn TransformationPipe>>,
}

impl Simulation2d {
    pub fn new(config: Simulation2dConfig) -> Self {
        Self {
            config,
            slots: Vec::new(),
            free: Vec::new(),
            contacts: Vec::new(),
            collision_map: None,
            world: None,
            height_maps: None,
            pipe_manager: None,
            pipes: BTreeMap::new(),
        }
    }

    /// Create from a `<simulation2D>` config file.
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Simulation2dConfig::from_file(path)?))
    }

    pub fn config(&self) -> &Simulation2dConfig {
        &self.config
    }

    pub fn set_collision_map(&mut self, map: Arc<CollisionMap>) {
        self.collision_map = Some(map);
    }

    pub fn set_world(&mut self, world: Arc<dyn WorldLookup>) {
        self.world = Some(world);
    }

    pub fn set_height_maps(&mut self, height_maps: Arc<dyn HeightMapSource>) {
        self.height_maps = Some(height_maps);
    }

    pub fn set_transformation_pipes(&mut self, pipes: Box<dyn TransformationPipes>) {
        self.pipe_manager = Some(pipes);
    }

    pub fn add_body(&mut self, body: RigidBody) -> BodyHandle {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot::default());
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.body = Some(body);
        BodyHandle {
            index,
            generation: slot.generation,
        }
    }

    /// Remove a body together with its pipe and pending contacts.
    pub fn remove_body(&mut self, handle: BodyHandle) -> Option<RigidBody> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let body = slot.body.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.pipes.remove(&handle);
        self.contacts
            .retain(|c| c.body1 != handle && c.body2 != Some(handle));
        Some(body)
    }

    pub fn body(&self, handle: BodyHandle) -> Option<&RigidBody> {
        self.slots
            .get(handle.index as usize)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.body.as_ref())
    }

    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut RigidBody> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.body.as_mut())
    }

    /// Live bodies in insertion-slot order.
    pub fn bodies(&self) -> impl Iterator<Item = (BodyHandle, &RigidBody)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.body.as_ref().map(|body| {
                (
                    BodyHandle {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    body,
                )
            })
        })
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.body.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Contacts waiting for the next step's response.
    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    /// Drop all bodies, contacts and pipes.
    pub fn clear(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.body.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
            }
        }
        self.contacts.clear();
        self.pipes.clear();
    }

    /// Advance by `dt` seconds.
    pub fn step(&mut self, dt: f32) {
        for contact in std::mem::take(&mut self.contacts) {
            self.collision_response(&contact);
        }

        let up = self.config.up;
        let gravity = self.config.gravity;
        let world = self.world.as_deref();
        let height_maps = self.height_maps.as_deref();

        for (index, slot) in self.slots.iter_mut().enumerate() {
            let Some(body) = slot.body.as_mut() else {
                continue;
            };
            if body.is_fixed() {
                continue;
            }
            let handle = BodyHandle {
                index: index as u32,
                generation: slot.generation,
            };
            let inv_mass = body.inv_mass;

            let tile = world.and_then(|w| w.tile_at(body.x.x, body.x.z));
            let (tile_pos, height_map) = match tile {
                Some(tile) => {
                    let map = height_maps.and_then(|h| h.height_map_of_tile(tile.id));
                    if map.is_none() && height_maps.is_some() {
                        warn!("No height map for tile {}", tile.id);
                    }
                    (tile.position, map)
                }
                None => {
                    trace!("Body {:?} is outside the world", handle);
                    (Vec3::ZERO, None)
                }
            };

            let v_dt = body.v * dt;
            let force_dt = body.force * dt + gravity * (dt / inv_mass);
            let ang_v_dt = body.ang_v * dt;
            let torque_dt = body.torque * dt;

            body.force = body.constant_force;
            body.torque = body.constant_torque;

            body.x += v_dt;
            body.v += force_dt * inv_mass;
            if let Some(axis) = ang_v_dt.try_normalize() {
                let delta = Quat::from_axis_angle(axis, ang_v_dt.length());
                body.set_orientation((body.orientation * delta).normalize());
            }
            body.ang_v += torque_dt * inv_mass;

            let (normal, height) = match &height_map {
                Some(map) => {
                    let (lx, lz) = (body.x.x - tile_pos.x, body.x.z - tile_pos.z);
                    (map.normal(lx, lz).normalize_or(up), map.height(lx, lz))
                }
                None => (up, 0.0),
            };
            body.set_up(normal);

            // Ground contact removes the velocity into the surface only.
            if body.x.y <= height {
                let impulse = normal.dot(body.v);
                if impulse < 0.0 {
                    body.v -= impulse * normal;
                }
                body.x.y = height;
            }

            body.sync_shape();

            let Some(entity) = body.entity else {
                continue;
            };
            let trans = body.transformation();
            let pipe = match self.pipes.entry(handle) {
                std::collections::btree_map::Entry::Occupied(e) => Some(e.into_mut()),
                std::collections::btree_map::Entry::Vacant(e) => self
                    .pipe_manager
                    .as_mut()
                    .and_then(|m| m.open_pipe(entity_pipe(entity)))
                    .map(|pipe| {
                        debug!("Opened transformation pipe for {:?}", entity);
                        e.insert(pipe)
                    }),
            };
            if let Some(pipe) = pipe {
                pipe.push(trans);
            }
        }

        self.check_collision();
    }

    /// Find contacts between bodies and against tile geometry.
    ///
    /// Replaces the pending contact list. Returns whether any contact was found.
    pub fn check_collision(&mut self) -> bool {
        for slot in &mut self.slots {
            if let Some(body) = slot.body.as_mut() {
                body.sync_shape();
            }
        }

        let epsilon = self.config.restitution;
        let handles: Vec<BodyHandle> = self.bodies().map(|(h, _)| h).collect();
        let mut found = Vec::new();
        let mut scratch = Vec::new();

        for (i, &h1) in handles.iter().enumerate() {
            let Some(b1) = self.body(h1) else {
                continue;
            };
            let fixed1 = b1.is_fixed();

            for &h2 in &handles[i + 1..] {
                let Some(b2) = self.body(h2) else {
                    continue;
                };
                if fixed1 && b2.is_fixed() {
                    continue;
                }
                if !could_collide(b1, b2) {
                    continue;
                }
                let (Some(s1), Some(s2)) = (b1.shape(), b2.shape()) else {
                    trace!("Skipping pair {:?}/{:?} without shapes", h1, h2);
                    continue;
                };
                s1.check_collision_into(s2, &mut scratch);
                found.extend(scratch.drain(..).map(|data| Contact {
                    data,
                    body1: h1,
                    body2: Some(h2),
                    epsilon,
                }));
            }

            if fixed1 {
                continue;
            }
            let (Some(world), Some(map)) = (self.world.as_deref(), self.collision_map.as_deref())
            else {
                continue;
            };
            let Some(tile) = world.tile_at(b1.x.x, b1.x.z) else {
                continue;
            };
            let Some(tile_shape) = map.tile_collision_map(tile.id) else {
                continue;
            };
            let Some(s1) = b1.shape() else {
                continue;
            };
            let mut tile_shape = tile_shape.clone();
            tile_shape.transformation.position = tile.position;
            s1.check_collision_into(&tile_shape, &mut scratch);
            found.extend(scratch.drain(..).map(|data| Contact {
                data,
                body1: h1,
                body2: None,
                epsilon,
            }));
        }

        self.contacts = found;
        !self.contacts.is_empty()
    }

    /// Impulse response for one contact.
    ///
    /// A fixed first body is swapped behind the second so that the first
    /// participant is always movable.
    fn collision_response(&mut self, contact: &Contact) {
        let Some(first) = self.body(contact.body1) else {
            return;
        };
        let second = contact.body2.and_then(|h| self.body(h).map(|b| (h, b)));
        let second_fixed = second.map_or(true, |(_, b)| b.is_fixed());
        if first.is_fixed() && second_fixed {
            return;
        }

        let data = contact.data;
        let (h1, h2, n1, n2) = match second {
            Some((h2, _)) if first.is_fixed() => (h2, Some(contact.body1), data.normal2, data.normal1),
            _ => (contact.body1, second.map(|(h, _)| h), data.normal1, data.normal2),
        };

        let Some(b1) = self.body(h1) else {
            return;
        };
        let inv1 = b1.inv_mass;
        let normal1 = b1.in_plane_normal(n1);
        let v_rel1 = normal1.dot(b1.collision_velocity(Vec3::new(n1.x, 0.0, n1.y)));

        let (inv2, normal2, v_rel2) = match h2.and_then(|h| self.body(h)) {
            Some(b2) if !b2.is_fixed() => {
                let normal2 = b2.in_plane_normal(n2);
                let v_rel2 = normal2.dot(b2.collision_velocity(Vec3::new(n2.x, 0.0, n2.y)));
                (b2.inv_mass, normal2, v_rel2)
            }
            _ => (0.0, Vec3::ZERO, 0.0),
        };

        // Already separating.
        if v_rel1 + v_rel2 < 0.0 {
            return;
        }

        let callback_data = CollisionCallbackData {
            body1: h1,
            body2: h2,
            data,
            v_rel1,
            v_rel2,
        };
        for handle in std::iter::once(h1).chain(h2) {
            self.notify(handle, &callback_data);
        }

        let impulse = -(1.0 + contact.epsilon) * (v_rel1 + v_rel2) / (inv1 + inv2);
        if let Some(b1) = self.body_mut(h1) {
            b1.v += impulse * inv1 * normal1;
        }
        if let Some(b2) = h2.and_then(|h| self.body_mut(h)) {
            if !b2.is_fixed() {
                b2.v += impulse * inv2 * normal2;
            }
        }
    }

    fn notify(&mut self, handle: BodyHandle, data: &CollisionCallbackData) {
        let Some(body) = self.body_mut(handle) else {
            return;
        };
        if let Some(mut callback) = body.collision_callback.take() {
            callback(data);
            if let Some(body) = self.body_mut(handle) {
                body.collision_callback = Some(callback);
            }
        }
    }

    /// Snapshot of the open pipes for remote simulations.
    pub fn create_sync_event(&self) -> SynchronisePhysicsEvent {
        let event = SynchronisePhysicsEvent::new(self.pipes.values().map(|p| p.descriptor()).collect());
        info!("Sync event announces {} pipes", event.pipes.len());
        event
    }
}

impl Default for Simulation2d {
    fn default() -> Self {
        Self::new(Simulation2dConfig::default())
    }
}

/// Descriptor of the pipe carrying an entity's pose.
fn entity_pipe(entity: EntityId) -> PipeDescriptor {
    PipeDescriptor {
        src_id: PHYSICS_MODULE_ID,
        dst_id: WORLD_DATABASE_ID,
        pipe_type: 0,
        object_class: 0,
        object_type: entity.entity_type as u32,
        object_id: entity.id as u32,
        priority: PIPE_PRIORITY,
        user_id: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::{CollisionLine, CollisionLineSet, CollisionObject};
    use crate::height_map::HeightMap;
    use crate::mesh::TriangleMesh;
    use crate::physics2d::world::TileInfo;
    use crate::transform::TransformationData;
    use glam::{Mat4, Vec2};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct OneTile(TileInfo);

    impl WorldLookup for OneTile {
        fn tile_at(&self, _x: f32, _z: f32) -> Option<TileInfo> {
            Some(self.0)
        }
    }

    struct Maps(HashMap<u32, Arc<HeightMap>>);

    impl HeightMapSource for Maps {
        fn height_map_of_tile(&self, tile_id: u32) -> Option<Arc<HeightMap>> {
            self.0.get(&tile_id).cloned()
        }
    }

    type Pushed = Arc<Mutex<Vec<(PipeDescriptor, TransformationData)>>>;

    struct RecordingPipe {
        descriptor: PipeDescriptor,
        pushed: Pushed,
    }

    impl TransformationPipe for RecordingPipe {
        fn push(&mut self, trans: TransformationData) {
            if let Ok(mut pushed) = self.pushed.lock() {
                pushed.push((self.descriptor, trans));
            }
        }

        fn descriptor(&self) -> PipeDescriptor {
            self.descriptor
        }
    }

    struct RecordingPipes {
        opened: Arc<AtomicUsize>,
        pushed: Pushed,
    }

    impl TransformationPipes for RecordingPipes {
        fn open_pipe(&mut self, descriptor: PipeDescriptor) -> Option<Box<dyn TransformationPipe>> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Some(Box::new(RecordingPipe {
                descriptor,
                pushed: self.pushed.clone(),
            }))
        }

        fn open_remote_pipe(&mut self, _descriptor: PipeDescriptor) {}
    }

    fn config(restitution: f32, gravity: Vec3) -> Simulation2dConfig {
        Simulation2dConfig {
            restitution,
            gravity,
            ..Default::default()
        }
    }

    fn moving_circle(x: f32, vx: f32, radius: f32) -> RigidBody {
        let mut body = RigidBody::circle(Vec3::new(x, 0.0, 0.0), radius);
        body.set_velocity(Vec3::new(vx, 0.0, 0.0));
        body
    }

    #[test]
    fn test_fixed_body_never_moves() {
        let mut sim = Simulation2d::new(config(0.25, Vec3::new(0.0, -9.81, 0.0)));
        let mut body = RigidBody::circle(Vec3::new(1.0, 3.0, 2.0), 1.0);
        body.set_inv_mass(0.0);
        body.set_velocity(Vec3::new(1.0, 2.0, 3.0));
        body.set_angular_velocity(Vec3::Y);
        body.set_constant_force(Vec3::new(100.0, 0.0, 0.0));
        let orientation = body.orientation();
        let fixed = sim.add_body(body);
        // A movable body rams it every step.
        sim.add_body(moving_circle(1.5, -5.0, 1.0));

        for _ in 0..100 {
            sim.step(0.01);
        }
        let body = sim.body(fixed).unwrap();
        assert_eq!(body.position(), Vec3::new(1.0, 3.0, 2.0));
        assert_eq!(body.velocity(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(body.orientation(), orientation);
    }

    #[test]
    fn test_elastic_head_on_swaps_velocities() {
        let mut sim = Simulation2d::new(config(1.0, Vec3::ZERO));
        let a = sim.add_body(moving_circle(-0.9, 1.0, 1.0));
        let b = sim.add_body(moving_circle(0.9, -1.0, 1.0));

        sim.step(0.01);
        assert_eq!(sim.contacts().len(), 1);
        sim.step(0.01);

        let eps = 1e-5;
        let va = sim.body(a).unwrap().velocity();
        let vb = sim.body(b).unwrap().velocity();
        assert!((va - Vec3::new(-1.0, 0.0, 0.0)).length() < eps, "va = {:?}", va);
        assert!((vb - Vec3::new(1.0, 0.0, 0.0)).length() < eps, "vb = {:?}", vb);
    }

    #[test]
    fn test_separating_contact_is_ignored() {
        let mut sim = Simulation2d::new(config(1.0, Vec3::ZERO));
        let a = sim.add_body(moving_circle(-0.5, -1.0, 1.0));
        let b = sim.add_body(moving_circle(0.5, 1.0, 1.0));
        sim.step(0.01);
        sim.step(0.01);
        assert_eq!(sim.body(a).unwrap().velocity(), Vec3::new(-1.0, 0.0, 0.0));
        assert_eq!(sim.body(b).unwrap().velocity(), Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_fixed_first_body_is_swapped() {
        let mut sim = Simulation2d::new(config(0.0, Vec3::ZERO));
        let mut wall = RigidBody::circle(Vec3::ZERO, 1.0);
        wall.set_movable(false);
        sim.add_body(wall);
        let ball = sim.add_body(moving_circle(1.5, -2.0, 1.0));

        sim.step(0.01);
        sim.step(0.01);
        // Inelastic: the closing velocity is removed.
        let v = sim.body(ball).unwrap().velocity();
        assert!(v.length() < 1e-5, "v = {:?}", v);
    }

    #[test]
    fn test_gravity_is_mass_independent() {
        let mut sim = Simulation2d::new(config(0.25, Vec3::new(0.0, -10.0, 0.0)));
        let light = sim.add_body(RigidBody {
            x: Vec3::new(0.0, 10.0, 0.0),
            ..Default::default()
        });
        let mut heavy = RigidBody::new();
        heavy.set_position(Vec3::new(50.0, 10.0, 0.0));
        heavy.set_mass(8.0);
        let heavy = sim.add_body(heavy);

        sim.step(0.1);
        let eps = 1e-5;
        for handle in [light, heavy] {
            let body = sim.body(handle).unwrap();
            assert!((body.position().y - 10.0).abs() < eps);
            assert!((body.velocity().y + 1.0).abs() < eps, "vy = {}", body.velocity().y);
        }
        sim.step(0.1);
        let y = sim.body(light).unwrap().position().y;
        assert!((y - 9.9).abs() < eps, "y = {}", y);
    }

    #[test]
    fn test_force_resets_to_constant_part() {
        let mut sim = Simulation2d::default();
        let mut body = RigidBody::new();
        body.set_position(Vec3::new(0.0, 1.0, 0.0));
        body.set_constant_force(Vec3::new(1.0, 0.0, 0.0));
        body.add_force(Vec3::new(0.0, 0.0, 5.0));
        let h = sim.add_body(body);

        sim.step(1.0);
        let body = sim.body(h).unwrap();
        assert_eq!(body.force(), Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(body.velocity(), Vec3::new(1.0, 0.0, 5.0));
    }

    #[test]
    fn test_angular_velocity_rotates_body() {
        let mut sim = Simulation2d::default();
        let mut body = RigidBody::new();
        body.set_position(Vec3::new(0.0, 1.0, 0.0));
        body.set_angular_velocity(Vec3::new(0.0, std::f32::consts::FRAC_PI_2, 0.0));
        let h = sim.add_body(body);

        sim.step(1.0);
        let forward = sim.body(h).unwrap().forward();
        assert!((forward - Vec3::X).length() < 1e-4, "forward = {:?}", forward);
    }

    #[test]
    fn test_ground_clamp_on_tile_height_map() {
        let mut sim = Simulation2d::default();
        let tile = TileInfo {
            id: 1,
            position: Vec3::new(100.0, 0.0, 0.0),
        };
        sim.set_world(Arc::new(OneTile(tile)));
        let flat = HeightMap::new(0.0, 0.0, 2.0, 4.0, 4.0, 5, 5, false).unwrap();
        sim.set_height_maps(Arc::new(Maps(HashMap::from([(1, Arc::new(flat))]))));

        let mut body = RigidBody::new();
        body.set_position(Vec3::new(101.0, 2.5, 1.0));
        body.set_velocity(Vec3::new(1.0, -10.0, 0.0));
        let h = sim.add_body(body);

        sim.step(0.1);
        let body = sim.body(h).unwrap();
        let eps = 1e-5;
        assert!((body.position().y - 2.0).abs() < eps, "y = {}", body.position().y);
        assert!((body.velocity() - Vec3::X).length() < eps, "v = {:?}", body.velocity());
    }

    #[test]
    fn test_body_leans_onto_slope() {
        let mut sim = Simulation2d::default();
        sim.set_world(Arc::new(OneTile(TileInfo {
            id: 3,
            position: Vec3::ZERO,
        })));
        let mesh = TriangleMesh::grid(10.0, 10.0, 10, 10, |x, _| 0.5 * x);
        let slope = HeightMap::generate_from_mesh(&mesh, Mat4::IDENTITY, 11, 11, false).unwrap();
        sim.set_height_maps(Arc::new(Maps(HashMap::from([(3, Arc::new(slope))]))));

        let mut body = RigidBody::new();
        body.set_position(Vec3::new(4.0, 0.0, 5.0));
        let h = sim.add_body(body);
        sim.step(0.01);

        let body = sim.body(h).unwrap();
        let expected = Vec3::new(-0.5, 1.0, 0.0).normalize();
        assert!((body.up() - expected).length() < 1e-3, "up = {:?}", body.up());
        assert!((body.position().y - 2.0).abs() < 1e-3, "y = {}", body.position().y);
    }

    #[test]
    fn test_collision_with_tile_geometry() {
        let mut sim = Simulation2d::default();
        let tile = TileInfo {
            id: 7,
            position: Vec3::new(10.0, 0.0, 0.0),
        };
        sim.set_world(Arc::new(OneTile(tile)));
        let wall = CollisionLineSet::new(vec![CollisionLine::new(
            Vec2::new(1.0, -10.0),
            Vec2::new(1.0, 10.0),
        )])
        .unwrap();
        let mut map = CollisionMap::new();
        let index = map.add_object(CollisionObject::line_set(Arc::new(wall)));
        map.map_tile(7, index);
        sim.set_collision_map(Arc::new(map));

        let ball = sim.add_body(moving_circle(10.8, 1.0, 0.5));
        sim.step(0.01);
        assert_eq!(sim.contacts().len(), 1);
        assert!(sim.contacts()[0].body2.is_none());

        sim.step(0.01);
        // Restitution 0.25 against an immovable wall.
        let vx = sim.body(ball).unwrap().velocity().x;
        assert!((vx + 0.25).abs() < 1e-5, "vx = {}", vx);
    }

    #[test]
    fn test_each_participant_is_notified() {
        let mut sim = Simulation2d::new(config(1.0, Vec3::ZERO));
        let calls = Arc::new(Mutex::new(Vec::new()));

        let mut a = moving_circle(-0.9, 1.0, 1.0);
        let log = calls.clone();
        a.set_collision_callback(Box::new(move |data: &CollisionCallbackData| {
            log.lock().unwrap().push(("a", data.v_rel1 + data.v_rel2));
        }));
        let mut b = moving_circle(0.9, -1.0, 1.0);
        let log = calls.clone();
        b.set_collision_callback(Box::new(move |_: &CollisionCallbackData| {
            log.lock().unwrap().push(("b", 0.0));
        }));
        sim.add_body(a);
        sim.add_body(b);

        sim.step(0.01);
        sim.step(0.01);
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, "a");
        assert!((calls[0].1 - 2.0).abs() < 1e-5);
        assert_eq!(calls[1].0, "b");
    }

    #[test]
    fn test_broad_phase_prunes_distant_bodies() {
        let mut sim = Simulation2d::default();
        sim.add_body(moving_circle(0.0, 0.0, 1.0));
        sim.add_body(moving_circle(5.0, 0.0, 1.0));
        assert!(!sim.check_collision());
    }

    #[test]
    fn test_poses_are_pushed_into_entity_pipes() {
        let mut sim = Simulation2d::default();
        let opened = Arc::new(AtomicUsize::new(0));
        let pushed: Pushed = Arc::new(Mutex::new(Vec::new()));
        sim.set_transformation_pipes(Box::new(RecordingPipes {
            opened: opened.clone(),
            pushed: pushed.clone(),
        }));

        let mut body = moving_circle(0.0, 1.0, 1.0);
        body.set_entity(Some(EntityId::new(2, 9)));
        sim.add_body(body);
        sim.add_body(moving_circle(20.0, 0.0, 1.0));

        for _ in 0..3 {
            sim.step(0.5);
        }
        assert_eq!(opened.load(Ordering::SeqCst), 1);
        let pushed = pushed.lock().unwrap();
        assert_eq!(pushed.len(), 3);
        assert_eq!(pushed[0].0.object_type, 2);
        assert_eq!(pushed[0].0.object_id, 9);
        assert_eq!(pushed[0].0.priority, PIPE_PRIORITY);
        assert!((pushed[2].1.position.x - 1.5).abs() < 1e-5);

        let event = sim.create_sync_event();
        assert_eq!(event.pipes.len(), 1);
        assert_eq!(event.pipes[0].src_id, PHYSICS_MODULE_ID);
    }

    #[test]
    fn test_removed_handle_is_stale() {
        let mut sim = Simulation2d::default();
        let a = sim.add_body(RigidBody::new());
        assert!(sim.remove_body(a).is_some());
        let b = sim.add_body(RigidBody::new());
        assert!(sim.body(a).is_none());
        assert!(sim.body(b).is_some());
        assert!(sim.remove_body(a).is_none());
        assert_eq!(sim.len(), 1);
    }
}
