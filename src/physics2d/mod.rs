//! Rigid bodies sliding over tiled terrain.
//!
//! [`Simulation2d`] integrates bodies in 3D but resolves collisions in the
//! ground (XZ) plane. Terrain height comes from per-tile height maps, static
//! obstacles from the per-tile line sets of a collision map.

pub mod broadphase;
pub mod contact;
pub mod rigid_body;
pub mod simulation;
pub mod sync_event;
pub mod world;

pub use broadphase::could_collide;
pub use contact::Contact;
pub use rigid_body::{CollisionCallback, EntityId, RigidBody};
pub use simulation::{BodyHandle, CollisionCallbackData, Simulation2d};
pub use sync_event::SynchronisePhysicsEvent;
pub use world::{TileInfo, TransformationPipe, TransformationPipes, WorldLookup};
