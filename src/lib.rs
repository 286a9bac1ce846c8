//! Tessera
//!
//! Tile-based rigid body simulation: 2D collision shapes, height fields and a
//! fixed-step 3D physics façade.
//!
//! # Architecture
//!
//! The library is organized into layers, leaves first:
//!
//! 1. **transform** - Poses (position, orientation, scale) and pipe descriptors
//! 2. **mesh** - Triangle meshes used as height-map and line-set sources
//! 3. **collision** - Circle and line-set shapes, per-tile collision maps
//! 4. **height_map** - Height fields with bilinear sampling, Gaussian smoothing and HMP1 files
//! 5. **physics2d** - Rigid bodies and the `Simulation2d` stepping loop
//! 6. **physics3d** - Threaded fixed-step façade, synchronisation models, cursor manipulation
//! 7. **config** - XML configuration documents

pub mod collision;
pub mod config;
pub mod error;
pub mod height_map;
pub mod mesh;
pub mod physics2d;
pub mod physics3d;
pub mod transform;

pub use collision::{
    CollisionCircle, CollisionData, CollisionLine, CollisionLineSet, CollisionMap,
    CollisionObject, CollisionShape,
};
pub use config::{CollisionMapConfig, PhysicsModuleConfig, Simulation2dConfig};
pub use error::{TesseraError, TesseraResult};
pub use height_map::{HeightMap, HeightMapManager, HeightMapSource};
pub use mesh::TriangleMesh;
pub use physics2d::{BodyHandle, RigidBody, Simulation2d};
pub use physics3d::{CursorSpringConnector, Physics, PhysicsConfig, RigidWorld};
pub use transform::{PipeDescriptor, TransformationData, TransformationModifier};

// Re-export glam for convenience
pub use glam;
