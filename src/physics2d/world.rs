//! Collaborators the simulation consults but does not own.

use glam::Vec3;

use crate::transform::{PipeDescriptor, TransformationData};

/// A world tile under a position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileInfo {
    /// Tile id; also the key of the tile's collision shape and height map.
    pub id: u32,
    /// World position of the tile origin.
    pub position: Vec3,
}

/// World database lookup.
pub trait WorldLookup: Send + Sync {
    /// Tile at world `(x, z)`, or `None` outside every environment.
    fn tile_at(&self, x: f32, z: f32) -> Option<TileInfo>;
}

/// Producer end of a transformation pipe.
pub trait TransformationPipe: Send {
    fn push(&mut self, trans: TransformationData);
    fn descriptor(&self) -> PipeDescriptor;
}

/// Transformation manager: opens pipes for the simulation.
pub trait TransformationPipes: Send {
    /// Open a local pipe. `None` if the manager refuses it.
    fn open_pipe(&mut self, descriptor: PipeDescriptor) -> Option<Box<dyn TransformationPipe>>;

    /// Open the receiving end of a pipe announced by a remote simulation.
    fn open_remote_pipe(&mut self, descriptor: PipeDescriptor);
}
