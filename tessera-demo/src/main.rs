use std::sync::Arc;
use std::time::Duration;

use glam::{Mat4, Vec3};
use tessera::height_map::TileGeometry;
use tessera::physics2d::{CollisionCallbackData, TileInfo, WorldLookup};
use tessera::physics3d::{
    Body3d, ConnectionMode, CursorHandle, CursorSpringConfig, CursorSpringConnector,
};
use tessera::{
    HeightMapManager, Physics, PhysicsConfig, RigidBody, RigidWorld, Simulation2d,
    Simulation2dConfig, TransformationData, TriangleMesh,
};

const TILE_SIZE: f32 = 20.0;

/// Square tiles laid out on a grid, all sharing one rolling terrain mesh.
struct Terrain;

impl TileGeometry for Terrain {
    fn tile_mesh(&self, _tile_id: u32) -> Option<(TriangleMesh, Mat4)> {
        let mesh = TriangleMesh::grid(TILE_SIZE, TILE_SIZE, 16, 16, |x, z| {
            (x * 0.3).sin() * 0.5 + z * 0.05
        });
        Some((mesh, Mat4::IDENTITY))
    }
}

impl WorldLookup for Terrain {
    fn tile_at(&self, x: f32, z: f32) -> Option<TileInfo> {
        if x < 0.0 || z < 0.0 {
            return None;
        }
        let (col, row) = ((x / TILE_SIZE) as u32, (z / TILE_SIZE) as u32);
        Some(TileInfo {
            id: 0,
            position: Vec3::new(col as f32 * TILE_SIZE, 0.0, row as f32 * TILE_SIZE),
        })
    }
}

fn run_simulation_2d() -> anyhow::Result<()> {
    let cache_dir = std::env::temp_dir().join("tessera-demo");
    std::fs::create_dir_all(&cache_dir)?;

    let terrain = Arc::new(Terrain);
    let height_maps = Arc::new(HeightMapManager::new(terrain.clone(), &cache_dir));

    let mut sim = Simulation2d::new(Simulation2dConfig {
        gravity: Vec3::new(0.0, -9.81, 0.0),
        ..Simulation2dConfig::default()
    });
    sim.set_world(terrain);
    sim.set_height_maps(height_maps);

    let mut a = RigidBody::circle(Vec3::new(5.0, 2.0, 10.0), 1.0);
    a.set_velocity(Vec3::new(2.0, 0.0, 0.0));
    a.set_collision_callback(Box::new(|data: &CollisionCallbackData| {
        log::info!("Collision at {:?}", data.data.point);
    }));
    let a = sim.add_body(a);

    let mut b = RigidBody::circle(Vec3::new(12.0, 2.0, 10.0), 1.0);
    b.set_velocity(Vec3::new(-2.0, 0.0, 0.0));
    let b = sim.add_body(b);

    for _ in 0..300 {
        sim.step(1.0 / 60.0);
    }
    for handle in [a, b] {
        if let Some(body) = sim.body(handle) {
            log::info!(
                "Body {:?} at {:?}, velocity {:?}",
                handle,
                body.position(),
                body.velocity()
            );
        }
    }
    Ok(())
}

fn run_physics_3d() -> anyhow::Result<()> {
    let config = PhysicsConfig {
        gravity: Vec3::ZERO,
        ..PhysicsConfig::default()
    };
    let physics = Arc::new(Physics::new(RigidWorld::new(), &config)?);
    let cursor = CursorHandle::new(TransformationData::from_position(Vec3::new(0.0, 2.0, 0.0)));

    let body = physics
        .with_simulation(|world| world.add_body(Body3d::new(Vec3::new(0.0, 1.0, 0.0), 1.0)));
    let cursor_config = CursorSpringConfig {
        mode: ConnectionMode::Spring,
        ..CursorSpringConfig::default()
    };
    let connector = physics
        .with_simulation(|world| {
            CursorSpringConnector::attach(world, body, cursor.clone(), cursor_config)
        })
        .ok_or_else(|| anyhow::anyhow!("cursor body vanished"))?;
    physics.add_simulation_step_listener(Box::new(connector));

    let start = std::time::Instant::now();
    physics.add_system_thread_listener(Box::new(cursor.feed(move || {
        let t = start.elapsed().as_secs_f32();
        TransformationData::from_position(Vec3::new(t.sin(), 2.0, t.cos()))
    })));

    physics.start();
    for _ in 0..50 {
        physics.update(0.01);
        std::thread::sleep(Duration::from_millis(10));
    }
    physics.kill();

    let pose = physics.with_simulation(|world| world.body(body).map(Body3d::transformation));
    log::info!(
        "After {} steps the dragged body is at {:?}",
        physics.simulation_time(),
        pose.map(|p| p.position)
    );
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    run_simulation_2d()?;
    run_physics_3d()
}
