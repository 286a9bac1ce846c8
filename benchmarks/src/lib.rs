//! Scene builders shared by the benchmarks.

use glam::{Mat4, Vec2, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tessera::{
    CollisionLine, CollisionLineSet, CollisionObject, HeightMap, RigidBody, Simulation2d,
    Simulation2dConfig, TransformationData, TriangleMesh,
};

/// Rolling terrain mesh of `cells` x `cells` quads over a 100 x 100 area.
pub fn terrain_mesh(cells: u32) -> TriangleMesh {
    TriangleMesh::grid(100.0, 100.0, cells, cells, |x, z| {
        (x * 0.1).sin() * 2.0 + (z * 0.07).cos() * 3.0
    })
}

pub fn terrain_height_map(cells: u32, samples: usize) -> HeightMap {
    HeightMap::generate_from_mesh(&terrain_mesh(cells), Mat4::IDENTITY, samples, samples, true)
        .expect("valid terrain grid")
}

/// Closed polygon with `n` edges around the origin.
pub fn ring_line_set(n: usize, radius: f32) -> CollisionLineSet {
    let corner = |i: usize| {
        let a = i as f32 / n as f32 * std::f32::consts::TAU;
        Vec2::new(a.cos(), a.sin()) * radius
    };
    let lines = (0..n)
        .map(|i| CollisionLine::new(corner(i), corner((i + 1) % n)))
        .collect();
    CollisionLineSet::new(lines).expect("ring has lines")
}

/// `n` circle bodies scattered over a square sized for moderate crowding.
pub fn circle_scene(n: usize) -> Simulation2d {
    let mut sim = Simulation2d::new(Simulation2dConfig::default());
    let side = (n as f32).sqrt() * 3.0;
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..n {
        let position = Vec3::new(rng.random_range(0.0..side), 0.0, rng.random_range(0.0..side));
        let mut body = RigidBody::circle(position, 1.0);
        body.set_velocity(Vec3::new(
            rng.random_range(-0.5..0.5),
            0.0,
            rng.random_range(-0.5..0.5),
        ));
        sim.add_body(body);
    }
    sim
}

pub fn circle_object(position: Vec3, radius: f32) -> CollisionObject {
    let mut object = CollisionObject::circle(radius);
    object.set_transformation(TransformationData::from_position(position));
    object
}
