//! Indexed triangle meshes.
//!
//! Tile geometry reaches the height-map generator and the line-set factory in
//! this form. Positions are in the mesh's local space; callers pass the world
//! transform separately.

use glam::{Mat4, Vec3};
use std::collections::HashMap;

/// An indexed triangle list with per-vertex normals.
#[derive(Debug, Clone, Default)]
pub struct TriangleMesh {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    /// Three indices per triangle.
    pub indices: Vec<u32>,
}

/// One triangle with its vertex normals, already in the requested space.
#[derive(Debug, Clone, Copy)]
pub struct Triangle {
    pub vertices: [Vec3; 3],
    pub normals: [Vec3; 3],
}

impl TriangleMesh {
    /// Build a mesh and fill in flat face normals where none are given.
    pub fn new(positions: Vec<Vec3>, indices: Vec<u32>) -> Self {
        let mut normals = vec![Vec3::ZERO; positions.len()];
        for tri in indices.chunks_exact(3) {
            let (a, b, c) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
            if a >= positions.len() || b >= positions.len() || c >= positions.len() {
                continue;
            }
            let n = (positions[b] - positions[a]).cross(positions[c] - positions[a]);
            normals[a] += n;
            normals[b] += n;
            normals[c] += n;
        }
        for n in &mut normals {
            *n = n.normalize_or(Vec3::Y);
        }
        Self {
            positions,
            normals,
            indices,
        }
    }

    /// A regular grid in the XZ plane, `cols` x `rows` quads, heights from `height`.
    ///
    /// The grid spans `[0, x_len] x [0, z_len]`; triangles wind so their
    /// normals point up.
    pub fn grid(
        x_len: f32,
        z_len: f32,
        cols: u32,
        rows: u32,
        height: impl Fn(f32, f32) -> f32,
    ) -> Self {
        let cols = cols.max(1);
        let rows = rows.max(1);
        let mut positions = Vec::with_capacity(((cols + 1) * (rows + 1)) as usize);
        for r in 0..=rows {
            for c in 0..=cols {
                let x = x_len * c as f32 / cols as f32;
                let z = z_len * r as f32 / rows as f32;
                positions.push(Vec3::new(x, height(x, z), z));
            }
        }
        let stride = cols + 1;
        let mut indices = Vec::with_capacity((cols * rows * 6) as usize);
        for r in 0..rows {
            for c in 0..cols {
                let i0 = r * stride + c;
                let i1 = i0 + 1;
                let i2 = i0 + stride;
                let i3 = i2 + 1;
                indices.extend_from_slice(&[i0, i2, i1, i1, i2, i3]);
            }
        }
        Self::new(positions, indices)
    }

    /// Number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Triangles with positions transformed by `world` and normals by its
    /// inverse transpose. Triangles with out-of-range indices are skipped.
    pub fn world_triangles(&self, world: Mat4) -> impl Iterator<Item = Triangle> + '_ {
        let normal_matrix = world.inverse().transpose();
        self.indices.chunks_exact(3).filter_map(move |tri| {
            let idx = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            if idx.iter().any(|&i| i >= self.positions.len()) {
                return None;
            }
            let vertices = idx.map(|i| world.transform_point3(self.positions[i]));
            let normals = idx.map(|i| {
                let n = self.normals.get(i).copied().unwrap_or(Vec3::Y);
                normal_matrix.transform_vector3(n).normalize_or(Vec3::Y)
            });
            Some(Triangle { vertices, normals })
        })
    }

    /// Axis-aligned bounds of the untransformed positions.
    pub fn bounding_box(&self) -> Option<(Vec3, Vec3)> {
        let first = *self.positions.first()?;
        Some(
            self.positions
                .iter()
                .fold((first, first), |(lo, hi), p| (lo.min(*p), hi.max(*p))),
        )
    }

    /// Edges used by exactly one triangle, as index pairs in winding order.
    pub fn boundary_edges(&self) -> Vec<(u32, u32)> {
        let mut counts: HashMap<(u32, u32), (u32, (u32, u32))> = HashMap::new();
        for tri in self.indices.chunks_exact(3) {
            for (a, b) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
                let key = (a.min(b), a.max(b));
                let entry = counts.entry(key).or_insert((0, (a, b)));
                entry.0 += 1;
            }
        }
        let mut edges: Vec<(u32, u32)> = counts
            .into_values()
            .filter(|(count, _)| *count == 1)
            .map(|(_, edge)| edge)
            .collect();
        edges.sort_unstable();
        edges
    }
}
