//! Regular-grid height fields.
//!
//! A [`HeightMap`] covers a rectangle of the XZ plane with `x_samples` by
//! `y_samples` grid points. Each point stores a height, a surface normal and
//! an initialization flag; cells never hit during generation keep the
//! baseline height `z0` and the up vector.
//!
//! # Architecture
//!
//! 1. Grid setup from explicit bounds or from a mesh's bounding box
//! 2. Generation: cast a ray straight down from every grid point against every
//!    triangle, keep the highest hit and interpolate the triangle normal
//! 3. Optional Gaussian blur of heights and normals, masked by the
//!    initialization flags
//! 4. Bilinear sampling of height and normal
//!
//! The grid's second axis (`y0`, `dy`, `y_samples`) runs along world Z.

pub mod file;
pub mod gauss;
pub mod manager;

pub use manager::{HeightMapManager, HeightMapSource, TileGeometry};

use glam::{Mat4, Quat, Vec3};
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

use self::gauss::{conv2d, GaussKernel};
use crate::error::{TesseraError, TesseraResult};
use crate::mesh::TriangleMesh;

/// Barycentric tolerance for ray-triangle hits.
const RANGE: f32 = 0.0001;

/// Default Gaussian standard deviation.
pub const DEFAULT_GAUSS_SIGMA: f32 = 3.0;
/// Default kernel truncation threshold.
pub const DEFAULT_GAUSS_EPS: f32 = 0.001;

/// World up. Rays are cast along `-UP`; uninitialized cells and points off
/// the grid report it as their normal.
pub const UP: Vec3 = Vec3::Y;

/// Flag value written for initialized cells.
const INITIALIZED: i8 = -1;

/// A sampled height field.
#[derive(Debug, Clone, PartialEq)]
pub struct HeightMap {
    pub(crate) x0: f32,
    pub(crate) y0: f32,
    pub(crate) z0: f32,
    pub(crate) dx: f32,
    pub(crate) dy: f32,
    pub(crate) x_samples: usize,
    pub(crate) y_samples: usize,
    pub(crate) x_len: f32,
    pub(crate) y_len: f32,
    pub(crate) heights: Vec<f32>,
    pub(crate) normals: Vec<Vec3>,
    /// Non-zero marks an initialized cell.
    pub(crate) initialized: Vec<i8>,
    filter: bool,
    gauss_sigma: f32,
    gauss_eps: f32,
}

impl HeightMap {
    /// A flat grid at height `z0` with origin `(x0, y0)` and the given extents.
    ///
    /// Needs at least two samples per axis and positive extents.
    pub fn new(
        x0: f32,
        y0: f32,
        z0: f32,
        x_len: f32,
        y_len: f32,
        x_samples: usize,
        y_samples: usize,
        filter: bool,
    ) -> TesseraResult<Self> {
        if x_samples < 2 || y_samples < 2 {
            return Err(TesseraError::InvalidGrid(format!(
                "need at least 2x2 samples, got {}x{}",
                x_samples, y_samples
            )));
        }
        if !(x_len > 0.0 && y_len > 0.0) {
            return Err(TesseraError::InvalidGrid(format!(
                "extents must be positive, got {} x {}",
                x_len, y_len
            )));
        }
        let n = x_samples * y_samples;
        Ok(Self {
            x0,
            y0,
            z0,
            dx: x_len / (x_samples - 1) as f32,
            dy: y_len / (y_samples - 1) as f32,
            x_samples,
            y_samples,
            x_len,
            y_len,
            heights: vec![z0; n],
            normals: vec![UP; n],
            initialized: vec![0; n],
            filter,
            gauss_sigma: DEFAULT_GAUSS_SIGMA,
            gauss_eps: DEFAULT_GAUSS_EPS,
        })
    }

    /// A flat grid covering the world-space bounding box of `mesh`.
    ///
    /// The baseline sits one unit below the lowest vertex.
    pub fn from_mesh_bounds(
        mesh: &TriangleMesh,
        world: Mat4,
        x_samples: usize,
        y_samples: usize,
        filter: bool,
    ) -> TesseraResult<Self> {
        let mut points = mesh.positions.iter().map(|p| world.transform_point3(*p));
        let first = points
            .next()
            .ok_or_else(|| TesseraError::InvalidGrid("mesh has no vertices".to_string()))?;
        let (lo, hi) = points.fold((first, first), |(lo, hi), p| (lo.min(p), hi.max(p)));
        Self::new(
            lo.x,
            lo.z,
            lo.y - 1.0,
            hi.x - lo.x,
            hi.z - lo.z,
            x_samples,
            y_samples,
            filter,
        )
    }

    /// Set up from the mesh bounds and generate in one go.
    pub fn generate_from_mesh(
        mesh: &TriangleMesh,
        world: Mat4,
        x_samples: usize,
        y_samples: usize,
        filter: bool,
    ) -> TesseraResult<Self> {
        let mut map = Self::from_mesh_bounds(mesh, world, x_samples, y_samples, filter)?;
        map.generate(mesh, world);
        Ok(map)
    }

    /// Sample `mesh` (placed by `world`) into the grid, then blur if enabled.
    pub fn generate(&mut self, mesh: &TriangleMesh, world: Mat4) {
        self.do_intersection_tests(mesh, world);
        if self.filter {
            self.apply_gauss_blur();
        }
        debug!(
            "Generated {}x{} height map, {} cells hit",
            self.x_samples,
            self.y_samples,
            self.initialized.iter().filter(|f| **f != 0).count()
        );
    }

    fn do_intersection_tests(&mut self, mesh: &TriangleMesh, world: Mat4) {
        let dir = -UP;
        for tri in mesh.world_triangles(world) {
            let [a, b, c] = tri.vertices;
            let v0 = a - c;
            let v1 = b - c;
            // Columns: the two edges and the reversed ray direction.
            let m = glam::Mat3::from_cols(v0, v1, -dir);
            if m.determinant().abs() < f32::EPSILON {
                continue;
            }
            let inv = m.inverse();

            for i in 0..self.y_samples {
                for j in 0..self.x_samples {
                    let p = Vec3::new(
                        self.x0 + j as f32 * self.dx,
                        0.0,
                        self.y0 + i as f32 * self.dy,
                    );
                    let uvs = inv * (p - c);
                    if uvs.x < -RANGE || uvs.y < -RANGE || uvs.x + uvs.y > 1.0 + RANGE {
                        continue;
                    }
                    let height = (p + uvs.z * dir).dot(UP);
                    let index = i * self.x_samples + j;
                    if self.initialized[index] == 0 || self.heights[index] < height {
                        let w = 1.0 - uvs.x - uvs.y;
                        let normal =
                            tri.normals[0] * uvs.x + tri.normals[1] * uvs.y + tri.normals[2] * w;
                        self.heights[index] = height;
                        self.normals[index] = normal.normalize_or(UP);
                        self.initialized[index] = INITIALIZED;
                    }
                }
            }
        }
    }

    fn apply_gauss_blur(&mut self) {
        let kernel = GaussKernel::new(self.gauss_sigma, self.gauss_eps);
        let len = kernel.len();
        let (xs, ys) = (self.x_samples, self.y_samples);
        let mask: Vec<bool> = self.initialized.iter().map(|f| *f != 0).collect();
        let pre_heights = self.heights.clone();

        // Normals are convolved on a grid padded by half a kernel on each
        // side; the border counts as initialized and points up.
        let (nx, ny) = (xs + len, ys + len);
        let pad = len / 2;
        let mut normal_mask = vec![true; nx * ny];
        let mut pre_normals = [vec![0.0; nx * ny], vec![0.0; nx * ny], vec![0.0; nx * ny]];
        for k in 0..3 {
            pre_normals[k].fill(UP[k]);
        }
        let mut post_normals = pre_normals.clone();
        for i in 0..ys {
            for j in 0..xs {
                let src = i * xs + j;
                let dst = (i + pad) * nx + (j + pad);
                for k in 0..3 {
                    pre_normals[k][dst] = self.normals[src][k];
                }
                normal_mask[dst] = mask[src];
            }
        }

        for i in 0..ys {
            for j in 0..xs {
                let index = i * xs + j;
                if !mask[index] {
                    continue;
                }
                self.heights[index] = conv2d(&pre_heights, xs, ys, &kernel, j, i, &mask);
                let dst = (i + pad) * nx + (j + pad);
                for k in 0..3 {
                    post_normals[k][dst] =
                        conv2d(&pre_normals[k], nx, ny, &kernel, j + pad, i + pad, &normal_mask);
                }
            }
        }

        for i in 0..ys {
            for j in 0..xs {
                let dst = (i + pad) * nx + (j + pad);
                let n = Vec3::new(post_normals[0][dst], post_normals[1][dst], post_normals[2][dst]);
                self.normals[i * xs + j] = n.normalize_or(UP);
            }
        }
    }

    /// Bilinear weights and cell indices for a world point.
    ///
    /// Returns `None` on or outside the grid border.
    pub fn weights_and_indices(&self, x: f32, z: f32) -> Option<([f32; 4], [usize; 4])> {
        let xs = (x - self.x0) / self.dx;
        let ys = (z - self.y0) / self.dy;
        if !(xs > 0.0
            && xs < (self.x_samples - 1) as f32
            && ys > 0.0
            && ys < (self.y_samples - 1) as f32)
        {
            return None;
        }
        let fx = xs.floor();
        let fy = ys.floor();
        let (dfx, dfy) = (xs - fx, ys - fy);
        let (cx, cy) = (fx as usize, fy as usize);
        let base = cx + self.x_samples * cy;
        let indices = [base, base + 1, base + self.x_samples, base + self.x_samples + 1];
        let weights = [
            (1.0 - dfx) * (1.0 - dfy),
            dfx * (1.0 - dfy),
            (1.0 - dfx) * dfy,
            dfx * dfy,
        ];
        Some((weights, indices))
    }

    /// Interpolated height at world `(x, z)`, or `z0` outside the grid.
    pub fn height(&self, x: f32, z: f32) -> f32 {
        match self.weights_and_indices(x, z) {
            Some((w, idx)) => (0..4).map(|k| w[k] * self.heights[idx[k]]).sum(),
            None => self.z0,
        }
    }

    /// Interpolated (unnormalized) normal at world `(x, z)`, or up outside the grid.
    pub fn normal(&self, x: f32, z: f32) -> Vec3 {
        match self.weights_and_indices(x, z) {
            Some((w, idx)) => (0..4).map(|k| w[k] * self.normals[idx[k]]).sum(),
            None => UP,
        }
    }

    /// Rotation taking the up vector onto the normal at `(x, z)`.
    pub fn normal_rotation(&self, x: f32, z: f32) -> Quat {
        Self::rotation_for_normal(self.normal(x, z))
    }

    /// Rotation taking the up vector onto `normal`.
    pub fn rotation_for_normal(normal: Vec3) -> Quat {
        match normal.try_normalize() {
            Some(n) => Quat::from_rotation_arc(UP, n),
            None => Quat::IDENTITY,
        }
    }

    /// Rescale all heights: `h = h * scale + offset`.
    pub fn adjust_z(&mut self, scale: f32, offset: f32) {
        for h in &mut self.heights {
            *h = *h * scale + offset;
        }
    }

    /// Lowest and highest initialized height; `(z0, z0)` if none is initialized.
    pub fn min_max_heights(&self) -> (f32, f32) {
        self.heights
            .iter()
            .zip(&self.initialized)
            .filter(|(_, init)| **init != 0)
            .map(|(h, _)| *h)
            .fold(None, |acc: Option<(f32, f32)>, h| match acc {
                None => Some((h, h)),
                Some((lo, hi)) => Some((lo.min(h), hi.max(h))),
            })
            .unwrap_or((self.z0, self.z0))
    }

    /// Set the blur strength. The standard deviation becomes `1/sqrt(smoothness)`.
    pub fn set_gauss_filter_coefficients(&mut self, smoothness: f32, rect_eps: f32) {
        self.gauss_sigma = 1.0 / smoothness.sqrt();
        self.gauss_eps = rect_eps;
    }

    pub fn set_filter(&mut self, filter: bool) {
        self.filter = filter;
    }

    /// Write heights as an ASCII grey-scale PPM: `grey = (h * scale + offset) * 255`.
    ///
    /// With `find_range` the scale and offset map the full height range onto `[0, 1]`.
    pub fn write_ppm(
        &self,
        path: impl AsRef<Path>,
        scale: f32,
        offset: f32,
        find_range: bool,
    ) -> TesseraResult<()> {
        let path = path.as_ref();
        let (scale, offset) = if find_range {
            let lo = self.heights.iter().copied().fold(f32::INFINITY, f32::min);
            let hi = self.heights.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let range = (hi - lo).max(f32::EPSILON);
            (1.0 / range, -lo / range)
        } else {
            (scale, offset)
        };

        let mut out = std::io::BufWriter::new(std::fs::File::create(path)?);
        write!(
            out,
            "P3\n#Heightmap debug output\n{} {}\n255\n",
            self.x_samples, self.y_samples
        )?;
        for h in &self.heights {
            let c = ((h * scale + offset) * 255.0).clamp(0.0, 255.0) as u8;
            writeln!(out, "{c}\n{c}\n{c}")?;
        }
        out.flush()?;
        info!("Wrote height map image {:?}", path);
        Ok(())
    }

    pub fn x0(&self) -> f32 {
        self.x0
    }

    pub fn y0(&self) -> f32 {
        self.y0
    }

    pub fn z0(&self) -> f32 {
        self.z0
    }

    pub fn dx(&self) -> f32 {
        self.dx
    }

    pub fn dy(&self) -> f32 {
        self.dy
    }

    pub fn x_samples(&self) -> usize {
        self.x_samples
    }

    pub fn y_samples(&self) -> usize {
        self.y_samples
    }

    pub fn x_len(&self) -> f32 {
        self.x_len
    }

    pub fn y_len(&self) -> f32 {
        self.y_len
    }

    pub fn heights(&self) -> &[f32] {
        &self.heights
    }

    pub fn normals(&self) -> &[Vec3] {
        &self.normals
    }

    /// Whether grid point `(j, i)` (column, row) was hit during generation.
    pub fn is_initialized(&self, j: usize, i: usize) -> bool {
        self.initialized
            .get(i * self.x_samples + j)
            .is_some_and(|f| *f != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slope_mesh() -> TriangleMesh {
        // Height rises with x: y = 0.5 * x over [0, 10] x [0, 10].
        TriangleMesh::grid(10.0, 10.0, 10, 10, |x, _| 0.5 * x)
    }

    #[test]
    fn test_setup_flat() {
        let map = HeightMap::new(0.0, 0.0, 2.0, 10.0, 5.0, 11, 6, false).unwrap();
        assert_eq!(map.dx(), 1.0);
        assert_eq!(map.dy(), 1.0);
        assert_eq!(map.heights().len(), 66);
        assert!(map.heights().iter().all(|h| *h == 2.0));
        assert!(map.normals().iter().all(|n| *n == Vec3::Y));
        assert!(!map.is_initialized(3, 3));
    }

    #[test]
    fn test_setup_rejects_bad_grid() {
        assert!(HeightMap::new(0.0, 0.0, 0.0, 10.0, 10.0, 1, 5, false).is_err());
        assert!(HeightMap::new(0.0, 0.0, 0.0, 0.0, 10.0, 5, 5, false).is_err());
        assert!(HeightMap::new(0.0, 0.0, 0.0, 10.0, -1.0, 5, 5, false).is_err());
    }

    #[test]
    fn test_outside_and_border_return_baseline() {
        let mut map = HeightMap::new(0.0, 0.0, -3.0, 4.0, 4.0, 5, 5, false).unwrap();
        map.heights.fill(7.0);
        for (x, z) in [(0.0, 2.0), (4.0, 2.0), (2.0, 0.0), (2.0, 4.0), (-1.0, 2.0), (9.0, 9.0)] {
            assert_eq!(map.height(x, z), -3.0, "height({}, {})", x, z);
            assert_eq!(map.normal(x, z), Vec3::Y);
        }
        assert!((map.height(2.0, 2.0) - 7.0).abs() < 1e-6);
    }

    #[test]
    fn test_bilinear_weights() {
        let map = HeightMap::new(0.0, 0.0, 0.0, 4.0, 4.0, 5, 5, false).unwrap();
        let (w, idx) = map.weights_and_indices(1.25, 2.5).unwrap();
        let eps = 1e-6;
        assert_eq!(idx, [11, 12, 16, 17]);
        assert!((w[0] - 0.375).abs() < eps);
        assert!((w[1] - 0.125).abs() < eps);
        assert!((w[2] - 0.375).abs() < eps);
        assert!((w[3] - 0.125).abs() < eps);
        assert!((w.iter().sum::<f32>() - 1.0).abs() < eps);
    }

    #[test]
    fn test_generate_from_slope() {
        let mesh = slope_mesh();
        let map = HeightMap::generate_from_mesh(&mesh, Mat4::IDENTITY, 11, 11, false).unwrap();

        assert_eq!(map.x0(), 0.0);
        assert_eq!(map.z0(), -1.0);
        for (x, z) in [(2.5, 2.5), (5.0, 7.3), (8.2, 1.1)] {
            let h = map.height(x, z);
            assert!((h - 0.5 * x).abs() < 1e-3, "height({}, {}) = {}", x, z, h);
        }
        let expected = Vec3::new(-0.5, 1.0, 0.0).normalize();
        let n = map.normal(5.0, 5.0).normalize();
        assert!((n - expected).length() < 1e-3, "normal = {:?}", n);
        assert!(map.is_initialized(5, 5));
    }

    #[test]
    fn test_generate_keeps_highest_hit() {
        let low = TriangleMesh::grid(4.0, 4.0, 1, 1, |_, _| 1.0);
        let mut high = TriangleMesh::grid(4.0, 4.0, 1, 1, |_, _| 3.0);
        let offset = low.positions.len() as u32;
        let mut mesh = low;
        mesh.positions.append(&mut high.positions);
        mesh.normals.append(&mut high.normals);
        mesh.indices.extend(high.indices.iter().map(|i| i + offset));

        let map = HeightMap::generate_from_mesh(&mesh, Mat4::IDENTITY, 5, 5, false).unwrap();
        assert!((map.height(2.0, 2.0) - 3.0).abs() < 1e-4);
    }

    #[test]
    fn test_generate_with_world_transform() {
        let mesh = TriangleMesh::grid(2.0, 2.0, 2, 2, |_, _| 0.0);
        let world = Mat4::from_translation(Vec3::new(10.0, 4.0, -6.0));
        let map = HeightMap::generate_from_mesh(&mesh, world, 5, 5, false).unwrap();
        assert_eq!(map.x0(), 10.0);
        assert_eq!(map.y0(), -6.0);
        assert!((map.height(11.0, -5.0) - 4.0).abs() < 1e-4);
    }

    #[test]
    fn test_blur_smooths_step() {
        let step = |x: f32, _: f32| if x < 5.0 { 0.0 } else { 2.0 };
        let mesh = TriangleMesh::grid(10.0, 10.0, 40, 40, step);
        let sharp = HeightMap::generate_from_mesh(&mesh, Mat4::IDENTITY, 21, 21, false).unwrap();
        let mut smooth = HeightMap::from_mesh_bounds(&mesh, Mat4::IDENTITY, 21, 21, true).unwrap();
        smooth.set_gauss_filter_coefficients(1.0, 0.001);
        smooth.generate(&mesh, Mat4::IDENTITY);

        // Far from the step both agree, near it the blur spreads the jump.
        assert!((smooth.height(1.2, 5.0) - sharp.height(1.2, 5.0)).abs() < 0.05);
        let near = smooth.height(4.25, 5.0);
        assert!(near > 0.1 && near < 1.9, "near = {}", near);
        for n in smooth.normals() {
            assert!((n.length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_min_max_and_adjust() {
        let mut map = HeightMap::new(0.0, 0.0, -1.0, 2.0, 2.0, 3, 3, false).unwrap();
        assert_eq!(map.min_max_heights(), (-1.0, -1.0));
        map.heights[0] = 4.0;
        map.initialized[0] = INITIALIZED;
        map.heights[4] = 2.0;
        map.initialized[4] = INITIALIZED;
        assert_eq!(map.min_max_heights(), (2.0, 4.0));
        map.adjust_z(2.0, 1.0);
        assert_eq!(map.min_max_heights(), (5.0, 9.0));
    }

    #[test]
    fn test_normal_rotation() {
        let rot = HeightMap::rotation_for_normal(Vec3::new(1.0, 1.0, 0.0));
        let up = rot * Vec3::Y;
        assert!((up - Vec3::new(1.0, 1.0, 0.0).normalize()).length() < 1e-5);
        assert_eq!(HeightMap::rotation_for_normal(Vec3::ZERO), Quat::IDENTITY);
    }

    #[test]
    fn test_baseline_is_up() {
        let map = HeightMap::new(0.0, 0.0, 0.0, 4.0, 4.0, 5, 5, false).unwrap();
        assert_eq!(map.normal(2.0, 2.0), UP);
        assert_eq!(map.normal(-5.0, 2.0), UP);
        assert_eq!(map.normal_rotation(2.0, 2.0), Quat::IDENTITY);

        // An overhang: the ray along -UP keeps the upper of two stacked floors.
        let mut mesh = TriangleMesh::grid(4.0, 4.0, 2, 2, |_, _| 1.0);
        let upper = TriangleMesh::grid(4.0, 4.0, 2, 2, |_, _| 3.0);
        let offset = mesh.positions.len() as u32;
        mesh.positions.extend(upper.positions);
        mesh.normals.extend(upper.normals);
        mesh.indices.extend(upper.indices.iter().map(|i| i + offset));
        let map = HeightMap::generate_from_mesh(&mesh, Mat4::IDENTITY, 5, 5, false).unwrap();
        assert!((map.height(2.0, 2.0) - 3.0).abs() < 1e-4, "height = {}", map.height(2.0, 2.0));
    }

    #[test]
    fn test_write_ppm() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("h.ppm");
        let mut map = HeightMap::new(0.0, 0.0, 0.0, 1.0, 1.0, 2, 2, false).unwrap();
        map.heights = vec![0.0, 1.0, 2.0, 4.0];
        map.write_ppm(&path, 0.0, 0.0, true).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("P3\n#Heightmap debug output\n2 2\n255\n"));
        assert!(text.trim_end().ends_with("255"));
    }
}
