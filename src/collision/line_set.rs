//! Line-set primitive: static walls described by 2D segments.
//!
//! Segments are stored in the set's local XZ space and transformed (scale,
//! then orientation, then position) on every query.

use anyhow::{Context, Result};
use glam::{Mat4, Vec2, Vec3};
use std::path::Path;
use tracing::{debug, info};

use super::{xz, CollisionData, CollisionObject, CollisionShape};
use crate::error::{TesseraError, TesseraResult};
use crate::mesh::TriangleMesh;
use crate::transform::TransformationData;

/// Parallel segments are skipped below this determinant.
const PARALLEL_EPSILON: f32 = 1e-9;

/// A single segment in local XZ coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionLine {
    pub start: Vec2,
    pub end: Vec2,
}

impl CollisionLine {
    pub fn new(start: Vec2, end: Vec2) -> Self {
        Self { start, end }
    }
}

/// An immutable, non-empty list of segments.
#[derive(Debug, Clone)]
pub struct CollisionLineSet {
    lines: Vec<CollisionLine>,
}

impl CollisionLineSet {
    pub fn new(lines: Vec<CollisionLine>) -> TesseraResult<Self> {
        if lines.is_empty() {
            return Err(TesseraError::EmptyLineSet);
        }
        debug!("Created collision line set with {} lines", lines.len());
        Ok(Self { lines })
    }

    pub fn lines(&self) -> &[CollisionLine] {
        &self.lines
    }

    /// Segments in world XZ coordinates under `trans`.
    pub fn world_segments<'a>(
        &'a self,
        trans: &'a TransformationData,
    ) -> impl Iterator<Item = (Vec2, Vec2)> + 'a {
        self.lines.iter().map(move |line| {
            let p = trans.transform_point(Vec3::new(line.start.x, 0.0, line.start.y));
            let q = trans.transform_point(Vec3::new(line.end.x, 0.0, line.end.y));
            (xz(p), xz(q))
        })
    }
}

/// Segment `p`-`q` against a circle of radius `r` at `c`.
///
/// The segment is the first object: `normal1` points from the nearest point
/// on the segment toward the circle centre, `normal2` from the centre toward
/// the segment.
pub fn segment_vs_circle(p: Vec2, q: Vec2, c: Vec2, r: f32) -> Option<CollisionData> {
    let cp = c - p;
    let qp = q - p;
    let qp_len_sq = qp.dot(qp);
    if qp_len_sq <= f32::EPSILON {
        return None;
    }

    let mut projection = (cp.dot(qp) / qp_len_sq) * qp;
    let projection_len = projection.length();
    let qp_len = qp.length();
    if projection_len > qp_len + r {
        return None;
    }
    let before_start = projection.dot(qp) < 0.0;
    if before_start && projection_len > r {
        return None;
    }

    // Vector from the circle centre to the nearest point of the segment.
    // The far-end case is checked first, as the source system does, so a
    // circle behind `p` whose projection is longer than the segment is
    // measured against `q`.
    let dist = if projection_len > qp_len {
        projection = qp;
        q - c
    } else if before_start {
        projection = Vec2::ZERO;
        p - c
    } else {
        projection - cp
    };

    let dist_len = dist.length();
    let penetration = r - dist_len;
    // Touching is not a contact, same as circle-circle.
    if penetration <= 0.0 {
        return None;
    }

    let toward_segment = if dist_len > 1e-6 {
        dist / dist_len
    } else {
        // Centre lies on the segment; push out along the left-hand perpendicular.
        qp.perp().normalize()
    };
    let point = p + projection + toward_segment * (0.5 * penetration);
    Some(CollisionData::new(-toward_segment, point, penetration))
}

/// Intersection of segments `p0`-`q0` and `p1`-`q1`.
///
/// Returns a zero-penetration contact at the intersection point with
/// `normal1` pointing from `p0` toward it.
pub fn segment_vs_segment(p0: Vec2, q0: Vec2, p1: Vec2, q1: Vec2) -> Option<CollisionData> {
    // Bounding-box reject.
    if p0.x.max(q0.x) < p1.x.min(q1.x)
        || p1.x.max(q1.x) < p0.x.min(q0.x)
        || p0.y.max(q0.y) < p1.y.min(q1.y)
        || p1.y.max(q1.y) < p0.y.min(q0.y)
    {
        return None;
    }

    // Solve p0 + s * v0 = p1 + t * v1.
    let v0 = q0 - p0;
    let v1 = q1 - p1;
    let denom = v0.perp_dot(v1);
    if denom.abs() < PARALLEL_EPSILON {
        return None;
    }
    let w = p1 - p0;
    let s = w.perp_dot(v1) / denom;
    let t = w.perp_dot(v0) / denom;
    if !(0.0..=1.0).contains(&s) || !(0.0..=1.0).contains(&t) {
        return None;
    }

    let point = p0 + s * v0;
    let normal = (point - p0).try_normalize().unwrap_or_else(|| v0.normalize());
    Some(CollisionData::new(normal, point, 0.0))
}

pub(super) fn line_set_circle(a: &CollisionObject, b: &CollisionObject, dst: &mut Vec<CollisionData>) {
    let (CollisionShape::LineSet(lines), CollisionShape::Circle(circle)) = (&a.shape, &b.shape) else {
        return;
    };
    let c = b.position_2d();
    for (p, q) in lines.world_segments(&a.transformation) {
        if let Some(data) = segment_vs_circle(p, q, c, circle.radius) {
            dst.push(data);
        }
    }
}

pub(super) fn line_set_line_set(
    a: &CollisionObject,
    b: &CollisionObject,
    dst: &mut Vec<CollisionData>,
) {
    let (CollisionShape::LineSet(la), CollisionShape::LineSet(lb)) = (&a.shape, &b.shape) else {
        return;
    };
    let opponent: Vec<(Vec2, Vec2)> = lb.world_segments(&b.transformation).collect();
    for (p0, q0) in la.world_segments(&a.transformation) {
        for &(p1, q1) in &opponent {
            if let Some(data) = segment_vs_segment(p0, q0, p1, q1) {
                dst.push(data);
            }
        }
    }
}

/// Builds line sets from geometry files.
///
/// `file_type` is the type named in the collision-world configuration.
pub trait CollisionLineSetFactory {
    fn create(&self, file_type: &str, path: &Path) -> Result<CollisionLineSet>;
}

/// Reads plain-text segment lists: one `x1 z1 x2 z2` segment per line,
/// `#` starts a comment.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextLineSetFactory;

impl TextLineSetFactory {
    /// Parse segment text.
    pub fn parse(text: &str) -> Result<CollisionLineSet> {
        let mut lines = Vec::new();
        for (number, raw) in text.lines().enumerate() {
            let content = raw.split('#').next().unwrap_or("").trim();
            if content.is_empty() {
                continue;
            }
            let values = content
                .split_whitespace()
                .map(str::parse::<f32>)
                .collect::<Result<Vec<_>, _>>()
                .with_context(|| format!("Invalid number on line {}", number + 1))?;
            let &[x1, z1, x2, z2] = values.as_slice() else {
                anyhow::bail!(
                    "Expected 4 values on line {}, found {}",
                    number + 1,
                    values.len()
                );
            };
            lines.push(CollisionLine::new(Vec2::new(x1, z1), Vec2::new(x2, z2)));
        }
        Ok(CollisionLineSet::new(lines)?)
    }
}

impl CollisionLineSetFactory for TextLineSetFactory {
    fn create(&self, file_type: &str, path: &Path) -> Result<CollisionLineSet> {
        if !file_type.eq_ignore_ascii_case("lines") {
            return Err(TesseraError::UnknownShape(file_type.to_string()).into());
        }
        info!("Loading collision lines from {:?}", path);
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read collision lines from {:?}", path))?;
        Self::parse(&text).with_context(|| format!("Failed to parse {:?}", path))
    }
}

/// Extracts the boundary edges of a triangle mesh, projected onto XZ.
///
/// The mesh loader is supplied by the caller since mesh formats are outside
/// this crate.
pub struct MeshLineSetFactory<F> {
    load_mesh: F,
}

impl<F> MeshLineSetFactory<F>
where
    F: Fn(&str, &Path) -> Result<(TriangleMesh, Mat4)>,
{
    pub fn new(load_mesh: F) -> Self {
        Self { load_mesh }
    }

    /// Boundary edges of `mesh` under `transform`, dropping edges that are
    /// vertical (zero length in XZ).
    pub fn lines_from_mesh(mesh: &TriangleMesh, transform: Mat4) -> TesseraResult<CollisionLineSet> {
        let lines = mesh
            .boundary_edges()
            .into_iter()
            .map(|(a, b)| {
                let pa = transform.transform_point3(mesh.positions[a as usize]);
                let pb = transform.transform_point3(mesh.positions[b as usize]);
                CollisionLine::new(xz(pa), xz(pb))
            })
            .filter(|line| (line.end - line.start).length_squared() > f32::EPSILON)
            .collect();
        CollisionLineSet::new(lines)
    }
}

impl<F> CollisionLineSetFactory for MeshLineSetFactory<F>
where
    F: Fn(&str, &Path) -> Result<(TriangleMesh, Mat4)>,
{
    fn create(&self, file_type: &str, path: &Path) -> Result<CollisionLineSet> {
        let (mesh, transform) = (self.load_mesh)(file_type, path)
            .with_context(|| format!("Failed to load collision mesh {:?}", path))?;
        Ok(Self::lines_from_mesh(&mesh, transform)?)
    }
}
