//! Poses carried through transformation pipes.
//!
//! A [`TransformationData`] is what the simulation emits for each body and
//! what collision shapes are positioned with. Pipes themselves live outside
//! the crate; [`PipeDescriptor`] identifies one and [`TransformationModifier`]
//! is the hook an external pipe stage composes.

use glam::{Mat4, Quat, Vec3};

/// World pose: position, orientation, and per-axis scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformationData {
    pub position: Vec3,
    pub orientation: Quat,
    pub scale: Vec3,
}

impl TransformationData {
    /// The identity pose.
    pub fn identity() -> Self {
        Self {
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }

    /// A pure translation.
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::identity()
        }
    }

    /// A translation followed by a rotation.
    pub fn from_position_orientation(position: Vec3, orientation: Quat) -> Self {
        Self {
            position,
            orientation,
            scale: Vec3::ONE,
        }
    }

    /// Convert to a 4x4 matrix (translation * rotation * scale).
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.orientation, self.position)
    }

    /// Decompose an affine matrix. Shear is discarded.
    pub fn from_matrix(mat: Mat4) -> Self {
        let (scale, orientation, position) = mat.to_scale_rotation_translation();
        Self {
            position,
            orientation: orientation.normalize(),
            scale,
        }
    }

    /// Compose two poses: `other` is applied first, then `self`.
    pub fn multiply(&self, other: &TransformationData) -> Self {
        Self::from_matrix(self.to_matrix() * other.to_matrix())
    }

    /// The pose that undoes `self`.
    pub fn inverse(&self) -> Self {
        Self::from_matrix(self.to_matrix().inverse())
    }

    /// Transform a point from local into world space.
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.position + self.orientation * (point * self.scale)
    }
}

impl Default for TransformationData {
    fn default() -> Self {
        Self::identity()
    }
}

/// Identifies a transformation pipe: who writes, who reads, and for which object.
///
/// The field order matches the wire order used by the physics sync event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PipeDescriptor {
    pub src_id: u32,
    pub dst_id: u32,
    pub pipe_type: u32,
    pub object_class: u32,
    pub object_type: u32,
    pub object_id: u32,
    pub priority: u32,
    pub user_id: u32,
}

impl PipeDescriptor {
    /// Fields in wire order.
    pub fn to_array(&self) -> [u32; 8] {
        [
            self.src_id,
            self.dst_id,
            self.pipe_type,
            self.object_class,
            self.object_type,
            self.object_id,
            self.priority,
            self.user_id,
        ]
    }

    /// Inverse of [`Self::to_array`].
    pub fn from_array(fields: [u32; 8]) -> Self {
        Self {
            src_id: fields[0],
            dst_id: fields[1],
            pipe_type: fields[2],
            object_class: fields[3],
            object_type: fields[4],
            object_id: fields[5],
            priority: fields[6],
            user_id: fields[7],
        }
    }
}

/// A stage in a transformation pipe.
///
/// Receives the result of the previous stage together with the pipe it runs
/// in and returns the pose handed to the next stage.
pub trait TransformationModifier: Send {
    fn execute(
        &mut self,
        last_stage: TransformationData,
        pipe: &PipeDescriptor,
    ) -> TransformationData;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        let t = TransformationData::identity();
        assert_eq!(t.position, Vec3::ZERO);
        assert_eq!(t.orientation, Quat::IDENTITY);
        assert_eq!(t.scale, Vec3::ONE);
        assert_eq!(t.to_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn test_multiply_then_inverse() {
        let a = TransformationData::from_position_orientation(
            Vec3::new(1.0, 2.0, 3.0),
            Quat::from_rotation_y(std::f32::consts::FRAC_PI_4),
        );
        let b = TransformationData::from_position(Vec3::new(0.5, 0.0, -1.0));

        let ab = a.multiply(&b);
        let back = a.inverse().multiply(&ab);

        let eps = 1e-5;
        assert!((back.position - b.position).length() < eps);
        assert!((back.orientation.dot(b.orientation).abs() - 1.0).abs() < eps);
    }

    #[test]
    fn test_transform_point_applies_scale_first() {
        let t = TransformationData {
            position: Vec3::new(10.0, 0.0, 0.0),
            orientation: Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
            scale: Vec3::splat(2.0),
        };
        let p = t.transform_point(Vec3::X);
        // X scaled to 2, rotated +90 degrees about Y lands on -Z
        let eps = 1e-5;
        assert!((p - Vec3::new(10.0, 0.0, -2.0)).length() < eps, "p = {:?}", p);
    }

    #[test]
    fn test_pipe_descriptor_field_order() {
        let d = PipeDescriptor {
            src_id: 1,
            dst_id: 2,
            pipe_type: 3,
            object_class: 4,
            object_type: 5,
            object_id: 6,
            priority: 7,
            user_id: 8,
        };
        assert_eq!(d.to_array(), [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(PipeDescriptor::from_array(d.to_array()), d);
    }
}
