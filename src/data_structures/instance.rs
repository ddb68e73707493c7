//! Local node transforms.
//!
//! Nodes carry a decomposed translation / rotation / scale triple. World
//! matrices are composed from these when the graph is updated.

use cgmath::{InnerSpace, One, Zero};

/// Local transformation: position, rotation (as quaternion), and scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub position: cgmath::Vector3<f32>,
    pub rotation: cgmath::Quaternion<f32>,
    pub scale: cgmath::Vector3<f32>,
}

impl Transform {
    /// Identity transformation (no move, rotate, or scale).
    pub fn new() -> Self {
        Self {
            position: cgmath::Vector3::zero(),
            // `Quaternion::one()` is the identity quaternion (no rotation)
            rotation: cgmath::Quaternion::one(),
            scale: cgmath::Vector3::new(1.0, 1.0, 1.0),
        }
    }

    /// Build from glTF's decomposed form. Rotation is `[x, y, z, w]`.
    pub fn from_decomposed(
        (translation, rotation, scale): ([f32; 3], [f32; 4], [f32; 3]),
    ) -> Self {
        Self {
            position: translation.into(),
            rotation: cgmath::Quaternion::new(rotation[3], rotation[0], rotation[1], rotation[2])
                .normalize(),
            scale: scale.into(),
        }
    }

    pub fn to_matrix(&self) -> cgmath::Matrix4<f32> {
        cgmath::Matrix4::from_translation(self.position)
            * cgmath::Matrix4::from(self.rotation)
            * cgmath::Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{Matrix4, Rad, Rotation3, SquareMatrix, Vector4};

    #[test]
    fn identity_matrix() {
        assert_eq!(Transform::new().to_matrix(), Matrix4::identity());
    }

    #[test]
    fn translation_is_applied_after_scale_and_rotation() {
        let transform = Transform {
            position: cgmath::Vector3::new(1.0, 0.0, 0.0),
            rotation: cgmath::Quaternion::from_angle_z(Rad(std::f32::consts::FRAC_PI_2)),
            scale: cgmath::Vector3::new(2.0, 2.0, 2.0),
        };
        let moved = transform.to_matrix() * Vector4::new(1.0, 0.0, 0.0, 1.0);
        assert!((moved.x - 1.0).abs() < 1e-5);
        assert!((moved.y - 2.0).abs() < 1e-5);
    }
}
