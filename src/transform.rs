// SPDX-FileCopyrightText: 2026 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fmt;

use glam::{Mat3, Mat4, Quat, Vec3};

use crate::error::ValidationError;
use crate::scene::Armature;

/// One of the six signed coordinate axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Axis {
    X,
    Y,
    Z,
    NegX,
    NegY,
    NegZ,
}

impl Axis {
    pub fn vector(self) -> Vec3 {
        match self {
            Axis::X => Vec3::X,
            Axis::Y => Vec3::Y,
            Axis::Z => Vec3::Z,
            Axis::NegX => Vec3::NEG_X,
            Axis::NegY => Vec3::NEG_Y,
            Axis::NegZ => Vec3::NEG_Z,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Axis::X => "X",
            Axis::Y => "Y",
            Axis::Z => "Z",
            Axis::NegX => "-X",
            Axis::NegY => "-Y",
            Axis::NegZ => "-Z",
        };
        write!(f, "{name}")
    }
}

/// Which space the exported geometry and root bone are expressed in.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExportSpace {
    /// Scene world space.
    #[default]
    World,
    /// Relative to the armature object, ignoring its scale.
    Armature,
    /// Relative to the armature's root bone.
    Root,
}

/// A change of basis built from a forward and an up axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateSystem {
    rotation: Mat3,
}

impl CoordinateSystem {
    /// The default system, with `X` forward and `Z` up, is the identity.
    pub fn new(forward: Axis, up: Axis) -> Result<Self, ValidationError> {
        let forward_vector = forward.vector();
        let up_vector = up.vector();

        if forward_vector.cross(up_vector) == Vec3::ZERO {
            return Err(ValidationError::ParallelAxes {
                forward: forward.to_string(),
                up: up.to_string(),
            });
        }

        let left = up_vector.cross(forward_vector);

        // Rows are forward, left and up
        Ok(Self {
            rotation: Mat3::from_cols(forward_vector, left, up_vector).transpose(),
        })
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_mat3(self.rotation)
    }

    pub fn rotation(&self) -> Quat {
        Quat::from_mat3(&self.rotation)
    }

    pub fn transform_vector(&self, vector: Vec3) -> Vec3 {
        self.rotation * vector
    }
}

impl Default for CoordinateSystem {
    fn default() -> Self {
        Self {
            rotation: Mat3::IDENTITY,
        }
    }
}

/// Convenience wrapper returning the 4x4 matrix of [`CoordinateSystem::new`].
pub fn coordinate_system_transform(forward: Axis, up: Axis) -> Result<Mat4, ValidationError> {
    CoordinateSystem::new(forward, up).map(|system| system.matrix())
}

/// Splits a matrix into scale, rotation and translation.
pub fn decompose(matrix: &Mat4) -> (Vec3, Quat, Vec3) {
    matrix.to_scale_rotation_translation()
}

/// The matrix with its scale removed.
pub fn without_scale(matrix: &Mat4) -> Mat4 {
    let (_, rotation, translation) = decompose(matrix);
    Mat4::from_rotation_translation(rotation, translation)
}

/// Whether the matrix mirrors geometry, i.e. an odd number of its scale axes are negative.
pub fn is_mirrored(matrix: &Mat4) -> bool {
    Mat3::from_mat4(*matrix).determinant() < 0.0
}

/// The matrix that brings world-space geometry into `export_space`.
///
/// With no armature, every export space is the identity.
pub fn export_space_matrix(armature: Option<&Armature>, export_space: ExportSpace) -> Mat4 {
    let Some(armature) = armature else {
        return Mat4::IDENTITY;
    };

    match export_space {
        ExportSpace::World => Mat4::IDENTITY,
        ExportSpace::Armature => without_scale(&armature.world_matrix).inverse(),
        ExportSpace::Root => match armature.bones.first() {
            Some(root) => (without_scale(&armature.world_matrix) * root.matrix_local).inverse(),
            None => without_scale(&armature.world_matrix).inverse(),
        },
    }
}
