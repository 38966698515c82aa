// SPDX-FileCopyrightText: 2026 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fmt;

use binrw::binrw;

use crate::common_file_operations::{decode_windows_1252, encode_windows_1252};
use crate::error::ValidationError;

/// A record with a fixed size on the wire, used for the `element_size` field of section headers.
pub trait FixedSize {
    /// Size of one record in bytes.
    const SIZE: usize;
}

#[binrw]
#[brw(little)]
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

impl FixedSize for Vector2 {
    const SIZE: usize = 8;
}

#[binrw]
#[brw(little)]
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl FixedSize for Vector3 {
    const SIZE: usize = 12;
}

/// A rotation quaternion. Stored as x, y, z, w on the wire.
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    /// Returns the components in w, x, y, z order.
    pub fn to_wxyz(self) -> [f32; 4] {
        [self.w, self.x, self.y, self.z]
    }

    pub fn from_wxyz(wxyz: [f32; 4]) -> Self {
        Self {
            w: wxyz[0],
            x: wxyz[1],
            y: wxyz[2],
            z: wxyz[3],
        }
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl FixedSize for Quaternion {
    const SIZE: usize = 16;
}

/// An 8-bit RGBA color.
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color {
        r: 255,
        g: 255,
        b: 255,
        a: 255,
    };

    /// Returns the color with each channel mapped to 0..1.
    pub fn normalized(&self) -> [f32; 4] {
        [
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
            self.a as f32 / 255.0,
        ]
    }

    /// Quantizes a 0..1 color, clamping out of range channels.
    pub fn from_normalized(rgba: [f32; 4]) -> Self {
        let quantize = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self {
            r: quantize(rgba[0]),
            g: quantize(rgba[1]),
            b: quantize(rgba[2]),
            a: quantize(rgba[3]),
        }
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

impl FixedSize for Color {
    const SIZE: usize = 4;
}

/// Length in bytes of the names embedded in bones, materials, sequences and morph targets.
pub const NAME_LENGTH: usize = 64;

/// A zero-padded, Windows-1252 encoded name as it appears on the wire.
#[binrw]
#[brw(little)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FixedName(pub [u8; NAME_LENGTH]);

impl FixedName {
    /// Encodes `name`, failing if it contains characters outside of Windows-1252 or doesn't fit.
    pub fn new(name: &str) -> Result<Self, ValidationError> {
        let bytes = encode_windows_1252(name)
            .ok_or_else(|| ValidationError::UnencodableName(name.to_string()))?;
        if bytes.len() > NAME_LENGTH {
            return Err(ValidationError::NameTooLong {
                name: name.to_string(),
                max: NAME_LENGTH,
            });
        }

        let mut buffer = [0u8; NAME_LENGTH];
        buffer[..bytes.len()].copy_from_slice(&bytes);
        Ok(Self(buffer))
    }

    /// The raw bytes up to (but not including) the first nul.
    pub fn as_bytes(&self) -> &[u8] {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(NAME_LENGTH);
        &self.0[..end]
    }

    /// Decodes the name. Every byte sequence is valid Windows-1252, so this never fails.
    pub fn to_string_lossy(&self) -> String {
        decode_windows_1252(self.as_bytes())
    }
}

impl Default for FixedName {
    fn default() -> Self {
        Self([0u8; NAME_LENGTH])
    }
}

impl fmt::Debug for FixedName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self.to_string_lossy())
    }
}

impl fmt::Display for FixedName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_string_lossy())
    }
}

/// A bone record, shared by the PSK reference skeleton and the PSA bone list.
///
/// In memory, the root bone always has a `parent_index` of `-1`. The readers and writers
/// translate to and from each format's own convention.
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, PartialEq)]
pub struct PsxBone {
    pub name: FixedName,
    pub flags: i32,
    pub children_count: i32,
    pub parent_index: i32,
    pub rotation: Quaternion,
    pub location: Vector3,
    pub length: f32,
    pub size: Vector3,
}

impl PsxBone {
    /// Creates a root bone with an identity transform.
    pub fn new(name: &str) -> Result<Self, ValidationError> {
        Ok(Self {
            name: FixedName::new(name)?,
            flags: 0,
            children_count: 0,
            parent_index: -1,
            rotation: Quaternion::IDENTITY,
            location: Vector3::ZERO,
            length: 0.0,
            size: Vector3::ZERO,
        })
    }

    pub fn is_root(&self) -> bool {
        self.parent_index < 0
    }

    /// The parent index, or `None` for the root.
    pub fn parent(&self) -> Option<usize> {
        usize::try_from(self.parent_index).ok()
    }
}

impl FixedSize for PsxBone {
    const SIZE: usize = 120;
}

/// Converts bones read from a file into the in-memory convention, where the root has a parent of `-1`.
///
/// Both `(0, 0)` and any negative parent index on the first bone are accepted as the root.
pub(crate) fn normalize_root_parent(bones: &mut [PsxBone]) {
    if let Some(first) = bones.first_mut() {
        if first.parent_index <= 0 {
            first.parent_index = -1;
        }
    }
}

#[cfg(feature = "scene")]
mod glam_conversions {
    use super::*;
    use glam::{Quat, Vec2, Vec3};

    impl From<Vector2> for Vec2 {
        fn from(v: Vector2) -> Self {
            Vec2::new(v.x, v.y)
        }
    }

    impl From<Vec2> for Vector2 {
        fn from(v: Vec2) -> Self {
            Vector2 { x: v.x, y: v.y }
        }
    }

    impl From<Vector3> for Vec3 {
        fn from(v: Vector3) -> Self {
            Vec3::new(v.x, v.y, v.z)
        }
    }

    impl From<Vec3> for Vector3 {
        fn from(v: Vec3) -> Self {
            Vector3 {
                x: v.x,
                y: v.y,
                z: v.z,
            }
        }
    }

    impl From<Quaternion> for Quat {
        fn from(q: Quaternion) -> Self {
            Quat::from_xyzw(q.x, q.y, q.z, q.w)
        }
    }

    impl From<Quat> for Quaternion {
        fn from(q: Quat) -> Self {
            Quaternion {
                x: q.x,
                y: q.y,
                z: q.z,
                w: q.w,
            }
        }
    }
}
