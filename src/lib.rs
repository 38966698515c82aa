// SPDX-FileCopyrightText: 2026 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

/// Represents a continuous block of memory which is not owned, and comes either from an in-memory location or from a file.
pub type ByteSpan<'a> = &'a [u8];

/// Represents a continuous block of memory which is owned.
pub type ByteBuffer = Vec<u8>;

/// Errors and warnings produced while reading, writing, building and importing.
pub mod error;

pub use error::{Error, FormatError, Result, ValidationError, Warning};

/// Common structures shared by both file formats, such as vectors and bones.
pub mod common;

mod common_file_operations;

/// The chunked section container used by both PSK and PSA files.
pub mod section;

/// Reading and writing skeletal meshes (PSK/PSKX).
pub mod psk;

/// Reading and writing skeletal animations (PSA).
pub mod psa;

/// Reading UEViewer `.config` files that accompany PSA files.
pub mod psa_config;

/// Coordinate systems and export spaces.
#[cfg(feature = "scene")]
pub mod transform;

/// The plain-record scene model that hosts convert their objects into.
#[cfg(feature = "scene")]
pub mod scene;

/// Bone filtering and conversion of bone hierarchies into PSX bones.
#[cfg(feature = "scene")]
pub mod bones;

/// Building PSK documents from scene meshes.
#[cfg(feature = "scene")]
pub mod psk_builder;

/// Converting PSK documents back into scene records.
#[cfg(feature = "scene")]
pub mod psk_importer;

/// Building PSA documents by sampling poses.
#[cfg(feature = "scene")]
pub mod psa_builder;

/// Converting PSA sequences into pose tracks for a target armature.
#[cfg(feature = "scene")]
pub mod psa_importer;

/// Interpolation helpers shared by the animation builder and importer.
#[cfg(feature = "scene")]
pub mod sampling;
