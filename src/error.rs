// SPDX-FileCopyrightText: 2026 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Shorthand for results returned by this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The file is malformed and reading was aborted.
    #[error(transparent)]
    Format(#[from] FormatError),
    /// The input cannot produce a valid document. Nothing has been written.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The file at `path` could not be opened, created or written.
    #[error("cannot access \"{}\": {source}", .path.display())]
    Io {
        /// The path of the file that failed.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// An I/O error on a caller-supplied stream.
    #[error(transparent)]
    Stream(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<binrw::Error> for Error {
    fn from(error: binrw::Error) -> Self {
        match error {
            binrw::Error::Io(source) if source.kind() == std::io::ErrorKind::UnexpectedEof => {
                Error::Format(FormatError::UnexpectedEof)
            }
            binrw::Error::Io(source) => Error::Stream(source),
            other => Error::Format(FormatError::Decode(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum FormatError {
    /// A section that the format requires was never seen.
    #[error("required section \"{tag}\" is missing")]
    MissingSection { tag: &'static str },
    /// A recognized section declared records of the wrong size.
    #[error("section \"{tag}\" has element size {actual}, expected {expected}")]
    ElementSizeMismatch {
        tag: String,
        expected: usize,
        actual: i32,
    },
    /// A section header declared a negative size or count.
    #[error("section \"{tag}\" at offset {offset} has an invalid header (size {size}, count {count})")]
    InvalidSectionHeader {
        tag: String,
        offset: u64,
        size: i32,
        count: i32,
    },
    /// A section claims more bytes than the stream has left.
    #[error("section \"{tag}\" at offset {offset} needs {needed} bytes but only {available} remain")]
    Truncated {
        tag: String,
        offset: u64,
        needed: u64,
        available: u64,
    },
    #[error("unexpected end of stream")]
    UnexpectedEof,
    /// A record refers to another record that does not exist.
    #[error("{what} index {index} is out of range (count {count})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        count: usize,
    },
    #[error("no sequence named \"{0}\"")]
    UnknownSequence(String),
    #[error("failed to decode record: {0}")]
    Decode(String),
}

/// Which format limit was exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Wedges,
    Points,
    Bones,
    Materials,
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Limit::Wedges => write!(f, "wedges"),
            Limit::Points => write!(f, "points"),
            Limit::Bones => write!(f, "bones"),
            Limit::Materials => write!(f, "materials"),
        }
    }
}

/// The reason a root bone ended up in a filtered bone set.
#[derive(Debug, Clone, PartialEq)]
pub struct RootBoneReport {
    /// The offending root bone.
    pub root: String,
    /// The explicitly included bone whose ancestor walk reached `root`.
    pub included_by: String,
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("at least one mesh must be selected")]
    NoMeshes,
    #[error("at least one bone must be marked for export")]
    NoBones,
    #[error("no sequences were selected for export")]
    NoSequences,
    #[error("material slots cannot be empty ({object}, index {slot})")]
    EmptyMaterialSlot { object: String, slot: usize },
    #[error("mesh \"{object}\" references armature {armature}, which is not part of the scene")]
    UnknownArmature { object: String, armature: usize },
    #[error(
        "exported bone hierarchy must have a single root bone, found {}: {}",
        .roots.len(),
        .roots.iter().map(|r| format!("\"{}\" (included because \"{}\" was marked for export)", r.root, r.included_by)).collect::<Vec<_>>().join(", ")
    )]
    MultipleRootBones { roots: Vec<RootBoneReport> },
    #[error("found {count} bones with the name \"{name}\"; bone names must be unique when compared case-insensitively")]
    DuplicateBoneName { name: String, count: usize },
    #[error("number of {limit} ({count}) exceeds limit of {max}")]
    LimitExceeded { limit: Limit, count: usize, max: u64 },
    #[error("the string \"{0}\" contains characters that cannot be encoded in the Windows-1252 codepage")]
    UnencodableName(String),
    #[error("the name \"{name}\" is longer than {max} bytes")]
    NameTooLong { name: String, max: usize },
    #[error("forward axis {forward} and up axis {up} must not be parallel")]
    ParallelAxes { forward: String, up: String },
    #[error("when exporting multiple armatures the export space must be World; armatures: {0:?}")]
    MultipleArmaturesRequireWorldSpace(Vec<String>),
    #[error("armature \"{0}\" is part of a parenting cycle")]
    ArmatureCycle(String),
    #[error("bone \"{bone}\" of armature \"{armature}\" has parent index {parent}, which does not precede it")]
    InvalidBoneParent {
        armature: String,
        bone: String,
        parent: usize,
    },
    #[error("the mesh \"{object}\" has invalid topology: {reason}")]
    InvalidMesh { object: String, reason: String },
    #[error("the animation is inconsistent: {0}")]
    InvalidAnimation(String),
    #[error("frame rate must be positive, got {0}")]
    InvalidFrameRate(f32),
}

/// A non-fatal diagnostic. The operation that produced it still completed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Warning {
    #[error("skipped unrecognized section \"{tag}\" at offset {offset}")]
    UnknownSection { tag: String, offset: u64 },
    #[error("\"{object}\" has no active UV map")]
    MissingUvLayer { object: String },
    #[error("\"{object}\" has several color attributes and none is active; vertex colors were not exported")]
    AmbiguousVertexColors { object: String },
    #[error("discarded {count} invalid face(s)")]
    DiscardedFaces { count: usize },
    #[error("the armature \"{armature}\" is missing {} bones that exist in the PSA: {bones:?}", .bones.len())]
    MissingArmatureBones { armature: String, bones: Vec<String> },
    #[error("{} armature bone(s) have no counterpart in the PSA: {bones:?}", .bones.len())]
    UnanimatedArmatureBones { bones: Vec<String> },
    #[error(
        "PSA bone {psa_bone} ({psa_bone_name}) could not be mapped to armature bone {armature_bone} ({armature_bone_name}) because it is already mapped to PSA bone {mapped_psa_bone}"
    )]
    DuplicateBoneMapping {
        psa_bone: usize,
        psa_bone_name: String,
        armature_bone: usize,
        armature_bone_name: String,
        mapped_psa_bone: usize,
    },
    #[error("{} bone(s) have parents that are not present in the PSA: {bones:?}", .bones.len())]
    MissingParentBones { bones: Vec<String> },
    #[error("sequence frame start indices were invalid and have been recalculated")]
    RepairedFrameStartIndices,
    #[error("vertex group \"{group}\" on \"{object}\" has no matching bone and was skipped")]
    UnmappedVertexGroup { object: String, group: String },
}
