// SPDX-FileCopyrightText: 2026 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::{BTreeSet, HashMap};
use std::io::{Read, Seek};

use glam::{Quat, Vec3};
use tracing::{debug, info, warn};

use crate::error::{FormatError, Result, ValidationError, Warning};
use crate::psa::{PsaReader, Sequence, SequenceDataMatrix};
use crate::psa_config::{PsaConfig, RemoveTracks};
use crate::sampling::{bracket, resample_times, BonePose};
use crate::scene::{Armature, Progress};
use crate::transform::decompose;

/// How PSA bone names are matched against armature bone names.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BoneMappingMode {
    Exact,
    #[default]
    CaseInsensitive,
}

impl BoneMappingMode {
    fn matches(self, armature_bone: &str, psa_bone: &str) -> bool {
        match self {
            BoneMappingMode::Exact => armature_bone == psa_bone,
            BoneMappingMode::CaseInsensitive => {
                armature_bone.to_lowercase() == psa_bone.to_lowercase()
            }
        }
    }
}

/// Where the frame rate of an imported action comes from.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FpsSource {
    /// Keep the frame rate stored in the sequence.
    #[default]
    Sequence,
    /// Resample every sequence to this frame rate.
    Custom(f32),
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PsaImportOptions {
    /// The sequences to import. Empty imports all of them.
    pub sequences: Vec<String>,
    pub action_name_prefix: String,
    pub bone_mapping_mode: BoneMappingMode,
    pub fps_source: FpsSource,
    /// Tracks to leave out, usually read from the `.config` file next to the PSA.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub config: PsaConfig,
    /// Multiplies every key's location before it is converted.
    pub translation_scale: f32,
    /// When disabled, actions are created without any tracks.
    pub write_keyframes: bool,
    /// Records the target frame rate on each action.
    pub write_metadata: bool,
    /// Replaces keyframes with one sample per whole frame of the source sequence.
    pub bake: bool,
}

impl Default for PsaImportOptions {
    fn default() -> Self {
        Self {
            sequences: Vec::new(),
            action_name_prefix: String::new(),
            bone_mapping_mode: BoneMappingMode::CaseInsensitive,
            fps_source: FpsSource::Sequence,
            config: PsaConfig::default(),
            translation_scale: 1.0,
            write_keyframes: true,
            write_metadata: true,
            bake: false,
        }
    }
}

/// The animation of a single armature bone. Values line up with [`ImportedAction::frames`].
#[derive(Debug, Clone, PartialEq)]
pub struct BoneTrack {
    /// Index into the armature's bones.
    pub bone: usize,
    /// Rotations relative to the bone's rest pose, or `None` if the channel was removed.
    pub rotations: Option<Vec<Quat>>,
    /// Locations relative to the bone's rest pose, or `None` if the channel was removed.
    pub locations: Option<Vec<Vec3>>,
}

/// One imported sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedAction {
    pub name: String,
    /// The name of the sequence it was imported from.
    pub sequence: String,
    /// The frame of each key.
    pub frames: Vec<f32>,
    pub tracks: Vec<BoneTrack>,
    /// The target frame rate, when metadata is written.
    pub fps: Option<f32>,
    pub baked: bool,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct PsaImportResult {
    pub actions: Vec<ImportedAction>,
    pub warnings: Vec<Warning>,
}

impl PsaImportResult {
    fn warn(&mut self, warning: Warning) {
        warn!("{warning}");
        self.warnings.push(warning);
    }
}

/// A PSA bone that has a counterpart in the armature.
struct ImportBone {
    psa_bone: usize,
    armature_bone: usize,
    /// Whether the armature parent of this bone is also animated by the PSA.
    has_imported_parent: bool,
    original_rotation: Quat,
    original_location: Vec3,
}

impl ImportBone {
    fn new(armature: &Armature, psa_bone: usize, armature_bone: usize, has_imported_parent: bool) -> Self {
        let bone = &armature.bones[armature_bone];
        let (_, rotation, location) = decompose(&bone.matrix_local);

        let (original_rotation, original_location) = match bone.parent {
            Some(parent) => {
                let (_, parent_rotation, parent_location) =
                    decompose(&armature.bones[parent].matrix_local);
                let inverse = parent_rotation.conjugate();
                (
                    (inverse * rotation).conjugate(),
                    inverse * (location - parent_location),
                )
            }
            None => (rotation.conjugate(), location),
        };

        Self {
            psa_bone,
            armature_bone,
            has_imported_parent,
            original_rotation,
            original_location,
        }
    }

    /// Converts a parent-relative key into a pose relative to the bone's rest pose.
    fn local_pose(&self, key: &BonePose) -> BonePose {
        let rotation = if self.has_imported_parent {
            self.original_rotation * key.rotation.conjugate()
        } else {
            self.original_rotation * key.rotation
        };

        BonePose {
            location: self.original_rotation * (key.location - self.original_location),
            rotation,
        }
    }
}

/// Resamples a data matrix so that each new frame is `frame_step` source frames apart.
///
/// The last source frame is always kept. A step of exactly `1.0` returns the matrix unchanged.
pub fn resample_sequence_data_matrix(
    matrix: &SequenceDataMatrix,
    frame_step: f32,
) -> Result<SequenceDataMatrix> {
    if frame_step == 1.0 {
        return Ok(matrix.clone());
    }
    if !(frame_step > 0.0) || !frame_step.is_finite() {
        return Err(ValidationError::InvalidFrameRate(frame_step).into());
    }

    let (frame_count, bone_count, _) = matrix.shape();
    let times = resample_times(frame_count, frame_step);
    let mut resampled = SequenceDataMatrix::new(times.len(), bone_count);

    for (frame, &time) in times.iter().enumerate() {
        let (lower, upper, factor) = bracket(time, frame_count);
        for bone in 0..bone_count {
            *resampled.get_mut(frame, bone) = if factor == 0.0 {
                *matrix.get(lower, bone)
            } else {
                let before = BonePose::from_data(matrix.get(lower, bone));
                let after = BonePose::from_data(matrix.get(upper, bone));
                before.interpolate(&after, factor).to_data()
            };
        }
    }

    Ok(resampled)
}

/// Maps PSA bone indices to armature bone indices, warning about anything left unmatched.
fn map_bones(
    armature: &Armature,
    psa_bone_names: &[String],
    mode: BoneMappingMode,
    result: &mut PsaImportResult,
) -> HashMap<usize, usize> {
    let mut psa_to_armature = HashMap::new();
    let mut armature_to_psa: HashMap<usize, usize> = HashMap::new();
    let mut missing = BTreeSet::new();

    for (psa_bone, psa_bone_name) in psa_bone_names.iter().enumerate() {
        let Some(armature_bone) = armature
            .bones
            .iter()
            .position(|bone| mode.matches(&bone.name, psa_bone_name))
        else {
            missing.insert(psa_bone_name.clone());
            continue;
        };

        match armature_to_psa.get(&armature_bone) {
            Some(&mapped_psa_bone) => result.warn(Warning::DuplicateBoneMapping {
                psa_bone,
                psa_bone_name: psa_bone_name.clone(),
                armature_bone,
                armature_bone_name: armature.bones[armature_bone].name.clone(),
                mapped_psa_bone,
            }),
            None => {
                psa_to_armature.insert(psa_bone, armature_bone);
                armature_to_psa.insert(armature_bone, psa_bone);
            }
        }
    }

    if !missing.is_empty() {
        result.warn(Warning::MissingArmatureBones {
            armature: armature.name.clone(),
            bones: missing.into_iter().collect(),
        });
    }

    let unanimated: Vec<String> = armature
        .bones
        .iter()
        .enumerate()
        .filter(|(index, _)| !armature_to_psa.contains_key(index))
        .map(|(_, bone)| bone.name.clone())
        .collect();
    if !unanimated.is_empty() {
        result.warn(Warning::UnanimatedArmatureBones { bones: unanimated });
    }

    psa_to_armature
}

fn import_bones(
    armature: &Armature,
    psa_to_armature: &HashMap<usize, usize>,
    result: &mut PsaImportResult,
) -> Vec<ImportBone> {
    let mapped_armature_bones: BTreeSet<usize> = psa_to_armature.values().copied().collect();

    let mut psa_bones: Vec<usize> = psa_to_armature.keys().copied().collect();
    psa_bones.sort_unstable();

    let mut missing_parents = Vec::new();
    let bones = psa_bones
        .into_iter()
        .map(|psa_bone| {
            let armature_bone = psa_to_armature[&psa_bone];
            let has_imported_parent = match armature.bones[armature_bone].parent {
                Some(parent) if mapped_armature_bones.contains(&parent) => true,
                Some(_) => {
                    missing_parents.push(armature.bones[armature_bone].name.clone());
                    false
                }
                None => false,
            };
            ImportBone::new(armature, psa_bone, armature_bone, has_imported_parent)
        })
        .collect();

    if !missing_parents.is_empty() {
        result.warn(Warning::MissingParentBones {
            bones: missing_parents,
        });
    }

    bones
}

/// Converts the keys of one sequence into tracks for `bones`.
fn build_tracks(
    sequence: &Sequence,
    mut matrix: SequenceDataMatrix,
    bones: &[ImportBone],
    target_fps: f32,
    options: &PsaImportOptions,
) -> Result<(Vec<f32>, Vec<BoneTrack>)> {
    let sequence_name = sequence.name.to_string_lossy();

    for bone in bones {
        for frame in 0..matrix.frame_count() {
            let data = matrix.get_mut(frame, bone.psa_bone);
            let mut key = BonePose::from_data(data);
            key.location *= options.translation_scale;
            *data = bone.local_pose(&key).to_data();
        }
    }

    let matrix = resample_sequence_data_matrix(&matrix, sequence.fps / target_fps)?;
    let key_count = matrix.frame_count();

    // Baked samples run to the end of the source sequence, holding the last key
    let sample_frames: Vec<usize> = if options.bake {
        (0..=sequence.frame_count.max(0) as usize)
            .map(|frame| frame.min(key_count.saturating_sub(1)))
            .collect()
    } else {
        (0..key_count).collect()
    };

    let tracks = bones
        .iter()
        .map(|bone| {
            let flags = options.config.bone_flags(&sequence_name, bone.psa_bone);
            let poses: Vec<BonePose> = sample_frames
                .iter()
                .map(|&frame| BonePose::from_data(matrix.get(frame, bone.psa_bone)))
                .collect();

            BoneTrack {
                bone: bone.armature_bone,
                rotations: (!flags.contains(RemoveTracks::ROTATION))
                    .then(|| poses.iter().map(|pose| pose.rotation).collect()),
                locations: (!flags.contains(RemoveTracks::LOCATION))
                    .then(|| poses.iter().map(|pose| pose.location).collect()),
            }
        })
        .collect();

    let frames = (0..sample_frames.len()).map(|frame| frame as f32).collect();
    Ok((frames, tracks))
}

/// Imports sequences from `reader` as actions on `armature`.
///
/// Bones that can't be matched up between the two are reported as warnings and left out.
pub fn import_psa<R: Read + Seek>(
    reader: &mut PsaReader<R>,
    armature: &Armature,
    options: &PsaImportOptions,
    progress: &mut dyn Progress,
) -> Result<PsaImportResult> {
    let mut result = PsaImportResult::default();

    let sequence_names = if options.sequences.is_empty() {
        reader.sequence_names()
    } else {
        options.sequences.clone()
    };

    let psa_bone_names: Vec<String> = reader
        .bones()
        .iter()
        .map(|bone| bone.name.to_string_lossy())
        .collect();
    let psa_to_armature = map_bones(armature, &psa_bone_names, options.bone_mapping_mode, &mut result);
    let bones = import_bones(armature, &psa_to_armature, &mut result);

    progress.begin(sequence_names.len());

    for (index, sequence_name) in sequence_names.iter().enumerate() {
        let sequence = reader
            .sequence(sequence_name)
            .cloned()
            .ok_or_else(|| FormatError::UnknownSequence(sequence_name.clone()))?;

        let target_fps = match options.fps_source {
            FpsSource::Sequence => sequence.fps,
            FpsSource::Custom(fps) => fps,
        };
        if !(target_fps > 0.0) || !(sequence.fps > 0.0) {
            return Err(ValidationError::InvalidFrameRate(target_fps.min(sequence.fps)).into());
        }

        let (frames, tracks) = if options.write_keyframes {
            let matrix = reader.read_sequence_data_matrix(sequence_name)?;
            build_tracks(&sequence, matrix, &bones, target_fps, options)?
        } else {
            (Vec::new(), Vec::new())
        };

        debug!(
            sequence = %sequence_name,
            keys = frames.len(),
            tracks = tracks.len(),
            "Imported sequence"
        );

        result.actions.push(ImportedAction {
            name: format!("{}{}", options.action_name_prefix, sequence_name),
            sequence: sequence_name.clone(),
            frames,
            tracks,
            fps: options.write_metadata.then_some(target_fps),
            baked: options.bake && options.write_keyframes,
        });

        progress.update(index + 1);
    }

    progress.end();

    info!(
        actions = result.actions.len(),
        bones = bones.len(),
        warnings = result.warnings.len(),
        "Imported PSA"
    );

    Ok(result)
}
