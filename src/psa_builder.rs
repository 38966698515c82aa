// SPDX-FileCopyrightText: 2026 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::HashMap;

use glam::{Mat4, Quat, Vec3};
use tracing::{debug, info};

use crate::bones::{
    create_psx_bones, relative_transform, root_rest_transform, BoneOptions, BoneSource, ParentLink,
    PsxBoneCreateResult,
};
use crate::common::FixedName;
use crate::error::{Result, ValidationError};
use crate::psa::{Key, Psa, Sequence};
use crate::sampling::{sequence_frames, whole_frame, BonePose};
use crate::scene::{Armature, PoseSampler, Progress, SamplerGuard};
use crate::transform::{decompose, without_scale, CoordinateSystem, ExportSpace};

/// How fractional frames are evaluated.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SamplingMode {
    /// Whole frames are sampled and the frames between them interpolated.
    #[default]
    Interpolated,
    /// The sampler is evaluated at the fractional frame itself.
    Subframe,
}

/// One sequence to export: a range of frames of an animation source.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExportSequence {
    pub name: String,
    /// The animation to make active while sampling. `None` samples whatever is active.
    pub source: Option<String>,
    pub frame_start: i32,
    /// May be before `frame_start`, which plays the range backwards.
    pub frame_end: i32,
    /// The frame rate of the source.
    pub fps: f32,
    /// Scales the number of frames. `0.5` keeps every other frame.
    pub compression_ratio: f32,
    /// The minimum number of frames.
    pub key_quota: usize,
    pub group: Option<String>,
}

impl ExportSequence {
    pub fn new(name: &str, frame_start: i32, frame_end: i32, fps: f32) -> Self {
        Self {
            name: name.to_string(),
            source: None,
            frame_start,
            frame_end,
            fps,
            compression_ratio: 1.0,
            key_quota: 0,
            group: None,
        }
    }

    /// The number of frames in the source range, inclusive.
    pub fn raw_frame_count(&self) -> usize {
        self.frame_start.abs_diff(self.frame_end) as usize + 1
    }

    /// The number of frames to export, never less than the key quota or one.
    pub fn frame_count(&self) -> usize {
        let compressed = (self.raw_frame_count() as f32 * self.compression_ratio).round() as usize;
        compressed.max(self.key_quota).max(1)
    }

    /// The distance in source frames between exported frames.
    pub fn frame_step(&self) -> f32 {
        let frame_count = self.frame_count();
        if frame_count == 1 {
            0.0
        } else {
            (self.frame_end - self.frame_start) as f32 / (frame_count - 1) as f32
        }
    }

    /// The playback rate after resampling.
    pub fn output_fps(&self) -> f32 {
        self.frame_count() as f32 / (self.raw_frame_count() as f32 / self.fps)
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PsaBuildOptions {
    pub bones: BoneOptions,
    /// Bakes the armature's own movement into the root bone. Otherwise the root stays in its rest pose.
    pub root_motion: bool,
    pub sampling_mode: SamplingMode,
}

impl Default for PsaBuildOptions {
    fn default() -> Self {
        Self {
            bones: BoneOptions::default(),
            root_motion: false,
            sampling_mode: SamplingMode::Interpolated,
        }
    }
}

/// Samples every exported bone at the sampler's current frame.
struct PoseEvaluator<'a> {
    armatures: &'a [Armature],
    bones: &'a PsxBoneCreateResult,
    options: &'a PsaBuildOptions,
    system: CoordinateSystem,
    /// Per armature, its exported bones.
    armature_bones: Vec<(usize, Vec<usize>)>,
}

impl PoseEvaluator<'_> {
    fn evaluate<S: PoseSampler + ?Sized>(&self, sampler: &mut S) -> Vec<BonePose> {
        let mut pose_matrices: HashMap<(usize, usize), Mat4> = HashMap::new();
        let mut world_matrices: HashMap<usize, Mat4> = HashMap::new();
        for (armature, bones) in &self.armature_bones {
            let matrices = sampler.pose_matrices(*armature, bones);
            for (&bone, matrix) in bones.iter().zip(matrices) {
                pose_matrices.insert((*armature, bone), matrix);
            }
            world_matrices.insert(*armature, sampler.armature_world_matrix(*armature));
        }

        let pose = |armature: usize, bone: usize| {
            pose_matrices
                .get(&(armature, bone))
                .copied()
                .unwrap_or(Mat4::IDENTITY)
        };
        let world = |armature: usize| {
            world_matrices
                .get(&armature)
                .copied()
                .unwrap_or(Mat4::IDENTITY)
        };
        let scale = self.options.bones.scale;

        self.bones
            .sources
            .iter()
            .zip(&self.bones.bones)
            .map(|(source, psx_bone)| {
                let BoneSource::Bone {
                    armature,
                    bone,
                    parent,
                } = *source
                else {
                    return BonePose {
                        location: psx_bone.location.into(),
                        rotation: psx_bone.rotation.into(),
                    };
                };

                let matrix = pose(armature, bone);
                let (armature_scale, _, _) = decompose(&self.armatures[armature].world_matrix);

                match parent {
                    ParentLink::Bone(parent) => {
                        let local = pose(armature, parent).inverse() * matrix;
                        let (_, rotation, location) = decompose(&local);
                        BonePose {
                            location: location * scale * armature_scale,
                            rotation: rotation.normalize().conjugate(),
                        }
                    }
                    ParentLink::Armature {
                        armature: parent_armature,
                        bone: parent_bone,
                    } => {
                        let world_transform = |armature: usize, matrix: Mat4| -> (Quat, Vec3) {
                            let (_, rotation, translation) =
                                decompose(&(without_scale(&world(armature)) * matrix));
                            (rotation, translation)
                        };
                        let (rotation, location) = relative_transform(
                            world_transform(parent_armature, pose(parent_armature, parent_bone)),
                            world_transform(armature, matrix),
                        );
                        BonePose {
                            location: location * scale * armature_scale,
                            rotation: rotation.normalize().conjugate(),
                        }
                    }
                    ParentLink::SyntheticRoot => {
                        let world_matrix = world(armature);
                        let (_, world_rotation, _) = decompose(&world_matrix);
                        let (_, rotation, head) = decompose(&matrix);
                        BonePose {
                            location: world_matrix.transform_point3(head) * scale,
                            rotation: (world_rotation * rotation).normalize().conjugate(),
                        }
                    }
                    ParentLink::None if self.options.root_motion => {
                        let mut animated = Armature::new(&self.armatures[armature].name);
                        animated.world_matrix = world(armature);
                        let (rotation, location) = root_rest_transform(
                            &animated,
                            matrix,
                            ExportSpace::World,
                            &self.system,
                        );
                        BonePose {
                            location: location * scale,
                            rotation: rotation.normalize(),
                        }
                    }
                    ParentLink::None => BonePose {
                        location: psx_bone.location.into(),
                        rotation: psx_bone.rotation.into(),
                    },
                }
            })
            .collect()
    }
}

/// Samples the poses of `sequence` at each of its exported frames.
fn sample_sequence<S: PoseSampler + ?Sized>(
    sampler: &mut S,
    evaluator: &PoseEvaluator,
    sequence: &ExportSequence,
    mode: SamplingMode,
) -> Vec<Vec<BonePose>> {
    let frames = sequence_frames(
        sequence.frame_start as f32,
        sequence.frame_end as f32,
        sequence.frame_count(),
    );

    // The last two whole frames sampled
    let mut cache: Vec<(i32, Vec<BonePose>)> = Vec::with_capacity(2);
    let mut sample_whole = |sampler: &mut S, frame: i32| -> Vec<BonePose> {
        if let Some((_, poses)) = cache.iter().find(|(f, _)| *f == frame) {
            return poses.clone();
        }
        sampler.set_frame(frame as f32);
        let poses = evaluator.evaluate(sampler);
        if cache.len() == 2 {
            cache.remove(0);
        }
        cache.push((frame, poses.clone()));
        poses
    };

    frames
        .into_iter()
        .map(|frame| match (mode, whole_frame(frame)) {
            (_, Some(whole)) => sample_whole(&mut *sampler, whole),
            (SamplingMode::Subframe, None) => {
                sampler.set_frame(frame);
                evaluator.evaluate(&mut *sampler)
            }
            (SamplingMode::Interpolated, None) => {
                let lower = frame.floor();
                let factor = frame - lower;
                let before = sample_whole(&mut *sampler, lower as i32);
                let after = sample_whole(&mut *sampler, lower as i32 + 1);
                before
                    .iter()
                    .zip(&after)
                    .map(|(a, b)| a.interpolate(b, factor))
                    .collect()
            }
        })
        .collect()
}

/// Builds a PSA by sampling `sequences` on the bones of `export` (indices into `armatures`).
///
/// The sampler's frame and active source are restored when this returns, whether it succeeds or not.
pub fn build_psa<S: PoseSampler + ?Sized>(
    armatures: &[Armature],
    export: &[usize],
    sampler: &mut S,
    sequences: &[ExportSequence],
    options: &PsaBuildOptions,
    progress: &mut dyn Progress,
) -> Result<Psa> {
    if sequences.is_empty() {
        return Err(ValidationError::NoSequences.into());
    }
    if let Some(sequence) = sequences.iter().find(|s| !(s.fps > 0.0)) {
        return Err(ValidationError::InvalidFrameRate(sequence.fps).into());
    }

    let system = CoordinateSystem::new(options.bones.forward_axis, options.bones.up_axis)?;
    let bones = create_psx_bones(armatures, export, &options.bones)?;
    if !bones.has_armature_bones() {
        return Err(ValidationError::NoBones.into());
    }

    let evaluator = PoseEvaluator {
        armatures,
        bones: &bones,
        options,
        system,
        armature_bones: bones
            .armatures
            .iter()
            .map(|&armature| (armature, bones.armature_bones(armature)))
            .collect(),
    };

    let mut psa = Psa {
        bones: bones.bones.clone(),
        ..Default::default()
    };
    let bone_count = psa.bones.len();

    let mut sampler = SamplerGuard::new(sampler);
    progress.begin(sequences.len());

    let mut frame_start_index = 0;
    for (index, export_sequence) in sequences.iter().enumerate() {
        if export_sequence.source.is_some() {
            sampler.set_source(export_sequence.source.as_deref());
        }

        let frame_count = export_sequence.frame_count();
        let fps = export_sequence.output_fps();

        debug!(
            name = %export_sequence.name,
            frame_count,
            step = export_sequence.frame_step(),
            fps,
            "Sampling sequence"
        );

        let frames = sample_sequence(&mut *sampler, &evaluator, export_sequence, options.sampling_mode);
        for poses in &frames {
            psa.keys.extend(poses.iter().map(|pose| Key {
                location: pose.location.into(),
                rotation: pose.rotation.into(),
                time: 1.0 / fps,
            }));
        }

        let mut sequence = Sequence::new(&export_sequence.name)?;
        if let Some(group) = &export_sequence.group {
            sequence.group = FixedName::new(group)?;
        }
        sequence.bone_count = bone_count as i32;
        sequence.key_quotum = (frame_count * bone_count) as i32;
        sequence.key_reduction = 1.0;
        sequence.track_time = frame_count as f32;
        sequence.fps = fps;
        sequence.frame_start_index = frame_start_index as i32;
        sequence.frame_count = frame_count as i32;
        psa.sequences.push(sequence);

        frame_start_index += frame_count;
        progress.update(index + 1);
    }

    progress.end();

    info!(
        bones = bone_count,
        sequences = psa.sequences.len(),
        keys = psa.keys.len(),
        "Built PSA"
    );

    Ok(psa)
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use super::*;
    use crate::error::Error;
    use crate::scene::NoProgress;

    /// Rotates the second bone about Z by a quarter turn every 10 frames and moves the root along X.
    struct Turntable {
        frame: f32,
        source: Option<String>,
        samples: Vec<f32>,
    }

    impl Turntable {
        fn new() -> Self {
            Self {
                frame: 7.0,
                source: Some("Original".to_string()),
                samples: Vec::new(),
            }
        }
    }

    impl PoseSampler for Turntable {
        fn current_frame(&self) -> f32 {
            self.frame
        }

        fn set_frame(&mut self, frame: f32) {
            self.frame = frame;
        }

        fn current_source(&self) -> Option<String> {
            self.source.clone()
        }

        fn set_source(&mut self, source: Option<&str>) {
            self.source = source.map(str::to_string);
        }

        fn pose_matrices(&mut self, _armature: usize, bones: &[usize]) -> Vec<Mat4> {
            self.samples.push(self.frame);
            let root = Mat4::from_translation(Vec3::new(self.frame, 0.0, 0.0));
            let child = root
                * Mat4::from_rotation_translation(
                    Quat::from_rotation_z(FRAC_PI_2 * self.frame / 10.0),
                    Vec3::new(0.0, 0.0, 1.0),
                );
            bones
                .iter()
                .map(|&bone| if bone == 0 { root } else { child })
                .collect()
        }

        fn armature_world_matrix(&mut self, _armature: usize) -> Mat4 {
            Mat4::IDENTITY
        }
    }

    fn armature() -> Armature {
        let mut armature = Armature::new("Armature");
        let root = armature.add_bone("Root", None, Mat4::IDENTITY);
        armature.add_bone(
            "Child",
            Some(root),
            Mat4::from_translation(Vec3::new(0.0, 0.0, 1.0)),
        );
        armature
    }

    #[test]
    fn frame_counts() {
        let mut sequence = ExportSequence::new("Walk", 1, 100, 30.0);
        assert_eq!(sequence.raw_frame_count(), 100);
        assert_eq!(sequence.frame_count(), 100);
        assert_eq!(sequence.frame_step(), 1.0);

        sequence.compression_ratio = 0.5;
        assert_eq!(sequence.frame_count(), 50);
        assert!((sequence.frame_step() - 99.0 / 49.0).abs() < 1e-6);
        assert_eq!(sequence.output_fps(), 15.0);

        // The quota is a floor
        sequence.key_quota = 80;
        assert_eq!(sequence.frame_count(), 80);

        let single = ExportSequence::new("Pose", 5, 5, 30.0);
        assert_eq!(single.frame_count(), 1);
        assert_eq!(single.frame_step(), 0.0);

        let reversed = ExportSequence::new("Reversed", 10, 0, 30.0);
        assert_eq!(reversed.frame_count(), 11);
        assert_eq!(reversed.frame_step(), -1.0);
    }

    #[test]
    fn keys_are_frame_major() {
        let armatures = vec![armature()];
        let mut sampler = Turntable::new();
        let sequences = vec![
            ExportSequence::new("First", 0, 10, 30.0),
            ExportSequence::new("Second", 0, 4, 30.0),
        ];

        let psa = build_psa(
            &armatures,
            &[0],
            &mut sampler,
            &sequences,
            &PsaBuildOptions::default(),
            &mut NoProgress,
        )
        .unwrap();

        assert_eq!(psa.bones.len(), 2);
        assert_eq!(psa.sequences[0].frame_count, 11);
        assert_eq!(psa.sequences[1].frame_start_index, 11);
        assert_eq!(psa.sequences[1].key_quotum, 10);
        assert_eq!(psa.keys.len(), (11 + 5) * 2);
        assert!(psa.validate().is_ok());

        // Frame 10 of the first sequence, child bone
        let key = psa.keys[10 * 2 + 1];
        let rotation: Quat = key.rotation.into();
        assert!(rotation.abs_diff_eq(Quat::from_rotation_z(FRAC_PI_2).conjugate(), 1e-5));
        assert!((key.time - 1.0 / 30.0).abs() < 1e-6);

        // Without root motion the root stays put
        assert_eq!(psa.keys[10 * 2].location.x, 0.0);

        assert_eq!(sampler.frame, 7.0);
        assert_eq!(sampler.source.as_deref(), Some("Original"));
    }

    #[test]
    fn root_motion() {
        let armatures = vec![armature()];
        let mut sampler = Turntable::new();
        let options = PsaBuildOptions {
            root_motion: true,
            ..Default::default()
        };
        let psa = build_psa(
            &armatures,
            &[0],
            &mut sampler,
            &[ExportSequence::new("Move", 0, 4, 30.0)],
            &options,
            &mut NoProgress,
        )
        .unwrap();
        assert_eq!(psa.keys[4 * 2].location.x, 4.0);
    }

    #[test]
    fn interpolated_frames_reuse_samples() {
        let armatures = vec![armature()];
        let mut sampler = Turntable::new();
        let mut sequence = ExportSequence::new("Half", 0, 10, 30.0);
        sequence.key_quota = 21;

        let psa = build_psa(
            &armatures,
            &[0],
            &mut sampler,
            &[sequence.clone()],
            &PsaBuildOptions::default(),
            &mut NoProgress,
        )
        .unwrap();

        assert_eq!(psa.sequences[0].frame_count, 21);
        assert_eq!(psa.sequences[0].fps, 21.0 / (11.0 / 30.0));
        // Every whole frame is only sampled once
        assert_eq!(sampler.samples.len(), 11);

        let halfway: Quat = psa.keys[2 + 1].rotation.into();
        assert!(halfway.abs_diff_eq(
            Quat::from_rotation_z(FRAC_PI_2 * 0.05).conjugate(),
            1e-5
        ));

        let mut sampler = Turntable::new();
        let options = PsaBuildOptions {
            sampling_mode: SamplingMode::Subframe,
            ..Default::default()
        };
        build_psa(
            &armatures,
            &[0],
            &mut sampler,
            &[sequence],
            &options,
            &mut NoProgress,
        )
        .unwrap();
        assert_eq!(sampler.samples.len(), 21);
        assert!(sampler.samples.contains(&0.5));
    }

    #[test]
    fn validation() {
        let armatures = vec![armature()];
        let mut sampler = Turntable::new();
        assert!(matches!(
            build_psa(
                &armatures,
                &[0],
                &mut sampler,
                &[],
                &PsaBuildOptions::default(),
                &mut NoProgress
            ),
            Err(Error::Validation(ValidationError::NoSequences))
        ));
        assert!(matches!(
            build_psa(
                &armatures,
                &[0],
                &mut sampler,
                &[ExportSequence::new("Bad", 0, 1, 0.0)],
                &PsaBuildOptions::default(),
                &mut NoProgress
            ),
            Err(Error::Validation(ValidationError::InvalidFrameRate(_)))
        ));
        assert!(matches!(
            build_psa(
                &[],
                &[],
                &mut sampler,
                &[ExportSequence::new("Empty", 0, 1, 30.0)],
                &PsaBuildOptions::default(),
                &mut NoProgress
            ),
            Err(Error::Validation(ValidationError::NoBones))
        ));
    }
}
