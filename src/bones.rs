// SPDX-FileCopyrightText: 2026 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::{BTreeMap, HashMap, HashSet};

use glam::{Mat4, Quat, Vec3};
use tracing::debug;

use crate::common::PsxBone;
use crate::error::{Result, RootBoneReport, ValidationError};
use crate::scene::{Armature, ArmatureParent};
use crate::transform::{decompose, without_scale, Axis, CoordinateSystem, ExportSpace};

/// A bone collection of one armature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CollectionRef {
    /// Bones that belong to no collection at all.
    Unassigned,
    Named(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CollectionSelection {
    pub armature: String,
    pub collection: CollectionRef,
}

/// Which bones to export.
#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BoneFilter {
    #[default]
    All,
    /// Only bones in these collections, plus their ancestors.
    Collections(Vec<CollectionSelection>),
}

impl BoneFilter {
    fn includes(&self, armature: &Armature, bone: usize) -> bool {
        let BoneFilter::Collections(selections) = self else {
            return true;
        };

        let Some(scene_bone) = armature.bones.get(bone) else {
            return false;
        };

        selections
            .iter()
            .filter(|selection| selection.armature == armature.name)
            .any(|selection| match &selection.collection {
                CollectionRef::Unassigned => scene_bone.collections.is_empty(),
                CollectionRef::Named(name) => scene_bone.collections.iter().any(|&c| {
                    armature
                        .collections
                        .get(c)
                        .is_some_and(|collection| collection == name)
                }),
            })
    }
}

/// Returns the indices of the bones of `armature` selected by `filter`, sorted by hierarchy order.
///
/// Every ancestor of a selected bone is selected too. Fails if the result has more than one root.
pub fn export_bone_indices(armature: &Armature, filter: &BoneFilter) -> Result<Vec<usize>> {
    // Maps a bone to the bone whose ancestor walk pulled it in
    let mut instigators: BTreeMap<usize, Option<usize>> = (0..armature.bones.len())
        .filter(|&bone| filter.includes(armature, bone))
        .map(|bone| (bone, None))
        .collect();

    let selected: Vec<usize> = instigators.keys().copied().collect();
    for bone in selected {
        for ancestor in armature.ancestors(bone) {
            if instigators.contains_key(&ancestor) {
                continue;
            }
            instigators.insert(ancestor, Some(bone));
        }
    }

    let roots: Vec<usize> = instigators
        .keys()
        .copied()
        .filter(|&bone| armature.bones[bone].parent.is_none())
        .collect();

    if roots.len() > 1 {
        let roots = roots
            .into_iter()
            .map(|root| {
                let mut included_by = root;
                let mut visited = HashSet::new();
                while let Some(Some(instigator)) = instigators.get(&included_by) {
                    if !visited.insert(included_by) {
                        break;
                    }
                    included_by = *instigator;
                }
                RootBoneReport {
                    root: armature.bones[root].name.clone(),
                    included_by: armature.bones[included_by].name.clone(),
                }
            })
            .collect();
        return Err(ValidationError::MultipleRootBones { roots }.into());
    }

    Ok(instigators.into_keys().collect())
}

/// Settings shared by the mesh and animation builders for producing bones.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoneOptions {
    pub export_space: ExportSpace,
    pub forward_axis: Axis,
    pub up_axis: Axis,
    /// Uniform scale applied to every location.
    pub scale: f32,
    /// Name of the bone created when there is no armature, or when several armatures need a common root.
    pub root_bone_name: String,
    pub bone_filter: BoneFilter,
}

impl Default for BoneOptions {
    fn default() -> Self {
        Self {
            export_space: ExportSpace::World,
            forward_axis: Axis::X,
            up_axis: Axis::Z,
            scale: 1.0,
            root_bone_name: "ROOT".to_string(),
            bone_filter: BoneFilter::All,
        }
    }
}

/// What an exported armature bone is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentLink {
    /// The root of the whole exported hierarchy.
    None,
    /// A bone of the same armature.
    Bone(usize),
    /// A bone of another exported armature.
    Armature { armature: usize, bone: usize },
    /// The synthesized root that joins several armatures.
    SyntheticRoot,
}

/// Where an exported bone came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoneSource {
    /// A dummy or synthesized root bone with no scene counterpart.
    Synthetic,
    Bone {
        armature: usize,
        bone: usize,
        parent: ParentLink,
    },
}

#[derive(Debug, Clone)]
pub struct PsxBoneCreateResult {
    pub bones: Vec<PsxBone>,
    /// One entry per bone in `bones`.
    pub sources: Vec<BoneSource>,
    /// The exported armatures in the order their bones were emitted.
    pub armatures: Vec<usize>,
    indices: HashMap<(usize, usize), usize>,
}

impl PsxBoneCreateResult {
    /// The exported index of `bone` of `armature`, if it was exported.
    pub fn bone_index(&self, armature: usize, bone: usize) -> Option<usize> {
        self.indices.get(&(armature, bone)).copied()
    }

    /// The exported index of an armature's root bone.
    pub fn armature_root_index(&self, armature: usize) -> Option<usize> {
        self.sources.iter().position(|source| {
            matches!(source, BoneSource::Bone { armature: a, parent, .. }
                if *a == armature && !matches!(parent, ParentLink::Bone(_)))
        })
    }

    /// The exported bones of `armature`, as indices into its bone list.
    pub fn armature_bones(&self, armature: usize) -> Vec<usize> {
        self.sources
            .iter()
            .filter_map(|source| match source {
                BoneSource::Bone {
                    armature: a, bone, ..
                } if *a == armature => Some(*bone),
                _ => None,
            })
            .collect()
    }

    /// Whether any bone came from an armature.
    pub fn has_armature_bones(&self) -> bool {
        self.sources
            .iter()
            .any(|source| matches!(source, BoneSource::Bone { .. }))
    }
}

/// Orders armatures so that parents come before their children, and rejects cycles.
fn sort_armatures(armatures: &[Armature], export: &[usize]) -> Result<Vec<usize>> {
    let in_set: HashSet<usize> = export.iter().copied().collect();

    let mut depths = Vec::with_capacity(export.len());
    for &index in export {
        let mut visited = HashSet::from([index]);
        let mut depth = 0;
        let mut current = index;
        while let Some(parent) = armatures[current]
            .parent
            .armature()
            .filter(|parent| in_set.contains(parent))
        {
            if !visited.insert(parent) {
                return Err(ValidationError::ArmatureCycle(armatures[index].name.clone()).into());
            }
            depth += 1;
            current = parent;
        }
        depths.push((depth, index));
    }

    // Stable, so siblings keep the order they were given in
    depths.sort_by_key(|(depth, _)| *depth);
    Ok(depths.into_iter().map(|(_, index)| index).collect())
}

fn check_unique_names(bones: &[PsxBone]) -> Result<()> {
    let mut counts: HashMap<String, (String, usize)> = HashMap::new();
    for bone in bones {
        let name = bone.name.to_string_lossy();
        counts
            .entry(name.to_uppercase())
            .or_insert_with(|| (name.clone(), 0))
            .1 += 1;
    }

    for bone in bones {
        let name = bone.name.to_string_lossy();
        if let Some((_, count)) = counts.get(&name.to_uppercase()) {
            if *count > 1 {
                return Err(ValidationError::DuplicateBoneName {
                    name,
                    count: *count,
                }
                .into());
            }
        }
    }

    Ok(())
}

fn root_bone(name: &str, system: &CoordinateSystem) -> Result<PsxBone> {
    let mut bone = PsxBone::new(name)?;
    bone.rotation = system.rotation().into();
    Ok(bone)
}

/// The world transform of an armature bone in its rest pose, with object scale removed.
pub(crate) fn rest_world_transform(armature: &Armature, matrix_local: &Mat4) -> (Quat, Vec3) {
    let (_, rotation, translation) = decompose(&(without_scale(&armature.world_matrix) * *matrix_local));
    (rotation, translation)
}

/// The transform of `child` relative to `parent`, both given as world rotation and translation.
pub(crate) fn relative_transform(parent: (Quat, Vec3), child: (Quat, Vec3)) -> (Quat, Vec3) {
    let inverse = parent.0.inverse();
    (inverse * child.0, inverse * (child.1 - parent.1))
}

/// Converts the bones of `export` (indices into `armatures`) into a single PSX bone hierarchy.
///
/// With no armatures, or no bones after filtering, a single root bone named [`BoneOptions::root_bone_name`] is
/// produced. When more than one armature has no exported parent, the same bone is added as a common root.
pub fn create_psx_bones(
    armatures: &[Armature],
    export: &[usize],
    options: &BoneOptions,
) -> Result<PsxBoneCreateResult> {
    let system = CoordinateSystem::new(options.forward_axis, options.up_axis)?;

    let mut unique_export = Vec::new();
    for &index in export {
        if index >= armatures.len() {
            return Err(ValidationError::UnknownArmature {
                object: String::new(),
                armature: index,
            }
            .into());
        }
        if !unique_export.contains(&index) {
            unique_export.push(index);
        }
    }

    if unique_export.len() > 1 && options.export_space != ExportSpace::World {
        return Err(ValidationError::MultipleArmaturesRequireWorldSpace(
            unique_export
                .iter()
                .map(|&i| armatures[i].name.clone())
                .collect(),
        )
        .into());
    }

    let order = sort_armatures(armatures, &unique_export)?;

    let mut selected = Vec::with_capacity(order.len());
    for &index in &order {
        let armature = &armatures[index];
        armature.validate()?;
        selected.push((index, export_bone_indices(armature, &options.bone_filter)?));
    }

    let mut result = PsxBoneCreateResult {
        bones: Vec::new(),
        sources: Vec::new(),
        armatures: order.clone(),
        indices: HashMap::new(),
    };

    if selected.iter().all(|(_, bones)| bones.is_empty()) {
        debug!("No armature bones to export, using a dummy root bone");
        result.bones.push(root_bone(&options.root_bone_name, &system)?);
        result.sources.push(BoneSource::Synthetic);
        result.armatures.clear();
        return Ok(result);
    }

    let in_set: HashSet<usize> = order.iter().copied().collect();
    let unparented = order
        .iter()
        .filter(|&&index| {
            !armatures[index]
                .parent
                .armature()
                .is_some_and(|parent| in_set.contains(&parent))
        })
        .count();

    let synthetic_root = unparented > 1;
    if synthetic_root {
        debug!(unparented, "Adding a common root bone for multiple armatures");
        result.bones.push(root_bone(&options.root_bone_name, &system)?);
        result.sources.push(BoneSource::Synthetic);
    }

    for (armature_index, bone_indices) in &selected {
        let armature_index = *armature_index;
        let armature = &armatures[armature_index];
        let (armature_scale, _, _) = decompose(&armature.world_matrix);

        for &bone_index in bone_indices {
            let scene_bone = &armature.bones[bone_index];
            let mut psx_bone = PsxBone::new(&scene_bone.name)?;

            let (parent_link, parent_index, rotation, location) = match scene_bone.parent {
                Some(parent) => {
                    let parent_bone = &armature.bones[parent];
                    let parent_inverse = parent_bone.rotation().inverse();
                    let rotation = (parent_inverse * scene_bone.rotation()).conjugate();
                    let location = parent_inverse * (scene_bone.head() - parent_bone.head());
                    let parent_index = result.bone_index(armature_index, parent);
                    (
                        ParentLink::Bone(parent),
                        parent_index,
                        rotation,
                        location * options.scale * armature_scale,
                    )
                }
                None => {
                    let parent_link =
                        armature_parent_link(armatures, armature, &in_set, &result, synthetic_root);
                    match parent_link {
                        ParentLink::Armature {
                            armature: parent_armature,
                            bone: parent_bone,
                        } => {
                            let parent = rest_world_transform(
                                &armatures[parent_armature],
                                &armatures[parent_armature].bones[parent_bone].matrix_local,
                            );
                            let child = rest_world_transform(armature, &scene_bone.matrix_local);
                            let (rotation, location) = relative_transform(parent, child);
                            (
                                parent_link,
                                result.bone_index(parent_armature, parent_bone),
                                rotation.conjugate(),
                                location * options.scale * armature_scale,
                            )
                        }
                        ParentLink::SyntheticRoot => {
                            let (_, world_rotation, _) = decompose(&armature.world_matrix);
                            let rotation = (world_rotation * scene_bone.rotation()).conjugate();
                            let location = armature.world_matrix.transform_point3(scene_bone.head());
                            (parent_link, Some(0), rotation, location * options.scale)
                        }
                        _ => {
                            let (rotation, location) = root_rest_transform(
                                armature,
                                scene_bone.matrix_local,
                                options.export_space,
                                &system,
                            );
                            let location = if options.export_space == ExportSpace::World {
                                location * options.scale
                            } else {
                                location * options.scale * armature_scale
                            };
                            (ParentLink::None, None, rotation, location)
                        }
                    }
                }
            };

            psx_bone.rotation = rotation.normalize().into();
            psx_bone.location = location.into();
            if let Some(parent_index) = parent_index {
                psx_bone.parent_index = parent_index as i32;
                result.bones[parent_index].children_count += 1;
            }

            result
                .indices
                .insert((armature_index, bone_index), result.bones.len());
            result.bones.push(psx_bone);
            result.sources.push(BoneSource::Bone {
                armature: armature_index,
                bone: bone_index,
                parent: parent_link,
            });
        }
    }

    check_unique_names(&result.bones)?;

    debug!(
        bones = result.bones.len(),
        armatures = result.armatures.len(),
        "Created PSX bones"
    );

    Ok(result)
}

/// Resolves what the root bone of `armature` hangs off in the exported hierarchy.
fn armature_parent_link(
    armatures: &[Armature],
    armature: &Armature,
    in_set: &HashSet<usize>,
    result: &PsxBoneCreateResult,
    synthetic_root: bool,
) -> ParentLink {
    let parent_armature = armature
        .parent
        .armature()
        .filter(|parent| in_set.contains(parent));

    if let Some(parent_armature) = parent_armature {
        let bone = match armature.parent {
            ArmatureParent::Bone { bone, .. } => std::iter::once(bone)
                .chain(armatures[parent_armature].ancestors(bone))
                .find(|&bone| result.bone_index(parent_armature, bone).is_some()),
            _ => None,
        };

        let bone = bone.or_else(|| {
            result
                .armature_root_index(parent_armature)
                .and_then(|index| match result.sources[index] {
                    BoneSource::Bone { bone, .. } => Some(bone),
                    BoneSource::Synthetic => None,
                })
        });

        if let Some(bone) = bone {
            return ParentLink::Armature {
                armature: parent_armature,
                bone,
            };
        }
    }

    if synthetic_root {
        ParentLink::SyntheticRoot
    } else {
        ParentLink::None
    }
}

/// The rotation and location of the hierarchy's root bone for a rest or pose matrix, before any scaling.
pub(crate) fn root_rest_transform(
    armature: &Armature,
    matrix: Mat4,
    export_space: ExportSpace,
    system: &CoordinateSystem,
) -> (Quat, Vec3) {
    let armature_local = match export_space {
        ExportSpace::World => armature.world_matrix,
        ExportSpace::Armature => Mat4::IDENTITY,
        ExportSpace::Root => match armature.bones.first() {
            Some(root) => root.matrix_local.inverse(),
            None => Mat4::IDENTITY,
        },
    };

    let (_, armature_rotation, _) = decompose(&armature_local);
    let (_, bone_rotation, head) = decompose(&matrix);

    let rotation = system.rotation() * (armature_rotation * bone_rotation);
    let location = system.transform_vector(armature_local.transform_point3(head));
    (rotation, location)
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use glam::{Quat, Vec3};

    use super::*;
    use crate::error::Error;

    fn chain() -> Armature {
        let mut armature = Armature::new("Armature");
        let root = armature.add_bone("Root", None, Mat4::IDENTITY);
        let spine = armature.add_bone(
            "Spine",
            Some(root),
            Mat4::from_translation(Vec3::new(0.0, 0.0, 1.0)),
        );
        armature.add_bone(
            "Head",
            Some(spine),
            Mat4::from_rotation_translation(
                Quat::from_rotation_x(FRAC_PI_2),
                Vec3::new(0.0, 0.0, 2.0),
            ),
        );
        armature
    }

    fn collection(armature: &str, name: &str) -> CollectionSelection {
        CollectionSelection {
            armature: armature.to_string(),
            collection: CollectionRef::Named(name.to_string()),
        }
    }

    #[test]
    fn single_armature() {
        let armatures = vec![chain()];
        let result = create_psx_bones(&armatures, &[0], &BoneOptions::default()).unwrap();

        assert_eq!(result.bones.len(), 3);
        assert_eq!(result.bones[0].parent_index, -1);
        assert_eq!(result.bones[0].children_count, 1);
        assert_eq!(result.bones[1].parent_index, 0);
        assert_eq!(result.bones[2].parent_index, 1);
        assert_eq!(result.bones[2].location.z, 1.0);

        // Child rotations are stored conjugated
        let head: Quat = result.bones[2].rotation.into();
        assert!(head.abs_diff_eq(Quat::from_rotation_x(FRAC_PI_2).conjugate(), 1e-6));
        assert_eq!(result.armature_root_index(0), Some(0));
        assert_eq!(result.bone_index(0, 2), Some(2));
    }

    #[test]
    fn no_armature_gives_dummy_root() {
        let options = BoneOptions {
            forward_axis: Axis::Y,
            ..Default::default()
        };
        let result = create_psx_bones(&[], &[], &options).unwrap();
        assert_eq!(result.bones.len(), 1);
        assert_eq!(result.bones[0].name.to_string_lossy(), "ROOT");
        assert!(!result.has_armature_bones());

        let rotation: Quat = result.bones[0].rotation.into();
        let expected = CoordinateSystem::new(Axis::Y, Axis::Z).unwrap().rotation();
        assert!(rotation.abs_diff_eq(expected, 1e-6));
    }

    #[test]
    fn filter_adds_ancestors() {
        let mut armature = chain();
        armature.collections = vec!["Face".to_string()];
        armature.bones[2].collections = vec![0];

        let filter = BoneFilter::Collections(vec![collection("Armature", "Face")]);
        assert_eq!(export_bone_indices(&armature, &filter).unwrap(), vec![0, 1, 2]);

        let unassigned = BoneFilter::Collections(vec![CollectionSelection {
            armature: "Armature".to_string(),
            collection: CollectionRef::Unassigned,
        }]);
        assert_eq!(export_bone_indices(&armature, &unassigned).unwrap(), vec![0, 1]);

        // Selections for another armature don't apply
        let other = BoneFilter::Collections(vec![collection("Other", "Face")]);
        assert!(export_bone_indices(&armature, &other).unwrap().is_empty());
    }

    #[test]
    fn multiple_roots_are_reported() {
        let mut armature = Armature::new("Armature");
        let hips = armature.add_bone("Hips", None, Mat4::IDENTITY);
        armature.add_bone("Leg", Some(hips), Mat4::IDENTITY);
        let prop = armature.add_bone("PropRoot", None, Mat4::IDENTITY);
        armature.add_bone("Prop", Some(prop), Mat4::IDENTITY);
        armature.collections = vec!["Export".to_string()];
        armature.bones[1].collections = vec![0];
        armature.bones[3].collections = vec![0];

        let filter = BoneFilter::Collections(vec![collection("Armature", "Export")]);
        let Err(Error::Validation(ValidationError::MultipleRootBones { roots })) =
            export_bone_indices(&armature, &filter)
        else {
            panic!("expected a root bone error");
        };

        assert_eq!(
            roots,
            vec![
                RootBoneReport {
                    root: "Hips".to_string(),
                    included_by: "Leg".to_string()
                },
                RootBoneReport {
                    root: "PropRoot".to_string(),
                    included_by: "Prop".to_string()
                },
            ]
        );
    }

    #[test]
    fn duplicate_names() {
        let mut armature = chain();
        armature.bones[2].name = "SPINE".to_string();
        assert!(matches!(
            create_psx_bones(&[armature], &[0], &BoneOptions::default()),
            Err(Error::Validation(ValidationError::DuplicateBoneName { count: 2, .. }))
        ));
    }

    #[test]
    fn unencodable_bone_name() {
        let mut armature = chain();
        armature.bones[1].name = "背骨".to_string();
        let Err(Error::Validation(ValidationError::UnencodableName(name))) =
            create_psx_bones(&[armature], &[0], &BoneOptions::default())
        else {
            panic!("expected an encoding error");
        };
        assert_eq!(name, "背骨");
    }

    #[test]
    fn multiple_armatures() {
        let mut first = chain();
        first.name = "First".to_string();
        let mut second = Armature::new("Second");
        second.world_matrix = Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0));
        second.add_bone("Prop", None, Mat4::IDENTITY);

        let armatures = vec![first, second];

        let options = BoneOptions {
            export_space: ExportSpace::Armature,
            ..Default::default()
        };
        assert!(matches!(
            create_psx_bones(&armatures, &[0, 1], &options),
            Err(Error::Validation(
                ValidationError::MultipleArmaturesRequireWorldSpace(_)
            ))
        ));

        let result = create_psx_bones(&armatures, &[0, 1], &BoneOptions::default()).unwrap();
        assert_eq!(result.bones.len(), 5);
        assert_eq!(result.sources[0], BoneSource::Synthetic);
        assert_eq!(result.bones[0].children_count, 2);
        assert_eq!(result.bones[1].parent_index, 0);
        assert_eq!(result.bones[4].parent_index, 0);
        assert_eq!(result.bones[4].location.x, 5.0);
    }

    #[test]
    fn parented_armature() {
        let mut body = chain();
        body.name = "Body".to_string();
        let mut weapon = Armature::new("Weapon");
        weapon.world_matrix = Mat4::from_translation(Vec3::new(0.0, 1.0, 3.0));
        weapon.parent = ArmatureParent::Bone {
            armature: 0,
            bone: 1,
        };
        weapon.add_bone("Blade", None, Mat4::IDENTITY);

        let armatures = vec![body, weapon];

        // The child armature is listed first but still emitted after its parent
        let result = create_psx_bones(&armatures, &[1, 0], &BoneOptions::default()).unwrap();
        assert_eq!(result.armatures, vec![0, 1]);
        assert_eq!(result.bones.len(), 4);
        assert_eq!(result.bones[3].parent_index, 1);
        assert_eq!(result.bones[1].children_count, 2);
        let location: Vec3 = result.bones[3].location.into();
        assert!(location.abs_diff_eq(Vec3::new(0.0, 1.0, 2.0), 1e-6));
    }

    #[test]
    fn armature_cycle() {
        let mut a = Armature::new("A");
        a.add_bone("A_Root", None, Mat4::IDENTITY);
        a.parent = ArmatureParent::Armature(1);
        let mut b = Armature::new("B");
        b.add_bone("B_Root", None, Mat4::IDENTITY);
        b.parent = ArmatureParent::Armature(0);

        assert!(matches!(
            create_psx_bones(&[a, b], &[0, 1], &BoneOptions::default()),
            Err(Error::Validation(ValidationError::ArmatureCycle(_)))
        ));
    }

    #[test]
    fn scaled_armature() {
        let mut armature = chain();
        armature.world_matrix = Mat4::from_scale(Vec3::splat(2.0));
        let options = BoneOptions {
            scale: 0.5,
            ..Default::default()
        };
        let result = create_psx_bones(&[armature], &[0], &options).unwrap();
        // Doubled by the armature, halved by the export scale
        assert!((result.bones[2].location.z - 1.0).abs() < 1e-6);
        assert!((result.bones[1].location.z - 1.0).abs() < 1e-6);
    }

    #[test]
    fn root_export_space() {
        let mut armature = chain();
        armature.world_matrix = Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0));
        armature.bones[0].matrix_local = Mat4::from_rotation_translation(
            Quat::from_rotation_z(FRAC_PI_2),
            Vec3::new(1.0, 2.0, 3.0),
        );
        let options = BoneOptions {
            export_space: ExportSpace::Root,
            ..Default::default()
        };
        let result = create_psx_bones(&[armature], &[0], &options).unwrap();

        // The root bone becomes the origin of the exported skeleton
        let root: Quat = result.bones[0].rotation.into();
        let location: Vec3 = result.bones[0].location.into();
        assert!(root.abs_diff_eq(Quat::IDENTITY, 1e-6));
        assert!(location.abs_diff_eq(Vec3::ZERO, 1e-5));
    }
}
