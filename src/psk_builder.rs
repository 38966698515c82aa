// SPDX-FileCopyrightText: 2026 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::{HashMap, HashSet};

use glam::{Mat3, Mat4, Vec2, Vec3};
use tracing::{debug, info, warn};

use crate::bones::{create_psx_bones, BoneOptions, PsxBoneCreateResult};
use crate::common::{Color, FixedName, Vector2, Vector3};
use crate::common_file_operations::rgb_to_srgb;
use crate::error::{Limit, Result, ValidationError, Warning};
use crate::psk::{encode_poly_flags, Face, Material, MorphData, MorphInfo, Psk, Wedge, Weight};
use crate::scene::{Armature, MeshInstance, MeshObject, Progress, SceneMaterial};
use crate::transform::{export_space_matrix, is_mirrored, CoordinateSystem};

/// How the global material list is ordered.
#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MaterialOrder {
    /// In order of first appearance across the meshes.
    #[default]
    Automatic,
    /// These names first, in this order. Materials that aren't listed follow in order of appearance.
    Manual(Vec<String>),
}

/// The color space vertex colors are written in, or were read in.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VertexColorSpace {
    Linear,
    #[default]
    Srgba,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PskBuildOptions {
    pub bones: BoneOptions,
    pub material_order: MaterialOrder,
    pub export_vertex_colors: bool,
    pub vertex_color_space: VertexColorSpace,
    pub export_vertex_normals: bool,
    /// Writes every UV map besides the active one as an extra channel.
    pub export_extra_uvs: bool,
    pub export_shape_keys: bool,
}

impl Default for PskBuildOptions {
    fn default() -> Self {
        Self {
            bones: BoneOptions::default(),
            material_order: MaterialOrder::Automatic,
            export_vertex_colors: false,
            vertex_color_space: VertexColorSpace::Srgba,
            export_vertex_normals: false,
            export_extra_uvs: false,
            export_shape_keys: false,
        }
    }
}

#[derive(Debug)]
pub struct PskBuildResult {
    pub psk: Psk,
    pub warnings: Vec<Warning>,
}

/// The name of the material written when no mesh has any.
const PLACEHOLDER_MATERIAL: &str = "None";

/// Identifies a wedge. Floats are compared by their bits.
#[derive(Debug, PartialEq, Eq, Hash)]
struct WedgeKey {
    point_index: u32,
    u: u32,
    v: u32,
    material_index: u8,
    /// Extra UVs and the vertex color, when those are exported.
    extras: Vec<u32>,
}

/// Maps every slot of every mesh onto the global material list.
struct MaterialTable {
    materials: Vec<SceneMaterial>,
    /// Per mesh instance, per slot.
    slot_indices: Vec<Vec<u8>>,
}

fn placeholder_slots() -> Vec<Option<SceneMaterial>> {
    vec![Some(SceneMaterial::new(PLACEHOLDER_MATERIAL))]
}

fn build_material_table(meshes: &[MeshInstance], order: &MaterialOrder) -> Result<MaterialTable> {
    let mut materials: Vec<SceneMaterial> = Vec::new();

    if let MaterialOrder::Manual(names) = order {
        for name in names {
            if !materials.iter().any(|m| &m.name == name) {
                materials.push(SceneMaterial::new(name));
            }
        }
    }

    let placeholder = placeholder_slots();
    let mut slot_indices = Vec::with_capacity(meshes.len());
    for instance in meshes {
        let mesh = instance.mesh;
        let slots = if mesh.material_slots.is_empty() {
            &placeholder
        } else {
            &mesh.material_slots
        };

        let mut indices = Vec::with_capacity(slots.len());
        for (slot, material) in slots.iter().enumerate() {
            let Some(material) = material else {
                return Err(ValidationError::EmptyMaterialSlot {
                    object: mesh.name.clone(),
                    slot,
                }
                .into());
            };

            let index = match materials.iter().position(|m| m.name == material.name) {
                Some(index) => {
                    // Manual entries only know their name, take the rest from the first slot that uses it
                    if materials[index] == SceneMaterial::new(&material.name) {
                        materials[index] = material.clone();
                    }
                    index
                }
                None => {
                    materials.push(material.clone());
                    materials.len() - 1
                }
            };

            let index = u8::try_from(index).map_err(|_| ValidationError::LimitExceeded {
                limit: Limit::Materials,
                count: index + 1,
                max: u8::MAX as u64 + 1,
            })?;
            indices.push(index);
        }
        slot_indices.push(indices);
    }

    if materials.is_empty() {
        materials.push(SceneMaterial::new(PLACEHOLDER_MATERIAL));
    }

    Ok(MaterialTable {
        materials,
        slot_indices,
    })
}

struct UnionFind {
    parents: Vec<usize>,
}

impl UnionFind {
    fn new(count: usize) -> Self {
        Self {
            parents: (0..count).collect(),
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parents[i] != i {
            self.parents[i] = self.parents[self.parents[i]];
            i = self.parents[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let a = self.find(a);
        let b = self.find(b);
        if a != b {
            self.parents[b] = a;
        }
    }
}

fn edge_key(a: usize, b: usize) -> (usize, usize) {
    (a.min(b), a.max(b))
}

/// Computes a smoothing group bitmask for every polygon.
///
/// Smooth polygons that share an edge which isn't marked sharp end up in the same group. Groups that touch
/// get different bits where possible, so the importer can tell them apart.
pub fn smoothing_groups(mesh: &MeshObject) -> Vec<i32> {
    let polygon_count = mesh.polygons.len();
    let sharp: HashSet<(usize, usize)> = mesh
        .sharp_edges
        .iter()
        .map(|&[a, b]| edge_key(a, b))
        .collect();

    let vertex = |l: usize| mesh.loops[l].vertex;

    let mut edge_polygons: HashMap<(usize, usize), Vec<usize>> = HashMap::new();
    for (index, polygon) in mesh.polygons.iter().enumerate() {
        let loops = polygon.loops();
        for l in loops.clone() {
            let next = if l + 1 == loops.end { loops.start } else { l + 1 };
            edge_polygons
                .entry(edge_key(vertex(l), vertex(next)))
                .or_default()
                .push(index);
        }
    }

    let mut components = UnionFind::new(polygon_count);
    for (edge, polygons) in &edge_polygons {
        if sharp.contains(edge) {
            continue;
        }
        let mut smooth = polygons.iter().filter(|&&p| mesh.polygons[p].smooth);
        if let Some(&first) = smooth.next() {
            for &other in smooth {
                components.union(first, other);
            }
        }
    }

    let component_of: Vec<usize> = (0..polygon_count).map(|p| components.find(p)).collect();

    // Groups are neighbors if they share a vertex
    let mut vertex_components: HashMap<usize, HashSet<usize>> = HashMap::new();
    for (index, polygon) in mesh.polygons.iter().enumerate() {
        for l in polygon.loops() {
            vertex_components
                .entry(vertex(l))
                .or_default()
                .insert(component_of[index]);
        }
    }

    let mut neighbors: HashMap<usize, HashSet<usize>> = HashMap::new();
    for shared in vertex_components.values() {
        for &a in shared {
            for &b in shared {
                if a != b {
                    neighbors.entry(a).or_default().insert(b);
                }
            }
        }
    }

    let mut bits: HashMap<usize, u32> = HashMap::new();
    for &component in &component_of {
        if bits.contains_key(&component) {
            continue;
        }
        let used: u32 = neighbors
            .get(&component)
            .into_iter()
            .flatten()
            .filter_map(|neighbor| bits.get(neighbor))
            .fold(0, |used, &bit| used | (1 << bit));
        let bit = (0..32)
            .find(|bit| used & (1 << bit) == 0)
            .unwrap_or((bits.len() % 32) as u32);
        bits.insert(component, bit);
    }

    component_of
        .iter()
        .map(|component| (1u32 << bits.get(component).copied().unwrap_or(0)) as i32)
        .collect()
}

/// Picks the color layer to export, warning when the choice is ambiguous.
fn color_layer<'a>(mesh: &'a MeshObject, warnings: &mut Vec<Warning>) -> Option<&'a [glam::Vec4]> {
    if let Some(layer) = mesh.active_color_layer.and_then(|i| mesh.color_layers.get(i)) {
        return Some(&layer.colors);
    }

    match mesh.color_layers.len() {
        0 => None,
        1 => Some(&mesh.color_layers[0].colors),
        _ => {
            let warning = Warning::AmbiguousVertexColors {
                object: mesh.name.clone(),
            };
            warn!("{warning}");
            warnings.push(warning);
            None
        }
    }
}

fn convert_color(color: glam::Vec4, space: VertexColorSpace) -> Color {
    let rgb = match space {
        VertexColorSpace::Linear => [color.x, color.y, color.z],
        VertexColorSpace::Srgba => [
            rgb_to_srgb(color.x),
            rgb_to_srgb(color.y),
            rgb_to_srgb(color.z),
        ],
    };
    Color::from_normalized([rgb[0], rgb[1], rgb[2], color.w])
}

/// Finds the exported bone a vertex group should weight to: the bone of the same name, or its closest exported ancestor.
fn vertex_group_bone(
    armature_index: usize,
    armature: &Armature,
    bones: &PsxBoneCreateResult,
    group: &str,
) -> Option<usize> {
    let bone = armature.bone_index(group)?;
    std::iter::once(bone)
        .chain(armature.ancestors(bone))
        .find_map(|bone| bones.bone_index(armature_index, bone))
}

/// Flattens mesh instances into a single PSK.
///
/// Every armature deforming one of the meshes contributes its bones. Meshes without an armature are weighted
/// entirely to the root bone.
pub fn build_psk(
    armatures: &[Armature],
    meshes: &[MeshInstance],
    options: &PskBuildOptions,
    progress: &mut dyn Progress,
) -> Result<PskBuildResult> {
    if meshes.is_empty() {
        return Err(ValidationError::NoMeshes.into());
    }

    let mut export_armatures = Vec::new();
    for instance in meshes {
        let mesh = instance.mesh;
        mesh.validate()?;
        if let Some(armature) = mesh.armature {
            if armature >= armatures.len() {
                return Err(ValidationError::UnknownArmature {
                    object: mesh.name.clone(),
                    armature,
                }
                .into());
            }
            if !export_armatures.contains(&armature) {
                export_armatures.push(armature);
            }
        }
    }

    let system = CoordinateSystem::new(options.bones.forward_axis, options.bones.up_axis)?;
    let bones = create_psx_bones(armatures, &export_armatures, &options.bones)?;
    let materials = build_material_table(meshes, &options.material_order)?;

    let mut warnings = Vec::new();
    let mut psk = Psk {
        bones: bones.bones.clone(),
        ..Default::default()
    };

    for material in &materials.materials {
        let mut psk_material = Material::new(&material.name)?;
        psk_material.texture_index = psk.materials.len() as i32;
        psk_material.poly_flags = encode_poly_flags(material.triangle_type, material.flags);
        psk.materials.push(psk_material);
    }

    let extra_uv_channels = if options.export_extra_uvs {
        meshes
            .iter()
            .map(|instance| instance.mesh.uv_layers.len().saturating_sub(1))
            .max()
            .unwrap_or(0)
    } else {
        0
    };
    psk.extra_uvs = vec![Vec::new(); extra_uv_channels];

    let mut wedge_indices: HashMap<WedgeKey, u32> = HashMap::new();
    let mut normal_sums: Vec<Vec3> = Vec::new();

    progress.begin(meshes.len());

    for (mesh_index, instance) in meshes.iter().enumerate() {
        let mesh = instance.mesh;
        let armature = mesh.armature.map(|index| (index, &armatures[index]));

        let point_transform = Mat4::from_scale(Vec3::splat(options.bones.scale))
            * system.matrix()
            * export_space_matrix(armature.map(|(_, a)| a), options.bones.export_space)
            * instance.world_matrix;
        let normal_transform = Mat3::from_mat4(point_transform).inverse().transpose();

        let vertex_offset = psk.points.len();
        psk.points.extend(
            mesh.vertices
                .iter()
                .map(|&v| Vector3::from(point_transform.transform_point3(v))),
        );

        // UVs
        let uv_layer = mesh.active_uv_layer.and_then(|i| mesh.uv_layers.get(i));
        if uv_layer.is_none() {
            let warning = Warning::MissingUvLayer {
                object: mesh.name.clone(),
            };
            warn!("{warning}");
            warnings.push(warning);
        }

        let extra_layers: Vec<&[Vec2]> = mesh
            .uv_layers
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != mesh.active_uv_layer)
            .map(|(_, layer)| layer.uvs.as_slice())
            .take(extra_uv_channels)
            .collect();

        let colors = if options.export_vertex_colors {
            Some(color_layer(mesh, &mut warnings))
        } else {
            None
        };

        // Material of each loop
        let slot_indices = &materials.slot_indices[mesh_index];
        let polygon_material = |polygon: usize| -> u8 {
            mesh.polygons
                .get(polygon)
                .and_then(|p| slot_indices.get(p.material_slot))
                .copied()
                .unwrap_or(0)
        };
        let mut loop_materials = vec![0u8; mesh.loops.len()];
        for (index, polygon) in mesh.polygons.iter().enumerate() {
            for l in polygon.loops() {
                loop_materials[l] = polygon_material(index);
            }
        }

        // Wedges
        let mut loop_wedges = Vec::with_capacity(mesh.loops.len());
        for (l, mesh_loop) in mesh.loops.iter().enumerate() {
            let point_index = (vertex_offset + mesh_loop.vertex) as u32;
            let (u, v) = uv_layer
                .map(|layer| (layer.uvs[l].x, 1.0 - layer.uvs[l].y))
                .unwrap_or((0.0, 0.0));

            let extra_uvs: Vec<Vector2> = (0..extra_uv_channels)
                .map(|channel| {
                    let uv = extra_layers
                        .get(channel)
                        .map(|layer| layer[l])
                        .unwrap_or(Vec2::ZERO);
                    Vector2 {
                        x: uv.x,
                        y: 1.0 - uv.y,
                    }
                })
                .collect();
            let color = colors.map(|layer| match layer {
                Some(layer) => convert_color(layer[l], options.vertex_color_space),
                None => Color::WHITE,
            });

            let mut extras: Vec<u32> = extra_uvs
                .iter()
                .flat_map(|uv| [uv.x.to_bits(), uv.y.to_bits()])
                .collect();
            if let Some(color) = color {
                extras.push(u32::from_le_bytes([color.r, color.g, color.b, color.a]));
            }

            let key = WedgeKey {
                point_index,
                u: u.to_bits(),
                v: v.to_bits(),
                material_index: loop_materials[l],
                extras,
            };

            let wedge_index = *wedge_indices.entry(key).or_insert_with(|| {
                psk.wedges.push(Wedge {
                    point_index,
                    u,
                    v,
                    material_index: loop_materials[l],
                });
                for (channel, uv) in psk.extra_uvs.iter_mut().zip(&extra_uvs) {
                    channel.push(*uv);
                }
                if let Some(color) = color {
                    psk.vertex_colors.push(color);
                }
                (psk.wedges.len() - 1) as u32
            });
            loop_wedges.push(wedge_index);
        }

        // Faces
        let groups = smoothing_groups(mesh);
        let mirrored = is_mirrored(&instance.world_matrix);
        for triangle in &mesh.triangles {
            let [l0, l1, l2] = triangle.loops;
            let mut face_wedges = [loop_wedges[l2], loop_wedges[l1], loop_wedges[l0]];
            if mirrored {
                face_wedges.swap(0, 2);
            }
            psk.faces.push(Face {
                wedge_indices: face_wedges,
                material_index: polygon_material(triangle.polygon),
                aux_material_index: 0,
                smoothing_groups: groups[triangle.polygon],
            });
        }

        // Normals
        if options.export_vertex_normals {
            normal_sums.resize(psk.points.len(), Vec3::ZERO);
            for mesh_loop in &mesh.loops {
                normal_sums[vertex_offset + mesh_loop.vertex] += normal_transform * mesh_loop.normal;
            }
        }

        // Weights
        let root_index = armature
            .and_then(|(index, _)| bones.armature_root_index(index))
            .unwrap_or(0);
        let mut weighted = vec![false; mesh.vertices.len()];
        if let Some((armature_index, armature)) = armature.filter(|_| bones.has_armature_bones()) {
            for group in &mesh.vertex_groups {
                let Some(bone_index) = vertex_group_bone(armature_index, armature, &bones, &group.name)
                else {
                    let warning = Warning::UnmappedVertexGroup {
                        object: mesh.name.clone(),
                        group: group.name.clone(),
                    };
                    warn!("{warning}");
                    warnings.push(warning);
                    continue;
                };

                for &(vertex, weight) in &group.weights {
                    if weight == 0.0 {
                        continue;
                    }
                    weighted[vertex] = true;
                    psk.weights.push(Weight {
                        weight,
                        point_index: (vertex_offset + vertex) as i32,
                        bone_index: bone_index as i32,
                    });
                }
            }
        }

        let unweighted = weighted.iter().filter(|w| !**w).count();
        if unweighted > 0 {
            debug!(object = %mesh.name, unweighted, "Weighting vertices to the root bone");
        }
        for (vertex, _) in weighted.iter().enumerate().filter(|(_, w)| !**w) {
            psk.weights.push(Weight {
                weight: 1.0,
                point_index: (vertex_offset + vertex) as i32,
                bone_index: root_index as i32,
            });
        }

        // Shape keys
        if options.export_shape_keys {
            let delta_transform = Mat3::from_mat4(point_transform);
            for shape_key in &mesh.shape_keys {
                let mut vertex_count = 0;
                for (vertex, (&basis, &position)) in
                    mesh.vertices.iter().zip(&shape_key.positions).enumerate()
                {
                    let delta = position - basis;
                    if delta == Vec3::ZERO {
                        continue;
                    }
                    let mut delta = delta_transform * delta;
                    delta.y = -delta.y;
                    psk.morph_data.push(MorphData {
                        position_delta: delta.into(),
                        tangent_z_delta: Vec3::ZERO.into(),
                        point_index: (vertex_offset + vertex) as i32,
                    });
                    vertex_count += 1;
                }

                psk.morph_infos.push(MorphInfo {
                    name: FixedName::new(&shape_key.name)?,
                    vertex_count,
                });
            }
        }

        progress.update(mesh_index + 1);
    }

    if options.export_vertex_normals {
        psk.vertex_normals = normal_sums
            .into_iter()
            .map(|n| n.normalize_or_zero().into())
            .collect();
    }

    psk.sort_and_normalize_weights();

    progress.end();

    info!(
        points = psk.points.len(),
        wedges = psk.wedges.len(),
        faces = psk.faces.len(),
        materials = psk.materials.len(),
        bones = psk.bones.len(),
        "Built PSK"
    );

    Ok(PskBuildResult { psk, warnings })
}

#[cfg(test)]
mod tests {
    use glam::Vec4;

    use super::*;
    use crate::error::Error;
    use crate::scene::{ColorLayer, NoProgress, UvLayer, VertexGroup};

    fn quad() -> MeshObject {
        let mut mesh = MeshObject::new("Quad");
        mesh.vertices = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        mesh.add_polygon(&[0, 1, 2], 0);
        mesh.add_polygon(&[0, 2, 3], 0);
        mesh.uv_layers.push(UvLayer {
            name: "UVMap".to_string(),
            uvs: vec![
                Vec2::new(0.0, 0.0),
                Vec2::new(1.0, 0.0),
                Vec2::new(1.0, 1.0),
                Vec2::new(0.0, 0.0),
                Vec2::new(1.0, 1.0),
                Vec2::new(0.0, 1.0),
            ],
        });
        mesh.active_uv_layer = Some(0);
        mesh.material_slots = vec![Some(SceneMaterial::new("Skin"))];
        mesh
    }

    fn build(meshes: &[MeshObject], options: &PskBuildOptions) -> Result<PskBuildResult> {
        let instances: Vec<MeshInstance> = meshes.iter().map(MeshInstance::from).collect();
        build_psk(&[], &instances, options, &mut NoProgress)
    }

    #[test]
    fn shared_corners_share_wedges() {
        let result = build(&[quad()], &PskBuildOptions::default()).unwrap();
        let psk = result.psk;

        assert_eq!(psk.points.len(), 4);
        assert_eq!(psk.wedges.len(), 4);
        assert_eq!(psk.faces.len(), 2);
        // Winding is reversed
        assert_eq!(psk.faces[0].wedge_indices, [2, 1, 0]);
        assert_eq!(psk.faces[1].wedge_indices, [3, 2, 0]);
        // V is flipped
        assert_eq!(psk.wedges[2].v, 0.0);
        assert_eq!(psk.wedges[0].v, 1.0);

        assert_eq!(psk.bones.len(), 1);
        assert_eq!(psk.materials.len(), 1);
        assert_eq!(psk.materials[0].name.to_string_lossy(), "Skin");
        assert!(result.warnings.is_empty());

        // Everything is weighted to the dummy root
        assert_eq!(psk.weights.len(), 4);
        assert!(psk.weights.iter().all(|w| w.bone_index == 0 && w.weight == 1.0));
    }

    #[test]
    fn different_uvs_split_wedges() {
        let mut mesh = quad();
        mesh.uv_layers[0].uvs[3] = Vec2::new(0.5, 0.5);
        let psk = build(&[mesh], &PskBuildOptions::default()).unwrap().psk;
        assert_eq!(psk.wedges.len(), 5);
    }

    #[test]
    fn mirrored_objects_flip_faces() {
        let mut mesh = quad();
        mesh.world_matrix = Mat4::from_scale(Vec3::new(-1.0, 1.0, 1.0));
        let psk = build(&[mesh], &PskBuildOptions::default()).unwrap().psk;
        assert_eq!(psk.faces[0].wedge_indices, [0, 1, 2]);
        assert_eq!(psk.points[1].x, -1.0);
    }

    #[test]
    fn materials() {
        let mut first = quad();
        first.material_slots = vec![
            Some(SceneMaterial::new("Skin")),
            Some(SceneMaterial::new("Cloth")),
        ];
        first.polygons[1].material_slot = 1;
        let mut second = quad();
        second.material_slots = vec![Some(SceneMaterial::new("Cloth"))];

        let psk = build(&[first.clone(), second.clone()], &PskBuildOptions::default())
            .unwrap()
            .psk;
        let names: Vec<String> = psk.materials.iter().map(|m| m.name.to_string_lossy()).collect();
        assert_eq!(names, vec!["Skin", "Cloth"]);
        assert_eq!(psk.faces[1].material_index, 1);
        assert_eq!(psk.faces[2].material_index, 1);
        assert_eq!(psk.materials[1].texture_index, 1);

        let options = PskBuildOptions {
            material_order: MaterialOrder::Manual(vec!["Cloth".to_string(), "Skin".to_string()]),
            ..Default::default()
        };
        let psk = build(&[first.clone(), second], &options).unwrap().psk;
        assert_eq!(psk.materials[0].name.to_string_lossy(), "Cloth");
        assert_eq!(psk.faces[0].material_index, 1);

        first.material_slots[1] = None;
        assert!(matches!(
            build(&[first], &PskBuildOptions::default()),
            Err(Error::Validation(ValidationError::EmptyMaterialSlot { slot: 1, .. }))
        ));
    }

    #[test]
    fn placeholder_material() {
        let mut mesh = quad();
        mesh.material_slots.clear();
        let psk = build(&[mesh], &PskBuildOptions::default()).unwrap().psk;
        assert_eq!(psk.materials.len(), 1);
        assert_eq!(psk.materials[0].name.to_string_lossy(), "None");
    }

    #[test]
    fn missing_uv_layer() {
        let mut mesh = quad();
        mesh.active_uv_layer = None;
        let result = build(&[mesh], &PskBuildOptions::default()).unwrap();
        assert_eq!(
            result.warnings,
            vec![Warning::MissingUvLayer {
                object: "Quad".to_string()
            }]
        );
        assert!(result.psk.wedges.iter().all(|w| w.u == 0.0 && w.v == 0.0));
    }

    #[test]
    fn no_meshes() {
        assert!(matches!(
            build(&[], &PskBuildOptions::default()),
            Err(Error::Validation(ValidationError::NoMeshes))
        ));
    }

    #[test]
    fn smoothing() {
        let mut mesh = quad();
        assert_eq!(smoothing_groups(&mesh), vec![1, 1]);

        mesh.sharp_edges.push([2, 0]);
        assert_eq!(smoothing_groups(&mesh), vec![1, 2]);

        mesh.sharp_edges.clear();
        mesh.polygons[1].smooth = false;
        let groups = smoothing_groups(&mesh);
        assert_ne!(groups[0], groups[1]);
    }

    #[test]
    fn extras() {
        let mut mesh = quad();
        mesh.uv_layers.push(UvLayer {
            name: "Lightmap".to_string(),
            uvs: vec![Vec2::new(0.25, 0.25); 6],
        });
        mesh.color_layers.push(ColorLayer {
            name: "Color".to_string(),
            colors: vec![Vec4::new(1.0, 0.0, 0.0, 1.0); 6],
        });

        let options = PskBuildOptions {
            export_extra_uvs: true,
            export_vertex_colors: true,
            export_vertex_normals: true,
            ..Default::default()
        };
        let psk = build(&[mesh], &options).unwrap().psk;

        assert_eq!(psk.extra_uvs.len(), 1);
        assert_eq!(psk.extra_uvs[0].len(), psk.wedges.len());
        assert_eq!(psk.extra_uvs[0][0], Vector2 { x: 0.25, y: 0.75 });
        assert_eq!(psk.vertex_colors.len(), psk.wedges.len());
        assert_eq!(psk.vertex_colors[0], Color { r: 255, g: 0, b: 0, a: 255 });
        assert_eq!(psk.vertex_normals.len(), 4);
        assert_eq!(psk.vertex_normals[0].z, 1.0);
        assert_eq!(psk.preferred_extension(), "pskx");
    }

    #[test]
    fn ambiguous_vertex_colors() {
        let mut mesh = quad();
        for name in ["A", "B"] {
            mesh.color_layers.push(ColorLayer {
                name: name.to_string(),
                colors: vec![Vec4::ZERO; 6],
            });
        }
        let options = PskBuildOptions {
            export_vertex_colors: true,
            ..Default::default()
        };
        let result = build(&[mesh], &options).unwrap();
        assert!(result
            .warnings
            .contains(&Warning::AmbiguousVertexColors {
                object: "Quad".to_string()
            }));
        assert!(result.psk.vertex_colors.iter().all(|c| *c == Color::WHITE));
    }

    #[test]
    fn weights_follow_filtered_bones() {
        let mut armature = Armature::new("Armature");
        let root = armature.add_bone("Root", None, Mat4::IDENTITY);
        armature.add_bone("Hand", Some(root), Mat4::IDENTITY);

        let mut mesh = quad();
        mesh.armature = Some(0);
        mesh.vertex_groups.push(VertexGroup {
            name: "Hand".to_string(),
            weights: vec![(0, 1.0), (1, 0.5)],
        });
        mesh.vertex_groups.push(VertexGroup {
            name: "Root".to_string(),
            weights: vec![(1, 0.5), (2, 0.0)],
        });
        mesh.vertex_groups.push(VertexGroup {
            name: "NotABone".to_string(),
            weights: vec![(3, 1.0)],
        });

        let result = build_psk(
            &[armature],
            &[MeshInstance::from(&mesh)],
            &PskBuildOptions::default(),
            &mut NoProgress,
        )
        .unwrap();
        let psk = result.psk;

        assert_eq!(psk.bones.len(), 2);
        assert!(result.warnings.contains(&Warning::UnmappedVertexGroup {
            object: "Quad".to_string(),
            group: "NotABone".to_string()
        }));

        let weights_of = |point: i32| -> Vec<(i32, f32)> {
            psk.weights
                .iter()
                .filter(|w| w.point_index == point)
                .map(|w| (w.bone_index, w.weight))
                .collect()
        };
        assert_eq!(weights_of(0), vec![(1, 1.0)]);
        assert_eq!(weights_of(1), vec![(1, 0.5), (0, 0.5)]);
        // Zero weights are skipped, leaving the vertex on the root
        assert_eq!(weights_of(2), vec![(0, 1.0)]);
        assert_eq!(weights_of(3), vec![(0, 1.0)]);
    }

    #[test]
    fn shape_keys() {
        let mut mesh = quad();
        let mut positions = mesh.vertices.clone();
        positions[2] += Vec3::new(0.0, 1.0, 0.5);
        mesh.shape_keys.push(crate::scene::ShapeKey {
            name: "Smile".to_string(),
            positions,
        });

        let options = PskBuildOptions {
            export_shape_keys: true,
            ..Default::default()
        };
        let psk = build(&[mesh], &options).unwrap().psk;
        assert_eq!(psk.morph_infos.len(), 1);
        assert_eq!(psk.morph_infos[0].vertex_count, 1);
        assert_eq!(psk.morph_data[0].point_index, 2);
        assert_eq!(psk.morph_data[0].position_delta.y, -1.0);
        assert_eq!(psk.morph_data[0].position_delta.z, 0.5);
    }
}
