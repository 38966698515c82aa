// SPDX-FileCopyrightText: 2026 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::HashSet;

use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
use tracing::{info, warn};

use crate::common_file_operations::srgb_to_rgb;
use crate::error::{Result, Warning};
use crate::psk::{decode_poly_flags, ObjectReference, Psk};
use crate::psk_builder::VertexColorSpace;
use crate::scene::{Armature, ColorLayer, MeshObject, SceneMaterial, ShapeKey, UvLayer, VertexGroup};

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PskImportOptions {
    pub import_mesh: bool,
    pub import_armature: bool,
    pub import_vertex_colors: bool,
    /// The color space the file's vertex colors are in.
    pub vertex_color_space: VertexColorSpace,
    pub import_vertex_normals: bool,
    pub import_extra_uvs: bool,
    pub import_shape_keys: bool,
    /// Applied to every point and bone location.
    pub scale: f32,
}

impl Default for PskImportOptions {
    fn default() -> Self {
        Self {
            import_mesh: true,
            import_armature: true,
            import_vertex_colors: true,
            vertex_color_space: VertexColorSpace::Srgba,
            import_vertex_normals: true,
            import_extra_uvs: true,
            import_shape_keys: true,
            scale: 1.0,
        }
    }
}

#[derive(Debug)]
pub struct PskImportResult {
    pub armature: Option<Armature>,
    pub mesh: Option<MeshObject>,
    /// One entry per material slot of the mesh.
    pub material_references: Vec<Option<ObjectReference>>,
    pub warnings: Vec<Warning>,
}

/// Rebuilds the rest pose of every bone in armature space.
fn import_armature(psk: &Psk, name: &str, scale: f32) -> Result<Armature> {
    let mut armature = Armature::new(name);
    let mut world: Vec<(Quat, Vec3)> = Vec::with_capacity(psk.bones.len());

    for (index, bone) in psk.bones.iter().enumerate() {
        let local_rotation: Quat = bone.rotation.into();
        let local_location: Vec3 = bone.location.into();

        // A parent that doesn't precede its child is caught by validate() below
        let parent = bone.parent().filter(|&parent| parent != index);
        let (rotation, location) = match parent.and_then(|parent| world.get(parent)) {
            Some(&(parent_rotation, parent_location)) => (
                parent_rotation * local_rotation.conjugate(),
                parent_location + parent_rotation * (local_location * scale),
            ),
            None => (local_rotation, local_location * scale),
        };
        let rotation = rotation.normalize();
        world.push((rotation, location));

        armature.add_bone(
            &bone.name.to_string_lossy(),
            parent,
            Mat4::from_rotation_translation(rotation, location),
        );
    }

    armature.validate()?;
    Ok(armature)
}

fn import_mesh(
    psk: &Psk,
    name: &str,
    options: &PskImportOptions,
    warnings: &mut Vec<Warning>,
) -> MeshObject {
    let mut mesh = MeshObject::new(name);
    mesh.vertices = psk
        .points
        .iter()
        .map(|&p| Vec3::from(p) * options.scale)
        .collect();

    // Wedge of every loop, in loop order
    let mut loop_wedges: Vec<usize> = Vec::with_capacity(psk.faces.len() * 3);
    let mut seen: HashSet<[u32; 3]> = HashSet::new();
    let mut discarded = 0;

    for face in &psk.faces {
        let wedges = [
            face.wedge_indices[2] as usize,
            face.wedge_indices[1] as usize,
            face.wedge_indices[0] as usize,
        ];
        let Some(points) = wedges
            .iter()
            .map(|&w| psk.wedges.get(w).map(|wedge| wedge.point_index))
            .collect::<Option<Vec<u32>>>()
            .and_then(|points| <[u32; 3]>::try_from(points).ok())
        else {
            discarded += 1;
            continue;
        };

        let mut sorted = points;
        sorted.sort_unstable();
        if points[0] == points[1] || points[1] == points[2] || points[0] == points[2] || !seen.insert(sorted)
        {
            discarded += 1;
            continue;
        }

        let vertices = points.map(|p| p as usize);
        mesh.add_polygon(&vertices, face.material_index as usize);
        loop_wedges.extend(wedges);
    }

    if discarded > 0 {
        let warning = Warning::DiscardedFaces { count: discarded };
        warn!("{warning}");
        warnings.push(warning);
    }

    mesh.uv_layers.push(UvLayer {
        name: "UVMap".to_string(),
        uvs: loop_wedges
            .iter()
            .map(|&w| Vec2::new(psk.wedges[w].u, 1.0 - psk.wedges[w].v))
            .collect(),
    });
    mesh.active_uv_layer = Some(0);

    if options.import_extra_uvs {
        for (channel, uvs) in psk.extra_uvs.iter().enumerate() {
            mesh.uv_layers.push(UvLayer {
                name: format!("EXTRAUV{channel}"),
                uvs: loop_wedges
                    .iter()
                    .map(|&w| {
                        let uv = uvs.get(w).copied().unwrap_or_default();
                        Vec2::new(uv.x, 1.0 - uv.y)
                    })
                    .collect(),
            });
        }
    }

    if options.import_vertex_colors && psk.has_vertex_colors() {
        let convert = |c: f32| match options.vertex_color_space {
            VertexColorSpace::Linear => c,
            VertexColorSpace::Srgba => srgb_to_rgb(c),
        };
        mesh.color_layers.push(ColorLayer {
            name: "VERTEXCOLOR".to_string(),
            colors: loop_wedges
                .iter()
                .map(|&w| {
                    let [r, g, b, a] = psk.vertex_colors.get(w).copied().unwrap_or_default().normalized();
                    Vec4::new(convert(r), convert(g), convert(b), a)
                })
                .collect(),
        });
        mesh.active_color_layer = Some(0);
    }

    if options.import_vertex_normals && psk.has_vertex_normals() {
        for mesh_loop in &mut mesh.loops {
            if let Some(&normal) = psk.vertex_normals.get(mesh_loop.vertex) {
                mesh_loop.normal = Vec3::from(normal).normalize_or_zero();
            }
        }
    }

    // One vertex group per bone that has weights
    let mut groups: Vec<Option<VertexGroup>> = vec![None; psk.bones.len()];
    for weight in &psk.weights {
        let (Ok(bone), Ok(point)) = (
            usize::try_from(weight.bone_index),
            usize::try_from(weight.point_index),
        ) else {
            continue;
        };
        let Some(slot) = groups.get_mut(bone) else {
            continue;
        };
        slot.get_or_insert_with(|| VertexGroup {
            name: psk.bones[bone].name.to_string_lossy(),
            weights: Vec::new(),
        })
        .weights
        .push((point, weight.weight));
    }
    mesh.vertex_groups = groups.into_iter().flatten().collect();

    if options.import_shape_keys && psk.has_morph_data() {
        let mut data = psk.morph_data.iter();
        for info in &psk.morph_infos {
            let mut positions = mesh.vertices.clone();
            for morph in data.by_ref().take(info.vertex_count.max(0) as usize) {
                let Some(position) = usize::try_from(morph.point_index)
                    .ok()
                    .and_then(|p| positions.get_mut(p))
                else {
                    continue;
                };
                let delta = Vec3::new(
                    morph.position_delta.x,
                    -morph.position_delta.y,
                    morph.position_delta.z,
                );
                *position += delta * options.scale;
            }
            mesh.shape_keys.push(ShapeKey {
                name: info.name.to_string_lossy(),
                positions,
            });
        }
    }

    mesh.material_slots = psk
        .materials
        .iter()
        .map(|material| {
            let (triangle_type, flags) = decode_poly_flags(material.poly_flags);
            Some(SceneMaterial {
                name: material.name.to_string_lossy(),
                triangle_type,
                flags,
            })
        })
        .collect();

    mesh
}

/// Converts a PSK into an armature and a mesh deformed by it.
///
/// Faces that reuse a point, or that repeat another face's points, are dropped with a warning.
pub fn import_psk(psk: &Psk, name: &str, options: &PskImportOptions) -> Result<PskImportResult> {
    let mut warnings = Vec::new();

    let armature = if options.import_armature && !psk.bones.is_empty() {
        Some(import_armature(psk, name, options.scale)?)
    } else {
        None
    };

    let mesh = if options.import_mesh {
        let mut mesh = import_mesh(psk, name, options, &mut warnings);
        if armature.is_some() {
            mesh.armature = Some(0);
        }
        Some(mesh)
    } else {
        None
    };

    let material_references = (0..psk.materials.len())
        .map(|i| {
            psk.material_references
                .get(i)
                .and_then(|reference| ObjectReference::parse(reference))
        })
        .collect();

    info!(
        bones = psk.bones.len(),
        faces = mesh.as_ref().map(|m| m.triangles.len()).unwrap_or(0),
        warnings = warnings.len(),
        "Imported PSK"
    );

    Ok(PskImportResult {
        armature,
        mesh,
        material_references,
        warnings,
    })
}
