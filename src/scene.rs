// SPDX-FileCopyrightText: 2026 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::ops::{Deref, DerefMut};

use glam::{Mat4, Quat, Vec2, Vec3, Vec4};

use crate::error::ValidationError;
use crate::psk::{PolyFlags, TriangleType};

/// A bone in its armature's rest pose.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneBone {
    pub name: String,
    /// Index of the parent bone in the same armature. Parents always precede their children.
    pub parent: Option<usize>,
    /// The rest transform in armature space.
    pub matrix_local: Mat4,
    /// Indices into [`Armature::collections`].
    pub collections: Vec<usize>,
}

impl SceneBone {
    pub fn new(name: &str, parent: Option<usize>, matrix_local: Mat4) -> Self {
        Self {
            name: name.to_string(),
            parent,
            matrix_local,
            collections: Vec::new(),
        }
    }

    /// The rest position of the bone's head in armature space.
    pub fn head(&self) -> Vec3 {
        self.matrix_local.w_axis.truncate()
    }

    /// The rest rotation in armature space.
    pub fn rotation(&self) -> Quat {
        let (_, rotation, _) = self.matrix_local.to_scale_rotation_translation();
        rotation
    }
}

/// What an armature object is parented to.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ArmatureParent {
    #[default]
    None,
    /// Another armature, by its index in the scene.
    Armature(usize),
    /// A bone of another armature.
    Bone { armature: usize, bone: usize },
}

impl ArmatureParent {
    pub fn armature(&self) -> Option<usize> {
        match self {
            ArmatureParent::None => None,
            ArmatureParent::Armature(armature) => Some(*armature),
            ArmatureParent::Bone { armature, .. } => Some(*armature),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Armature {
    pub name: String,
    pub world_matrix: Mat4,
    /// Bones in hierarchy order.
    pub bones: Vec<SceneBone>,
    /// Names of the bone collections.
    pub collections: Vec<String>,
    pub parent: ArmatureParent,
}

impl Armature {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            world_matrix: Mat4::IDENTITY,
            bones: Vec::new(),
            collections: Vec::new(),
            parent: ArmatureParent::None,
        }
    }

    /// Appends a bone and returns its index.
    pub fn add_bone(&mut self, name: &str, parent: Option<usize>, matrix_local: Mat4) -> usize {
        self.bones.push(SceneBone::new(name, parent, matrix_local));
        self.bones.len() - 1
    }

    /// Finds a bone by its exact name.
    pub fn bone_index(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|bone| bone.name == name)
    }

    /// Walks from `bone`'s parent up to the root.
    pub fn ancestors(&self, bone: usize) -> Ancestors<'_> {
        Ancestors {
            armature: self,
            current: self.bones.get(bone).and_then(|bone| bone.parent),
        }
    }

    /// Checks that every parent precedes its child.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (index, bone) in self.bones.iter().enumerate() {
            if let Some(parent) = bone.parent {
                if parent >= index {
                    return Err(ValidationError::InvalidBoneParent {
                        armature: self.name.clone(),
                        bone: bone.name.clone(),
                        parent,
                    });
                }
            }
        }
        Ok(())
    }
}

pub struct Ancestors<'a> {
    armature: &'a Armature,
    current: Option<usize>,
}

impl Iterator for Ancestors<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let current = self.current?;
        self.current = self
            .armature
            .bones
            .get(current)
            .and_then(|bone| bone.parent);
        Some(current)
    }
}

/// A material assigned to a mesh slot, with the metadata that ends up in its poly flags.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SceneMaterial {
    pub name: String,
    pub triangle_type: TriangleType,
    pub flags: PolyFlags,
}

impl SceneMaterial {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

/// One corner of a polygon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshLoop {
    pub vertex: usize,
    /// The split normal of this corner in object space.
    pub normal: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshPolygon {
    pub loop_start: usize,
    pub loop_count: usize,
    pub material_slot: usize,
    /// Flat shaded polygons never share a smoothing group with their neighbors.
    pub smooth: bool,
}

impl MeshPolygon {
    pub fn loops(&self) -> std::ops::Range<usize> {
        self.loop_start..self.loop_start + self.loop_count
    }
}

/// A triangle of a tessellated polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshTriangle {
    /// Loop indices, in the polygon's winding order.
    pub loops: [usize; 3],
    pub polygon: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UvLayer {
    pub name: String,
    /// One coordinate per loop.
    pub uvs: Vec<Vec2>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColorLayer {
    pub name: String,
    /// One linear RGBA color per loop.
    pub colors: Vec<Vec4>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VertexGroup {
    pub name: String,
    /// Pairs of vertex index and weight.
    pub weights: Vec<(usize, f32)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShapeKey {
    pub name: String,
    /// One position per vertex, in object space.
    pub positions: Vec<Vec3>,
}

/// An evaluated mesh object.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshObject {
    pub name: String,
    pub world_matrix: Mat4,
    /// Basis positions in object space.
    pub vertices: Vec<Vec3>,
    pub loops: Vec<MeshLoop>,
    pub polygons: Vec<MeshPolygon>,
    pub triangles: Vec<MeshTriangle>,
    /// Edges marked sharp, as pairs of vertex indices in any order.
    pub sharp_edges: Vec<[usize; 2]>,
    pub uv_layers: Vec<UvLayer>,
    pub active_uv_layer: Option<usize>,
    pub color_layers: Vec<ColorLayer>,
    pub active_color_layer: Option<usize>,
    pub vertex_groups: Vec<VertexGroup>,
    pub shape_keys: Vec<ShapeKey>,
    /// `None` is an empty slot.
    pub material_slots: Vec<Option<SceneMaterial>>,
    /// The armature deforming this mesh, by its index in the scene.
    pub armature: Option<usize>,
}

impl MeshObject {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            world_matrix: Mat4::IDENTITY,
            vertices: Vec::new(),
            loops: Vec::new(),
            polygons: Vec::new(),
            triangles: Vec::new(),
            sharp_edges: Vec::new(),
            uv_layers: Vec::new(),
            active_uv_layer: None,
            color_layers: Vec::new(),
            active_color_layer: None,
            vertex_groups: Vec::new(),
            shape_keys: Vec::new(),
            material_slots: Vec::new(),
            armature: None,
        }
    }

    /// Appends a polygon over `vertices` and fan-triangulates it. Corner normals are set to the polygon's face normal.
    pub fn add_polygon(&mut self, vertices: &[usize], material_slot: usize) -> usize {
        let loop_start = self.loops.len();
        let normal = self.polygon_normal(vertices);
        for &vertex in vertices {
            self.loops.push(MeshLoop { vertex, normal });
        }

        let polygon = self.polygons.len();
        self.polygons.push(MeshPolygon {
            loop_start,
            loop_count: vertices.len(),
            material_slot,
            smooth: true,
        });

        for i in 1..vertices.len().saturating_sub(1) {
            self.triangles.push(MeshTriangle {
                loops: [loop_start, loop_start + i, loop_start + i + 1],
                polygon,
            });
        }

        polygon
    }

    fn polygon_normal(&self, vertices: &[usize]) -> Vec3 {
        let position = |i: usize| {
            vertices
                .get(i)
                .and_then(|&v| self.vertices.get(v))
                .copied()
                .unwrap_or(Vec3::ZERO)
        };
        // Newell's method
        let mut normal = Vec3::ZERO;
        for i in 0..vertices.len() {
            let current = position(i);
            let next = position((i + 1) % vertices.len());
            normal.x += (current.y - next.y) * (current.z + next.z);
            normal.y += (current.z - next.z) * (current.x + next.x);
            normal.z += (current.x - next.x) * (current.y + next.y);
        }
        normal.normalize_or_zero()
    }

    /// Checks that every index points inside the mesh.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let invalid = |reason: String| ValidationError::InvalidMesh {
            object: self.name.clone(),
            reason,
        };

        if let Some(l) = self.loops.iter().find(|l| l.vertex >= self.vertices.len()) {
            return Err(invalid(format!("loop refers to missing vertex {}", l.vertex)));
        }
        for polygon in &self.polygons {
            if polygon.loop_start + polygon.loop_count > self.loops.len() {
                return Err(invalid("polygon refers to missing loops".to_string()));
            }
        }
        for triangle in &self.triangles {
            if triangle.polygon >= self.polygons.len()
                || triangle.loops.iter().any(|&l| l >= self.loops.len())
            {
                return Err(invalid("triangle refers to a missing polygon or loop".to_string()));
            }
        }
        for layer in &self.uv_layers {
            if layer.uvs.len() != self.loops.len() {
                return Err(invalid(format!("UV map \"{}\" does not cover every loop", layer.name)));
            }
        }
        for layer in &self.color_layers {
            if layer.colors.len() != self.loops.len() {
                return Err(invalid(format!(
                    "color attribute \"{}\" does not cover every loop",
                    layer.name
                )));
            }
        }
        for key in &self.shape_keys {
            if key.positions.len() != self.vertices.len() {
                return Err(invalid(format!(
                    "shape key \"{}\" does not cover every vertex",
                    key.name
                )));
            }
        }
        for group in &self.vertex_groups {
            if group.weights.iter().any(|&(v, _)| v >= self.vertices.len()) {
                return Err(invalid(format!(
                    "vertex group \"{}\" refers to a missing vertex",
                    group.name
                )));
            }
        }

        Ok(())
    }
}

/// A placement of a mesh in the scene. Instanced meshes are placed several times with different matrices.
#[derive(Debug, Clone, Copy)]
pub struct MeshInstance<'a> {
    pub mesh: &'a MeshObject,
    pub world_matrix: Mat4,
}

impl<'a> From<&'a MeshObject> for MeshInstance<'a> {
    fn from(mesh: &'a MeshObject) -> Self {
        Self {
            mesh,
            world_matrix: mesh.world_matrix,
        }
    }
}

/// Everything the builders read from the host.
#[derive(Debug, Default, Clone)]
pub struct Scene {
    pub armatures: Vec<Armature>,
    pub meshes: Vec<MeshObject>,
}

impl Scene {
    /// Every mesh placed once at its own world matrix.
    pub fn mesh_instances(&self) -> Vec<MeshInstance<'_>> {
        self.meshes.iter().map(MeshInstance::from).collect()
    }

    /// Checks every armature and mesh, and that meshes only reference armatures in this scene.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for armature in &self.armatures {
            armature.validate()?;
        }

        for mesh in &self.meshes {
            mesh.validate()?;
            if let Some(armature) = mesh.armature.filter(|&a| a >= self.armatures.len()) {
                return Err(ValidationError::UnknownArmature {
                    object: mesh.name.clone(),
                    armature,
                });
            }
        }

        Ok(())
    }
}

/// Evaluates poses for the animation builder.
///
/// The host's frame and active animation are shared state, so sampling is strictly sequential.
/// Use [`SamplerGuard`] to put them back afterwards.
pub trait PoseSampler {
    fn current_frame(&self) -> f32;

    /// Moves the evaluation to `frame`, which may be fractional. The pose must be fully settled when this returns.
    fn set_frame(&mut self, frame: f32);

    /// The name of the animation currently driving the armatures.
    fn current_source(&self) -> Option<String>;

    fn set_source(&mut self, source: Option<&str>);

    /// Armature-space pose matrices of `bones` of `armature` at the current frame.
    fn pose_matrices(&mut self, armature: usize, bones: &[usize]) -> Vec<Mat4>;

    /// The armature's world matrix at the current frame.
    fn armature_world_matrix(&mut self, armature: usize) -> Mat4;
}

/// Restores a sampler's frame and source when dropped, including when a build fails.
pub struct SamplerGuard<'a, S: PoseSampler + ?Sized> {
    sampler: &'a mut S,
    frame: f32,
    source: Option<String>,
}

impl<'a, S: PoseSampler + ?Sized> SamplerGuard<'a, S> {
    pub fn new(sampler: &'a mut S) -> Self {
        let frame = sampler.current_frame();
        let source = sampler.current_source();
        Self {
            sampler,
            frame,
            source,
        }
    }
}

impl<S: PoseSampler + ?Sized> Deref for SamplerGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.sampler
    }
}

impl<S: PoseSampler + ?Sized> DerefMut for SamplerGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.sampler
    }
}

impl<S: PoseSampler + ?Sized> Drop for SamplerGuard<'_, S> {
    fn drop(&mut self) {
        self.sampler.set_source(self.source.as_deref());
        self.sampler.set_frame(self.frame);
    }
}

/// Receives progress from long running builds and imports.
pub trait Progress {
    fn begin(&mut self, total: usize);
    fn update(&mut self, done: usize);
    fn end(&mut self);
}

/// Discards progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn begin(&mut self, _total: usize) {}
    fn update(&mut self, _done: usize) {}
    fn end(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeSampler {
        frame: f32,
        source: Option<String>,
    }

    impl PoseSampler for FakeSampler {
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
            vec![Mat4::IDENTITY; bones.len()]
        }

        fn armature_world_matrix(&mut self, _armature: usize) -> Mat4 {
            Mat4::IDENTITY
        }
    }

    #[test]
    fn guard_restores_state() {
        let mut sampler = FakeSampler {
            frame: 12.0,
            source: Some("Idle".to_string()),
        };

        {
            let mut guard = SamplerGuard::new(&mut sampler);
            guard.set_source(Some("Run"));
            guard.set_frame(3.5);
            assert_eq!(guard.current_frame(), 3.5);
        }

        assert_eq!(sampler.frame, 12.0);
        assert_eq!(sampler.source.as_deref(), Some("Idle"));
    }

    #[test]
    fn ancestors() {
        let mut armature = Armature::new("Armature");
        let root = armature.add_bone("Root", None, Mat4::IDENTITY);
        let spine = armature.add_bone("Spine", Some(root), Mat4::IDENTITY);
        let head = armature.add_bone("Head", Some(spine), Mat4::IDENTITY);

        assert_eq!(armature.ancestors(head).collect::<Vec<_>>(), vec![spine, root]);
        assert_eq!(armature.ancestors(root).count(), 0);
        assert_eq!(armature.bone_index("Spine"), Some(spine));
        assert!(armature.validate().is_ok());

        armature.bones[0].parent = Some(2);
        assert!(matches!(
            armature.validate(),
            Err(ValidationError::InvalidBoneParent { .. })
        ));
    }

    #[test]
    fn quad_triangulation() {
        let mut mesh = MeshObject::new("Plane");
        mesh.vertices = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        mesh.add_polygon(&[0, 1, 2, 3], 0);

        assert_eq!(mesh.loops.len(), 4);
        assert_eq!(mesh.triangles.len(), 2);
        assert_eq!(mesh.triangles[1].loops, [0, 2, 3]);
        assert!(mesh.loops[0].normal.abs_diff_eq(Vec3::Z, 1e-6));
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn scene_references() {
        let mut scene = Scene::default();
        let mut mesh = MeshObject::new("Body");
        mesh.armature = Some(0);
        scene.meshes.push(mesh);

        assert!(matches!(
            scene.validate(),
            Err(ValidationError::UnknownArmature { armature: 0, .. })
        ));

        scene.armatures.push(Armature::new("Armature"));
        assert!(scene.validate().is_ok());
        assert_eq!(scene.mesh_instances().len(), 1);
    }
}
