// SPDX-FileCopyrightText: 2026 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::io::{BufWriter, Cursor, Read, Seek, Write};
use std::path::Path;
use std::sync::OnceLock;

use binrw::binrw;
use bitflags::bitflags;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::common::{
    normalize_root_parent, Color, FixedName, FixedSize, PsxBone, Vector2, Vector3,
};
use crate::error::{Error, FormatError, Limit, Result, ValidationError, Warning};
use crate::section::{read_all_sections, read_elements, write_empty_section, write_section};
use crate::{ByteBuffer, ByteSpan};

/// A unique (point, UV, material) combination referenced by faces.
#[binrw]
#[brw(little)]
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Wedge {
    /// Index into [`Psk::points`].
    pub point_index: u32,
    pub u: f32,
    pub v: f32,
    #[brw(pad_after = 3)]
    pub material_index: u8,
}

impl FixedSize for Wedge {
    const SIZE: usize = 16;
}

/// A triangle. Indices are stored 32-bit in memory and narrowed when written.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Face {
    /// Indices into [`Psk::wedges`], already in the file's winding order.
    pub wedge_indices: [u32; 3],
    pub material_index: u8,
    pub aux_material_index: u8,
    /// Bitmask of the smoothing groups this face belongs to.
    pub smoothing_groups: i32,
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy)]
struct Face16 {
    wedge_indices: [u16; 3],
    material_index: u8,
    aux_material_index: u8,
    smoothing_groups: i32,
}

impl FixedSize for Face16 {
    const SIZE: usize = 12;
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy)]
struct Face32 {
    wedge_indices: [u32; 3],
    material_index: u8,
    aux_material_index: u8,
    smoothing_groups: i32,
}

impl FixedSize for Face32 {
    const SIZE: usize = 18;
}

impl From<Face16> for Face {
    fn from(face: Face16) -> Self {
        Self {
            wedge_indices: face.wedge_indices.map(u32::from),
            material_index: face.material_index,
            aux_material_index: face.aux_material_index,
            smoothing_groups: face.smoothing_groups,
        }
    }
}

impl From<Face32> for Face {
    fn from(face: Face32) -> Self {
        Self {
            wedge_indices: face.wedge_indices,
            material_index: face.material_index,
            aux_material_index: face.aux_material_index,
            smoothing_groups: face.smoothing_groups,
        }
    }
}

/// How a material's triangles are rendered. Stored in the low four bits of the poly flags.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TriangleType {
    /// Normal one-sided.
    #[default]
    Normal,
    NormalTwoSided,
    /// Translucent two-sided.
    Translucent,
    /// Masked two-sided.
    Masked,
    /// Modulation blended two-sided.
    Modulate,
    /// Invisible triangle for positioning weapons.
    Placeholder,
}

impl TriangleType {
    fn bits(self) -> u32 {
        match self {
            TriangleType::Normal => 0,
            TriangleType::NormalTwoSided => 1,
            TriangleType::Translucent => 2,
            TriangleType::Masked => 3,
            TriangleType::Modulate => 4,
            TriangleType::Placeholder => 8,
        }
    }

    /// Unknown values fall back to [`TriangleType::Normal`].
    fn from_bits(bits: u32) -> Self {
        match bits & 0xF {
            1 => TriangleType::NormalTwoSided,
            2 => TriangleType::Translucent,
            3 => TriangleType::Masked,
            4 => TriangleType::Modulate,
            8 => TriangleType::Placeholder,
            _ => TriangleType::Normal,
        }
    }
}

bitflags! {
    /// The bit flags that sit above the triangle type in a material's poly flags.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct PolyFlags: u32 {
        /// Full brightness, no lighting.
        const UNLIT = 16;
        const FLAT = 32;
        /// Environment mapped.
        const ENVIRONMENT = 64;
        /// No bilinear filtering on this poly's texture.
        const NO_SMOOTH = 128;
    }
}

/// Combines a triangle type and bit flags into the value stored in [`Material::poly_flags`].
pub fn encode_poly_flags(triangle_type: TriangleType, flags: PolyFlags) -> i32 {
    (triangle_type.bits() | flags.bits()) as i32
}

/// Splits a stored poly flags value back into its triangle type and bit flags.
pub fn decode_poly_flags(poly_flags: i32) -> (TriangleType, PolyFlags) {
    let bits = poly_flags as u32;
    (
        TriangleType::from_bits(bits),
        PolyFlags::from_bits_truncate(bits),
    )
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: FixedName,
    pub texture_index: i32,
    pub poly_flags: i32,
    pub aux_material: i32,
    pub aux_flags: i32,
    pub lod_bias: i32,
    pub lod_style: i32,
}

impl Material {
    pub fn new(name: &str) -> std::result::Result<Self, ValidationError> {
        Ok(Self {
            name: FixedName::new(name)?,
            texture_index: 0,
            poly_flags: 0,
            aux_material: 0,
            aux_flags: 0,
            lod_bias: 0,
            lod_style: 0,
        })
    }
}

impl FixedSize for Material {
    const SIZE: usize = 88;
}

/// The influence of one bone on one point.
#[binrw]
#[brw(little)]
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Weight {
    pub weight: f32,
    pub point_index: i32,
    pub bone_index: i32,
}

impl FixedSize for Weight {
    const SIZE: usize = 12;
}

/// Describes one morph target. Its deltas are the next `vertex_count` entries of [`Psk::morph_data`].
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, PartialEq)]
pub struct MorphInfo {
    pub name: FixedName,
    pub vertex_count: i32,
}

impl FixedSize for MorphInfo {
    const SIZE: usize = 68;
}

#[binrw]
#[brw(little)]
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct MorphData {
    pub position_delta: Vector3,
    pub tangent_z_delta: Vector3,
    pub point_index: i32,
}

impl FixedSize for MorphData {
    const SIZE: usize = 28;
}

/// Upper bounds checked before a PSK is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PskLimits {
    pub max_wedges: u64,
    pub max_points: u64,
    pub max_materials: u64,
    pub max_bones: u64,
}

impl PskLimits {
    /// The limits of the original importer, which only accepts 256 bones.
    pub const LEGACY: PskLimits = PskLimits {
        max_wedges: 65536,
        max_points: 1 << 32,
        max_materials: 256,
        max_bones: 256,
    };

    /// The limits of newer importers.
    pub const EXTENDED: PskLimits = PskLimits {
        max_bones: i32::MAX as u64,
        ..PskLimits::LEGACY
    };
}

impl Default for PskLimits {
    fn default() -> Self {
        PskLimits::EXTENDED
    }
}

/// A skeletal mesh.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Psk {
    pub points: Vec<Vector3>,
    pub wedges: Vec<Wedge>,
    pub faces: Vec<Face>,
    pub materials: Vec<Material>,
    pub weights: Vec<Weight>,
    /// The reference skeleton. The root has a parent index of `-1`.
    pub bones: Vec<PsxBone>,
    /// Additional UV channels, each with one entry per wedge.
    pub extra_uvs: Vec<Vec<Vector2>>,
    /// One color per wedge.
    pub vertex_colors: Vec<Color>,
    /// One normal per point.
    pub vertex_normals: Vec<Vector3>,
    pub morph_infos: Vec<MorphInfo>,
    pub morph_data: Vec<MorphData>,
    /// Fully-qualified material references, from a `.props.txt` file next to the mesh.
    pub material_references: Vec<String>,
}

/// A PSK that was read successfully, along with anything odd found along the way.
#[derive(Debug)]
pub struct PskReadResult {
    pub psk: Psk,
    pub warnings: Vec<Warning>,
}

const ACTRHEAD: &str = "ACTRHEAD";
const PNTS0000: &str = "PNTS0000";
const VTXW0000: &str = "VTXW0000";
const FACE0000: &str = "FACE0000";
const FACE3200: &str = "FACE3200";
const MATT0000: &str = "MATT0000";
const REFSKELT: &str = "REFSKELT";
const RAWWEIGHTS: &str = "RAWWEIGHTS";
const VERTEXCOLOR: &str = "VERTEXCOLOR";
const VTXNORMS: &str = "VTXNORMS";
const EXTRAUVS: &str = "EXTRAUVS";
const MRPHINFO: &str = "MRPHINFO";
const MRPHDATA: &str = "MRPHDATA";

impl Psk {
    pub fn has_extra_uvs(&self) -> bool {
        !self.extra_uvs.is_empty()
    }

    pub fn has_vertex_colors(&self) -> bool {
        !self.vertex_colors.is_empty()
    }

    pub fn has_vertex_normals(&self) -> bool {
        !self.vertex_normals.is_empty()
    }

    pub fn has_material_references(&self) -> bool {
        !self.material_references.is_empty()
    }

    pub fn has_morph_data(&self) -> bool {
        !self.morph_infos.is_empty()
    }

    /// `pskx` if any of the extended sections are present, otherwise `psk`.
    pub fn preferred_extension(&self) -> &'static str {
        if self.has_extra_uvs()
            || self.has_vertex_colors()
            || self.has_vertex_normals()
            || self.has_morph_data()
        {
            "pskx"
        } else {
            "psk"
        }
    }

    /// Groups the weights by point and scales each group so it sums to one.
    ///
    /// The sort is stable, so weights for the same point keep their relative order. Points whose weights sum to zero are left alone.
    pub fn sort_and_normalize_weights(&mut self) {
        self.weights.sort_by_key(|w| w.point_index);

        for group in self
            .weights
            .chunk_by_mut(|a, b| a.point_index == b.point_index)
        {
            let sum: f32 = group.iter().map(|w| w.weight).sum();
            if sum == 0.0 {
                continue;
            }
            for weight in group {
                weight.weight /= sum;
            }
        }
    }

    /// Checks everything that would make the written file invalid. Nothing is written if this fails.
    pub fn validate(&self, limits: &PskLimits) -> std::result::Result<(), ValidationError> {
        let check = |limit: Limit, count: usize, max: u64| {
            if count as u64 > max {
                Err(ValidationError::LimitExceeded { limit, count, max })
            } else {
                Ok(())
            }
        };

        check(Limit::Wedges, self.wedges.len(), limits.max_wedges)?;
        check(Limit::Points, self.points.len(), limits.max_points)?;
        check(Limit::Materials, self.materials.len(), limits.max_materials)?;
        check(Limit::Bones, self.bones.len(), limits.max_bones)?;

        if self.bones.is_empty() {
            return Err(ValidationError::NoBones);
        }

        let invalid = |reason: String| ValidationError::InvalidMesh {
            object: "PSK".to_string(),
            reason,
        };

        // FACE0000 stores 16-bit wedge indices
        if let Some(face) = self
            .faces
            .iter()
            .find(|f| f.wedge_indices.iter().any(|&i| i > u16::MAX as u32))
        {
            return Err(invalid(format!(
                "face wedge indices {:?} do not fit in 16 bits",
                face.wedge_indices
            )));
        }

        if self.has_vertex_colors() && self.vertex_colors.len() != self.wedges.len() {
            return Err(invalid(format!(
                "{} vertex colors for {} wedges",
                self.vertex_colors.len(),
                self.wedges.len()
            )));
        }

        if self.has_vertex_normals() && self.vertex_normals.len() != self.points.len() {
            return Err(invalid(format!(
                "{} vertex normals for {} points",
                self.vertex_normals.len(),
                self.points.len()
            )));
        }

        if let Some(channel) = self
            .extra_uvs
            .iter()
            .find(|c| c.len() != self.wedges.len())
        {
            return Err(invalid(format!(
                "extra UV channel has {} entries for {} wedges",
                channel.len(),
                self.wedges.len()
            )));
        }

        let morph_vertex_count: i64 = self.morph_infos.iter().map(|m| m.vertex_count as i64).sum();
        if morph_vertex_count != self.morph_data.len() as i64 {
            return Err(invalid(format!(
                "morph targets describe {morph_vertex_count} vertices but there are {} deltas",
                self.morph_data.len()
            )));
        }

        Ok(())
    }

    /// Writes the mesh using the default limits.
    pub fn write_to<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        self.write_to_with_limits(writer, &PskLimits::default())
    }

    pub fn write_to_with_limits<W: Write + Seek>(
        &self,
        writer: &mut W,
        limits: &PskLimits,
    ) -> Result<()> {
        self.validate(limits)?;

        let faces: Vec<Face16> = self
            .faces
            .iter()
            .map(|f| Face16 {
                wedge_indices: f.wedge_indices.map(|i| i as u16),
                material_index: f.material_index,
                aux_material_index: f.aux_material_index,
                smoothing_groups: f.smoothing_groups,
            })
            .collect();

        // The format marks the root with a parent of zero
        let bones: Vec<PsxBone> = self
            .bones
            .iter()
            .map(|bone| {
                let mut bone = bone.clone();
                bone.parent_index = bone.parent_index.max(0);
                bone
            })
            .collect();

        write_empty_section(writer, ACTRHEAD)?;
        write_section(writer, PNTS0000, &self.points)?;
        write_section(writer, VTXW0000, &self.wedges)?;
        write_section(writer, FACE0000, &faces)?;
        write_section(writer, MATT0000, &self.materials)?;
        write_section(writer, REFSKELT, &bones)?;
        write_section(writer, RAWWEIGHTS, &self.weights)?;

        if self.has_vertex_colors() {
            write_section(writer, VERTEXCOLOR, &self.vertex_colors)?;
        }

        if self.has_vertex_normals() {
            write_section(writer, VTXNORMS, &self.vertex_normals)?;
        }

        for (i, channel) in self.extra_uvs.iter().enumerate() {
            write_section(writer, &format!("{EXTRAUVS}{i}"), channel)?;
        }

        if self.has_morph_data() {
            write_section(writer, MRPHINFO, &self.morph_infos)?;
            write_section(writer, MRPHDATA, &self.morph_data)?;
        }

        info!(
            points = self.points.len(),
            wedges = self.wedges.len(),
            faces = self.faces.len(),
            bones = self.bones.len(),
            "Wrote PSK"
        );

        Ok(())
    }

    /// Writes the mesh into a new buffer.
    pub fn write_to_buffer(&self) -> Result<ByteBuffer> {
        let mut buffer = ByteBuffer::new();

        {
            let mut cursor = Cursor::new(&mut buffer);
            self.write_to(&mut cursor)?;
        }

        Ok(buffer)
    }

    /// Writes the mesh to `path`, creating any missing parent directories.
    ///
    /// The document is validated first, so an invalid mesh never creates or truncates the file.
    pub fn write_to_file(&self, path: impl AsRef<Path>, limits: &PskLimits) -> Result<()> {
        let path = path.as_ref();
        self.validate(limits)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        let file = std::fs::File::create(path).map_err(|e| Error::io(path, e))?;
        let mut writer = BufWriter::new(file);
        self.write_to_with_limits(&mut writer, limits)
            .map_err(|e| with_path(e, path))?;
        writer.flush().map_err(|e| Error::io(path, e))?;

        Ok(())
    }

    /// Parses an existing PSK file.
    pub fn from_existing(buffer: ByteSpan) -> Result<PskReadResult> {
        Self::read_from(&mut Cursor::new(buffer))
    }

    pub fn read_from<R: Read + Seek>(reader: &mut R) -> Result<PskReadResult> {
        let mut psk = Psk::default();
        let mut seen_points = false;
        let mut seen_wedges = false;
        let mut seen_faces = false;

        let warnings = read_all_sections(reader, |location, reader| {
            let header = &location.header;
            match header.tag.as_str() {
                ACTRHEAD => {}
                PNTS0000 => {
                    psk.points = read_elements(reader, header)?;
                    seen_points = true;
                }
                VTXW0000 => {
                    psk.wedges = read_elements(reader, header)?;
                    seen_wedges = true;
                }
                FACE0000 => {
                    let faces: Vec<Face16> = read_elements(reader, header)?;
                    psk.faces = faces.into_iter().map(Face::from).collect();
                    seen_faces = true;
                }
                FACE3200 => {
                    let faces: Vec<Face32> = read_elements(reader, header)?;
                    psk.faces = faces.into_iter().map(Face::from).collect();
                    seen_faces = true;
                }
                MATT0000 => psk.materials = read_elements(reader, header)?,
                REFSKELT => psk.bones = read_elements(reader, header)?,
                RAWWEIGHTS => psk.weights = read_elements(reader, header)?,
                VERTEXCOLOR => psk.vertex_colors = read_elements(reader, header)?,
                VTXNORMS => psk.vertex_normals = read_elements(reader, header)?,
                MRPHINFO => psk.morph_infos = read_elements(reader, header)?,
                MRPHDATA => psk.morph_data = read_elements(reader, header)?,
                tag if tag.starts_with(EXTRAUVS) => {
                    psk.extra_uvs.push(read_elements(reader, header)?);
                }
                _ => return Ok(false),
            }
            Ok(true)
        })?;

        if !seen_points {
            return Err(FormatError::MissingSection { tag: PNTS0000 }.into());
        }
        if !seen_wedges {
            return Err(FormatError::MissingSection { tag: VTXW0000 }.into());
        }
        if !seen_faces {
            return Err(FormatError::MissingSection { tag: FACE0000 }.into());
        }

        // Older exporters left garbage in the upper half of 16-bit point indices
        if psk.points.len() <= 65536 {
            for wedge in &mut psk.wedges {
                wedge.point_index &= 0xFFFF;
            }
        }

        normalize_root_parent(&mut psk.bones);
        psk.check_references()?;

        debug!(
            points = psk.points.len(),
            wedges = psk.wedges.len(),
            faces = psk.faces.len(),
            bones = psk.bones.len(),
            "Read PSK"
        );

        Ok(PskReadResult { psk, warnings })
    }

    /// Reads the PSK at `path`, along with material references from a `.props.txt` file beside it, if one exists.
    pub fn from_file(path: impl AsRef<Path>) -> Result<PskReadResult> {
        let path = path.as_ref();
        let buffer = std::fs::read(path).map_err(|e| Error::io(path, e))?;
        let mut result = Self::from_existing(&buffer)?;

        let props_path = path.with_extension("props.txt");
        if props_path.is_file() {
            let props = std::fs::read(&props_path).map_err(|e| Error::io(&props_path, e))?;
            result.psk.material_references =
                read_material_references(&String::from_utf8_lossy(&props));
        }

        Ok(result)
    }

    /// Makes sure every index in the mesh points at something that exists.
    fn check_references(&self) -> Result<()> {
        let out_of_range = |what: &'static str, index: i64, count: usize| {
            Error::from(FormatError::IndexOutOfRange {
                what,
                index: index.max(0) as usize,
                count,
            })
        };

        for wedge in &self.wedges {
            if wedge.point_index as usize >= self.points.len() {
                return Err(out_of_range("point", wedge.point_index as i64, self.points.len()));
            }
        }

        for face in &self.faces {
            for &index in &face.wedge_indices {
                if index as usize >= self.wedges.len() {
                    return Err(out_of_range("wedge", index as i64, self.wedges.len()));
                }
            }
        }

        for weight in &self.weights {
            if weight.point_index < 0 || weight.point_index as usize >= self.points.len() {
                return Err(out_of_range("point", weight.point_index as i64, self.points.len()));
            }
            if weight.bone_index < 0 || weight.bone_index as usize >= self.bones.len() {
                return Err(out_of_range("bone", weight.bone_index as i64, self.bones.len()));
            }
        }

        for (index, bone) in self.bones.iter().enumerate() {
            if index > 0 && (bone.parent_index < 0 || bone.parent_index as usize >= self.bones.len()) {
                return Err(out_of_range("parent bone", bone.parent_index as i64, self.bones.len()));
            }
        }

        for morph in &self.morph_data {
            if morph.point_index < 0 || morph.point_index as usize >= self.points.len() {
                return Err(out_of_range("point", morph.point_index as i64, self.points.len()));
            }
        }

        let morph_vertex_count: i64 = self.morph_infos.iter().map(|m| m.vertex_count.max(0) as i64).sum();
        if morph_vertex_count > self.morph_data.len() as i64 {
            return Err(out_of_range("morph delta", morph_vertex_count - 1, self.morph_data.len()));
        }

        Ok(())
    }
}

/// Attaches `path` to an I/O error that happened while writing to it.
pub(crate) fn with_path(error: Error, path: &Path) -> Error {
    match error {
        Error::Stream(source) => Error::io(path, source),
        other => other,
    }
}

/// Extracts the `Material = <reference>` values from the contents of a `.props.txt` file, in order.
pub fn read_material_references(contents: &str) -> Vec<String> {
    static REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(regex) = REGEX.get_or_init(|| Regex::new(r"Material\s*=\s*(.+)").ok()) else {
        return Vec::new();
    };

    regex
        .captures_iter(contents)
        .filter_map(|captures| captures.get(1))
        .map(|m| m.as_str().trim().trim_end_matches('}').trim_end().to_string())
        .collect()
}

/// A reference to an Unreal object, in the form `Type'Package.Group.Object'`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectReference {
    pub type_name: String,
    pub package_name: String,
    /// Everything between the package and the object, if anything.
    pub group_name: Option<String>,
    pub object_name: String,
}

impl ObjectReference {
    /// Parses a reference. `None` (the literal) and anything malformed give `None`.
    pub fn parse(reference: &str) -> Option<ObjectReference> {
        let reference = reference.trim();
        if reference == "None" {
            return None;
        }

        let (type_name, rest) = reference.split_once('\'')?;
        let path = rest.strip_suffix('\'')?;
        if type_name.is_empty() || path.is_empty() {
            return None;
        }

        let mut parts: Vec<&str> = path.split('.').collect();
        if parts.len() < 2 || parts.iter().any(|p| p.is_empty()) {
            warn!("Could not parse object reference {reference}");
            return None;
        }

        let object_name = parts.pop()?.to_string();
        let package_name = parts.remove(0).to_string();
        let group_name = if parts.is_empty() {
            None
        } else {
            Some(parts.join("."))
        };

        Some(ObjectReference {
            type_name: type_name.to_string(),
            package_name,
            group_name,
            object_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs::read;
    use std::path::PathBuf;

    use super::*;

    fn weight(point_index: i32, bone_index: i32, weight: f32) -> Weight {
        Weight {
            weight,
            point_index,
            bone_index,
        }
    }

    fn triangle() -> Psk {
        Psk {
            points: vec![
                Vector3::new(0.0, 0.0, 0.0),
                Vector3::new(1.0, 0.0, 0.0),
                Vector3::new(0.0, 1.0, 0.0),
            ],
            wedges: (0..3)
                .map(|i| Wedge {
                    point_index: i,
                    u: i as f32 * 0.5,
                    v: 0.25,
                    material_index: 0,
                })
                .collect(),
            faces: vec![Face {
                wedge_indices: [2, 1, 0],
                material_index: 0,
                aux_material_index: 0,
                smoothing_groups: 1,
            }],
            materials: vec![Material::new("None").unwrap()],
            weights: (0..3).map(|i| weight(i, 0, 1.0)).collect(),
            bones: vec![PsxBone::new("ROOT").unwrap()],
            ..Default::default()
        }
    }

    #[test]
    fn record_sizes() {
        let psk = triangle();
        let buffer = psk.write_to_buffer().unwrap();
        let expected = 7 * 32 + 3 * 12 + 3 * 16 + 12 + 88 + 120 + 3 * 12;
        assert_eq!(buffer.len(), expected);
    }

    #[test]
    fn write_and_read() {
        let mut psk = triangle();
        psk.vertex_colors = vec![Color::WHITE; 3];
        psk.extra_uvs = vec![vec![Vector2 { x: 0.5, y: 0.5 }; 3]];

        let buffer = psk.write_to_buffer().unwrap();
        let result = Psk::from_existing(&buffer).unwrap();

        assert!(result.warnings.is_empty());
        assert_eq!(result.psk, psk);
        assert!(result.psk.bones[0].is_root());
        assert_eq!(result.psk.preferred_extension(), "pskx");
    }

    #[test]
    fn root_is_written_as_zero() {
        let buffer = triangle().write_to_buffer().unwrap();
        // ACTRHEAD, PNTS0000, VTXW0000, FACE0000, MATT0000 come before the bone
        let bone_offset = 6 * 32 + 3 * 12 + 3 * 16 + 12 + 88;
        let parent_offset = bone_offset + 64 + 8;
        assert_eq!(
            i32::from_le_bytes(buffer[parent_offset..parent_offset + 4].try_into().unwrap()),
            0
        );
    }

    #[test]
    fn missing_faces() {
        let mut cursor = Cursor::new(Vec::new());
        write_empty_section(&mut cursor, ACTRHEAD).unwrap();
        write_section(&mut cursor, PNTS0000, &[Vector3::ZERO]).unwrap();
        write_section(&mut cursor, VTXW0000, &[Wedge::default()]).unwrap();

        assert!(matches!(
            Psk::from_existing(&cursor.into_inner()),
            Err(Error::Format(FormatError::MissingSection { tag: FACE0000 }))
        ));
    }

    #[test]
    fn wedge_point_index_masking() {
        let mut psk = triangle();
        psk.wedges[1].point_index = 0x0001_0001;
        let mut cursor = Cursor::new(Vec::new());
        write_empty_section(&mut cursor, ACTRHEAD).unwrap();
        write_section(&mut cursor, PNTS0000, &psk.points).unwrap();
        write_section(&mut cursor, VTXW0000, &psk.wedges).unwrap();
        write_section::<_, Face16>(&mut cursor, FACE0000, &[]).unwrap();

        let result = Psk::from_existing(&cursor.into_inner()).unwrap();
        assert_eq!(result.psk.wedges[1].point_index, 1);
    }

    #[test]
    fn face32_is_accepted() {
        let psk = triangle();
        let faces = [Face32 {
            wedge_indices: [0, 1, 2],
            material_index: 0,
            aux_material_index: 0,
            smoothing_groups: 5,
        }];
        let mut cursor = Cursor::new(Vec::new());
        write_section(&mut cursor, PNTS0000, &psk.points).unwrap();
        write_section(&mut cursor, VTXW0000, &psk.wedges).unwrap();
        write_section(&mut cursor, FACE3200, &faces).unwrap();

        let bytes = cursor.into_inner();
        assert_eq!(bytes.len(), 3 * 32 + 36 + 48 + 18);

        let result = Psk::from_existing(&bytes).unwrap();
        assert_eq!(result.psk.faces[0].wedge_indices, [0, 1, 2]);
        assert_eq!(result.psk.faces[0].smoothing_groups, 5);
    }

    #[test]
    fn limits() {
        let mut psk = triangle();
        psk.materials = (0..257).map(|_| Material::new("M").unwrap()).collect();
        assert!(matches!(
            psk.validate(&PskLimits::default()),
            Err(ValidationError::LimitExceeded {
                limit: Limit::Materials,
                count: 257,
                max: 256
            })
        ));

        let mut psk = triangle();
        psk.bones = (0..300).map(|i| PsxBone::new(&format!("b{i}")).unwrap()).collect();
        assert!(psk.validate(&PskLimits::EXTENDED).is_ok());
        assert!(matches!(
            psk.validate(&PskLimits::LEGACY),
            Err(ValidationError::LimitExceeded {
                limit: Limit::Bones,
                ..
            })
        ));

        let mut psk = triangle();
        psk.bones.clear();
        assert!(matches!(
            psk.write_to_buffer(),
            Err(Error::Validation(ValidationError::NoBones))
        ));
    }

    #[test]
    fn wedge_limit() {
        let mut psk = triangle();
        psk.wedges = vec![Wedge::default(); 65537];
        assert!(matches!(
            psk.validate(&PskLimits::default()),
            Err(ValidationError::LimitExceeded {
                limit: Limit::Wedges,
                count: 65537,
                max: 65536
            })
        ));
    }

    #[test]
    fn sort_and_normalize() {
        let mut psk = Psk {
            weights: vec![
                weight(1, 0, 0.5),
                weight(0, 3, 2.0),
                weight(1, 1, 1.5),
                weight(0, 2, 2.0),
                weight(2, 0, 0.0),
            ],
            ..Default::default()
        };
        psk.sort_and_normalize_weights();

        let points: Vec<i32> = psk.weights.iter().map(|w| w.point_index).collect();
        assert_eq!(points, vec![0, 0, 1, 1, 2]);

        // Stable within a point
        assert_eq!(psk.weights[0].bone_index, 3);
        assert_eq!(psk.weights[1].bone_index, 2);

        assert_eq!(psk.weights[0].weight, 0.5);
        assert_eq!(psk.weights[2].weight, 0.25);
        assert_eq!(psk.weights[3].weight, 0.75);
        assert_eq!(psk.weights[4].weight, 0.0);
    }

    #[test]
    fn poly_flags() {
        let flags = encode_poly_flags(TriangleType::Masked, PolyFlags::UNLIT | PolyFlags::NO_SMOOTH);
        assert_eq!(flags, 3 | 16 | 128);
        assert_eq!(
            decode_poly_flags(flags),
            (TriangleType::Masked, PolyFlags::UNLIT | PolyFlags::NO_SMOOTH)
        );
        assert_eq!(decode_poly_flags(8).0, TriangleType::Placeholder);
        // Unknown triangle types fall back to normal
        assert_eq!(decode_poly_flags(7).0, TriangleType::Normal);
    }

    #[test]
    fn material_references() {
        let contents = "Materials[0] =\n{\n    Material = Material'MyPackage.Skins.Body'\n}\nMaterials[1] =\n{\n    Material = None\n}\n";
        let references = read_material_references(contents);
        assert_eq!(references, vec!["Material'MyPackage.Skins.Body'", "None"]);

        assert_eq!(
            ObjectReference::parse(&references[0]),
            Some(ObjectReference {
                type_name: "Material".to_string(),
                package_name: "MyPackage".to_string(),
                group_name: Some("Skins".to_string()),
                object_name: "Body".to_string(),
            })
        );
        assert_eq!(ObjectReference::parse(&references[1]), None);

        let reference = ObjectReference::parse("Texture'Pkg.Tex'").unwrap();
        assert_eq!(reference.group_name, None);
        assert_eq!(reference.object_name, "Tex");
    }

    #[test]
    fn test_invalid() {
        let mut d = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        d.push("resources/tests");
        d.push("random");

        // Feeding it invalid data should not panic
        let _ = Psk::from_existing(&read(d).unwrap());
    }
}
