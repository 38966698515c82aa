// SPDX-FileCopyrightText: 2026 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

use binrw::{binrw, BinRead};
use tracing::{debug, info, warn};

use crate::common::{normalize_root_parent, FixedName, FixedSize, PsxBone, Quaternion, Vector3};
use crate::error::{Error, FormatError, Result, ValidationError, Warning};
use crate::psk::with_path;
use crate::section::{read_all_sections, read_elements, check_element_size, write_empty_section, write_section};
use crate::ByteBuffer;

/// Describes one animation. Its keys live in the shared key stream.
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    pub name: FixedName,
    /// Unused by modern importers.
    pub group: FixedName,
    pub bone_count: i32,
    pub root_include: i32,
    pub compression_style: i32,
    pub key_quotum: i32,
    pub key_reduction: f32,
    /// The number of frames, as a float.
    pub track_time: f32,
    pub fps: f32,
    pub start_bone: i32,
    /// Index of the sequence's first frame in the key stream, counted in frames.
    pub frame_start_index: i32,
    pub frame_count: i32,
}

impl Sequence {
    pub fn new(name: &str) -> std::result::Result<Self, ValidationError> {
        Ok(Self {
            name: FixedName::new(name)?,
            group: FixedName::default(),
            bone_count: 0,
            root_include: 0,
            compression_style: 0,
            key_quotum: 0,
            key_reduction: 0.0,
            track_time: 0.0,
            fps: 0.0,
            start_bone: 0,
            frame_start_index: 0,
            frame_count: 0,
        })
    }

    fn frame_count(&self) -> usize {
        self.frame_count.max(0) as usize
    }
}

impl FixedSize for Sequence {
    const SIZE: usize = 168;
}

/// The parent-relative transform of one bone at one frame.
#[binrw]
#[brw(little)]
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Key {
    pub location: Vector3,
    pub rotation: Quaternion,
    /// The duration of one frame in seconds, not a timestamp.
    pub time: f32,
}

impl Key {
    /// The key as `(qw, qx, qy, qz, lx, ly, lz)`.
    pub fn data(&self) -> [f32; 7] {
        let [w, x, y, z] = self.rotation.to_wxyz();
        [
            w,
            x,
            y,
            z,
            self.location.x,
            self.location.y,
            self.location.z,
        ]
    }
}

impl FixedSize for Key {
    const SIZE: usize = 32;
}

/// Per-frame, per-bone key data for one sequence, shaped `(frames, bones, 7)`.
///
/// Each element is `(qw, qx, qy, qz, lx, ly, lz)`.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceDataMatrix {
    frame_count: usize,
    bone_count: usize,
    data: Vec<[f32; 7]>,
}

impl SequenceDataMatrix {
    /// A matrix filled with zeroes.
    pub fn new(frame_count: usize, bone_count: usize) -> Self {
        Self {
            frame_count,
            bone_count,
            data: vec![[0.0; 7]; frame_count * bone_count],
        }
    }

    /// Builds a matrix from keys laid out frame-major, with bones as the inner loop.
    pub fn from_keys(keys: &[Key], frame_count: usize, bone_count: usize) -> Self {
        let mut matrix = Self::new(frame_count, bone_count);
        for (element, key) in matrix.data.iter_mut().zip(keys) {
            *element = key.data();
        }
        matrix
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn bone_count(&self) -> usize {
        self.bone_count
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        (self.frame_count, self.bone_count, 7)
    }

    pub fn get(&self, frame: usize, bone: usize) -> &[f32; 7] {
        &self.data[frame * self.bone_count + bone]
    }

    pub fn get_mut(&mut self, frame: usize, bone: usize) -> &mut [f32; 7] {
        &mut self.data[frame * self.bone_count + bone]
    }

    /// All bones for `frame`.
    pub fn frame(&self, frame: usize) -> &[[f32; 7]] {
        let start = frame * self.bone_count;
        &self.data[start..start + self.bone_count]
    }
}

/// An animation set. When read through [`PsaReader`], `keys` is left empty and keys are read on demand.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Psa {
    /// The root has a parent index of `-1`.
    pub bones: Vec<PsxBone>,
    pub sequences: Vec<Sequence>,
    /// Every sequence's keys, back to back in sequence order.
    pub keys: Vec<Key>,
}

const ANIMHEAD: &str = "ANIMHEAD";
const BONENAMES: &str = "BONENAMES";
const ANIMINFO: &str = "ANIMINFO";
const ANIMKEYS: &str = "ANIMKEYS";
const SCALEKEYS: &str = "SCALEKEYS";

impl Psa {
    /// Finds a sequence by its exact name.
    pub fn sequence(&self, name: &str) -> Option<&Sequence> {
        find_sequence(&self.sequences, name)
    }

    /// The keys of an in-memory sequence.
    pub fn sequence_keys(&self, name: &str) -> Result<&[Key]> {
        let sequence = self
            .sequence(name)
            .ok_or_else(|| FormatError::UnknownSequence(name.to_string()))?;
        let range = key_range(sequence, self.bones.len(), self.keys.len())?;
        Ok(&self.keys[range])
    }

    /// Checks that the keys line up with the sequences. Nothing is written if this fails.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.bones.is_empty() {
            return Err(ValidationError::NoBones);
        }

        let frames: i64 = self.sequences.iter().map(|s| s.frame_count.max(0) as i64).sum();
        let expected = frames * self.bones.len() as i64;
        if expected != self.keys.len() as i64 {
            return Err(ValidationError::InvalidAnimation(format!(
                "{} keys for {frames} frames of {} bones",
                self.keys.len(),
                self.bones.len()
            )));
        }

        Ok(())
    }

    pub fn write_to<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        self.validate()?;

        write_empty_section(writer, ANIMHEAD)?;
        write_section(writer, BONENAMES, &self.bones)?;
        write_section(writer, ANIMINFO, &self.sequences)?;
        write_section(writer, ANIMKEYS, &self.keys)?;

        info!(
            bones = self.bones.len(),
            sequences = self.sequences.len(),
            keys = self.keys.len(),
            "Wrote PSA"
        );

        Ok(())
    }

    /// Writes the animation into a new buffer.
    pub fn write_to_buffer(&self) -> Result<ByteBuffer> {
        let mut buffer = ByteBuffer::new();

        {
            let mut cursor = Cursor::new(&mut buffer);
            self.write_to(&mut cursor)?;
        }

        Ok(buffer)
    }

    /// Writes the animation to `path`, creating any missing parent directories.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.validate()?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        let file = File::create(path).map_err(|e| Error::io(path, e))?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer).map_err(|e| with_path(e, path))?;
        writer.flush().map_err(|e| Error::io(path, e))?;

        Ok(())
    }
}

fn find_sequence<'a>(sequences: &'a [Sequence], name: &str) -> Option<&'a Sequence> {
    sequences
        .iter()
        .find(|s| s.name.to_string_lossy() == name)
}

/// The range of keys, in records, that belong to `sequence`.
fn key_range(
    sequence: &Sequence,
    bone_count: usize,
    key_count: usize,
) -> Result<std::ops::Range<usize>> {
    let start = sequence.frame_start_index.max(0) as usize * bone_count;
    let end = start + sequence.frame_count() * bone_count;
    if sequence.frame_start_index < 0 || end > key_count {
        return Err(FormatError::IndexOutOfRange {
            what: "key",
            index: end.saturating_sub(1),
            count: key_count,
        }
        .into());
    }
    Ok(start..end)
}

/// Rewrites the frame start indices of files written by old versions of CUE4Parse, which set every
/// sequence's `frame_start_index` to its `frame_count`.
///
/// Returns `true` if the indices were rewritten.
fn repair_frame_start_indices(sequences: &mut [Sequence]) -> bool {
    match sequences.first() {
        Some(first) if first.frame_start_index == first.frame_count && first.frame_count != 0 => {}
        _ => return false,
    }

    let mut frame_start_index = 0;
    for sequence in sequences {
        sequence.frame_start_index = frame_start_index;
        frame_start_index += sequence.frame_count;
    }

    true
}

/// Reads the bones and sequences of a PSA up front, and keys only when asked for.
///
/// The key stream of a PSA can be very large, so the reader holds on to the stream and seeks to
/// a sequence's keys when they're requested.
pub struct PsaReader<R> {
    reader: R,
    bones: Vec<PsxBone>,
    sequences: Vec<Sequence>,
    /// Offset and record count of the ANIMKEYS data.
    keys: Option<(u64, usize)>,
    warnings: Vec<Warning>,
}

impl PsaReader<BufReader<File>> {
    /// Opens the PSA at `path`. The file stays open until the reader is dropped.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read + Seek> PsaReader<R> {
    pub fn new(mut reader: R) -> Result<Self> {
        let mut bones = None;
        let mut sequences = Vec::new();
        let mut keys = None;

        let mut warnings = read_all_sections(&mut reader, |location, reader| {
            let header = &location.header;
            match header.tag.as_str() {
                ANIMHEAD => {}
                BONENAMES => bones = Some(read_elements::<_, PsxBone>(reader, header)?),
                ANIMINFO => sequences = read_elements(reader, header)?,
                ANIMKEYS => {
                    check_element_size::<Key>(header)?;
                    keys = Some((location.data_offset, header.element_count as usize));
                }
                SCALEKEYS => debug!("Ignoring scale keys"),
                _ => return Ok(false),
            }
            Ok(true)
        })?;

        let mut bones = bones.ok_or(FormatError::MissingSection { tag: BONENAMES })?;
        normalize_root_parent(&mut bones);

        if repair_frame_start_indices(&mut sequences) {
            let warning = Warning::RepairedFrameStartIndices;
            warn!("{warning}");
            warnings.push(warning);
        }

        debug!(
            bones = bones.len(),
            sequences = sequences.len(),
            "Read PSA"
        );

        Ok(Self {
            reader,
            bones,
            sequences,
            keys,
            warnings,
        })
    }

    pub fn bones(&self) -> &[PsxBone] {
        &self.bones
    }

    pub fn sequences(&self) -> &[Sequence] {
        &self.sequences
    }

    pub fn sequence(&self, name: &str) -> Option<&Sequence> {
        find_sequence(&self.sequences, name)
    }

    pub fn sequence_names(&self) -> Vec<String> {
        self.sequences
            .iter()
            .map(|s| s.name.to_string_lossy())
            .collect()
    }

    /// Anything odd found while reading the bones and sequences.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Reads the `frame_count * bone_count` keys of the sequence called `name`.
    pub fn read_sequence_keys(&mut self, name: &str) -> Result<Vec<Key>> {
        let sequence = find_sequence(&self.sequences, name)
            .ok_or_else(|| FormatError::UnknownSequence(name.to_string()))?;
        let (keys_offset, key_count) = self
            .keys
            .ok_or(FormatError::MissingSection { tag: ANIMKEYS })?;

        let range = key_range(sequence, self.bones.len(), key_count)?;
        self.reader.seek(SeekFrom::Start(
            keys_offset + (range.start * Key::SIZE) as u64,
        ))?;

        let mut keys = Vec::with_capacity(range.len());
        for _ in range {
            keys.push(Key::read_le(&mut self.reader)?);
        }

        Ok(keys)
    }

    /// Reads the keys of the sequence called `name` as a `(frames, bones, 7)` matrix.
    pub fn read_sequence_data_matrix(&mut self, name: &str) -> Result<SequenceDataMatrix> {
        let keys = self.read_sequence_keys(name)?;
        let frame_count = match self.sequence(name) {
            Some(sequence) => sequence.frame_count(),
            None => 0,
        };
        Ok(SequenceDataMatrix::from_keys(
            &keys,
            frame_count,
            self.bones.len(),
        ))
    }

    /// Reads every sequence's keys into an in-memory document.
    pub fn read_all(&mut self) -> Result<Psa> {
        let mut keys = Vec::new();
        for name in self.sequence_names() {
            keys.extend(self.read_sequence_keys(&name)?);
        }

        Ok(Psa {
            bones: self.bones.clone(),
            sequences: self.sequences.clone(),
            keys,
        })
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

#[cfg(test)]
mod tests {
    use std::fs::read;
    use std::path::PathBuf;

    use super::*;

    fn key(value: f32) -> Key {
        Key {
            location: Vector3::new(value, value + 0.5, -value),
            rotation: Quaternion::IDENTITY,
            time: 1.0 / 30.0,
        }
    }

    fn sequence(name: &str, frame_start_index: i32, frame_count: i32) -> Sequence {
        let mut sequence = Sequence::new(name).unwrap();
        sequence.bone_count = 2;
        sequence.frame_start_index = frame_start_index;
        sequence.frame_count = frame_count;
        sequence.fps = 30.0;
        sequence
    }

    fn two_sequences() -> Psa {
        let root = PsxBone::new("Root").unwrap();
        let mut child = PsxBone::new("Child").unwrap();
        child.parent_index = 0;

        Psa {
            bones: vec![root, child],
            sequences: vec![sequence("Idle", 0, 2), sequence("Walk", 2, 3)],
            keys: (0..10).map(|i| key(i as f32)).collect(),
        }
    }

    #[test]
    fn lazy_key_reading() {
        let psa = two_sequences();
        let buffer = psa.write_to_buffer().unwrap();

        let mut reader = PsaReader::new(Cursor::new(buffer)).unwrap();
        assert_eq!(reader.sequence_names(), vec!["Idle", "Walk"]);
        assert!(reader.bones()[0].is_root());
        assert_eq!(reader.bones()[1].parent(), Some(0));

        let keys = reader.read_sequence_keys("Walk").unwrap();
        assert_eq!(keys.len(), 6);
        assert_eq!(keys[0], key(4.0));
        assert_eq!(keys[5], key(9.0));

        let matrix = reader.read_sequence_data_matrix("Idle").unwrap();
        assert_eq!(matrix.shape(), (2, 2, 7));
        assert_eq!(matrix.get(1, 0), &[1.0, 0.0, 0.0, 0.0, 2.0, 2.5, -2.0]);

        assert_eq!(reader.read_all().unwrap(), psa);
    }

    #[test]
    fn unknown_sequence() {
        let buffer = two_sequences().write_to_buffer().unwrap();
        let mut reader = PsaReader::new(Cursor::new(buffer)).unwrap();
        assert!(matches!(
            reader.read_sequence_keys("Run"),
            Err(Error::Format(FormatError::UnknownSequence(_)))
        ));
    }

    #[test]
    fn cue4parse_repair() {
        let mut psa = two_sequences();
        psa.sequences[0].frame_start_index = 2;
        psa.sequences[1].frame_start_index = 3;
        let buffer = psa.write_to_buffer().unwrap();

        let mut reader = PsaReader::new(Cursor::new(buffer)).unwrap();
        assert_eq!(reader.warnings(), &[Warning::RepairedFrameStartIndices]);
        assert_eq!(reader.sequences()[0].frame_start_index, 0);
        assert_eq!(reader.sequences()[1].frame_start_index, 2);
        assert_eq!(reader.read_sequence_keys("Walk").unwrap()[0], key(4.0));
    }

    #[test]
    fn scale_keys_are_ignored() {
        let psa = two_sequences();
        let mut cursor = Cursor::new(psa.write_to_buffer().unwrap());
        cursor.seek(SeekFrom::End(0)).unwrap();
        write_section(&mut cursor, SCALEKEYS, &[Vector3::ZERO; 4]).unwrap();
        cursor.set_position(0);

        let reader = PsaReader::new(cursor).unwrap();
        assert!(reader.warnings().is_empty());
    }

    #[test]
    fn root_parent_zero_is_accepted() {
        let mut psa = two_sequences();
        psa.bones[0].parent_index = 0;
        let buffer = psa.write_to_buffer().unwrap();
        let reader = PsaReader::new(Cursor::new(buffer)).unwrap();
        assert_eq!(reader.bones()[0].parent_index, -1);
    }

    #[test]
    fn mismatched_keys() {
        let mut psa = two_sequences();
        psa.keys.pop();
        assert!(matches!(
            psa.write_to_buffer(),
            Err(Error::Validation(ValidationError::InvalidAnimation(_)))
        ));
    }

    #[test]
    fn in_memory_keys() {
        let psa = two_sequences();
        assert_eq!(psa.sequence_keys("Idle").unwrap().len(), 4);
        assert!(psa.sequence_keys("Nope").is_err());
    }

    #[test]
    fn test_invalid() {
        let mut d = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        d.push("resources/tests");
        d.push("random");

        // Feeding it invalid data should not panic
        let _ = PsaReader::new(Cursor::new(read(d).unwrap()));
    }
}
