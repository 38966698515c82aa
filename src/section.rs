// SPDX-FileCopyrightText: 2026 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::io::{Read, Seek, SeekFrom, Write};

use binrw::{binrw, BinRead, BinWrite};
use tracing::{debug, warn};

use crate::common::FixedSize;
use crate::common_file_operations::{read_tag, write_tag};
use crate::error::{Error, FormatError, Result, Warning};

/// The constant stored in every section header's `type_flags` field.
pub const SECTION_TYPE_FLAGS: i32 = 1999801;

/// The 32-byte header that precedes every section.
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, PartialEq)]
pub struct SectionHeader {
    /// ASCII tag such as `PNTS0000`, nul padded to 20 bytes.
    #[br(map = read_tag)]
    #[bw(map = |x: &String| write_tag(x))]
    pub tag: String,
    pub type_flags: i32,
    /// Size of one element in bytes.
    pub element_size: i32,
    pub element_count: i32,
}

impl SectionHeader {
    pub fn new(tag: &str, element_size: usize, element_count: usize) -> Result<Self> {
        let too_large = || {
            Error::Stream(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("section \"{tag}\" is too large to be described by its header"),
            ))
        };

        Ok(Self {
            tag: tag.to_string(),
            type_flags: SECTION_TYPE_FLAGS,
            element_size: i32::try_from(element_size).map_err(|_| too_large())?,
            element_count: i32::try_from(element_count).map_err(|_| too_large())?,
        })
    }

    /// Number of bytes of element data that follow the header.
    pub fn data_length(&self) -> u64 {
        self.element_size.max(0) as u64 * self.element_count.max(0) as u64
    }
}

impl FixedSize for SectionHeader {
    const SIZE: usize = 32;
}

/// Writes a section header followed by `elements`. A section with no elements (like `ACTRHEAD`) has a size and count of zero.
pub fn write_section<W, T>(writer: &mut W, tag: &str, elements: &[T]) -> Result<()>
where
    W: Write + Seek,
    T: FixedSize + for<'a> BinWrite<Args<'a> = ()>,
{
    let element_size = if elements.is_empty() { 0 } else { T::SIZE };
    SectionHeader::new(tag, element_size, elements.len())?.write_le(writer)?;
    for element in elements {
        element.write_le(writer)?;
    }

    debug!(tag, element_size, element_count = elements.len(), "Wrote section");

    Ok(())
}

/// Writes a header-only section.
pub fn write_empty_section<W: Write + Seek>(writer: &mut W, tag: &str) -> Result<()> {
    SectionHeader::new(tag, 0, 0)?.write_le(writer)?;
    debug!(tag, "Wrote section");
    Ok(())
}

/// Where a section was found in the stream.
#[derive(Debug, Clone)]
pub struct SectionLocation {
    pub header: SectionHeader,
    /// Offset of the first element, immediately after the header.
    pub data_offset: u64,
}

/// Walks every section in `reader` until the end of the stream.
///
/// `visit` is called with each header while the stream is positioned at the section's data. It returns `true`
/// if it recognized the section. Whatever it reads, the stream is moved to the end of the section afterwards,
/// so a visitor may also just note the location and return. Unrecognized sections are skipped and reported
/// as warnings.
pub fn read_all_sections<R, F>(reader: &mut R, mut visit: F) -> Result<Vec<Warning>>
where
    R: Read + Seek,
    F: FnMut(&SectionLocation, &mut R) -> Result<bool>,
{
    let mut warnings = Vec::new();

    let start = reader.stream_position()?;
    let end = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(start))?;

    let mut offset = start;
    while offset < end {
        if end - offset < SectionHeader::SIZE as u64 {
            return Err(FormatError::UnexpectedEof.into());
        }

        let header = SectionHeader::read_le(reader)?;
        if header.element_size < 0 || header.element_count < 0 {
            return Err(FormatError::InvalidSectionHeader {
                tag: header.tag,
                offset,
                size: header.element_size,
                count: header.element_count,
            }
            .into());
        }

        let data_offset = offset + SectionHeader::SIZE as u64;
        let needed = header.data_length();
        let available = end - data_offset;
        if needed > available {
            return Err(FormatError::Truncated {
                tag: header.tag,
                offset,
                needed,
                available,
            }
            .into());
        }

        debug!(
            tag = %header.tag,
            element_size = header.element_size,
            element_count = header.element_count,
            offset,
            "Found section"
        );

        let location = SectionLocation {
            header,
            data_offset,
        };
        if !visit(&location, reader)? {
            let warning = Warning::UnknownSection {
                tag: location.header.tag.clone(),
                offset,
            };
            warn!("{warning}");
            warnings.push(warning);
        }

        offset = data_offset + needed;
        reader.seek(SeekFrom::Start(offset))?;
    }

    Ok(warnings)
}

/// Checks that the section's element size matches `T`.
pub fn check_element_size<T: FixedSize>(header: &SectionHeader) -> Result<()> {
    // An empty section may legitimately declare a size of zero
    if header.element_count == 0 {
        return Ok(());
    }

    if header.element_size as usize != T::SIZE {
        return Err(FormatError::ElementSizeMismatch {
            tag: header.tag.clone(),
            expected: T::SIZE,
            actual: header.element_size,
        }
        .into());
    }

    Ok(())
}

/// Reads every element of a section, after checking that the element size matches `T`.
pub fn read_elements<R, T>(reader: &mut R, header: &SectionHeader) -> Result<Vec<T>>
where
    R: Read + Seek,
    T: FixedSize + for<'a> BinRead<Args<'a> = ()>,
{
    check_element_size::<T>(header)?;

    let count = header.element_count as usize;
    let mut elements = Vec::with_capacity(count);
    for _ in 0..count {
        elements.push(T::read_le(reader)?);
    }

    Ok(elements)
}
