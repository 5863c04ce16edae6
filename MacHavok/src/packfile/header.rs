//! Packfile header and section headers

use crate::error::{Error, Result};
use crate::options::PointerWidth;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read, Seek, SeekFrom};

/// First magic word.
pub const MAGIC0: u32 = 0x57E0_E057;
/// Second magic word.
pub const MAGIC1: u32 = 0x10C0_C010;

/// Fixed part of the file header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackfileHeader {
    pub user_tag: i32,
    pub file_version: i32,
    /// Bytes in a pointer, little-endian flag, reuse-padding and
    /// empty-base-class optimizations.
    pub layout_rules: [u8; 4],
    pub section_count: u32,
    pub contents_section: u32,
    pub contents_offset: u32,
    pub contents_class_name_section: u32,
    pub contents_class_name_offset: u32,
    /// SDK version, e.g. `hk_2010.2.0-r1`.
    pub contents_version: String,
    pub flags: i32,
    /// `-1` before version 11.
    pub max_predicate: i16,
    pub predicate_padding: u16,
}

impl PackfileHeader {
    pub const SIZE: usize = 64;
    /// Extra header bytes carried from version 11 on.
    pub const EXTENDED_SIZE: usize = 16;

    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let magic0 = reader.read_u32::<LittleEndian>()?;
        let magic1 = reader.read_u32::<LittleEndian>()?;
        if magic0 != MAGIC0 || magic1 != MAGIC1 {
            return Err(Error::malformed(
                format!("bad packfile magic {magic0:#010x} {magic1:#010x}"),
                0,
            ));
        }

        let user_tag = reader.read_i32::<LittleEndian>()?;
        let file_version = reader.read_i32::<LittleEndian>()?;
        let mut layout_rules = [0u8; 4];
        reader.read_exact(&mut layout_rules)?;
        let section_count = reader.read_u32::<LittleEndian>()?;
        let contents_section = reader.read_u32::<LittleEndian>()?;
        let contents_offset = reader.read_u32::<LittleEndian>()?;
        let contents_class_name_section = reader.read_u32::<LittleEndian>()?;
        let contents_class_name_offset = reader.read_u32::<LittleEndian>()?;

        let mut version = [0u8; 16];
        reader.read_exact(&mut version)?;
        let end = version.iter().position(|&b| b == 0 || b == 0xFF).unwrap_or(version.len());
        let contents_version = String::from_utf8_lossy(&version[..end]).into_owned();

        let flags = reader.read_i32::<LittleEndian>()?;
        let max_predicate = reader.read_i16::<LittleEndian>()?;
        let predicate_padding = reader.read_u16::<LittleEndian>()?;

        Ok(Self {
            user_tag,
            file_version,
            layout_rules,
            section_count,
            contents_section,
            contents_offset,
            contents_class_name_section,
            contents_class_name_offset,
            contents_version,
            flags,
            max_predicate,
            predicate_padding,
        })
    }

    /// Pointer width from the layout rules.
    pub fn pointer_width(&self) -> Result<PointerWidth> {
        PointerWidth::try_from(u32::from(self.layout_rules[0]))
    }

    #[must_use]
    pub fn is_little_endian(&self) -> bool {
        self.layout_rules[1] != 0
    }

    /// Offset of the first section header.
    #[must_use]
    pub fn section_table_offset(&self) -> usize {
        if self.file_version >= 11 {
            Self::SIZE + Self::EXTENDED_SIZE
        } else {
            Self::SIZE
        }
    }

    /// Size of one section header for this file version.
    #[must_use]
    pub fn section_header_size(&self) -> usize {
        if self.file_version >= 11 {
            SectionHeader::EXTENDED_SIZE
        } else {
            SectionHeader::SIZE
        }
    }
}

/// One entry of the section table
///
/// All offsets except `absolute_data_start` are relative to the section start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    pub tag: String,
    pub absolute_data_start: u32,
    pub local_fixups_offset: u32,
    pub global_fixups_offset: u32,
    pub virtual_fixups_offset: u32,
    pub exports_offset: u32,
    pub imports_offset: u32,
    pub end_offset: u32,
}

impl SectionHeader {
    pub const SIZE: usize = 48;
    pub const EXTENDED_SIZE: usize = 64;
    const TAG_SIZE: usize = 20;

    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut tag = [0u8; Self::TAG_SIZE];
        reader.read_exact(&mut tag)?;
        let end = tag.iter().position(|&b| b == 0 || b == 0xFF).unwrap_or(tag.len());

        Ok(Self {
            tag: String::from_utf8_lossy(&tag[..end]).into_owned(),
            absolute_data_start: reader.read_u32::<LittleEndian>()?,
            local_fixups_offset: reader.read_u32::<LittleEndian>()?,
            global_fixups_offset: reader.read_u32::<LittleEndian>()?,
            virtual_fixups_offset: reader.read_u32::<LittleEndian>()?,
            exports_offset: reader.read_u32::<LittleEndian>()?,
            imports_offset: reader.read_u32::<LittleEndian>()?,
            end_offset: reader.read_u32::<LittleEndian>()?,
        })
    }

    /// Check the offsets are ordered and inside a file of `file_len` bytes.
    pub fn validate(&self, file_len: usize, header_offset: usize) -> Result<()> {
        let ordered = [
            self.local_fixups_offset,
            self.global_fixups_offset,
            self.virtual_fixups_offset,
            self.exports_offset,
            self.imports_offset,
            self.end_offset,
        ]
        .windows(2)
        .all(|w| w[0] <= w[1]);
        if !ordered {
            return Err(Error::malformed(
                format!("section '{}' has unordered fixup offsets", self.tag),
                header_offset,
            ));
        }
        let end = self.absolute_data_start as usize + self.end_offset as usize;
        if end > file_len {
            return Err(Error::malformed(
                format!("section '{}' ends at {end:#x}, past end of file ({file_len:#x})", self.tag),
                header_offset,
            ));
        }
        Ok(())
    }
}

/// Read the file header and every section header.
pub fn read_headers(data: &[u8]) -> Result<(PackfileHeader, Vec<SectionHeader>)> {
    if data.len() < PackfileHeader::SIZE {
        return Err(Error::malformed("file shorter than packfile header", 0));
    }
    let mut cursor = Cursor::new(data);
    let header = PackfileHeader::read(&mut cursor)?;
    if !header.is_little_endian() {
        return Err(Error::malformed("big-endian packfiles are not supported", 0x10));
    }
    header.pointer_width()?;

    let section_count = header.section_count as usize;
    let table_end = section_count
        .checked_mul(header.section_header_size())
        .and_then(|size| size.checked_add(header.section_table_offset()));
    if table_end.is_none_or(|end| end > data.len()) {
        return Err(Error::malformed(
            format!("{section_count} section headers do not fit in the file"),
            0x14,
        ));
    }

    let mut sections = Vec::with_capacity(section_count);
    for i in 0..section_count {
        let offset = header.section_table_offset() + i * header.section_header_size();
        cursor.seek(SeekFrom::Start(offset as u64))?;
        let section = SectionHeader::read(&mut cursor).map_err(|e| match e {
            Error::Io(_) => Error::malformed(format!("section header {i} is truncated"), offset),
            other => other,
        })?;
        section.validate(data.len(), offset)?;
        sections.push(section);
    }

    for (index, field) in [
        (header.contents_section, 0x18),
        (header.contents_class_name_section, 0x20),
    ] {
        if index as usize >= sections.len() {
            return Err(Error::malformed(
                format!("contents section index {index} out of range"),
                field,
            ));
        }
    }

    tracing::debug!(
        "Packfile v{} ({}), {} sections",
        header.file_version,
        header.contents_version,
        sections.len()
    );
    Ok((header, sections))
}
