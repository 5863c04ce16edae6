//! Section fixup tables and pointer resolution
//!
//! Pointers in a packfile are stored as zero and recovered from three
//! tables per section:
//!
//! - local fixups `(src, dst)`: pointer into the same section,
//! - global fixups `(src, section, dst)`: pointer into any section,
//! - virtual fixups `(src, class name section, name offset)`: an object of
//!   the named class starts at `src`.
//!
//! A `src` of `0xFFFFFFFF` is padding.

use super::header::SectionHeader;
use crate::error::{Error, Result};
use crate::options::PointerWidth;
use byteorder::{ByteOrder, LittleEndian};
use std::collections::HashMap;

const PADDING: u32 = 0xFFFF_FFFF;

/// A position in a section's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location {
    pub section: usize,
    pub offset: u32,
}

/// One section with its decoded fixup tables.
#[derive(Debug, Clone)]
pub struct PackfileSection {
    pub header: SectionHeader,
    pub local: HashMap<u32, u32>,
    pub global: HashMap<u32, Location>,
    /// Object start to class name location.
    pub virtuals: HashMap<u32, Location>,
    /// Object starts in file order.
    pub objects: Vec<u32>,
}

impl PackfileSection {
    pub fn read(file: &[u8], header: SectionHeader) -> Result<Self> {
        let start = header.absolute_data_start as usize;
        let table = |from: u32, to: u32| &file[start + from as usize..start + to as usize];

        let mut local = HashMap::new();
        for entry in table(header.local_fixups_offset, header.global_fixups_offset).chunks_exact(8) {
            let src = LittleEndian::read_u32(entry);
            if src != PADDING {
                local.insert(src, LittleEndian::read_u32(&entry[4..]));
            }
        }

        let mut global = HashMap::new();
        for entry in table(header.global_fixups_offset, header.virtual_fixups_offset).chunks_exact(12) {
            let src = LittleEndian::read_u32(entry);
            if src != PADDING {
                global.insert(src, location(&entry[4..]));
            }
        }

        let mut virtuals = HashMap::new();
        let mut objects = Vec::new();
        for entry in table(header.virtual_fixups_offset, header.exports_offset).chunks_exact(12) {
            let src = LittleEndian::read_u32(entry);
            if src != PADDING {
                virtuals.insert(src, location(&entry[4..]));
                objects.push(src);
            }
        }

        tracing::debug!(
            "Section '{}': {} local, {} global, {} virtual fixups",
            header.tag,
            local.len(),
            global.len(),
            virtuals.len()
        );
        Ok(Self {
            header,
            local,
            global,
            virtuals,
            objects,
        })
    }

    /// Object data, without the fixup tables.
    pub fn data<'a>(&self, file: &'a [u8]) -> &'a [u8] {
        let start = self.header.absolute_data_start as usize;
        &file[start..start + self.header.local_fixups_offset as usize]
    }
}

fn location(bytes: &[u8]) -> Location {
    Location {
        section: LittleEndian::read_u32(bytes) as usize,
        offset: LittleEndian::read_u32(&bytes[4..]),
    }
}

/// All sections of a file plus the helpers needed to follow pointers.
#[derive(Debug)]
pub struct PackfileLayout<'a> {
    file: &'a [u8],
    pub sections: Vec<PackfileSection>,
    pub pointer_width: PointerWidth,
}

impl<'a> PackfileLayout<'a> {
    pub fn new(file: &'a [u8], headers: Vec<SectionHeader>, pointer_width: PointerWidth) -> Result<Self> {
        let sections = headers
            .into_iter()
            .map(|h| PackfileSection::read(file, h))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            file,
            sections,
            pointer_width,
        })
    }

    pub fn section_index(&self, tag: &str) -> Option<usize> {
        self.sections.iter().position(|s| s.header.tag == tag)
    }

    pub fn section(&self, index: usize) -> Result<&PackfileSection> {
        self.sections
            .get(index)
            .ok_or_else(|| Error::malformed(format!("section index {index} out of range"), 0))
    }

    pub fn data(&self, section: usize) -> Result<&'a [u8]> {
        Ok(self.section(section)?.data(self.file))
    }

    /// `size` bytes at `at`.
    pub fn bytes(&self, at: Location, size: usize) -> Result<&'a [u8]> {
        let data = self.data(at.section)?;
        let start = at.offset as usize;
        start.checked_add(size).and_then(|end| data.get(start..end)).ok_or_else(|| {
            let absolute = self.sections[at.section].header.absolute_data_start as usize + start;
            Error::malformed(format!("{size}-byte read past end of section data"), absolute)
        })
    }

    pub fn read_uint(&self, at: Location, size: usize) -> Result<u64> {
        if size == 0 {
            return Ok(0);
        }
        Ok(LittleEndian::read_uint(self.bytes(at, size.min(8))?, size.min(8)))
    }

    pub fn read_i32(&self, at: Location) -> Result<i32> {
        Ok(LittleEndian::read_i32(self.bytes(at, 4)?))
    }

    /// Where the pointer stored at `at` points, if anywhere.
    pub fn pointer(&self, at: Location) -> Result<Option<Location>> {
        let section = self.section(at.section)?;
        if let Some(&offset) = section.local.get(&at.offset) {
            return Ok(Some(Location {
                section: at.section,
                offset,
            }));
        }
        Ok(section.global.get(&at.offset).copied())
    }

    /// NUL-terminated string starting at `at`.
    pub fn c_string(&self, at: Location) -> Result<String> {
        let data = self.data(at.section)?;
        let tail = data.get(at.offset as usize..).ok_or_else(|| {
            Error::malformed("string offset past end of section data", at.offset as usize)
        })?;
        let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
        Ok(String::from_utf8(tail[..end].to_vec())?)
    }

    /// String behind the pointer at `at`; `None` for a null pointer.
    pub fn string_pointer(&self, at: Location) -> Result<Option<String>> {
        self.pointer(at)?.map(|target| self.c_string(target)).transpose()
    }

    /// Class name registered by a virtual fixup for the object at `at`.
    pub fn class_name(&self, at: Location) -> Result<Option<String>> {
        match self.section(at.section)?.virtuals.get(&at.offset) {
            Some(&name) => Ok(Some(self.c_string(name)?)),
            None => Ok(None),
        }
    }

    /// Objects of one class registered in a section, in file order.
    pub fn objects_of_class(&self, section: usize, class: &str) -> Result<Vec<u32>> {
        let mut found = Vec::new();
        for &offset in &self.section(section)?.objects {
            if self.class_name(Location { section, offset })?.as_deref() == Some(class) {
                found.push(offset);
            }
        }
        Ok(found)
    }
}
