//! Legacy binary packfile container
//!
//! A packfile is a flat memory image split into sections, usually
//! `__classnames__`, `__types__` and `__data__`. Pointers are stored as zero
//! and restored from per-section fixup tables. The class tables in
//! `__types__` describe every serialized type; files that omit them are
//! decoded against a reference [`TypeSet`].

pub mod fixups;
pub mod header;
pub mod type_reader;
pub mod unpacker;

pub use fixups::{Location, PackfileLayout, PackfileSection};
pub use header::{MAGIC0, MAGIC1, PackfileHeader, SectionHeader};
pub use type_reader::{EnumItem, PackfileTypes};

use crate::error::{Error, Result};
use crate::graph::ObjectGraph;
use crate::options::PointerWidth;
use crate::types::TypeSet;
use byteorder::{ByteOrder, LittleEndian};
use std::collections::BTreeMap;
use std::path::Path;
use unpacker::PackfileUnpacker;

const TYPES_SECTION: &str = "__types__";

/// A decoded packfile.
#[derive(Debug, Clone)]
pub struct Packfile {
    pub header: PackfileHeader,
    pub pointer_width: PointerWidth,
    pub types: TypeSet,
    /// Enums declared in the class tables, keyed `Class::Enum`.
    pub enums: BTreeMap<String, Vec<EnumItem>>,
    pub graph: ObjectGraph,
}

impl Packfile {
    /// SDK version string from the header.
    #[must_use]
    pub fn sdk_version(&self) -> &str {
        &self.header.contents_version
    }
}

/// Check for the two packfile magic words.
#[must_use]
pub fn is_packfile(data: &[u8]) -> bool {
    data.len() >= 8 && LittleEndian::read_u32(data) == MAGIC0 && LittleEndian::read_u32(&data[4..]) == MAGIC1
}

/// Read a packfile from disk
///
/// # Errors
/// Returns an error if the file cannot be read or decoded.
pub fn read_packfile<P: AsRef<Path>>(path: P) -> Result<Packfile> {
    let data = std::fs::read(path)?;
    parse_packfile(&data)
}

/// Parse a packfile using its own class tables
///
/// # Errors
/// Returns an error for malformed framing, unknown member layouts, or a file
/// without class tables.
pub fn parse_packfile(data: &[u8]) -> Result<Packfile> {
    parse(data, None)
}

/// Parse a packfile, falling back to `reference` when it carries no class tables
///
/// # Errors
/// Same as [`parse_packfile`], plus `MissingTypeReference` for objects whose
/// class is not in the type set used.
pub fn parse_packfile_with_types(data: &[u8], reference: &TypeSet) -> Result<Packfile> {
    parse(data, Some(reference))
}

fn parse(data: &[u8], reference: Option<&TypeSet>) -> Result<Packfile> {
    let (header, sections) = header::read_headers(data)?;
    let pointer_width = header.pointer_width()?;
    let layout = PackfileLayout::new(data, sections, pointer_width)?;

    let declared = match layout.section_index(TYPES_SECTION) {
        Some(section) => Some(type_reader::read_types(&layout, section)?),
        None => None,
    };
    let (types, enums) = match (declared, reference) {
        (Some(declared), _) if !declared.types.is_empty() => (declared.types, declared.enums),
        (_, Some(reference)) => {
            tracing::info!("Packfile has no class tables, decoding against reference types");
            (reference.clone(), BTreeMap::new())
        }
        _ => return Err(Error::missing_type(TYPES_SECTION, "packfile without class tables")),
    };

    let root = Location {
        section: header.contents_section as usize,
        offset: header.contents_offset,
    };
    let root_class = layout.c_string(Location {
        section: header.contents_class_name_section as usize,
        offset: header.contents_class_name_offset,
    })?;
    let graph = PackfileUnpacker::new(&layout, &types).unpack(root, &root_class)?;

    Ok(Packfile {
        header,
        pointer_width,
        types,
        enums,
        graph,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_detection() {
        let mut data = vec![0u8; 16];
        LittleEndian::write_u32(&mut data, MAGIC0);
        LittleEndian::write_u32(&mut data[4..], MAGIC1);
        assert!(is_packfile(&data));
        assert!(!is_packfile(&data[..6]));
        assert!(!is_packfile(b"\0\0\0\x10TAG0"));
    }

    #[test]
    fn test_truncated_header() {
        let mut data = vec![0u8; 40];
        LittleEndian::write_u32(&mut data, MAGIC0);
        LittleEndian::write_u32(&mut data[4..], MAGIC1);
        assert!(matches!(parse_packfile(&data), Err(Error::MalformedHeader { .. })));
    }

    #[test]
    fn test_bad_magic() {
        let data = vec![0u8; 64];
        assert!(matches!(parse_packfile(&data), Err(Error::MalformedHeader { offset: 0, .. })));
    }
}
