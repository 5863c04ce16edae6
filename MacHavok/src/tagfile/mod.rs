//! Binary tagfile (`TAG0`) container
//!
//! Layout of a tagfile:
//!
//! ```text
//! TAG0
//! ├── SDKV   8-character SDK version
//! ├── DATA   packed items
//! ├── TYPE   type descriptors (TPTR, TSTR, TNAM, FSTR, TBOD, THSH, TPAD)
//! └── INDX
//!     ├── ITEM   item table, entry 0 is null
//!     └── PTCH   offsets holding item indices, grouped by type
//! ```

pub mod packer;
pub mod section;
pub mod type_table;
pub mod unpacker;
pub mod varint;

use crate::error::{Error, Result};
use crate::graph::ObjectGraph;
use crate::options::{PointerWidth, TagfileOptions};
use crate::types::{TypeIndex, TypeSet};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use section::{Section, SectionWriter};
use std::io::Cursor;
use std::path::Path;

/// Magic tag of the outermost section.
pub const TAG0: &[u8; 4] = b"TAG0";

/// Size of one `ITEM` entry.
const ITEM_ENTRY_SIZE: usize = 12;
const ITEM_KIND_SHIFT: u32 = 28;
const ITEM_TYPE_MASK: u32 = 0x00FF_FFFF;

/// What an item holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    /// A single object (pointer target).
    Pointer,
    /// Contiguous elements (array storage or string characters).
    Array,
}

impl ItemKind {
    const fn bits(self) -> u32 {
        match self {
            Self::Pointer => 1,
            Self::Array => 2,
        }
    }
}

/// One row of the `ITEM` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemEntry {
    pub type_index: TypeIndex,
    pub kind: ItemKind,
    /// Offset within the `DATA` payload.
    pub offset: u32,
    pub count: u32,
}

impl ItemEntry {
    fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        out.write_u32::<LittleEndian>((self.type_index as u32 + 1) | (self.kind.bits() << ITEM_KIND_SHIFT))?;
        out.write_u32::<LittleEndian>(self.offset)?;
        out.write_u32::<LittleEndian>(self.count)?;
        Ok(())
    }
}

/// `PTCH` entries for one type: every offset in `DATA` holding an item
/// index through a member of that type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchGroup {
    pub type_index: TypeIndex,
    pub offsets: Vec<u32>,
}

/// A decoded tagfile.
#[derive(Debug, Clone)]
pub struct Tagfile {
    pub sdk_version: String,
    pub pointer_width: PointerWidth,
    pub types: TypeSet,
    pub graph: ObjectGraph,
    /// Item table without the null entry; item `i` is `items[i - 1]`.
    pub items: Vec<ItemEntry>,
    pub patches: Vec<PatchGroup>,
}

/// Check for the `TAG0` magic.
#[must_use]
pub fn is_tagfile(data: &[u8]) -> bool {
    data.get(4..8) == Some(TAG0.as_slice())
}

/// Read a tagfile from disk
///
/// # Errors
/// Returns an error if the file cannot be read or is not a valid tagfile.
pub fn read_tagfile<P: AsRef<Path>>(path: P) -> Result<Tagfile> {
    let data = std::fs::read(path)?;
    parse_tagfile(&data)
}

/// Parse a tagfile from bytes
///
/// # Errors
/// Returns an error if the framing, type table, item table or data is invalid.
pub fn parse_tagfile(data: &[u8]) -> Result<Tagfile> {
    let root = Section::read(data, 0)?;
    if &root.tag != TAG0 {
        return Err(Error::malformed(
            format!("expected TAG0, found {}", root.name()),
            4,
        ));
    }

    let sdk_version = String::from_utf8_lossy(root.child(data, b"SDKV")?.payload(data)).into_owned();
    let (types, pointer_width) = type_table::read_type_section(data, &root.child(data, b"TYPE")?)?;

    let index = root.child(data, b"INDX")?;
    let items = read_items(data, &index.child(data, b"ITEM")?)?;
    let patches = match index.child(data, b"PTCH") {
        Ok(section) => read_patches(data, &section)?,
        Err(_) => Vec::new(),
    };

    let data_section = root.child(data, b"DATA")?;
    let graph = unpacker::DataUnpacker::new(&types, data_section.payload(data), data_section.start, &items, pointer_width)
        .unpack()?;

    tracing::info!(
        "Read tagfile {}: {} types, {} items, {} objects",
        sdk_version,
        types.len(),
        items.len(),
        graph.len()
    );
    Ok(Tagfile {
        sdk_version,
        pointer_width,
        types,
        graph,
        items,
        patches,
    })
}

/// Write a tagfile to disk
///
/// # Errors
/// Returns an error if packing fails or the file cannot be written.
pub fn write_tagfile<P: AsRef<Path>>(path: P, types: &TypeSet, graph: &ObjectGraph, options: &TagfileOptions) -> Result<()> {
    let bytes = serialize_tagfile(types, graph, options)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Pack a graph into tagfile bytes
///
/// # Errors
/// Returns an error if the options are invalid or the graph cannot be packed.
pub fn serialize_tagfile(types: &TypeSet, graph: &ObjectGraph, options: &TagfileOptions) -> Result<Vec<u8>> {
    options.validate()?;
    let packed = packer::DataPacker::new(types, options.pointer_width, graph).pack()?;

    let mut item_bytes = vec![0u8; ITEM_ENTRY_SIZE];
    for item in &packed.items {
        item.write(&mut item_bytes)?;
    }

    let mut patch_bytes = Vec::new();
    for group in &packed.patches {
        patch_bytes.write_u32::<LittleEndian>(group.type_index as u32 + 1)?;
        patch_bytes.write_u32::<LittleEndian>(group.offsets.len() as u32)?;
        for &offset in &group.offsets {
            patch_bytes.write_u32::<LittleEndian>(offset)?;
        }
    }

    let mut writer = SectionWriter::new();
    writer.begin(TAG0);
    writer.leaf(b"SDKV", options.sdk_version.as_bytes())?;
    writer.leaf(b"DATA", &packed.data)?;
    type_table::write_type_section(&mut writer, types, options.pointer_width)?;
    writer.begin(b"INDX");
    writer.leaf(b"ITEM", &item_bytes)?;
    writer.leaf(b"PTCH", &patch_bytes)?;
    writer.end()?;
    writer.end()?;

    tracing::debug!(
        "Packed {} items ({} bytes of data, {} patch groups)",
        packed.items.len(),
        packed.data.len(),
        packed.patches.len()
    );
    writer.finish()
}

fn read_items(data: &[u8], section: &Section) -> Result<Vec<ItemEntry>> {
    let payload = section.payload(data);
    if payload.len() % ITEM_ENTRY_SIZE != 0 {
        return Err(Error::malformed("ITEM size is not a multiple of 12", section.start));
    }
    let mut cursor = Cursor::new(payload);
    let mut items = Vec::with_capacity(payload.len() / ITEM_ENTRY_SIZE);
    for row in 0..payload.len() / ITEM_ENTRY_SIZE {
        let word = cursor.read_u32::<LittleEndian>()?;
        let offset = cursor.read_u32::<LittleEndian>()?;
        let count = cursor.read_u32::<LittleEndian>()?;
        if row == 0 {
            continue;
        }
        let at = section.start + row * ITEM_ENTRY_SIZE;
        let kind = match word >> ITEM_KIND_SHIFT {
            1 => ItemKind::Pointer,
            2 => ItemKind::Array,
            other => {
                return Err(Error::malformed(format!("item {row} has unknown kind {other}"), at));
            }
        };
        let type_index = (word & ITEM_TYPE_MASK)
            .checked_sub(1)
            .ok_or_else(|| Error::malformed(format!("item {row} has no type"), at))?;
        items.push(ItemEntry {
            type_index: type_index as usize,
            kind,
            offset,
            count,
        });
    }
    Ok(items)
}

fn read_patches(data: &[u8], section: &Section) -> Result<Vec<PatchGroup>> {
    let payload = section.payload(data);
    let mut cursor = Cursor::new(payload);
    let mut groups = Vec::new();
    while (cursor.position() as usize) < payload.len() {
        let at = section.start + cursor.position() as usize;
        let type_index = cursor.read_u32::<LittleEndian>().map_err(|_| Error::UnexpectedEof)?;
        let count = cursor.read_u32::<LittleEndian>().map_err(|_| Error::UnexpectedEof)?;
        let remaining = payload.len() - cursor.position() as usize;
        if count as usize > remaining / 4 {
            return Err(Error::malformed(format!("patch group of {count} offsets overruns PTCH"), at));
        }
        let mut offsets = Vec::with_capacity(count as usize);
        for _ in 0..count {
            offsets.push(cursor.read_u32::<LittleEndian>().map_err(|_| Error::UnexpectedEof)?);
        }
        groups.push(PatchGroup {
            type_index: (type_index as usize)
                .checked_sub(1)
                .ok_or_else(|| Error::malformed("patch group without a type", at))?,
            offsets,
        });
    }
    Ok(groups)
}
