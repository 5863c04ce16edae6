//! Object graph packer for the `DATA` and `INDX` sections
//!
//! Items are discovered breadth-first from the root through three queues:
//!
//! - pointer targets, which get their index as soon as they are seen so that
//!   every later reference reuses it,
//! - arrays whose elements are not primitive, which get their index after
//!   packing their elements,
//! - strings, indexed last.
//!
//! Arrays of primitives are packed on the spot. Item storage is kept in
//! slots; references to an item that has no index yet are written back into
//! the owning slot once the index is known.

use super::{ItemEntry, ItemKind, PatchGroup};
use crate::error::{Error, Result};
use crate::graph::{ObjectGraph, ObjectId, PackContext, Value};
use crate::options::PointerWidth;
use crate::types::{TagKind, TypeIndex, TypeSet};
use byteorder::{ByteOrder, LittleEndian};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Arrays of this struct are aligned like the struct itself rather than to 16.
const NAMED_VARIANT: &str = "hkRootLevelContainerNamedVariant";
const CLASS_ARRAY_ALIGNMENT: u32 = 16;
const MIN_ITEM_ALIGNMENT: u32 = 2;
const DATA_ALIGNMENT: usize = 16;

/// Output of one pack session.
#[derive(Debug, Default)]
pub struct PackedData {
    pub data: Vec<u8>,
    pub items: Vec<ItemEntry>,
    pub patches: Vec<PatchGroup>,
}

/// Storage of one item before it is placed in `DATA`.
#[derive(Debug)]
struct Slot {
    type_index: TypeIndex,
    kind: ItemKind,
    count: u32,
    data: Vec<u8>,
    /// Offsets in `data` holding item indices, with the member type that holds them.
    refs: Vec<(usize, TypeIndex)>,
}

/// A place that will receive an item index.
#[derive(Debug, Clone, Copy)]
struct Fixup {
    slot: usize,
    offset: usize,
    member_type: TypeIndex,
}

#[derive(Debug)]
struct ArrayTask<'g> {
    elements: &'g [Value],
    element_type: TypeIndex,
    owner: Fixup,
}

#[derive(Debug)]
struct StringTask<'g> {
    text: &'g str,
    char_type: TypeIndex,
    owner: Fixup,
}

pub struct DataPacker<'a, 'g> {
    ctx: PackContext<'a>,
    graph: &'g ObjectGraph,
    slots: Vec<Slot>,
    /// Slot of each item index; entry 0 is the null item.
    item_slots: Vec<Option<usize>>,
    pointer_queue: VecDeque<(ObjectId, u32)>,
    array_queue: VecDeque<ArrayTask<'g>>,
    string_queue: VecDeque<StringTask<'g>>,
}

impl<'a, 'g> DataPacker<'a, 'g> {
    #[must_use]
    pub fn new(types: &'a TypeSet, pointer_width: PointerWidth, graph: &'g ObjectGraph) -> Self {
        Self {
            ctx: PackContext::new(types, pointer_width),
            graph,
            slots: Vec::new(),
            item_slots: vec![None],
            pointer_queue: VecDeque::new(),
            array_queue: VecDeque::new(),
            string_queue: VecDeque::new(),
        }
    }

    /// Pack everything reachable from the root.
    pub fn pack(mut self) -> Result<PackedData> {
        self.discover(self.graph.root())?;

        loop {
            while let Some((object, index)) = self.pointer_queue.pop_front() {
                self.pack_object(object, index)?;
            }
            if let Some(task) = self.array_queue.pop_front() {
                self.pack_deferred_array(task)?;
                continue;
            }
            if self.string_queue.is_empty() {
                break;
            }
            while let Some(task) = self.string_queue.pop_front() {
                self.pack_string(task)?;
            }
        }

        self.flush()
    }

    /// Index of a pointer target, queueing it on first sight.
    fn discover(&mut self, object: ObjectId) -> Result<u32> {
        self.graph.get(object)?;
        let (index, is_new) = self.ctx.ids.assign(object);
        if is_new {
            self.item_slots.push(None);
            self.pointer_queue.push_back((object, index));
        }
        Ok(index)
    }

    fn reserve_index(&mut self, slot: usize) -> u32 {
        let index = self.ctx.ids.allocate();
        self.item_slots.push(Some(slot));
        index
    }

    fn new_slot(&mut self, type_index: TypeIndex, kind: ItemKind, count: u32, size: usize) -> usize {
        self.slots.push(Slot {
            type_index,
            kind,
            count,
            data: vec![0; size],
            refs: Vec::new(),
        });
        self.slots.len() - 1
    }

    fn pack_object(&mut self, object: ObjectId, index: u32) -> Result<()> {
        let graph: &'g ObjectGraph = self.graph;
        let object = graph.get(object)?;
        let size = self.ctx.types.byte_size_of(object.type_index)? as usize;
        let slot = self.new_slot(object.type_index, ItemKind::Pointer, 1, size);
        self.item_slots[index as usize] = Some(slot);
        self.write_value(slot, 0, object.type_index, &object.value)
    }

    /// Pack elements into a fresh array item and return its index.
    fn pack_elements(&mut self, element_type: TypeIndex, elements: &'g [Value]) -> Result<u32> {
        let stride = self.ctx.types.byte_size_of(element_type)? as usize;
        let slot = self.new_slot(element_type, ItemKind::Array, elements.len() as u32, stride * elements.len());
        for (i, element) in elements.iter().enumerate() {
            self.write_value(slot, i * stride, element_type, element)?;
        }
        Ok(self.reserve_index(slot))
    }

    fn pack_deferred_array(&mut self, task: ArrayTask<'g>) -> Result<()> {
        let index = self.pack_elements(task.element_type, task.elements)?;
        self.write_index(task.owner, index)
    }

    fn pack_string(&mut self, task: StringTask<'g>) -> Result<()> {
        let mut bytes = task.text.as_bytes().to_vec();
        bytes.push(0);
        let slot = self.new_slot(task.char_type, ItemKind::Array, bytes.len() as u32, 0);
        self.slots[slot].data = bytes;
        let index = self.reserve_index(slot);
        self.write_index(task.owner, index)
    }

    fn write_value(&mut self, slot: usize, offset: usize, type_index: TypeIndex, value: &'g Value) -> Result<()> {
        let types: &'a TypeSet = self.ctx.types;
        let base = types.resolve_base(type_index)?;
        let data_type = types.data_type(base)?;
        let fixup = Fixup {
            slot,
            offset,
            member_type: type_index,
        };

        match (data_type.kind(), value) {
            (TagKind::Void, _) | (_, Value::None) => Ok(()),
            (TagKind::Bool, Value::Bool(b)) => {
                let size = scalar_size(types, type_index, data_type.int_bytes())?;
                self.put_uint(slot, offset, u64::from(*b), size)
            }
            (TagKind::Char | TagKind::Int, Value::Int(i)) => {
                let size = scalar_size(types, type_index, data_type.int_bytes())?;
                self.put_uint(slot, offset, *i as u64, size)
            }
            (TagKind::Char | TagKind::Int, Value::Bool(b)) => {
                let size = scalar_size(types, type_index, data_type.int_bytes())?;
                self.put_uint(slot, offset, u64::from(*b), size)
            }
            (TagKind::Float, Value::Float(f)) => self.put_float(slot, offset, *f, types.byte_size_of(type_index)?),
            (TagKind::Float, Value::Int(i)) => self.put_float(slot, offset, *i as f64, types.byte_size_of(type_index)?),
            (TagKind::String, Value::String(text)) => {
                if let Some(text) = text {
                    let char_type = match types.pointer_target(base)? {
                        Some(target) => target,
                        None => types.require("char", "string storage")?,
                    };
                    self.string_queue.push_back(StringTask {
                        text: text.as_str(),
                        char_type,
                        owner: fixup,
                    });
                }
                Ok(())
            }
            (TagKind::Pointer, Value::Pointer(target)) => match target {
                Some(target) => {
                    let index = self.discover(*target)?;
                    self.write_index(fixup, index)
                }
                None => Ok(()),
            },
            (TagKind::Class, Value::Struct(fields)) => {
                for member in types.all_members(type_index)? {
                    if let Some(field) = fields.get(&member.name) {
                        self.write_value(slot, offset + member.offset as usize, member.type_index, field)?;
                    }
                }
                Ok(())
            }
            (TagKind::Array, Value::Array(elements)) => {
                if elements.is_empty() {
                    return Ok(());
                }
                let element_type = types.element_type(type_index)?;
                if types.kind(element_type)?.is_primitive() {
                    let index = self.pack_elements(element_type, elements)?;
                    self.write_index(fixup, index)
                } else {
                    self.array_queue.push_back(ArrayTask {
                        elements,
                        element_type,
                        owner: fixup,
                    });
                    Ok(())
                }
            }
            (TagKind::Tuple, Value::Tuple(elements)) => {
                let element_type = types.element_type(type_index)?;
                let stride = types.byte_size_of(element_type)? as usize;
                for (i, element) in elements.iter().enumerate() {
                    self.write_value(slot, offset + i * stride, element_type, element)?;
                }
                Ok(())
            }
            (kind, _) => Err(Error::InvalidFormat(format!(
                "value does not fit {kind:?} type {}",
                types.display_name(type_index)
            ))),
        }
    }

    fn write_index(&mut self, fixup: Fixup, index: u32) -> Result<()> {
        let width = self.ctx.pointer_width.size();
        self.put_uint(fixup.slot, fixup.offset, u64::from(index), width)?;
        self.slots[fixup.slot].refs.push((fixup.offset, fixup.member_type));
        Ok(())
    }

    fn target(&mut self, slot: usize, offset: usize, size: usize) -> Result<&mut [u8]> {
        let type_index = self.slots[slot].type_index;
        let available = self.slots[slot].data.len();
        if offset + size > available {
            return Err(Error::InvalidFormat(format!(
                "value at offset {offset} overruns {} ({available} bytes)",
                self.ctx.types.display_name(type_index)
            )));
        }
        Ok(&mut self.slots[slot].data[offset..offset + size])
    }

    fn put_uint(&mut self, slot: usize, offset: usize, value: u64, size: usize) -> Result<()> {
        if size == 0 {
            return Ok(());
        }
        let mask = if size >= 8 { u64::MAX } else { (1u64 << (size * 8)) - 1 };
        let buf = self.target(slot, offset, size.min(8))?;
        LittleEndian::write_uint(buf, value & mask, size.min(8));
        Ok(())
    }

    fn put_float(&mut self, slot: usize, offset: usize, value: f64, size: u32) -> Result<()> {
        match size {
            2 => {
                let buf = self.target(slot, offset, 2)?;
                LittleEndian::write_u16(buf, half::f16::from_f64(value).to_bits());
            }
            8 => LittleEndian::write_f64(self.target(slot, offset, 8)?, value),
            _ => LittleEndian::write_f32(self.target(slot, offset, 4)?, value as f32),
        }
        Ok(())
    }

    fn item_alignment(&self, slot: &Slot) -> Result<u32> {
        let types = self.ctx.types;
        if slot.kind == ItemKind::Array && types.kind(slot.type_index)? == TagKind::Class {
            if types.get_checked(slot.type_index)?.name == NAMED_VARIANT {
                return Ok(types.alignment_of(slot.type_index)?.max(1));
            }
            return Ok(CLASS_ARRAY_ALIGNMENT);
        }
        Ok(types.alignment_of(slot.type_index)?.max(MIN_ITEM_ALIGNMENT))
    }

    /// Lay items out in index order and collect patches.
    fn flush(self) -> Result<PackedData> {
        let mut data = Vec::new();
        let mut items = Vec::with_capacity(self.item_slots.len().saturating_sub(1));
        let mut patches: BTreeMap<TypeIndex, BTreeSet<u32>> = BTreeMap::new();

        for (index, slot) in self.item_slots.iter().enumerate().skip(1) {
            let slot = slot.and_then(|s| self.slots.get(s)).ok_or_else(|| Error::IncompleteGraph {
                object: index,
                message: format!("item #{index} has an index but was never packed"),
            })?;

            let alignment = self.item_alignment(slot)? as usize;
            data.resize(data.len().next_multiple_of(alignment), 0);
            let offset = data.len() as u32;
            data.extend_from_slice(&slot.data);

            for &(at, member_type) in &slot.refs {
                patches.entry(member_type).or_default().insert(offset + at as u32);
            }
            items.push(ItemEntry {
                type_index: slot.type_index,
                kind: slot.kind,
                offset,
                count: slot.count,
            });
        }
        data.resize(data.len().next_multiple_of(DATA_ALIGNMENT), 0);

        let patches = patches
            .into_iter()
            .map(|(type_index, offsets)| PatchGroup {
                type_index,
                offsets: offsets.into_iter().collect(),
            })
            .collect();
        Ok(PackedData { data, items, patches })
    }
}

/// Byte width of a scalar: declared size, else the width in its data type.
fn scalar_size(types: &TypeSet, type_index: TypeIndex, from_data_type: Option<u32>) -> Result<usize> {
    let declared = types.byte_size_of(type_index)?;
    Ok(if declared > 0 {
        declared as usize
    } else {
        from_data_type.unwrap_or(1) as usize
    })
}
