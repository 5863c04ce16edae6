//! Object graph unpacker for the `DATA` section
//!
//! Every pointer item becomes one arena object up front, so references are
//! resolved by item index without recursion and shared targets stay shared.
//! Arrays and strings are read in place where they are referenced.

use super::{ItemEntry, ItemKind};
use crate::error::{Error, Result};
use crate::graph::{HkObject, ObjectGraph, ObjectId, Value};
use crate::options::PointerWidth;
use crate::types::{TagKind, TypeIndex, TypeSet};
use byteorder::{ByteOrder, LittleEndian};
use indexmap::IndexMap;

pub struct DataUnpacker<'a> {
    types: &'a TypeSet,
    data: &'a [u8],
    /// File offset of `data`, for error messages.
    base_offset: usize,
    items: &'a [ItemEntry],
    pointer_width: PointerWidth,
    /// Arena id of each pointer item, by item index - 1.
    objects: Vec<Option<ObjectId>>,
}

impl<'a> DataUnpacker<'a> {
    #[must_use]
    pub fn new(
        types: &'a TypeSet,
        data: &'a [u8],
        base_offset: usize,
        items: &'a [ItemEntry],
        pointer_width: PointerWidth,
    ) -> Self {
        Self {
            types,
            data,
            base_offset,
            items,
            pointer_width,
            objects: Vec::new(),
        }
    }

    /// Decode every pointer item. Item 1 is the root.
    pub fn unpack(mut self) -> Result<ObjectGraph> {
        let root = self.items.first().ok_or_else(|| Error::InvalidItemIndex {
            index: 1,
            offset: self.base_offset,
        })?;
        if root.kind != ItemKind::Pointer {
            return Err(Error::InvalidItemIndex {
                index: 1,
                offset: self.base_offset + root.offset as usize,
            });
        }

        let mut arena = Vec::new();
        self.objects = self
            .items
            .iter()
            .map(|item| {
                (item.kind == ItemKind::Pointer).then(|| {
                    arena.push(HkObject::new(item.type_index, Value::None));
                    ObjectId(arena.len() - 1)
                })
            })
            .collect();

        for (item, object) in self.items.iter().zip(&self.objects) {
            if let Some(object) = object {
                self.types.get_checked(item.type_index)?;
                arena[object.0].value = self.read_value(item.offset as usize, item.type_index)?;
            }
        }

        ObjectGraph::from_parts(arena, ObjectId(0))
    }

    fn read_value(&self, offset: usize, type_index: TypeIndex) -> Result<Value> {
        let types = self.types;
        let base = types.resolve_base(type_index)?;
        let data_type = types.data_type(base)?;

        Ok(match data_type.kind() {
            TagKind::Void => Value::None,
            TagKind::Invalid => {
                return Err(Error::InvalidFormat(format!(
                    "type {} has no decodable kind",
                    types.display_name(type_index)
                )));
            }
            TagKind::Bool => {
                let size = self.scalar_size(type_index, data_type.int_bytes())?;
                Value::Bool(self.read_uint(offset, size)? != 0)
            }
            TagKind::Char | TagKind::Int => {
                let size = self.scalar_size(type_index, data_type.int_bytes())?;
                let raw = self.read_uint(offset, size)?;
                let value = if data_type.is_signed() && size < 8 {
                    let shift = 64 - size * 8;
                    ((raw << shift) as i64) >> shift
                } else {
                    raw as i64
                };
                Value::Int(value)
            }
            TagKind::Float => {
                let size = match types.byte_size_of(type_index)? {
                    2 => 2,
                    8 => 8,
                    _ => 4,
                };
                let bytes = self.bytes(offset, size)?;
                Value::Float(match size {
                    2 => half::f16::from_bits(LittleEndian::read_u16(bytes)).to_f64(),
                    8 => LittleEndian::read_f64(bytes),
                    _ => f64::from(LittleEndian::read_f32(bytes)),
                })
            }
            TagKind::String => match self.item_at(offset, ItemKind::Array)? {
                None => Value::String(None),
                Some(item) => {
                    let mut bytes = self.bytes(item.offset as usize, item.count as usize)?.to_vec();
                    while bytes.last() == Some(&0) {
                        bytes.pop();
                    }
                    Value::String(Some(String::from_utf8(bytes)?))
                }
            },
            TagKind::Pointer => {
                let index = self.read_ref(offset)?;
                if index == 0 {
                    Value::Pointer(None)
                } else {
                    let object = self
                        .objects
                        .get(index as usize - 1)
                        .copied()
                        .flatten()
                        .ok_or_else(|| Error::InvalidItemIndex {
                            index,
                            offset: self.base_offset + offset,
                        })?;
                    Value::Pointer(Some(object))
                }
            }
            TagKind::Class => {
                let mut fields = IndexMap::new();
                for member in types.all_members(type_index)? {
                    let value = self.read_value(offset + member.offset as usize, member.type_index)?;
                    fields.insert(member.name.clone(), value);
                }
                Value::Struct(fields)
            }
            TagKind::Array => match self.item_at(offset, ItemKind::Array)? {
                None => Value::Array(Vec::new()),
                Some(item) => {
                    let element_type = types.element_type(type_index)?;
                    let stride = types.byte_size_of(element_type)? as usize;
                    let start = item.offset as usize;
                    let elements = (0..item.count as usize)
                        .map(|i| self.read_value(start + i * stride, element_type))
                        .collect::<Result<Vec<_>>>()?;
                    Value::Array(elements)
                }
            },
            TagKind::Tuple => {
                let element_type = types.element_type(type_index)?;
                let stride = types.byte_size_of(element_type)? as usize;
                let elements = (0..data_type.tuple_count() as usize)
                    .map(|i| self.read_value(offset + i * stride, element_type))
                    .collect::<Result<Vec<_>>>()?;
                Value::Tuple(elements)
            }
        })
    }

    fn scalar_size(&self, type_index: TypeIndex, from_data_type: Option<u32>) -> Result<usize> {
        let declared = self.types.byte_size_of(type_index)?;
        Ok(if declared > 0 {
            declared.min(8) as usize
        } else {
            from_data_type.unwrap_or(1) as usize
        })
    }

    fn bytes(&self, offset: usize, size: usize) -> Result<&'a [u8]> {
        self.data
            .get(offset..offset + size)
            .ok_or_else(|| Error::malformed(format!("{size}-byte read past end of DATA"), self.base_offset + offset))
    }

    fn read_uint(&self, offset: usize, size: usize) -> Result<u64> {
        if size == 0 {
            return Ok(0);
        }
        Ok(LittleEndian::read_uint(self.bytes(offset, size)?, size))
    }

    fn read_ref(&self, offset: usize) -> Result<u32> {
        let raw = self.read_uint(offset, self.pointer_width.size())?;
        u32::try_from(raw).map_err(|_| Error::InvalidItemIndex {
            index: u32::MAX,
            offset: self.base_offset + offset,
        })
    }

    /// Item referenced at `offset`, which must have `kind`. `None` for null.
    fn item_at(&self, offset: usize, kind: ItemKind) -> Result<Option<&'a ItemEntry>> {
        let index = self.read_ref(offset)?;
        if index == 0 {
            return Ok(None);
        }
        match self.items.get(index as usize - 1) {
            Some(item) if item.kind == kind => Ok(Some(item)),
            _ => Err(Error::InvalidItemIndex {
                index,
                offset: self.base_offset + offset,
            }),
        }
    }
}
