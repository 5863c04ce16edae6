//! Object graph decoding for packfile data sections
//!
//! Objects are decoded through a worklist memoized by their location, so a
//! target reached through several pointers becomes one arena object and
//! cycles terminate.

use super::fixups::{Location, PackfileLayout};
use crate::error::{Error, Result};
use crate::graph::{HkObject, ObjectGraph, ObjectId, Value};
use crate::types::{TagKind, TypeIndex, TypeSet};
use byteorder::{ByteOrder, LittleEndian};
use indexmap::IndexMap;
use std::collections::{HashMap, VecDeque};

pub struct PackfileUnpacker<'l, 'a> {
    layout: &'l PackfileLayout<'a>,
    types: &'l TypeSet,
    arena: Vec<HkObject>,
    ids: HashMap<Location, ObjectId>,
    queue: VecDeque<(ObjectId, Location)>,
}

impl<'l, 'a> PackfileUnpacker<'l, 'a> {
    #[must_use]
    pub fn new(layout: &'l PackfileLayout<'a>, types: &'l TypeSet) -> Self {
        Self {
            layout,
            types,
            arena: Vec::new(),
            ids: HashMap::new(),
            queue: VecDeque::new(),
        }
    }

    /// Decode the contents object at `root` and everything reachable from it.
    pub fn unpack(mut self, root: Location, root_class: &str) -> Result<ObjectGraph> {
        let root_type = self.types.require(root_class, "packfile contents class")?;
        let root_id = self.materialize(root, Some(root_type))?;

        while let Some((id, at)) = self.queue.pop_front() {
            let type_index = self.arena[id.0].type_index;
            self.arena[id.0].value = self.read_value(at, type_index)?;
        }

        tracing::debug!("Decoded {} packfile objects", self.arena.len());
        ObjectGraph::from_parts(self.arena, root_id)
    }

    fn absolute(&self, at: Location) -> usize {
        self.layout
            .sections
            .get(at.section)
            .map_or(0, |s| s.header.absolute_data_start as usize)
            + at.offset as usize
    }

    /// Arena id of the object at `at`, queueing it on first sight.
    ///
    /// The class comes from the object's virtual fixup; `fallback` is used for
    /// objects without one.
    fn materialize(&mut self, at: Location, fallback: Option<TypeIndex>) -> Result<ObjectId> {
        if let Some(&id) = self.ids.get(&at) {
            return Ok(id);
        }
        let type_index = match self.layout.class_name(at)? {
            Some(name) => self.types.require(&name, "packfile object")?,
            None => fallback.ok_or_else(|| Error::malformed("pointer to an object without a class", self.absolute(at)))?,
        };
        self.arena.push(HkObject::new(type_index, Value::None));
        let id = ObjectId(self.arena.len() - 1);
        self.ids.insert(at, id);
        self.queue.push_back((id, at));
        Ok(id)
    }

    fn read_value(&mut self, at: Location, type_index: TypeIndex) -> Result<Value> {
        let types = self.types;
        let base = types.resolve_base(type_index)?;
        let data_type = types.data_type(base)?;
        let size = types.byte_size_of(type_index)? as usize;

        Ok(match data_type.kind() {
            TagKind::Void => Value::None,
            TagKind::Invalid => {
                return Err(Error::InvalidFormat(format!(
                    "type {} has no decodable kind",
                    types.display_name(type_index)
                )));
            }
            TagKind::Bool => Value::Bool(self.layout.read_uint(at, size.max(1))? != 0),
            TagKind::Char | TagKind::Int => {
                let size = if size > 0 { size.min(8) } else { data_type.int_bytes().unwrap_or(1) as usize };
                let raw = self.layout.read_uint(at, size)?;
                Value::Int(if data_type.is_signed() && size < 8 {
                    let shift = 64 - size * 8;
                    ((raw << shift) as i64) >> shift
                } else {
                    raw as i64
                })
            }
            TagKind::Float => Value::Float(match size {
                2 => half::f16::from_bits(LittleEndian::read_u16(self.layout.bytes(at, 2)?)).to_f64(),
                8 => LittleEndian::read_f64(self.layout.bytes(at, 8)?),
                _ => f64::from(LittleEndian::read_f32(self.layout.bytes(at, 4)?)),
            }),
            TagKind::String => Value::String(self.layout.string_pointer(at)?),
            TagKind::Pointer => match self.layout.pointer(at)? {
                None => Value::Pointer(None),
                Some(target) => {
                    let expected = types.pointer_target(base)?;
                    Value::Pointer(Some(self.materialize(target, expected)?))
                }
            },
            TagKind::Class => {
                let mut fields = IndexMap::new();
                for member in types.all_members(type_index)? {
                    let member_at = Location {
                        section: at.section,
                        offset: at.offset + member.offset,
                    };
                    fields.insert(member.name.clone(), self.read_value(member_at, member.type_index)?);
                }
                Value::Struct(fields)
            }
            TagKind::Array => {
                let declared = types.element_type(type_index)?;
                let (start, count, element_type) = if types.get_checked(base)?.name == "hkHomogeneousArray" {
                    self.homogeneous_storage(at, declared)?
                } else {
                    let (start, count) = self.array_storage(at, base)?;
                    (start, count, declared)
                };
                let stride = types.byte_size_of(element_type)?;
                let mut elements = Vec::new();
                if let Some(start) = start {
                    self.check_span(start, count, stride)?;
                    elements.reserve(count as usize);
                    for i in 0..count {
                        let element_at = Location {
                            section: start.section,
                            offset: start.offset + i * stride,
                        };
                        elements.push(self.read_value(element_at, element_type)?);
                    }
                }
                Value::Array(elements)
            }
            TagKind::Tuple => {
                let element_type = types.element_type(type_index)?;
                let stride = types.byte_size_of(element_type)?;
                let elements = (0..data_type.tuple_count())
                    .map(|i| {
                        let element_at = Location {
                            section: at.section,
                            offset: at.offset + i * stride,
                        };
                        self.read_value(element_at, element_type)
                    })
                    .collect::<Result<Vec<_>>>()?;
                Value::Tuple(elements)
            }
        })
    }

    /// Fails unless `count` elements of `stride` bytes lie inside the section at `start`.
    fn check_span(&self, start: Location, count: u32, stride: u32) -> Result<()> {
        if stride == 0 && count > 0 {
            return Err(Error::malformed(
                format!("array of {count} zero-sized elements"),
                self.absolute(start),
            ));
        }
        let span = usize::try_from(u64::from(count) * u64::from(stride))
            .map_err(|_| Error::malformed(format!("array of {count} elements is too large"), self.absolute(start)))?;
        self.layout.bytes(start, span)?;
        Ok(())
    }

    /// `hkHomogeneousArray`: element class pointer, data pointer and size.
    /// The class pointer may name a subclass of the declared element type.
    fn homogeneous_storage(&self, at: Location, declared: TypeIndex) -> Result<(Option<Location>, u32, TypeIndex)> {
        let w = self.layout.pointer_width.bytes();
        let element_type = match self.layout.pointer(at)? {
            Some(class) => match self.layout.string_pointer(class)? {
                Some(name) => {
                    let found = self.types.require(&name, "homogeneous array class")?;
                    if !self.types.is_subclass_of(found, declared)? {
                        return Err(Error::malformed(
                            format!(
                                "homogeneous array of {} holds {name}",
                                self.types.display_name(declared)
                            ),
                            self.absolute(at),
                        ));
                    }
                    found
                }
                None => declared,
            },
            None => declared,
        };

        let size_at = Location {
            section: at.section,
            offset: at.offset + 2 * w,
        };
        let count = self.layout.read_i32(size_at)?;
        let count = u32::try_from(count)
            .map_err(|_| Error::malformed(format!("negative array size {count}"), self.absolute(size_at)))?;
        let start = self.layout.pointer(Location {
            section: at.section,
            offset: at.offset + w,
        })?;
        if start.is_none() && count > 0 {
            return Err(Error::malformed(
                format!("array of {count} elements has no data pointer"),
                self.absolute(at),
            ));
        }
        Ok((start, count, element_type))
    }

    /// Start and length of an array member's elements.
    fn array_storage(&self, at: Location, array_type: TypeIndex) -> Result<(Option<Location>, u32)> {
        if self.types.get_checked(array_type)?.name == "hkRelArray" {
            let header = self.layout.bytes(at, 4)?;
            let count = u32::from(LittleEndian::read_u16(header));
            let offset = u32::from(LittleEndian::read_u16(&header[2..]));
            let start = Location {
                section: at.section,
                offset: at.offset + offset,
            };
            return Ok(((count > 0).then_some(start), count));
        }

        let size_at = Location {
            section: at.section,
            offset: at.offset + self.layout.pointer_width.bytes(),
        };
        let count = self.layout.read_i32(size_at)?;
        let count = u32::try_from(count)
            .map_err(|_| Error::malformed(format!("negative array size {count}"), self.absolute(size_at)))?;
        let start = self.layout.pointer(at)?;
        if start.is_none() && count > 0 {
            return Err(Error::malformed(
                format!("array of {count} elements has no data pointer"),
                self.absolute(at),
            ));
        }
        Ok((start, count))
    }
}
