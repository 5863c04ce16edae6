//! Reflected class tables of the `__types__` section
//!
//! Pass 1 decodes every `hkClass` object and classifies its members by their
//! raw `(type, subtype)` codes. Pass 2 links the result into a [`TypeSet`]:
//! classes keep file order and the builtin primitives and containers they use
//! are synthesized on first use.

use super::fixups::{Location, PackfileLayout};
use crate::error::{Error, Result};
use crate::options::PointerWidth;
use crate::types::{
    Member, MemberFlags, TagDataType, TagFormatFlags, TagKind, TemplateValue, TypeDescriptor, TypeIndex, TypeSet,
};
use std::collections::{BTreeMap, HashMap};

/// Raw `hkClassMember::Type` codes.
pub mod member_type {
    pub const VOID: u8 = 0;
    pub const BOOL: u8 = 1;
    pub const CHAR: u8 = 2;
    pub const INT8: u8 = 3;
    pub const UINT8: u8 = 4;
    pub const INT16: u8 = 5;
    pub const UINT16: u8 = 6;
    pub const INT32: u8 = 7;
    pub const UINT32: u8 = 8;
    pub const INT64: u8 = 9;
    pub const UINT64: u8 = 10;
    pub const REAL: u8 = 11;
    pub const VECTOR4: u8 = 12;
    pub const QUATERNION: u8 = 13;
    pub const MATRIX3: u8 = 14;
    pub const ROTATION: u8 = 15;
    pub const QSTRANSFORM: u8 = 16;
    pub const MATRIX4: u8 = 17;
    pub const TRANSFORM: u8 = 18;
    pub const ZERO: u8 = 19;
    pub const POINTER: u8 = 20;
    pub const FUNCTION_POINTER: u8 = 21;
    pub const ARRAY: u8 = 22;
    pub const INPLACE_ARRAY: u8 = 23;
    pub const ENUM: u8 = 24;
    pub const STRUCT: u8 = 25;
    pub const SIMPLE_ARRAY: u8 = 26;
    pub const HOMOGENEOUS_ARRAY: u8 = 27;
    pub const VARIANT: u8 = 28;
    pub const CSTRING: u8 = 29;
    pub const ULONG: u8 = 30;
    pub const FLAGS: u8 = 31;
    pub const HALF: u8 = 32;
    pub const STRING_PTR: u8 = 33;
    pub const REL_ARRAY: u8 = 34;
}

/// `hkClassMember` flag marking members skipped by serialization.
const SERIALIZE_IGNORED: u16 = 0x400;

/// Enum members written without enum metadata, resolved by class and member name.
const ENUM_ANOMALIES: [(&str, &str, &str); 2] = [
    ("hkaAnimation", "type", "hkaAnimation::AnimationType"),
    (
        "hkaAnimatedReferenceFrame",
        "frameType",
        "hkaAnimatedReferenceFrame::hkaReferenceFrameTypeEnum",
    ),
];

/// Field offsets of the reflection structs for one pointer width.
struct ReflectionLayout {
    class_parent: u32,
    class_object_size: u32,
    class_enums: u32,
    class_num_enums: u32,
    class_members: u32,
    class_num_members: u32,
    class_flags: u32,
    class_version: u32,
    member_size: u32,
    member_class: u32,
    member_enum: u32,
    member_type: u32,
    member_c_array: u32,
    member_flags: u32,
    member_offset: u32,
    enum_size: u32,
    enum_items: u32,
    enum_num_items: u32,
    item_size: u32,
    item_name: u32,
}

const LAYOUT_32: ReflectionLayout = ReflectionLayout {
    class_parent: 4,
    class_object_size: 8,
    class_enums: 16,
    class_num_enums: 20,
    class_members: 24,
    class_num_members: 28,
    class_flags: 40,
    class_version: 44,
    member_size: 24,
    member_class: 4,
    member_enum: 8,
    member_type: 12,
    member_c_array: 14,
    member_flags: 16,
    member_offset: 18,
    enum_size: 20,
    enum_items: 4,
    enum_num_items: 8,
    item_size: 8,
    item_name: 4,
};

const LAYOUT_64: ReflectionLayout = ReflectionLayout {
    class_parent: 8,
    class_object_size: 16,
    class_enums: 24,
    class_num_enums: 32,
    class_members: 40,
    class_num_members: 48,
    class_flags: 72,
    class_version: 76,
    member_size: 40,
    member_class: 8,
    member_enum: 16,
    member_type: 24,
    member_c_array: 26,
    member_flags: 28,
    member_offset: 30,
    enum_size: 40,
    enum_items: 8,
    enum_num_items: 16,
    item_size: 16,
    item_name: 8,
};

/// One named value of a reflected enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumItem {
    pub value: i32,
    pub name: String,
}

/// Decoded type section.
#[derive(Debug, Clone)]
pub struct PackfileTypes {
    pub types: TypeSet,
    /// Declared enums keyed `Class::Enum`.
    pub enums: BTreeMap<String, Vec<EnumItem>>,
}

/// A member as read from its `hkClassMember` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMember {
    pub name: String,
    pub class: Option<String>,
    pub enum_name: Option<String>,
    pub member_type: u8,
    pub subtype: u8,
    pub c_array_size: u16,
    pub flags: u16,
    pub offset: u16,
}

#[derive(Debug, Clone)]
struct RawClass {
    name: String,
    parent: Option<String>,
    object_size: u32,
    version: u32,
    members: Vec<RawMember>,
}

/// Storage of an array member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Container {
    /// `hkArray`: pointer, size, capacity and flags.
    Array,
    /// `hkSimpleArray`: pointer and size.
    SimpleArray,
    /// `hkRelArray`: 16-bit size and 16-bit offset from the member.
    RelArray,
    /// `hkHomogeneousArray`: element class pointer, data pointer and size.
    HomogeneousArray,
}

impl Container {
    /// Type name of the container.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Array => "hkArray",
            Self::SimpleArray => "hkSimpleArray",
            Self::RelArray => "hkRelArray",
            Self::HomogeneousArray => "hkHomogeneousArray",
        }
    }
}

/// Storage shape of a member.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemberLayout {
    /// Builtin primitive or float block (`hkInt32`, `hkVector4`, ...).
    Builtin(&'static str),
    Struct(String),
    PointerToStruct(String),
    PointerToVoid,
    /// `char*` or `hkStringPtr`.
    String(&'static str),
    Array {
        container: Container,
        element: Box<MemberLayout>,
    },
    /// Inline `T[N]`.
    Replicated {
        element: Box<MemberLayout>,
        count: u32,
    },
    /// Enum or flags over an integer storage type.
    Enum {
        name: Option<String>,
        storage: &'static str,
        flags: bool,
    },
    Variant,
}

/// Builtin type name of a primitive or float-block member code.
fn builtin_name(code: u8) -> Option<&'static str> {
    use member_type as t;
    Some(match code {
        t::BOOL => "hkBool",
        t::CHAR => "hkChar",
        t::INT8 => "hkInt8",
        t::UINT8 => "hkUint8",
        t::INT16 => "hkInt16",
        t::UINT16 => "hkUint16",
        t::INT32 => "hkInt32",
        t::UINT32 => "hkUint32",
        t::INT64 => "hkInt64",
        t::UINT64 => "hkUint64",
        t::REAL => "hkReal",
        t::VECTOR4 => "hkVector4",
        t::QUATERNION => "hkQuaternion",
        t::MATRIX3 => "hkMatrix3",
        t::ROTATION => "hkRotation",
        t::QSTRANSFORM => "hkQsTransform",
        t::MATRIX4 => "hkMatrix4",
        t::TRANSFORM => "hkTransform",
        t::ULONG => "hkUlong",
        t::HALF => "hkHalf",
        _ => return None,
    })
}

/// Classify a member of `class_name` by its raw codes.
///
/// # Errors
/// Returns `UnknownMemberLayout` for code combinations with no known storage.
pub fn classify_member(class_name: &str, member: &RawMember) -> Result<MemberLayout> {
    let layout = classify_type(class_name, member, member.member_type, member.subtype)?;
    Ok(if member.c_array_size > 0 {
        MemberLayout::Replicated {
            element: Box::new(layout),
            count: u32::from(member.c_array_size),
        }
    } else {
        layout
    })
}

fn classify_type(class_name: &str, member: &RawMember, code: u8, subtype: u8) -> Result<MemberLayout> {
    use member_type as t;
    let unknown = || Error::UnknownMemberLayout {
        class_name: class_name.to_string(),
        member: member.name.clone(),
        member_type: member.member_type,
        subtype: member.subtype,
    };

    if let Some(name) = builtin_name(code) {
        return Ok(MemberLayout::Builtin(name));
    }
    Ok(match code {
        t::VOID => MemberLayout::Builtin("void"),
        t::ZERO => classify_type(class_name, member, subtype, t::VOID)?,
        t::POINTER => match (subtype, &member.class) {
            (t::STRUCT, Some(class)) => MemberLayout::PointerToStruct(class.clone()),
            (t::STRUCT | t::VOID, None) => MemberLayout::PointerToVoid,
            (t::CHAR, _) => MemberLayout::String("char*"),
            _ => return Err(unknown()),
        },
        t::FUNCTION_POINTER => MemberLayout::PointerToVoid,
        t::CSTRING => MemberLayout::String("char*"),
        t::STRING_PTR => MemberLayout::String("hkStringPtr"),
        t::STRUCT => MemberLayout::Struct(member.class.clone().ok_or_else(unknown)?),
        t::VARIANT => MemberLayout::Variant,
        t::ARRAY | t::SIMPLE_ARRAY | t::REL_ARRAY => {
            let container = match code {
                t::ARRAY => Container::Array,
                t::SIMPLE_ARRAY => Container::SimpleArray,
                _ => Container::RelArray,
            };
            let element = match (subtype, &member.class) {
                (t::STRUCT, Some(class)) => MemberLayout::Struct(class.clone()),
                (t::POINTER, Some(class)) => MemberLayout::PointerToStruct(class.clone()),
                (t::POINTER, None) => MemberLayout::PointerToVoid,
                (t::CSTRING, _) => MemberLayout::String("char*"),
                (t::STRING_PTR, _) => MemberLayout::String("hkStringPtr"),
                (t::VARIANT, _) => MemberLayout::Variant,
                (sub, _) => MemberLayout::Builtin(builtin_name(sub).ok_or_else(unknown)?),
            };
            MemberLayout::Array {
                container,
                element: Box::new(element),
            }
        }
        t::HOMOGENEOUS_ARRAY => MemberLayout::Array {
            container: Container::HomogeneousArray,
            element: Box::new(MemberLayout::Struct(member.class.clone().ok_or_else(unknown)?)),
        },
        t::ENUM | t::FLAGS => {
            let storage = match subtype {
                t::INT8 | t::UINT8 | t::INT16 | t::UINT16 | t::INT32 | t::UINT32 | t::INT64 | t::UINT64 => {
                    builtin_name(subtype).ok_or_else(unknown)?
                }
                _ => return Err(unknown()),
            };
            let flags = code == t::FLAGS;
            let name = match &member.enum_name {
                Some(name) => Some(name.clone()),
                None => ENUM_ANOMALIES
                    .iter()
                    .find(|(class, name, _)| *class == class_name && *name == member.name)
                    .map(|(_, _, enum_name)| (*enum_name).to_string()),
            };
            if name.is_none() && !flags {
                return Err(unknown());
            }
            MemberLayout::Enum { name, storage, flags }
        }
        _ => return Err(unknown()),
    })
}

/// Decode the `__types__` section.
///
/// # Errors
/// Returns an error for truncated reflection data, unknown member layouts or
/// members naming classes that are not in the section.
pub fn read_types(layout: &PackfileLayout<'_>, section: usize) -> Result<PackfileTypes> {
    let offsets = match layout.pointer_width {
        PointerWidth::Four => &LAYOUT_32,
        PointerWidth::Eight => &LAYOUT_64,
    };
    let reader = ClassReader { layout, offsets };

    let mut enums = BTreeMap::new();
    let mut enum_names = HashMap::new();
    let mut classes = Vec::new();
    for offset in layout.objects_of_class(section, "hkClass")? {
        let at = Location { section, offset };
        classes.push(reader.read_class(at, &mut enums, &mut enum_names)?);
    }
    // Member enum pointers may refer to enums declared by any class.
    for class in &mut classes {
        for member in &mut class.members {
            let qualified = member.enum_name.as_ref().and_then(|n| enum_names.get(n)).cloned();
            if qualified.is_some() {
                member.enum_name = qualified;
            }
        }
    }

    let mut builder = TypeBuilder::new(layout.pointer_width);
    let types = builder.build(&classes)?;
    tracing::debug!(
        "Read {} classes, {} types, {} enums from packfile",
        classes.len(),
        types.len(),
        enums.len()
    );
    Ok(PackfileTypes { types, enums })
}

struct ClassReader<'l, 'a> {
    layout: &'l PackfileLayout<'a>,
    offsets: &'static ReflectionLayout,
}

impl ClassReader<'_, '_> {
    fn at(base: Location, field: u32) -> Location {
        Location {
            section: base.section,
            offset: base.offset + field,
        }
    }

    fn count(&self, at: Location) -> Result<u32> {
        let value = self.layout.read_i32(at)?;
        u32::try_from(value).map_err(|_| Error::malformed(format!("negative count {value}"), at.offset as usize))
    }

    /// Fails unless a table of `count` entries of `stride` bytes fits at `first`.
    fn check_table(&self, first: Location, count: u32, stride: u32) -> Result<()> {
        let span = usize::try_from(u64::from(count) * u64::from(stride))
            .map_err(|_| Error::malformed(format!("table of {count} entries is too large"), first.offset as usize))?;
        self.layout.bytes(first, span)?;
        Ok(())
    }

    /// Name of the reflection object a pointer at `at` refers to.
    fn pointee_name(&self, at: Location) -> Result<Option<String>> {
        match self.layout.pointer(at)? {
            Some(target) => self.layout.string_pointer(target),
            None => Ok(None),
        }
    }

    fn read_class(
        &self,
        at: Location,
        enums: &mut BTreeMap<String, Vec<EnumItem>>,
        enum_names: &mut HashMap<String, String>,
    ) -> Result<RawClass> {
        let o = self.offsets;
        let name = self
            .layout
            .string_pointer(at)?
            .ok_or_else(|| Error::malformed("hkClass without a name", at.offset as usize))?;
        let parent = self.pointee_name(Self::at(at, o.class_parent))?;
        let object_size = self.count(Self::at(at, o.class_object_size))?;
        let flags = self.layout.read_uint(Self::at(at, o.class_flags), 4)?;
        let version = self.count(Self::at(at, o.class_version))?;

        let num_enums = self.count(Self::at(at, o.class_num_enums))?;
        if let Some(first) = self.layout.pointer(Self::at(at, o.class_enums))? {
            self.check_table(first, num_enums, o.enum_size)?;
            for i in 0..num_enums {
                let enum_at = Location {
                    section: first.section,
                    offset: first.offset + i * o.enum_size,
                };
                let (enum_name, items) = self.read_enum(enum_at)?;
                let qualified = format!("{name}::{enum_name}");
                enum_names.entry(enum_name).or_insert_with(|| qualified.clone());
                enums.insert(qualified, items);
            }
        }

        let num_members = self.count(Self::at(at, o.class_num_members))?;
        let mut members = Vec::new();
        if let Some(first) = self.layout.pointer(Self::at(at, o.class_members))? {
            self.check_table(first, num_members, o.member_size)?;
            members.reserve(num_members as usize);
            for i in 0..num_members {
                let member_at = Location {
                    section: first.section,
                    offset: first.offset + i * o.member_size,
                };
                members.push(self.read_member(member_at)?);
            }
        }

        tracing::trace!("hkClass {name}: {} members, flags {flags:#x}", members.len());
        Ok(RawClass {
            name,
            parent,
            object_size,
            version,
            members,
        })
    }

    fn read_member(&self, at: Location) -> Result<RawMember> {
        let o = self.offsets;
        let name = self
            .layout
            .string_pointer(at)?
            .ok_or_else(|| Error::malformed("hkClassMember without a name", at.offset as usize))?;
        let codes = self.layout.bytes(Self::at(at, o.member_type), 2)?;
        Ok(RawMember {
            name,
            class: self.pointee_name(Self::at(at, o.member_class))?,
            enum_name: self.pointee_name(Self::at(at, o.member_enum))?,
            member_type: codes[0],
            subtype: codes[1],
            c_array_size: self.layout.read_uint(Self::at(at, o.member_c_array), 2)? as u16,
            flags: self.layout.read_uint(Self::at(at, o.member_flags), 2)? as u16,
            offset: self.layout.read_uint(Self::at(at, o.member_offset), 2)? as u16,
        })
    }

    fn read_enum(&self, at: Location) -> Result<(String, Vec<EnumItem>)> {
        let o = self.offsets;
        let name = self
            .layout
            .string_pointer(at)?
            .ok_or_else(|| Error::malformed("hkClassEnum without a name", at.offset as usize))?;
        let count = self.count(Self::at(at, o.enum_num_items))?;
        let mut items = Vec::new();
        if let Some(first) = self.layout.pointer(Self::at(at, o.enum_items))? {
            self.check_table(first, count, o.item_size)?;
            items.reserve(count as usize);
            for i in 0..count {
                let item_at = Location {
                    section: first.section,
                    offset: first.offset + i * o.item_size,
                };
                items.push(EnumItem {
                    value: self.layout.read_i32(item_at)?,
                    name: self.layout.string_pointer(Self::at(item_at, o.item_name))?.unwrap_or_default(),
                });
            }
        }
        Ok((name, items))
    }
}

/// Links raw classes into a [`TypeSet`], synthesizing builtins on demand.
struct TypeBuilder {
    set: TypeSet,
    width: u32,
    classes: HashMap<String, TypeIndex>,
    /// Synthesized types by layout.
    synthesized: HashMap<MemberLayout, TypeIndex>,
}

impl TypeBuilder {
    fn new(pointer_width: PointerWidth) -> Self {
        Self {
            set: TypeSet::new(),
            width: pointer_width.bytes(),
            classes: HashMap::new(),
            synthesized: HashMap::new(),
        }
    }

    fn build(&mut self, classes: &[RawClass]) -> Result<TypeSet> {
        for class in classes {
            let index = self.set.push(
                TypeDescriptor::new(class.name.clone())
                    .with_data_type(TagDataType::CLASS)
                    .with_version(class.version)
                    .with_size(class.object_size, 0),
            );
            self.classes.insert(class.name.clone(), index);
        }

        for class in classes {
            let index = self.classes[&class.name];
            if let Some(parent) = &class.parent {
                let parent = self.class(parent, &class.name)?;
                self.set.get_checked_mut(index)?.parent = Some(parent);
            }
            for raw in &class.members {
                let layout = classify_member(&class.name, raw)?;
                let type_index = self.ensure(&layout)?;
                let mut member = Member::new(raw.name.clone(), type_index, u32::from(raw.offset));
                if raw.flags & SERIALIZE_IGNORED != 0 {
                    member.flags = MemberFlags(MemberFlags::NOT_SERIALIZABLE);
                }
                let desc = self.set.get_checked_mut(index)?;
                desc.members.push(member);
            }
            if !class.members.is_empty() {
                self.set.get_checked_mut(index)?.format.insert(TagFormatFlags::MEMBERS);
            }
        }

        self.settle_alignment()?;
        Ok(std::mem::take(&mut self.set))
    }

    fn class(&self, name: &str, context: &str) -> Result<TypeIndex> {
        self.classes
            .get(name)
            .copied()
            .ok_or_else(|| Error::missing_type(name, format!("referenced by packfile class {context}")))
    }

    /// Type index for a member layout, synthesizing it on first use.
    fn ensure(&mut self, layout: &MemberLayout) -> Result<TypeIndex> {
        if let Some(&index) = self.synthesized.get(layout) {
            return Ok(index);
        }
        let w = self.width;

        let desc = match layout {
            MemberLayout::Builtin(name) => builtin_descriptor(self, name)?,
            MemberLayout::Struct(name) => return self.class(name, "member"),
            MemberLayout::PointerToStruct(class) => {
                let target = self.class(class, "pointer member")?;
                TypeDescriptor::new(format!("{class}*"))
                    .with_data_type(TagDataType::POINTER)
                    .with_pointer_type(target)
                    .with_size(w, w)
            }
            MemberLayout::PointerToVoid => TypeDescriptor::new("void*")
                .with_data_type(TagDataType::POINTER)
                .with_size(w, w),
            MemberLayout::String(name) => {
                let chr = self.ensure(&MemberLayout::Builtin("char"))?;
                TypeDescriptor::new(*name)
                    .with_data_type(TagDataType::STRING)
                    .with_pointer_type(chr)
                    .with_size(w, w)
            }
            MemberLayout::Array { container, element } => {
                let element = self.ensure(element)?;
                let (size, align) = match container {
                    Container::Array => (w + 8, w),
                    Container::SimpleArray => (2 * w, w),
                    Container::RelArray => (4, 2),
                    Container::HomogeneousArray => ((2 * w + 4).next_multiple_of(w), w),
                };
                TypeDescriptor::new(container.name())
                    .with_template("tT", TemplateValue::Type(Some(element)))
                    .with_data_type(TagDataType::ARRAY)
                    .with_pointer_type(element)
                    .with_size(size, align)
            }
            MemberLayout::Replicated { element, count } => {
                let element = self.ensure(element)?;
                let size = self.set.byte_size_of(element)? * count;
                let align = self.set.alignment_of(element)?;
                TypeDescriptor::new(format!("{}[{count}]", self.set.display_name(element)))
                    .with_data_type(TagDataType::tuple(*count))
                    .with_pointer_type(element)
                    .with_size(size, align)
            }
            MemberLayout::Enum { name, storage, flags } => {
                let storage_index = self.ensure(&MemberLayout::Builtin(*storage))?;
                match name {
                    Some(name) => TypeDescriptor::new(name.clone()).with_parent(storage_index),
                    None => {
                        let wrapper = if *flags { "hkFlags" } else { "hkEnum" };
                        TypeDescriptor::new(wrapper)
                            .with_parent(storage_index)
                            .with_template("tSTORAGE", TemplateValue::Type(Some(storage_index)))
                    }
                }
            }
            MemberLayout::Variant => {
                let object = self.ensure(&MemberLayout::PointerToVoid)?;
                let class = self.ensure(&MemberLayout::Builtin("hkUlong"))?;
                TypeDescriptor::new("hkVariant")
                    .with_data_type(TagDataType::CLASS)
                    .with_size(2 * w, w)
                    .with_member(Member::new("object", object, 0))
                    .with_member(Member::new("class", class, w))
            }
        };

        let index = self.set.push(desc);
        self.synthesized.insert(layout.clone(), index);
        Ok(index)
    }

    /// Give classes and replicated blocks the alignment of their widest member.
    fn settle_alignment(&mut self) -> Result<()> {
        for _ in 0..=self.set.len() {
            let mut changed = false;
            for index in 0..self.set.len() {
                let desc = self.set.get_checked(index)?;
                let alignment = match desc.own_kind() {
                    Some(TagKind::Class) => {
                        let mut alignment = desc.parent.map_or(Ok(1), |p| self.set.alignment_of(p))?;
                        for member in &desc.members {
                            alignment = alignment.max(self.set.alignment_of(member.type_index)?);
                        }
                        alignment.max(1)
                    }
                    Some(TagKind::Tuple) => match desc.pointer_type {
                        Some(element) => self.set.alignment_of(element)?.max(1),
                        None => continue,
                    },
                    _ => continue,
                };
                let desc = self.set.get_checked_mut(index)?;
                if desc.alignment != alignment {
                    desc.alignment = alignment;
                    changed = true;
                }
            }
            if !changed {
                return Ok(());
            }
        }
        Err(Error::InvalidFormat("class alignments do not settle".to_string()))
    }
}

/// Descriptor of a builtin primitive, float block or `char`.
fn builtin_descriptor(builder: &mut TypeBuilder, name: &str) -> Result<TypeDescriptor> {
    let w = builder.width;
    let (data_type, size, align) = match name {
        "void" => return Ok(TypeDescriptor::new("void").with_data_type(TagDataType::VOID)),
        "hkBool" => (TagDataType::BOOL8, 1, 1),
        "hkChar" | "char" => (TagDataType::CHAR, 1, 1),
        "hkInt8" => (TagDataType::int(1, true), 1, 1),
        "hkUint8" => (TagDataType::int(1, false), 1, 1),
        "hkInt16" => (TagDataType::int(2, true), 2, 2),
        "hkUint16" => (TagDataType::int(2, false), 2, 2),
        "hkInt32" => (TagDataType::int(4, true), 4, 4),
        "hkUint32" => (TagDataType::int(4, false), 4, 4),
        "hkInt64" => (TagDataType::int(8, true), 8, 8),
        "hkUint64" => (TagDataType::int(8, false), 8, 8),
        "hkUlong" => (TagDataType::int(w, false), w, w),
        "hkReal" => (TagDataType::FLOAT32, 4, 4),
        "hkHalf" => (TagDataType::FLOAT16, 2, 2),
        "hkVector4" | "hkQuaternion" | "hkMatrix3" | "hkRotation" | "hkQsTransform" | "hkMatrix4" | "hkTransform" => {
            let count = match name {
                "hkVector4" | "hkQuaternion" => 4,
                "hkMatrix4" | "hkTransform" => 16,
                _ => 12,
            };
            let real = builder.ensure(&MemberLayout::Builtin("hkReal"))?;
            return Ok(TypeDescriptor::new(name)
                .with_data_type(TagDataType::tuple(count))
                .with_pointer_type(real)
                .with_size(count * 4, 16));
        }
        other => return Err(Error::missing_type(other, "builtin packfile type")),
    };
    Ok(TypeDescriptor::new(name).with_data_type(data_type).with_size(size, align))
}
