//! Reflective type descriptors
//!
//! Havok describes every serialized type at runtime. A descriptor carries the
//! type's kind (via a raw tag data type word), its parent, members, pointer
//! target and layout. A tag format bitmask records which of those fields a
//! type declares itself; undeclared fields are inherited from the parent.

use serde::{Deserialize, Serialize};

/// Position of a type within a [`TypeSet`](super::TypeSet) (0-based).
pub type TypeIndex = usize;

/// Bitmask of the fields a type body declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TagFormatFlags(pub u32);

impl TagFormatFlags {
    pub const SUB_TYPE: u32 = 0x01;
    pub const POINTER: u32 = 0x02;
    pub const VERSION: u32 = 0x04;
    pub const BYTE_SIZE: u32 = 0x08;
    pub const ABSTRACT_VALUE: u32 = 0x10;
    pub const MEMBERS: u32 = 0x20;
    pub const INTERFACES: u32 = 0x40;
    pub const UNKNOWN: u32 = 0x80;

    #[must_use]
    pub const fn contains(self, bits: u32) -> bool {
        self.0 & bits == bits
    }

    pub fn insert(&mut self, bits: u32) {
        self.0 |= bits;
    }

    pub fn remove(&mut self, bits: u32) {
        self.0 &= !bits;
    }
}

/// Kind of data a type holds, decoded from the low byte of [`TagDataType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TagKind {
    Void,
    Invalid,
    Bool,
    /// Signed 8-bit integer data (`char`, `hkInt8`).
    Char,
    Int,
    Float,
    String,
    Pointer,
    Class,
    Array,
    Tuple,
}

impl TagKind {
    /// Scalar kinds that never need an item of their own.
    #[must_use]
    pub const fn is_primitive(self) -> bool {
        matches!(self, Self::Void | Self::Bool | Self::Char | Self::Int | Self::Float)
    }
}

/// Raw tag data type word.
///
/// Low six bits are the kind. Integers carry size and sign bits, tuples carry their
/// element count in the upper bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TagDataType(pub u32);

impl TagDataType {
    pub const VOID: Self = Self(0x00);
    pub const INVALID: Self = Self(0x01);
    pub const BOOL: Self = Self(0x02);
    pub const STRING: Self = Self(0x03);
    pub const INT: Self = Self(0x04);
    pub const FLOAT: Self = Self(0x05);
    pub const POINTER: Self = Self(0x06);
    pub const CLASS: Self = Self(0x07);
    pub const ARRAY: Self = Self(0x08);
    pub const TUPLE: Self = Self(0x28);

    pub const IS_SIGNED: u32 = 0x200;
    pub const INT8: u32 = 0x2000;
    pub const INT16: u32 = 0x4000;
    pub const INT32: u32 = 0x8000;
    pub const INT64: u32 = 0x10000;
    const INT_SIZE_MASK: u32 = Self::INT8 | Self::INT16 | Self::INT32 | Self::INT64;
    /// Kind bits. Bit 0x40 marks an explicit float format and is not part of the kind.
    const KIND_MASK: u32 = 0x3F;

    /// `hkReal`
    pub const FLOAT32: Self = Self(0x1745);
    /// `hkHalf`
    pub const FLOAT16: Self = Self(0x0A45);
    /// `hkBool`
    pub const BOOL8: Self = Self(Self::BOOL.0 | Self::INT8);
    /// `char`
    pub const CHAR: Self = Self(Self::INT.0 | Self::INT8 | Self::IS_SIGNED);

    /// Integer of `bytes` width (1, 2, 4 or 8).
    #[must_use]
    pub const fn int(bytes: u32, signed: bool) -> Self {
        let size = match bytes {
            1 => Self::INT8,
            2 => Self::INT16,
            4 => Self::INT32,
            _ => Self::INT64,
        };
        let sign = if signed { Self::IS_SIGNED } else { 0 };
        Self(Self::INT.0 | size | sign)
    }

    /// Fixed tuple of `count` elements.
    #[must_use]
    pub const fn tuple(count: u32) -> Self {
        Self(Self::TUPLE.0 | (count << 8))
    }

    #[must_use]
    pub const fn kind(self) -> TagKind {
        match self.0 & Self::KIND_MASK {
            0x00 => TagKind::Void,
            0x02 => TagKind::Bool,
            0x03 => TagKind::String,
            0x04 => {
                if self.0 & Self::INT_SIZE_MASK == Self::INT8 && self.0 & Self::IS_SIGNED != 0 {
                    TagKind::Char
                } else {
                    TagKind::Int
                }
            }
            0x05 => TagKind::Float,
            0x06 => TagKind::Pointer,
            0x07 => TagKind::Class,
            0x08 => TagKind::Array,
            0x28 => TagKind::Tuple,
            _ => TagKind::Invalid,
        }
    }

    #[must_use]
    pub const fn is_signed(self) -> bool {
        self.0 & Self::IS_SIGNED != 0
    }

    /// Integer width in bytes from the size bits, if present.
    #[must_use]
    pub const fn int_bytes(self) -> Option<u32> {
        match self.0 & Self::INT_SIZE_MASK {
            Self::INT8 => Some(1),
            Self::INT16 => Some(2),
            Self::INT32 => Some(4),
            Self::INT64 => Some(8),
            _ => None,
        }
    }

    /// Element count of a tuple.
    #[must_use]
    pub const fn tuple_count(self) -> u32 {
        self.0 >> 8
    }
}

/// Member flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MemberFlags(pub u32);

impl MemberFlags {
    pub const NOT_SERIALIZABLE: u32 = 0x01;
    pub const PROTECTED: u32 = 0x02;
    pub const PRIVATE: u32 = 0x04;
    pub const HIDDEN: u32 = 0x08;
    pub const PROPERTY: u32 = 0x10;
    pub const FIELD: u32 = 0x20;
    pub const CUSTOM_SETTER: u32 = 0x40;

    #[must_use]
    pub const fn contains(self, bits: u32) -> bool {
        self.0 & bits == bits
    }
}

/// Value of a template parameter. Names starting with `t` carry a type,
/// names starting with `v` carry an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemplateValue {
    Type(Option<TypeIndex>),
    Value(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateParam {
    pub name: String,
    pub value: TemplateValue,
}

impl TemplateParam {
    /// Build from a raw wire pair, using the name prefix to pick the value kind.
    #[must_use]
    pub fn from_raw(name: String, raw: u32) -> Self {
        let value = if name.starts_with('t') {
            TemplateValue::Type(if raw == 0 { None } else { Some(raw as usize - 1) })
        } else {
            TemplateValue::Value(raw)
        };
        Self { name, value }
    }

    /// Wire value: 1-based type index or the integer itself.
    #[must_use]
    pub fn raw(&self) -> u32 {
        match self.value {
            TemplateValue::Type(Some(index)) => index as u32 + 1,
            TemplateValue::Type(None) => 0,
            TemplateValue::Value(value) => value,
        }
    }
}

/// A member (field) of a class type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Member {
    pub name: String,
    pub flags: MemberFlags,
    /// Byte offset within the declaring type.
    pub offset: u32,
    pub type_index: TypeIndex,
    /// Structural hash override.
    pub hash: Option<u32>,
}

impl Member {
    #[must_use]
    pub fn new(name: impl Into<String>, type_index: TypeIndex, offset: u32) -> Self {
        Self {
            name: name.into(),
            flags: MemberFlags::default(),
            offset,
            type_index,
            hash: None,
        }
    }

    #[must_use]
    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = MemberFlags(flags);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interface {
    pub type_index: TypeIndex,
    pub value: u32,
}

/// Reflective definition of one engine type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeDescriptor {
    /// Engine name without template arguments (e.g. `hkArray`).
    pub name: String,
    pub template_params: Vec<TemplateParam>,
    pub parent: Option<TypeIndex>,
    pub format: TagFormatFlags,
    /// Meaningful when `format` declares `SUB_TYPE`.
    pub data_type: TagDataType,
    pub pointer_type: Option<TypeIndex>,
    pub version: Option<u32>,
    pub byte_size: u32,
    pub alignment: u32,
    pub abstract_value: Option<u32>,
    pub members: Vec<Member>,
    pub interfaces: Vec<Interface>,
    pub hash: Option<u32>,
}

impl TypeDescriptor {
    /// A bare named type declaring nothing.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template_params: Vec::new(),
            parent: None,
            format: TagFormatFlags::default(),
            data_type: TagDataType::VOID,
            pointer_type: None,
            version: None,
            byte_size: 0,
            alignment: 0,
            abstract_value: None,
            members: Vec::new(),
            interfaces: Vec::new(),
            hash: None,
        }
    }

    #[must_use]
    pub fn with_parent(mut self, parent: TypeIndex) -> Self {
        self.parent = Some(parent);
        self
    }

    #[must_use]
    pub fn with_data_type(mut self, data_type: TagDataType) -> Self {
        self.data_type = data_type;
        self.format.insert(TagFormatFlags::SUB_TYPE);
        self
    }

    #[must_use]
    pub fn with_pointer_type(mut self, target: TypeIndex) -> Self {
        self.pointer_type = Some(target);
        self.format.insert(TagFormatFlags::POINTER);
        self
    }

    #[must_use]
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self.format.insert(TagFormatFlags::VERSION);
        self
    }

    #[must_use]
    pub fn with_size(mut self, byte_size: u32, alignment: u32) -> Self {
        self.byte_size = byte_size;
        self.alignment = alignment;
        self.format.insert(TagFormatFlags::BYTE_SIZE);
        self
    }

    #[must_use]
    pub fn with_member(mut self, member: Member) -> Self {
        self.members.push(member);
        self.format.insert(TagFormatFlags::MEMBERS);
        self
    }

    #[must_use]
    pub fn with_template(mut self, name: impl Into<String>, value: TemplateValue) -> Self {
        self.template_params.push(TemplateParam {
            name: name.into(),
            value,
        });
        self
    }

    #[must_use]
    pub fn with_interface(mut self, type_index: TypeIndex, value: u32) -> Self {
        self.interfaces.push(Interface { type_index, value });
        self.format.insert(TagFormatFlags::INTERFACES);
        self
    }

    #[must_use]
    pub fn with_hash(mut self, hash: u32) -> Self {
        self.hash = Some(hash);
        self
    }

    /// Kind this type declares itself, if any.
    #[must_use]
    pub fn own_kind(&self) -> Option<TagKind> {
        self.format
            .contains(TagFormatFlags::SUB_TYPE)
            .then(|| self.data_type.kind())
    }

    #[must_use]
    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.name == name)
    }

    #[must_use]
    pub fn member_mut(&mut self, name: &str) -> Option<&mut Member> {
        self.members.iter_mut().find(|m| m.name == name)
    }

    /// Set byte size and alignment, declaring them in the format flags.
    pub fn set_size(&mut self, byte_size: u32, alignment: u32) {
        self.byte_size = byte_size;
        self.alignment = alignment;
        self.format.insert(TagFormatFlags::BYTE_SIZE);
    }

    /// Every type index this descriptor refers to.
    pub fn referenced_types(&self) -> impl Iterator<Item = TypeIndex> + '_ {
        let templates = self.template_params.iter().filter_map(|p| match p.value {
            TemplateValue::Type(index) => index,
            TemplateValue::Value(_) => None,
        });
        self.parent
            .into_iter()
            .chain(self.pointer_type)
            .chain(self.members.iter().map(|m| m.type_index))
            .chain(self.interfaces.iter().map(|i| i.type_index))
            .chain(templates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_kinds() {
        assert_eq!(TagDataType::FLOAT32.kind(), TagKind::Float);
        assert_eq!(TagDataType::FLOAT16.kind(), TagKind::Float);
        assert_eq!(TagDataType::BOOL8.kind(), TagKind::Bool);
        assert_eq!(TagDataType::CHAR.kind(), TagKind::Char);
        assert_eq!(TagDataType::int(1, false).kind(), TagKind::Int);
        assert_eq!(TagDataType::int(4, true).int_bytes(), Some(4));
        assert!(TagDataType::int(8, true).is_signed());
        assert_eq!(TagDataType(0x99).kind(), TagKind::Invalid);
    }

    #[test]
    fn test_tuple_count() {
        let tuple = TagDataType::tuple(12);
        assert_eq!(tuple.kind(), TagKind::Tuple);
        assert_eq!(tuple.tuple_count(), 12);
    }

    #[test]
    fn test_builders_set_format_flags() {
        let desc = TypeDescriptor::new("hkaBone")
            .with_data_type(TagDataType::CLASS)
            .with_version(1)
            .with_size(16, 8)
            .with_member(Member::new("name", 3, 0));
        assert!(desc.format.contains(TagFormatFlags::SUB_TYPE | TagFormatFlags::VERSION));
        assert!(desc.format.contains(TagFormatFlags::BYTE_SIZE | TagFormatFlags::MEMBERS));
        assert!(!desc.format.contains(TagFormatFlags::POINTER));
        assert_eq!(desc.own_kind(), Some(TagKind::Class));
        assert_eq!(TypeDescriptor::new("hkEnum").own_kind(), None);
    }

    #[test]
    fn test_template_param_raw() {
        let param = TemplateParam::from_raw("tT".to_string(), 5);
        assert_eq!(param.value, TemplateValue::Type(Some(4)));
        assert_eq!(param.raw(), 5);

        let param = TemplateParam::from_raw("vN".to_string(), 12);
        assert_eq!(param.value, TemplateValue::Value(12));
        assert_eq!(param.raw(), 12);
    }

    #[test]
    fn test_referenced_types() {
        let desc = TypeDescriptor::new("hkArray")
            .with_parent(1)
            .with_pointer_type(2)
            .with_member(Member::new("m_data", 3, 0))
            .with_template("tT", TemplateValue::Type(Some(2)))
            .with_template("vN", TemplateValue::Value(4));
        let refs: Vec<_> = desc.referenced_types().collect();
        assert_eq!(refs, vec![1, 2, 3, 2]);
    }
}
