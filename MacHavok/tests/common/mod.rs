//! Shared fixtures for the integration tests: a small schema builder, the
//! Container/Node graph, and a byte-level packfile builder.

#![allow(dead_code)]

use byteorder::{ByteOrder, LittleEndian};
use indexmap::IndexMap;
use machavok::graph::{HkObject, ObjectGraph, ObjectId, Value};
use machavok::tagfile::section::Section;
use machavok::types::{Member, TagDataType, TypeDescriptor, TypeIndex, TypeSet, resize_type};
use std::collections::HashMap;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Builds a [`TypeSet`] with laid-out classes.
#[derive(Default)]
pub struct SchemaBuilder {
    pub set: TypeSet,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn int(&mut self, name: &str, bytes: u32, signed: bool) -> TypeIndex {
        self.set
            .push(TypeDescriptor::new(name).with_data_type(TagDataType::int(bytes, signed)).with_size(bytes, bytes))
    }

    pub fn real(&mut self) -> TypeIndex {
        self.set.push(TypeDescriptor::new("hkReal").with_data_type(TagDataType::FLOAT32).with_size(4, 4))
    }

    pub fn string(&mut self) -> TypeIndex {
        let chr = self.set.push(TypeDescriptor::new("char").with_data_type(TagDataType::CHAR).with_size(1, 1));
        self.set.push(
            TypeDescriptor::new("hkStringPtr")
                .with_data_type(TagDataType::STRING)
                .with_pointer_type(chr)
                .with_size(8, 8),
        )
    }

    pub fn vector4(&mut self, real: TypeIndex) -> TypeIndex {
        self.set.push(
            TypeDescriptor::new("hkVector4")
                .with_data_type(TagDataType::tuple(4))
                .with_pointer_type(real)
                .with_size(16, 16),
        )
    }

    /// An empty class to be filled with [`members`](Self::members).
    pub fn class(&mut self, name: &str, alignment: u32) -> TypeIndex {
        self.set
            .push(TypeDescriptor::new(name).with_data_type(TagDataType::CLASS).with_size(0, alignment))
    }

    pub fn pointer(&mut self, target: TypeIndex) -> TypeIndex {
        let name = format!("{}*", self.set.display_name(target));
        self.set.push(
            TypeDescriptor::new(name)
                .with_data_type(TagDataType::POINTER)
                .with_pointer_type(target)
                .with_size(8, 8),
        )
    }

    pub fn array(&mut self, element: TypeIndex) -> TypeIndex {
        self.set.push(
            TypeDescriptor::new("hkArray")
                .with_template("tT", machavok::types::TemplateValue::Type(Some(element)))
                .with_data_type(TagDataType::ARRAY)
                .with_pointer_type(element)
                .with_size(16, 8),
        )
    }

    /// Attach members and lay the class out.
    pub fn members(&mut self, class: TypeIndex, members: &[(&str, TypeIndex)]) {
        let desc = self.set.get_mut(class).expect("class index");
        for (name, type_index) in members {
            desc.members.push(Member::new(*name, *type_index, 0));
        }
        desc.format.insert(machavok::types::TagFormatFlags::MEMBERS);
        resize_type(&mut self.set, class, None).expect("layout");
    }

    pub fn finish(self) -> TypeSet {
        self.set
    }
}

/// Indices of the Container/Node schema.
pub struct ContainerSchema {
    pub types: TypeSet,
    pub node: TypeIndex,
    pub container: TypeIndex,
}

/// `Node { name: hkStringPtr, value: int, next: Node* }`,
/// `Container { nodes: hkArray<Node*>, weights: hkArray<hkReal>, origin: hkVector4 }`.
pub fn container_schema() -> ContainerSchema {
    let mut b = SchemaBuilder::new();
    let int = b.int("int", 4, true);
    let real = b.real();
    let string = b.string();
    let vec4 = b.vector4(real);
    let node = b.class("Node", 8);
    let node_ptr = b.pointer(node);
    b.members(node, &[("name", string), ("value", int), ("next", node_ptr)]);
    let nodes = b.array(node_ptr);
    let weights = b.array(real);
    let container = b.class("Container", 16);
    b.members(container, &[("nodes", nodes), ("weights", weights), ("origin", vec4)]);
    ContainerSchema {
        types: b.finish(),
        node,
        container,
    }
}

fn fields(entries: Vec<(&str, Value)>) -> Value {
    Value::Struct(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect::<IndexMap<_, _>>())
}

/// Root container holding slots `[first, second, first]`; `first.next` is `second`.
pub fn container_graph(schema: &ContainerSchema) -> ObjectGraph {
    let first = ObjectId(1);
    let second = ObjectId(2);
    let mut graph = ObjectGraph::new(HkObject::new(
        schema.container,
        fields(vec![
            (
                "nodes",
                Value::Array(vec![
                    Value::Pointer(Some(first)),
                    Value::Pointer(Some(second)),
                    Value::Pointer(Some(first)),
                ]),
            ),
            ("weights", Value::Array(vec![Value::Float(0.5), Value::Float(-1.25)])),
            (
                "origin",
                Value::Tuple([1.0, 2.0, 3.0, 1.0].into_iter().map(Value::Float).collect()),
            ),
        ]),
    ));
    graph.add(HkObject::new(
        schema.node,
        fields(vec![
            ("name", Value::String(Some("first".to_string()))),
            ("value", Value::Int(10)),
            ("next", Value::Pointer(Some(second))),
        ]),
    ));
    graph.add(HkObject::new(
        schema.node,
        fields(vec![
            ("name", Value::String(Some("second".to_string()))),
            ("value", Value::Int(-20)),
            ("next", Value::Pointer(None)),
        ]),
    ));
    graph
}

/// Payload of a top-level section of a tagfile.
pub fn tagfile_section<'a>(bytes: &'a [u8], tag: &[u8; 4]) -> &'a [u8] {
    let root = Section::read(bytes, 0).expect("TAG0 section");
    root.child(bytes, tag).expect("child section").payload(bytes)
}

fn leaf(tag: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = (0x4000_0000 | (8 + payload.len() as u32)).to_be_bytes().to_vec();
    out.extend_from_slice(tag);
    out.extend_from_slice(payload);
    out
}

fn node(tag: &[u8; 4], children: &[Vec<u8>]) -> Vec<u8> {
    let body = children.concat();
    let mut out = (8 + body.len() as u32).to_be_bytes().to_vec();
    out.extend_from_slice(tag);
    out.extend_from_slice(&body);
    out
}

/// A 2018 tagfile written byte by byte: `int` and `Counter { value: int }`,
/// with a single Counter object holding `value`.
pub fn counter_tagfile(value: i32) -> Vec<u8> {
    let mut data = value.to_le_bytes().to_vec();
    data.resize(16, 0);

    #[rustfmt::skip]
    let bodies = [
        // int: SUB_TYPE | BYTE_SIZE, signed 32-bit integer, 4/4
        0x01, 0x00, 0x09, 0xC0, 0x82, 0x04, 0x04, 0x04,
        // Counter: SUB_TYPE | BYTE_SIZE | MEMBERS, class, 4/4, one member
        0x02, 0x00, 0x29, 0x07, 0x04, 0x04, 0x01,
        // value: field 0, no flags, offset 0, type int
        0x00, 0x00, 0x00, 0x01,
    ];

    let mut items = vec![0u8; 12];
    for word in [2 | (1 << 28), 0, 1u32] {
        items.extend_from_slice(&word.to_le_bytes());
    }

    node(
        b"TAG0",
        &[
            leaf(b"SDKV", b"20180100"),
            leaf(b"DATA", &data),
            node(
                b"TYPE",
                &[
                    leaf(b"TPTR", &[0; 24]),
                    leaf(b"TSTR", b"int\0Counter\0"),
                    // three entries (null + 2), each a name index and no template parameters
                    leaf(b"TNAM", &[0x03, 0x00, 0x00, 0x01, 0x00]),
                    leaf(b"FSTR", b"value\0"),
                    leaf(b"TBOD", &bodies),
                    leaf(b"THSH", &[0x00]),
                    leaf(b"TPAD", &[]),
                ],
            ),
            node(b"INDX", &[leaf(b"ITEM", &items), leaf(b"PTCH", &[])]),
        ],
    )
}

// ---------------------------------------------------------------------------
// Packfile builder
// ---------------------------------------------------------------------------

pub const CLASSNAMES: u32 = 0;
pub const TYPES: u32 = 1;
pub const DATA: u32 = 2;

/// `hkClassMember::Type` codes used by the fixtures.
pub mod code {
    pub const VOID: u8 = 0;
    pub const INT8: u8 = 3;
    pub const INT32: u8 = 7;
    pub const REAL: u8 = 11;
    pub const VECTOR4: u8 = 12;
    pub const POINTER: u8 = 20;
    pub const ARRAY: u8 = 22;
    pub const ENUM: u8 = 24;
    pub const STRUCT: u8 = 25;
    pub const HOMOGENEOUS_ARRAY: u8 = 27;
    pub const STRING_PTR: u8 = 33;
}

pub struct MemberSpec {
    pub name: &'static str,
    pub class: Option<&'static str>,
    pub enum_name: Option<&'static str>,
    pub member_type: u8,
    pub subtype: u8,
    pub offset: u16,
}

impl MemberSpec {
    pub fn new(name: &'static str, member_type: u8, subtype: u8, offset: u16) -> Self {
        Self {
            name,
            class: None,
            enum_name: None,
            member_type,
            subtype,
            offset,
        }
    }

    pub fn class(mut self, class: &'static str) -> Self {
        self.class = Some(class);
        self
    }

    pub fn enumeration(mut self, name: &'static str) -> Self {
        self.enum_name = Some(name);
        self
    }
}

pub struct ClassSpec {
    pub name: &'static str,
    pub parent: Option<&'static str>,
    pub object_size: u32,
    pub version: u32,
    pub enums: Vec<(&'static str, Vec<(i32, &'static str)>)>,
    pub members: Vec<MemberSpec>,
}

struct PackSection {
    tag: &'static str,
    data: Vec<u8>,
    local: Vec<(u32, u32)>,
    global: Vec<(u32, u32, u32)>,
    virtuals: Vec<(u32, u32, u32)>,
}

impl PackSection {
    fn new(tag: &'static str) -> Self {
        Self {
            tag,
            data: Vec::new(),
            local: Vec::new(),
            global: Vec::new(),
            virtuals: Vec::new(),
        }
    }

    fn reserve(&mut self, size: u32, align: u32) -> u32 {
        let at = (self.data.len() as u32).next_multiple_of(align);
        self.data.resize((at + size) as usize, 0);
        at
    }

    fn c_string(&mut self, value: &str) -> u32 {
        let at = self.data.len() as u32;
        self.data.extend_from_slice(value.as_bytes());
        self.data.push(0);
        at
    }

    fn put(&mut self, at: u32, value: u64, size: usize) {
        LittleEndian::write_uint(&mut self.data[at as usize..], value, size);
    }

    fn encode(&self) -> (Vec<u8>, [u32; 6]) {
        fn pad(out: &mut Vec<u8>) {
            while out.len() % 16 != 0 {
                out.push(0xFF);
            }
        }
        let mut out = self.data.clone();
        while out.len() % 16 != 0 {
            out.push(0);
        }
        let local = out.len() as u32;
        for (src, dst) in &self.local {
            out.extend_from_slice(&src.to_le_bytes());
            out.extend_from_slice(&dst.to_le_bytes());
        }
        pad(&mut out);
        let global = out.len() as u32;
        for (src, section, dst) in &self.global {
            for v in [src, section, dst] {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        pad(&mut out);
        let virtuals = out.len() as u32;
        for (src, section, name) in &self.virtuals {
            for v in [src, section, name] {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        pad(&mut out);
        let end = out.len() as u32;
        (out, [local, global, virtuals, end, end, end])
    }
}

/// Writes a packfile with `__classnames__`, `__types__` and `__data__`.
pub struct PackfileBuilder {
    pub width: u32,
    pub file_version: i32,
    pub little_endian: bool,
    sections: Vec<PackSection>,
    class_names: HashMap<String, u32>,
    classes: HashMap<&'static str, u32>,
}

impl PackfileBuilder {
    pub fn new(width: u32, file_version: i32) -> Self {
        Self {
            width,
            file_version,
            little_endian: true,
            sections: vec![PackSection::new("__classnames__"), PackSection::new("__types__"), PackSection::new("__data__")],
            class_names: HashMap::new(),
            classes: HashMap::new(),
        }
    }

    fn section(&mut self, index: u32) -> &mut PackSection {
        &mut self.sections[index as usize]
    }

    /// Offset of `name` in `__classnames__`, adding the entry on first use.
    pub fn class_name(&mut self, name: &str) -> u32 {
        if let Some(&at) = self.class_names.get(name) {
            return at;
        }
        let names = self.section(CLASSNAMES);
        names.data.extend_from_slice(&0u32.to_le_bytes());
        names.data.push(0x09);
        let at = names.c_string(name);
        self.class_names.insert(name.to_string(), at);
        at
    }

    /// A pointer at `at` in `section` to a string written into the same section.
    fn local_string(&mut self, section: u32, at: u32, value: &str) {
        let s = self.section(section);
        let target = s.c_string(value);
        s.local.push((at, target));
    }

    fn local_pointer(&mut self, section: u32, at: u32, target: u32) {
        self.section(section).local.push((at, target));
    }

    /// Write `hkClass` tables for `classes` into `__types__`.
    pub fn write_classes(&mut self, classes: &[ClassSpec]) {
        let w = self.width;
        let wide = w == 8;
        let class_size = if wide { 80 } else { 48 };
        let member_size = if wide { 40 } else { 24 };
        let enum_size = if wide { 40 } else { 20 };
        let item_size = if wide { 16 } else { 8 };
        let (parent_at, size_at, enums_at, num_enums_at, members_at, num_members_at, flags_at, version_at) =
            if wide { (8, 16, 24, 32, 40, 48, 72, 76) } else { (4, 8, 16, 20, 24, 28, 40, 44) };
        let (m_class, m_enum, m_type, m_carray, m_flags, m_offset) =
            if wide { (8, 16, 24, 26, 28, 30) } else { (4, 8, 12, 14, 16, 18) };

        let hk_class = self.class_name("hkClass");
        for class in classes {
            let at = self.section(TYPES).reserve(class_size, 16);
            self.section(TYPES).virtuals.push((at, CLASSNAMES, hk_class));
            self.classes.insert(class.name, at);
        }

        for class in classes {
            let at = self.classes[class.name];
            self.local_string(TYPES, at, class.name);
            if let Some(parent) = class.parent {
                let parent_class = self.classes[parent];
                self.local_pointer(TYPES, at + parent_at, parent_class);
            }
            self.section(TYPES).put(at + size_at, u64::from(class.object_size), 4);
            self.section(TYPES).put(at + flags_at, 0, 4);
            self.section(TYPES).put(at + version_at, u64::from(class.version), 4);

            let mut enum_offsets = HashMap::new();
            if !class.enums.is_empty() {
                let table = self.section(TYPES).reserve(enum_size * class.enums.len() as u32, 16);
                self.local_pointer(TYPES, at + enums_at, table);
                self.section(TYPES).put(at + num_enums_at, class.enums.len() as u64, 4);
                for (i, (name, items)) in class.enums.iter().enumerate() {
                    let enum_at = table + i as u32 * enum_size;
                    enum_offsets.insert(*name, enum_at);
                    self.local_string(TYPES, enum_at, name);
                    let items_at = self.section(TYPES).reserve(item_size * items.len() as u32, 16);
                    self.local_pointer(TYPES, enum_at + w, items_at);
                    self.section(TYPES).put(enum_at + 2 * w, items.len() as u64, 4);
                    for (j, (value, item_name)) in items.iter().enumerate() {
                        let item_at = items_at + j as u32 * item_size;
                        self.section(TYPES).put(item_at, *value as u32 as u64, 4);
                        self.local_string(TYPES, item_at + w, item_name);
                    }
                }
            }

            if !class.members.is_empty() {
                let table = self.section(TYPES).reserve(member_size * class.members.len() as u32, 16);
                self.local_pointer(TYPES, at + members_at, table);
                self.section(TYPES).put(at + num_members_at, class.members.len() as u64, 4);
                for (i, member) in class.members.iter().enumerate() {
                    let member_at = table + i as u32 * member_size;
                    self.local_string(TYPES, member_at, member.name);
                    if let Some(target) = member.class {
                        let target = self.classes[target];
                        self.local_pointer(TYPES, member_at + m_class, target);
                    }
                    if let Some(name) = member.enum_name {
                        let target = enum_offsets[name];
                        self.local_pointer(TYPES, member_at + m_enum, target);
                    }
                    let s = self.section(TYPES);
                    s.put(member_at + m_type, u64::from(member.member_type), 1);
                    s.put(member_at + m_type + 1, u64::from(member.subtype), 1);
                    s.put(member_at + m_carray, 0, 2);
                    s.put(member_at + m_flags, 0, 2);
                    s.put(member_at + m_offset, u64::from(member.offset), 2);
                }
            }
        }
    }

    /// Reserve an object of `class` in `__data__`.
    pub fn object(&mut self, class: &str, size: u32) -> u32 {
        let name = self.class_name(class);
        let data = self.section(DATA);
        let at = data.reserve(size, 16);
        data.virtuals.push((at, CLASSNAMES, name));
        at
    }

    pub fn put(&mut self, at: u32, value: u64, size: usize) {
        self.section(DATA).put(at, value, size);
    }

    pub fn put_f32(&mut self, at: u32, value: f32) {
        self.put(at, u64::from(value.to_bits()), 4);
    }

    /// Object pointer at `at` to the object at `target`.
    pub fn pointer(&mut self, at: u32, target: u32) {
        self.section(DATA).global.push((at, DATA, target));
    }

    pub fn string(&mut self, at: u32, value: &str) {
        self.local_string(DATA, at, value);
    }

    /// `hkArray` header at `at` with `count` elements of `stride` bytes.
    /// Returns the offset of the element storage.
    pub fn array(&mut self, at: u32, count: u32, stride: u32) -> u32 {
        let w = self.width;
        let data = self.section(DATA);
        let storage = data.reserve(count * stride, 16);
        data.local.push((at, storage));
        data.put(at + w, u64::from(count), 4);
        data.put(at + w + 4, u64::from(0x8000_0000 | count), 4);
        storage
    }

    /// `hkHomogeneousArray` at `at` whose elements are `class` objects of
    /// `stride` bytes. Returns the offset of the element storage.
    pub fn homogeneous_array(&mut self, at: u32, class: &str, count: u32, stride: u32) -> u32 {
        let w = self.width;
        let class_at = self.classes[class];
        let data = self.section(DATA);
        data.global.push((at, TYPES, class_at));
        let storage = data.reserve(count * stride, 16);
        data.local.push((at + w, storage));
        data.put(at + 2 * w, u64::from(count), 4);
        storage
    }

    /// Assemble the file; the contents object is at `contents` in `__data__`.
    pub fn build(&mut self, contents: u32, contents_class: &str) -> Vec<u8> {
        let class_name = self.class_name(contents_class);
        let extended = self.file_version >= 11;
        let header_size = if extended { 80 } else { 64 };
        let section_header_size = if extended { 64 } else { 48 };

        let mut out = Vec::new();
        out.extend_from_slice(&0x57E0_E057u32.to_le_bytes());
        out.extend_from_slice(&0x10C0_C010u32.to_le_bytes());
        out.extend_from_slice(&0i32.to_le_bytes());
        out.extend_from_slice(&self.file_version.to_le_bytes());
        out.extend_from_slice(&[self.width as u8, u8::from(self.little_endian), 0, 1]);
        out.extend_from_slice(&(self.sections.len() as u32).to_le_bytes());
        for v in [DATA, contents, CLASSNAMES, class_name] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        let mut version = b"hk_2010.2.0-r1\0".to_vec();
        version.resize(16, 0xFF);
        out.extend_from_slice(&version);
        out.extend_from_slice(&0i32.to_le_bytes());
        out.extend_from_slice(&(-1i16).to_le_bytes());
        out.extend_from_slice(&0xFFFFu16.to_le_bytes());
        out.resize(header_size, 0);

        let encoded: Vec<_> = self.sections.iter().map(PackSection::encode).collect();
        let mut start = header_size + self.sections.len() * section_header_size;
        for (section, (bytes, offsets)) in self.sections.iter().zip(&encoded) {
            let mut tag = section.tag.as_bytes().to_vec();
            tag.push(0);
            tag.resize(20, 0xFF);
            out.extend_from_slice(&tag);
            out.extend_from_slice(&(start as u32).to_le_bytes());
            for offset in offsets {
                out.extend_from_slice(&offset.to_le_bytes());
            }
            out.resize(out.len() + (section_header_size - 48), 0xFF);
            start += bytes.len();
        }
        for (bytes, _) in &encoded {
            out.extend_from_slice(bytes);
        }
        out
    }
}

/// Member offsets of the packfile fixture for a pointer width.
pub struct PackfileLayout {
    pub node_size: u32,
    pub node_value: u32,
    pub node_next: u32,
    pub weights: u32,
    pub origin: u32,
    pub mode: u32,
    pub container_size: u32,
}

pub fn packfile_layout(width: u32) -> PackfileLayout {
    let w = width;
    let node_next = (w + 4).next_multiple_of(w);
    PackfileLayout {
        node_size: node_next + w,
        node_value: w,
        node_next,
        weights: w + 8,
        origin: (2 * (w + 8)).next_multiple_of(16),
        mode: (2 * (w + 8)).next_multiple_of(16) + 16,
        container_size: ((2 * (w + 8)).next_multiple_of(16) + 17).next_multiple_of(16),
    }
}

/// The Container/Node scenario as a packfile, plus an enum member.
///
/// With `with_classes` false the `__types__` section stays empty.
pub fn container_packfile(width: u32, file_version: i32, with_classes: bool) -> Vec<u8> {
    let l = packfile_layout(width);
    let mut b = PackfileBuilder::new(width, file_version);
    if with_classes {
        b.write_classes(&[
            ClassSpec {
                name: "Node",
                parent: None,
                object_size: l.node_size,
                version: 1,
                enums: Vec::new(),
                members: vec![
                    MemberSpec::new("name", code::STRING_PTR, code::VOID, 0),
                    MemberSpec::new("value", code::INT32, code::VOID, l.node_value as u16),
                    MemberSpec::new("next", code::POINTER, code::STRUCT, l.node_next as u16).class("Node"),
                ],
            },
            ClassSpec {
                name: "Container",
                parent: None,
                object_size: l.container_size,
                version: 2,
                enums: vec![("Mode", vec![(0, "MODE_NONE"), (2, "MODE_LOOP")])],
                members: vec![
                    MemberSpec::new("nodes", code::ARRAY, code::POINTER, 0).class("Node"),
                    MemberSpec::new("weights", code::ARRAY, code::REAL, l.weights as u16),
                    MemberSpec::new("origin", code::VECTOR4, code::VOID, l.origin as u16),
                    MemberSpec::new("mode", code::ENUM, code::INT8, l.mode as u16).enumeration("Mode"),
                ],
            },
        ]);
    }

    let w = width;
    let root = b.object("Container", l.container_size);
    let slots = b.array(root, 3, w);
    let weights = b.array(root + l.weights, 2, 4);
    b.put_f32(weights, 0.5);
    b.put_f32(weights + 4, -1.25);
    for (i, v) in [1.0f32, 2.0, 3.0, 1.0].into_iter().enumerate() {
        b.put_f32(root + l.origin + i as u32 * 4, v);
    }
    b.put(root + l.mode, 2, 1);

    let first = b.object("Node", l.node_size);
    let second = b.object("Node", l.node_size);
    b.pointer(slots, first);
    b.pointer(slots + w, second);
    b.pointer(slots + 2 * w, first);

    b.string(first, "first");
    b.put(first + l.node_value, 10, 4);
    b.pointer(first + l.node_next, second);
    b.string(second, "second");
    b.put(second + l.node_value, (-20i32) as u32 as u64, 4);

    b.build(root, "Container")
}
