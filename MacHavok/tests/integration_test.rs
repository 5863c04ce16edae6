mod common;

use byteorder::{ByteOrder, LittleEndian};
use common::{
    ClassSpec, MemberSpec, PackfileBuilder, code, container_graph, container_packfile, container_schema, counter_tagfile,
    init_tracing, tagfile_section,
};
use machavok::packfile::EnumItem;
use machavok::prelude::*;
use machavok::tagfile::ItemKind;
use machavok::tagfile::section::Section;
use machavok::types::TagDataType;
use pretty_assertions::assert_eq;
use tempfile::tempdir;

fn pointer(value: Option<&Value>) -> ObjectId {
    match value {
        Some(Value::Pointer(Some(id))) => *id,
        other => panic!("expected a pointer, got {other:?}"),
    }
}

fn slots(graph: &ObjectGraph) -> Vec<ObjectId> {
    let root = graph.get(graph.root()).unwrap();
    match root.value.field("nodes") {
        Some(Value::Array(items)) => items.iter().map(|v| pointer(Some(v))).collect(),
        other => panic!("expected nodes array, got {other:?}"),
    }
}

#[test]
fn test_tagfile_items_share_pointer_targets() {
    init_tracing();
    let schema = container_schema();
    let graph = container_graph(&schema);

    let bytes = serialize_tagfile(&schema.types, &graph, &TagfileOptions::default()).unwrap();
    let file = parse_tagfile(&bytes).unwrap();
    assert_eq!(file.sdk_version, "20180100");
    assert_eq!(file.pointer_width, PointerWidth::Eight);

    // Item 1 is the root.
    let root = file.items[0];
    assert_eq!(root.kind, ItemKind::Pointer);
    assert_eq!(file.types.display_name(root.type_index), "Container");

    let node_items: Vec<_> = file
        .items
        .iter()
        .filter(|i| i.kind == ItemKind::Pointer && file.types.display_name(i.type_index) == "Node")
        .collect();
    assert_eq!(node_items.len(), 2);

    let node_ptr = file.types.find("Node*").unwrap();
    let array = file
        .items
        .iter()
        .find(|i| i.kind == ItemKind::Array && i.type_index == node_ptr)
        .expect("pointer array item");
    assert_eq!(array.count, 3);

    let data = tagfile_section(&bytes, b"DATA");
    let refs: Vec<u64> = (0..3)
        .map(|i| LittleEndian::read_u64(&data[array.offset as usize + i * 8..]))
        .collect();
    assert_eq!(refs[0], refs[2]);
    assert_ne!(refs[0], refs[1]);
    for r in &refs {
        let item = file.items[*r as usize - 1];
        assert_eq!(item.kind, ItemKind::Pointer);
        assert_eq!(item.type_index, file.types.find("Node").unwrap());
    }

    // Pointer slots are patched through the pointer type.
    let group = file.patches.iter().find(|g| g.type_index == node_ptr).unwrap();
    assert!(group.offsets.len() >= 3);
}

#[test]
fn test_tagfile_round_trip() {
    let schema = container_schema();
    let graph = container_graph(&schema);

    let bytes = serialize_tagfile(&schema.types, &graph, &TagfileOptions::default()).unwrap();
    let file = parse_tagfile(&bytes).unwrap();
    assert_eq!(file.graph.len(), 3);
    assert!(graph.structurally_eq(&schema.types, &file.graph, &file.types));

    let decoded = slots(&file.graph);
    assert_eq!(decoded[0], decoded[2]);
    let first = file.graph.get(decoded[0]).unwrap();
    assert_eq!(first.value.field("name"), Some(&Value::String(Some("first".to_string()))));
    assert_eq!(pointer(first.value.field("next")), decoded[1]);

    // Encoding the decoded pair again reproduces the file.
    let again = serialize_tagfile(&file.types, &file.graph, &TagfileOptions::default()).unwrap();
    assert_eq!(again, bytes);
}

#[test]
fn test_tagfile_reencodes_engine_bytes() {
    let bytes = counter_tagfile(5);
    let file = parse_tagfile(&bytes).unwrap();
    assert_eq!(file.sdk_version, "20180100");
    assert_eq!(file.pointer_width, PointerWidth::Eight);
    let root = file.graph.get(file.graph.root()).unwrap();
    assert_eq!(file.types.get(root.type_index).unwrap().name, "Counter");
    assert_eq!(root.value.field("value"), Some(&Value::Int(5)));

    let options = TagfileOptions::new().with_sdk_version(&file.sdk_version);
    let again = serialize_tagfile(&file.types, &file.graph, &options).unwrap();
    assert_eq!(again, bytes);
}

#[test]
fn test_tagfile_with_sdk_version() {
    let schema = container_schema();
    let graph = container_graph(&schema);
    let options = TagfileOptions::new().with_sdk_version("20160100");
    let bytes = serialize_tagfile(&schema.types, &graph, &options).unwrap();
    assert_eq!(tagfile_section(&bytes, b"SDKV"), b"20160100");

    let bad = TagfileOptions::new().with_sdk_version("hk_2014.1.0-r1");
    assert!(serialize_tagfile(&schema.types, &graph, &bad).is_err());
}

#[test]
fn test_xml_round_trip() {
    let schema = container_schema();
    let graph = container_graph(&schema);

    let xml = serialize_xml(&schema.types, &graph, &XmlOptions::default()).unwrap();
    assert!(xml.contains("<hktagfile"));
    let parsed = parse_xml(&xml, &schema.types).unwrap();
    assert!(graph.structurally_eq(&schema.types, &parsed.graph, &schema.types));

    // XML and binary describe the same graph.
    let bytes = serialize_tagfile(&schema.types, &parsed.graph, &TagfileOptions::default()).unwrap();
    let file = parse_tagfile(&bytes).unwrap();
    assert!(file.graph.structurally_eq(&file.types, &graph, &schema.types));
}

fn check_container_packfile(width: u32) {
    let bytes = container_packfile(width, 11, true);
    let file = parse_packfile(&bytes).unwrap();
    assert_eq!(file.sdk_version(), "hk_2010.2.0-r1");
    assert_eq!(file.pointer_width.bytes(), width);
    assert_eq!(file.graph.len(), 3);

    let graph = &file.graph;
    let root = graph.get(graph.root()).unwrap();
    assert_eq!(file.types.display_name(root.type_index), "Container");
    assert_eq!(
        root.value.field("weights"),
        Some(&Value::Array(vec![Value::Float(0.5), Value::Float(-1.25)]))
    );
    assert_eq!(
        root.value.field("origin"),
        Some(&Value::Tuple(vec![
            Value::Float(1.0),
            Value::Float(2.0),
            Value::Float(3.0),
            Value::Float(1.0)
        ]))
    );
    assert_eq!(root.value.field("mode"), Some(&Value::Int(2)));

    let decoded = slots(graph);
    assert_eq!(decoded[0], decoded[2]);
    assert_ne!(decoded[0], decoded[1]);
    let first = graph.get(decoded[0]).unwrap();
    let second = graph.get(decoded[1]).unwrap();
    assert_eq!(first.value.field("value"), Some(&Value::Int(10)));
    assert_eq!(pointer(first.value.field("next")), decoded[1]);
    assert_eq!(second.value.field("name"), Some(&Value::String(Some("second".to_string()))));
    assert_eq!(second.value.field("value"), Some(&Value::Int(-20)));
    assert_eq!(second.value.field("next"), Some(&Value::Pointer(None)));

    assert_eq!(
        file.enums["Container::Mode"],
        vec![
            EnumItem {
                value: 0,
                name: "MODE_NONE".to_string()
            },
            EnumItem {
                value: 2,
                name: "MODE_LOOP".to_string()
            },
        ]
    );
    let mode = file.types.find("Container::Mode").unwrap();
    let storage = file.types.get(mode).unwrap().parent.unwrap();
    assert_eq!(file.types.display_name(storage), "hkInt8");
    assert_eq!(file.types.byte_size_of(file.types.find("Node").unwrap()).unwrap(), common::packfile_layout(width).node_size);

    // A packfile re-encodes as a tagfile holding the same graph.
    let options = TagfileOptions::new().with_pointer_width(file.pointer_width);
    let tagfile = parse_tagfile(&serialize_tagfile(&file.types, graph, &options).unwrap()).unwrap();
    assert_eq!(tagfile.pointer_width, file.pointer_width);
    assert!(graph.structurally_eq(&file.types, &tagfile.graph, &tagfile.types));
}

#[test]
fn test_packfile_decode_64bit() {
    init_tracing();
    check_container_packfile(8);
}

#[test]
fn test_packfile_decode_32bit() {
    check_container_packfile(4);
}

#[test]
fn test_packfile_version_8_header() {
    let file = parse_packfile(&container_packfile(4, 8, true)).unwrap();
    assert_eq!(file.header.file_version, 8);
    assert_eq!(file.graph.len(), 3);
}

#[test]
fn test_packfile_without_class_tables() {
    let bare = container_packfile(8, 11, false);
    assert!(matches!(
        parse_packfile(&bare),
        Err(Error::MissingTypeReference { .. })
    ));

    let reference = parse_packfile(&container_packfile(8, 11, true)).unwrap().types;
    let file = parse_packfile_with_types(&bare, &reference).unwrap();
    assert!(file.enums.is_empty());
    let full = parse_packfile(&container_packfile(8, 11, true)).unwrap();
    assert!(file.graph.structurally_eq(&file.types, &full.graph, &full.types));
}

#[test]
fn test_packfile_homogeneous_array() {
    let mut b = PackfileBuilder::new(8, 11);
    b.write_classes(&[
        ClassSpec {
            name: "Vertex",
            parent: None,
            object_size: 4,
            version: 0,
            enums: Vec::new(),
            members: vec![MemberSpec::new("x", code::INT32, code::VOID, 0)],
        },
        ClassSpec {
            name: "VertexBuffer",
            parent: None,
            object_size: 24,
            version: 0,
            enums: Vec::new(),
            members: vec![MemberSpec::new("vertices", code::HOMOGENEOUS_ARRAY, code::VOID, 0).class("Vertex")],
        },
    ]);
    let root = b.object("VertexBuffer", 24);
    let storage = b.homogeneous_array(root, "Vertex", 3, 4);
    for (i, x) in [7u64, 8, 9].into_iter().enumerate() {
        b.put(storage + i as u32 * 4, x, 4);
    }

    let file = parse_packfile(&b.build(root, "VertexBuffer")).unwrap();
    let root = file.graph.get(file.graph.root()).unwrap();
    let member = &file.types.get(root.type_index).unwrap().members[0];
    assert_eq!(file.types.get(member.type_index).unwrap().name, "hkHomogeneousArray");
    assert_eq!(file.types.byte_size_of(member.type_index).unwrap(), 24);

    let Some(Value::Array(vertices)) = root.value.field("vertices") else {
        panic!("vertices not decoded as an array");
    };
    let xs: Vec<_> = vertices.iter().map(|v| v.field("x").cloned()).collect();
    assert_eq!(xs, vec![Some(Value::Int(7)), Some(Value::Int(8)), Some(Value::Int(9))]);
}

#[test]
fn test_big_endian_packfile_rejected() {
    let mut builder = PackfileBuilder::new(8, 11);
    builder.little_endian = false;
    let root = builder.object("Container", 16);
    let bytes = builder.build(root, "Container");
    assert!(matches!(
        parse_packfile(&bytes),
        Err(Error::MalformedHeader { .. })
    ));
}

#[test]
fn test_corrupt_counts_are_errors() {
    let width = 8;
    let mut bytes = container_packfile(width, 11, true);
    let (_, sections) = machavok::packfile::header::read_headers(&bytes).unwrap();
    let weights_count =
        sections[common::DATA as usize].absolute_data_start + common::packfile_layout(width).weights + width;
    LittleEndian::write_u32(&mut bytes[weights_count as usize..], 0x7FFF_FFFF);
    assert!(matches!(
        parse_packfile(&bytes),
        Err(Error::MalformedHeader { .. })
    ));

    let mut bytes = container_packfile(width, 11, true);
    LittleEndian::write_u32(&mut bytes[0x14..], 0x7FFF_FFFF);
    assert!(matches!(
        parse_packfile(&bytes),
        Err(Error::MalformedHeader { .. })
    ));

    let schema = container_schema();
    let graph = container_graph(&schema);
    let mut bytes = serialize_tagfile(&schema.types, &graph, &TagfileOptions::default()).unwrap();
    let root = Section::read(&bytes, 0).unwrap();
    let patches = root.child(&bytes, b"INDX").unwrap().child(&bytes, b"PTCH").unwrap();
    LittleEndian::write_u32(&mut bytes[patches.start + 4..], 0x7FFF_FFFF);
    assert!(matches!(
        parse_tagfile(&bytes),
        Err(Error::MalformedHeader { .. })
    ));
}

#[test]
fn test_hkx_file_detects_every_format() {
    let schema = container_schema();
    let graph = container_graph(&schema);

    let tagfile = serialize_tagfile(&schema.types, &graph, &TagfileOptions::default()).unwrap();
    let file = HkxFile::from_bytes(&tagfile, None).unwrap();
    assert_eq!(file.format, HkxFormat::Tagfile);
    assert_eq!(file.engine_version(), Some(EngineVersion::Hk2018));

    let xml = serialize_xml(&schema.types, &graph, &XmlOptions::default()).unwrap();
    let file = HkxFile::from_bytes(xml.as_bytes(), Some(&schema.types)).unwrap();
    assert_eq!(file.format, HkxFormat::Xml);
    assert!(file.graph.structurally_eq(&file.types, &graph, &schema.types));

    let file = HkxFile::from_bytes(&container_packfile(8, 11, true), None).unwrap();
    assert_eq!(file.format, HkxFormat::Packfile);
    assert_eq!(file.engine_version(), Some(EngineVersion::Hk2010));
    assert!(file.to_bytes(HkxFormat::Tagfile).is_ok());
}

#[test]
fn test_convert_file_between_formats() {
    let dir = tempdir().unwrap();
    let schema = container_schema();
    let graph = container_graph(&schema);

    let input = dir.path().join("container.hkx");
    write_tagfile(&input, &schema.types, &graph, &TagfileOptions::default()).unwrap();

    let xml_path = dir.path().join("out/container.xml");
    convert_file(&input, &xml_path, HkxFormat::Xml, None, None).unwrap();
    let xml = HkxFile::read(&xml_path, Some(&schema.types)).unwrap();
    assert_eq!(xml.sdk_version, "20180100");
    assert!(xml.graph.structurally_eq(&xml.types, &graph, &schema.types));

    let back = dir.path().join("out/container_back.hkx");
    convert_file(&xml_path, &back, HkxFormat::Tagfile, Some(&schema.types), None).unwrap();
    assert_eq!(std::fs::read(&back).unwrap(), std::fs::read(&input).unwrap());

    let err = convert_file(&input, dir.path().join("x.hkx"), HkxFormat::Packfile, None, None).unwrap_err();
    assert!(matches!(err, Error::UnsupportedConversion { .. }));
}

/// A reference set holding the Container schema plus a stub of every type the
/// conversion rules need.
fn conversion_reference() -> TypeSet {
    let mut reference = container_schema().types;
    for name in machavok::convert::required_reference_types() {
        if reference.find(name).is_none() {
            reference.push(
                TypeDescriptor::new(name)
                    .with_data_type(TagDataType::CLASS)
                    .with_size(8, 8),
            );
        }
    }
    reference
}

#[test]
fn test_version_conversion_keeps_untouched_types() {
    init_tracing();
    let dir = tempdir().unwrap();
    let schema = container_schema();
    let graph = container_graph(&schema);
    let reference = conversion_reference();

    let input = dir.path().join("container.hkx");
    write_tagfile(&input, &schema.types, &graph, &TagfileOptions::default()).unwrap();

    let mut file = HkxFile::read(&input, None).unwrap();
    file.convert_types(&reference, EngineVersion::Hk2010).unwrap();
    assert_eq!(file.engine_version(), Some(EngineVersion::Hk2010));
    assert!(file.types.find("hkaSkeletonMapper").is_some());

    let node = file.types.find("Node").unwrap();
    assert_eq!(file.types.byte_size_of(node).unwrap(), schema.types.byte_size_of(schema.node).unwrap());
    assert!(file.graph.structurally_eq(&file.types, &graph, &schema.types));

    // The 2010 SDK string survives an XML round trip.
    let output = dir.path().join("container_2010.xml");
    file.write(&output, HkxFormat::Xml).unwrap();
    let reread = HkxFile::read(&output, Some(&file.types)).unwrap();
    assert_eq!(reread.engine_version(), Some(EngineVersion::Hk2010));
    assert!(reread.graph.structurally_eq(&reread.types, &graph, &schema.types));
}

#[test]
fn test_version_conversion_carries_renamed_values() {
    let mut b = common::SchemaBuilder::new();
    let word = b.int("hkUint32", 4, false);
    let header = b.class("hkReferencedObject", 8);
    b.members(header, &[("sizeAndFlags", word), ("refCount", word)]);
    let types = b.finish();
    let fields = [
        ("sizeAndFlags".to_string(), Value::Int(0x1234)),
        ("refCount".to_string(), Value::Int(3)),
    ];
    let graph = ObjectGraph::new(HkObject::new(header, Value::Struct(fields.into_iter().collect())));

    let mut reference = {
        let mut b = common::SchemaBuilder::new();
        b.int("hkUint16", 2, false);
        b.int("hkInt16", 2, true);
        b.finish()
    };
    for name in machavok::convert::required_reference_types() {
        if reference.find(name).is_none() {
            reference.push(TypeDescriptor::new(name).with_data_type(TagDataType::CLASS).with_size(8, 8));
        }
    }

    let bytes = serialize_tagfile(&types, &graph, &TagfileOptions::default()).unwrap();
    let mut file = HkxFile::from_bytes(&bytes, None).unwrap();
    file.convert_types(&reference, EngineVersion::Hk2014).unwrap();

    let reread = HkxFile::from_bytes(&file.to_bytes(HkxFormat::Tagfile).unwrap(), None).unwrap();
    let root = reread.graph.get(reread.graph.root()).unwrap();
    assert_eq!(root.value.field("memSizeAndFlags"), Some(&Value::Int(0x1234)));
    assert_eq!(root.value.field("referenceCount"), Some(&Value::Int(3)));
    assert_eq!(root.value.field("sizeAndFlags"), None);
    let members = &reread.types.get(root.type_index).unwrap().members;
    assert_eq!(reread.types.display_name(members[0].type_index), "hkUint16");
}

#[test]
fn test_conversion_hops_compose() {
    let schema = container_schema();
    let reference = conversion_reference();
    let converter = TypeConverter::new(&reference, PointerWidth::Eight);

    let direct = converter
        .convert(&schema.types, EngineVersion::Hk2018, EngineVersion::Hk2010)
        .unwrap();
    let middle = converter
        .convert(&schema.types, EngineVersion::Hk2018, EngineVersion::Hk2014)
        .unwrap();
    let stepped = converter
        .convert(&middle, EngineVersion::Hk2014, EngineVersion::Hk2010)
        .unwrap();
    assert_eq!(direct, stepped);

    assert!(matches!(
        converter.convert(&schema.types, EngineVersion::Hk2010, EngineVersion::Hk2018),
        Err(Error::UnsupportedConversion { .. })
    ));
    assert!(matches!(
        TypeConverter::new(&schema.types, PointerWidth::Eight).convert(
            &schema.types,
            EngineVersion::Hk2018,
            EngineVersion::Hk2014
        ),
        Err(Error::MissingTypeReference { .. })
    ));
}

#[test]
fn test_batch_convert_directory() {
    let source = tempdir().unwrap();
    let dest = tempdir().unwrap();
    let schema = container_schema();
    let graph = container_graph(&schema);

    std::fs::create_dir_all(source.path().join("chars")).unwrap();
    for name in ["a.hkx", "chars/b.hkx"] {
        write_tagfile(source.path().join(name), &schema.types, &graph, &TagfileOptions::default()).unwrap();
    }
    std::fs::write(source.path().join("chars/broken.hkx"), b"\0\0\0\0").unwrap();

    let files = find_hkx_files(source.path());
    assert_eq!(files.len(), 3);

    let options = BatchConvertOptions {
        output_format: HkxFormat::Xml,
        reference: None,
        target_version: None,
    };
    let result = batch_convert(&files, source.path(), dest.path(), &options, |_| {});
    assert_eq!(result.success_count, 2);
    assert_eq!(result.fail_count, 1);
    assert!(dest.path().join("a.xml").exists());
    assert!(dest.path().join("chars/b.xml").exists());

    let reread = HkxFile::read(dest.path().join("chars/b.xml"), Some(&schema.types)).unwrap();
    assert!(reread.graph.structurally_eq(&reread.types, &graph, &schema.types));
}
