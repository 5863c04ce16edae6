//! TYPE section: the type descriptors of a tagfile
//!
//! Names live in two string tables (`TSTR` for type and template parameter
//! names, `FSTR` for member names). `TNAM` lists every type with its
//! template arguments, `TBOD` carries the bodies and `THSH` the hashes.

use super::section::{Section, SectionWriter};
use super::varint::{read_varint, write_varint};
use crate::error::{Error, Result};
use crate::options::PointerWidth;
use crate::types::{
    Interface, Member, MemberFlags, TagDataType, TagFormatFlags, TagKind, TemplateParam, TypeDescriptor, TypeIndex,
    TypeSet,
};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use indexmap::IndexSet;
use std::io::Cursor;

/// Type whose body is emitted after the pointer type that follows it.
const SWAPPED_BODY_TYPE: &str = "hkReferencedObject";

/// Write `TYPE` and its subsections.
pub fn write_type_section(writer: &mut SectionWriter, types: &TypeSet, pointer_width: PointerWidth) -> Result<()> {
    let mut type_strings: IndexSet<&str> = IndexSet::new();
    let mut field_strings: IndexSet<&str> = IndexSet::new();
    for (_, desc) in types.iter() {
        type_strings.insert(&desc.name);
        for param in &desc.template_params {
            type_strings.insert(&param.name);
        }
        for member in &desc.members {
            field_strings.insert(&member.name);
        }
    }

    let mut names = Vec::new();
    write_varint(&mut names, wire_count(types.len() + 1)?)?;
    for (_, desc) in types.iter() {
        write_varint(&mut names, string_index(&type_strings, &desc.name))?;
        write_varint(&mut names, wire_count(desc.template_params.len())?)?;
        for param in &desc.template_params {
            write_varint(&mut names, string_index(&type_strings, &param.name))?;
            write_varint(&mut names, param.raw())?;
        }
    }

    let mut bodies = Vec::new();
    for index in body_order(types)? {
        write_body(&mut bodies, types, index, &field_strings)?;
    }

    let mut hashes = Vec::new();
    let hashed: Vec<_> = types.iter().filter_map(|(i, t)| t.hash.map(|h| (i, h))).collect();
    write_varint(&mut hashes, wire_count(hashed.len())?)?;
    for (index, hash) in hashed {
        write_varint(&mut hashes, type_ref(Some(index)))?;
        hashes.write_u32::<LittleEndian>(hash)?;
    }

    writer.begin(b"TYPE");
    writer.leaf(b"TPTR", &vec![0u8; pointer_width.size() * (types.len() + 1)])?;
    writer.leaf(b"TSTR", &string_table(&type_strings))?;
    writer.leaf(b"TNAM", &names)?;
    writer.leaf(b"FSTR", &string_table(&field_strings))?;
    writer.leaf(b"TBOD", &bodies)?;
    writer.leaf(b"THSH", &hashes)?;
    writer.leaf(b"TPAD", &[])?;
    writer.end()?;

    tracing::debug!(
        "Wrote {} types ({} type strings, {} field strings)",
        types.len(),
        type_strings.len(),
        field_strings.len()
    );
    Ok(())
}

/// Natural order, except `hkReferencedObject` trades places with the pointer
/// type right after it. Engine-written files order the table this way.
fn body_order(types: &TypeSet) -> Result<Vec<TypeIndex>> {
    let mut order: Vec<TypeIndex> = (0..types.len()).collect();
    let mut i = 0;
    while i + 1 < order.len() {
        let current = types.get_checked(order[i])?;
        let next = types.get_checked(order[i + 1])?;
        let next_is_pointer = next.name.ends_with('*') || next.own_kind() == Some(TagKind::Pointer);
        if current.name == SWAPPED_BODY_TYPE && next_is_pointer {
            order.swap(i, i + 1);
            i += 1;
        }
        i += 1;
    }
    Ok(order)
}

fn write_body(out: &mut Vec<u8>, types: &TypeSet, index: TypeIndex, fields: &IndexSet<&str>) -> Result<()> {
    let desc = types.get_checked(index)?;
    let format = desc.format;
    write_varint(out, type_ref(Some(index)))?;
    write_varint(out, type_ref(desc.parent))?;
    write_varint(out, format.0)?;

    if format.contains(TagFormatFlags::SUB_TYPE) {
        write_varint(out, desc.data_type.0)?;
    }
    if format.contains(TagFormatFlags::POINTER) {
        write_varint(out, type_ref(desc.pointer_type))?;
    }
    if format.contains(TagFormatFlags::VERSION) {
        write_varint(out, desc.version.unwrap_or(0))?;
    }
    if format.contains(TagFormatFlags::BYTE_SIZE) {
        write_varint(out, desc.byte_size)?;
        write_varint(out, desc.alignment)?;
    }
    if format.contains(TagFormatFlags::ABSTRACT_VALUE) {
        write_varint(out, desc.abstract_value.unwrap_or(0))?;
    }
    if format.contains(TagFormatFlags::MEMBERS) {
        write_varint(out, wire_count(desc.members.len())?)?;
        for member in &desc.members {
            write_varint(out, string_index(fields, &member.name))?;
            write_varint(out, member.flags.0)?;
            write_varint(out, member.offset)?;
            write_varint(out, type_ref(Some(member.type_index)))?;
        }
    }
    if format.contains(TagFormatFlags::INTERFACES) {
        write_varint(out, wire_count(desc.interfaces.len())?)?;
        for interface in &desc.interfaces {
            write_varint(out, type_ref(Some(interface.type_index)))?;
            write_varint(out, interface.value)?;
        }
    }
    Ok(())
}

/// Read a `TYPE` section. The pointer width is recovered from `TPTR`, which
/// holds one pointer slot per type.
pub fn read_type_section(data: &[u8], section: &Section) -> Result<(TypeSet, PointerWidth)> {
    let type_strings = read_string_table(section.child(data, b"TSTR")?.payload(data));
    let field_strings = read_string_table(section.child(data, b"FSTR")?.payload(data));

    let names = section.child(data, b"TNAM")?;
    let mut cursor = Cursor::new(names.payload(data));
    let count = (read_varint(&mut cursor)? as usize).saturating_sub(1);
    let mut types = TypeSet::new();
    for _ in 0..count {
        let name = lookup(&type_strings, read_varint(&mut cursor)?, names.start)?;
        let mut desc = TypeDescriptor::new(name);
        let params = read_varint(&mut cursor)?;
        for _ in 0..params {
            let param_name = lookup(&type_strings, read_varint(&mut cursor)?, names.start)?;
            let raw = read_varint(&mut cursor)?;
            desc.template_params.push(TemplateParam::from_raw(param_name, raw));
        }
        types.push(desc);
    }

    let bodies = section.child(data, b"TBOD")?;
    let payload = bodies.payload(data);
    let mut cursor = Cursor::new(payload);
    while (cursor.position() as usize) < payload.len() {
        let at = bodies.start + cursor.position() as usize;
        let index = index_ref(read_varint(&mut cursor)?)
            .ok_or_else(|| Error::malformed("type body without a type index", at))?;
        read_body(&mut cursor, &mut types, index, &field_strings, at)?;
    }

    if let Ok(hashes) = section.child(data, b"THSH") {
        let mut cursor = Cursor::new(hashes.payload(data));
        let count = read_varint(&mut cursor)?;
        for _ in 0..count {
            let index = read_varint(&mut cursor)?;
            let hash = cursor.read_u32::<LittleEndian>().map_err(|_| Error::UnexpectedEof)?;
            if let Some(desc) = index_ref(index).and_then(|i| types.get_mut(i)) {
                desc.hash = Some(hash);
            }
        }
    }

    let pointer_width = match section.child(data, b"TPTR") {
        Ok(slots) if slots.end > slots.start => {
            let width = (slots.end - slots.start) / (types.len() + 1);
            PointerWidth::try_from(width as u32)?
        }
        _ => PointerWidth::default(),
    };

    types.validate()?;
    tracing::debug!("Read {} types ({}-byte pointers)", types.len(), pointer_width.bytes());
    Ok((types, pointer_width))
}

fn read_body(
    cursor: &mut Cursor<&[u8]>,
    types: &mut TypeSet,
    index: TypeIndex,
    fields: &[String],
    at: usize,
) -> Result<()> {
    let parent = index_ref(read_varint(cursor)?);
    let format = TagFormatFlags(read_varint(cursor)?);

    let mut body = TypeDescriptor::new(String::new());
    body.parent = parent;
    body.format = format;
    if format.contains(TagFormatFlags::SUB_TYPE) {
        body.data_type = TagDataType(read_varint(cursor)?);
    }
    if format.contains(TagFormatFlags::POINTER) {
        body.pointer_type = index_ref(read_varint(cursor)?);
    }
    if format.contains(TagFormatFlags::VERSION) {
        body.version = Some(read_varint(cursor)?);
    }
    if format.contains(TagFormatFlags::BYTE_SIZE) {
        body.byte_size = read_varint(cursor)?;
        body.alignment = read_varint(cursor)?;
    }
    if format.contains(TagFormatFlags::ABSTRACT_VALUE) {
        body.abstract_value = Some(read_varint(cursor)?);
    }
    if format.contains(TagFormatFlags::MEMBERS) {
        let count = read_varint(cursor)?;
        for _ in 0..count {
            let name = lookup(fields, read_varint(cursor)?, at)?;
            let flags = MemberFlags(read_varint(cursor)?);
            let offset = read_varint(cursor)?;
            let type_index = index_ref(read_varint(cursor)?)
                .ok_or_else(|| Error::malformed(format!("member {name} has no type"), at))?;
            let mut member = Member::new(name, type_index, offset);
            member.flags = flags;
            body.members.push(member);
        }
    }
    if format.contains(TagFormatFlags::INTERFACES) {
        let count = read_varint(cursor)?;
        for _ in 0..count {
            let type_index = index_ref(read_varint(cursor)?)
                .ok_or_else(|| Error::malformed("interface without a type", at))?;
            let value = read_varint(cursor)?;
            body.interfaces.push(Interface { type_index, value });
        }
    }

    let desc = types.get_mut(index).ok_or_else(|| Error::InvalidItemIndex {
        index: index as u32 + 1,
        offset: at,
    })?;
    body.name = std::mem::take(&mut desc.name);
    body.template_params = std::mem::take(&mut desc.template_params);
    body.hash = desc.hash;
    *desc = body;
    Ok(())
}

fn string_table(strings: &IndexSet<&str>) -> Vec<u8> {
    let mut out = Vec::new();
    for s in strings {
        out.extend_from_slice(s.as_bytes());
        out.push(0);
    }
    out
}

fn read_string_table(payload: &[u8]) -> Vec<String> {
    payload
        .split(|&b| b == 0)
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .collect()
}

fn lookup(strings: &[String], index: u32, at: usize) -> Result<String> {
    strings
        .get(index as usize)
        .cloned()
        .ok_or_else(|| Error::malformed(format!("string index {index} out of range"), at))
}

fn string_index(strings: &IndexSet<&str>, s: &str) -> u32 {
    strings.get_index_of(s).unwrap_or_default() as u32
}

fn wire_count(count: usize) -> Result<u32> {
    u32::try_from(count).map_err(|_| Error::VarIntOverflow {
        value: count as u64,
        offset: None,
    })
}

fn type_ref(index: Option<TypeIndex>) -> u32 {
    index.map_or(0, |i| i as u32 + 1)
}

fn index_ref(raw: u32) -> Option<TypeIndex> {
    (raw != 0).then(|| raw as usize - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TemplateValue;
    use pretty_assertions::assert_eq;

    fn referenced_object_types() -> TypeSet {
        let mut set = TypeSet::new();
        let int = set.push(TypeDescriptor::new("int").with_data_type(TagDataType::int(4, true)).with_size(4, 4));
        let base = set.push(TypeDescriptor::new("hkBaseObject").with_data_type(TagDataType::CLASS).with_size(8, 8));
        let refobj = set.push(
            TypeDescriptor::new("hkReferencedObject")
                .with_parent(base)
                .with_version(1)
                .with_size(16, 8)
                .with_member(Member::new("refCount", int, 8).with_flags(MemberFlags::PRIVATE))
                .with_hash(0xDEAD_BEEF),
        );
        set.push(
            TypeDescriptor::new("T*")
                .with_data_type(TagDataType::POINTER)
                .with_pointer_type(refobj)
                .with_size(8, 8)
                .with_template("tT", TemplateValue::Type(Some(refobj))),
        );
        set.push(TypeDescriptor::new("hkSwapped").with_interface(refobj, 3));
        set
    }

    fn encode(types: &TypeSet) -> Vec<u8> {
        let mut writer = SectionWriter::new();
        write_type_section(&mut writer, types, PointerWidth::Eight).unwrap();
        writer.finish().unwrap()
    }

    #[test]
    fn test_round_trip() {
        let types = referenced_object_types();
        let bytes = encode(&types);
        let section = Section::read(&bytes, 0).unwrap();
        let (decoded, width) = read_type_section(&bytes, &section).unwrap();
        assert_eq!(decoded, types);
        assert_eq!(width, PointerWidth::Eight);
    }

    #[test]
    fn test_referenced_object_body_swapped() {
        let types = referenced_object_types();
        assert_eq!(body_order(&types).unwrap(), vec![0, 1, 3, 2, 4]);

        let bytes = encode(&types);
        let section = Section::read(&bytes, 0).unwrap();
        let bodies = section.child(&bytes, b"TBOD").unwrap().payload(&bytes).to_vec();
        // Third body in the table is the pointer type (#4), not hkReferencedObject (#3).
        let mut cursor = Cursor::new(bodies.as_slice());
        for _ in 0..2 {
            let index = read_varint(&mut cursor).unwrap() as usize - 1;
            let mut scratch = referenced_object_types();
            read_body(&mut cursor, &mut scratch, index, &["refCount".to_string()], 0).unwrap();
        }
        assert_eq!(read_varint(&mut cursor).unwrap(), 4);
    }

    #[test]
    fn test_pointer_width_from_slots() {
        let types = referenced_object_types();
        let mut writer = SectionWriter::new();
        write_type_section(&mut writer, &types, PointerWidth::Four).unwrap();
        let bytes = writer.finish().unwrap();
        let (_, width) = read_type_section(&bytes, &Section::read(&bytes, 0).unwrap()).unwrap();
        assert_eq!(width, PointerWidth::Four);
    }
}
