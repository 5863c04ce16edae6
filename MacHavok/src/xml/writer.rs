//! XML tagfile writing

use super::{format_real, format_ref, is_token_kind, vec_tag};
use crate::error::{Error, Result};
use crate::graph::{IdentityAllocator, ObjectGraph, Value};
use crate::options::XmlOptions;
use crate::types::{TagKind, TypeIndex, TypeSet};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

/// Write a graph as an XML tagfile on disk
///
/// # Errors
/// Returns an error if serialization or file writing fails.
pub fn write_xml<P: AsRef<Path>>(path: P, types: &TypeSet, graph: &ObjectGraph, options: &XmlOptions) -> Result<()> {
    let xml = serialize_xml(types, graph, options)?;
    std::fs::write(path, xml)?;
    Ok(())
}

/// Serialize a graph to XML tagfile text
///
/// Objects get ids `#0001`, `#0002`, ... in breadth-first order from the root.
///
/// # Errors
/// Returns an error if the options are invalid, the graph has dangling
/// pointers, or a value does not match its type.
pub fn serialize_xml(types: &TypeSet, graph: &ObjectGraph, options: &XmlOptions) -> Result<String> {
    options.validate()?;

    let order = graph.reachable()?;
    let mut ids = IdentityAllocator::new();
    for &object in &order {
        ids.assign(object);
    }
    let roots: Vec<TypeIndex> = order
        .iter()
        .map(|&id| graph.get(id).map(|o| o.type_index))
        .collect::<Result<_>>()?;
    let catalog = class_catalog(types, &roots)?;

    let mut output = Vec::new();
    let mut writer = Writer::new_with_indent(&mut output, b'\t', 1);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("ascii"), None)))?;

    let mut root = BytesStart::new("hktagfile");
    root.push_attribute(("version", options.tagfile_version.to_string().as_str()));
    root.push_attribute(("sdkversion", options.sdk_version.as_str()));
    writer.write_event(Event::Start(root))?;

    for &class in &catalog {
        write_class(&mut writer, types, class)?;
    }

    let ctx = ValueWriter { types, ids: &ids };
    for &object_id in &order {
        let object = graph.get(object_id)?;
        let index = ids.index_of(object_id).unwrap_or_default();
        let mut start = BytesStart::new("object");
        start.push_attribute(("id", format_ref(index).as_str()));
        start.push_attribute(("type", types.display_name(object.type_index).as_str()));
        writer.write_event(Event::Start(start))?;
        if let Value::Struct(_) = object.value {
            ctx.write_fields(&mut writer, object.type_index, &object.value)?;
        }
        writer.write_event(Event::End(BytesEnd::new("object")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("hktagfile")))?;
    tracing::debug!("Wrote XML tagfile: {} classes, {} objects", catalog.len(), order.len());
    Ok(String::from_utf8(output)?)
}

/// Classes the document describes: for each object type, its parent first,
/// then classes its members use, then the class itself. Each appears once.
fn class_catalog(types: &TypeSet, roots: &[TypeIndex]) -> Result<Vec<TypeIndex>> {
    let mut entered = HashSet::new();
    let mut emitted = HashSet::new();
    let mut catalog = Vec::new();

    for &start in roots {
        let mut stack = vec![(start, false)];
        while let Some((index, expanded)) = stack.pop() {
            if expanded {
                if emitted.insert(index) {
                    catalog.push(index);
                }
                continue;
            }
            if !entered.insert(index) {
                continue;
            }
            stack.push((index, true));
            let mut deps = class_dependencies(types, index)?;
            deps.reverse();
            stack.extend(deps.into_iter().map(|d| (d, false)));
        }
    }
    Ok(catalog)
}

fn class_dependencies(types: &TypeSet, index: TypeIndex) -> Result<Vec<TypeIndex>> {
    let desc = types.get_checked(index)?;
    let mut deps = Vec::new();
    if let Some(parent) = desc.parent {
        deps.push(parent);
    }
    for member in &desc.members {
        let element = types.resolve_element(member.type_index)?;
        if types.kind(element)? == TagKind::Class && vec_tag(types, element)?.is_none() {
            deps.push(element);
        }
    }
    Ok(deps)
}

fn write_class<W: Write>(writer: &mut Writer<W>, types: &TypeSet, index: TypeIndex) -> Result<()> {
    let desc = types.get_checked(index)?;
    let mut start = BytesStart::new("class");
    start.push_attribute(("name", types.display_name(index).as_str()));
    start.push_attribute(("version", desc.version.unwrap_or(0).to_string().as_str()));
    if let Some(parent) = desc.parent {
        start.push_attribute(("parent", types.display_name(parent).as_str()));
    }
    if desc.members.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for member in &desc.members {
        let mut tag = BytesStart::new("member");
        tag.push_attribute(("name", member.name.as_str()));
        let (kind, class, count) = member_type(types, member.type_index)?;
        tag.push_attribute(("type", kind.as_str()));
        if let Some(class) = class {
            tag.push_attribute(("class", class.as_str()));
        }
        if let Some(count) = count {
            tag.push_attribute(("count", count.to_string().as_str()));
        }
        writer.write_event(Event::Empty(tag))?;
    }
    writer.write_event(Event::End(BytesEnd::new("class")))?;
    Ok(())
}

/// Catalog description of a member type: tag, class, tuple count.
fn member_type(types: &TypeSet, type_index: TypeIndex) -> Result<(String, Option<String>, Option<u32>)> {
    if let Some(tag) = vec_tag(types, type_index)? {
        return Ok((tag, None, None));
    }
    let base = types.resolve_base(type_index)?;
    Ok(match types.kind(base)? {
        TagKind::Void | TagKind::Invalid => ("void".to_string(), None, None),
        TagKind::Bool => ("bool".to_string(), None, None),
        TagKind::Char => ("byte".to_string(), None, None),
        TagKind::Int => ("int".to_string(), None, None),
        TagKind::Float => ("real".to_string(), None, None),
        TagKind::String => ("string".to_string(), None, None),
        TagKind::Pointer => {
            let target = types.resolve_element(base)?;
            ("ref".to_string(), Some(types.display_name(target)), None)
        }
        TagKind::Class => ("struct".to_string(), Some(types.display_name(base)), None),
        TagKind::Array => {
            let element = types.element_type(type_index)?;
            ("array".to_string(), Some(types.display_name(element)), None)
        }
        TagKind::Tuple => {
            let element = types.element_type(type_index)?;
            let count = types.data_type(base)?.tuple_count();
            ("tuple".to_string(), Some(types.display_name(element)), Some(count))
        }
    })
}

struct ValueWriter<'a> {
    types: &'a TypeSet,
    ids: &'a IdentityAllocator,
}

impl ValueWriter<'_> {
    /// Write the members of a struct value as named child elements.
    fn write_fields<W: Write>(&self, writer: &mut Writer<W>, type_index: TypeIndex, value: &Value) -> Result<()> {
        for member in self.types.all_members(type_index)? {
            if let Some(field) = value.field(&member.name) {
                self.write_value(writer, Some(&member.name), member.type_index, field)?;
            }
        }
        Ok(())
    }

    fn write_value<W: Write>(
        &self,
        writer: &mut Writer<W>,
        name: Option<&str>,
        type_index: TypeIndex,
        value: &Value,
    ) -> Result<()> {
        let types = self.types;
        let base = types.resolve_base(type_index)?;
        let kind = types.kind(base)?;

        if let Some(tag) = vec_tag(types, type_index)? {
            let mut tokens = Vec::new();
            self.collect_floats(type_index, value, &mut tokens)?;
            return write_text_element(writer, &tag, name, &[], &tokens.join(" "));
        }

        match (kind, value) {
            (TagKind::Void, _) => Ok(()),
            (TagKind::String, Value::String(text)) => match (text, name) {
                (None, Some(_)) => Ok(()),
                (None, None) => {
                    let mut start = BytesStart::new("string");
                    start.push_attribute(("null", "1"));
                    writer.write_event(Event::Empty(start))?;
                    Ok(())
                }
                (Some(text), _) => write_text_element(writer, "string", name, &[], text),
            },
            (TagKind::Class, Value::Struct(_)) => {
                let start = named_start("struct", name);
                writer.write_event(Event::Start(start))?;
                self.write_fields(writer, type_index, value)?;
                writer.write_event(Event::End(BytesEnd::new("struct")))?;
                Ok(())
            }
            (TagKind::Array, Value::Array(elements)) => {
                self.write_sequence(writer, "array", name, types.element_type(type_index)?, elements)
            }
            (TagKind::Tuple, Value::Tuple(elements)) => {
                self.write_sequence(writer, "tuple", name, types.element_type(type_index)?, elements)
            }
            (_, Value::None) => Ok(()),
            _ => {
                let token = self.token(type_index, value)?;
                write_text_element(writer, scalar_tag(kind), name, &[], &token)
            }
        }
    }

    fn write_sequence<W: Write>(
        &self,
        writer: &mut Writer<W>,
        tag: &str,
        name: Option<&str>,
        element_type: TypeIndex,
        elements: &[Value],
    ) -> Result<()> {
        let size = elements.len().to_string();
        let attrs = [("size", size.as_str())];
        if elements.is_empty() {
            let mut start = named_start(tag, name);
            start.push_attribute(attrs[0]);
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }

        if is_token_kind(self.types, element_type)? {
            let tokens = elements
                .iter()
                .map(|e| self.token(element_type, e))
                .collect::<Result<Vec<_>>>()?;
            return write_text_element(writer, tag, name, &attrs, &tokens.join(" "));
        }

        let mut start = named_start(tag, name);
        start.push_attribute(attrs[0]);
        writer.write_event(Event::Start(start))?;
        for element in elements {
            self.write_value(writer, None, element_type, element)?;
        }
        writer.write_event(Event::End(BytesEnd::new(tag)))?;
        Ok(())
    }

    /// Text form of a scalar or reference.
    fn token(&self, type_index: TypeIndex, value: &Value) -> Result<String> {
        let kind = self.types.kind(type_index)?;
        Ok(match (kind, value) {
            (TagKind::Bool, Value::Bool(b)) => if *b { "1" } else { "0" }.to_string(),
            (TagKind::Bool | TagKind::Char | TagKind::Int, Value::Int(i)) => i.to_string(),
            (TagKind::Char | TagKind::Int, Value::Bool(b)) => u8::from(*b).to_string(),
            (TagKind::Float, Value::Float(f)) => format_real(*f, self.types.byte_size_of(type_index)?),
            (TagKind::Float, Value::Int(i)) => format_real(*i as f64, self.types.byte_size_of(type_index)?),
            (TagKind::Pointer, Value::Pointer(None)) => format_ref(0),
            (TagKind::Pointer, Value::Pointer(Some(target))) => {
                let index = self.ids.index_of(*target).ok_or_else(|| Error::IncompleteGraph {
                    object: target.0,
                    message: "pointer target has no object id".to_string(),
                })?;
                format_ref(index)
            }
            (TagKind::Bool, Value::None) => "0".to_string(),
            (TagKind::Char | TagKind::Int, Value::None) => "0".to_string(),
            (TagKind::Float, Value::None) => format_real(0.0, self.types.byte_size_of(type_index)?),
            (TagKind::Pointer, Value::None) => format_ref(0),
            _ => {
                return Err(Error::InvalidFormat(format!(
                    "value does not fit {kind:?} type {}",
                    self.types.display_name(type_index)
                )));
            }
        })
    }

    /// Flatten a float block in member/element order.
    fn collect_floats(&self, type_index: TypeIndex, value: &Value, out: &mut Vec<String>) -> Result<()> {
        let types = self.types;
        let base = types.resolve_base(type_index)?;
        match types.kind(base)? {
            TagKind::Float => out.push(self.token(type_index, value)?),
            TagKind::Tuple => {
                let element = types.element_type(type_index)?;
                let count = types.data_type(base)?.tuple_count() as usize;
                for i in 0..count {
                    let item = match value {
                        Value::Tuple(items) | Value::Array(items) => items.get(i).unwrap_or(&Value::None),
                        _ => &Value::None,
                    };
                    self.collect_floats(element, item, out)?;
                }
            }
            _ => {
                for member in types.all_members(type_index)? {
                    let field = value.field(&member.name).unwrap_or(&Value::None);
                    self.collect_floats(member.type_index, field, out)?;
                }
            }
        }
        Ok(())
    }
}

fn scalar_tag(kind: TagKind) -> &'static str {
    match kind {
        TagKind::Bool => "bool",
        TagKind::Float => "real",
        TagKind::Pointer => "ref",
        _ => "int",
    }
}

fn named_start<'a>(tag: &'a str, name: Option<&str>) -> BytesStart<'a> {
    let mut start = BytesStart::new(tag);
    if let Some(name) = name {
        start.push_attribute(("name", name));
    }
    start
}

fn write_text_element<W: Write>(
    writer: &mut Writer<W>,
    tag: &str,
    name: Option<&str>,
    attrs: &[(&str, &str)],
    text: &str,
) -> Result<()> {
    let mut start = named_start(tag, name);
    for &attr in attrs {
        start.push_attribute(attr);
    }
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}
