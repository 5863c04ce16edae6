//! XML tagfile reading
//!
//! The document is first read into a small element tree, then objects are
//! decoded against a [`TypeSet`]. Objects are taken in numeric id order; the
//! lowest id is the root. A referenced object is materialized the first time
//! a reference to it is read, so shared targets stay shared.

use super::{float_count, is_token_kind, parse_real, parse_ref, vec_tag};
use crate::error::{Error, Result};
use crate::graph::{HkObject, ObjectGraph, ObjectId, Value, VariantSelector};
use crate::types::{TagKind, TypeIndex, TypeSet};
use indexmap::IndexMap;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::Path;

/// A decoded XML tagfile.
#[derive(Debug, Clone)]
pub struct XmlTagfile {
    /// Value of the `sdkversion` attribute.
    pub sdk_version: String,
    /// Value of the `version` attribute.
    pub tagfile_version: u32,
    pub graph: ObjectGraph,
}

/// Read an XML tagfile from disk
///
/// # Errors
/// Returns an error if the file cannot be read or does not decode against `types`.
pub fn read_xml<P: AsRef<Path>>(path: P, types: &TypeSet) -> Result<XmlTagfile> {
    let content = fs::read_to_string(path)?;
    parse_xml(&content, types)
}

/// Parse an XML tagfile with the built-in variant rules
///
/// # Errors
/// Returns an error if the XML is malformed, names a class missing from
/// `types`, or an object's concrete type cannot be determined.
pub fn parse_xml(content: &str, types: &TypeSet) -> Result<XmlTagfile> {
    parse_xml_with_selector(content, types, &VariantSelector::new())
}

/// Parse an XML tagfile, resolving untyped objects with `selector`
///
/// # Errors
/// Same as [`parse_xml`].
pub fn parse_xml_with_selector(content: &str, types: &TypeSet, selector: &VariantSelector) -> Result<XmlTagfile> {
    let document = parse_document(content)?;
    if document.tag != "hktagfile" {
        return Err(Error::InvalidFormat(format!(
            "expected <hktagfile> root element, found <{}>",
            document.tag
        )));
    }
    let tagfile_version = match document.attr("version") {
        Some(v) => v
            .parse()
            .map_err(|_| Error::InvalidFormat(format!("invalid tagfile version '{v}'")))?,
        None => 0,
    };
    let sdk_version = document.attr("sdkversion").unwrap_or_default().to_string();

    for class in document.children.iter().filter(|c| c.tag == "class") {
        let name = class
            .attr("name")
            .ok_or_else(|| Error::InvalidFormat("<class> without a name".to_string()))?;
        types.require(name, "XML class catalog")?;
    }

    let mut objects = Vec::new();
    for element in document.children.iter().filter(|c| c.tag == "object") {
        let id = element
            .attr("id")
            .ok_or_else(|| Error::InvalidFormat("<object> without an id".to_string()))?;
        objects.push((parse_ref(id)?, element));
    }
    objects.sort_by_key(|(id, _)| *id);
    let Some(&(root_id, _)) = objects.first() else {
        return Err(Error::InvalidFormat("XML tagfile contains no objects".to_string()));
    };

    let mut builder = GraphBuilder {
        types,
        selector,
        elements: objects.iter().copied().collect(),
        arena: Vec::new(),
        ids: HashMap::new(),
        queue: VecDeque::new(),
    };
    let root = builder.materialize(root_id, None)?;
    builder.drain()?;

    for &(id, element) in &objects {
        if builder.ids.contains_key(&id) {
            continue;
        }
        if element.attr("type").is_none() {
            tracing::warn!("Skipping unreferenced untyped object #{id:04}");
            continue;
        }
        builder.materialize(id, None)?;
        builder.drain()?;
    }

    tracing::debug!("Parsed XML tagfile: {} objects", builder.arena.len());
    let graph = ObjectGraph::from_parts(builder.arena, root)?;
    Ok(XmlTagfile {
        sdk_version,
        tagfile_version,
        graph,
    })
}

/// Minimal element tree.
#[derive(Debug, Default)]
struct Element {
    tag: String,
    attrs: Vec<(String, String)>,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> Result<Self> {
        let mut element = Element {
            tag: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            ..Default::default()
        };
        for attr in start.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            element.attrs.push((key, value));
        }
        Ok(element)
    }

    fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    fn named(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.attr("name") == Some(name))
    }
}

fn parse_document(content: &str) -> Result<Element> {
    // Text is kept verbatim; token readers split or trim it themselves.
    let mut reader = Reader::from_str(content);

    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => stack.push(Element::from_start(&e)?),
            Ok(Event::Empty(e)) => {
                let element = Element::from_start(&e)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&e.unescape()?);
                }
            }
            Ok(Event::End(_)) => {
                let Some(element) = stack.pop() else {
                    return Err(Error::InvalidFormat("unbalanced closing tag".to_string()));
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(Error::InvalidFormat("unexpected end of XML document".to_string()));
    }
    root.ok_or_else(|| Error::InvalidFormat("empty XML document".to_string()))
}

struct GraphBuilder<'a, 'd> {
    types: &'a TypeSet,
    selector: &'a VariantSelector,
    elements: HashMap<u32, &'d Element>,
    arena: Vec<HkObject>,
    /// Arena id of each XML object id already materialized.
    ids: HashMap<u32, ObjectId>,
    queue: VecDeque<(ObjectId, &'d Element)>,
}

impl<'d> GraphBuilder<'_, 'd> {
    /// Arena id for an XML object, creating and queueing it on first use.
    ///
    /// `expected` is the pointee type of the reference, used to pick a
    /// concrete type when the object carries none.
    fn materialize(&mut self, xml_id: u32, expected: Option<TypeIndex>) -> Result<ObjectId> {
        if let Some(&id) = self.ids.get(&xml_id) {
            return Ok(id);
        }
        let element = *self
            .elements
            .get(&xml_id)
            .ok_or_else(|| Error::InvalidFormat(format!("reference to missing object #{xml_id:04}")))?;

        let type_index = match element.attr("type") {
            Some(name) => self.types.require(name, "XML object")?,
            None => {
                let base = expected
                    .ok_or_else(|| Error::InvalidFormat(format!("object #{xml_id:04} has no type")))?;
                let base_name = self.types.display_name(base);
                let members: Vec<&str> = element.children.iter().filter_map(|c| c.attr("name")).collect();
                let concrete = self.selector.select(&base_name, &members)?;
                tracing::debug!("Object #{xml_id:04}: {base_name} resolved to {concrete}");
                self.types.require(concrete, "variant selection")?
            }
        };

        self.arena.push(HkObject::new(type_index, Value::None));
        let id = ObjectId(self.arena.len() - 1);
        self.ids.insert(xml_id, id);
        self.queue.push_back((id, element));
        Ok(id)
    }

    fn drain(&mut self) -> Result<()> {
        while let Some((id, element)) = self.queue.pop_front() {
            let type_index = self.arena[id.0].type_index;
            let value = self.read_struct(element, type_index)?;
            self.arena[id.0].value = value;
        }
        Ok(())
    }

    fn read_struct(&mut self, element: &'d Element, type_index: TypeIndex) -> Result<Value> {
        let types = self.types;
        let mut fields = IndexMap::new();
        for member in types.all_members(type_index)? {
            let value = match element.named(&member.name) {
                Some(child) => self.read_value(child, member.type_index)?,
                None => Value::default_for(types, member.type_index)?,
            };
            fields.insert(member.name.clone(), value);
        }
        Ok(Value::Struct(fields))
    }

    fn read_value(&mut self, element: &'d Element, type_index: TypeIndex) -> Result<Value> {
        let types = self.types;
        if vec_tag(types, type_index)?.is_some() && element.tag.starts_with("vec") {
            let mut tokens = element.text.split_whitespace();
            let value = read_float_block(types, type_index, &mut tokens)?;
            if tokens.next().is_some() {
                return Err(Error::InvalidFormat(format!(
                    "<{}> holds more floats than {} needs",
                    element.tag,
                    types.display_name(type_index)
                )));
            }
            return Ok(value);
        }

        let base = types.resolve_base(type_index)?;
        Ok(match types.kind(base)? {
            TagKind::Void => Value::None,
            TagKind::String => {
                if element.attr("null") == Some("1") {
                    Value::String(None)
                } else {
                    Value::String(Some(element.text.clone()))
                }
            }
            TagKind::Class => self.read_struct(element, type_index)?,
            TagKind::Array => {
                let element_type = types.element_type(type_index)?;
                Value::Array(self.read_sequence(element, element_type)?)
            }
            TagKind::Tuple => {
                let element_type = types.element_type(type_index)?;
                let count = types.data_type(base)?.tuple_count() as usize;
                let mut items = self.read_sequence(element, element_type)?;
                if items.len() > count {
                    return Err(Error::InvalidFormat(format!(
                        "tuple {} has {} elements, expected {count}",
                        types.display_name(type_index),
                        items.len()
                    )));
                }
                while items.len() < count {
                    items.push(Value::default_for(types, element_type)?);
                }
                Value::Tuple(items)
            }
            _ => self.read_token(type_index, element.text.trim())?,
        })
    }

    fn read_sequence(&mut self, element: &'d Element, element_type: TypeIndex) -> Result<Vec<Value>> {
        let values = if is_token_kind(self.types, element_type)? {
            element
                .text
                .split_whitespace()
                .map(|token| self.read_token(element_type, token))
                .collect::<Result<Vec<_>>>()?
        } else {
            element
                .children
                .iter()
                .map(|child| self.read_value(child, element_type))
                .collect::<Result<Vec<_>>>()?
        };

        if let Some(size) = element.attr("size") {
            if size.parse::<usize>().ok() != Some(values.len()) {
                tracing::warn!(
                    "<{}> declares size {size} but holds {} elements",
                    element.tag,
                    values.len()
                );
            }
        }
        Ok(values)
    }

    fn read_token(&mut self, type_index: TypeIndex, token: &str) -> Result<Value> {
        let types = self.types;
        let bad = |what: &str| Error::InvalidFormat(format!("invalid {what} '{token}'"));
        Ok(match types.kind(type_index)? {
            TagKind::Bool => match token {
                "1" | "true" => Value::Bool(true),
                "0" | "false" | "" => Value::Bool(false),
                _ => return Err(bad("bool")),
            },
            TagKind::Char | TagKind::Int => {
                if token.is_empty() {
                    Value::Int(0)
                } else if let Ok(value) = token.parse::<i64>() {
                    Value::Int(value)
                } else {
                    Value::Int(token.parse::<u64>().map_err(|_| bad("integer"))? as i64)
                }
            }
            TagKind::Float => Value::Float(parse_real(token, types.byte_size_of(type_index)?)?),
            TagKind::Pointer => {
                let xml_id = if token.is_empty() { 0 } else { parse_ref(token)? };
                if xml_id == 0 {
                    Value::Pointer(None)
                } else {
                    let target = types.pointer_target(types.resolve_base(type_index)?)?;
                    Value::Pointer(Some(self.materialize(xml_id, target)?))
                }
            }
            kind => {
                return Err(Error::InvalidFormat(format!(
                    "{kind:?} type {} cannot be read from a token",
                    types.display_name(type_index)
                )));
            }
        })
    }
}

/// Rebuild a float block from its flat token list, following the type's
/// element and member structure.
fn read_float_block<'t>(
    types: &TypeSet,
    type_index: TypeIndex,
    tokens: &mut impl Iterator<Item = &'t str>,
) -> Result<Value> {
    let base = types.resolve_base(type_index)?;
    match types.kind(base)? {
        TagKind::Float => {
            let token = tokens.next().ok_or_else(|| {
                Error::InvalidFormat(format!(
                    "float block too short for {}",
                    types.display_name(type_index)
                ))
            })?;
            Ok(Value::Float(parse_real(token, types.byte_size_of(type_index)?)?))
        }
        TagKind::Tuple => {
            let element = types.element_type(type_index)?;
            let count = types.data_type(base)?.tuple_count();
            let items = (0..count)
                .map(|_| read_float_block(types, element, tokens))
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::Tuple(items))
        }
        TagKind::Class if float_count(types, type_index)?.is_some() => {
            let mut fields = IndexMap::new();
            for member in types.all_members(type_index)? {
                fields.insert(member.name.clone(), read_float_block(types, member.type_index, tokens)?);
            }
            Ok(Value::Struct(fields))
        }
        kind => Err(Error::InvalidFormat(format!(
            "{kind:?} type {} is not a float block",
            types.display_name(type_index)
        ))),
    }
}
