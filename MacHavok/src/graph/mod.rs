//! Typed object graphs
//!
//! Decoded objects live in an arena and refer to each other by [`ObjectId`],
//! so two pointers to one instance stay one instance through decode and
//! encode. Values nest freely inside an object; only pointers cross objects.

pub mod identity;
pub mod variant;

pub use identity::{IdentityAllocator, PackContext};
pub use variant::{VariantRule, VariantSelector};

use crate::error::{Error, Result};
use crate::types::{TagDataType, TagKind, TypeIndex, TypeSet};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Arena slot of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub usize);

/// A decoded value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(Option<String>),
    Pointer(Option<ObjectId>),
    Array(Vec<Value>),
    Tuple(Vec<Value>),
    Struct(IndexMap<String, Value>),
}

impl Value {
    /// Zero value for a type: what an absent member decodes as.
    pub fn default_for(types: &TypeSet, type_index: TypeIndex) -> Result<Self> {
        let base = types.resolve_base(type_index)?;
        Ok(match types.kind(base)? {
            TagKind::Void | TagKind::Invalid => Self::None,
            TagKind::Bool => Self::Bool(false),
            TagKind::Char | TagKind::Int => Self::Int(0),
            TagKind::Float => Self::Float(0.0),
            TagKind::String => Self::String(None),
            TagKind::Pointer => Self::Pointer(None),
            TagKind::Array => Self::Array(Vec::new()),
            TagKind::Tuple => {
                let count = types.data_type(base)?.tuple_count();
                let element = types.element_type(type_index)?;
                let value = Self::default_for(types, element)?;
                Self::Tuple(vec![value; count as usize])
            }
            TagKind::Class => {
                let mut fields = IndexMap::new();
                for member in types.all_members(type_index)? {
                    fields.insert(member.name.clone(), Self::default_for(types, member.type_index)?);
                }
                Self::Struct(fields)
            }
        })
    }

    /// Member lookup on a struct value.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Self::Struct(fields) => fields.get(name),
            _ => None,
        }
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut Value> {
        match self {
            Self::Struct(fields) => fields.get_mut(name),
            _ => None,
        }
    }

    /// Pointer targets held anywhere inside this value, in member order.
    pub fn pointers(&self) -> Vec<ObjectId> {
        let mut found = Vec::new();
        let mut stack = vec![self];
        while let Some(value) = stack.pop() {
            match value {
                Self::Pointer(Some(id)) => found.push(*id),
                Self::Array(items) | Self::Tuple(items) => stack.extend(items.iter().rev()),
                Self::Struct(fields) => stack.extend(fields.values().rev()),
                _ => {}
            }
        }
        found
    }
}

/// One object in the arena: a concrete type plus its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HkObject {
    pub type_index: TypeIndex,
    pub value: Value,
}

impl HkObject {
    #[must_use]
    pub fn new(type_index: TypeIndex, value: Value) -> Self {
        Self { type_index, value }
    }
}

/// A rooted object graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectGraph {
    objects: Vec<HkObject>,
    root: ObjectId,
}

impl ObjectGraph {
    /// A graph holding only its root object.
    #[must_use]
    pub fn new(root: HkObject) -> Self {
        Self {
            objects: vec![root],
            root: ObjectId(0),
        }
    }

    /// Assemble a graph from an arena, checking that the root exists.
    pub fn from_parts(objects: Vec<HkObject>, root: ObjectId) -> Result<Self> {
        if root.0 >= objects.len() {
            return Err(Error::IncompleteGraph {
                object: root.0,
                message: "root is not in the arena".to_string(),
            });
        }
        Ok(Self { objects, root })
    }

    pub fn add(&mut self, object: HkObject) -> ObjectId {
        self.objects.push(object);
        ObjectId(self.objects.len() - 1)
    }

    #[must_use]
    pub fn root(&self) -> ObjectId {
        self.root
    }

    pub fn set_root(&mut self, root: ObjectId) -> Result<()> {
        self.get(root)?;
        self.root = root;
        Ok(())
    }

    pub fn get(&self, id: ObjectId) -> Result<&HkObject> {
        self.objects.get(id.0).ok_or_else(|| Error::IncompleteGraph {
            object: id.0,
            message: "dangling object id".to_string(),
        })
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Result<&mut HkObject> {
        self.objects.get_mut(id.0).ok_or_else(|| Error::IncompleteGraph {
            object: id.0,
            message: "dangling object id".to_string(),
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &HkObject)> {
        self.objects.iter().enumerate().map(|(i, o)| (ObjectId(i), o))
    }

    /// Objects reachable from the root in breadth-first discovery order.
    pub fn reachable(&self) -> Result<Vec<ObjectId>> {
        let mut seen = vec![false; self.objects.len()];
        let mut order = Vec::new();
        let mut queue = VecDeque::from([self.root]);
        while let Some(id) = queue.pop_front() {
            let object = self.get(id)?;
            if std::mem::replace(&mut seen[id.0], true) {
                continue;
            }
            order.push(id);
            queue.extend(object.value.pointers());
        }
        Ok(order)
    }

    /// Point every object at the type with the same name in `to` and reshape
    /// its value to match.
    ///
    /// Used after a type set has been converted, since removals shift indices.
    /// Values follow `renames` to their new member names, integers are
    /// narrowed to the converted member width, and members the old type did
    /// not have take their default value.
    pub fn retarget(&mut self, from: &TypeSet, to: &TypeSet, renames: &[MemberRename]) -> Result<()> {
        let reshaper = Reshaper { from, to, renames };
        let mut cache: HashMap<TypeIndex, TypeIndex> = HashMap::new();
        for object in &mut self.objects {
            let mapped = match cache.get(&object.type_index) {
                Some(&mapped) => mapped,
                None => {
                    let name = from.display_name(object.type_index);
                    let mapped = to.require(&name, "retargeting object graph")?;
                    cache.insert(object.type_index, mapped);
                    mapped
                }
            };
            let value = std::mem::replace(&mut object.value, Value::None);
            object.value = reshaper.reshape(value, object.type_index, mapped)?;
            object.type_index = mapped;
        }
        Ok(())
    }

    /// Compare two graphs by shape: same type names, same values, and the
    /// same sharing of pointer targets. Arena order does not matter.
    pub fn structurally_eq(&self, types: &TypeSet, other: &ObjectGraph, other_types: &TypeSet) -> bool {
        let mut forward: HashMap<ObjectId, ObjectId> = HashMap::new();
        let mut backward: HashMap<ObjectId, ObjectId> = HashMap::new();
        let mut pending = vec![(self.root, other.root)];
        forward.insert(self.root, other.root);
        backward.insert(other.root, self.root);

        while let Some((a, b)) = pending.pop() {
            let (Ok(left), Ok(right)) = (self.get(a), other.get(b)) else {
                return false;
            };
            if types.display_name(left.type_index) != other_types.display_name(right.type_index) {
                return false;
            }
            let mut pairs = Vec::new();
            if !values_match(&left.value, &right.value, &mut pairs) {
                return false;
            }
            for (x, y) in pairs {
                match (forward.get(&x), backward.get(&y)) {
                    (None, None) => {
                        forward.insert(x, y);
                        backward.insert(y, x);
                        pending.push((x, y));
                    }
                    (Some(&fx), Some(&by)) if fx == y && by == x => {}
                    _ => return false,
                }
            }
        }
        true
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// A member renamed on a type by a conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRename {
    pub type_name: String,
    pub from: String,
    pub to: String,
}

/// Moves values typed against one type set onto the matching types of another.
struct Reshaper<'a> {
    from: &'a TypeSet,
    to: &'a TypeSet,
    renames: &'a [MemberRename],
}

impl Reshaper<'_> {
    fn reshape(&self, value: Value, old: TypeIndex, new: TypeIndex) -> Result<Value> {
        let old_kind = self.from.kind(self.from.resolve_base(old)?)?;
        let new_base = self.to.resolve_base(new)?;
        let new_kind = self.to.kind(new_base)?;

        Ok(match (old_kind, new_kind, value) {
            (TagKind::Class, TagKind::Class, Value::Struct(fields)) => Value::Struct(self.reshape_fields(fields, old, new)?),
            (TagKind::Array, TagKind::Array, Value::Array(items)) => {
                Value::Array(self.reshape_all(items, self.from.element_type(old)?, self.to.element_type(new)?)?)
            }
            (TagKind::Tuple, TagKind::Tuple, Value::Tuple(items)) => {
                Value::Tuple(self.reshape_all(items, self.from.element_type(old)?, self.to.element_type(new)?)?)
            }
            (TagKind::Char | TagKind::Int, TagKind::Char | TagKind::Int, Value::Int(v)) => {
                Value::Int(narrow(v, self.to.data_type(new_base)?))
            }
            (TagKind::Pointer, TagKind::Class, Value::Pointer(target)) => self.wrap_pointer(target, new)?,
            (old_kind, new_kind, value) if old_kind == new_kind => value,
            (old_kind, new_kind, _) => {
                tracing::warn!(
                    "{} ({:?}) became {} ({:?}); value reset",
                    self.from.display_name(old),
                    old_kind,
                    self.to.display_name(new),
                    new_kind
                );
                Value::default_for(self.to, new)?
            }
        })
    }

    fn reshape_all(&self, items: Vec<Value>, old: TypeIndex, new: TypeIndex) -> Result<Vec<Value>> {
        items.into_iter().map(|item| self.reshape(item, old, new)).collect()
    }

    fn reshape_fields(&self, mut fields: IndexMap<String, Value>, old: TypeIndex, new: TypeIndex) -> Result<IndexMap<String, Value>> {
        let mut carried: HashMap<String, (Value, TypeIndex)> = HashMap::new();
        for ancestor in self.from.ancestors(old)? {
            let owner = self.from.display_name(ancestor);
            for member in &self.from.get_checked(ancestor)?.members {
                let Some(value) = fields.shift_remove(&member.name) else {
                    continue;
                };
                let name = self
                    .renames
                    .iter()
                    .filter(|r| r.type_name == owner)
                    .fold(member.name.clone(), |name, r| if r.from == name { r.to.clone() } else { name });
                carried.insert(name, (value, member.type_index));
            }
        }

        let mut reshaped = IndexMap::new();
        for member in self.to.all_members(new)? {
            let value = match carried.remove(&member.name) {
                Some((value, old_type)) => self.reshape(value, old_type, member.type_index)?,
                None => Value::default_for(self.to, member.type_index)?,
            };
            reshaped.insert(member.name.clone(), value);
        }
        Ok(reshaped)
    }

    /// A pointer moved into a wrapper class whose only member is a pointer.
    fn wrap_pointer(&self, target: Option<ObjectId>, new: TypeIndex) -> Result<Value> {
        let mut value = Value::default_for(self.to, new)?;
        if let Value::Struct(fields) = &mut value {
            if fields.len() == 1 {
                if let Some(slot) = fields.values_mut().next().filter(|slot| matches!(slot, Value::Pointer(_))) {
                    *slot = Value::Pointer(target);
                    return Ok(value);
                }
            }
        }
        tracing::warn!("{} cannot hold a pointer; value reset", self.to.display_name(new));
        Ok(value)
    }
}

/// Truncate to the width of an integer type, sign-extending signed types.
fn narrow(value: i64, data_type: TagDataType) -> i64 {
    let bits = data_type.int_bytes().unwrap_or(8) * 8;
    if bits >= 64 {
        return value;
    }
    let shift = 64 - bits;
    if data_type.is_signed() {
        (value << shift) >> shift
    } else {
        (((value as u64) << shift) >> shift) as i64
    }
}

/// Compare two values, collecting the pointer pairs that must correspond.
fn values_match(left: &Value, right: &Value, pairs: &mut Vec<(ObjectId, ObjectId)>) -> bool {
    match (left, right) {
        (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits() || a == b,
        (Value::Pointer(Some(a)), Value::Pointer(Some(b))) => {
            pairs.push((*a, *b));
            true
        }
        (Value::Array(a), Value::Array(b)) | (Value::Tuple(a), Value::Tuple(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_match(x, y, pairs))
        }
        (Value::Struct(a), Value::Struct(b)) => {
            a.len() == b.len()
                && a.iter().all(|(name, x)| b.get(name).is_some_and(|y| values_match(x, y, pairs)))
        }
        _ => left == right,
    }
}
