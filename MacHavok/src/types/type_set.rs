//! Ordered collection of type descriptors
//!
//! Indices are 0-based here and 1-based on the wire (0 meaning "none").

use super::descriptor::{Member, TagDataType, TagFormatFlags, TagKind, TemplateValue, TypeDescriptor, TypeIndex};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Deepest template nesting rendered by [`TypeSet::display_name`].
const MAX_TEMPLATE_DEPTH: usize = 16;

/// An ordered, index-addressed set of [`TypeDescriptor`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeSet {
    types: Vec<TypeDescriptor>,
}

impl TypeSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_types(types: Vec<TypeDescriptor>) -> Self {
        Self { types }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeIndex, &TypeDescriptor)> {
        self.types.iter().enumerate()
    }

    #[must_use]
    pub fn get(&self, index: TypeIndex) -> Option<&TypeDescriptor> {
        self.types.get(index)
    }

    pub fn get_mut(&mut self, index: TypeIndex) -> Option<&mut TypeDescriptor> {
        self.types.get_mut(index)
    }

    /// Look up a type, failing with [`Error::MissingTypeReference`] when the
    /// index is out of range.
    pub fn get_checked(&self, index: TypeIndex) -> Result<&TypeDescriptor> {
        self.types
            .get(index)
            .ok_or_else(|| Error::missing_type(format!("#{}", index + 1), "type index out of range"))
    }

    pub fn get_checked_mut(&mut self, index: TypeIndex) -> Result<&mut TypeDescriptor> {
        self.types
            .get_mut(index)
            .ok_or_else(|| Error::missing_type(format!("#{}", index + 1), "type index out of range"))
    }

    /// Append a descriptor and return its index.
    pub fn push(&mut self, descriptor: TypeDescriptor) -> TypeIndex {
        self.types.push(descriptor);
        self.types.len() - 1
    }

    /// Find a type by template-rendered name (`hkArray<hkInt32>`), falling
    /// back to the first type with that plain name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<TypeIndex> {
        let has_templates = name.contains('<');
        if has_templates {
            if let Some(index) = (0..self.types.len()).find(|&i| self.display_name(i) == name) {
                return Some(index);
            }
        }
        self.types.iter().position(|t| t.name == name)
    }

    /// Like [`find`](Self::find) but failing with `MissingTypeReference`.
    pub fn require(&self, name: &str, context: &str) -> Result<TypeIndex> {
        self.find(name).ok_or_else(|| Error::missing_type(name, context))
    }

    /// Name with template arguments rendered, e.g. `hkArray<hkInt32, hkContainerHeapAllocator>`.
    #[must_use]
    pub fn display_name(&self, index: TypeIndex) -> String {
        self.display_name_at_depth(index, 0)
    }

    fn display_name_at_depth(&self, index: TypeIndex, depth: usize) -> String {
        let Some(desc) = self.types.get(index) else {
            return format!("#{}", index + 1);
        };
        if desc.template_params.is_empty() || depth >= MAX_TEMPLATE_DEPTH {
            return desc.name.clone();
        }
        let args: Vec<String> = desc
            .template_params
            .iter()
            .map(|p| match p.value {
                TemplateValue::Type(Some(inner)) => self.display_name_at_depth(inner, depth + 1),
                TemplateValue::Type(None) => "void".to_string(),
                TemplateValue::Value(v) => v.to_string(),
            })
            .collect();
        format!("{}<{}>", desc.name, args.join(", "))
    }

    /// Walk the parent chain and return the first type matching `pred`.
    fn find_in_chain(&self, index: TypeIndex, pred: impl Fn(&TypeDescriptor) -> bool) -> Result<Option<TypeIndex>> {
        let mut current = index;
        for _ in 0..=self.types.len() {
            let desc = self.get_checked(current)?;
            if pred(desc) {
                return Ok(Some(current));
            }
            match desc.parent {
                Some(parent) => current = parent,
                None => return Ok(None),
            }
        }
        Err(Error::missing_type(self.display_name(index), "cyclic parent chain"))
    }

    /// First type in the parent chain that declares its own tag data type.
    ///
    /// Wrappers such as `hkEnum`, `hkFlags` and `hkRefPtr` inherit their kind
    /// from a parent; this finds the type that actually decides it.
    pub fn resolve_base(&self, index: TypeIndex) -> Result<TypeIndex> {
        Ok(self
            .find_in_chain(index, |t| t.format.contains(TagFormatFlags::SUB_TYPE))?
            .unwrap_or(index))
    }

    /// Resolved tag data type of a type (VOID when nothing in the chain declares one).
    pub fn data_type(&self, index: TypeIndex) -> Result<TagDataType> {
        let base = self.resolve_base(index)?;
        let desc = self.get_checked(base)?;
        Ok(if desc.format.contains(TagFormatFlags::SUB_TYPE) {
            desc.data_type
        } else {
            TagDataType::VOID
        })
    }

    pub fn kind(&self, index: TypeIndex) -> Result<TagKind> {
        Ok(self.data_type(index)?.kind())
    }

    /// Pointer/array/tuple target, inherited through the parent chain.
    pub fn pointer_target(&self, index: TypeIndex) -> Result<Option<TypeIndex>> {
        let owner = self.find_in_chain(index, |t| t.format.contains(TagFormatFlags::POINTER))?;
        Ok(owner.and_then(|o| self.types[o].pointer_type))
    }

    /// Like [`pointer_target`](Self::pointer_target) but required.
    pub fn element_type(&self, index: TypeIndex) -> Result<TypeIndex> {
        self.pointer_target(index)?
            .ok_or_else(|| Error::missing_type(self.display_name(index), "container type has no element type"))
    }

    /// Follow base, pointer, array and tuple wrappers down to the underlying
    /// class or primitive.
    pub fn resolve_element(&self, index: TypeIndex) -> Result<TypeIndex> {
        let mut current = index;
        for _ in 0..=self.types.len() {
            let base = self.resolve_base(current)?;
            let kind = self.kind(base)?;
            match (kind, self.pointer_target(base)?) {
                (TagKind::Pointer | TagKind::Array | TagKind::Tuple, Some(target)) => current = target,
                _ => return Ok(base),
            }
        }
        Err(Error::missing_type(self.display_name(index), "cyclic element chain"))
    }

    /// Byte size declared by the first type in the parent chain with `BYTE_SIZE`.
    pub fn byte_size_of(&self, index: TypeIndex) -> Result<u32> {
        let owner = self.find_in_chain(index, |t| t.format.contains(TagFormatFlags::BYTE_SIZE))?;
        Ok(owner.map_or(0, |o| self.types[o].byte_size))
    }

    pub fn alignment_of(&self, index: TypeIndex) -> Result<u32> {
        let owner = self.find_in_chain(index, |t| t.format.contains(TagFormatFlags::BYTE_SIZE))?;
        Ok(owner.map_or(0, |o| self.types[o].alignment))
    }

    pub fn version_of(&self, index: TypeIndex) -> Result<Option<u32>> {
        Ok(self.get_checked(index)?.version)
    }

    /// The parent chain of a type, root first and ending with the type itself.
    pub fn ancestors(&self, index: TypeIndex) -> Result<Vec<TypeIndex>> {
        let mut chain = Vec::new();
        let mut current = Some(index);
        while let Some(i) = current {
            if chain.len() > self.types.len() {
                return Err(Error::missing_type(self.display_name(index), "cyclic parent chain"));
            }
            chain.push(i);
            current = self.get_checked(i)?.parent;
        }
        chain.reverse();
        Ok(chain)
    }

    /// Inherited and local members in layout order.
    pub fn all_members(&self, index: TypeIndex) -> Result<Vec<&Member>> {
        let mut members = Vec::new();
        for ancestor in self.ancestors(index)? {
            members.extend(self.types[ancestor].members.iter());
        }
        Ok(members)
    }

    /// Whether `base` is `index` or one of its ancestors.
    pub fn is_subclass_of(&self, index: TypeIndex, base: TypeIndex) -> Result<bool> {
        Ok(self.ancestors(index)?.contains(&base))
    }

    /// Number of references to `index` held by other types.
    #[must_use]
    pub fn reference_count(&self, index: TypeIndex) -> usize {
        self.types
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, t)| t.referenced_types().filter(|&r| r == index).count())
            .sum()
    }

    /// Check that every reference points inside the set.
    pub fn validate(&self) -> Result<()> {
        for (i, desc) in self.types.iter().enumerate() {
            if let Some(bad) = desc.referenced_types().find(|&r| r >= self.types.len()) {
                return Err(Error::missing_type(
                    format!("#{}", bad + 1),
                    format!("referenced by {}", self.display_name(i)),
                ));
            }
        }
        Ok(())
    }

    /// Remove a type and renumber every reference after it.
    ///
    /// Renumbering is stable: relative order of the remaining types is kept.
    /// Fails if another type still refers to the removed one.
    pub fn remove(&mut self, index: TypeIndex) -> Result<TypeDescriptor> {
        self.get_checked(index)?;
        if let Some((holder, _)) = self
            .iter()
            .find(|(i, t)| *i != index && t.referenced_types().any(|r| r == index))
        {
            return Err(Error::missing_type(
                self.display_name(index),
                format!("removed type is still referenced by {}", self.display_name(holder)),
            ));
        }

        let removed = self.types.remove(index);
        let remap = |r: TypeIndex| if r > index { r - 1 } else { r };
        for desc in &mut self.types {
            desc.parent = desc.parent.map(remap);
            desc.pointer_type = desc.pointer_type.map(remap);
            for member in &mut desc.members {
                member.type_index = remap(member.type_index);
            }
            for interface in &mut desc.interfaces {
                interface.type_index = remap(interface.type_index);
            }
            for param in &mut desc.template_params {
                if let TemplateValue::Type(Some(t)) = &mut param.value {
                    *t = remap(*t);
                }
            }
        }
        self.validate()?;
        Ok(removed)
    }

    /// Parse a set from JSON (a bundled reference schema).
    pub fn from_json(json: &str) -> Result<Self> {
        let set: Self = serde_json::from_str(json)?;
        set.validate()?;
        Ok(set)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a JSON schema from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::descriptor::{Member, TagDataType};

    fn sample() -> TypeSet {
        let mut set = TypeSet::new();
        let int = set.push(TypeDescriptor::new("hkInt32").with_data_type(TagDataType::int(4, true)).with_size(4, 4));
        let base = set.push(TypeDescriptor::new("hkBaseObject").with_data_type(TagDataType::CLASS).with_size(8, 8));
        let refobj = set.push(
            TypeDescriptor::new("hkReferencedObject")
                .with_parent(base)
                .with_size(16, 8)
                .with_member(Member::new("refCount", int, 8)),
        );
        let array = set.push(
            TypeDescriptor::new("hkArray")
                .with_data_type(TagDataType::ARRAY)
                .with_pointer_type(int)
                .with_size(16, 8)
                .with_template("tT", TemplateValue::Type(Some(int))),
        );
        let _ = (refobj, array);
        set
    }

    #[test]
    fn test_resolve_base_inherits_kind() {
        let set = sample();
        assert_eq!(set.resolve_base(2).unwrap(), 1);
        assert_eq!(set.kind(2).unwrap(), TagKind::Class);
        assert_eq!(set.kind(3).unwrap(), TagKind::Array);
        assert_eq!(set.resolve_element(3).unwrap(), 0);
    }

    #[test]
    fn test_display_name_and_find() {
        let set = sample();
        assert_eq!(set.display_name(3), "hkArray<hkInt32>");
        assert_eq!(set.find("hkArray<hkInt32>"), Some(3));
        assert_eq!(set.find("hkArray"), Some(3));
        assert_eq!(set.find("hkNothing"), None);
        assert!(matches!(
            set.require("hkNothing", "test"),
            Err(Error::MissingTypeReference { .. })
        ));
    }

    #[test]
    fn test_ancestors_and_members() {
        let set = sample();
        assert_eq!(set.ancestors(2).unwrap(), vec![1, 2]);
        let names: Vec<_> = set.all_members(2).unwrap().iter().map(|m| m.name.clone()).collect();
        assert_eq!(names, vec!["refCount"]);
        assert_eq!(set.byte_size_of(2).unwrap(), 16);
    }

    #[test]
    fn test_remove_reindexes_references() {
        let mut set = sample();
        set.push(TypeDescriptor::new("hkUnused"));
        let tail = set.push(TypeDescriptor::new("hkTail").with_parent(2));
        set.remove(4).unwrap();
        assert_eq!(set.len(), 5);
        assert_eq!(set.get(tail - 1).unwrap().parent, Some(2));
        assert_eq!(set.get(3).unwrap().pointer_type, Some(0));
    }

    #[test]
    fn test_remove_referenced_type_fails() {
        let mut set = sample();
        let err = set.remove(0).unwrap_err();
        assert!(err.to_string().contains("still referenced"));
        assert_eq!(set.len(), 4);
    }

    #[test]
    fn test_json_round_trip() {
        let set = sample();
        let json = set.to_json().unwrap();
        assert_eq!(TypeSet::from_json(&json).unwrap(), set);
    }
}
