//! Cross-version type conversion
//!
//! A [`TypeConverter`] rewrites a type set decoded from a newer engine into
//! the shape an older engine expects, taking missing definitions from a
//! read-only reference set. Conversions go downward one generation at a
//! time (2018/2016/2015 to 2014, then 2014 to 2010); a multi-hop request is
//! the composition of its hops.
//!
//! # Example
//!
//! ```no_run
//! use machavok::convert::TypeConverter;
//! use machavok::options::{EngineVersion, PointerWidth};
//! use machavok::types::TypeSet;
//!
//! let reference = TypeSet::load("hk2010_types.json")?;
//! let decoded = TypeSet::load("decoded.json")?;
//! let converter = TypeConverter::new(&reference, PointerWidth::Eight);
//! let converted = converter.convert(&decoded, EngineVersion::Hk2018, EngineVersion::Hk2010)?;
//! # Ok::<(), machavok::Error>(())
//! ```

pub mod rules;

pub use rules::{ConversionStep, hop_rules, required_reference_types};

use crate::error::{Error, Result};
use crate::graph::MemberRename;
use crate::options::{EngineVersion, PointerWidth};
use crate::types::{TagKind, TypeDescriptor, TypeIndex, TypeSet, TemplateValue, resize_pointers, resize_type};
use std::collections::{HashMap, HashSet};

/// Single-generation hops from `from` down to `to`.
///
/// # Errors
/// Returns [`Error::UnsupportedConversion`] for upward requests and for
/// targets that are not on the downward chain (2018 to 2016, say).
pub fn conversion_path(from: EngineVersion, to: EngineVersion) -> Result<Vec<(EngineVersion, EngineVersion)>> {
    let unsupported = || Error::UnsupportedConversion {
        from: format!("{from:?}"),
        to: format!("{to:?}"),
    };

    let mut path = Vec::new();
    let mut current = from;
    while current != to {
        let next = match current {
            EngineVersion::Hk2015 | EngineVersion::Hk2016 | EngineVersion::Hk2018 => EngineVersion::Hk2014,
            EngineVersion::Hk2014 => EngineVersion::Hk2010,
            EngineVersion::Hk2010 => return Err(unsupported()),
        };
        if next < to {
            return Err(unsupported());
        }
        path.push((current, next));
        current = next;
    }
    Ok(path)
}

/// Member renames along the path from `from` down to `to`, in the order
/// they apply.
///
/// # Errors
/// Returns [`Error::UnsupportedConversion`] when no downward path exists.
pub fn member_renames(from: EngineVersion, to: EngineVersion) -> Result<Vec<MemberRename>> {
    let mut renames = Vec::new();
    for (hop_from, hop_to) in conversion_path(from, to)? {
        let steps = hop_rules(hop_from, hop_to).ok_or_else(|| Error::UnsupportedConversion {
            from: format!("{hop_from:?}"),
            to: format!("{hop_to:?}"),
        })?;
        renames.extend(steps.iter().filter_map(|step| match step {
            ConversionStep::RenameMember { type_name, from, to } => Some(MemberRename {
                type_name: type_name.clone(),
                from: from.clone(),
                to: to.clone(),
            }),
            _ => None,
        }));
    }
    Ok(renames)
}

/// Applies conversion rules against a reference type set.
#[derive(Debug, Clone, Copy)]
pub struct TypeConverter<'a> {
    reference: &'a TypeSet,
    pointer_width: PointerWidth,
}

impl<'a> TypeConverter<'a> {
    #[must_use]
    pub fn new(reference: &'a TypeSet, pointer_width: PointerWidth) -> Self {
        Self {
            reference,
            pointer_width,
        }
    }

    /// Convert `target` from one engine generation to an older one.
    ///
    /// Returns a new set; neither `target` nor the reference is modified.
    ///
    /// # Errors
    /// - [`Error::UnsupportedConversion`] when no downward path exists
    /// - [`Error::MissingTypeReference`] when a rule names a type the
    ///   reference does not define
    pub fn convert(&self, target: &TypeSet, from: EngineVersion, to: EngineVersion) -> Result<TypeSet> {
        let mut set = target.clone();
        for (hop_from, hop_to) in conversion_path(from, to)? {
            let steps = hop_rules(hop_from, hop_to).ok_or_else(|| Error::UnsupportedConversion {
                from: format!("{hop_from:?}"),
                to: format!("{hop_to:?}"),
            })?;
            tracing::info!("Converting types {:?} -> {:?} ({} rules)", hop_from, hop_to, steps.len());
            self.apply(&mut set, steps)?;
        }
        Ok(set)
    }

    /// Run `steps` against `set`, then lay out every type they affected for
    /// this converter's pointer width.
    ///
    /// # Errors
    /// Returns [`Error::MissingTypeReference`] when a step names a type the
    /// reference does not define, or when an import leaves dangling indices.
    pub fn apply(&self, set: &mut TypeSet, steps: &[ConversionStep]) -> Result<()> {
        let mut session = Session {
            reference: self.reference,
            set,
            dirty: HashSet::new(),
            pinned: HashMap::new(),
        };
        for step in steps {
            session.apply(step)?;
        }
        session.relayout(self.pointer_width)
    }
}

/// Mutable state of one [`TypeConverter::apply`] call.
struct Session<'s> {
    reference: &'s TypeSet,
    set: &'s mut TypeSet,
    /// Display names of types whose layout must be recomputed. Names rather
    /// than indices, since removals renumber the set.
    dirty: HashSet<String>,
    /// Forced member offsets by type display name.
    pinned: HashMap<String, (String, u32)>,
}

impl Session<'_> {
    fn apply(&mut self, step: &ConversionStep) -> Result<()> {
        if let Some(name) = step.reference_type() {
            self.reference.require(name, "conversion rule")?;
        }

        match step {
            ConversionStep::CapVersion { type_name, version } => {
                let Some(desc) = self.target_mut(type_name)? else {
                    return Ok(());
                };
                if let Some(current) = desc.version.filter(|v| v > version) {
                    tracing::debug!("{}: version {} -> {}", type_name, current, version);
                    desc.version = Some(*version);
                }
            }
            ConversionStep::RemoveMembers { type_name, members } => {
                let Some(desc) = self.target_mut(type_name)? else {
                    return Ok(());
                };
                let before = desc.members.len();
                desc.members.retain(|m| !members.contains(&m.name));
                if desc.members.len() != before {
                    tracing::debug!("{}: removed {} members", type_name, before - desc.members.len());
                    self.dirty.insert(type_name.clone());
                }
            }
            ConversionStep::RenameMember { type_name, from, to } => {
                if let Some(member) = self.target_mut(type_name)?.and_then(|d| d.member_mut(from)) {
                    member.name.clone_from(to);
                }
            }
            ConversionStep::CopyMemberFlags { type_name } => {
                let reference = self.reference;
                let source = reference.get_checked(reference.require(type_name, "conversion rule")?)?;
                let Some(desc) = self.target_mut(type_name)? else {
                    return Ok(());
                };
                for member in &mut desc.members {
                    if let Some(reference_member) = source.member(&member.name) {
                        member.flags = reference_member.flags;
                    }
                }
            }
            ConversionStep::ImportType { type_name } => {
                let index = self.import(type_name)?;
                tracing::debug!("Imported {} as #{}", type_name, index + 1);
            }
            ConversionStep::RedirectMember {
                type_name,
                member,
                new_type,
            } => self.redirect(type_name, member, new_type)?,
            ConversionStep::Realign { alignment, types } => {
                for name in types {
                    let Some(index) = find_exact(self.set, name) else {
                        continue;
                    };
                    let size = self.set.byte_size_of(index)?;
                    self.set.get_checked_mut(index)?.set_size(size, *alignment);
                    self.dirty.insert(name.clone());
                }
            }
            ConversionStep::ForceOffset {
                type_name,
                member,
                offset,
            } => {
                self.pinned.insert(type_name.clone(), (member.clone(), *offset));
                self.dirty.insert(type_name.clone());
            }
        }
        Ok(())
    }

    /// The target-side type, or `None` (logged) when the target lacks it.
    fn target_mut(&mut self, name: &str) -> Result<Option<&mut TypeDescriptor>> {
        match find_exact(self.set, name) {
            Some(index) => Ok(Some(self.set.get_checked_mut(index)?)),
            None => {
                tracing::debug!("Skipping rule for {}: not in target set", name);
                Ok(None)
            }
        }
    }

    fn redirect(&mut self, type_name: &str, member: &str, new_type: &str) -> Result<()> {
        let Some(owner) = find_exact(self.set, type_name) else {
            tracing::debug!("Skipping redirect of {}.{}: type not in target set", type_name, member);
            return Ok(());
        };
        let Some(old_type) = self.set.get_checked(owner)?.member(member).map(|m| m.type_index) else {
            tracing::debug!("Skipping redirect of {}.{}: no such member", type_name, member);
            return Ok(());
        };

        let new_index = self.import(new_type)?;
        if let Some(m) = self.set.get_checked_mut(owner)?.member_mut(member) {
            m.type_index = new_index;
        }
        self.dirty.insert(type_name.to_string());

        if old_type != new_index && self.set.reference_count(old_type) == 0 {
            let removed = self.set.remove(old_type)?;
            tracing::debug!("Removed unreferenced type {}", removed.name);
        }
        Ok(())
    }

    /// Index of `name` in the target, importing it and its dependencies from
    /// the reference when absent.
    fn import(&mut self, name: &str) -> Result<TypeIndex> {
        let source = self.reference.require(name, "conversion import")?;
        let mut mapping = HashMap::new();
        let mut pending = HashSet::new();
        self.import_index(source, &mut mapping, &mut pending)
    }

    fn import_index(
        &mut self,
        source: TypeIndex,
        mapping: &mut HashMap<TypeIndex, TypeIndex>,
        pending: &mut HashSet<TypeIndex>,
    ) -> Result<TypeIndex> {
        if let Some(&index) = mapping.get(&source) {
            return Ok(index);
        }
        let display = self.reference.display_name(source);
        let existing = (0..self.set.len()).find(|i| !pending.contains(i) && self.set.display_name(*i) == display);
        if let Some(index) = existing {
            mapping.insert(source, index);
            return Ok(index);
        }

        // Reserve the slot first so self-referencing types terminate.
        let mut desc = self.reference.get_checked(source)?.clone();
        let index = self.set.push(desc.clone());
        mapping.insert(source, index);
        pending.insert(index);

        remap_types(&mut desc, |r| self.import_index(r, mapping, pending))?;
        *self.set.get_checked_mut(index)? = desc;
        pending.remove(&index);
        Ok(index)
    }

    /// Resize pointers for `width`, then lay out every class affected by a
    /// dirty type until sizes stop changing.
    fn relayout(self, width: PointerWidth) -> Result<()> {
        let set = self.set;
        let before: Vec<(u32, u32)> = set.iter().map(|(_, t)| (t.byte_size, t.alignment)).collect();
        resize_pointers(set, width.bytes())?;

        let mut dirty: HashSet<TypeIndex> = set
            .iter()
            .filter(|(i, t)| before.get(*i) != Some(&(t.byte_size, t.alignment)))
            .map(|(i, _)| i)
            .collect();
        dirty.extend(self.dirty.iter().filter_map(|name| find_exact(set, name)));

        let mut classes = Vec::new();
        for (index, desc) in set.iter() {
            if set.kind(index)? == TagKind::Class && (desc.parent.is_some() || !desc.members.is_empty()) {
                classes.push(index);
            }
        }
        let pinned: HashMap<TypeIndex, (String, u32)> = self
            .pinned
            .into_iter()
            .filter_map(|(name, pin)| find_exact(set, &name).map(|i| (i, pin)))
            .collect();

        let mut passes = 0;
        loop {
            let mut grown = false;
            for &index in &classes {
                if !affected(set, index, &dirty)? {
                    continue;
                }
                let size = (set.byte_size_of(index)?, set.alignment_of(index)?);
                let forced = pinned.get(&index).map(|(member, offset)| (member.as_str(), *offset));
                resize_type(set, index, forced)?;
                if size != (set.byte_size_of(index)?, set.alignment_of(index)?) {
                    dirty.insert(index);
                    grown = true;
                }
            }
            passes += 1;
            if !grown || passes > set.len() {
                break;
            }
        }

        tracing::debug!("Relayout settled after {} passes, {} dirty types", passes, dirty.len());
        Ok(())
    }
}

/// Whether a class must be laid out again: it, an ancestor, or a type it
/// embeds by value is dirty.
fn affected(set: &TypeSet, index: TypeIndex, dirty: &HashSet<TypeIndex>) -> Result<bool> {
    for ancestor in set.ancestors(index)? {
        if dirty.contains(&ancestor) {
            return Ok(true);
        }
        for member in &set.get_checked(ancestor)?.members {
            if embeds(set, member.type_index, dirty)? {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn embeds(set: &TypeSet, type_index: TypeIndex, dirty: &HashSet<TypeIndex>) -> Result<bool> {
    let mut current = type_index;
    for _ in 0..=set.len() {
        if set.ancestors(current)?.iter().any(|a| dirty.contains(a)) {
            return Ok(true);
        }
        match (set.kind(current)?, set.pointer_target(current)?) {
            (TagKind::Tuple, Some(element)) => current = element,
            _ => return Ok(false),
        }
    }
    Ok(false)
}

/// Look a type up by its full display name, without the plain-name fallback
/// of [`TypeSet::find`].
fn find_exact(set: &TypeSet, name: &str) -> Option<TypeIndex> {
    if name.contains('<') {
        (0..set.len()).find(|&i| set.display_name(i) == name)
    } else {
        set.iter()
            .find(|(_, t)| t.name == name && t.template_params.is_empty())
            .map(|(i, _)| i)
    }
}

/// Rewrite every type index held by `desc`.
fn remap_types(desc: &mut TypeDescriptor, mut f: impl FnMut(TypeIndex) -> Result<TypeIndex>) -> Result<()> {
    if let Some(parent) = desc.parent {
        desc.parent = Some(f(parent)?);
    }
    if let Some(target) = desc.pointer_type {
        desc.pointer_type = Some(f(target)?);
    }
    for member in &mut desc.members {
        member.type_index = f(member.type_index)?;
    }
    for interface in &mut desc.interfaces {
        interface.type_index = f(interface.type_index)?;
    }
    for param in &mut desc.template_params {
        if let TemplateValue::Type(Some(t)) = &mut param.value {
            *t = f(*t)?;
        }
    }
    Ok(())
}
