//! Type layout engine
//!
//! Computes member offsets, byte sizes and alignment for a [`TypeSet`] given
//! a pointer width. Layout is tight within one class and aligned only at
//! ancestor boundaries, which is what the engine's serializer produces.

use super::descriptor::{TagKind, TypeIndex};
use super::type_set::TypeSet;
use crate::error::Result;
use crate::options::PointerWidth;

/// Give every pointer-like type the size and alignment of a pointer.
///
/// A type is pointer-like when its name ends in `*`, or when it owns exactly
/// one member whose type resolves to a pointer or string (`hkStringPtr`,
/// `hkRefPtr<T>`, `hkRefVariant` and friends).
pub fn resize_pointers(set: &mut TypeSet, width: u32) -> Result<()> {
    let width = PointerWidth::try_from(width)?.bytes();

    let mut targets = Vec::new();
    for (index, desc) in set.iter() {
        let pointer_like = if desc.name.ends_with('*') {
            true
        } else if let [member] = desc.members.as_slice() {
            matches!(set.kind(member.type_index)?, TagKind::Pointer | TagKind::String)
        } else {
            false
        };
        if pointer_like {
            targets.push(index);
        }
    }

    tracing::debug!("Resizing {} pointer-like types to {} bytes", targets.len(), width);
    for index in targets {
        set.get_checked_mut(index)?.set_size(width, width);
    }
    Ok(())
}

/// Override alignment of the named types. Offsets are not recomputed.
pub fn realign_types(set: &mut TypeSet, alignment: u32, names: &[&str]) -> Result<()> {
    for name in names {
        let Some(index) = set.find(name) else {
            continue;
        };
        let size = set.byte_size_of(index)?;
        set.get_checked_mut(index)?.set_size(size, alignment);
    }
    Ok(())
}

/// Recompute member offsets and byte size of the named types.
pub fn resize_types(set: &mut TypeSet, names: &[&str]) -> Result<()> {
    for name in names {
        if let Some(index) = set.find(name) {
            resize_type(set, index, None)?;
        }
    }
    Ok(())
}

/// As [`resize_types`] for one type, pinning `member` at `forced_offset`.
///
/// Some engine builds place a member away from its computed offset; forcing
/// reproduces their layout.
pub fn resize_with_forced_offset(set: &mut TypeSet, type_name: &str, member: &str, forced_offset: u32) -> Result<()> {
    if let Some(index) = set.find(type_name) {
        resize_type(set, index, Some((member, forced_offset)))?;
    }
    Ok(())
}

/// Lay out one type by index.
pub fn resize_type(set: &mut TypeSet, index: TypeIndex, forced: Option<(&str, u32)>) -> Result<()> {
    let chain = set.ancestors(index)?;
    let mut offset = 0u32;
    let mut placed: Vec<(TypeIndex, usize, u32)> = Vec::new();

    for &ancestor in &chain {
        let desc = set.get_checked(ancestor)?;
        for (slot, member) in desc.members.iter().enumerate() {
            let member_offset = match forced {
                Some((name, forced_offset)) if member.name == name => forced_offset,
                _ => offset,
            };
            placed.push((ancestor, slot, member_offset));
            offset = member_offset + set.byte_size_of(member.type_index)?;
        }

        let alignment = desc.alignment;
        if alignment > 0 {
            // An empty prefix still reserves one unit (the vtable slot of hkBaseObject).
            offset = if offset == 0 {
                alignment
            } else {
                offset.next_multiple_of(alignment)
            };
        }
    }

    for (ancestor, slot, member_offset) in placed {
        if let Some(member) = set.get_checked_mut(ancestor)?.members.get_mut(slot) {
            member.offset = member_offset;
        }
    }

    let alignment = set.alignment_of(index)?;
    set.get_checked_mut(index)?.set_size(offset, alignment);
    Ok(())
}
