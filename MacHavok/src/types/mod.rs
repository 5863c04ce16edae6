//! Reflective type model
//!
//! Every Havok container carries (or implies) a table of type descriptors.
//! This module holds the descriptor model, the ordered [`TypeSet`] and the
//! layout engine that computes offsets for a pointer width.

pub mod descriptor;
pub mod layout;
pub mod type_set;

pub use descriptor::{
    Interface, Member, MemberFlags, TagDataType, TagFormatFlags, TagKind, TemplateParam, TemplateValue,
    TypeDescriptor, TypeIndex,
};
pub use layout::{realign_types, resize_pointers, resize_type, resize_types, resize_with_forced_offset};
pub use type_set::TypeSet;
