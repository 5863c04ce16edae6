//! Identity indices for packed items
//!
//! Every addressable item (pointer target, array storage, string) gets a
//! one-based index assigned once. Pointer targets are keyed by [`ObjectId`],
//! so every reference to one object reuses its index.

use super::ObjectId;
use crate::options::PointerWidth;
use crate::types::TypeSet;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct IdentityAllocator {
    next: u32,
    objects: HashMap<ObjectId, u32>,
}

impl Default for IdentityAllocator {
    fn default() -> Self {
        Self {
            next: 1,
            objects: HashMap::new(),
        }
    }
}

impl IdentityAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of `object`, assigning the next free one on first sight.
    /// The flag is true when the index was newly assigned.
    pub fn assign(&mut self, object: ObjectId) -> (u32, bool) {
        if let Some(&index) = self.objects.get(&object) {
            return (index, false);
        }
        let index = self.allocate();
        self.objects.insert(object, index);
        (index, true)
    }

    /// Next index for an item with no object behind it (arrays, strings).
    pub fn allocate(&mut self) -> u32 {
        let index = self.next;
        self.next += 1;
        index
    }

    #[must_use]
    pub fn index_of(&self, object: ObjectId) -> Option<u32> {
        self.objects.get(&object).copied()
    }

    /// Number of indices handed out so far.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.next - 1
    }
}

/// State threaded through one pack session.
#[derive(Debug)]
pub struct PackContext<'a> {
    pub types: &'a TypeSet,
    pub pointer_width: PointerWidth,
    pub ids: IdentityAllocator,
}

impl<'a> PackContext<'a> {
    #[must_use]
    pub fn new(types: &'a TypeSet, pointer_width: PointerWidth) -> Self {
        Self {
            types,
            pointer_width,
            ids: IdentityAllocator::new(),
        }
    }
}
