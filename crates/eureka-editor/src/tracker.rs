//! ElementTracker: last-known persisted state of every element.
//!
//! Rebuilt wholesale on every document load and patched after every save.
//! Between cycles it may diverge from the live blocks; that divergence is
//! what the diff engine measures.

use crate::block::Block;
use crate::diff::linked_groups;
use crate::model::ElementId;
use std::collections::HashMap;

/// Snapshot of one element as last known to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedElement {
    /// Serialized HTML.
    pub text: String,
    /// Structural type tag.
    pub kind: String,
    pub depth: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementTracker {
    entries: HashMap<ElementId, TrackedElement>,
}

impl ElementTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tracker from blocks that are already linked to elements.
    pub fn from_blocks(blocks: &[Block]) -> Self {
        let mut tracker = Self::new();
        tracker.refresh(blocks);
        tracker
    }

    /// Overwrite the entry of every element linked by `blocks`.
    ///
    /// Entries for elements no block links to are left alone.
    pub fn refresh(&mut self, blocks: &[Block]) {
        for group in linked_groups(blocks) {
            self.entries.insert(group.element_id.clone(), group.snapshot());
        }
    }

    pub fn get(&self, id: &ElementId) -> Option<&TrackedElement> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &ElementId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn insert(&mut self, id: ElementId, element: TrackedElement) -> Option<TrackedElement> {
        self.entries.insert(id, element)
    }

    pub fn remove(&mut self, id: &ElementId) -> Option<TrackedElement> {
        self.entries.remove(id)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tracked ids, sorted for deterministic iteration.
    pub fn ids(&self) -> Vec<&ElementId> {
        let mut ids: Vec<&ElementId> = self.entries.keys().collect();
        ids.sort();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ElementId, &TrackedElement)> {
        self.entries.iter()
    }
}
