//! Diff engine: classify the working copy against the element tracker.
//!
//! Every top-level block lands in exactly one bucket:
//!
//! 1. no linked element id → create
//! 2. linked, tracked, and content or depth differ → update
//! 3. linked, tracked, identical → nothing to do
//!
//! Tracked ids that no block links to any more are deletions. Content is
//! compared on [`content_fingerprint`]s, so editor metadata never causes an
//! update on its own.

use crate::block::{Block, BlockId};
use crate::html::{block_to_html, content_fingerprint};
use crate::model::{DocumentId, ElementChanges, ElementId, NewElement};
use crate::tracker::{ElementTracker, TrackedElement};
use std::collections::{HashMap, HashSet};

/// Blocks linked to the same element, in document order.
///
/// An element normally maps to one block, but an element whose HTML parsed
/// into several blocks keeps all of them linked; they are persisted together.
#[derive(Debug, Clone)]
pub struct LinkedGroup<'a> {
    pub element_id: &'a ElementId,
    pub blocks: Vec<&'a Block>,
}

impl LinkedGroup<'_> {
    /// Stored HTML for the whole group.
    pub fn html(&self) -> String {
        self.blocks.iter().map(|block| block_to_html(block)).collect()
    }

    /// Type tag of the group's first block.
    pub fn kind(&self) -> &'static str {
        self.blocks
            .first()
            .map_or("paragraph", |block| block.kind.as_str())
    }

    pub fn depth(&self) -> u32 {
        self.blocks.first().map_or(0, |block| block.meta.depth)
    }

    pub fn snapshot(&self) -> TrackedElement {
        TrackedElement {
            text: self.html(),
            kind: self.kind().to_string(),
            depth: self.depth(),
        }
    }
}

/// Group linked top-level blocks by element id, in order of first appearance.
pub fn linked_groups(blocks: &[Block]) -> Vec<LinkedGroup<'_>> {
    let mut groups: Vec<LinkedGroup<'_>> = Vec::new();
    let mut index: HashMap<&ElementId, usize> = HashMap::new();

    for block in blocks {
        let Some(id) = block.element_id() else {
            continue;
        };
        match index.get(id) {
            Some(&i) => groups[i].blocks.push(block),
            None => {
                index.insert(id, groups.len());
                groups.push(LinkedGroup {
                    element_id: id,
                    blocks: vec![block],
                });
            }
        }
    }

    groups
}

/// A block that needs a new element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCreate {
    pub block_id: BlockId,
    pub element: NewElement,
}

/// An element whose content or depth changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpdate {
    pub element_id: ElementId,
    pub changes: ElementChanges,
}

/// The three disjoint action sets produced by [`diff`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub to_create: Vec<PendingCreate>,
    pub to_update: Vec<PendingUpdate>,
    pub to_delete: Vec<ElementId>,
}

impl SyncPlan {
    /// True when the save needs no element-level calls.
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }

    pub fn created_blocks(&self) -> Vec<&BlockId> {
        self.to_create.iter().map(|c| &c.block_id).collect()
    }

    pub fn updated_elements(&self) -> Vec<&ElementId> {
        self.to_update.iter().map(|u| &u.element_id).collect()
    }
}

/// Classify `blocks` against `tracker`.
pub fn diff(document_id: &DocumentId, blocks: &[Block], tracker: &ElementTracker) -> SyncPlan {
    let mut plan = SyncPlan::default();

    for block in blocks.iter().filter(|b| !b.is_linked()) {
        plan.to_create.push(PendingCreate {
            block_id: block.id.clone(),
            element: NewElement {
                content_id: document_id.clone(),
                name: block.kind.as_str().to_string(),
                text: block_to_html(block),
                depth: block.meta.depth,
            },
        });
    }

    let groups = linked_groups(blocks);
    for group in &groups {
        let Some(tracked) = tracker.get(group.element_id) else {
            tracing::warn!(
                "Block linked to untracked element {}, leaving it alone",
                group.element_id
            );
            continue;
        };

        let html = group.html();
        let content_changed = content_fingerprint(&html) != content_fingerprint(&tracked.text);
        let depth_changed = group.depth() != tracked.depth;
        if content_changed || depth_changed {
            tracing::debug!(
                "Element {} changed (content: {}, depth: {})",
                group.element_id,
                content_changed,
                depth_changed
            );
            plan.to_update.push(PendingUpdate {
                element_id: group.element_id.clone(),
                changes: ElementChanges {
                    text: html,
                    name: group.kind().to_string(),
                    depth: group.depth(),
                },
            });
        }
    }

    let linked: HashSet<&ElementId> = groups.iter().map(|g| g.element_id).collect();
    for id in tracker.ids() {
        if !linked.contains(id) {
            plan.to_delete.push(id.clone());
        }
    }

    plan
}

/// Recompute the document's element order from block `order` metadata.
///
/// Blocks are stable-sorted by `order` (blocks without one go last), mapped
/// to their linked ids, and unlinked blocks are dropped. Grouped blocks
/// contribute their element once.
pub fn element_order(blocks: &[Block]) -> Vec<ElementId> {
    let mut ordered: Vec<&Block> = blocks.iter().collect();
    ordered.sort_by_key(|block| block.meta.order.unwrap_or(usize::MAX));

    let mut seen = HashSet::new();
    ordered
        .into_iter()
        .filter_map(|block| block.element_id())
        .filter(|id| seen.insert(*id))
        .cloned()
        .collect()
}
