//! Editable blocks: the editor's working representation of content.
//!
//! A block is transient. Its `BlockId` is generated locally and only stable
//! for the current editing session. Once a block is linked to a persisted
//! element, `BlockMeta::element_id` carries that element's id.

use crate::model::ElementId;
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use uuid::Uuid;

/// Session-local block identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(String);

impl BlockId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for BlockId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Structural type of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Paragraph,
    /// Heading with level 1..=6.
    Heading(u8),
    BulletListItem,
    NumberedListItem,
    CodeBlock,
    Quote,
    Table,
    Image,
    Divider,
}

impl BlockKind {
    /// Type tag stored in `Element::name`.
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::Paragraph => "paragraph",
            BlockKind::Heading(_) => "heading",
            BlockKind::BulletListItem => "bulletListItem",
            BlockKind::NumberedListItem => "numberedListItem",
            BlockKind::CodeBlock => "codeBlock",
            BlockKind::Quote => "quote",
            BlockKind::Table => "table",
            BlockKind::Image => "image",
            BlockKind::Divider => "divider",
        }
    }

    pub fn is_list_item(&self) -> bool {
        matches!(self, BlockKind::BulletListItem | BlockKind::NumberedListItem)
    }
}

impl Display for BlockKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reconciliation metadata attached to a block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockMeta {
    /// Nesting/indent level.
    pub depth: u32,
    /// Position used to recompute the document's element order.
    pub order: Option<usize>,
    /// Persisted element this block is linked to, if any.
    pub element_id: Option<ElementId>,
}

/// One editable block.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub id: BlockId,
    pub kind: BlockKind,
    /// Visible attributes (style, class, src, ...). Rendered as plain HTML
    /// attributes, so changes here count as content changes.
    pub props: BTreeMap<String, String>,
    /// Inline HTML content.
    pub content: String,
    pub children: Vec<Block>,
    pub meta: BlockMeta,
}

impl Block {
    pub fn new(kind: BlockKind, content: impl Into<String>) -> Self {
        Self {
            id: BlockId::generate(),
            kind,
            props: BTreeMap::new(),
            content: content.into(),
            children: Vec::new(),
            meta: BlockMeta::default(),
        }
    }

    pub fn paragraph(content: impl Into<String>) -> Self {
        Self::new(BlockKind::Paragraph, content)
    }

    pub fn heading(level: u8, content: impl Into<String>) -> Self {
        Self::new(BlockKind::Heading(level.clamp(1, 6)), content)
    }

    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    pub fn with_children(mut self, children: Vec<Block>) -> Self {
        self.children = children;
        self
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.meta.depth = depth;
        self
    }

    pub fn linked_to(mut self, element_id: impl Into<ElementId>) -> Self {
        self.meta.element_id = Some(element_id.into());
        self
    }

    /// The persisted element this block is linked to.
    pub fn element_id(&self) -> Option<&ElementId> {
        self.meta.element_id.as_ref()
    }

    pub fn is_linked(&self) -> bool {
        self.meta.element_id.is_some()
    }
}

/// Stamp every top-level block's `order` with its current position.
pub fn stamp_order(blocks: &mut [Block]) {
    for (position, block) in blocks.iter_mut().enumerate() {
        block.meta.order = Some(position);
    }
}
