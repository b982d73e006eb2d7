//! Document loader: persisted document → editable blocks + element tracker.

use crate::block::{Block, BlockMeta};
use crate::html::{self, html_to_blocks};
use crate::markdown;
use crate::model::Document;
use crate::tracker::ElementTracker;

/// Working copy and tracker built from one document.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub blocks: Vec<Block>,
    pub tracker: ElementTracker,
}

/// A document with no live elements but a non-empty snapshot was created
/// outside the editor and must be imported.
pub fn needs_import(document: &Document) -> bool {
    document.live_elements().is_empty() && !document.readme.trim().is_empty()
}

/// Parse an imported document's snapshot into unlinked blocks.
pub fn import_snapshot(document: &Document) -> html::Result<Vec<Block>> {
    markdown::snapshot_to_blocks(&document.readme)
}

/// Convert a document's live elements into linked blocks.
///
/// Every block produced by an element is stamped with that element's id and
/// depth, and with the element's position among the live elements as its
/// order. The tracker is rebuilt from the same blocks.
pub fn load_elements(document: &Document) -> html::Result<LoadedDocument> {
    let mut blocks = Vec::new();

    for (position, element) in document.live_elements().into_iter().enumerate() {
        let parsed = html_to_blocks(&element.text)?;
        if parsed.is_empty() {
            tracing::debug!("Element {} has no content, skipping", element.id);
        }
        for mut block in parsed {
            block.meta = BlockMeta {
                depth: element.depth,
                order: Some(position),
                element_id: Some(element.id.clone()),
            };
            blocks.push(block);
        }
    }

    let tracker = ElementTracker::from_blocks(&blocks);
    Ok(LoadedDocument { blocks, tracker })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockKind;
    use crate::model::{Element, ElementId};

    fn element(id: &str, text: &str, depth: u32) -> Element {
        Element {
            id: id.into(),
            content_id: "doc".into(),
            text: text.to_string(),
            name: "paragraph".to_string(),
            depth,
            order: 0,
            deleted_at: 0,
        }
    }

    #[test]
    fn test_load_stamps_metadata() {
        let mut doc = Document::new("doc", "Title");
        doc.elements = vec![
            element("a", "<h1>Head</h1>", 0),
            element("b", "<p>Body</p>", 2),
        ];
        doc.element_ids = vec!["a".into(), "b".into()];

        let loaded = load_elements(&doc).unwrap();
        assert_eq!(loaded.blocks.len(), 2);

        let body = &loaded.blocks[1];
        assert_eq!(body.element_id(), Some(&ElementId::new("b")));
        assert_eq!(body.meta.depth, 2);
        assert_eq!(body.meta.order, Some(1));

        let tracked = loaded.tracker.get(&"a".into()).unwrap();
        assert_eq!(tracked.kind, "heading");
        assert_eq!(tracked.depth, 0);
    }

    #[test]
    fn test_load_skips_soft_deleted_and_renumbers() {
        let mut doc = Document::new("doc", "Title");
        let mut gone = element("gone", "<p>x</p>", 0);
        gone.deleted_at = 99;
        doc.elements = vec![gone, element("kept", "<p>y</p>", 0)];
        doc.element_ids = vec!["gone".into(), "kept".into()];

        let loaded = load_elements(&doc).unwrap();
        assert_eq!(loaded.blocks.len(), 1);
        assert_eq!(loaded.blocks[0].meta.order, Some(0));
        assert!(!loaded.tracker.contains(&"gone".into()));
    }

    #[test]
    fn test_element_expanding_to_many_blocks() {
        let mut doc = Document::new("doc", "Title");
        doc.elements = vec![element("t", "<ul><li>one</li><li>two</li></ul>", 1)];

        let loaded = load_elements(&doc).unwrap();
        assert_eq!(loaded.blocks.len(), 2);
        assert!(loaded.blocks.iter().all(|b| b.kind == BlockKind::BulletListItem));
        assert!(loaded.blocks.iter().all(|b| b.meta.depth == 1));
        assert_eq!(loaded.tracker.len(), 1);
    }

    #[test]
    fn test_empty_element_produces_no_tracker_entry() {
        let mut doc = Document::new("doc", "Title");
        doc.elements = vec![element("empty", "", 0)];

        let loaded = load_elements(&doc).unwrap();
        assert!(loaded.blocks.is_empty());
        assert!(loaded.tracker.is_empty());
    }

    #[test]
    fn test_needs_import() {
        let mut doc = Document::new("doc", "Title");
        assert!(!needs_import(&doc));

        doc.readme = "# Imported".to_string();
        assert!(needs_import(&doc));

        doc.elements = vec![element("a", "<p>a</p>", 0)];
        assert!(!needs_import(&doc));

        // Only soft-deleted elements left: import again
        doc.elements[0].deleted_at = 1;
        assert!(needs_import(&doc));
    }
}
