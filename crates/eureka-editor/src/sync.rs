//! Sync executor: push a `SyncPlan` to the content API.
//!
//! Deletes, updates and creates go out as three batches. Each batch fans
//! out concurrently and the three are awaited together; the first failure
//! drops every call still pending and aborts the save. There is no rollback:
//! calls that already completed stay applied on the server.

use crate::api::{self, ContentApi};
use crate::block::{Block, BlockId};
use crate::diff::SyncPlan;
use crate::model::{Document, DocumentChanges, Element, ElementId};
use futures::future::{try_join_all, try_join3};

/// Results of a fully successful batch run.
#[derive(Debug, Clone, Default)]
pub struct SyncOutcome {
    /// Created elements, keyed by the block they were created for.
    pub created: Vec<(BlockId, Element)>,
    pub updated: Vec<Element>,
    pub deleted: Vec<ElementId>,
}

/// Issue every call in `plan`.
pub async fn execute_plan<A: ContentApi + ?Sized>(
    api: &A,
    plan: &SyncPlan,
) -> api::Result<SyncOutcome> {
    let deletes = try_join_all(plan.to_delete.iter().map(|id| api.delete_element(id)));
    let updates = try_join_all(
        plan.to_update
            .iter()
            .map(|update| api.update_element(&update.element_id, &update.changes)),
    );
    let creates = try_join_all(plan.to_create.iter().map(|create| async move {
        let element = api.create_element(&create.element).await?;
        Ok::<_, api::ApiError>((create.block_id.clone(), element))
    }));

    let (_, updated, created) = try_join3(deletes, updates, creates).await?;

    Ok(SyncOutcome {
        created,
        updated,
        deleted: plan.to_delete.clone(),
    })
}

/// Link created elements back to the blocks they were created for.
///
/// Returns how many blocks were linked.
pub fn assign_created_ids(blocks: &mut [Block], created: &[(BlockId, Element)]) -> usize {
    let mut linked = 0;
    for (block_id, element) in created {
        match blocks.iter_mut().find(|block| &block.id == block_id) {
            Some(block) => {
                block.meta.element_id = Some(element.id.clone());
                linked += 1;
            }
            None => tracing::warn!(
                "Block {} vanished before element {} could be linked",
                block_id,
                element.id
            ),
        }
    }
    linked
}

/// Document metadata to send after the element batches, if any.
///
/// The snapshot always goes along; the element list and title only when they
/// differ from what the document last held. `None` when neither differs.
pub fn document_changes(
    document: &Document,
    title: &str,
    order: Vec<ElementId>,
    readme: String,
) -> Option<DocumentChanges> {
    let order_changed = order != document.element_ids;
    let title_changed = title != document.title;
    if !order_changed && !title_changed {
        return None;
    }

    Some(DocumentChanges {
        readme,
        element_ids: order_changed.then_some(order),
        title: title_changed.then(|| title.to_string()),
    })
}
