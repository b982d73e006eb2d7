//! ContentEditor: one document's editing session.
//!
//! Owns the working copy of blocks, the element tracker and the last loaded
//! document, and drives the load → edit → save → reload cycle against a
//! `ContentApi`. Shared state sits behind a plain mutex that is never held
//! across an await.

use crate::api::{ApiError, ContentApi};
use crate::block::{Block, stamp_order};
use crate::diff;
use crate::events::{EditorEvent, EventBus, Stage};
use crate::html::CodecError;
use crate::loader;
use crate::markdown;
use crate::model::{Document, DocumentId};
use crate::sync;
use crate::tracker::ElementTracker;
use futures::future::{AbortHandle, Aborted, abortable};
use futures::lock::Mutex as AsyncMutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditorError {
    #[error("Content API error: {0}")]
    Api(#[from] ApiError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("No document loaded")]
    NotLoaded,
}

pub type Result<T> = std::result::Result<T, EditorError>;

/// What a call to `load` ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { blocks: usize },
    /// The document was imported from its snapshot and saved.
    Imported { blocks: usize },
    /// A load or save was already running; nothing happened.
    Busy,
    /// The requested document changed while fetching; the result was dropped.
    Superseded,
    /// Failed; see `ContentEditor::error`.
    Failed,
}

/// Counts from one completed save.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub document_updated: bool,
}

struct EditorState {
    document_id: DocumentId,
    content: Option<Document>,
    blocks: Vec<Block>,
    tracker: ElementTracker,
    error: Option<EditorError>,
    fetch_abort: Option<AbortHandle>,
}

enum Fetched {
    Loaded(usize),
    Import { blocks: usize, title: String },
    Superseded,
}

/// Clears a busy flag when dropped.
struct FlagGuard<'a>(&'a AtomicBool);

impl<'a> FlagGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        if flag.swap(true, Ordering::SeqCst) {
            None
        } else {
            Some(Self(flag))
        }
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Editing session for one document.
pub struct ContentEditor<A: ContentApi> {
    api: A,
    state: Mutex<EditorState>,
    loading: AtomicBool,
    saving: AtomicBool,
    save_lock: AsyncMutex<()>,
    events: Arc<EventBus>,
}

impl<A: ContentApi> ContentEditor<A> {
    pub fn new(api: A, document_id: impl Into<DocumentId>) -> Self {
        Self {
            api,
            state: Mutex::new(EditorState {
                document_id: document_id.into(),
                content: None,
                blocks: Vec::new(),
                tracker: ElementTracker::new(),
                error: None,
                fetch_abort: None,
            }),
            loading: AtomicBool::new(false),
            saving: AtomicBool::new(false),
            save_lock: AsyncMutex::new(()),
            events: Arc::new(EventBus::new()),
        }
    }

    fn state(&self) -> MutexGuard<'_, EditorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn document_id(&self) -> DocumentId {
        self.state().document_id.clone()
    }

    /// Switch to another document.
    ///
    /// Aborts any in-flight fetch and drops the working copy; call `load`
    /// afterwards.
    pub fn set_document_id(&self, id: impl Into<DocumentId>) {
        let id = id.into();
        let mut state = self.state();
        if state.document_id == id {
            return;
        }

        debug!("Switching document {} -> {}", state.document_id, id);
        if let Some(handle) = state.fetch_abort.take() {
            handle.abort();
        }
        state.document_id = id;
        state.content = None;
        state.blocks.clear();
        state.tracker.clear();
        state.error = None;
    }

    /// The document as of the last load.
    pub fn content(&self) -> Option<Document> {
        self.state().content.clone()
    }

    pub fn blocks(&self) -> Vec<Block> {
        self.state().blocks.clone()
    }

    /// Edit the working copy in place.
    pub fn update_blocks<R>(&self, edit: impl FnOnce(&mut Vec<Block>) -> R) -> R {
        edit(&mut self.state().blocks)
    }

    pub fn replace_blocks(&self, blocks: Vec<Block>) {
        self.state().blocks = blocks;
    }

    pub fn tracker(&self) -> ElementTracker {
        self.state().tracker.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    pub fn is_saving(&self) -> bool {
        self.saving.load(Ordering::SeqCst)
    }

    /// The last load or save failure, until the next successful load.
    pub fn error(&self) -> Option<EditorError> {
        self.state().error.clone()
    }

    pub fn clear_error(&self) {
        self.state().error = None;
    }

    /// Load the current document into the working copy.
    ///
    /// A document with no live elements but a snapshot is imported: its
    /// snapshot becomes unlinked blocks which are saved straight away.
    /// Failures are recorded, never returned.
    pub async fn load(&self) -> LoadOutcome {
        if self.is_saving() {
            debug!("Save in progress, not loading");
            return LoadOutcome::Busy;
        }
        let Some(_loading) = FlagGuard::acquire(&self.loading) else {
            debug!("Load already in flight");
            return LoadOutcome::Busy;
        };

        match self.fetch_and_commit(true).await {
            Ok(Fetched::Loaded(blocks)) => {
                self.events.emit(EditorEvent::Loaded {
                    document_id: self.document_id().to_string(),
                    blocks,
                });
                LoadOutcome::Loaded { blocks }
            }
            Ok(Fetched::Import { blocks, title }) => {
                let document_id = self.document_id();
                info!("Importing {} blocks into {}", blocks, document_id);
                match self.save(&title).await {
                    Ok(_) => {
                        self.events.emit(EditorEvent::Imported {
                            document_id: document_id.to_string(),
                            blocks,
                        });
                        LoadOutcome::Imported { blocks }
                    }
                    Err(_) => LoadOutcome::Failed,
                }
            }
            Ok(Fetched::Superseded) => LoadOutcome::Superseded,
            Err(e) => {
                self.record_failure(Stage::Load, e);
                LoadOutcome::Failed
            }
        }
    }

    /// Persist the working copy, then reload.
    ///
    /// Saves queue behind each other. On failure the error is recorded and
    /// returned; the working copy and tracker are left as they were. If the
    /// session switches documents while the element calls are in flight, the
    /// save stops after them and the new document's state is left alone.
    pub async fn save(&self, title: &str) -> Result<SaveReport> {
        let _serialized = self.save_lock.lock().await;
        let _saving = FlagGuard::acquire(&self.saving);
        let document_id = self.document_id();

        match self.run_save(title).await {
            Ok(report) => {
                self.events.emit(EditorEvent::Saved {
                    document_id: document_id.to_string(),
                    created: report.created,
                    updated: report.updated,
                    deleted: report.deleted,
                    document_updated: report.document_updated,
                });
                Ok(report)
            }
            Err(e) => {
                self.record_failure(Stage::Save, e.clone());
                Err(e)
            }
        }
    }

    async fn run_save(&self, title: &str) -> Result<SaveReport> {
        let (document, plan) = {
            let mut state = self.state();
            let document = state.content.clone().ok_or(EditorError::NotLoaded)?;
            stamp_order(&mut state.blocks);
            let plan = diff::diff(&document.id, &state.blocks, &state.tracker);
            (document, plan)
        };

        info!(
            "Saving {}: {} to create, {} to update, {} to delete",
            document.id,
            plan.to_create.len(),
            plan.to_update.len(),
            plan.to_delete.len()
        );
        let outcome = sync::execute_plan(&self.api, &plan).await?;
        let report = |document_updated| SaveReport {
            created: outcome.created.len(),
            updated: outcome.updated.len(),
            deleted: outcome.deleted.len(),
            document_updated,
        };

        let changes = {
            let mut state = self.state();
            if state.document_id != document.id {
                warn!(
                    "Switched to {} while saving {}, skipping document update",
                    state.document_id, document.id
                );
                return Ok(report(false));
            }
            sync::assign_created_ids(&mut state.blocks, &outcome.created);
            let order = diff::element_order(&state.blocks);
            let readme = markdown::blocks_to_markdown(&state.blocks);
            sync::document_changes(&document, title, order, readme)
        };

        let document_updated = match changes {
            Some(changes) => {
                self.api.update_document(&document.id, &changes).await?;
                true
            }
            None => {
                debug!("Order and title unchanged, skipping document update");
                false
            }
        };

        {
            let mut guard = self.state();
            if guard.document_id != document.id {
                warn!(
                    "Switched to {} while saving {}, tracker left alone",
                    guard.document_id, document.id
                );
                return Ok(report(document_updated));
            }
            let state = &mut *guard;
            for id in &outcome.deleted {
                state.tracker.remove(id);
            }
            state.tracker.refresh(&state.blocks);
        }

        if let Fetched::Superseded = self.fetch_and_commit(false).await? {
            warn!("Document changed during save, reload of {} dropped", document.id);
        }

        Ok(report(document_updated))
    }

    /// Fetch the requested document and replace the working copy with it.
    ///
    /// Nothing is committed unless the whole conversion succeeds and the
    /// document is still the one requested.
    async fn fetch_and_commit(&self, allow_import: bool) -> Result<Fetched> {
        let requested = self.document_id();
        let (fetch, handle) = abortable(self.api.fetch_document(&requested));
        self.state().fetch_abort = Some(handle);

        let fetched = fetch.await;
        let mut state = self.state();
        state.fetch_abort = None;

        let document = match fetched {
            Ok(result) => result?,
            Err(Aborted) => {
                warn!("Fetch of {} aborted", requested);
                return Ok(Fetched::Superseded);
            }
        };
        if document.id != state.document_id {
            warn!(
                "Discarding stale document {} (now editing {})",
                document.id, state.document_id
            );
            return Ok(Fetched::Superseded);
        }

        if allow_import && loader::needs_import(&document) {
            let mut blocks = loader::import_snapshot(&document)?;
            stamp_order(&mut blocks);
            let count = blocks.len();
            let title = document.title.clone();

            state.blocks = blocks;
            state.tracker.clear();
            state.content = Some(document);
            state.error = None;
            return Ok(Fetched::Import {
                blocks: count,
                title,
            });
        }

        let loaded = loader::load_elements(&document)?;
        let count = loaded.blocks.len();
        debug!(
            "Loaded {}: {} blocks from {} elements",
            document.id,
            count,
            loaded.tracker.len()
        );

        state.blocks = loaded.blocks;
        state.tracker = loaded.tracker;
        state.content = Some(document);
        state.error = None;
        Ok(Fetched::Loaded(count))
    }

    fn record_failure(&self, stage: Stage, e: EditorError) {
        error!("{:?} failed: {}", stage, e);
        let message = e.to_string();
        self.state().error = Some(e);
        self.events.emit(EditorEvent::Failed { stage, message });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiOp, InMemoryContentApi, Result as ApiResult};
    use crate::model::{DocumentChanges, Element, ElementChanges, ElementId, NewElement};
    use async_trait::async_trait;
    use futures::channel::oneshot;

    fn seeded() -> InMemoryContentApi {
        let api = InMemoryContentApi::new();
        let mut doc = Document::new("doc", "Title");
        doc.elements = vec![Element {
            id: "a".into(),
            content_id: "doc".into(),
            text: "<p>Hello</p>".to_string(),
            name: "paragraph".to_string(),
            depth: 0,
            order: 0,
            deleted_at: 0,
        }];
        doc.element_ids = vec!["a".into()];
        doc.readme = "Hello".to_string();
        api.insert_document(doc);
        api
    }

    /// Holds the first call of one kind until the gate opens.
    struct GatedApi {
        inner: InMemoryContentApi,
        op: ApiOp,
        gate: Mutex<Option<oneshot::Receiver<()>>>,
    }

    impl GatedApi {
        fn new(inner: InMemoryContentApi, op: ApiOp, gate: oneshot::Receiver<()>) -> Self {
            Self {
                inner,
                op,
                gate: Mutex::new(Some(gate)),
            }
        }

        async fn pass(&self, op: ApiOp) {
            if op != self.op {
                return;
            }
            let gate = self.gate.lock().unwrap().take();
            if let Some(gate) = gate {
                let _ = gate.await;
            }
        }
    }

    #[async_trait]
    impl ContentApi for GatedApi {
        async fn fetch_document(&self, id: &DocumentId) -> ApiResult<Document> {
            self.pass(ApiOp::FetchDocument).await;
            self.inner.fetch_document(id).await
        }

        async fn create_element(&self, element: &NewElement) -> ApiResult<Element> {
            self.pass(ApiOp::CreateElement).await;
            self.inner.create_element(element).await
        }

        async fn update_element(
            &self,
            id: &ElementId,
            changes: &ElementChanges,
        ) -> ApiResult<Element> {
            self.inner.update_element(id, changes).await
        }

        async fn delete_element(&self, id: &ElementId) -> ApiResult<Element> {
            self.inner.delete_element(id).await
        }

        async fn update_document(
            &self,
            id: &DocumentId,
            changes: &DocumentChanges,
        ) -> ApiResult<Document> {
            self.inner.update_document(id, changes).await
        }
    }

    /// Answers every fetch with a different document than requested.
    struct MislabeledApi(InMemoryContentApi);

    #[async_trait]
    impl ContentApi for MislabeledApi {
        async fn fetch_document(&self, _id: &DocumentId) -> ApiResult<Document> {
            self.0.fetch_document(&"other".into()).await
        }

        async fn create_element(&self, element: &NewElement) -> ApiResult<Element> {
            self.0.create_element(element).await
        }

        async fn update_element(
            &self,
            id: &ElementId,
            changes: &ElementChanges,
        ) -> ApiResult<Element> {
            self.0.update_element(id, changes).await
        }

        async fn delete_element(&self, id: &ElementId) -> ApiResult<Element> {
            self.0.delete_element(id).await
        }

        async fn update_document(
            &self,
            id: &DocumentId,
            changes: &DocumentChanges,
        ) -> ApiResult<Document> {
            self.0.update_document(id, changes).await
        }
    }

    #[tokio::test]
    async fn test_load_populates_session() {
        let editor = ContentEditor::new(seeded(), "doc");
        assert_eq!(editor.load().await, LoadOutcome::Loaded { blocks: 1 });

        assert_eq!(editor.blocks()[0].content, "Hello");
        assert!(editor.tracker().contains(&"a".into()));
        assert_eq!(editor.content().unwrap().title, "Title");
        assert!(!editor.is_loading());
        assert!(editor.error().is_none());
    }

    #[tokio::test]
    async fn test_load_failure_is_recorded() {
        let api = seeded();
        api.fail_on(ApiOp::FetchDocument);
        let editor = ContentEditor::new(api, "doc");

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = editor
            .events()
            .subscribe(move |event| sink.lock().unwrap().push(event.clone()));

        assert_eq!(editor.load().await, LoadOutcome::Failed);
        assert_eq!(
            editor.error(),
            Some(EditorError::Api(ApiError::Injected(ApiOp::FetchDocument)))
        );
        assert!(editor.content().is_none());
        assert!(!editor.is_loading());
        assert!(matches!(
            seen.lock().unwrap()[0],
            EditorEvent::Failed {
                stage: Stage::Load,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_overlapping_load_is_suppressed() {
        let (release, gate) = oneshot::channel();
        let api = GatedApi::new(seeded(), ApiOp::FetchDocument, gate);
        let editor = ContentEditor::new(api, "doc");
        let editor = &editor;

        let (first, second) = futures::join!(editor.load(), async move {
            assert!(editor.is_loading());
            let outcome = editor.load().await;
            let _ = release.send(());
            outcome
        });

        assert_eq!(first, LoadOutcome::Loaded { blocks: 1 });
        assert_eq!(second, LoadOutcome::Busy);
        assert!(!editor.is_loading());
    }

    #[tokio::test]
    async fn test_switching_document_aborts_fetch() {
        let (release, gate) = oneshot::channel();
        let api = GatedApi::new(seeded(), ApiOp::FetchDocument, gate);
        let editor = ContentEditor::new(api, "doc");
        let editor = &editor;

        let (outcome, _) = futures::join!(editor.load(), async move {
            editor.set_document_id("other");
            let _ = release.send(());
        });

        assert_eq!(outcome, LoadOutcome::Superseded);
        assert!(editor.content().is_none());
        assert!(editor.blocks().is_empty());
        assert_eq!(editor.document_id(), DocumentId::new("other"));
    }

    #[tokio::test]
    async fn test_stale_document_is_discarded() {
        let api = seeded();
        api.insert_document(Document::new("other", "Other"));
        let editor = ContentEditor::new(MislabeledApi(api), "doc");

        assert_eq!(editor.load().await, LoadOutcome::Superseded);
        assert!(editor.content().is_none());
        assert!(editor.error().is_none());
    }

    #[tokio::test]
    async fn test_save_without_load_fails() {
        let editor = ContentEditor::new(seeded(), "doc");
        let err = editor.save("Title").await.unwrap_err();
        assert_eq!(err, EditorError::NotLoaded);
        assert_eq!(editor.error(), Some(EditorError::NotLoaded));
        assert!(!editor.is_saving());
    }

    #[tokio::test]
    async fn test_save_links_new_blocks_and_reloads() {
        let api = Arc::new(seeded());
        let editor = ContentEditor::new(Arc::clone(&api), "doc");
        editor.load().await;

        editor.update_blocks(|blocks| blocks.push(Block::paragraph("World")));
        let report = editor.save("Title").await.unwrap();

        assert_eq!(report.created, 1);
        assert!(report.document_updated);
        assert_eq!(editor.tracker().len(), 2);
        assert!(editor.blocks().iter().all(|b| b.is_linked()));

        let stored = api.document(&"doc".into()).unwrap();
        assert_eq!(stored.element_ids.len(), 2);
        assert_eq!(stored.readme, "Hello\n\nWorld");
    }

    #[tokio::test]
    async fn test_switching_document_during_save_keeps_old_document() {
        let (release, gate) = oneshot::channel();
        let api = Arc::new(GatedApi::new(seeded(), ApiOp::CreateElement, gate));
        let editor = ContentEditor::new(Arc::clone(&api), "doc");
        editor.load().await;
        editor.update_blocks(|blocks| blocks.push(Block::paragraph("World")));

        let switcher = &editor;
        let (saved, _) = futures::join!(editor.save("Title"), async move {
            switcher.set_document_id("other");
            let _ = release.send(());
        });

        let report = saved.unwrap();
        assert_eq!(report.created, 1);
        assert!(!report.document_updated);
        assert!(api.inner.calls_of(ApiOp::UpdateDocument).is_empty());

        let stored = api.inner.document(&"doc".into()).unwrap();
        assert_eq!(stored.element_ids, vec![ElementId::new("a")]);
        assert_eq!(stored.readme, "Hello");

        // The new session was not touched
        assert_eq!(editor.document_id(), DocumentId::new("other"));
        assert!(editor.blocks().is_empty());
        assert!(editor.tracker().is_empty());
        assert!(editor.content().is_none());
    }
}
