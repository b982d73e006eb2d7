//! ContentApi trait: the element and document operations the save pipeline
//! consumes from the backend.
//!
//! Implementations:
//! - `InMemoryContentApi` - In-process backend for tests
//! - `HttpContentApi` (feature `http`) - REST client over reqwest

use crate::model::{
    Document, DocumentChanges, DocumentId, Element, ElementChanges, ElementId, NewElement,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Injected failure: {0:?}")]
    Injected(ApiOp),
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// Content API operations, used for call logs and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiOp {
    FetchDocument,
    CreateElement,
    UpdateElement,
    DeleteElement,
    UpdateDocument,
}

/// Remote content backend.
#[async_trait]
pub trait ContentApi: Send + Sync {
    /// Fetch a document with its elements.
    async fn fetch_document(&self, id: &DocumentId) -> Result<Document>;

    /// Create an element; the returned element carries the server id.
    async fn create_element(&self, element: &NewElement) -> Result<Element>;

    async fn update_element(&self, id: &ElementId, changes: &ElementChanges) -> Result<Element>;

    async fn delete_element(&self, id: &ElementId) -> Result<Element>;

    async fn update_document(&self, id: &DocumentId, changes: &DocumentChanges)
    -> Result<Document>;
}

/// One recorded call against `InMemoryContentApi`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    FetchDocument(DocumentId),
    CreateElement(NewElement),
    UpdateElement(ElementId, ElementChanges),
    DeleteElement(ElementId),
    UpdateDocument(DocumentId, DocumentChanges),
}

impl ApiCall {
    pub fn op(&self) -> ApiOp {
        match self {
            ApiCall::FetchDocument(_) => ApiOp::FetchDocument,
            ApiCall::CreateElement(_) => ApiOp::CreateElement,
            ApiCall::UpdateElement(..) => ApiOp::UpdateElement,
            ApiCall::DeleteElement(_) => ApiOp::DeleteElement,
            ApiCall::UpdateDocument(..) => ApiOp::UpdateDocument,
        }
    }
}

#[derive(Default)]
struct Backend {
    documents: HashMap<DocumentId, Document>,
    next_id: u64,
    /// Monotonic clock for soft-delete timestamps
    clock: i64,
    calls: Vec<ApiCall>,
    failing: HashSet<ApiOp>,
}

impl Backend {
    fn element_mut(&mut self, id: &ElementId) -> Option<&mut Element> {
        self.documents
            .values_mut()
            .flat_map(|doc| doc.elements.iter_mut())
            .find(|element| &element.id == id && !element.is_deleted())
    }

    fn check(&self, op: ApiOp) -> Result<()> {
        if self.failing.contains(&op) {
            return Err(ApiError::Injected(op));
        }
        Ok(())
    }
}

/// In-memory content backend for testing.
///
/// Behaves like the REST backend: element ids are assigned on create,
/// deletes are soft (a non-zero `deleted_at`), and fetches return deleted
/// elements too. Every call is logged, and any operation can be made to fail.
pub struct InMemoryContentApi {
    backend: RwLock<Backend>,
}

impl InMemoryContentApi {
    pub fn new() -> Self {
        Self {
            backend: RwLock::new(Backend::default()),
        }
    }

    fn backend(&self) -> std::sync::RwLockWriteGuard<'_, Backend> {
        self.backend.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed a document, replacing any with the same id.
    pub fn insert_document(&self, document: Document) {
        self.backend().documents.insert(document.id.clone(), document);
    }

    /// Current server-side state of a document, without logging a call.
    pub fn document(&self, id: &DocumentId) -> Option<Document> {
        self.backend().documents.get(id).cloned()
    }

    /// Every call received so far, in arrival order.
    pub fn calls(&self) -> Vec<ApiCall> {
        self.backend().calls.clone()
    }

    /// Calls of one kind.
    pub fn calls_of(&self, op: ApiOp) -> Vec<ApiCall> {
        self.backend()
            .calls
            .iter()
            .filter(|call| call.op() == op)
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.backend().calls.clear();
    }

    /// Make every subsequent call of `op` fail.
    pub fn fail_on(&self, op: ApiOp) {
        self.backend().failing.insert(op);
    }

    pub fn clear_failures(&self) {
        self.backend().failing.clear();
    }
}

impl Default for InMemoryContentApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentApi for InMemoryContentApi {
    async fn fetch_document(&self, id: &DocumentId) -> Result<Document> {
        let mut backend = self.backend();
        backend.calls.push(ApiCall::FetchDocument(id.clone()));
        backend.check(ApiOp::FetchDocument)?;
        backend
            .documents
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(id.to_string()))
    }

    async fn create_element(&self, element: &NewElement) -> Result<Element> {
        let mut backend = self.backend();
        backend.calls.push(ApiCall::CreateElement(element.clone()));
        backend.check(ApiOp::CreateElement)?;

        backend.next_id += 1;
        let id = ElementId::new(format!("el-{}", backend.next_id));
        let doc = backend
            .documents
            .get_mut(&element.content_id)
            .ok_or_else(|| ApiError::NotFound(element.content_id.to_string()))?;

        let created = Element {
            id,
            content_id: element.content_id.clone(),
            text: element.text.clone(),
            name: element.name.clone(),
            depth: element.depth,
            order: doc.elements.len() as u32,
            deleted_at: 0,
        };
        doc.elements.push(created.clone());
        Ok(created)
    }

    async fn update_element(&self, id: &ElementId, changes: &ElementChanges) -> Result<Element> {
        let mut backend = self.backend();
        backend
            .calls
            .push(ApiCall::UpdateElement(id.clone(), changes.clone()));
        backend.check(ApiOp::UpdateElement)?;

        let element = backend
            .element_mut(id)
            .ok_or_else(|| ApiError::NotFound(id.to_string()))?;
        element.text = changes.text.clone();
        element.name = changes.name.clone();
        element.depth = changes.depth;
        Ok(element.clone())
    }

    async fn delete_element(&self, id: &ElementId) -> Result<Element> {
        let mut backend = self.backend();
        backend.calls.push(ApiCall::DeleteElement(id.clone()));
        backend.check(ApiOp::DeleteElement)?;

        backend.clock += 1;
        let deleted_at = backend.clock;
        let element = backend
            .element_mut(id)
            .ok_or_else(|| ApiError::NotFound(id.to_string()))?;
        element.deleted_at = deleted_at;
        Ok(element.clone())
    }

    async fn update_document(
        &self,
        id: &DocumentId,
        changes: &DocumentChanges,
    ) -> Result<Document> {
        let mut backend = self.backend();
        backend
            .calls
            .push(ApiCall::UpdateDocument(id.clone(), changes.clone()));
        backend.check(ApiOp::UpdateDocument)?;

        let doc = backend
            .documents
            .get_mut(id)
            .ok_or_else(|| ApiError::NotFound(id.to_string()))?;
        doc.readme = changes.readme.clone();
        if let Some(element_ids) = &changes.element_ids {
            doc.element_ids = element_ids.clone();
        }
        if let Some(title) = &changes.title {
            doc.title = title.clone();
        }
        Ok(doc.clone())
    }
}

// Implement ContentApi for Arc<T> where T: ContentApi
// This allows tests to keep a handle on the backend the editor talks to
#[async_trait]
impl<T: ContentApi + ?Sized> ContentApi for std::sync::Arc<T> {
    async fn fetch_document(&self, id: &DocumentId) -> Result<Document> {
        (**self).fetch_document(id).await
    }

    async fn create_element(&self, element: &NewElement) -> Result<Element> {
        (**self).create_element(element).await
    }

    async fn update_element(&self, id: &ElementId, changes: &ElementChanges) -> Result<Element> {
        (**self).update_element(id, changes).await
    }

    async fn delete_element(&self, id: &ElementId) -> Result<Element> {
        (**self).delete_element(id).await
    }

    async fn update_document(
        &self,
        id: &DocumentId,
        changes: &DocumentChanges,
    ) -> Result<Document> {
        (**self).update_document(id, changes).await
    }
}
