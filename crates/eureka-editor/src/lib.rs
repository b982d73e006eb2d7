//! eureka-editor: content reconciliation and save pipeline for the EurekaBox
//! block editor.
//!
//! This crate provides:
//! - The persisted document model and the editor's block model
//! - Block ↔ HTML codec and the markdown snapshot
//! - Document loading, diffing against the element tracker, and batch sync
//! - `ContentEditor`, the session that drives load → save → reload
//! - The `ContentApi` trait with in-memory and HTTP implementations

pub mod api;
pub mod block;
pub mod diff;
pub mod editor;
pub mod events;
pub mod html;
#[cfg(feature = "http")]
pub mod http;
pub mod loader;
pub mod markdown;
pub mod model;
pub mod sync;
pub mod tracker;

pub use api::{ApiCall, ApiError, ApiOp, ContentApi, InMemoryContentApi};
pub use block::{Block, BlockId, BlockKind, BlockMeta};
pub use diff::SyncPlan;
pub use editor::{ContentEditor, EditorError, LoadOutcome, SaveReport};
pub use events::{EditorEvent, EventBus, Stage, Subscription};
pub use html::CodecError;
#[cfg(feature = "http")]
pub use http::HttpContentApi;
pub use model::{Document, DocumentId, Element, ElementId};
pub use tracker::{ElementTracker, TrackedElement};
