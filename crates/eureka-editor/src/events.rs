//! Event infrastructure for the editor session.
//!
//! `EditorEvent` reports load/save outcomes to whoever renders the editor:
//! the one-time "imported" notification, save summaries and failures.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// Which boundary a failure was caught at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Load,
    Save,
}

/// Events emitted by `ContentEditor`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EditorEvent {
    /// A document was loaded into the working copy.
    Loaded {
        #[serde(rename = "documentId")]
        document_id: String,
        blocks: usize,
    },
    /// A document without elements was imported from its snapshot.
    Imported {
        #[serde(rename = "documentId")]
        document_id: String,
        blocks: usize,
    },
    /// A save cycle completed.
    Saved {
        #[serde(rename = "documentId")]
        document_id: String,
        created: usize,
        updated: usize,
        deleted: usize,
        /// Whether the document metadata call was issued.
        #[serde(rename = "documentUpdated")]
        document_updated: bool,
    },
    /// A load or save failed; the error is kept as recoverable state.
    Failed { stage: Stage, message: String },
}

type Listener = Arc<dyn Fn(&EditorEvent) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: usize,
    by_id: BTreeMap<usize, Listener>,
}

/// Fans editor events out to listeners, in subscription order.
///
/// Lives in an `Arc` so subscriptions can detach themselves.
#[derive(Default)]
pub struct EventBus {
    listeners: Mutex<Listeners>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn listeners(&self) -> MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a listener until the returned `Subscription` is dropped.
    pub fn subscribe(
        self: &Arc<Self>,
        listener: impl Fn(&EditorEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let mut listeners = self.listeners();
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.by_id.insert(id, Arc::new(listener));
        Subscription {
            bus: Arc::downgrade(self),
            id,
        }
    }

    pub fn emit(&self, event: EditorEvent) {
        // Listeners run unlocked so they may subscribe or unsubscribe
        let listeners: Vec<Listener> = self.listeners().by_id.values().cloned().collect();
        for listener in listeners {
            listener(&event);
        }
    }
}

/// Detaches its listener from the bus when dropped.
pub struct Subscription {
    bus: Weak<EventBus>,
    id: usize,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.listeners().by_id.remove(&self.id);
        }
    }
}
