//! Wire model for the content API: documents, elements and the request
//! bodies the save pipeline sends.
//!
//! Field names follow the backend's camelCase JSON.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

macro_rules! string_id {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Server-assigned identifier of a document ("content").
    DocumentId
);

string_id!(
    /// Server-assigned identifier of a persisted element.
    ElementId
);

/// A persisted document as returned by the content API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: DocumentId,
    #[serde(default)]
    pub title: String,
    /// Authoritative display order of the document's elements.
    #[serde(default)]
    pub element_ids: Vec<ElementId>,
    /// Full-document snapshot (markdown, or HTML for imported documents).
    #[serde(default)]
    pub readme: String,
    /// Child elements, present when the document is fetched in nested form.
    #[serde(default)]
    pub elements: Vec<Element>,
}

impl Document {
    pub fn new(id: impl Into<DocumentId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            element_ids: Vec::new(),
            readme: String::new(),
            elements: Vec::new(),
        }
    }

    /// Elements that are not soft-deleted, in display order.
    ///
    /// Elements listed in `element_ids` come first, in that order. Elements the
    /// list does not mention follow in the order the backend returned them.
    pub fn live_elements(&self) -> Vec<&Element> {
        let live: Vec<&Element> = self.elements.iter().filter(|e| !e.is_deleted()).collect();

        let mut ordered = Vec::with_capacity(live.len());
        for id in &self.element_ids {
            if let Some(element) = live.iter().find(|e| &e.id == id) {
                if !ordered.iter().any(|o: &&Element| o.id == element.id) {
                    ordered.push(*element);
                }
            }
        }
        for element in live {
            if !ordered.iter().any(|o| o.id == element.id) {
                ordered.push(element);
            }
        }
        ordered
    }
}

/// The persisted unit of content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    pub id: ElementId,
    pub content_id: DocumentId,
    /// Serialized HTML fragment.
    #[serde(default)]
    pub text: String,
    /// Structural type tag ("paragraph", "heading", ...).
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub depth: u32,
    #[serde(default)]
    pub order: u32,
    /// Soft-deletion timestamp in milliseconds, zero while the element is live.
    #[serde(default)]
    pub deleted_at: i64,
}

impl Element {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at != 0
    }
}

/// Body of a create-element call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewElement {
    pub content_id: DocumentId,
    pub name: String,
    pub text: String,
    pub depth: u32,
}

/// Body of an update-element call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementChanges {
    pub text: String,
    pub name: String,
    pub depth: u32,
}

/// Body of an update-document call.
///
/// `element_ids` and `title` are omitted from the JSON entirely when unset,
/// so the backend only touches what changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentChanges {
    pub readme: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_ids: Option<Vec<ElementId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}
