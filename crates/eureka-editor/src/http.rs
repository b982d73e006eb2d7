//! REST implementation of `ContentApi`.
//!
//! Endpoints, relative to the API base URL:
//!
//! | call | request |
//! |---|---|
//! | fetch document | `GET /contents/{id}` |
//! | create element | `POST /contents/{id}/elements` |
//! | update element | `PATCH /elements/{id}` |
//! | delete element | `DELETE /elements/{id}` |
//! | update document | `PATCH /contents/{id}` |

use crate::api::{ApiError, ContentApi, Result};
use crate::model::{
    Document, DocumentChanges, DocumentId, Element, ElementChanges, ElementId, NewElement,
};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

/// Content API client over HTTP.
#[derive(Debug, Clone)]
pub struct HttpContentApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpContentApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder, what: &str) -> Result<T> {
        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(what.to_string()));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::Http {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ContentApi for HttpContentApi {
    async fn fetch_document(&self, id: &DocumentId) -> Result<Document> {
        tracing::debug!("GET document {}", id);
        let builder = self.request(Method::GET, &format!("contents/{}", id));
        self.send(builder, &format!("document {}", id)).await
    }

    async fn create_element(&self, element: &NewElement) -> Result<Element> {
        tracing::debug!("POST element into {}", element.content_id);
        let builder = self
            .request(
                Method::POST,
                &format!("contents/{}/elements", element.content_id),
            )
            .json(element);
        self.send(builder, &format!("document {}", element.content_id))
            .await
    }

    async fn update_element(&self, id: &ElementId, changes: &ElementChanges) -> Result<Element> {
        tracing::debug!("PATCH element {}", id);
        let builder = self
            .request(Method::PATCH, &format!("elements/{}", id))
            .json(changes);
        self.send(builder, &format!("element {}", id)).await
    }

    async fn delete_element(&self, id: &ElementId) -> Result<Element> {
        tracing::debug!("DELETE element {}", id);
        let builder = self.request(Method::DELETE, &format!("elements/{}", id));
        self.send(builder, &format!("element {}", id)).await
    }

    async fn update_document(
        &self,
        id: &DocumentId,
        changes: &DocumentChanges,
    ) -> Result<Document> {
        tracing::debug!("PATCH document {}", id);
        let builder = self
            .request(Method::PATCH, &format!("contents/{}", id))
            .json(changes);
        self.send(builder, &format!("document {}", id)).await
    }
}
