//! HTTP client for the document search backend.
//!
//! [`GatewayClient`] speaks the backend's REST and event-stream endpoints.
//! The state machines depend on the narrow backend traits below rather than
//! on the client itself, so tests can drive them with in-memory fakes.

use async_trait::async_trait;
use bytes::Bytes;
use docseek_core::{
    ApiErrorResponse, ChatRequest, ChunkDetail, DeleteResourceResponse, HealthResponse,
    ResourcesPage, SearchRequest, SearchResponse,
};
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{HeaderValue, ACCEPT};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// Raw body of a streaming response, in transport-sized fragments.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Source of search result pages.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Fetch one page of search results.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the backend rejects it.
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse>;
}

/// Source of resource listing pages.
#[async_trait]
pub trait ResourceBackend: Send + Sync {
    /// Fetch one page of indexed resources.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the backend rejects it.
    async fn list_resources(&self, offset: usize, limit: usize) -> Result<ResourcesPage>;
}

/// Source of streamed chat answers.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Open the event stream for one chat request.
    ///
    /// # Errors
    ///
    /// Returns an error if the request is rejected before the body starts.
    async fn chat_stream(&self, request: &ChatRequest) -> Result<ByteStream>;
}

/// Client for the backend REST API.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: Client,
    /// Client without a total timeout, for responses that stream.
    stream_client: Client,
    base_url: String,
}

impl GatewayClient {
    /// Create a client from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()?;
        let stream_client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()?;

        Ok(Self {
            client,
            stream_client,
            base_url: config.normalized_base_url().to_string(),
        })
    }

    /// Get the base URL of the backend.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Handle API error responses.
    async fn handle_error(response: Response) -> ClientError {
        let status = response.status();
        let message = match response.json::<ApiErrorResponse>().await {
            Ok(err) => err.message(),
            Err(_) => status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string(),
        };
        ClientError::Api {
            status: status.as_u16(),
            message,
        }
    }

    /// Check the status and decode a JSON body.
    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
        if !response.status().is_success() {
            return Err(Self::handle_error(response).await);
        }
        response
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))
    }

    // =========================================================================
    // Search Operations
    // =========================================================================

    /// Run one page of a semantic search.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the backend rejects it.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let url = format!("{}/search", self.base_url);

        let response = self.client.post(&url).json(request).send().await?;
        let body: SearchResponse = Self::read_json(response).await?;

        tracing::debug!(
            query = %body.query,
            offset = body.offset,
            returned = body.results.len(),
            has_more = body.has_more,
            "Search page received"
        );
        Ok(body)
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// List indexed resources.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the backend rejects it.
    pub async fn list_resources(&self, offset: usize, limit: usize) -> Result<ResourcesPage> {
        let url = format!("{}/resources", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("offset", offset), ("limit", limit)])
            .send()
            .await?;

        Self::read_json(response).await
    }

    /// Get every chunk of a resource.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Api` with status 404 if the resource is unknown.
    pub async fn resource_chunks(&self, resource_id: &str) -> Result<Vec<ChunkDetail>> {
        let url = format!("{}/resources/{}/chunks", self.base_url, resource_id);

        let response = self.client.get(&url).send().await?;
        Self::read_json(response).await
    }

    /// Delete a resource and its chunks.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Api` with status 404 if the resource is unknown.
    pub async fn delete_resource(&self, resource_id: &str) -> Result<DeleteResourceResponse> {
        let url = format!("{}/resources/{}", self.base_url, resource_id);

        let response = self.client.delete(&url).send().await?;
        let body: DeleteResourceResponse = Self::read_json(response).await?;

        tracing::info!(
            resource_id = %body.resource_id,
            chunks_deleted = body.chunks_deleted,
            "Deleted resource"
        );
        Ok(body)
    }

    // =========================================================================
    // Health Check
    // =========================================================================

    /// Check backend health.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn health(&self) -> Result<HealthResponse> {
        let url = format!("{}/health", self.base_url);

        let response = self.client.get(&url).send().await?;
        Self::read_json(response).await
    }

    // =========================================================================
    // Chat Operations
    // =========================================================================

    /// Start a streamed chat answer and return its raw body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the backend rejects it, or the
    /// response has an empty body.
    pub async fn chat_stream(&self, request: &ChatRequest) -> Result<ByteStream> {
        let url = format!("{}/chat/stream", self.base_url);

        let response = self
            .stream_client
            .post(&url)
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::handle_error(response).await);
        }
        if response.content_length() == Some(0) {
            return Err(ClientError::MissingBody);
        }

        tracing::debug!(history = request.history.len(), "Chat stream opened");
        Ok(response.bytes_stream().map_err(ClientError::from).boxed())
    }
}

#[async_trait]
impl SearchBackend for GatewayClient {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        Self::search(self, request).await
    }
}

#[async_trait]
impl ResourceBackend for GatewayClient {
    async fn list_resources(&self, offset: usize, limit: usize) -> Result<ResourcesPage> {
        Self::list_resources(self, offset, limit).await
    }
}

#[async_trait]
impl ChatBackend for GatewayClient {
    async fn chat_stream(&self, request: &ChatRequest) -> Result<ByteStream> {
        Self::chat_stream(self, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_trims_base_url() {
        let client = GatewayClient::new(&ClientConfig::with_base_url("http://localhost:8000/"))
            .unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000");
    }

    #[test]
    fn new_rejects_invalid_config() {
        let config = ClientConfig {
            search_page_size: 0,
            ..ClientConfig::default()
        };
        assert!(matches!(
            GatewayClient::new(&config),
            Err(ClientError::InvalidConfig(_))
        ));
    }
}
