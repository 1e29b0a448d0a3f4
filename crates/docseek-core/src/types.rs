//! Wire types for the document search backend.
//!
//! These types mirror the JSON bodies of the backend's HTTP API exactly.
//! Field names follow the backend (`snake_case`); optional request fields are
//! omitted rather than sent as `null`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// =============================================================================
// Chat Types
// =============================================================================

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Text typed by the person using the client.
    User,
    /// Text generated by the backend.
    Assistant,
}

impl Role {
    /// Wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(CoreError::InvalidRole(other.to_string())),
        }
    }
}

/// One prior exchange entry sent along with a chat request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    /// Who wrote the message.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl HistoryMessage {
    /// Create a history entry.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Body of `POST /chat/stream`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The new user message.
    pub message: String,
    /// Prior turns, oldest first.
    #[serde(default)]
    pub history: Vec<HistoryMessage>,
}

/// A retrieved passage backing an assistant answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Original document file name.
    pub file_name: String,
    /// 1-based page the passage was taken from.
    pub page_number: u32,
    /// Passage text.
    pub text: String,
    /// Relevance score assigned by the re-ranker.
    pub score: f64,
}

// =============================================================================
// Search Types
// =============================================================================

/// Body of `POST /search`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Free-text query.
    pub query: String,
    /// Number of candidates the backend re-ranks.
    pub top_k: u32,
    /// Optional metadata filters, passed through verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<BTreeMap<String, serde_json::Value>>,
    /// Number of ranked results to skip.
    pub offset: usize,
    /// Maximum number of results to return.
    pub limit: usize,
}

/// Location metadata attached to each search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultMetadata {
    /// Original document file name.
    pub file_name: String,
    /// 1-based page number.
    pub page_number: u32,
    /// Backend resource the chunk belongs to.
    pub resource_id: String,
    /// Chunk identifier within the index.
    pub chunk_id: String,
}

/// One ranked search hit. Immutable once received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Passage text.
    pub text: String,
    /// Where the passage came from.
    pub metadata: ResultMetadata,
    /// Cross-encoder score.
    pub rerank_score: f64,
    /// Vector similarity score.
    pub vector_score: f64,
}

impl SearchResult {
    /// File the hit came from.
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.metadata.file_name
    }

    /// Page the hit came from.
    #[must_use]
    pub const fn page_number(&self) -> u32 {
        self.metadata.page_number
    }

    /// Resource the hit belongs to.
    #[must_use]
    pub fn resource_id(&self) -> &str {
        &self.metadata.resource_id
    }

    /// Chunk identifier of the hit.
    #[must_use]
    pub fn chunk_id(&self) -> &str {
        &self.metadata.chunk_id
    }
}

/// Response of `POST /search`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    /// The query the backend actually ran.
    pub query: String,
    /// Results for the requested page.
    pub results: Vec<SearchResult>,
    /// Total candidates after re-ranking.
    pub total_found: usize,
    /// Server-side search time.
    pub search_time_ms: f64,
    /// Whether another page is available.
    pub has_more: bool,
    /// Offset this page starts at.
    pub offset: usize,
    /// Limit this page was requested with.
    pub limit: usize,
}

// =============================================================================
// Resource Types
// =============================================================================

/// An uploaded document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Backend resource identifier.
    pub resource_id: String,
    /// Original upload file name.
    pub filename: String,
    /// Number of indexed chunks.
    pub num_chunks: usize,
    /// Upload time as sent by the backend (ISO 8601, usually without offset).
    #[serde(default)]
    pub uploaded_at: String,
}

impl Resource {
    /// Parse the upload timestamp.
    ///
    /// The backend emits naive UTC timestamps; RFC 3339 values with an offset
    /// are accepted too. Returns `None` for empty or unrecognized values.
    #[must_use]
    pub fn uploaded_at_utc(&self) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(&self.uploaded_at) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(&self.uploaded_at, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

/// Response of `GET /resources`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcesPage {
    /// Resources on this page.
    pub resources: Vec<Resource>,
    /// Total number of resources.
    pub total: usize,
    /// Offset this page starts at.
    pub offset: usize,
    /// Limit this page was requested with.
    pub limit: usize,
    /// Whether another page is available.
    pub has_more: bool,
}

/// One chunk of `GET /resources/{id}/chunks`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDetail {
    /// Chunk identifier.
    pub chunk_id: String,
    /// Chunk text.
    pub text: String,
    /// 1-based page number.
    pub page_number: u32,
}

/// Response of `DELETE /resources/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResourceResponse {
    /// `"success"` on success.
    pub status: String,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
    /// The deleted resource.
    pub resource_id: String,
    /// How many chunks were removed from the index.
    pub chunks_deleted: usize,
}

// =============================================================================
// Health Types
// =============================================================================

/// Index statistics reported by `GET /health`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexHealth {
    /// Number of chunks in the vector index.
    #[serde(default)]
    pub total_chunks: usize,
}

/// Response of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `"healthy"` when the backend is up.
    pub status: String,
    /// Readiness of each backend service.
    #[serde(default)]
    pub services: BTreeMap<String, bool>,
    /// Index statistics.
    #[serde(default)]
    pub index: IndexHealth,
}

impl HealthResponse {
    /// Whether every reported service is ready.
    #[must_use]
    pub fn all_services_ready(&self) -> bool {
        self.services.values().all(|ready| *ready)
    }
}

// =============================================================================
// Error Response
// =============================================================================

/// Error body returned by the backend on non-success status codes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// Error detail. Validation failures carry a structured list here.
    pub detail: serde_json::Value,
}

impl ApiErrorResponse {
    /// Render the detail as a single message.
    #[must_use]
    pub fn message(&self) -> String {
        match &self.detail {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}
