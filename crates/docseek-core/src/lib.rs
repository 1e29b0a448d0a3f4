//! Core types and wire shapes for docseek.
//!
//! This crate provides the foundational types shared by the client engine and
//! the command-line front end:
//!
//! - **Identifiers**: strongly-typed turn IDs
//! - **Wire types**: request/response shapes of the document search backend
//! - **Error types**: common error definitions shared across crates
//!
//! # Example
//!
//! ```
//! use docseek_core::{Role, TurnId};
//!
//! let id = TurnId::generate();
//! let parsed: TurnId = id.to_string().parse().unwrap();
//! assert_eq!(id, parsed);
//!
//! assert_eq!("assistant".parse::<Role>().unwrap(), Role::Assistant);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;
pub mod types;

pub use error::{CoreError, Result};
pub use ids::{IdError, TurnId};
pub use types::{
    ApiErrorResponse, ChatRequest, ChunkDetail, DeleteResourceResponse, HealthResponse,
    HistoryMessage, IndexHealth, Resource, ResourcesPage, ResultMetadata, Role, SearchRequest,
    SearchResponse, SearchResult, Source,
};
