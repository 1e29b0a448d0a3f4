//! Client engine for the docseek document search backend.
//!
//! This crate turns the backend's two asynchronous protocols into consistent
//! in-memory state for a front end to render:
//!
//! - **Streaming chat**: a text event stream decoded frame by frame and
//!   applied to one assistant turn at a time
//! - **Paginated listings**: search results and indexed resources merged
//!   page by page under a query identity
//!
//! # Architecture
//!
//! ```text
//!                 ┌────────────────────┐
//!                 │   GatewayClient    │  reqwest, JSON + byte stream
//!                 └────────────────────┘
//!                    │              │
//!            body fragments     JSON pages
//!                    ▼              ▼
//!          ┌──────────────┐   ┌──────────────┐
//!          │ FrameDecoder │   │    Cursor    │  ticket / complete
//!          └──────────────┘   └──────────────┘
//!                    │              │
//!                 frames            ▼
//!                    ▼          Session<T>
//!          ┌──────────────┐
//!          │   dispatch   │ ──► Diagnostics
//!          └──────────────┘
//!                    │
//!                    ▼
//!          ┌──────────────┐
//!          │ Conversation │  Idle | Streaming(TurnId)
//!          └──────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use docseek_client::{Conversation, FrameDecoder, StreamEvent};
//!
//! let mut conversation = Conversation::new();
//! let turn = conversation.begin_turn("What is VAT?").unwrap().assistant_turn;
//!
//! let mut decoder = FrameDecoder::new();
//! for frame in decoder.push(b"event: chunk\ndata: {\"text\":\"Value added\"}\n\n") {
//!     if let Some(event) = StreamEvent::from_frame(&frame.unwrap()).unwrap() {
//!         conversation.apply(turn, event);
//!     }
//! }
//!
//! assert_eq!(conversation.turn(turn).unwrap().content, "Value added");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod chat;
pub mod client;
pub mod config;
pub mod conversation;
pub mod error;
pub mod events;
pub mod pagination;
pub mod sse;

pub use chat::{ChatSession, StreamReport, TurnOutcome, TurnStream};
pub use client::{ByteStream, ChatBackend, GatewayClient, ResourceBackend, SearchBackend};
pub use config::{ClientConfig, MAX_RESOURCES_PAGE_SIZE, MAX_SEARCH_PAGE_SIZE};
pub use conversation::{
    ChatState, Conversation, ConversationTurn, PendingTurn, TurnStatus, ERROR_FALLBACK_MESSAGE,
    MAX_MESSAGE_CHARS,
};
pub use error::{ChatError, ClientError, ConversationError, Result};
pub use events::{dispatch, Applied, Diagnostics, StreamEvent, StreamHandler};
pub use pagination::{
    Cursor, Page, PageOutcome, PageTicket, ResourceController, ResourceCursor, ResourceSession,
    SearchController, SearchCursor, SearchSession, Session,
};
pub use sse::{DropReason, Frame, FrameDecoder, FrameDrop};
