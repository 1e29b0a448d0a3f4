//! Error types for the client engine.
//!
//! Three families are kept apart so callers can tell them apart:
//! transport failures ([`ClientError`]), explicit `error` events sent by the
//! backend ([`ChatError::Remote`]), and local state-machine rejections
//! ([`ConversationError`]). Protocol decode failures never appear here; they
//! are recovered locally and recorded in [`crate::events::Diagnostics`].

use docseek_core::TurnId;
use thiserror::Error;

/// A result type using `ClientError`.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Error type for gateway operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error detail from the response body.
        message: String,
    },

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// The streaming endpoint answered without a body.
    #[error("response has no body")]
    MissingBody,

    /// Client configuration is outside the bounds the backend accepts.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Errors raised by the conversation state machine itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversationError {
    /// A turn is still streaming; it must finish or be cancelled first.
    #[error("turn {0} is still streaming")]
    StreamInProgress(TurnId),

    /// The message is empty after trimming.
    #[error("message is empty")]
    EmptyMessage,

    /// The message is longer than the backend accepts.
    #[error("message is {len} characters long, the limit is {max}")]
    MessageTooLong {
        /// Message length in characters.
        len: usize,
        /// Maximum accepted length.
        max: usize,
    },
}

/// Error type for a streamed chat turn.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The request could not be made or the stream broke.
    #[error("transport failure: {0}")]
    Transport(#[from] ClientError),

    /// The backend reported an error through the event stream.
    #[error("backend error: {0}")]
    Remote(String),

    /// The turn was refused locally.
    #[error(transparent)]
    Conversation(#[from] ConversationError),
}
