//! Typed chat stream events and the dispatcher that routes them.
//!
//! A decoded [`Frame`] becomes a [`StreamEvent`] once its JSON payload parses.
//! [`dispatch`] then calls exactly one [`StreamHandler`] method. Frames whose
//! payload does not parse are dropped and recorded in [`Diagnostics`]; frames
//! with an event type this client does not know are ignored.

use docseek_core::Source;
use serde::Deserialize;

use crate::sse::{DropReason, Frame, FrameDrop};

/// Event types the backend emits.
pub mod event_type {
    /// Retrieved passages for the answer.
    pub const SOURCES: &str = "sources";
    /// Rewritten search query.
    pub const QUERY: &str = "query";
    /// Piece of answer text.
    pub const CHUNK: &str = "chunk";
    /// Successful end of the answer.
    pub const DONE: &str = "done";
    /// Backend failure while answering.
    pub const ERROR: &str = "error";
}

/// A typed event from the chat stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Passages backing the answer. Replaces any earlier list.
    Sources(Vec<Source>),
    /// The query the backend searched with.
    Query(String),
    /// Answer text to append.
    Chunk(String),
    /// The answer is complete.
    Done {
        /// Server-side time spent, when reported.
        search_time_ms: Option<f64>,
    },
    /// The backend gave up on the answer.
    Error(String),
}

#[derive(Deserialize)]
struct SourcesPayload {
    sources: Vec<Source>,
}

#[derive(Deserialize)]
struct QueryPayload {
    rewritten_query: String,
}

#[derive(Deserialize)]
struct ChunkPayload {
    text: String,
}

#[derive(Deserialize)]
struct DonePayload {
    #[serde(default)]
    search_time_ms: Option<f64>,
}

#[derive(Deserialize)]
struct ErrorPayload {
    error: String,
}

impl StreamEvent {
    /// Interpret a frame.
    ///
    /// Returns `Ok(None)` for event types this client does not handle.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the payload is not valid JSON or does not
    /// have the shape its event type requires.
    pub fn from_frame(frame: &Frame) -> Result<Option<Self>, serde_json::Error> {
        let payload: serde_json::Value = serde_json::from_str(&frame.data)?;

        let event = match frame.event_type.as_str() {
            event_type::SOURCES => {
                let p: SourcesPayload = serde_json::from_value(payload)?;
                Self::Sources(p.sources)
            }
            event_type::QUERY => {
                let p: QueryPayload = serde_json::from_value(payload)?;
                Self::Query(p.rewritten_query)
            }
            event_type::CHUNK => {
                let p: ChunkPayload = serde_json::from_value(payload)?;
                Self::Chunk(p.text)
            }
            event_type::DONE => {
                let p: DonePayload = serde_json::from_value(payload)?;
                Self::Done {
                    search_time_ms: p.search_time_ms,
                }
            }
            event_type::ERROR => {
                let p: ErrorPayload = serde_json::from_value(payload)?;
                Self::Error(p.error)
            }
            _ => return Ok(None),
        };

        Ok(Some(event))
    }

    /// Wire name of the event.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Sources(_) => event_type::SOURCES,
            Self::Query(_) => event_type::QUERY,
            Self::Chunk(_) => event_type::CHUNK,
            Self::Done { .. } => event_type::DONE,
            Self::Error(_) => event_type::ERROR,
        }
    }

    /// Whether the event ends the turn.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error(_))
    }
}

/// What a handler did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The turn changed and keeps streaming.
    Updated,
    /// The turn reached a terminal state.
    Finished,
    /// The event was not applied (the turn is no longer streaming).
    Ignored,
}

/// Receiver of dispatched events. One method per event type.
pub trait StreamHandler {
    /// Attach the sources list, replacing any earlier one.
    fn on_sources(&mut self, sources: Vec<Source>) -> Applied;

    /// Attach the rewritten query.
    fn on_query(&mut self, rewritten_query: String) -> Applied;

    /// Append answer text.
    fn on_chunk(&mut self, text: String) -> Applied;

    /// Mark the answer complete.
    fn on_done(&mut self, search_time_ms: Option<f64>) -> Applied;

    /// Mark the answer failed.
    fn on_error(&mut self, message: String) -> Applied;
}

/// Route an event to the matching handler method.
pub fn dispatch<H: StreamHandler + ?Sized>(event: StreamEvent, handler: &mut H) -> Applied {
    match event {
        StreamEvent::Sources(sources) => handler.on_sources(sources),
        StreamEvent::Query(query) => handler.on_query(query),
        StreamEvent::Chunk(text) => handler.on_chunk(text),
        StreamEvent::Done { search_time_ms } => handler.on_done(search_time_ms),
        StreamEvent::Error(message) => handler.on_error(message),
    }
}

/// Counters describing what happened to the frames of one stream.
///
/// Dropped frames never fail a stream; they are recorded here instead so
/// callers and tests can observe them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    /// Complete frames the decoder produced.
    pub frames_decoded: usize,
    /// Frames that changed the turn.
    pub frames_applied: usize,
    /// Frames with an event type this client does not handle.
    pub frames_ignored: usize,
    /// Frames that arrived after the turn had finished.
    pub late_frames: usize,
    /// Frames that were discarded, in stream order.
    pub drops: Vec<FrameDrop>,
}

impl Diagnostics {
    /// Record a discarded frame.
    pub fn record_drop(&mut self, drop: FrameDrop) {
        tracing::debug!(
            reason = %drop.reason,
            event_type = ?drop.event_type,
            "Dropped stream frame"
        );
        self.drops.push(drop);
    }

    /// Record an event type this client does not handle.
    pub fn record_ignored(&mut self, event_type: &str) {
        tracing::debug!(event_type = %event_type, "Ignoring unknown stream event");
        self.frames_ignored += 1;
    }

    /// Record a frame that arrived after the turn had finished.
    pub fn record_late(&mut self, event_type: &str) {
        tracing::debug!(event_type = %event_type, "Ignoring frame for finished turn");
        self.late_frames += 1;
    }

    /// Total number of dropped frames.
    #[must_use]
    pub fn dropped(&self) -> usize {
        self.drops.len()
    }

    /// Number of frames dropped for `reason`.
    #[must_use]
    pub fn dropped_for(&self, reason: DropReason) -> usize {
        self.drops.iter().filter(|d| d.reason == reason).count()
    }
}
