//! Streamed chat turns.
//!
//! [`TurnStream`] is the synchronous decode loop body: it takes body
//! fragments as they arrive, decodes frames, and applies their events to one
//! assistant turn. [`ChatSession`] drives it from a [`ChatBackend`] stream.

use docseek_core::TurnId;
use futures::StreamExt;

use crate::client::ChatBackend;
use crate::conversation::{Conversation, ConversationTurn};
use crate::error::ChatError;
use crate::events::{Applied, Diagnostics, StreamEvent};
use crate::sse::{DropReason, FrameDecoder, FrameDrop};

/// How a streamed turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// A `done` event arrived.
    Completed,
    /// An `error` event arrived.
    BackendError(String),
    /// The body ended before a terminal event. Partial content was kept.
    EndOfStream,
    /// The turn stopped streaming elsewhere (cancelled or cleared).
    Abandoned,
}

/// Summary of one streamed turn.
#[derive(Debug, Clone)]
pub struct StreamReport {
    /// The assistant turn the stream fed.
    pub turn_id: TurnId,
    /// How the turn ended.
    pub outcome: TurnOutcome,
    /// Frame counters for the stream.
    pub diagnostics: Diagnostics,
}

/// Decode state for the body of one chat response.
#[derive(Debug)]
pub struct TurnStream {
    turn_id: TurnId,
    decoder: FrameDecoder,
    diagnostics: Diagnostics,
    outcome: Option<TurnOutcome>,
}

impl TurnStream {
    /// Start decoding a body for `turn_id`.
    #[must_use]
    pub fn new(turn_id: TurnId) -> Self {
        Self {
            turn_id,
            decoder: FrameDecoder::new(),
            diagnostics: Diagnostics::default(),
            outcome: None,
        }
    }

    /// The assistant turn this stream feeds.
    #[must_use]
    pub const fn turn_id(&self) -> TurnId {
        self.turn_id
    }

    /// Counters so far.
    #[must_use]
    pub const fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Feed one body fragment.
    ///
    /// Returns the outcome once a terminal event has been applied. Frames
    /// decoded after that point are counted as late and not applied.
    pub fn feed(
        &mut self,
        conversation: &mut Conversation,
        fragment: &[u8],
    ) -> Option<TurnOutcome> {
        for item in self.decoder.push(fragment) {
            let frame = match item {
                Ok(frame) => frame,
                Err(drop) => {
                    self.diagnostics.record_drop(drop);
                    continue;
                }
            };
            self.diagnostics.frames_decoded += 1;

            if self.outcome.is_some() {
                self.diagnostics.record_late(&frame.event_type);
                continue;
            }

            let event = match StreamEvent::from_frame(&frame) {
                Ok(Some(event)) => event,
                Ok(None) => {
                    self.diagnostics.record_ignored(&frame.event_type);
                    continue;
                }
                Err(e) => {
                    tracing::debug!(
                        event_type = %frame.event_type,
                        error = %e,
                        "Invalid frame payload"
                    );
                    self.diagnostics.record_drop(FrameDrop::new(
                        DropReason::InvalidPayload,
                        Some(frame.event_type),
                    ));
                    continue;
                }
            };

            let backend_error = match &event {
                StreamEvent::Error(message) => Some(message.clone()),
                _ => None,
            };

            match conversation.apply(self.turn_id, event) {
                Applied::Updated => self.diagnostics.frames_applied += 1,
                Applied::Finished => {
                    self.diagnostics.frames_applied += 1;
                    self.outcome = Some(
                        backend_error.map_or(TurnOutcome::Completed, TurnOutcome::BackendError),
                    );
                }
                Applied::Ignored => {
                    self.diagnostics.record_late(&frame.event_type);
                    self.outcome = Some(TurnOutcome::Abandoned);
                }
            }
        }
        self.outcome.clone()
    }

    /// Finish the stream at end of body.
    ///
    /// A turn still streaming is finalized with whatever content arrived.
    #[must_use]
    pub fn finish(mut self, conversation: &mut Conversation) -> StreamReport {
        if let Some(drop) = self.decoder.finish() {
            self.diagnostics.record_drop(drop);
        }

        let outcome = match self.outcome {
            Some(outcome) => outcome,
            None => match conversation.end_of_stream(self.turn_id) {
                Applied::Ignored => TurnOutcome::Abandoned,
                _ => TurnOutcome::EndOfStream,
            },
        };

        tracing::debug!(
            turn_id = %self.turn_id,
            outcome = ?outcome,
            decoded = self.diagnostics.frames_decoded,
            applied = self.diagnostics.frames_applied,
            dropped = self.diagnostics.dropped(),
            "Stream finished"
        );

        StreamReport {
            turn_id: self.turn_id,
            outcome,
            diagnostics: self.diagnostics,
        }
    }
}

/// A conversation bound to a chat backend.
pub struct ChatSession<B> {
    backend: B,
    conversation: Conversation,
}

impl<B: ChatBackend> ChatSession<B> {
    /// Create a session with an empty conversation.
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            conversation: Conversation::new(),
        }
    }

    /// The conversation so far.
    #[must_use]
    pub const fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Send a message and stream the answer to completion.
    ///
    /// # Errors
    ///
    /// See [`ChatSession::send_message_with`].
    pub async fn send_message(&mut self, message: &str) -> Result<StreamReport, ChatError> {
        self.send_message_with(message, |_| {}).await
    }

    /// Send a message, calling `on_update` with the assistant turn each time
    /// a fragment changes it.
    ///
    /// If the returned future is dropped mid-stream, the turn keeps
    /// streaming until [`ChatSession::cancel`] is called.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::Conversation` if the message is refused,
    /// `ChatError::Transport` if the request or body fails, and
    /// `ChatError::Remote` if the backend sends an `error` event. In the last
    /// two cases the turn holds the fallback message.
    pub async fn send_message_with<F>(
        &mut self,
        message: &str,
        mut on_update: F,
    ) -> Result<StreamReport, ChatError>
    where
        F: FnMut(&ConversationTurn) + Send,
    {
        let pending = self.conversation.begin_turn(message)?;
        let turn_id = pending.assistant_turn;

        let mut body = match self.backend.chat_stream(&pending.request).await {
            Ok(body) => body,
            Err(e) => {
                self.conversation.fail(turn_id, e.to_string());
                return Err(ChatError::Transport(e));
            }
        };

        let mut stream = TurnStream::new(turn_id);
        while let Some(fragment) = body.next().await {
            let fragment = match fragment {
                Ok(fragment) => fragment,
                Err(e) => {
                    self.conversation.fail(turn_id, e.to_string());
                    return Err(ChatError::Transport(e));
                }
            };

            let applied_before = stream.diagnostics().frames_applied;
            let outcome = stream.feed(&mut self.conversation, &fragment);
            if stream.diagnostics().frames_applied > applied_before {
                if let Some(turn) = self.conversation.turn(turn_id) {
                    on_update(turn);
                }
            }
            if outcome.is_some() {
                break;
            }
        }
        drop(body);

        let report = stream.finish(&mut self.conversation);
        if report.outcome == TurnOutcome::EndOfStream {
            if let Some(turn) = self.conversation.turn(turn_id) {
                on_update(turn);
            }
        }

        match report.outcome {
            TurnOutcome::BackendError(message) => Err(ChatError::Remote(message)),
            _ => Ok(report),
        }
    }

    /// Stop a turn left streaming by a dropped `send_message` future.
    pub fn cancel(&mut self) -> Option<TurnId> {
        self.conversation.cancel()
    }

    /// Forget the whole conversation.
    pub fn clear(&mut self) {
        self.conversation.clear();
    }
}
