//! Conversation state machine.
//!
//! Owns the ordered list of turns. Submitting a message appends a user turn
//! and an assistant placeholder in one step; stream events then rebuild the
//! placeholder until a terminal event arrives:
//!
//! ```text
//! Pending ──► Streaming ──► Completed
//!                  │
//!                  └──────► Errored
//! ```
//!
//! Only one turn streams at a time ([`ChatState`]). Events are applied only
//! to the turn named by the current `Streaming` state, so frames that arrive
//! after a turn has finished are ignored.
//!
//! The turn list lives behind an `Arc`. Every change clones the affected
//! turn, updates the clone and writes it back through [`Arc::make_mut`], so a
//! [`Conversation::snapshot`] taken between events never changes afterwards.

use std::sync::Arc;

use docseek_core::{ChatRequest, HistoryMessage, Role, Source, TurnId};

use crate::error::ConversationError;
use crate::events::{dispatch, Applied, StreamEvent, StreamHandler};

/// Content shown in place of an answer that failed.
pub const ERROR_FALLBACK_MESSAGE: &str =
    "Sorry, I encountered an error while generating a response. Please try again.";

/// Longest message the backend accepts, in characters.
pub const MAX_MESSAGE_CHARS: usize = 1000;

/// Lifecycle of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    /// Still receiving events.
    Streaming,
    /// Finished normally (or was cut short and kept as-is).
    Completed,
    /// Finished with an error; content holds [`ERROR_FALLBACK_MESSAGE`].
    Errored,
}

/// One entry in the conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationTurn {
    /// Turn identifier.
    pub id: TurnId,
    /// Author of the turn.
    pub role: Role,
    /// Text accumulated so far.
    pub content: String,
    /// Passages backing an assistant answer.
    pub sources: Option<Vec<Source>>,
    /// The query the backend searched with.
    pub rewritten_query: Option<String>,
    /// Whether the turn is still receiving events.
    pub is_streaming: bool,
    /// Lifecycle state.
    pub status: TurnStatus,
    /// Server-side time reported by the `done` event.
    pub search_time_ms: Option<f64>,
}

impl ConversationTurn {
    fn user(content: impl Into<String>) -> Self {
        Self {
            id: TurnId::generate(),
            role: Role::User,
            content: content.into(),
            sources: None,
            rewritten_query: None,
            is_streaming: false,
            status: TurnStatus::Completed,
            search_time_ms: None,
        }
    }

    fn assistant_placeholder() -> Self {
        Self {
            id: TurnId::generate(),
            role: Role::Assistant,
            content: String::new(),
            sources: None,
            rewritten_query: None,
            is_streaming: true,
            status: TurnStatus::Streaming,
            search_time_ms: None,
        }
    }

    /// Whether the turn has reached a terminal state.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.status != TurnStatus::Streaming
    }
}

/// Conversation-level streaming state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatState {
    /// No turn is streaming.
    #[default]
    Idle,
    /// The given assistant turn is streaming.
    Streaming(TurnId),
}

/// The pair of turns created by [`Conversation::begin_turn`].
#[derive(Debug, Clone)]
pub struct PendingTurn {
    /// The user's turn.
    pub user_turn: TurnId,
    /// The assistant placeholder events will be applied to.
    pub assistant_turn: TurnId,
    /// Request body to send to the backend.
    pub request: ChatRequest,
}

/// Ordered list of turns plus the streaming state.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    turns: Arc<Vec<ConversationTurn>>,
    state: ChatState,
    last_error: Option<String>,
}

impl Conversation {
    /// Create an empty conversation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All turns, oldest first.
    #[must_use]
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// Immutable view of the turns that later events will not change.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<ConversationTurn>> {
        Arc::clone(&self.turns)
    }

    /// Current streaming state.
    #[must_use]
    pub const fn state(&self) -> ChatState {
        self.state
    }

    /// Whether a turn is streaming.
    #[must_use]
    pub const fn is_streaming(&self) -> bool {
        matches!(self.state, ChatState::Streaming(_))
    }

    /// Look up a turn.
    #[must_use]
    pub fn turn(&self, id: TurnId) -> Option<&ConversationTurn> {
        self.turns.iter().rev().find(|t| t.id == id)
    }

    /// The streaming assistant turn, if any.
    #[must_use]
    pub fn active_turn(&self) -> Option<&ConversationTurn> {
        match self.state {
            ChatState::Streaming(id) => self.turn(id),
            ChatState::Idle => None,
        }
    }

    /// Message of the most recent failure, cleared when a new turn begins.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Prior exchanges to send with the next request.
    ///
    /// Errored answers and the questions that produced them are left out so
    /// the fallback text never reaches the backend.
    #[must_use]
    pub fn history(&self) -> Vec<HistoryMessage> {
        let turns = self.turns.as_slice();
        turns
            .iter()
            .enumerate()
            .filter(|(i, turn)| {
                if !turn.is_finished() || turn.status == TurnStatus::Errored {
                    return false;
                }
                let answer_failed = turn.role == Role::User
                    && turns
                        .get(i + 1)
                        .is_some_and(|next| next.status == TurnStatus::Errored);
                !answer_failed
            })
            .map(|(_, turn)| HistoryMessage::new(turn.role, turn.content.clone()))
            .collect()
    }

    /// Submit a message: append the user turn and an empty streaming
    /// assistant turn, and build the request body.
    ///
    /// # Errors
    ///
    /// Returns `StreamInProgress` if another turn is streaming, or
    /// `EmptyMessage` / `MessageTooLong` if the message is outside what the
    /// backend accepts. The conversation is unchanged on error.
    pub fn begin_turn(&mut self, message: &str) -> Result<PendingTurn, ConversationError> {
        if let ChatState::Streaming(active) = self.state {
            return Err(ConversationError::StreamInProgress(active));
        }
        let message = message.trim();
        if message.is_empty() {
            return Err(ConversationError::EmptyMessage);
        }
        let len = message.chars().count();
        if len > MAX_MESSAGE_CHARS {
            return Err(ConversationError::MessageTooLong {
                len,
                max: MAX_MESSAGE_CHARS,
            });
        }

        let request = ChatRequest {
            message: message.to_string(),
            history: self.history(),
        };

        let user = ConversationTurn::user(message);
        let assistant = ConversationTurn::assistant_placeholder();
        let pending = PendingTurn {
            user_turn: user.id,
            assistant_turn: assistant.id,
            request,
        };

        let turns = Arc::make_mut(&mut self.turns);
        turns.push(user);
        turns.push(assistant);
        self.state = ChatState::Streaming(pending.assistant_turn);
        self.last_error = None;

        tracing::debug!(turn_id = %pending.assistant_turn, "Turn started");
        Ok(pending)
    }

    /// Apply a stream event to `turn_id`.
    ///
    /// Returns `Applied::Ignored` if `turn_id` is not the streaming turn.
    pub fn apply(&mut self, turn_id: TurnId, event: StreamEvent) -> Applied {
        dispatch(event, &mut self.handler(turn_id))
    }

    /// Borrow a [`StreamHandler`] that applies events to `turn_id`.
    pub fn handler(&mut self, turn_id: TurnId) -> TurnHandler<'_> {
        TurnHandler {
            conversation: self,
            turn_id,
        }
    }

    /// Finalize `turn_id` after a transport failure.
    ///
    /// The content is replaced with [`ERROR_FALLBACK_MESSAGE`].
    pub fn fail(&mut self, turn_id: TurnId, message: impl Into<String>) -> Applied {
        let message = message.into();
        let applied = self.finish(turn_id, TurnStatus::Errored, |turn| {
            turn.content = ERROR_FALLBACK_MESSAGE.to_string();
        });
        if applied == Applied::Finished {
            tracing::warn!(turn_id = %turn_id, error = %message, "Turn failed");
            self.last_error = Some(message);
        }
        applied
    }

    /// Finalize `turn_id` when the stream ended without a terminal event.
    ///
    /// Whatever content arrived is kept.
    pub fn end_of_stream(&mut self, turn_id: TurnId) -> Applied {
        let applied = self.finish(turn_id, TurnStatus::Completed, |_| {});
        if applied == Applied::Finished {
            tracing::warn!(turn_id = %turn_id, "Stream ended without a terminal event");
        }
        applied
    }

    /// Stop the streaming turn, keeping its partial content.
    ///
    /// Returns the ID of the turn that was streaming.
    pub fn cancel(&mut self) -> Option<TurnId> {
        let ChatState::Streaming(turn_id) = self.state else {
            return None;
        };
        self.finish(turn_id, TurnStatus::Completed, |_| {});
        tracing::debug!(turn_id = %turn_id, "Turn cancelled");
        Some(turn_id)
    }

    /// Remove every turn and return to `Idle`.
    pub fn clear(&mut self) {
        self.turns = Arc::new(Vec::new());
        self.state = ChatState::Idle;
        self.last_error = None;
    }

    /// Replace the streaming turn with an updated copy.
    fn update(&mut self, turn_id: TurnId, f: impl FnOnce(&mut ConversationTurn)) -> Applied {
        if self.state != ChatState::Streaming(turn_id) {
            return Applied::Ignored;
        }
        let Some(idx) = self.turns.iter().rposition(|t| t.id == turn_id) else {
            return Applied::Ignored;
        };
        let mut next = self.turns[idx].clone();
        f(&mut next);
        Arc::make_mut(&mut self.turns)[idx] = next;
        Applied::Updated
    }

    fn finish(
        &mut self,
        turn_id: TurnId,
        status: TurnStatus,
        f: impl FnOnce(&mut ConversationTurn),
    ) -> Applied {
        let applied = self.update(turn_id, |turn| {
            f(turn);
            turn.is_streaming = false;
            turn.status = status;
        });
        if applied == Applied::Ignored {
            return applied;
        }
        self.state = ChatState::Idle;
        Applied::Finished
    }
}

/// Applies dispatched events to one assistant turn.
#[derive(Debug)]
pub struct TurnHandler<'a> {
    conversation: &'a mut Conversation,
    turn_id: TurnId,
}

impl StreamHandler for TurnHandler<'_> {
    fn on_sources(&mut self, sources: Vec<Source>) -> Applied {
        self.conversation
            .update(self.turn_id, |turn| turn.sources = Some(sources))
    }

    fn on_query(&mut self, rewritten_query: String) -> Applied {
        self.conversation
            .update(self.turn_id, |turn| turn.rewritten_query = Some(rewritten_query))
    }

    fn on_chunk(&mut self, text: String) -> Applied {
        self.conversation
            .update(self.turn_id, |turn| turn.content.push_str(&text))
    }

    fn on_done(&mut self, search_time_ms: Option<f64>) -> Applied {
        self.conversation
            .finish(self.turn_id, TurnStatus::Completed, |turn| {
                turn.search_time_ms = search_time_ms;
            })
    }

    fn on_error(&mut self, message: String) -> Applied {
        self.conversation.fail(self.turn_id, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(name: &str) -> Source {
        Source {
            file_name: name.to_string(),
            page_number: 1,
            text: "passage".to_string(),
            score: 0.5,
        }
    }

    fn done() -> StreamEvent {
        StreamEvent::Done {
            search_time_ms: None,
        }
    }

    // =========================================================================
    // Turn Creation Tests
    // =========================================================================

    #[test]
    fn begin_turn_appends_pair() {
        let mut conversation = Conversation::new();
        let pending = conversation.begin_turn("  What is VAT?  ").unwrap();

        let turns = conversation.turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].content, "What is VAT?");
        assert_eq!(turns[1].role, Role::Assistant);
        assert!(turns[1].content.is_empty());
        assert!(turns[1].is_streaming);
        assert_eq!(turns[1].id, pending.assistant_turn);
        assert_eq!(conversation.state(), ChatState::Streaming(pending.assistant_turn));
        assert_eq!(pending.request.message, "What is VAT?");
        assert!(pending.request.history.is_empty());
    }

    #[test]
    fn begin_turn_rejects_overlap() {
        let mut conversation = Conversation::new();
        let first = conversation.begin_turn("one").unwrap();

        let err = conversation.begin_turn("two").unwrap_err();
        assert_eq!(err, ConversationError::StreamInProgress(first.assistant_turn));
        assert_eq!(conversation.turns().len(), 2);
    }

    #[test]
    fn begin_turn_validates_message() {
        let mut conversation = Conversation::new();
        assert_eq!(
            conversation.begin_turn("   ").unwrap_err(),
            ConversationError::EmptyMessage
        );

        let long = "x".repeat(MAX_MESSAGE_CHARS + 1);
        assert!(matches!(
            conversation.begin_turn(&long),
            Err(ConversationError::MessageTooLong { len: 1001, max: 1000 })
        ));
        assert!(conversation.turns().is_empty());
    }

    // =========================================================================
    // Event Application Tests
    // =========================================================================

    #[test]
    fn chunks_append_in_order() {
        let mut conversation = Conversation::new();
        let id = conversation.begin_turn("hi").unwrap().assistant_turn;

        for text in ["Hel", "lo", ", ", "world"] {
            assert_eq!(
                conversation.apply(id, StreamEvent::Chunk(text.to_string())),
                Applied::Updated
            );
        }
        assert_eq!(conversation.apply(id, done()), Applied::Finished);

        let turn = conversation.turn(id).unwrap();
        assert_eq!(turn.content, "Hello, world");
        assert!(!turn.is_streaming);
        assert_eq!(turn.status, TurnStatus::Completed);
        assert_eq!(conversation.state(), ChatState::Idle);
    }

    #[test]
    fn sources_replace_and_query_sets() {
        let mut conversation = Conversation::new();
        let id = conversation.begin_turn("hi").unwrap().assistant_turn;

        conversation.apply(id, StreamEvent::Sources(vec![source("a.pdf"), source("b.pdf")]));
        conversation.apply(id, StreamEvent::Sources(vec![source("c.pdf")]));
        conversation.apply(id, StreamEvent::Query("expanded".to_string()));

        let turn = conversation.turn(id).unwrap();
        let sources = turn.sources.as_ref().unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].file_name, "c.pdf");
        assert_eq!(turn.rewritten_query.as_deref(), Some("expanded"));
    }

    #[test]
    fn done_records_search_time() {
        let mut conversation = Conversation::new();
        let id = conversation.begin_turn("hi").unwrap().assistant_turn;

        conversation.apply(
            id,
            StreamEvent::Done {
                search_time_ms: Some(42.0),
            },
        );
        assert_eq!(conversation.turn(id).unwrap().search_time_ms, Some(42.0));
    }

    #[test]
    fn error_event_replaces_content_with_fallback() {
        let mut conversation = Conversation::new();
        let id = conversation.begin_turn("hi").unwrap().assistant_turn;

        conversation.apply(id, StreamEvent::Chunk("partial".to_string()));
        let applied = conversation.apply(id, StreamEvent::Error("model offline".to_string()));

        assert_eq!(applied, Applied::Finished);
        let turn = conversation.turn(id).unwrap();
        assert_eq!(turn.content, ERROR_FALLBACK_MESSAGE);
        assert_eq!(turn.status, TurnStatus::Errored);
        assert!(!turn.is_streaming);
        assert_eq!(conversation.last_error(), Some("model offline"));
    }

    #[test]
    fn late_events_are_ignored() {
        let mut conversation = Conversation::new();
        let id = conversation.begin_turn("hi").unwrap().assistant_turn;

        conversation.apply(id, StreamEvent::Chunk("done here".to_string()));
        conversation.apply(id, done());

        assert_eq!(
            conversation.apply(id, StreamEvent::Chunk(" extra".to_string())),
            Applied::Ignored
        );
        assert_eq!(
            conversation.apply(id, StreamEvent::Error("late".to_string())),
            Applied::Ignored
        );
        let turn = conversation.turn(id).unwrap();
        assert_eq!(turn.content, "done here");
        assert_eq!(turn.status, TurnStatus::Completed);
        assert!(conversation.last_error().is_none());
    }

    #[test]
    fn events_for_other_turns_are_ignored() {
        let mut conversation = Conversation::new();
        let first = conversation.begin_turn("one").unwrap().assistant_turn;
        conversation.apply(first, done());
        let second = conversation.begin_turn("two").unwrap().assistant_turn;

        assert_eq!(
            conversation.apply(first, StreamEvent::Chunk("stray".to_string())),
            Applied::Ignored
        );
        conversation.apply(second, StreamEvent::Chunk("ok".to_string()));

        assert!(conversation.turn(first).unwrap().content.is_empty());
        assert_eq!(conversation.turn(second).unwrap().content, "ok");
    }

    // =========================================================================
    // Finalization Tests
    // =========================================================================

    #[test]
    fn transport_failure_finalizes_turn() {
        let mut conversation = Conversation::new();
        let id = conversation.begin_turn("hi").unwrap().assistant_turn;

        assert_eq!(conversation.fail(id, "connection reset"), Applied::Finished);
        assert_eq!(conversation.turn(id).unwrap().content, ERROR_FALLBACK_MESSAGE);
        assert_eq!(conversation.last_error(), Some("connection reset"));
        assert!(!conversation.is_streaming());
    }

    #[test]
    fn end_of_stream_keeps_content() {
        let mut conversation = Conversation::new();
        let id = conversation.begin_turn("hi").unwrap().assistant_turn;
        conversation.apply(id, StreamEvent::Chunk("partial".to_string()));

        assert_eq!(conversation.end_of_stream(id), Applied::Finished);
        let turn = conversation.turn(id).unwrap();
        assert_eq!(turn.content, "partial");
        assert_eq!(turn.status, TurnStatus::Completed);
    }

    #[test]
    fn cancel_returns_to_idle() {
        let mut conversation = Conversation::new();
        assert_eq!(conversation.cancel(), None);

        let id = conversation.begin_turn("hi").unwrap().assistant_turn;
        conversation.apply(id, StreamEvent::Chunk("so far".to_string()));

        assert_eq!(conversation.cancel(), Some(id));
        assert_eq!(conversation.state(), ChatState::Idle);
        assert_eq!(conversation.turn(id).unwrap().content, "so far");
        assert!(conversation.begin_turn("next").is_ok());
    }

    #[test]
    fn clear_removes_everything() {
        let mut conversation = Conversation::new();
        conversation.begin_turn("hi").unwrap();
        conversation.clear();

        assert!(conversation.turns().is_empty());
        assert_eq!(conversation.state(), ChatState::Idle);
    }

    // =========================================================================
    // History and Snapshot Tests
    // =========================================================================

    #[test]
    fn history_skips_failed_exchanges() {
        let mut conversation = Conversation::new();

        let ok = conversation.begin_turn("first").unwrap().assistant_turn;
        conversation.apply(ok, StreamEvent::Chunk("answer".to_string()));
        conversation.apply(ok, done());

        let bad = conversation.begin_turn("second").unwrap().assistant_turn;
        conversation.fail(bad, "timeout");

        let pending = conversation.begin_turn("third").unwrap();
        assert_eq!(
            pending.request.history,
            vec![
                HistoryMessage::new(Role::User, "first"),
                HistoryMessage::new(Role::Assistant, "answer"),
            ]
        );
    }

    #[test]
    fn snapshot_is_unaffected_by_later_events() {
        let mut conversation = Conversation::new();
        let id = conversation.begin_turn("hi").unwrap().assistant_turn;
        conversation.apply(id, StreamEvent::Chunk("a".to_string()));

        let before = conversation.snapshot();
        conversation.apply(id, StreamEvent::Chunk("b".to_string()));
        conversation.apply(id, done());

        assert_eq!(before[1].content, "a");
        assert!(before[1].is_streaming);
        assert_eq!(conversation.turns()[1].content, "ab");
    }
}
