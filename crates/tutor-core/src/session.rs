//! Conversation state and the per-exchange state machine.
//!
//! `ChatSession` is mutated only from the UI event loop. Network work happens
//! elsewhere (see [`crate::client`]) and reaches the session as a sequence of
//! `begin_stream` / `apply_event` / `finish` / `fail` calls.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::error::ChatError;
use crate::state::{ChatMessage, ChatRequest, ChatRole, HistoryTurn, MessageId, SelectionEvent, Source};
use crate::stream::StreamEvent;

/// Selections of this many characters or fewer (after trimming) are ignored.
pub const MIN_SELECTION_CHARS: usize = 3;

/// Progress of one exchange, as reported by the network side.
#[derive(Debug)]
pub enum ExchangeUpdate {
    /// The response is open and bytes are about to flow
    Started,
    Event(StreamEvent),
    /// The body ended without an `error` record
    Finished,
    Failed(ChatError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Idle,
    Sending,
    Streaming,
}

#[derive(Debug)]
pub struct ChatSession {
    messages: Vec<ChatMessage>,
    input: String,
    pinned_context: String,
    current_page: Option<String>,
    state: ExchangeState,
    panel_open: bool,
    last_selection_ts: u64,
    /// Context captured by the in-flight exchange
    in_flight_context: Option<String>,
    active_assistant: Option<usize>,
    next_seq: u64,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            input: String::new(),
            pinned_context: String::new(),
            current_page: None,
            state: ExchangeState::Idle,
            panel_open: false,
            last_selection_ts: 0,
            in_flight_context: None,
            active_assistant: None,
            next_seq: 0,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    pub fn is_loading(&self) -> bool {
        self.state != ExchangeState::Idle
    }

    pub fn pinned_context(&self) -> &str {
        &self.pinned_context
    }

    /// Context that the in-flight request was built with, if any.
    pub fn in_flight_context(&self) -> Option<&str> {
        self.in_flight_context.as_deref()
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut String {
        &mut self.input
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    pub fn set_current_page(&mut self, page: Option<String>) {
        self.current_page = page;
    }

    pub fn is_open(&self) -> bool {
        self.panel_open
    }

    pub fn toggle_panel(&mut self) {
        self.panel_open = !self.panel_open;
    }

    pub fn placeholder(&self) -> &'static str {
        if self.pinned_context.is_empty() {
            "Ask a question..."
        } else {
            "Ask a question about the selected text..."
        }
    }

    /// Pin a confirmed selection. Returns whether the event was applied.
    pub fn accept_selection(&mut self, event: &SelectionEvent) -> bool {
        if event.timestamp <= self.last_selection_ts {
            debug!(
                timestamp = event.timestamp,
                last = self.last_selection_ts,
                "ignoring stale selection event"
            );
            return false;
        }
        self.last_selection_ts = event.timestamp;

        let text = event.text.trim();
        if text.chars().count() <= MIN_SELECTION_CHARS {
            return false;
        }

        self.pinned_context = text.to_string();
        self.panel_open = true;
        debug!(chars = text.chars().count(), "pinned selection as chat context");
        true
    }

    pub fn clear_context(&mut self) {
        self.pinned_context.clear();
    }

    /// Start an exchange with the current input box contents.
    pub fn submit_input(&mut self) -> Option<ChatRequest> {
        let input = self.input.clone();
        self.submit(&input)
    }

    /// Start an exchange. Returns the request to send, or `None` when the
    /// input is blank or an exchange is already in flight.
    pub fn submit(&mut self, input: &str) -> Option<ChatRequest> {
        if input.trim().is_empty() || self.is_loading() {
            return None;
        }

        let id = self.next_id("user");
        self.messages.push(ChatMessage::new(id, ChatRole::User, input));

        let captured = if self.pinned_context.is_empty() {
            None
        } else {
            Some(self.pinned_context.clone())
        };
        self.in_flight_context = captured.clone();

        self.input.clear();
        self.transition(ExchangeState::Sending);

        Some(ChatRequest {
            message: input.to_string(),
            selected_text: captured,
            current_page: self.current_page.clone(),
            conversation_history: self.messages.iter().map(HistoryTurn::from).collect(),
        })
    }

    pub fn apply_update(&mut self, update: ExchangeUpdate) {
        match update {
            ExchangeUpdate::Started => self.begin_stream(),
            ExchangeUpdate::Event(event) => self.apply_event(event),
            ExchangeUpdate::Finished => self.finish(),
            ExchangeUpdate::Failed(err) => self.fail(err),
        }
    }

    /// The response is open: create the assistant message it will fill.
    pub fn begin_stream(&mut self) {
        if self.state != ExchangeState::Sending {
            warn!(state = ?self.state, "begin_stream outside of Sending");
            return;
        }

        let id = self.next_id("assistant");
        self.messages.push(ChatMessage::new(id, ChatRole::Assistant, ""));
        self.active_assistant = Some(self.messages.len() - 1);
        self.transition(ExchangeState::Streaming);
    }

    pub fn apply_event(&mut self, event: StreamEvent) {
        if self.state != ExchangeState::Streaming {
            debug!(state = ?self.state, "dropping stream event outside of Streaming");
            return;
        }

        match event {
            StreamEvent::Sources { sources } => {
                if let (Some(sources), Some(msg)) = (sources, self.active_message_mut()) {
                    msg.sources = sources;
                }
            }
            StreamEvent::Content { chunk } => {
                if let Some(msg) = self.active_message_mut() {
                    msg.content.push_str(&chunk);
                }
            }
            StreamEvent::Done => self.finish(),
            StreamEvent::Error { message } => self.fail(ChatError::from_server_message(message)),
        }
    }

    /// The stream ended without an error record.
    pub fn finish(&mut self) {
        if self.state == ExchangeState::Idle {
            return;
        }
        self.end_exchange();
    }

    /// Surface a failure as an assistant message and return to `Idle`.
    pub fn fail(&mut self, err: ChatError) {
        if self.state == ExchangeState::Idle {
            return;
        }
        warn!(error = %err, "chat exchange failed");

        let id = self.next_id("error");
        let mut msg = ChatMessage::new(id, ChatRole::Assistant, format!("Error: {}", err));
        msg.error = true;
        self.messages.push(msg);
        self.end_exchange();
    }

    /// Sources of `msg` as they should be displayed.
    pub fn visible_sources(msg: &ChatMessage) -> Vec<&Source> {
        unique_sources(&msg.sources)
    }

    fn active_message_mut(&mut self) -> Option<&mut ChatMessage> {
        self.active_assistant.and_then(|i| self.messages.get_mut(i))
    }

    fn end_exchange(&mut self) {
        self.active_assistant = None;
        self.in_flight_context = None;
        self.transition(ExchangeState::Idle);
    }

    fn transition(&mut self, next: ExchangeState) {
        debug!(from = ?self.state, to = ?next, "exchange state");
        self.state = next;
    }

    fn next_id(&mut self, kind: &str) -> MessageId {
        self.next_seq += 1;
        MessageId::new(kind, self.next_seq)
    }
}

/// Drop citations repeating an earlier `(url, section)` pair, keeping order.
pub fn unique_sources(sources: &[Source]) -> Vec<&Source> {
    let mut seen = HashSet::new();
    sources
        .iter()
        .filter(|s| seen.insert((s.url.as_str(), s.section.as_str())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{parse_record, Record};

    fn source(url: &str, section: &str) -> Source {
        Source {
            chapter: 1,
            lesson: 1,
            section: section.to_string(),
            url: url.to_string(),
        }
    }

    fn selection(text: &str, timestamp: u64) -> SelectionEvent {
        SelectionEvent {
            text: text.to_string(),
            timestamp,
        }
    }

    fn content(chunk: &str) -> StreamEvent {
        StreamEvent::Content {
            chunk: chunk.to_string(),
        }
    }

    #[test]
    fn test_accept_selection_pins_and_opens() {
        let mut session = ChatSession::new();
        assert!(!session.is_open());

        assert!(session.accept_selection(&selection("  forward kinematics  ", 10)));
        assert_eq!(session.pinned_context(), "forward kinematics");
        assert!(session.is_open());
    }

    #[test]
    fn test_accept_selection_ignores_repeated_timestamp() {
        let mut session = ChatSession::new();
        assert!(session.accept_selection(&selection("first passage", 5)));
        session.clear_context();

        assert!(!session.accept_selection(&selection("first passage", 5)));
        assert_eq!(session.pinned_context(), "");

        assert!(!session.accept_selection(&selection("older passage", 4)));
        assert_eq!(session.pinned_context(), "");
    }

    #[test]
    fn test_accept_selection_short_text_is_ignored() {
        let mut session = ChatSession::new();
        assert!(session.accept_selection(&selection("actuators", 1)));
        assert!(!session.accept_selection(&selection(" abc ", 2)));
        assert_eq!(session.pinned_context(), "actuators");
    }

    #[test]
    fn test_submit_blank_is_noop() {
        let mut session = ChatSession::new();
        assert!(session.submit("   \n").is_none());
        assert!(session.messages().is_empty());
        assert_eq!(session.state(), ExchangeState::Idle);
    }

    #[test]
    fn test_submit_builds_request_with_history() {
        let mut session = ChatSession::new();
        session.set_current_page(Some("/docs/chapter-01/lesson-01".to_string()));
        session.set_input("What is a humanoid?");

        let request = session.submit_input().unwrap();
        assert_eq!(session.input(), "");
        assert_eq!(session.state(), ExchangeState::Sending);
        assert_eq!(request.message, "What is a humanoid?");
        assert_eq!(request.selected_text, None);
        assert_eq!(request.current_page.as_deref(), Some("/docs/chapter-01/lesson-01"));
        assert_eq!(request.conversation_history.len(), 1);
        assert_eq!(request.conversation_history[0].role, ChatRole::User);
    }

    #[test]
    fn test_submit_while_streaming_is_noop() {
        let mut session = ChatSession::new();
        session.submit("first").unwrap();
        session.begin_stream();
        assert_eq!(session.state(), ExchangeState::Streaming);

        assert!(session.submit("second").is_none());
        let users = session
            .messages()
            .iter()
            .filter(|m| m.role == ChatRole::User)
            .count();
        assert_eq!(users, 1);
    }

    #[test]
    fn test_content_chunks_append() {
        let mut session = ChatSession::new();
        session.submit("hi").unwrap();
        session.begin_stream();
        session.apply_event(content("Hel"));
        session.apply_event(content("lo"));
        session.finish();

        let last = session.messages().last().unwrap();
        assert_eq!(last.role, ChatRole::Assistant);
        assert_eq!(last.content, "Hello");
        assert_eq!(session.state(), ExchangeState::Idle);
    }

    #[test]
    fn test_sources_overwrite() {
        let mut session = ChatSession::new();
        session.submit("hi").unwrap();
        session.begin_stream();
        session.apply_event(StreamEvent::Sources {
            sources: Some(vec![source("/a", "S1")]),
        });
        session.apply_event(StreamEvent::Sources {
            sources: Some(vec![source("/b", "S2"), source("/c", "S3")]),
        });

        let last = session.messages().last().unwrap();
        assert_eq!(last.sources.len(), 2);
        assert_eq!(last.sources[0].url, "/b");
    }

    #[test]
    fn test_error_event_ends_exchange() {
        let mut session = ChatSession::new();
        session.submit("hi").unwrap();
        session.begin_stream();
        session.apply_event(content("partial"));
        session.apply_event(StreamEvent::Error {
            message: Some("LLM quota exceeded".to_string()),
        });

        assert_eq!(session.state(), ExchangeState::Idle);
        assert_eq!(session.messages().len(), 3);
        assert_eq!(session.messages()[1].content, "partial");
        let last = session.messages().last().unwrap();
        assert_eq!(last.role, ChatRole::Assistant);
        assert_eq!(last.content, "Error: server error: LLM quota exceeded");

        // Late chunks after the error are dropped.
        session.apply_event(content("more"));
        assert_eq!(session.messages().len(), 3);
        assert_eq!(session.messages()[1].content, "partial");
    }

    #[test]
    fn test_multiline_server_error_becomes_one_line_message() {
        let mut session = ChatSession::new();
        session.submit("hi").unwrap();
        session.begin_stream();

        let line = r#"data: {"type":"error","message":"Traceback:\n  File x\nValueError"}"#;
        let Record::Event(event) = parse_record(line) else {
            panic!("expected an event record");
        };
        session.apply_event(event);

        let last = session.messages().last().unwrap();
        assert!(last.error);
        assert!(!last.content.contains('\n'));
        assert_eq!(last.content, "Error: server error: Traceback: File x ValueError");
    }

    #[test]
    fn test_fail_before_stream_appends_one_error() {
        let mut session = ChatSession::new();
        session.submit("hi").unwrap();
        session.fail(ChatError::Status(500));

        assert_eq!(session.state(), ExchangeState::Idle);
        assert_eq!(session.messages().len(), 2);
        let last = session.messages().last().unwrap();
        assert_eq!(last.role, ChatRole::Assistant);
        assert!(last.content.starts_with("Error:"));
        assert!(last.content.contains("500"));
        assert!(last.error);
        assert!(!session.messages()[0].error);

        // Session is usable again.
        assert!(session.submit("again").is_some());
    }

    #[test]
    fn test_clear_context_then_submit_sends_no_selection() {
        let mut session = ChatSession::new();
        session.accept_selection(&selection("center of mass", 1));
        session.clear_context();

        let request = session.submit("explain").unwrap();
        assert_eq!(request.selected_text, None);
    }

    #[test]
    fn test_context_survives_exchange_and_capture_is_stable() {
        let mut session = ChatSession::new();
        session.accept_selection(&selection("zero moment point", 1));

        let request = session.submit("what is this?").unwrap();
        assert_eq!(request.selected_text.as_deref(), Some("zero moment point"));

        session.begin_stream();
        session.accept_selection(&selection("inverse dynamics", 2));
        assert_eq!(session.pinned_context(), "inverse dynamics");
        assert_eq!(session.in_flight_context(), Some("zero moment point"));

        session.finish();
        assert_eq!(session.pinned_context(), "inverse dynamics");
    }

    #[test]
    fn test_placeholder_tracks_context() {
        let mut session = ChatSession::new();
        assert_eq!(session.placeholder(), "Ask a question...");
        session.accept_selection(&selection("gait cycle", 3));
        assert_eq!(session.placeholder(), "Ask a question about the selected text...");
    }

    #[test]
    fn test_unique_sources_preserves_order() {
        let sources = vec![source("/a", "S1"), source("/a", "S1"), source("/b", "S1")];
        let unique = unique_sources(&sources);
        assert_eq!(unique.len(), 2);
        assert_eq!((unique[0].url.as_str(), unique[0].section.as_str()), ("/a", "S1"));
        assert_eq!((unique[1].url.as_str(), unique[1].section.as_str()), ("/b", "S1"));
    }

    #[test]
    fn test_message_ids_are_unique() {
        let mut session = ChatSession::new();
        session.submit("one").unwrap();
        session.begin_stream();
        session.finish();
        session.submit("two").unwrap();

        let ids: HashSet<_> = session.messages().iter().map(|m| m.id.clone()).collect();
        assert_eq!(ids.len(), session.messages().len());
    }
}
