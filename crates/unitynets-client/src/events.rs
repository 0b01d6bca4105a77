//! UI event boundary.
//!
//! The session pushes typed events through an injected [`EventSink`]; the
//! embedding shell (desktop window, web view, test harness) decides how to
//! render them. Payloads are plain serde structs serialized to JSON values
//! at the boundary.

use serde::Serialize;

use unitynets_media::CallPhase;
use unitynets_shared::types::CallType;

pub const EVENT_NEW_MESSAGE: &str = "new-message";
pub const EVENT_MESSAGE_EDITED: &str = "message-edited";
pub const EVENT_MESSAGE_DELETED: &str = "message-deleted";
pub const EVENT_MESSAGE_REACTION: &str = "message-reaction";
pub const EVENT_READ_RECEIPT: &str = "read-receipt";
pub const EVENT_TYPING_INDICATOR: &str = "typing-indicator";
pub const EVENT_CHAT_ADDED: &str = "chat-added";
pub const EVENT_INCOMING_CALL: &str = "incoming-call";
pub const EVENT_CALL_STATE_CHANGED: &str = "call-state-changed";
pub const EVENT_PLAYBACK_BLOCKED: &str = "playback-blocked";
pub const EVENT_OPERATION_FAILED: &str = "operation-failed";

/// Where session events go. Implementations must be cheap and non-blocking;
/// the session emits from its own task.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &str, payload: serde_json::Value);
}

pub fn emit_event<S: Serialize>(sink: &dyn EventSink, event: &str, payload: S) {
    match serde_json::to_value(payload) {
        Ok(value) => sink.emit(event, value),
        Err(e) => tracing::error!(event, error = %e, "Failed to serialize event payload"),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewMessagePayload {
    pub chat_id: String,
    pub message_id: String,
    pub sender: String,
    pub kind: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageEditedPayload {
    pub chat_id: String,
    pub message_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageDeletedPayload {
    pub chat_id: String,
    pub message_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReactionPayload {
    pub chat_id: String,
    pub message_id: String,
    pub user_id: String,
    pub emoji: String,
    pub action: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadReceiptPayload {
    pub chat_id: String,
    pub message_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TypingPayload {
    pub chat_id: String,
    pub user_id: String,
    pub display_name: Option<String>,
    pub is_typing: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatAddedPayload {
    pub chat_id: String,
    pub kind: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IncomingCallPayload {
    pub chat_id: String,
    pub caller_id: String,
    pub caller_name: String,
    pub caller_avatar: Option<String>,
    pub call_type: CallType,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallStatePayload {
    pub chat_id: String,
    pub peer: String,
    pub call_type: CallType,
    pub phase: CallPhase,
    pub is_incoming: bool,
    pub is_muted: bool,
    pub is_video_off: bool,
    pub was_connected: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaybackBlockedPayload {
    pub chat_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationFailedPayload {
    pub operation: String,
    pub error: String,
}

/// Sink that discards everything. Useful for headless embeddings.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &str, _payload: serde_json::Value) {}
}

/// Sink that records events in memory, for tests and debugging.
#[derive(Default)]
pub struct MemorySink {
    events: std::sync::Mutex<Vec<(String, serde_json::Value)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(String, serde_json::Value)> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn names(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .map(|(name, _)| name)
            .collect()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|(name, _)| name == event).count()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &str, payload: serde_json::Value) {
        if let Ok(mut events) = self.events.lock() {
            events.push((event.to_string(), payload));
        }
    }
}
