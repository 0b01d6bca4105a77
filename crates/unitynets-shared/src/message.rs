//! The chat message model.
//!
//! `MessageContent` is a tagged union keyed by the message type: each
//! variant carries its own payload (attachment URL and file metadata, call
//! type and duration, ...) instead of a free-form metadata map, so the
//! store and the UI never cast at runtime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CallType, ChatId, MessageId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageContent {
    Text {
        body: String,
    },
    Image {
        url: String,
        caption: Option<String>,
    },
    Video {
        url: String,
        file_name: String,
    },
    Voice {
        url: String,
        duration_secs: u32,
    },
    File {
        url: String,
        file_name: String,
        file_size: u64,
    },
    CallStarted {
        call_type: CallType,
    },
    CallEnded {
        call_type: CallType,
        duration_secs: u64,
    },
    MissedCall {
        call_type: CallType,
        caller_id: UserId,
    },
    CallSummary {
        call_type: CallType,
        duration_secs: u64,
    },
    System {
        body: String,
    },
}

impl MessageContent {
    /// Stable tag string, stored alongside the payload so the store can
    /// filter by type without deserializing.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Image { .. } => "image",
            Self::Video { .. } => "video",
            Self::Voice { .. } => "voice",
            Self::File { .. } => "file",
            Self::CallStarted { .. } => "call_started",
            Self::CallEnded { .. } => "call_ended",
            Self::MissedCall { .. } => "missed_call",
            Self::CallSummary { .. } => "call_summary",
            Self::System { .. } => "system",
        }
    }

    pub fn is_attachment(&self) -> bool {
        matches!(
            self,
            Self::Image { .. } | Self::Video { .. } | Self::Voice { .. } | Self::File { .. }
        )
    }

    /// Plain text body, if this content type has one.
    pub fn text_body(&self) -> Option<&str> {
        match self {
            Self::Text { body } | Self::System { body } => Some(body),
            _ => None,
        }
    }
}

/// A single chat message as persisted and fanned out.
///
/// A deleted message keeps its id and `created_at` (the ordering key never
/// changes after creation); only rendering is suppressed. Edits rewrite the
/// content and set `is_edited`/`edited_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub content: MessageContent,
    /// Back-reference to another message in the same chat (non-owning).
    pub reply_to: Option<MessageId>,
    pub is_edited: bool,
    pub is_deleted: bool,
    pub is_forwarded: bool,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Mint a new outbound message with a fresh id and the current time as
    /// its ordering key.
    pub fn new(chat_id: ChatId, sender_id: UserId, content: MessageContent) -> Self {
        Self {
            id: MessageId::new(),
            chat_id,
            sender_id,
            content,
            reply_to: None,
            is_edited: false,
            is_deleted: false,
            is_forwarded: false,
            created_at: Utc::now(),
            edited_at: None,
        }
    }

    pub fn with_reply_to(mut self, reply_to: MessageId) -> Self {
        self.reply_to = Some(reply_to);
        self
    }

    pub fn forwarded(mut self) -> Self {
        self.is_forwarded = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_kind_tags() {
        let content = MessageContent::File {
            url: "file:///blobs/x".into(),
            file_name: "notes.pdf".into(),
            file_size: 1024,
        };
        assert_eq!(content.kind(), "file");
        assert!(content.is_attachment());

        let call = MessageContent::MissedCall {
            call_type: CallType::Voice,
            caller_id: UserId::new(),
        };
        assert_eq!(call.kind(), "missed_call");
        assert!(!call.is_attachment());
    }

    #[test]
    fn content_json_shape() {
        let content = MessageContent::Text {
            body: "hello".into(),
        };
        let json = serde_json::to_value(&content).unwrap();
        assert_eq!(json["text"]["body"], "hello");
    }
}
