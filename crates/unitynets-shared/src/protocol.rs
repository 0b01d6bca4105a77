use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::Message;
use crate::types::{CallType, Chat, ChatId, MessageId, UserId};

/// All realtime events exchanged over the fan-out channel.
///
/// Chat topics carry message/reaction/receipt/typing events; user topics
/// carry call signaling addressed to a single peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WireMessage {
    /// A freshly persisted message, fanned out to chat subscribers.
    MessageNew(Message),

    /// An edit of an existing text message.
    MessageEdited(MessageEdit),

    /// Soft deletion of a message.
    MessageDeleted(MessageDelete),

    /// A reaction was added or removed.
    Reaction(ReactionUpdate),

    /// A participant read a message.
    ReadReceipt(ReadReceiptNotice),

    /// Ephemeral typing notice; never persisted.
    Typing(TypingNotice),

    /// Call signaling (SDP offer/answer, ICE candidates, reject, hangup).
    Signal(SignalMessage),

    /// A chat was created with the recipient as a member; sent to each
    /// member's user topic so they can mirror the chat and subscribe.
    ChatRegistered(ChatSync),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSync {
    pub chat: Chat,
    pub members: Vec<UserId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEdit {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub sender: UserId,
    pub new_body: String,
    pub edited_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDelete {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub sender: UserId,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReactionAction {
    Add,
    Remove,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionUpdate {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub sender: UserId,
    pub emoji: String,
    pub action: ReactionAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadReceiptNotice {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub reader: UserId,
    pub read_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypingNotice {
    pub chat_id: ChatId,
    pub sender: UserId,
    pub display_name: Option<String>,
    /// `false` means the sender stopped typing (sent a message or left).
    pub is_typing: bool,
}

/// Call signaling message addressed to exactly one peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalMessage {
    pub sender: UserId,
    pub target: UserId,
    pub chat_id: ChatId,
    pub payload: SignalPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SignalPayload {
    /// SDP offer. Carries caller identity so the callee can render the
    /// incoming-call screen without a profile lookup.
    Offer {
        sdp: String,
        call_type: CallType,
        caller_name: String,
        caller_avatar: Option<String>,
    },
    /// SDP answer
    Answer { sdp: String },
    /// ICE candidate (opaque to the signaling layer)
    IceCandidate(String),
    /// Call declined before connecting
    Reject { reason: RejectReason },
    /// Call ended (or abandoned before connecting)
    Hangup,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RejectReason {
    /// The callee declined the call.
    Declined,
    /// The callee already has a call in flight.
    Busy,
    /// The callee could not acquire media devices.
    Unavailable,
}

impl WireMessage {
    /// Serialize to binary (bincode)
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageContent;

    #[test]
    fn test_wire_message_roundtrip() {
        let msg = WireMessage::MessageNew(Message::new(
            ChatId::new(),
            UserId::new(),
            MessageContent::Text {
                body: "bonjour".into(),
            },
        ));

        let bytes = msg.to_bytes().unwrap();
        let restored = WireMessage::from_bytes(&bytes).unwrap();

        if let (WireMessage::MessageNew(orig), WireMessage::MessageNew(rest)) = (&msg, &restored) {
            assert_eq!(orig.id, rest.id);
            assert_eq!(orig.content, rest.content);
            assert_eq!(orig.created_at, rest.created_at);
        } else {
            panic!("Message type mismatch");
        }
    }

    #[test]
    fn test_signal_roundtrip() {
        let msg = WireMessage::Signal(SignalMessage {
            sender: UserId::new(),
            target: UserId::new(),
            chat_id: ChatId::new(),
            payload: SignalPayload::Offer {
                sdp: "v=0".into(),
                call_type: CallType::Video,
                caller_name: "Ana".into(),
                caller_avatar: None,
            },
        });

        let bytes = msg.to_bytes().unwrap();
        let restored = WireMessage::from_bytes(&bytes).unwrap();

        match restored {
            WireMessage::Signal(signal) => match signal.payload {
                SignalPayload::Offer { call_type, .. } => {
                    assert_eq!(call_type, CallType::Video);
                }
                other => panic!("Unexpected payload: {other:?}"),
            },
            other => panic!("Unexpected wire message: {other:?}"),
        }
    }
}
