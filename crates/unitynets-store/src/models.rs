//! Domain model structs persisted in the local SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the UI layer. The message model itself lives in
//! `unitynets-shared` because the realtime fan-out carries it verbatim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use unitynets_shared::types::{ChatId, MessageId, PresenceStatus, UserId};

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// A known user profile, mirrored from the backend directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub user_id: UserId,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub status: PresenceStatus,
    /// When this profile was first seen / created locally.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Chat display
// ---------------------------------------------------------------------------

/// What a given viewer sees as the chat's name and avatar: the group record
/// for group chats, the other participant's profile for direct chats.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatDisplay {
    pub name: String,
    pub avatar_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Reaction
// ---------------------------------------------------------------------------

/// A single (message, user, emoji) reaction row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reaction {
    pub id: uuid::Uuid,
    pub message_id: MessageId,
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Read receipt
// ---------------------------------------------------------------------------

/// Record that a participant has read a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadReceipt {
    pub message_id: MessageId,
    pub user_id: UserId,
    pub read_at: DateTime<Utc>,
}
