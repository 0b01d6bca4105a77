//! Typing presence.
//!
//! Ephemeral per-chat map of who typed last and when. An entry expires once
//! the silence window passes with no further keystrokes; no explicit stop is
//! required, though sending a message clears it immediately. Nothing here is
//! persisted, and conflicting updates are last-writer-wins.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use unitynets_shared::protocol::{TypingNotice, WireMessage};
use unitynets_shared::types::{ChatId, UserId};

use crate::error::ClientError;
use crate::events::{TypingPayload, EVENT_TYPING_INDICATOR};
use crate::state::ClientSession;

pub struct TypingTracker {
    timeout: Duration,
    entries: HashMap<(ChatId, UserId), Instant>,
}

impl TypingTracker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            entries: HashMap::new(),
        }
    }

    /// Record a keystroke, resetting the user's expiry deadline.
    pub fn notify(&mut self, chat_id: ChatId, user: UserId, now: Instant) {
        self.entries.insert((chat_id, user), now);
    }

    /// Clear immediately (message sent, chat left).
    pub fn clear(&mut self, chat_id: ChatId, user: UserId) {
        self.entries.remove(&(chat_id, user));
    }

    /// Users whose deadline has not yet expired, for one chat.
    pub fn typing_in(&self, chat_id: ChatId, now: Instant) -> Vec<UserId> {
        self.entries
            .iter()
            .filter(|((chat, _), last)| {
                *chat == chat_id && now.saturating_duration_since(**last) < self.timeout
            })
            .map(|((_, user), _)| *user)
            .collect()
    }

    /// Drop expired entries so the map does not grow without bound.
    pub fn sweep(&mut self, now: Instant) {
        let timeout = self.timeout;
        self.entries
            .retain(|_, last| now.saturating_duration_since(*last) < timeout);
    }
}

impl ClientSession {
    /// Local keystroke: reset our own deadline and broadcast the notice on
    /// the chat topic.
    pub async fn notify_typing(&self, chat_id: ChatId) -> Result<(), ClientError> {
        let me = self.user_id();
        {
            let mut typing = self.typing_lock()?;
            typing.notify(chat_id, me, Instant::now());
        }

        let notice = WireMessage::Typing(TypingNotice {
            chat_id,
            sender: me,
            display_name: Some(self.display_name().to_string()),
            is_typing: true,
        });
        self.publish(chat_id.to_topic(), &notice).await
    }

    /// Explicit stop (send, navigation away).
    pub async fn stop_typing(&self, chat_id: ChatId) -> Result<(), ClientError> {
        let me = self.user_id();
        {
            let mut typing = self.typing_lock()?;
            typing.clear(chat_id, me);
        }

        let notice = WireMessage::Typing(TypingNotice {
            chat_id,
            sender: me,
            display_name: None,
            is_typing: false,
        });
        self.publish(chat_id.to_topic(), &notice).await
    }

    /// Who is currently typing in a chat (excluding expired entries).
    pub fn typing_users(&self, chat_id: ChatId) -> Vec<UserId> {
        let Ok(mut typing) = self.typing_lock() else {
            return Vec::new();
        };
        let now = Instant::now();
        typing.sweep(now);
        typing.typing_in(chat_id, now)
    }

    /// Apply a remote typing notice from the bridge.
    pub(crate) fn apply_typing_notice(&self, notice: &TypingNotice) -> Result<(), ClientError> {
        {
            let mut typing = self.typing_lock()?;
            if notice.is_typing {
                typing.notify(notice.chat_id, notice.sender, Instant::now());
            } else {
                typing.clear(notice.chat_id, notice.sender);
            }
        }

        self.emit(
            EVENT_TYPING_INDICATOR,
            TypingPayload {
                chat_id: notice.chat_id.to_string(),
                user_id: notice.sender.to_string(),
                display_name: notice.display_name.clone(),
                is_typing: notice.is_typing,
            },
        );
        Ok(())
    }
}
