//! CRUD operations for [`Chat`] records and participant sets.

use chrono::Utc;
use rusqlite::params;

use unitynets_shared::constants::MAX_GROUP_PARTICIPANTS;
use unitynets_shared::types::{ChatId, ChatKind, UserId};

use unitynets_shared::types::Chat;

use crate::convert::{col_ts, col_uuid, to_sql_ts};
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::ChatDisplay;

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Create a direct chat between exactly two users.
    ///
    /// Returns the existing chat if one already exists for the pair; direct
    /// chats come into existence on first message, so callers treat this as
    /// find-or-create.
    pub fn create_direct_chat(&self, a: UserId, b: UserId) -> Result<Chat> {
        if a == b {
            return Err(StoreError::InvalidArgument(
                "direct chat requires two distinct participants".into(),
            ));
        }

        if let Some(existing) = self.find_direct_chat(a, b)? {
            return Ok(existing);
        }

        let chat = Chat {
            id: ChatId::new(),
            kind: ChatKind::Direct,
            name: None,
            avatar_url: None,
            created_at: Utc::now(),
        };

        self.insert_chat(&chat, &[a, b])?;
        Ok(chat)
    }

    /// Create a group chat with the given display name and initial members.
    pub fn create_group_chat(
        &self,
        name: &str,
        avatar_url: Option<&str>,
        members: &[UserId],
    ) -> Result<Chat> {
        if name.trim().is_empty() {
            return Err(StoreError::InvalidArgument("group name is empty".into()));
        }
        if members.is_empty() || members.len() > MAX_GROUP_PARTICIPANTS {
            return Err(StoreError::InvalidArgument(format!(
                "group must have 1..={MAX_GROUP_PARTICIPANTS} members, got {}",
                members.len()
            )));
        }

        let chat = Chat {
            id: ChatId::new(),
            kind: ChatKind::Group,
            name: Some(name.to_string()),
            avatar_url: avatar_url.map(str::to_string),
            created_at: Utc::now(),
        };

        self.insert_chat(&chat, members)?;
        Ok(chat)
    }

    /// Mirror a chat announced by the backend (or another member). Safe to
    /// call repeatedly; existing rows are left untouched.
    pub fn upsert_chat(&self, chat: &Chat, members: &[UserId]) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO chats (id, kind, name, avatar_url, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                chat.id.to_string(),
                chat.kind.as_str(),
                chat.name,
                chat.avatar_url,
                to_sql_ts(&chat.created_at),
            ],
        )?;

        let joined = to_sql_ts(&chat.created_at);
        for member in members {
            self.conn().execute(
                "INSERT OR IGNORE INTO chat_participants (chat_id, user_id, joined_at)
                 VALUES (?1, ?2, ?3)",
                params![chat.id.to_string(), member.to_string(), joined],
            )?;
        }
        Ok(())
    }

    fn insert_chat(&self, chat: &Chat, members: &[UserId]) -> Result<()> {
        self.conn().execute(
            "INSERT INTO chats (id, kind, name, avatar_url, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                chat.id.to_string(),
                chat.kind.as_str(),
                chat.name,
                chat.avatar_url,
                to_sql_ts(&chat.created_at),
            ],
        )?;

        let joined = to_sql_ts(&chat.created_at);
        for member in members {
            self.conn().execute(
                "INSERT OR IGNORE INTO chat_participants (chat_id, user_id, joined_at)
                 VALUES (?1, ?2, ?3)",
                params![chat.id.to_string(), member.to_string(), joined],
            )?;
        }

        tracing::debug!(chat = %chat.id, kind = chat.kind.as_str(), members = members.len(), "chat created");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single chat by id.
    pub fn get_chat(&self, id: ChatId) -> Result<Chat> {
        self.conn()
            .query_row(
                "SELECT id, kind, name, avatar_url, created_at
                 FROM chats
                 WHERE id = ?1",
                params![id.to_string()],
                row_to_chat,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Find the direct chat containing both users, if any.
    pub fn find_direct_chat(&self, a: UserId, b: UserId) -> Result<Option<Chat>> {
        let result = self.conn().query_row(
            "SELECT c.id, c.kind, c.name, c.avatar_url, c.created_at
             FROM chats c
             WHERE c.kind = 'direct'
               AND EXISTS (SELECT 1 FROM chat_participants p
                           WHERE p.chat_id = c.id AND p.user_id = ?1)
               AND EXISTS (SELECT 1 FROM chat_participants p
                           WHERE p.chat_id = c.id AND p.user_id = ?2)
             LIMIT 1",
            params![a.to_string(), b.to_string()],
            row_to_chat,
        );

        match result {
            Ok(chat) => Ok(Some(chat)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Sqlite(e)),
        }
    }

    /// List the chats a user participates in, most recently active first
    /// (falling back to creation time for chats with no messages yet).
    pub fn list_chats_for_user(&self, user: UserId) -> Result<Vec<Chat>> {
        let mut stmt = self.conn().prepare(
            "SELECT c.id, c.kind, c.name, c.avatar_url, c.created_at
             FROM chats c
             JOIN chat_participants p ON p.chat_id = c.id
             WHERE p.user_id = ?1
             ORDER BY COALESCE(
                 (SELECT MAX(m.created_at) FROM messages m WHERE m.chat_id = c.id),
                 c.created_at
             ) DESC",
        )?;

        let rows = stmt.query_map(params![user.to_string()], row_to_chat)?;

        let mut chats = Vec::new();
        for row in rows {
            chats.push(row?);
        }
        Ok(chats)
    }

    /// Participant ids of a chat, in join order.
    pub fn participants(&self, chat_id: ChatId) -> Result<Vec<UserId>> {
        let mut stmt = self.conn().prepare(
            "SELECT user_id FROM chat_participants
             WHERE chat_id = ?1
             ORDER BY joined_at ASC, user_id ASC",
        )?;

        let rows = stmt.query_map(params![chat_id.to_string()], |row| {
            let id_str: String = row.get(0)?;
            col_uuid(0, &id_str).map(UserId)
        })?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    pub fn is_participant(&self, chat_id: ChatId, user: UserId) -> Result<bool> {
        let count: u32 = self.conn().query_row(
            "SELECT COUNT(*) FROM chat_participants WHERE chat_id = ?1 AND user_id = ?2",
            params![chat_id.to_string(), user.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Resolve the chat's display name and avatar for a given viewer: the
    /// group record for group chats, the other participant's profile for
    /// direct chats.
    pub fn display_for(&self, chat_id: ChatId, viewer: UserId) -> Result<ChatDisplay> {
        let chat = self.get_chat(chat_id)?;

        match chat.kind {
            ChatKind::Group => Ok(ChatDisplay {
                name: chat.name.unwrap_or_else(|| "Group".to_string()),
                avatar_url: chat.avatar_url,
            }),
            ChatKind::Direct => {
                let peer = self
                    .participants(chat_id)?
                    .into_iter()
                    .find(|p| *p != viewer)
                    .ok_or(StoreError::NotFound)?;

                match self.get_profile(peer) {
                    Ok(profile) => Ok(ChatDisplay {
                        name: profile.display_name,
                        avatar_url: profile.avatar_url,
                    }),
                    // Peer not yet in the local directory: fall back to a
                    // truncated id so the chat still renders.
                    Err(StoreError::NotFound) => Ok(ChatDisplay {
                        name: peer.short(),
                        avatar_url: None,
                    }),
                    Err(e) => Err(e),
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Chat`].
fn row_to_chat(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chat> {
    let id_str: String = row.get(0)?;
    let kind_str: String = row.get(1)?;
    let name: Option<String> = row.get(2)?;
    let avatar_url: Option<String> = row.get(3)?;
    let created_str: String = row.get(4)?;

    let id = ChatId(col_uuid(0, &id_str)?);
    let kind = ChatKind::parse(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            format!("unknown chat kind: {kind_str}").into(),
        )
    })?;
    let created_at = col_ts(4, &created_str)?;

    Ok(Chat {
        id,
        kind,
        name,
        avatar_url,
        created_at,
    })
}
