use chrono::{DateTime, Utc};
use rusqlite::params;

use unitynets_shared::message::{Message, MessageContent};
use unitynets_shared::types::{ChatId, MessageId, UserId};

use crate::convert::{col_json, col_ts, col_uuid, to_sql_ts};
use crate::database::Database;
use crate::error::{Result, StoreError};

impl Database {
    /// Insert a message row. Duplicate ids are rejected by the primary key;
    /// callers receiving fan-out treat that as already-applied.
    pub fn insert_message(&self, message: &Message) -> Result<()> {
        self.conn().execute(
            "INSERT INTO messages
                 (id, chat_id, sender_id, kind, content, reply_to,
                  is_edited, is_deleted, is_forwarded, created_at, edited_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                message.id.to_string(),
                message.chat_id.to_string(),
                message.sender_id.to_string(),
                message.content.kind(),
                serde_json::to_string(&message.content)?,
                message.reply_to.map(|r| r.to_string()),
                message.is_edited,
                message.is_deleted,
                message.is_forwarded,
                to_sql_ts(&message.created_at),
                message.edited_at.as_ref().map(to_sql_ts),
            ],
        )?;
        Ok(())
    }

    /// Ordered history page for a chat.
    ///
    /// Messages are totally ordered by `(created_at, id)`: the insertion
    /// order reported by the store, never network arrival order.
    pub fn get_messages_for_chat(
        &self,
        chat_id: ChatId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, chat_id, sender_id, content, reply_to,
                    is_edited, is_deleted, is_forwarded, created_at, edited_at
             FROM messages
             WHERE chat_id = ?1
             ORDER BY created_at ASC, id ASC
             LIMIT ?2 OFFSET ?3",
        )?;

        let rows = stmt.query_map(params![chat_id.to_string(), limit, offset], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    pub fn get_message(&self, id: MessageId) -> Result<Message> {
        self.conn()
            .query_row(
                "SELECT id, chat_id, sender_id, content, reply_to,
                        is_edited, is_deleted, is_forwarded, created_at, edited_at
                 FROM messages WHERE id = ?1",
                params![id.to_string()],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Rewrite a text message's body.
    ///
    /// Only the original sender may edit, only text messages have an
    /// editable body, and the ordering key (`id`, `created_at`) is never
    /// touched. Returns the updated message.
    pub fn edit_message(
        &self,
        id: MessageId,
        editor: UserId,
        new_body: &str,
        edited_at: DateTime<Utc>,
    ) -> Result<Message> {
        let mut message = self.get_message(id)?;

        if message.sender_id != editor {
            return Err(StoreError::NotPermitted);
        }
        if message.is_deleted || !matches!(message.content, MessageContent::Text { .. }) {
            return Err(StoreError::NotPermitted);
        }

        message.content = MessageContent::Text {
            body: new_body.to_string(),
        };
        message.is_edited = true;
        message.edited_at = Some(edited_at);

        self.conn().execute(
            "UPDATE messages SET content = ?1, is_edited = 1, edited_at = ?2 WHERE id = ?3",
            params![
                serde_json::to_string(&message.content)?,
                to_sql_ts(&edited_at),
                id.to_string(),
            ],
        )?;

        Ok(message)
    }

    /// Soft-delete a message. Idempotent: deleting an already-deleted
    /// message is a no-op, not an error.
    pub fn soft_delete_message(&self, id: MessageId) -> Result<()> {
        let message = self.get_message(id)?;
        if message.is_deleted {
            return Ok(());
        }

        self.conn().execute(
            "UPDATE messages SET is_deleted = 1 WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(())
    }

    /// Case-insensitive text search across one chat (or all chats),
    /// newest first, capped at `limit` results.
    pub fn search_messages(
        &self,
        query: &str,
        chat_id: Option<ChatId>,
        limit: usize,
    ) -> Result<Vec<Message>> {
        let query_lower = query.to_lowercase();

        let mut stmt = self.conn().prepare(
            "SELECT id, chat_id, sender_id, content, reply_to,
                    is_edited, is_deleted, is_forwarded, created_at, edited_at
             FROM messages
             WHERE kind IN ('text', 'system')
               AND is_deleted = 0
               AND (?1 IS NULL OR chat_id = ?1)
             ORDER BY created_at DESC, id DESC",
        )?;

        let rows = stmt.query_map(
            params![chat_id.map(|c| c.to_string())],
            row_to_message,
        )?;

        let mut results = Vec::new();
        for row in rows {
            let message = row?;
            let matches = message
                .content
                .text_body()
                .is_some_and(|body| body.to_lowercase().contains(&query_lower));
            if matches {
                results.push(message);
                if results.len() >= limit {
                    break;
                }
            }
        }
        Ok(results)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id_str: String = row.get(0)?;
    let chat_id_str: String = row.get(1)?;
    let sender_str: String = row.get(2)?;
    let content_json: String = row.get(3)?;
    let reply_to_str: Option<String> = row.get(4)?;
    let is_edited: bool = row.get(5)?;
    let is_deleted: bool = row.get(6)?;
    let is_forwarded: bool = row.get(7)?;
    let created_str: String = row.get(8)?;
    let edited_str: Option<String> = row.get(9)?;

    let reply_to = match reply_to_str {
        Some(s) => Some(MessageId(col_uuid(4, &s)?)),
        None => None,
    };
    let edited_at = match edited_str {
        Some(s) => Some(col_ts(9, &s)?),
        None => None,
    };

    Ok(Message {
        id: MessageId(col_uuid(0, &id_str)?),
        chat_id: ChatId(col_uuid(1, &chat_id_str)?),
        sender_id: UserId(col_uuid(2, &sender_str)?),
        content: col_json::<MessageContent>(3, &content_json)?,
        reply_to,
        is_edited,
        is_deleted,
        is_forwarded,
        created_at: col_ts(8, &created_str)?,
        edited_at,
    })
}
