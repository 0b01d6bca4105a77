//! Read receipts: which participants have read which messages.

use chrono::{DateTime, Utc};
use rusqlite::params;

use unitynets_shared::types::{ChatId, MessageId, UserId};

use crate::convert::{col_uuid, to_sql_ts};
use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Record that `user` read `message_id`. Returns `false` if the receipt
    /// already existed (marking read is idempotent).
    pub fn mark_read(
        &self,
        message_id: MessageId,
        user: UserId,
        read_at: DateTime<Utc>,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "INSERT OR IGNORE INTO message_reads (message_id, user_id, read_at)
             VALUES (?1, ?2, ?3)",
            params![
                message_id.to_string(),
                user.to_string(),
                to_sql_ts(&read_at)
            ],
        )?;
        Ok(affected > 0)
    }

    /// The set of users who have read a message.
    pub fn read_by(&self, message_id: MessageId) -> Result<Vec<UserId>> {
        let mut stmt = self.conn().prepare(
            "SELECT user_id FROM message_reads WHERE message_id = ?1 ORDER BY read_at ASC",
        )?;

        let rows = stmt.query_map(params![message_id.to_string()], |row| {
            let id_str: String = row.get(0)?;
            col_uuid(0, &id_str).map(UserId)
        })?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    /// How many messages in `chat_id` the user has neither sent nor read.
    pub fn unread_count(&self, chat_id: ChatId, user: UserId) -> Result<u32> {
        let count: u32 = self.conn().query_row(
            "SELECT COUNT(*) FROM messages m
             WHERE m.chat_id = ?1
               AND m.sender_id != ?2
               AND m.is_deleted = 0
               AND NOT EXISTS (SELECT 1 FROM message_reads r
                               WHERE r.message_id = m.id AND r.user_id = ?2)",
            params![chat_id.to_string(), user.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unitynets_shared::message::{Message, MessageContent};

    fn test_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (db, dir)
    }

    #[test]
    fn receipts_accumulate_and_dedupe() {
        let (db, _dir) = test_db();
        let (a, b) = (UserId::new(), UserId::new());
        let chat = db.create_direct_chat(a, b).unwrap();

        let message = Message::new(chat.id, a, MessageContent::Text { body: "hi".into() });
        db.insert_message(&message).unwrap();

        assert!(db.mark_read(message.id, b, Utc::now()).unwrap());
        assert!(!db.mark_read(message.id, b, Utc::now()).unwrap());
        assert_eq!(db.read_by(message.id).unwrap(), vec![b]);
    }

    #[test]
    fn unread_count_skips_own_and_read_messages() {
        let (db, _dir) = test_db();
        let (a, b) = (UserId::new(), UserId::new());
        let chat = db.create_direct_chat(a, b).unwrap();

        let mine = Message::new(chat.id, b, MessageContent::Text { body: "mine".into() });
        db.insert_message(&mine).unwrap();

        let m1 = Message::new(chat.id, a, MessageContent::Text { body: "one".into() });
        let m2 = Message::new(chat.id, a, MessageContent::Text { body: "two".into() });
        db.insert_message(&m1).unwrap();
        db.insert_message(&m2).unwrap();

        assert_eq!(db.unread_count(chat.id, b).unwrap(), 2);

        db.mark_read(m1.id, b, Utc::now()).unwrap();
        assert_eq!(db.unread_count(chat.id, b).unwrap(), 1);
    }
}
