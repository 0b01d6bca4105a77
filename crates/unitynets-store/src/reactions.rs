use std::collections::HashMap;

use chrono::Utc;
use rusqlite::params;
use uuid::Uuid;

use unitynets_shared::protocol::ReactionAction;
use unitynets_shared::types::{ChatId, MessageId, UserId};

use crate::convert::{col_ts, col_uuid, to_sql_ts};
use crate::database::Database;
use crate::error::Result;
use crate::models::Reaction;

impl Database {
    /// Record a reaction. Returns `false` if the (message, user, emoji)
    /// triple was already present.
    pub fn add_reaction(
        &self,
        message_id: MessageId,
        chat_id: ChatId,
        user: UserId,
        emoji: &str,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "INSERT OR IGNORE INTO reactions (id, message_id, chat_id, user_id, emoji, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                Uuid::new_v4().to_string(),
                message_id.to_string(),
                chat_id.to_string(),
                user.to_string(),
                emoji,
                to_sql_ts(&Utc::now()),
            ],
        )?;
        Ok(affected > 0)
    }

    /// Remove a reaction. Returns `false` if it was not present.
    pub fn remove_reaction(&self, message_id: MessageId, user: UserId, emoji: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM reactions WHERE message_id = ?1 AND user_id = ?2 AND emoji = ?3",
            params![message_id.to_string(), user.to_string(), emoji],
        )?;
        Ok(affected > 0)
    }

    /// Toggle the caller's reaction: present → removed, absent → added.
    /// Returns the action that was applied.
    pub fn toggle_reaction(
        &self,
        message_id: MessageId,
        chat_id: ChatId,
        user: UserId,
        emoji: &str,
    ) -> Result<ReactionAction> {
        if self.remove_reaction(message_id, user, emoji)? {
            Ok(ReactionAction::Remove)
        } else {
            self.add_reaction(message_id, chat_id, user, emoji)?;
            Ok(ReactionAction::Add)
        }
    }

    pub fn reactions_for_message(&self, message_id: MessageId) -> Result<Vec<Reaction>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, message_id, chat_id, user_id, emoji, created_at
             FROM reactions WHERE message_id = ?1 ORDER BY created_at ASC",
        )?;

        let rows = stmt.query_map(params![message_id.to_string()], |row| {
            let id_str: String = row.get(0)?;
            let msg_id_str: String = row.get(1)?;
            let chat_id_str: String = row.get(2)?;
            let user_str: String = row.get(3)?;
            let emoji: String = row.get(4)?;
            let ts_str: String = row.get(5)?;

            Ok(Reaction {
                id: col_uuid(0, &id_str)?,
                message_id: MessageId(col_uuid(1, &msg_id_str)?),
                chat_id: ChatId(col_uuid(2, &chat_id_str)?),
                user_id: UserId(col_uuid(3, &user_str)?),
                emoji,
                created_at: col_ts(5, &ts_str)?,
            })
        })?;

        let mut reactions = Vec::new();
        for row in rows {
            reactions.push(row?);
        }
        Ok(reactions)
    }

    /// Reactions grouped as the UI renders them: emoji → set of user ids.
    pub fn reactions_grouped(&self, message_id: MessageId) -> Result<HashMap<String, Vec<UserId>>> {
        let mut map: HashMap<String, Vec<UserId>> = HashMap::new();
        for reaction in self.reactions_for_message(message_id)? {
            map.entry(reaction.emoji).or_default().push(reaction.user_id);
        }
        Ok(map)
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

    fn seeded_message(db: &Database) -> (ChatId, MessageId, UserId) {
        let (a, b) = (UserId::new(), UserId::new());
        let chat = db.create_direct_chat(a, b).unwrap();
        let message = Message::new(
            chat.id,
            a,
            MessageContent::Text {
                body: "react to me".into(),
            },
        );
        db.insert_message(&message).unwrap();
        (chat.id, message.id, b)
    }

    #[test]
    fn toggle_twice_is_identity() {
        let (db, _dir) = test_db();
        let (chat, message, user) = seeded_message(&db);

        let before = db.reactions_grouped(message).unwrap();
        assert!(before.is_empty());

        assert_eq!(
            db.toggle_reaction(message, chat, user, "🔥").unwrap(),
            ReactionAction::Add
        );
        assert_eq!(
            db.toggle_reaction(message, chat, user, "🔥").unwrap(),
            ReactionAction::Remove
        );

        let after = db.reactions_grouped(message).unwrap();
        assert_eq!(after, before);
    }

    #[test]
    fn duplicate_add_is_ignored() {
        let (db, _dir) = test_db();
        let (chat, message, user) = seeded_message(&db);

        assert!(db.add_reaction(message, chat, user, "👍").unwrap());
        assert!(!db.add_reaction(message, chat, user, "👍").unwrap());
        assert_eq!(db.reactions_for_message(message).unwrap().len(), 1);
    }

    #[test]
    fn grouping_collects_users_per_emoji() {
        let (db, _dir) = test_db();
        let (chat, message, user) = seeded_message(&db);
        let other = UserId::new();

        db.add_reaction(message, chat, user, "🔥").unwrap();
        db.add_reaction(message, chat, other, "🔥").unwrap();
        db.add_reaction(message, chat, user, "👍").unwrap();

        let grouped = db.reactions_grouped(message).unwrap();
        assert_eq!(grouped["🔥"].len(), 2);
        assert_eq!(grouped["👍"], vec![user]);
    }
}
