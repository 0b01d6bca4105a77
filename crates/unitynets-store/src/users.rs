//! Profile records mirrored from the backend directory.

use rusqlite::params;

use unitynets_shared::types::{PresenceStatus, UserId};

use crate::convert::{col_ts, col_uuid, to_sql_ts};
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Profile;

impl Database {
    /// Insert or refresh a profile.
    pub fn upsert_profile(&self, profile: &Profile) -> Result<()> {
        self.conn().execute(
            "INSERT INTO profiles (user_id, display_name, avatar_url, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id) DO UPDATE SET
                 display_name = excluded.display_name,
                 avatar_url = excluded.avatar_url,
                 status = excluded.status",
            params![
                profile.user_id.to_string(),
                profile.display_name,
                profile.avatar_url,
                profile.status.as_str(),
                to_sql_ts(&profile.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_profile(&self, user: UserId) -> Result<Profile> {
        self.conn()
            .query_row(
                "SELECT user_id, display_name, avatar_url, status, created_at
                 FROM profiles WHERE user_id = ?1",
                params![user.to_string()],
                row_to_profile,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Update presence status (online, idle, dnd, invisible).
    pub fn set_user_status(&self, user: UserId, status: PresenceStatus) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE profiles SET status = ?1 WHERE user_id = ?2",
            params![status.as_str(), user.to_string()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<Profile> {
    let id_str: String = row.get(0)?;
    let display_name: String = row.get(1)?;
    let avatar_url: Option<String> = row.get(2)?;
    let status_str: String = row.get(3)?;
    let created_str: String = row.get(4)?;

    let status = PresenceStatus::parse(&status_str).unwrap_or(PresenceStatus::Online);

    Ok(Profile {
        user_id: UserId(col_uuid(0, &id_str)?),
        display_name,
        avatar_url,
        status,
        created_at: col_ts(4, &created_str)?,
    })
}
