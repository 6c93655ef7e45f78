//! Send queue persistence.
//!
//! Each row is one not-yet-confirmed outgoing message, keyed by its
//! device-local temp id and scoped to a conversation stream. The payload
//! is stored as a postcard blob so the row layout does not chase the
//! payload shape.

use chrono::DateTime;
use rusqlite::params;

use clubchat_proto::message::{
    ConversationKey, QueueEntry, QueueStatus, SendPayload, TempId,
};

use crate::database::Database;
use crate::error::{Result, StoreError};

impl Database {
    /// Insert (or overwrite) a queue entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Codec`] if the payload cannot be encoded, or
    /// a SQLite error on write failure.
    pub fn add_queue_entry(&self, entry: &QueueEntry) -> Result<()> {
        let payload = postcard::to_allocvec(&entry.payload)
            .map_err(|e| StoreError::Codec(e.to_string()))?;
        self.conn().execute(
            "INSERT OR REPLACE INTO send_queue
                 (temp_id, kind, conversation_id, channel, payload, created_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.temp_id.as_str(),
                entry.conversation.kind.as_str(),
                entry.conversation.id.as_str(),
                entry.conversation.channel.as_str(),
                payload,
                entry.created_at.to_rfc3339(),
                entry.status.as_str(),
            ],
        )?;
        Ok(())
    }

    /// Remove a queue entry, returning whether a row was deleted.
    ///
    /// The conversation key is part of the predicate so one conversation
    /// can never delete another's rows.
    ///
    /// # Errors
    ///
    /// Returns a SQLite error on write failure.
    pub fn remove_queue_entry(
        &self,
        temp_id: &TempId,
        conversation: &ConversationKey,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM send_queue
             WHERE temp_id = ?1 AND kind = ?2 AND conversation_id = ?3 AND channel = ?4",
            params![
                temp_id.as_str(),
                conversation.kind.as_str(),
                conversation.id.as_str(),
                conversation.channel.as_str(),
            ],
        )?;
        Ok(affected > 0)
    }

    /// Update the status of a queue entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no such entry exists, or a
    /// SQLite error on write failure.
    pub fn update_queue_status(
        &self,
        temp_id: &TempId,
        conversation: &ConversationKey,
        status: QueueStatus,
    ) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE send_queue SET status = ?1
             WHERE temp_id = ?2 AND kind = ?3 AND conversation_id = ?4 AND channel = ?5",
            params![
                status.as_str(),
                temp_id.as_str(),
                conversation.kind.as_str(),
                conversation.id.as_str(),
                conversation.channel.as_str(),
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Load all queue entries for one conversation stream, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a SQLite error on read failure, or [`StoreError::Codec`] /
    /// [`StoreError::Label`] if a stored row no longer decodes.
    pub fn load_queue(&self, conversation: &ConversationKey) -> Result<Vec<QueueEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT temp_id, payload, created_at, status FROM send_queue
             WHERE kind = ?1 AND conversation_id = ?2 AND channel = ?3
             ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(
            params![
                conversation.kind.as_str(),
                conversation.id.as_str(),
                conversation.channel.as_str(),
            ],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Vec<u8>>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )?;

        let mut entries = Vec::new();
        for row in rows {
            let (temp_id, payload, created_at, status) = row?;
            let payload: SendPayload = postcard::from_bytes(&payload)
                .map_err(|e| StoreError::Codec(e.to_string()))?;
            entries.push(QueueEntry {
                temp_id: TempId::new(temp_id),
                conversation: conversation.clone(),
                payload,
                created_at: DateTime::parse_from_rfc3339(&created_at)?.to_utc(),
                status: status.parse()?,
            });
        }
        Ok(entries)
    }
}
