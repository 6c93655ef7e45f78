//! Per-conversation last-read marker.
//!
//! Stores the newest message id the client has seen for each stream.
//! After the live socket drops (backgrounded app, flaky network), the
//! engine sends this id to the server to request everything newer.

use rusqlite::{OptionalExtension, params};

use clubchat_proto::message::{ConversationKey, MessageId};

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Record the newest seen message for a stream.
    ///
    /// # Errors
    ///
    /// Returns a SQLite error on write failure.
    pub fn set_last_read(
        &self,
        conversation: &ConversationKey,
        message_id: &MessageId,
    ) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO read_markers (kind, conversation_id, channel, message_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                conversation.kind.as_str(),
                conversation.id.as_str(),
                conversation.channel.as_str(),
                message_id.as_str(),
            ],
        )?;
        Ok(())
    }

    /// Fetch the newest seen message for a stream, if any.
    ///
    /// # Errors
    ///
    /// Returns a SQLite error on read failure.
    pub fn last_read(&self, conversation: &ConversationKey) -> Result<Option<MessageId>> {
        let id: Option<String> = self
            .conn()
            .query_row(
                "SELECT message_id FROM read_markers
                 WHERE kind = ?1 AND conversation_id = ?2 AND channel = ?3",
                params![
                    conversation.kind.as_str(),
                    conversation.id.as_str(),
                    conversation.channel.as_str(),
                ],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id.map(MessageId::new))
    }
}
