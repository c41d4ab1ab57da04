use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::constants::labels;
use crate::error::Result;
use crate::models::Message;
use crate::store::Database;

const MESSAGE_COLUMNS: &str =
    "m.id, m.sender, m.recipient, m.subject, m.body_text, m.raw_body, m.created_at";

/// Durable record of decoded messages, keyed by message id.
#[derive(Clone)]
pub struct MailboxStore {
    db: Database,
}

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        sender: row.get(1)?,
        recipient: row.get(2)?,
        subject: row.get(3)?,
        body_text: row.get(4)?,
        raw_body: row.get(5)?,
        created_at: row.get::<_, i64>(6)? as u64,
    })
}

impl MailboxStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Idempotent upsert keyed by id
    pub fn save(&self, message: &Message) -> Result<()> {
        self.db.with_conn(|conn| upsert_message(conn, message))?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<Message>> {
        self.db.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM messages m WHERE m.id = ?1", MESSAGE_COLUMNS),
                params![id],
                row_to_message,
            )
            .optional()
        })
    }

    pub fn contains(&self, id: &str) -> Result<bool> {
        let found = self.db.with_conn(|conn| {
            conn.query_row("SELECT 1 FROM messages WHERE id = ?1", params![id], |_| {
                Ok(())
            })
            .optional()
        })?;
        Ok(found.is_some())
    }

    pub fn remove(&self, id: &str) -> Result<bool> {
        let removed = self
            .db
            .with_conn(|conn| conn.execute("DELETE FROM messages WHERE id = ?1", params![id]))?;
        Ok(removed > 0)
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .db
            .with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0)))?;
        Ok(count as usize)
    }

    // ===== Queries (newest first) =====

    pub fn all(&self, limit: Option<usize>) -> Result<Vec<Message>> {
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        self.query(
            &format!(
                "SELECT {} FROM messages m ORDER BY m.created_at DESC LIMIT ?1",
                MESSAGE_COLUMNS
            ),
            params![limit],
        )
    }

    pub fn by_sender(&self, sender: &str) -> Result<Vec<Message>> {
        self.query(
            &format!(
                "SELECT {} FROM messages m WHERE m.sender = ?1 ORDER BY m.created_at DESC",
                MESSAGE_COLUMNS
            ),
            params![sender],
        )
    }

    pub fn by_recipient(&self, recipient: &str) -> Result<Vec<Message>> {
        self.query(
            &format!(
                "SELECT {} FROM messages m WHERE m.recipient = ?1 ORDER BY m.created_at DESC",
                MESSAGE_COLUMNS
            ),
            params![recipient],
        )
    }

    /// Messages with `since <= created_at <= until`
    pub fn between(&self, since: u64, until: u64) -> Result<Vec<Message>> {
        self.query(
            &format!(
                "SELECT {} FROM messages m WHERE m.created_at >= ?1 AND m.created_at <= ?2
                 ORDER BY m.created_at DESC",
                MESSAGE_COLUMNS
            ),
            params![since as i64, until.min(i64::MAX as u64) as i64],
        )
    }

    pub fn with_label(&self, label: &str) -> Result<Vec<Message>> {
        self.query(
            &format!(
                "SELECT {} FROM messages m JOIN labels l ON l.message_id = m.id
                 WHERE l.label = ?1 ORDER BY m.created_at DESC",
                MESSAGE_COLUMNS
            ),
            params![label],
        )
    }

    /// `inbox` is every message without a folder label; any other name
    /// selects messages labelled `folder:<name>`.
    pub fn in_folder(&self, folder: &str) -> Result<Vec<Message>> {
        if folder == labels::INBOX {
            let pattern = format!("{}%", labels::FOLDER_PREFIX);
            return self.query(
                &format!(
                    "SELECT {} FROM messages m WHERE NOT EXISTS (
                        SELECT 1 FROM labels l WHERE l.message_id = m.id AND l.label LIKE ?1
                     ) ORDER BY m.created_at DESC",
                    MESSAGE_COLUMNS
                ),
                params![pattern],
            );
        }
        self.with_label(&labels::folder(folder))
    }

    /// Messages without the read label
    pub fn unread_count(&self) -> Result<usize> {
        let count: i64 = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM messages m WHERE NOT EXISTS (
                    SELECT 1 FROM labels l WHERE l.message_id = m.id AND l.label = ?1
                 )",
                params![labels::READ],
                |r| r.get(0),
            )
        })?;
        Ok(count as usize)
    }

    fn query(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Message>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(params, row_to_message)?;
            rows.collect()
        })
    }
}

pub(crate) fn upsert_message(conn: &Connection, message: &Message) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT OR REPLACE INTO messages
         (id, sender, recipient, subject, body_text, raw_body, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            message.id,
            message.sender,
            message.recipient,
            message.subject,
            message.body_text,
            message.raw_body,
            message.created_at as i64
        ],
    )
}
