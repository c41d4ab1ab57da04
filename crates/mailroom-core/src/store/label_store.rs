use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::Result;
use crate::models::{LabelRecord, LabelUpsert};
use crate::store::Database;

/// Durable (message id, label) pairs with the id of the asserting event.
///
/// `label_event_id` is indexed so deletion requests resolve without a scan.
#[derive(Clone)]
pub struct LabelStore {
    db: Database,
}

fn row_to_label(row: &Row<'_>) -> rusqlite::Result<LabelRecord> {
    Ok(LabelRecord {
        message_id: row.get(0)?,
        label: row.get(1)?,
        label_event_id: row.get(2)?,
    })
}

fn upsert_in(
    conn: &Connection,
    message_id: &str,
    label: &str,
    label_event_id: &str,
) -> rusqlite::Result<LabelUpsert> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT label_event_id FROM labels WHERE message_id = ?1 AND label = ?2",
            params![message_id, label],
            |row| row.get(0),
        )
        .optional()?;

    match existing {
        None => {
            conn.execute(
                "INSERT INTO labels (message_id, label, label_event_id) VALUES (?1, ?2, ?3)",
                params![message_id, label, label_event_id],
            )?;
            Ok(LabelUpsert::Inserted)
        }
        Some(previous) if previous == label_event_id => Ok(LabelUpsert::Unchanged),
        Some(previous) => {
            conn.execute(
                "UPDATE labels SET label_event_id = ?3 WHERE message_id = ?1 AND label = ?2",
                params![message_id, label, label_event_id],
            )?;
            Ok(LabelUpsert::Replaced {
                previous_event_id: previous,
            })
        }
    }
}

fn is_retracted_in(conn: &Connection, label_event_id: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM label_tombstones WHERE label_event_id = ?1",
        params![label_event_id],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
}

fn retract_in(conn: &Connection, label_event_id: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO label_tombstones (label_event_id) VALUES (?1)",
        params![label_event_id],
    )?;
    Ok(())
}

impl LabelStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert or overwrite the asserting event for a pair (last seen wins).
    ///
    /// Used for locally created assertions, so the event id is live again
    /// even if an identical event was retracted before.
    pub fn upsert(&self, message_id: &str, label: &str, label_event_id: &str) -> Result<LabelUpsert> {
        self.db.with_transaction(|tx| {
            tx.execute(
                "DELETE FROM label_tombstones WHERE label_event_id = ?1",
                params![label_event_id],
            )?;
            upsert_in(tx, message_id, label, label_event_id)
        })
    }

    /// Upsert for an assertion seen on the network. Events that were already
    /// retracted are ignored, whichever stream delivered them first.
    pub fn apply_remote(
        &self,
        message_id: &str,
        label: &str,
        label_event_id: &str,
    ) -> Result<LabelUpsert> {
        self.db.with_transaction(|tx| {
            if is_retracted_in(tx, label_event_id)? {
                return Ok(LabelUpsert::Retracted);
            }
            upsert_in(tx, message_id, label, label_event_id)
        })
    }

    pub fn is_retracted(&self, label_event_id: &str) -> Result<bool> {
        self.db.with_conn(|conn| is_retracted_in(conn, label_event_id))
    }

    pub fn get(&self, message_id: &str, label: &str) -> Result<Option<LabelRecord>> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT message_id, label, label_event_id FROM labels
                 WHERE message_id = ?1 AND label = ?2",
                params![message_id, label],
                row_to_label,
            )
            .optional()
        })
    }

    pub fn contains(&self, message_id: &str, label: &str) -> Result<bool> {
        Ok(self.get(message_id, label)?.is_some())
    }

    /// Label names on a message, sorted
    pub fn labels_for(&self, message_id: &str) -> Result<Vec<String>> {
        self.db.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT label FROM labels WHERE message_id = ?1 ORDER BY label")?;
            let rows = stmt.query_map(params![message_id], |row| row.get(0))?;
            rows.collect()
        })
    }

    /// Records asserted by `label_event_id` (index lookup)
    pub fn find_by_event(&self, label_event_id: &str) -> Result<Vec<LabelRecord>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT message_id, label, label_event_id FROM labels WHERE label_event_id = ?1",
            )?;
            let rows = stmt.query_map(params![label_event_id], row_to_label)?;
            rows.collect()
        })
    }

    /// Remove one pair, returning what was removed
    pub fn remove(&self, message_id: &str, label: &str) -> Result<Option<LabelRecord>> {
        self.db.with_transaction(|tx| {
            let existing = tx
                .query_row(
                    "SELECT message_id, label, label_event_id FROM labels
                     WHERE message_id = ?1 AND label = ?2",
                    params![message_id, label],
                    row_to_label,
                )
                .optional()?;
            if let Some(ref record) = existing {
                tx.execute(
                    "DELETE FROM labels WHERE message_id = ?1 AND label = ?2",
                    params![message_id, label],
                )?;
                retract_in(tx, &record.label_event_id)?;
            }
            Ok(existing)
        })
    }

    /// Remove every pair asserted by `label_event_id` and retract the event
    pub fn remove_by_event(&self, label_event_id: &str) -> Result<Vec<LabelRecord>> {
        self.db.with_transaction(|tx| {
            let removed = {
                let mut stmt = tx.prepare(
                    "SELECT message_id, label, label_event_id FROM labels WHERE label_event_id = ?1",
                )?;
                let rows = stmt.query_map(params![label_event_id], row_to_label)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };
            if !removed.is_empty() {
                tx.execute(
                    "DELETE FROM labels WHERE label_event_id = ?1",
                    params![label_event_id],
                )?;
            }
            // Also covers a deletion that arrives before its assertion
            retract_in(tx, label_event_id)?;
            Ok(removed)
        })
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .db
            .with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM labels", [], |r| r.get(0)))?;
        Ok(count as usize)
    }
}
