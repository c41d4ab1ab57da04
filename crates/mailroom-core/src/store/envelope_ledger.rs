use nostr_sdk::Timestamp;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::models::{EnvelopeRecord, ProcessingState};
use crate::store::Database;

/// Durable record of every envelope seen, keyed by envelope id.
///
/// `record_if_new` is the single dedup gate for ingestion.
#[derive(Clone)]
pub struct EnvelopeLedger {
    db: Database,
}

impl EnvelopeLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Atomic check-and-insert. Returns false, without touching the row, if
    /// `id` is already known in either state.
    pub fn record_if_new(&self, id: &str, recipient: Option<&str>, raw: &str) -> Result<bool> {
        let now = Timestamp::now().as_u64() as i64;
        let inserted = self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO envelopes (id, state, recipient, raw, first_seen)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, ProcessingState::Unprocessed.as_str(), recipient, raw, now],
            )
        })?;
        Ok(inserted == 1)
    }

    /// Idempotent; unknown or already processed ids are left alone.
    /// The raw envelope is dropped once processed.
    pub fn mark_processed(&self, id: &str) -> Result<()> {
        self.db.with_conn(|conn| mark_processed_in(conn, id))?;
        Ok(())
    }

    /// Raw envelope JSON, only while the envelope is unprocessed.
    pub fn get_unprocessed(&self, id: &str) -> Result<Option<String>> {
        let raw = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT raw FROM envelopes WHERE id = ?1 AND state = ?2",
                params![id, ProcessingState::Unprocessed.as_str()],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()
        })?;
        Ok(raw.flatten())
    }

    /// Unprocessed envelopes in the order they were first seen.
    pub fn list_unprocessed(&self, limit: Option<usize>) -> Result<Vec<String>> {
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT raw FROM envelopes WHERE state = ?1 AND raw IS NOT NULL
                 ORDER BY first_seen, rowid LIMIT ?2",
            )?;
            let rows = stmt.query_map(
                params![ProcessingState::Unprocessed.as_str(), limit],
                |row| row.get::<_, String>(0),
            )?;
            rows.collect()
        })
    }

    pub fn count_unprocessed(&self) -> Result<usize> {
        self.count_in_state(ProcessingState::Unprocessed)
    }

    pub fn count_in_state(&self, state: ProcessingState) -> Result<usize> {
        let count: i64 = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM envelopes WHERE state = ?1",
                params![state.as_str()],
                |row| row.get(0),
            )
        })?;
        Ok(count as usize)
    }

    pub fn get(&self, id: &str) -> Result<Option<EnvelopeRecord>> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT id, state, recipient, first_seen FROM envelopes WHERE id = ?1",
                params![id],
                |row| {
                    let state: String = row.get(1)?;
                    Ok(EnvelopeRecord {
                        id: row.get(0)?,
                        state: ProcessingState::parse(&state)
                            .unwrap_or(ProcessingState::Unprocessed),
                        recipient: row.get(2)?,
                        first_seen: row.get::<_, i64>(3)? as u64,
                    })
                },
            )
            .optional()
        })
    }

    pub fn remove(&self, id: &str) -> Result<bool> {
        let removed = self
            .db
            .with_conn(|conn| conn.execute("DELETE FROM envelopes WHERE id = ?1", params![id]))?;
        Ok(removed > 0)
    }
}

pub(crate) fn mark_processed_in(conn: &Connection, id: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE envelopes SET state = ?2, raw = NULL WHERE id = ?1 AND state = ?3",
        params![
            id,
            ProcessingState::Processed.as_str(),
            ProcessingState::Unprocessed.as_str()
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn ledger() -> EnvelopeLedger {
        EnvelopeLedger::new(Database::open_in_memory().unwrap())
    }

    #[test]
    fn test_record_if_new_only_once() {
        let ledger = ledger();
        assert!(ledger.record_if_new("a", Some("me"), "{}").unwrap());
        assert!(!ledger.record_if_new("a", Some("me"), "{\"other\":1}").unwrap());
        assert_eq!(ledger.get_unprocessed("a").unwrap().as_deref(), Some("{}"));
    }

    #[test]
    fn test_record_if_new_false_after_processed() {
        let ledger = ledger();
        ledger.record_if_new("a", None, "{}").unwrap();
        ledger.mark_processed("a").unwrap();
        assert!(!ledger.record_if_new("a", None, "{}").unwrap());
        assert_eq!(
            ledger.get("a").unwrap().unwrap().state,
            ProcessingState::Processed
        );
    }

    #[test]
    fn test_mark_processed_is_monotonic_and_drops_raw() {
        let ledger = ledger();
        ledger.record_if_new("a", None, "{}").unwrap();
        ledger.mark_processed("a").unwrap();
        ledger.mark_processed("a").unwrap();
        ledger.mark_processed("unknown").unwrap();

        assert_eq!(ledger.get_unprocessed("a").unwrap(), None);
        assert_eq!(ledger.count_unprocessed().unwrap(), 0);
        assert_eq!(ledger.count_in_state(ProcessingState::Processed).unwrap(), 1);
        assert!(ledger.get("unknown").unwrap().is_none());
    }

    #[test]
    fn test_list_unprocessed_respects_limit_and_order() {
        let ledger = ledger();
        for id in ["a", "b", "c"] {
            ledger.record_if_new(id, None, id).unwrap();
        }
        ledger.mark_processed("b").unwrap();

        assert_eq!(ledger.list_unprocessed(None).unwrap(), vec!["a", "c"]);
        assert_eq!(ledger.list_unprocessed(Some(1)).unwrap(), vec!["a"]);
        assert_eq!(ledger.count_unprocessed().unwrap(), 2);
    }

    #[test]
    fn test_remove() {
        let ledger = ledger();
        ledger.record_if_new("a", None, "{}").unwrap();
        assert!(ledger.remove("a").unwrap());
        assert!(!ledger.remove("a").unwrap());
        assert!(ledger.record_if_new("a", None, "{}").unwrap());
    }

    #[test]
    fn test_concurrent_record_if_new_has_single_winner() {
        let dir = tempdir().unwrap();
        let ledger = Arc::new(EnvelopeLedger::new(Database::new(dir.path()).unwrap()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = ledger.clone();
                std::thread::spawn(move || ledger.record_if_new("same", None, "{}").unwrap())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|is_new| *is_new)
            .count();
        assert_eq!(winners, 1);
    }
}
