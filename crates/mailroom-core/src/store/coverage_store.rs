use rusqlite::params;

use crate::error::Result;
use crate::models::time_range::{merge_ranges, uncovered};
use crate::models::TimeRange;
use crate::store::Database;

/// Fetched-interval bookkeeping per logical filter key.
///
/// Intervals are kept merged: marking a range rewrites the key's rows.
#[derive(Clone)]
pub struct CoverageStore {
    db: Database,
}

impl CoverageStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn ranges(&self, key: &str) -> Result<Vec<TimeRange>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT since, until FROM coverage WHERE filter_key = ?1 ORDER BY since",
            )?;
            let rows = stmt.query_map(params![key], |row| {
                Ok(TimeRange::new(
                    row.get::<_, i64>(0)? as u64,
                    row.get::<_, i64>(1)? as u64,
                ))
            })?;
            rows.collect()
        })
    }

    pub fn has_any(&self, key: &str) -> Result<bool> {
        Ok(!self.ranges(key)?.is_empty())
    }

    pub fn gaps(&self, key: &str, window: TimeRange) -> Result<Vec<TimeRange>> {
        let covered = merge_ranges(self.ranges(key)?);
        Ok(uncovered(&covered, window))
    }

    pub fn mark(&self, key: &str, range: TimeRange) -> Result<()> {
        if range.is_empty() {
            return Ok(());
        }
        self.db.with_transaction(|tx| {
            let existing = {
                let mut stmt =
                    tx.prepare("SELECT since, until FROM coverage WHERE filter_key = ?1")?;
                let rows = stmt.query_map(params![key], |row| {
                    Ok(TimeRange::new(
                        row.get::<_, i64>(0)? as u64,
                        row.get::<_, i64>(1)? as u64,
                    ))
                })?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };

            let mut all = existing;
            all.push(range);

            tx.execute("DELETE FROM coverage WHERE filter_key = ?1", params![key])?;
            for merged in merge_ranges(all) {
                tx.execute(
                    "INSERT INTO coverage (filter_key, since, until) VALUES (?1, ?2, ?3)",
                    params![key, merged.since as i64, clamp(merged.until)],
                )?;
            }
            Ok(())
        })
    }

    pub fn clear(&self, key: &str) -> Result<()> {
        self.db
            .with_conn(|conn| conn.execute("DELETE FROM coverage WHERE filter_key = ?1", params![key]))?;
        Ok(())
    }
}

fn clamp(value: u64) -> i64 {
    value.min(i64::MAX as u64) as i64
}
