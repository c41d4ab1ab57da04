use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;

use crate::models::IngestOutcome;
use crate::nostr::LogicalQuery;

/// Counters for one logical query, across sync and live paths.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct QueryStats {
    pub events_seen: u64,
    pub duplicates: u64,
    pub messages_stored: u64,
    /// Left unprocessed for retry
    pub deferred: u64,
    /// Recorded as processed without a message
    pub terminal: u64,
    pub labels_applied: u64,
    pub labels_removed: u64,
    pub messages_deleted: u64,
}

impl QueryStats {
    pub fn record_outcome(&mut self, outcome: &IngestOutcome) {
        match outcome {
            IngestOutcome::Duplicate => self.duplicates += 1,
            IngestOutcome::Stored(_) => self.messages_stored += 1,
            IngestOutcome::Deferred | IngestOutcome::NotAddressedToUs => self.deferred += 1,
            IngestOutcome::Rejected | IngestOutcome::NotMail { .. } | IngestOutcome::Malformed => {
                self.terminal += 1
            }
        }
    }

    fn add(&mut self, other: &QueryStats) {
        self.events_seen += other.events_seen;
        self.duplicates += other.duplicates;
        self.messages_stored += other.messages_stored;
        self.deferred += other.deferred;
        self.terminal += other.terminal;
        self.labels_applied += other.labels_applied;
        self.labels_removed += other.labels_removed;
        self.messages_deleted += other.messages_deleted;
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct SyncStats {
    pub by_query: BTreeMap<LogicalQuery, QueryStats>,
}

impl SyncStats {
    pub fn get(&self, query: LogicalQuery) -> QueryStats {
        self.by_query.get(&query).cloned().unwrap_or_default()
    }

    pub fn total(&self) -> QueryStats {
        let mut total = QueryStats::default();
        for stats in self.by_query.values() {
            total.add(stats);
        }
        total
    }
}

/// Thread-safe wrapper for sync stats
#[derive(Debug, Clone, Default)]
pub struct SharedSyncStats {
    inner: Arc<RwLock<SyncStats>>,
}

impl SharedSyncStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, query: LogicalQuery, update: impl FnOnce(&mut QueryStats)) {
        if let Ok(mut stats) = self.inner.write() {
            update(stats.by_query.entry(query).or_default());
        }
    }

    pub fn snapshot(&self) -> SyncStats {
        self.inner.read().map(|s| s.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_total() {
        let stats = SharedSyncStats::new();
        stats.record(LogicalQuery::Messages, |s| {
            s.events_seen += 2;
            s.record_outcome(&IngestOutcome::Deferred);
            s.record_outcome(&IngestOutcome::NotMail { kind: 14 });
        });
        stats.record(LogicalQuery::Labels, |s| s.labels_applied += 1);

        let snapshot = stats.snapshot();
        let messages = snapshot.get(LogicalQuery::Messages);
        assert_eq!(messages.deferred, 1);
        assert_eq!(messages.terminal, 1);
        assert_eq!(snapshot.get(LogicalQuery::LabelDeletions), QueryStats::default());

        let total = snapshot.total();
        assert_eq!(total.events_seen, 2);
        assert_eq!(total.labels_applied, 1);
    }

    #[test]
    fn test_serializes_query_keys() {
        let stats = SharedSyncStats::new();
        stats.record(LogicalQuery::MessageDeletions, |s| s.messages_deleted += 1);
        let json = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(json["by_query"]["message_deletions"]["messages_deleted"], 1);
    }
}
