//! Gap-aware historical synchronisation.

use std::sync::Arc;

use futures::future::join_all;
use nostr_sdk::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::engine::reconcile::Reconciler;
use crate::error::{CoreError, Result};
use crate::models::TimeRange;
use crate::nostr::{CoverageTracker, LogicalQuery, Transport};

/// What one logical query did during a sync pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryReport {
    pub query: LogicalQuery,
    /// Historical queries issued
    pub queries: usize,
    pub events: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub queries: Vec<QueryReport>,
}

impl SyncReport {
    pub fn total_events(&self) -> usize {
        self.queries.iter().map(|q| q.events).sum()
    }

    pub fn get(&self, query: LogicalQuery) -> Option<&QueryReport> {
        self.queries.iter().find(|r| r.query == query)
    }
}

#[derive(Clone)]
pub struct SyncDriver {
    transport: Arc<dyn Transport>,
    coverage: Arc<dyn CoverageTracker>,
    reconciler: Reconciler,
    relays: Vec<String>,
    namespace: String,
}

impl SyncDriver {
    pub fn new(
        transport: Arc<dyn Transport>,
        coverage: Arc<dyn CoverageTracker>,
        reconciler: Reconciler,
        relays: Vec<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            coverage,
            reconciler,
            relays,
            namespace: namespace.into(),
        }
    }

    /// Fetch every unfetched sub-range of `window` for all four streams.
    ///
    /// The streams run concurrently; if any fails, the first error is
    /// returned after all of them have finished.
    pub async fn sync(&self, me: &PublicKey, window: TimeRange) -> Result<SyncReport> {
        info!(since = window.since, until = window.until, "Sync started");
        let results = join_all(
            LogicalQuery::ALL
                .iter()
                .map(|query| self.sync_query(*query, me, window)),
        )
        .await;

        let report = collect(results)?;
        info!(events = report.total_events(), "Sync finished");
        Ok(report)
    }

    /// Forget all coverage, then sync. Picks up envelopes that became
    /// visible after their window had already been fetched.
    pub async fn resync(&self, me: &PublicKey, window: TimeRange) -> Result<SyncReport> {
        for query in LogicalQuery::ALL {
            self.coverage
                .clear(&query.filter(me, &self.namespace))
                .await?;
        }
        info!("Coverage cleared for resync");
        self.sync(me, window).await
    }

    /// One unbounded query per stream, without coverage bookkeeping.
    pub async fn fetch_recent(&self, me: &PublicKey) -> Result<SyncReport> {
        let results = join_all(LogicalQuery::ALL.iter().map(|query| async move {
            let filter = query.filter(me, &self.namespace);
            let events = self.transport.query(filter, &self.relays).await?;
            self.apply_all(*query, &events, me).await?;
            Ok::<_, CoreError>(QueryReport {
                query: *query,
                queries: 1,
                events: events.len(),
            })
        }))
        .await;

        collect(results)
    }

    async fn sync_query(
        &self,
        query: LogicalQuery,
        me: &PublicKey,
        window: TimeRange,
    ) -> Result<QueryReport> {
        let base = query.filter(me, &self.namespace);

        let gaps = if window.is_empty() {
            Vec::new()
        } else if self.coverage.has_any_coverage(&base).await? {
            self.coverage.gaps(&base, window).await?
        } else {
            vec![window]
        };
        debug!(%query, gaps = gaps.len(), "Computed gaps");

        let mut report = QueryReport {
            query,
            queries: 0,
            events: 0,
        };
        for gap in gaps {
            let filter = base.clone().since(gap.since_ts()).until(gap.until_ts());
            let events = self.transport.query(filter, &self.relays).await?;
            report.queries += 1;
            report.events += events.len();

            self.apply_all(query, &events, me).await?;
            self.coverage.mark_fetched(&base, gap).await?;
        }
        Ok(report)
    }

    /// Process in transport order.
    async fn apply_all(&self, query: LogicalQuery, events: &[Event], me: &PublicKey) -> Result<()> {
        for event in events {
            self.reconciler.apply_in_batch(query, event, me).await?;
        }
        Ok(())
    }
}

fn collect(results: Vec<Result<QueryReport>>) -> Result<SyncReport> {
    let mut report = SyncReport::default();
    for result in results {
        report.queries.push(result?);
    }
    Ok(report)
}
