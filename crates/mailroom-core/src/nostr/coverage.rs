use async_trait::async_trait;
use nostr_sdk::prelude::*;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::models::TimeRange;
use crate::store::CoverageStore;

/// Bookkeeping of which time ranges of a filter have been fully fetched.
#[async_trait]
pub trait CoverageTracker: Send + Sync {
    async fn has_any_coverage(&self, filter: &Filter) -> Result<bool>;

    /// Sub-ranges of `window` not yet fetched, in ascending order.
    async fn gaps(&self, filter: &Filter, window: TimeRange) -> Result<Vec<TimeRange>>;

    async fn mark_fetched(&self, filter: &Filter, range: TimeRange) -> Result<()>;

    async fn clear(&self, filter: &Filter) -> Result<()>;
}

/// Stable key for a time-less filter.
pub fn coverage_key(filter: &Filter) -> String {
    hex::encode(Sha256::digest(filter.as_json().as_bytes()))
}

#[async_trait]
impl CoverageTracker for CoverageStore {
    async fn has_any_coverage(&self, filter: &Filter) -> Result<bool> {
        self.has_any(&coverage_key(filter))
    }

    async fn gaps(&self, filter: &Filter, window: TimeRange) -> Result<Vec<TimeRange>> {
        CoverageStore::gaps(self, &coverage_key(filter), window)
    }

    async fn mark_fetched(&self, filter: &Filter, range: TimeRange) -> Result<()> {
        self.mark(&coverage_key(filter), range)
    }

    async fn clear(&self, filter: &Filter) -> Result<()> {
        CoverageStore::clear(self, &coverage_key(filter))
    }
}
