//! Persistence of finished swaps.

mod models;
mod schema;
mod sqlite_swap_store;

pub use models::{
    FailureEntry, FailureRecord, HistoryEntry, StyleUsage, SwapRecord, UsageStatistics,
};
pub use sqlite_swap_store::SqliteSwapStore;

use anyhow::Result;
use async_trait::async_trait;

/// Receives every finished swap. Errors are reported back to the caller
/// but never change the outcome of the swap itself.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn record_success(&self, record: SwapRecord) -> Result<()>;

    /// Called for swaps that ended without a result image, except cancelled ones.
    async fn record_failure(&self, _record: FailureRecord) -> Result<()> {
        Ok(())
    }
}

/// Sink used when persistence is turned off.
pub struct NoopSink;

#[async_trait]
impl ResultSink for NoopSink {
    async fn record_success(&self, _record: SwapRecord) -> Result<()> {
        Ok(())
    }
}

/// Read side of the swap store, used by the history and statistics endpoints.
pub trait SwapHistory: Send + Sync {
    /// Most recent swaps of `user_id`, newest first.
    fn get_user_history(&self, user_id: &str, limit: usize) -> Result<Vec<HistoryEntry>>;

    fn get_statistics(&self) -> Result<UsageStatistics>;

    /// Cheap round trip to check the backing database is usable.
    fn ping(&self) -> bool;
}
