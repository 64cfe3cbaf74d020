use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::poller::RequestMetadata;

/// What the result sink is handed for each successful swap.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapRecord {
    pub output_url: String,
    pub elapsed: Duration,
    pub source_image: String,
    pub target_image: String,
    pub job_id: String,
    pub metadata: RequestMetadata,
    pub completed_at: DateTime<Utc>,
}

impl SwapRecord {
    /// Day bucket used for the daily counters, e.g. `20250131`.
    pub fn day_key(&self) -> String {
        self.completed_at.format("%Y%m%d").to_string()
    }
}

/// What the result sink is handed for each swap that ended without a result.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureRecord {
    /// Stable error kind, e.g. `timed_out`.
    pub error_kind: String,
    pub message: String,
    /// Set once the vendor accepted the job.
    pub job_id: Option<String>,
    pub source_image: String,
    pub target_image: String,
    pub metadata: RequestMetadata,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureEntry {
    pub id: String,
    pub error_kind: String,
    pub message: String,
    pub job_id: Option<String>,
    pub user_id: String,
    pub style_id: String,
    pub customer_image: String,
    pub style_image: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub style_id: String,
    pub style_name: String,
    pub customer_image: String,
    pub style_image: String,
    pub result_image: String,
    pub processing_time: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StyleUsage {
    pub style_id: String,
    pub style_name: String,
    pub ai_usage_count: u64,
    pub last_used_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct UsageStatistics {
    pub total_swaps: u64,
    pub failed_swaps: u64,
    pub last_used_at: Option<DateTime<Utc>>,
    /// Swap count per `YYYYMMDD` day.
    pub daily: BTreeMap<String, u64>,
    /// Most used styles first.
    pub styles: Vec<StyleUsage>,
}
