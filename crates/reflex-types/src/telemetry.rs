use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of one completed trial.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencySample {
    pub raw_elapsed_ms: f64,
    pub corrected_ms: u32,
    /// Set when `raw_elapsed_ms` was not finite and the default latency was used.
    pub fallback: bool,
}

/// Summary of a finished session, kept in memory for the lifetime of the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: u64,
    pub latencies: Vec<u32>,
    pub too_soon_total: u32,
    pub best_ms: u32,
    pub average_ms: u32,
    pub label: String,
    pub completed_at: DateTime<Utc>,
}
