use serde::{Deserialize, Serialize};

use crate::{ReflexError, Result};

/// Recorded latencies and counters for one run of up to `max_attempts` trials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialSession {
    latencies: Vec<u32>,
    max_attempts: usize,
    too_soon_count: u32,
    too_soon_total: u32,
}

impl TrialSession {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            latencies: Vec::with_capacity(max_attempts),
            max_attempts,
            too_soon_count: 0,
            too_soon_total: 0,
        }
    }

    pub fn latencies(&self) -> &[u32] {
        &self.latencies
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn too_soon_count(&self) -> u32 {
        self.too_soon_count
    }

    /// Premature clicks across every waiting phase of this session.
    pub fn too_soon_total(&self) -> u32 {
        self.too_soon_total
    }

    pub fn len(&self) -> usize {
        self.latencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latencies.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.latencies.len() == self.max_attempts
    }

    pub fn last(&self) -> Option<u32> {
        self.latencies.last().copied()
    }

    /// Appends a corrected latency. Rejects zero values and appends past `max_attempts`.
    pub fn record(&mut self, corrected_ms: u32) -> Result<usize> {
        if corrected_ms == 0 {
            return Err(ReflexError::ContractViolation(
                "latencies must be at least 1 ms".into(),
            ));
        }
        if self.is_complete() {
            return Err(ReflexError::ContractViolation(format!(
                "session already holds {} latencies",
                self.max_attempts
            )));
        }
        self.latencies.push(corrected_ms);
        Ok(self.latencies.len())
    }

    pub fn begin_waiting(&mut self) {
        self.too_soon_count = 0;
    }

    pub fn note_too_soon(&mut self) -> u32 {
        self.too_soon_count += 1;
        self.too_soon_total += 1;
        self.too_soon_count
    }

    pub fn reset(&mut self) {
        self.latencies.clear();
        self.too_soon_count = 0;
        self.too_soon_total = 0;
    }
}

/// Derived summary of the recorded latencies. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub best: u32,
    pub average: u32,
    pub count: usize,
    pub max_attempts: usize,
}

impl StatsSnapshot {
    pub fn attempts_label(&self) -> String {
        format!("{}/{}", self.count, self.max_attempts)
    }
}
