//! Final-summary classification of a session average.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerformanceBand {
    /// Exclusive upper bound of the band; `None` catches everything left.
    pub below_ms: Option<u32>,
    pub label: &'static str,
    pub remark: &'static str,
}

/// Ordered threshold table, first match wins.
pub const PERFORMANCE_BANDS: [PerformanceBand; 6] = [
    PerformanceBand {
        below_ms: Some(180),
        label: "extremely fast",
        remark: "That's extremely fast!",
    },
    PerformanceBand {
        below_ms: Some(210),
        label: "excellent",
        remark: "That's excellent!",
    },
    PerformanceBand {
        below_ms: Some(240),
        label: "very good",
        remark: "That's very good!",
    },
    PerformanceBand {
        below_ms: Some(270),
        label: "above average",
        remark: "That's above average!",
    },
    PerformanceBand {
        below_ms: Some(300),
        label: "about average",
        remark: "That's about average.",
    },
    PerformanceBand {
        below_ms: None,
        label: "keep practicing",
        remark: "Keep practicing!",
    },
];

pub fn classify(average_ms: u32) -> &'static PerformanceBand {
    PERFORMANCE_BANDS
        .iter()
        .find(|band| band.below_ms.map_or(true, |limit| average_ms < limit))
        .unwrap_or(&PERFORMANCE_BANDS[PERFORMANCE_BANDS.len() - 1])
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalSummary {
    pub average_ms: u32,
    pub label: String,
    pub message: String,
}

impl FinalSummary {
    pub fn for_average(average_ms: u32) -> Self {
        let band = classify(average_ms);
        Self {
            average_ms,
            label: band.label.to_string(),
            message: format!("Your average: {average_ms} ms\n{}", band.remark),
        }
    }
}
