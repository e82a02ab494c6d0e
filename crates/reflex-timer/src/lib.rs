//! Reaction timing: clocks, onset/response capture and latency correction.

use std::{
    sync::{Arc, Mutex},
    time::Instant,
};

use reflex_types::{
    config::ProtocolConfig, telemetry::LatencySample, time::Timestamp, ReflexError, Result,
};
use tracing::{info, warn};

pub mod verdict;

pub use verdict::{classify, FinalSummary, PerformanceBand, PERFORMANCE_BANDS};

/// Source of monotonic timestamps.
pub trait Clock: Clone + Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Production clock measuring from its own creation.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.origin.elapsed().as_secs_f64() * 1_000.0)
    }
}

/// Hand-driven clock shared between clones.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ms: Arc<Mutex<f64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, ms: f64) {
        if let Ok(mut guard) = self.now_ms.lock() {
            *guard = ms;
        }
    }

    pub fn advance(&self, ms: f64) {
        if let Ok(mut guard) = self.now_ms.lock() {
            *guard += ms;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.now_ms.lock().map(|ms| *ms).unwrap_or(f64::NAN))
    }
}

/// Applies the benchmark correction to a raw onset-to-response gap.
///
/// Non-finite gaps fall back to `config.default_latency_ms`; everything else is
/// rounded, reduced by `config.correction_ms` and clamped to at least 1 ms.
pub fn compute_latency(onset: Timestamp, response: Timestamp, config: &ProtocolConfig) -> LatencySample {
    let raw = response - onset;
    if !raw.is_finite() {
        warn!(
            "Invalid reaction time detected ({raw}), using default {}ms",
            config.default_latency_ms
        );
        return LatencySample {
            raw_elapsed_ms: raw,
            corrected_ms: config.default_latency_ms,
            fallback: true,
        };
    }

    let corrected = (raw.round() as i64)
        .saturating_sub(config.correction_ms as i64)
        .clamp(1, u32::MAX as i64) as u32;
    LatencySample {
        raw_elapsed_ms: raw,
        corrected_ms: corrected,
        fallback: false,
    }
}

/// Captures stimulus onset and response timestamps for the trial in flight.
#[derive(Debug, Clone)]
pub struct ReactionTimer<C: Clock> {
    clock: C,
    config: ProtocolConfig,
    onset: Option<Timestamp>,
}

impl<C: Clock> ReactionTimer<C> {
    pub fn new(clock: C, config: ProtocolConfig) -> Self {
        Self {
            clock,
            config,
            onset: None,
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Reads the clock for the go-signal. Call before rendering it.
    pub fn mark_stimulus_onset(&mut self) -> Timestamp {
        let onset = self.clock.now();
        self.onset = Some(onset);
        onset
    }

    pub fn onset(&self) -> Option<Timestamp> {
        self.onset
    }

    /// Consumes the onset mark and produces the sample for `response`.
    pub fn record_response(&mut self, response: Timestamp) -> Result<LatencySample> {
        let onset = self.onset.take().ok_or_else(|| {
            ReflexError::ContractViolation("response recorded without a stimulus onset".into())
        })?;
        let sample = compute_latency(onset, response, &self.config);
        info!(
            "Recorded reaction time: {}ms (raw {:.1}ms)",
            sample.corrected_ms, sample.raw_elapsed_ms
        );
        Ok(sample)
    }

    pub fn clear(&mut self) {
        self.onset = None;
    }
}
