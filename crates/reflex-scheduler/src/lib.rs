//! Stimulus scheduling: randomized, cancellable one-shot delays before the go-signal.

use std::time::Duration;

use rand::{rngs::StdRng, Rng, SeedableRng};
use reflex_types::{config::ProtocolConfig, events::ScheduleHandle, ReflexError, Result};
use tracing::{debug, error};

mod runtime;

pub use runtime::TokioScheduler;

/// A schedule that has just been armed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArmedSchedule {
    pub handle: ScheduleHandle,
    /// Drawn delay in fractional milliseconds.
    pub delay_ms: f64,
}

impl ArmedSchedule {
    pub fn delay(&self) -> Duration {
        Duration::from_micros((self.delay_ms * 1_000.0) as u64)
    }
}

pub trait StimulusScheduler: Send {
    /// Arms a new schedule. Fails if another handle is still live.
    fn arm(&mut self) -> Result<ArmedSchedule>;
    /// Marks `handle` inert. Returns false for fired, cancelled or unknown handles.
    fn cancel(&mut self, handle: ScheduleHandle) -> bool;
    /// Fire-time check: true exactly once for the live handle.
    fn claim(&mut self, handle: ScheduleHandle) -> bool;
    fn live(&self) -> Option<ScheduleHandle>;

    fn cancel_live(&mut self) -> Option<ScheduleHandle> {
        let handle = self.live()?;
        self.cancel(handle).then_some(handle)
    }
}

/// Delay distribution: a whole-millisecond draw plus a fractional draw on top of the minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayPolicy {
    pub min_delay_ms: u64,
    pub coarse_jitter_ms: u64,
    pub fine_jitter_ms: u64,
}

impl DelayPolicy {
    pub fn from_config(config: &ProtocolConfig) -> Self {
        Self {
            min_delay_ms: config.min_delay_ms,
            coarse_jitter_ms: config.coarse_jitter_ms,
            fine_jitter_ms: config.fine_jitter_ms,
        }
    }

    pub fn upper_bound_ms(&self) -> u64 {
        self.min_delay_ms + self.coarse_jitter_ms + self.fine_jitter_ms
    }

    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let coarse = rng.random_range(0..self.coarse_jitter_ms.max(1)) as f64;
        let fine = rng.random::<f64>() * self.fine_jitter_ms as f64;
        self.min_delay_ms as f64 + coarse + fine
    }
}

impl Default for DelayPolicy {
    fn default() -> Self {
        Self::from_config(&ProtocolConfig::default())
    }
}

/// Bookkeeping shared by scheduler implementations: at most one live handle.
#[derive(Debug, Default)]
pub struct ScheduleRegistry {
    next_id: u64,
    live: Option<ScheduleHandle>,
}

impl ScheduleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self) -> Result<ScheduleHandle> {
        if let Some(live) = self.live {
            error!("Arm requested while schedule {:?} is still live", live);
            return Err(scheduler_contract_error(format!(
                "schedule {} is still live",
                live.0
            )));
        }
        self.next_id += 1;
        let handle = ScheduleHandle(self.next_id);
        self.live = Some(handle);
        Ok(handle)
    }

    pub fn cancel(&mut self, handle: ScheduleHandle) -> bool {
        self.take_if_live(handle)
    }

    pub fn claim(&mut self, handle: ScheduleHandle) -> bool {
        self.take_if_live(handle)
    }

    pub fn live(&self) -> Option<ScheduleHandle> {
        self.live
    }

    fn take_if_live(&mut self, handle: ScheduleHandle) -> bool {
        if self.live == Some(handle) {
            self.live = None;
            true
        } else {
            false
        }
    }
}

/// Scheduler that never fires on its own; callers deliver fires by hand.
pub struct ManualScheduler<R: Rng + Send = StdRng> {
    registry: ScheduleRegistry,
    policy: DelayPolicy,
    rng: R,
    armed: Vec<ArmedSchedule>,
}

impl ManualScheduler<StdRng> {
    pub fn seeded(policy: DelayPolicy, seed: u64) -> Self {
        Self::new(policy, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng + Send> ManualScheduler<R> {
    pub fn new(policy: DelayPolicy, rng: R) -> Self {
        Self {
            registry: ScheduleRegistry::new(),
            policy,
            rng,
            armed: Vec::new(),
        }
    }

    /// Every schedule armed so far, oldest first.
    pub fn armed(&self) -> &[ArmedSchedule] {
        &self.armed
    }

    pub fn last_armed(&self) -> Option<ArmedSchedule> {
        self.armed.last().copied()
    }
}

impl<R: Rng + Send> StimulusScheduler for ManualScheduler<R> {
    fn arm(&mut self) -> Result<ArmedSchedule> {
        let handle = self.registry.open()?;
        let armed = ArmedSchedule {
            handle,
            delay_ms: self.policy.draw(&mut self.rng),
        };
        debug!("Manual schedule {:?} armed for {:.1}ms", handle, armed.delay_ms);
        self.armed.push(armed);
        Ok(armed)
    }

    fn cancel(&mut self, handle: ScheduleHandle) -> bool {
        self.registry.cancel(handle)
    }

    fn claim(&mut self, handle: ScheduleHandle) -> bool {
        self.registry.claim(handle)
    }

    fn live(&self) -> Option<ScheduleHandle> {
        self.registry.live()
    }
}

/// Generate an error aligned with scheduler semantics.
pub fn scheduler_error(message: impl Into<String>) -> ReflexError {
    ReflexError::Scheduler(message.into())
}

fn scheduler_contract_error(message: impl Into<String>) -> ReflexError {
    ReflexError::ContractViolation(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn delays_stay_inside_window() {
        let policy = DelayPolicy::default();
        let mut scheduler = ManualScheduler::seeded(policy, 7);
        for _ in 0..10_000 {
            let armed = scheduler.arm().expect("arm");
            assert!(armed.delay_ms >= 1_000.0, "delay {} too short", armed.delay_ms);
            assert!(armed.delay_ms < 3_500.0, "delay {} too long", armed.delay_ms);
            assert!(armed.delay() < Duration::from_millis(3_500));
            assert!(scheduler.claim(armed.handle));
        }
        let mut ids: Vec<u64> = scheduler.armed().iter().map(|a| a.handle.0).collect();
        ids.dedup();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn double_arm_is_rejected() {
        let mut scheduler = ManualScheduler::seeded(DelayPolicy::default(), 1);
        let first = scheduler.arm().expect("first arm");
        let err = scheduler.arm().unwrap_err();
        assert!(err.is_contract_violation());
        assert_eq!(scheduler.live(), Some(first.handle));
        assert_eq!(scheduler.armed().len(), 1);
    }

    #[test]
    fn cancelled_handle_cannot_be_claimed() {
        let mut scheduler = ManualScheduler::seeded(DelayPolicy::default(), 2);
        let armed = scheduler.arm().expect("arm");
        assert!(scheduler.cancel(armed.handle));
        assert!(!scheduler.claim(armed.handle));
        assert!(!scheduler.cancel(armed.handle));
        assert!(scheduler.live().is_none());
    }

    #[test]
    fn fired_handle_is_claimed_once() {
        let mut scheduler = ManualScheduler::seeded(DelayPolicy::default(), 3);
        let armed = scheduler.arm().expect("arm");
        assert!(scheduler.claim(armed.handle));
        assert!(!scheduler.claim(armed.handle));
        assert!(!scheduler.cancel(armed.handle));
    }

    #[test]
    fn stale_handle_does_not_touch_new_schedule() {
        let mut scheduler = ManualScheduler::seeded(DelayPolicy::default(), 4);
        let old = scheduler.arm().expect("arm");
        assert_eq!(scheduler.cancel_live(), Some(old.handle));
        let new = scheduler.arm().expect("re-arm");
        assert!(!scheduler.claim(old.handle));
        assert_eq!(scheduler.live(), Some(new.handle));
    }

    proptest! {
        #[test]
        fn any_seed_respects_bounds(seed in any::<u64>()) {
            let policy = DelayPolicy::default();
            let mut rng = StdRng::seed_from_u64(seed);
            let delay = policy.draw(&mut rng);
            prop_assert!(delay >= policy.min_delay_ms as f64);
            prop_assert!(delay < policy.upper_bound_ms() as f64);
        }
    }
}
