//! Cosmetic calibration sequence shown once before the first trial.

use reflex_types::{config::CalibrationConfig, events::ActorMessage};
use tokio::{
    sync::mpsc::UnboundedSender,
    task::JoinHandle,
    time::{sleep, Duration},
};
use tracing::{info, warn};

pub const STAGE_MESSAGES: [&str; 5] = [
    "Testing display rendering...",
    "Measuring display refresh rate...",
    "Optimizing visual elements...",
    "Testing input latency...",
    "Finalizing setup...",
];

pub const COMPLETE_MESSAGE: &str = "Calibration complete!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationStep {
    pub percent: u32,
    pub stage_message: &'static str,
}

/// The fixed progression of one calibration run.
#[derive(Debug, Clone)]
pub struct CalibrationPlan {
    config: CalibrationConfig,
}

impl CalibrationPlan {
    pub fn new(config: CalibrationConfig) -> Self {
        Self { config }
    }

    pub fn steps(&self) -> impl Iterator<Item = CalibrationStep> + '_ {
        (0..self.config.steps).map(move |index| CalibrationStep {
            percent: index * 100 / self.config.steps,
            stage_message: self.stage_for(index),
        })
    }

    pub fn step_interval(&self) -> Duration {
        self.config.step_interval()
    }

    pub fn final_hold(&self) -> Duration {
        self.config.final_hold()
    }

    /// Wall time of an uninterrupted run.
    pub fn total_duration(&self) -> Duration {
        self.step_interval() * self.config.steps + self.final_hold()
    }

    fn stage_for(&self, index: u32) -> &'static str {
        let stage = (index / self.config.stage_every.max(1)) as usize;
        STAGE_MESSAGES[stage.min(STAGE_MESSAGES.len() - 1)]
    }
}

/// Sends `CalibrationFinished` exactly once, even if the run is torn down early.
struct CompletionGuard {
    sink: UnboundedSender<ActorMessage>,
    signalled: bool,
}

impl CompletionGuard {
    fn new(sink: UnboundedSender<ActorMessage>) -> Self {
        Self {
            sink,
            signalled: false,
        }
    }

    fn signal(&mut self) {
        if !self.signalled {
            self.signalled = true;
            let _ = self.sink.send(ActorMessage::CalibrationFinished);
        }
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if !self.signalled {
            warn!("Calibration interrupted; releasing overlay early");
            self.signal();
        }
    }
}

/// Drives one calibration run, posting progress into the actor channel.
pub async fn run_calibration(plan: CalibrationPlan, sink: UnboundedSender<ActorMessage>) {
    let mut guard = CompletionGuard::new(sink.clone());
    info!("Calibration started");

    for step in plan.steps() {
        let _ = sink.send(ActorMessage::CalibrationProgress {
            percent: step.percent,
            stage_message: step.stage_message.to_string(),
        });
        sleep(plan.step_interval()).await;
    }

    let _ = sink.send(ActorMessage::CalibrationProgress {
        percent: 100,
        stage_message: COMPLETE_MESSAGE.to_string(),
    });
    sleep(plan.final_hold()).await;

    info!("Calibration complete");
    guard.signal();
}

/// One-shot owner of the calibration run.
pub struct CalibrationSequencer {
    plan: CalibrationPlan,
}

impl CalibrationSequencer {
    pub fn new(config: CalibrationConfig) -> Self {
        Self {
            plan: CalibrationPlan::new(config),
        }
    }

    /// Starts the run. Consumes the sequencer so a process can only calibrate once.
    pub fn start(self, sink: UnboundedSender<ActorMessage>) -> CalibrationTask {
        CalibrationTask {
            handle: tokio::spawn(run_calibration(self.plan, sink)),
        }
    }
}

pub struct CalibrationTask {
    handle: JoinHandle<()>,
}

impl CalibrationTask {
    /// Tears the run down; completion is still signalled.
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn drain(rx: &mut mpsc::UnboundedReceiver<ActorMessage>) -> Vec<ActorMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    #[test]
    fn plan_walks_stages_in_order() {
        let plan = CalibrationPlan::new(CalibrationConfig::default());
        let steps: Vec<_> = plan.steps().collect();
        assert_eq!(steps.len(), 100);
        assert_eq!(steps[0].percent, 0);
        assert_eq!(steps[99].percent, 99);
        assert_eq!(steps[0].stage_message, STAGE_MESSAGES[0]);
        assert_eq!(steps[19].stage_message, STAGE_MESSAGES[0]);
        assert_eq!(steps[20].stage_message, STAGE_MESSAGES[1]);
        assert_eq!(steps[40].stage_message, STAGE_MESSAGES[2]);
        assert_eq!(steps[60].stage_message, STAGE_MESSAGES[3]);
        assert_eq!(steps[80].stage_message, STAGE_MESSAGES[4]);
        assert_eq!(steps[99].stage_message, STAGE_MESSAGES[4]);
        assert_eq!(plan.total_duration(), Duration::from_millis(2_800));
    }

    #[tokio::test(start_paused = true)]
    async fn full_run_signals_completion_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = CalibrationSequencer::new(CalibrationConfig::default()).start(tx);

        sleep(Duration::from_millis(2_000)).await;
        let early = drain(&mut rx);
        assert!(!early.contains(&ActorMessage::CalibrationFinished));

        task.join().await;
        let mut messages = early;
        messages.extend(drain(&mut rx));

        assert_eq!(messages.len(), 102);
        assert_eq!(
            messages[100],
            ActorMessage::CalibrationProgress {
                percent: 100,
                stage_message: COMPLETE_MESSAGE.to_string(),
            }
        );
        assert_eq!(messages[101], ActorMessage::CalibrationFinished);
    }

    #[tokio::test(start_paused = true)]
    async fn aborted_run_still_signals_completion() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = CalibrationSequencer::new(CalibrationConfig::default()).start(tx);

        sleep(Duration::from_millis(500)).await;
        task.abort();
        task.join().await;

        let messages = drain(&mut rx);
        let finished = messages
            .iter()
            .filter(|m| **m == ActorMessage::CalibrationFinished)
            .count();
        assert_eq!(finished, 1);
        assert_eq!(messages.last(), Some(&ActorMessage::CalibrationFinished));
        assert!(messages.len() < 102);
    }
}
