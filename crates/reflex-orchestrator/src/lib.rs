//! Single-actor runtime coordinating calibration, scheduling, timing and presentation.

use async_trait::async_trait;
use reflex_calibration::{CalibrationSequencer, CalibrationTask};
use reflex_ops::SessionLog;
use reflex_scheduler::{DelayPolicy, TokioScheduler};
use reflex_timer::Clock;
use reflex_types::{
    config::ReflexConfig,
    events::{ActorMessage, InputEvent, LifecyclePhase, SystemEvent},
    state::TrialState,
    ReflexError, Result,
};
use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    time::sleep,
};
use tracing::{debug, info, warn};

pub mod machine;
pub mod presenter;

pub use machine::{FollowUp, Transition, TrialMachine};
pub use presenter::{presentation_error, Presenter, RecordingPresenter};

/// Cloneable front door for user input. Engage timestamps are taken on arrival.
#[derive(Clone)]
pub struct InputHandle<C: Clock> {
    tx: UnboundedSender<ActorMessage>,
    clock: C,
}

impl<C: Clock> InputHandle<C> {
    pub fn engage(&self) -> Result<()> {
        let at = self.clock.now();
        self.send(ActorMessage::Input(InputEvent::Engage { at }))
    }

    pub fn reset(&self) -> Result<()> {
        self.send(ActorMessage::Input(InputEvent::Reset))
    }

    pub fn toggle_theme(&self) -> Result<()> {
        self.send(ActorMessage::Input(InputEvent::ThemeToggle))
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(ActorMessage::Shutdown)
    }

    fn send(&self, message: ActorMessage) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|_| orchestrator_error("trial actor has stopped"))
    }
}

pub struct Orchestrator<P, C>
where
    P: Presenter,
    C: Clock,
{
    machine: TrialMachine<TokioScheduler, C>,
    presenter: P,
    log: SessionLog,
    clock: C,
    sequencer: Option<CalibrationSequencer>,
    calibration: Option<CalibrationTask>,
    tx: UnboundedSender<ActorMessage>,
    rx: UnboundedReceiver<ActorMessage>,
}

impl<P, C> Orchestrator<P, C>
where
    P: Presenter,
    C: Clock,
{
    pub fn new(config: &ReflexConfig, presenter: P, clock: C, log: SessionLog) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler =
            TokioScheduler::new(DelayPolicy::from_config(&config.protocol), tx.clone());
        Self {
            machine: TrialMachine::new(config.protocol.clone(), scheduler, clock.clone()),
            presenter,
            log,
            clock,
            sequencer: Some(CalibrationSequencer::new(config.calibration.clone())),
            calibration: None,
            tx,
            rx,
        }
    }

    pub fn input(&self) -> InputHandle<C> {
        InputHandle {
            tx: self.tx.clone(),
            clock: self.clock.clone(),
        }
    }

    pub fn log(&self) -> &SessionLog {
        &self.log
    }

    pub fn state(&self) -> TrialState {
        self.machine.state()
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    /// Publishes the boot event and starts the one-time calibration run.
    pub async fn boot(&mut self) -> Result<()> {
        let Some(sequencer) = self.sequencer.take() else {
            return Err(orchestrator_error("calibration already started"));
        };
        self.log
            .record_event(SystemEvent::lifecycle(
                LifecyclePhase::Boot,
                Some("trial actor ready".into()),
            ))
            .await?;
        self.log
            .record_event(SystemEvent::lifecycle(LifecyclePhase::CalibrationStart, None))
            .await?;
        self.calibration = Some(sequencer.start(self.tx.clone()));
        Ok(())
    }

    /// Processes one message. Returns `false` once the actor should stop.
    pub async fn dispatch(&mut self, message: ActorMessage) -> Result<bool> {
        let keep_running = message != ActorMessage::Shutdown;
        if matches!(message, ActorMessage::CalibrationFinished) {
            self.calibration = None;
        }

        let transition = self.machine.handle(message);
        for instruction in &transition.renders {
            if let Err(err) = self.presenter.apply(instruction) {
                warn!("Presenter rejected {:?}: {err}", instruction);
            }
        }
        for event in transition.events {
            self.log.record_event(event).await?;
        }
        if let Some(record) = transition.completed_session {
            self.log.record_session(record).await?;
        }
        if let Some(follow_up) = transition.follow_up {
            self.schedule(follow_up);
        }
        Ok(keep_running)
    }

    fn schedule(&self, follow_up: FollowUp) {
        match follow_up {
            FollowUp::Summary { session_id, after } => {
                let tx = self.tx.clone();
                debug!("Summary for session {session_id} due in {after:?}");
                tokio::spawn(async move {
                    sleep(after).await;
                    let _ = tx.send(ActorMessage::SummaryDue { session_id });
                });
            }
        }
    }

    fn teardown(&mut self) {
        if let Some(task) = self.calibration.take() {
            task.abort();
        }
    }
}

#[async_trait]
pub trait SessionRunner {
    async fn run(&mut self) -> Result<()>;
}

#[async_trait]
impl<P, C> SessionRunner for Orchestrator<P, C>
where
    P: Presenter,
    C: Clock,
{
    async fn run(&mut self) -> Result<()> {
        if self.sequencer.is_some() {
            self.boot().await?;
        }
        info!("Trial actor running");

        while let Some(message) = self.rx.recv().await {
            if !self.dispatch(message).await? {
                break;
            }
        }

        self.teardown();
        info!("Trial actor stopped");
        Ok(())
    }
}

pub fn orchestrator_error(message: impl Into<String>) -> ReflexError {
    ReflexError::Orchestrator(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reflex_timer::ManualClock;
    use reflex_types::{
        events::EventKind,
        render::RenderInstruction,
        state::{READY_MESSAGE, STIMULUS_MESSAGE, WAITING_MESSAGE},
    };
    use tokio::time::Duration;

    fn orchestrator() -> (
        Orchestrator<RecordingPresenter, ManualClock>,
        RecordingPresenter,
        ManualClock,
    ) {
        let presenter = RecordingPresenter::new();
        let clock = ManualClock::new();
        let orchestrator = Orchestrator::new(
            &ReflexConfig::default(),
            presenter.clone(),
            clock.clone(),
            SessionLog::new(1_024),
        );
        (orchestrator, presenter, clock)
    }

    #[tokio::test(start_paused = true)]
    async fn calibration_hands_over_to_ready() {
        let (mut orchestrator, presenter, _) = orchestrator();
        let input = orchestrator.input();
        let log = orchestrator.log().clone();
        let actor = tokio::spawn(async move { orchestrator.run().await });

        sleep(Duration::from_millis(1_000)).await;
        input.engage().unwrap();
        sleep(Duration::from_millis(2_000)).await;

        let rendered = presenter.rendered();
        assert!(rendered.contains(&RenderInstruction::DismissCalibration));
        assert_eq!(
            presenter.last_state(),
            Some((TrialState::Ready, READY_MESSAGE.to_string()))
        );
        let progress = rendered
            .iter()
            .filter(|r| matches!(r, RenderInstruction::CalibrationProgress { .. }))
            .count();
        assert_eq!(progress, 101);

        input.shutdown().unwrap();
        actor.await.unwrap().unwrap();
        let events = log.snapshot_events().await;
        assert_eq!(events.first().map(|e| e.kind.clone()), Some(EventKind::Lifecycle));
    }

    #[tokio::test(start_paused = true)]
    async fn full_trial_through_the_actor() {
        let (mut orchestrator, presenter, clock) = orchestrator();
        let input = orchestrator.input();
        let actor = tokio::spawn(async move { orchestrator.run().await });

        sleep(Duration::from_millis(3_000)).await;
        input.engage().unwrap();
        sleep(Duration::from_millis(10)).await;
        assert_eq!(
            presenter.last_state(),
            Some((TrialState::Waiting, WAITING_MESSAGE.to_string()))
        );

        sleep(Duration::from_millis(3_600)).await;
        assert_eq!(
            presenter.last_state(),
            Some((TrialState::Stimulus, STIMULUS_MESSAGE.to_string()))
        );

        clock.advance(260.0);
        input.engage().unwrap();
        sleep(Duration::from_millis(10)).await;
        assert!(presenter
            .rendered()
            .contains(&RenderInstruction::Latency { ms: 210 }));

        input.shutdown().unwrap();
        actor.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn premature_click_suppresses_pending_fire() {
        let (mut orchestrator, presenter, _) = orchestrator();
        let input = orchestrator.input();
        let actor = tokio::spawn(async move { orchestrator.run().await });

        sleep(Duration::from_millis(3_000)).await;
        input.engage().unwrap();
        sleep(Duration::from_millis(200)).await;
        input.engage().unwrap();
        sleep(Duration::from_millis(5_000)).await;

        assert_eq!(presenter.last_state().map(|(s, _)| s), Some(TrialState::TooSoon));
        assert!(!presenter
            .rendered()
            .iter()
            .any(|r| matches!(r, RenderInstruction::State { state: TrialState::Stimulus, .. })));

        input.shutdown().unwrap();
        actor.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn summary_arrives_after_post_trial_delay() {
        let (mut orchestrator, presenter, clock) = orchestrator();
        let input = orchestrator.input();
        let log = orchestrator.log().clone();
        let actor = tokio::spawn(async move { orchestrator.run().await });

        sleep(Duration::from_millis(3_000)).await;
        for gap in [200.0, 350.0, 250.0, 230.0, 270.0] {
            input.engage().unwrap();
            sleep(Duration::from_millis(3_600)).await;
            clock.advance(gap);
            input.engage().unwrap();
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(presenter.last_state().map(|(s, _)| s), Some(TrialState::Complete));
        assert!(!presenter
            .rendered()
            .iter()
            .any(|r| matches!(r, RenderInstruction::FinalSummary { .. })));

        sleep(Duration::from_millis(500)).await;
        assert!(presenter.rendered().contains(&RenderInstruction::FinalSummary {
            average_ms: 210,
            label: "very good".into(),
        }));

        input.shutdown().unwrap();
        actor.await.unwrap().unwrap();
        let sessions = log.sessions().await;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].latencies, vec![150, 300, 200, 180, 220]);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_before_summary_drops_it() {
        let (mut orchestrator, presenter, clock) = orchestrator();
        let input = orchestrator.input();
        let actor = tokio::spawn(async move { orchestrator.run().await });

        sleep(Duration::from_millis(3_000)).await;
        for _ in 0..5 {
            input.engage().unwrap();
            sleep(Duration::from_millis(3_600)).await;
            clock.advance(300.0);
            input.engage().unwrap();
            sleep(Duration::from_millis(10)).await;
        }
        input.reset().unwrap();
        sleep(Duration::from_millis(1_000)).await;

        assert!(!presenter
            .rendered()
            .iter()
            .any(|r| matches!(r, RenderInstruction::FinalSummary { .. })));
        assert_eq!(
            presenter.last_state(),
            Some((TrialState::Ready, READY_MESSAGE.to_string()))
        );

        input.shutdown().unwrap();
        actor.await.unwrap().unwrap();
    }

    #[test]
    fn input_fails_once_actor_is_gone() {
        let (orchestrator, _, _) = orchestrator();
        let input = orchestrator.input();
        drop(orchestrator);
        assert!(matches!(input.engage(), Err(ReflexError::Orchestrator(_))));
    }
}
