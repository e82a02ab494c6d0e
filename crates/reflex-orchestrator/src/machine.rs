//! Trial protocol state machine.
//!
//! The machine is synchronous and owns the session, the stimulus scheduler and the
//! reaction timer. Every input produces a [`Transition`]: render instructions for the
//! presentation layer, events for the ops log, and at most one deferred follow-up the
//! actor has to schedule.

use std::time::Duration;

use chrono::Utc;
use reflex_scheduler::StimulusScheduler;
use reflex_stats::{history, snapshot};
use reflex_timer::{compute_latency, Clock, FinalSummary, ReactionTimer};
use reflex_types::{
    config::ProtocolConfig,
    events::{ActorMessage, InputEvent, LifecyclePhase, ScheduleHandle, SystemEvent},
    render::RenderInstruction,
    session::{StatsSnapshot, TrialSession},
    state::{
        TrialState, COMPLETE_MESSAGE, CONTINUE_MESSAGE, READY_MESSAGE, STIMULUS_MESSAGE,
        TOO_SOON_MESSAGE, WAITING_MESSAGE,
    },
    telemetry::SessionRecord,
    time::Timestamp,
};
use tracing::{debug, error, info, warn};

/// Work the actor must schedule on the machine's behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    Summary { session_id: u64, after: Duration },
}

#[derive(Debug, Default)]
pub struct Transition {
    pub renders: Vec<RenderInstruction>,
    pub events: Vec<SystemEvent>,
    pub follow_up: Option<FollowUp>,
    pub completed_session: Option<SessionRecord>,
}

impl Transition {
    pub fn is_empty(&self) -> bool {
        self.renders.is_empty() && self.follow_up.is_none() && self.completed_session.is_none()
    }
}

pub struct TrialMachine<S, C>
where
    S: StimulusScheduler,
    C: Clock,
{
    config: ProtocolConfig,
    state: TrialState,
    session: TrialSession,
    session_id: u64,
    scheduler: S,
    timer: ReactionTimer<C>,
}

impl<S, C> TrialMachine<S, C>
where
    S: StimulusScheduler,
    C: Clock,
{
    pub fn new(config: ProtocolConfig, scheduler: S, clock: C) -> Self {
        Self {
            session: TrialSession::new(config.max_attempts),
            timer: ReactionTimer::new(clock, config.clone()),
            config,
            state: TrialState::Calibrating,
            session_id: 1,
            scheduler,
        }
    }

    pub fn state(&self) -> TrialState {
        self.state
    }

    pub fn session(&self) -> &TrialSession {
        &self.session
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    pub fn stats(&self) -> Option<StatsSnapshot> {
        snapshot(self.session.latencies(), self.config.max_attempts)
    }

    pub fn handle(&mut self, message: ActorMessage) -> Transition {
        match message {
            ActorMessage::Input(InputEvent::Engage { at }) => self.on_engage(at),
            ActorMessage::Input(InputEvent::Reset) => self.on_reset(),
            ActorMessage::Input(InputEvent::ThemeToggle) => self.on_theme_toggle(),
            ActorMessage::StimulusFired(handle) => self.on_stimulus_fired(handle),
            ActorMessage::CalibrationProgress {
                percent,
                stage_message,
            } => self.on_calibration_progress(percent, &stage_message),
            ActorMessage::CalibrationFinished => self.on_calibration_finished(),
            ActorMessage::SummaryDue { session_id } => self.on_summary_due(session_id),
            ActorMessage::Shutdown => self.on_shutdown(),
        }
    }

    pub fn on_engage(&mut self, at: Timestamp) -> Transition {
        let mut transition = Transition::default();
        match self.state {
            TrialState::Calibrating => {
                debug!("Engage ignored while calibrating");
            }
            TrialState::Ready => self.begin_waiting(&mut transition),
            TrialState::Waiting => {
                if let Some(handle) = self.scheduler.cancel_live() {
                    debug!("Premature engage cancelled stimulus {:?}", handle);
                }
                let count = self.session.note_too_soon();
                info!("Too soon ({count} in this waiting phase)");
                self.enter(&mut transition, TrialState::TooSoon, TOO_SOON_MESSAGE);
            }
            TrialState::Stimulus => self.record_response(&mut transition, at),
            TrialState::TooSoon => {
                self.enter(&mut transition, TrialState::Ready, READY_MESSAGE);
            }
            TrialState::Complete => {
                self.start_fresh_session(&mut transition);
            }
        }
        transition
    }

    /// Explicit restart request. Ignored while calibrating.
    pub fn on_reset(&mut self) -> Transition {
        let mut transition = Transition::default();
        if self.state == TrialState::Calibrating {
            debug!("Reset ignored while calibrating");
            return transition;
        }
        if let Some(handle) = self.scheduler.cancel_live() {
            debug!("Reset cancelled stimulus {:?}", handle);
        }
        self.timer.clear();
        self.start_fresh_session(&mut transition);
        transition
    }

    pub fn on_theme_toggle(&mut self) -> Transition {
        debug!("Theme toggle is presentation-only");
        Transition::default()
    }

    pub fn on_stimulus_fired(&mut self, handle: ScheduleHandle) -> Transition {
        let mut transition = Transition::default();
        if self.state != TrialState::Waiting {
            debug!("Stimulus {:?} fired in {} state; ignored", handle, self.state);
            return transition;
        }
        if !self.scheduler.claim(handle) {
            debug!("Stimulus {:?} was cancelled or already fired; ignored", handle);
            return transition;
        }

        let onset = self.timer.mark_stimulus_onset();
        debug!("Stimulus onset at {:.3}ms", onset.as_millis());
        self.enter(&mut transition, TrialState::Stimulus, STIMULUS_MESSAGE);
        transition
    }

    pub fn on_calibration_progress(&mut self, percent: u32, stage_message: &str) -> Transition {
        let mut transition = Transition::default();
        if self.state == TrialState::Calibrating {
            transition.renders.push(RenderInstruction::CalibrationProgress {
                percent,
                stage_message: stage_message.to_string(),
            });
        }
        transition
    }

    pub fn on_calibration_finished(&mut self) -> Transition {
        let mut transition = Transition::default();
        if self.state != TrialState::Calibrating {
            debug!("Duplicate calibration completion ignored");
            return transition;
        }
        transition.renders.push(RenderInstruction::DismissCalibration);
        transition.events.push(SystemEvent::lifecycle(
            LifecyclePhase::CalibrationEnd,
            None,
        ));
        self.render_session(&mut transition);
        self.enter(&mut transition, TrialState::Ready, READY_MESSAGE);
        transition
    }

    pub fn on_summary_due(&mut self, session_id: u64) -> Transition {
        let mut transition = Transition::default();
        if session_id != self.session_id || self.state != TrialState::Complete {
            debug!("Summary for session {session_id} no longer current; dropped");
            return transition;
        }
        let Some(stats) = self.stats() else {
            warn!("Complete state without latencies; no summary to show");
            return transition;
        };

        let summary = FinalSummary::for_average(stats.average);
        info!("Final summary: {}ms ({})", summary.average_ms, summary.label);
        transition.renders.push(RenderInstruction::FinalSummary {
            average_ms: summary.average_ms,
            label: summary.label.clone(),
        });
        transition
            .renders
            .push(RenderInstruction::state(TrialState::Complete, summary.message));
        transition.completed_session = Some(SessionRecord {
            session_id: self.session_id,
            latencies: self.session.latencies().to_vec(),
            too_soon_total: self.session.too_soon_total(),
            best_ms: stats.best,
            average_ms: stats.average,
            label: summary.label,
            completed_at: Utc::now(),
        });
        transition
    }

    pub fn on_shutdown(&mut self) -> Transition {
        if let Some(handle) = self.scheduler.cancel_live() {
            debug!("Shutdown cancelled stimulus {:?}", handle);
        }
        let mut transition = Transition::default();
        transition
            .events
            .push(SystemEvent::lifecycle(LifecyclePhase::Shutdown, None));
        transition
    }

    fn begin_waiting(&mut self, transition: &mut Transition) {
        self.session.begin_waiting();
        if let Some(stale) = self.scheduler.cancel_live() {
            warn!("Stale stimulus {:?} cancelled before re-arming", stale);
        }
        match self.scheduler.arm() {
            Ok(armed) => {
                debug!("Waiting {:.1}ms for stimulus {:?}", armed.delay_ms, armed.handle);
                self.enter(transition, TrialState::Waiting, WAITING_MESSAGE);
            }
            Err(err) => {
                error!("Unable to arm stimulus: {err}");
            }
        }
    }

    fn record_response(&mut self, transition: &mut Transition, at: Timestamp) {
        let sample = self.timer.record_response(at).unwrap_or_else(|err| {
            error!("{err}; substituting default latency");
            compute_latency(Timestamp::from_millis(f64::NAN), at, &self.config)
        });
        transition.events.push(SystemEvent::latency(sample));

        if let Err(err) = self.session.record(sample.corrected_ms) {
            error!("Latency {}ms not recorded: {err}", sample.corrected_ms);
        }
        transition.renders.push(RenderInstruction::Latency {
            ms: sample.corrected_ms,
        });
        self.render_session(transition);

        if self.session.is_complete() {
            self.enter(transition, TrialState::Complete, COMPLETE_MESSAGE);
            transition.follow_up = Some(FollowUp::Summary {
                session_id: self.session_id,
                after: self.config.post_trial_delay(),
            });
        } else {
            self.enter(transition, TrialState::Ready, CONTINUE_MESSAGE);
        }
    }

    fn start_fresh_session(&mut self, transition: &mut Transition) {
        self.session.reset();
        self.session_id += 1;
        transition.events.push(SystemEvent::lifecycle(
            LifecyclePhase::SessionReset,
            Some(format!("session {}", self.session_id)),
        ));
        self.render_session(transition);
        self.enter(transition, TrialState::Ready, READY_MESSAGE);
    }

    fn render_session(&self, transition: &mut Transition) {
        let (filled, total) = history(self.session.latencies(), self.config.max_attempts);
        transition.renders.push(RenderInstruction::Stats(self.stats()));
        transition
            .renders
            .push(RenderInstruction::History { filled, total });
    }

    fn enter(&mut self, transition: &mut Transition, to: TrialState, message: &str) {
        let from = self.state;
        self.state = to;
        info!("{from} -> {to}");
        transition.renders.push(RenderInstruction::state(to, message));
        transition.events.push(SystemEvent::transition(from, to));
    }
}
