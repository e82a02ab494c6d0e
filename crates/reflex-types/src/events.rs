use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    state::TrialState,
    telemetry::{LatencySample, SessionRecord},
    time::Timestamp,
};

/// Opaque token for one armed stimulus schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScheduleHandle(pub u64);

/// User input consumed by the trial machine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum InputEvent {
    Engage { at: Timestamp },
    Reset,
    ThemeToggle,
}

/// Everything the actor loop receives, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum ActorMessage {
    Input(InputEvent),
    StimulusFired(ScheduleHandle),
    CalibrationProgress {
        percent: u32,
        stage_message: String,
    },
    CalibrationFinished,
    SummaryDue {
        session_id: u64,
    },
    Shutdown,
}

/// High-level event kinds moving through the ops log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Lifecycle,
    Transition,
    Latency,
    Session,
    Ops,
}

/// Immutable event envelope for logging and replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemEvent {
    pub id: Uuid,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Lifecycle(LifecycleEvent),
    Transition(TransitionEvent),
    Latency(LatencySample),
    Session(SessionRecord),
    Ops(OpsEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub phase: LifecyclePhase,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LifecyclePhase {
    Boot,
    CalibrationStart,
    CalibrationEnd,
    SessionReset,
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub from: TrialState,
    pub to: TrialState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsEvent {
    pub message: String,
    pub tags: Vec<String>,
}

impl SystemEvent {
    pub fn new(kind: EventKind, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn lifecycle(phase: LifecyclePhase, details: Option<String>) -> Self {
        Self::new(
            EventKind::Lifecycle,
            EventPayload::Lifecycle(LifecycleEvent { phase, details }),
        )
    }

    pub fn transition(from: TrialState, to: TrialState) -> Self {
        Self::new(
            EventKind::Transition,
            EventPayload::Transition(TransitionEvent { from, to }),
        )
    }

    pub fn latency(sample: LatencySample) -> Self {
        Self::new(EventKind::Latency, EventPayload::Latency(sample))
    }

    pub fn session(record: SessionRecord) -> Self {
        Self::new(EventKind::Session, EventPayload::Session(record))
    }

    pub fn ops(message: impl Into<String>, tags: &[&str]) -> Self {
        Self::new(
            EventKind::Ops,
            EventPayload::Ops(OpsEvent {
                message: message.into(),
                tags: tags.iter().map(|tag| tag.to_string()).collect(),
            }),
        )
    }
}
