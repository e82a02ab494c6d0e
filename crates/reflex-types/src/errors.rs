use thiserror::Error;

use crate::events::EventKind;

pub type Result<T, E = ReflexError> = std::result::Result<T, E>;

/// Unified error type covering common failure scenarios across subsystems.
#[derive(Debug, Error)]
pub enum ReflexError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("scheduler error: {0}")]
    Scheduler(String),
    #[error("timer error: {0}")]
    Timer(String),
    #[error("calibration error: {0}")]
    Calibration(String),
    #[error("orchestrator error: {0}")]
    Orchestrator(String),
    #[error("presentation error: {0}")]
    Presentation(String),
    #[error("operational error: {0}")]
    Ops(String),
    /// A caller broke a component contract (double arm, response without onset, ...).
    #[error("contract violation: {0}")]
    ContractViolation(String),
    #[error("invalid event stream: {0:?}")]
    Event(EventKind),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReflexError {
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, ReflexError::ContractViolation(_))
    }
}
