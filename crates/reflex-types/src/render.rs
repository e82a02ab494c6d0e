use serde::{Deserialize, Serialize};

use crate::{session::StatsSnapshot, state::TrialState};

/// Declarative output of the trial machine, applied by a presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderInstruction {
    State {
        state: TrialState,
        message: String,
    },
    /// `None` hides the statistics panel.
    Stats(Option<StatsSnapshot>),
    History {
        filled: usize,
        total: usize,
    },
    CalibrationProgress {
        percent: u32,
        stage_message: String,
    },
    DismissCalibration,
    Latency {
        ms: u32,
    },
    FinalSummary {
        average_ms: u32,
        label: String,
    },
}

impl RenderInstruction {
    pub fn state(state: TrialState, message: impl Into<String>) -> Self {
        RenderInstruction::State {
            state,
            message: message.into(),
        }
    }
}
