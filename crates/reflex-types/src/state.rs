use std::fmt;

use serde::{Deserialize, Serialize};

/// Protocol state of the trial machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrialState {
    Calibrating,
    Ready,
    Waiting,
    Stimulus,
    TooSoon,
    Complete,
}

impl TrialState {
    /// Name handed to the presentation layer.
    pub fn name(self) -> &'static str {
        match self {
            TrialState::Calibrating => "calibrating",
            TrialState::Ready => "ready",
            TrialState::Waiting => "waiting",
            TrialState::Stimulus => "click-now",
            TrialState::TooSoon => "too-soon",
            TrialState::Complete => "complete",
        }
    }

    pub fn accepts_engage(self) -> bool {
        !matches!(self, TrialState::Calibrating)
    }
}

impl Default for TrialState {
    fn default() -> Self {
        TrialState::Calibrating
    }
}

impl fmt::Display for TrialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub const READY_MESSAGE: &str = "Click to start!";
pub const CONTINUE_MESSAGE: &str = "Click to keep going!";
pub const WAITING_MESSAGE: &str = "Wait for green...";
pub const STIMULUS_MESSAGE: &str = "CLICK NOW!";
pub const TOO_SOON_MESSAGE: &str = "Too soon! Click to try again.";
pub const COMPLETE_MESSAGE: &str = "Calculating your average...";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn machine_starts_calibrating() {
        assert_eq!(TrialState::default(), TrialState::Calibrating);
        assert!(!TrialState::Calibrating.accepts_engage());
        assert!(TrialState::Complete.accepts_engage());
    }

    #[test]
    fn display_uses_presentation_names() {
        assert_eq!(TrialState::Stimulus.to_string(), "click-now");
        assert_eq!(TrialState::TooSoon.to_string(), "too-soon");
    }
}
