use std::sync::{Arc, Mutex};

use reflex_types::{
    render::RenderInstruction, session::StatsSnapshot, state::TrialState, ReflexError, Result,
};

/// Presentation seam. The core only ever calls these hooks.
pub trait Presenter: Send {
    fn render_state(&mut self, state: TrialState, message: &str) -> Result<()>;
    fn render_stats(&mut self, snapshot: Option<&StatsSnapshot>) -> Result<()>;
    fn render_history(&mut self, filled: usize, total: usize) -> Result<()>;
    fn render_calibration_progress(&mut self, percent: u32, stage_message: &str) -> Result<()>;
    fn render_final_summary(&mut self, average_ms: u32, label: &str) -> Result<()>;

    fn render_latency(&mut self, _ms: u32) -> Result<()> {
        Ok(())
    }

    fn dismiss_calibration(&mut self) -> Result<()> {
        Ok(())
    }

    fn apply(&mut self, instruction: &RenderInstruction) -> Result<()> {
        match instruction {
            RenderInstruction::State { state, message } => self.render_state(*state, message),
            RenderInstruction::Stats(snapshot) => self.render_stats(snapshot.as_ref()),
            RenderInstruction::History { filled, total } => self.render_history(*filled, *total),
            RenderInstruction::CalibrationProgress {
                percent,
                stage_message,
            } => self.render_calibration_progress(*percent, stage_message),
            RenderInstruction::DismissCalibration => self.dismiss_calibration(),
            RenderInstruction::Latency { ms } => self.render_latency(*ms),
            RenderInstruction::FinalSummary { average_ms, label } => {
                self.render_final_summary(*average_ms, label)
            }
        }
    }
}

/// Presenter that keeps every instruction it is asked to render. Clones share the record.
#[derive(Debug, Clone, Default)]
pub struct RecordingPresenter {
    rendered: Arc<Mutex<Vec<RenderInstruction>>>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rendered(&self) -> Vec<RenderInstruction> {
        self.rendered.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn last_state(&self) -> Option<(TrialState, String)> {
        self.rendered().into_iter().rev().find_map(|instr| match instr {
            RenderInstruction::State { state, message } => Some((state, message)),
            _ => None,
        })
    }

    fn push(&mut self, instruction: RenderInstruction) -> Result<()> {
        self.rendered
            .lock()
            .map_err(|_| presentation_error("recording presenter poisoned"))?
            .push(instruction);
        Ok(())
    }
}

impl Presenter for RecordingPresenter {
    fn render_state(&mut self, state: TrialState, message: &str) -> Result<()> {
        self.push(RenderInstruction::state(state, message))
    }

    fn render_stats(&mut self, snapshot: Option<&StatsSnapshot>) -> Result<()> {
        self.push(RenderInstruction::Stats(snapshot.copied()))
    }

    fn render_history(&mut self, filled: usize, total: usize) -> Result<()> {
        self.push(RenderInstruction::History { filled, total })
    }

    fn render_calibration_progress(&mut self, percent: u32, stage_message: &str) -> Result<()> {
        self.push(RenderInstruction::CalibrationProgress {
            percent,
            stage_message: stage_message.to_string(),
        })
    }

    fn render_final_summary(&mut self, average_ms: u32, label: &str) -> Result<()> {
        self.push(RenderInstruction::FinalSummary {
            average_ms,
            label: label.to_string(),
        })
    }

    fn render_latency(&mut self, ms: u32) -> Result<()> {
        self.push(RenderInstruction::Latency { ms })
    }

    fn dismiss_calibration(&mut self) -> Result<()> {
        self.push(RenderInstruction::DismissCalibration)
    }
}

pub fn presentation_error(message: impl Into<String>) -> ReflexError {
    ReflexError::Presentation(message.into())
}
