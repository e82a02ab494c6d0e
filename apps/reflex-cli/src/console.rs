//! Line-oriented presenter and stdin input for `--headless` runs.

use std::{
    io::{self, BufRead, Write},
    thread,
};

use reflex_orchestrator::{presentation_error, InputHandle, Presenter};
use reflex_timer::Clock;
use reflex_types::{session::StatsSnapshot, state::TrialState, Result};
use tracing::{debug, warn};

pub struct ConsolePresenter<W: Write + Send> {
    out: W,
    last_stage: Option<String>,
}

impl<W: Write + Send> ConsolePresenter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            last_stage: None,
        }
    }

    fn line(&mut self, text: &str) -> Result<()> {
        writeln!(self.out, "{text}")
            .and_then(|_| self.out.flush())
            .map_err(|err| presentation_error(format!("console write failed: {err}")))
    }
}

impl<W: Write + Send> Presenter for ConsolePresenter<W> {
    fn render_state(&mut self, state: TrialState, message: &str) -> Result<()> {
        self.line(&format!("[{state}] {message}"))
    }

    fn render_stats(&mut self, snapshot: Option<&StatsSnapshot>) -> Result<()> {
        self.line(&stats_line(snapshot))
    }

    fn render_history(&mut self, filled: usize, total: usize) -> Result<()> {
        self.line(&format!("history {}", history_glyphs(filled, total)))
    }

    /// Prints only when the stage changes.
    fn render_calibration_progress(&mut self, percent: u32, stage_message: &str) -> Result<()> {
        if self.last_stage.as_deref() == Some(stage_message) {
            return Ok(());
        }
        self.last_stage = Some(stage_message.to_string());
        self.line(&format!("calibration {percent:>3}% {stage_message}"))
    }

    fn render_final_summary(&mut self, average_ms: u32, label: &str) -> Result<()> {
        self.line(&format!("summary {average_ms} ms ({label})"))
    }

    fn render_latency(&mut self, ms: u32) -> Result<()> {
        self.line(&format!("{ms} ms"))
    }

    fn dismiss_calibration(&mut self) -> Result<()> {
        self.last_stage = None;
        Ok(())
    }
}

pub fn stats_line(snapshot: Option<&StatsSnapshot>) -> String {
    match snapshot {
        Some(stats) => format!(
            "best {} ms | average {} ms | attempts {}",
            stats.best,
            stats.average,
            stats.attempts_label()
        ),
        None => "best -- | average -- | attempts --".to_string(),
    }
}

/// One glyph per attempt slot, filled slots first.
pub fn history_glyphs(filled: usize, total: usize) -> String {
    let filled = filled.min(total);
    let mut glyphs = "●".repeat(filled);
    glyphs.push_str(&"○".repeat(total - filled));
    glyphs
}

/// Reads commands from stdin on a plain thread until `q` or end of input.
pub fn spawn_stdin_reader<C: Clock + 'static>(input: InputHandle<C>) {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let sent = match line.trim() {
                "" => input.engage(),
                "r" => input.reset(),
                "t" => input.toggle_theme(),
                "q" => break,
                other => {
                    debug!("Ignoring console command {other:?}");
                    Ok(())
                }
            };
            if sent.is_err() {
                return;
            }
        }
        if input.shutdown().is_err() {
            warn!("Trial actor already stopped");
        }
    });
}
