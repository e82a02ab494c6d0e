use std::{
    collections::VecDeque,
    sync::mpsc::{Receiver, Sender, TryRecvError},
    time::Duration,
};

use anyhow::Result;
use crossterm::{
    event::{self, Event as CEvent, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, List, ListItem, Paragraph, Wrap},
    Frame, Terminal,
};
use reflex_orchestrator::{presentation_error, InputHandle, Presenter};
use reflex_timer::Clock;
use reflex_types::{
    events::{EventPayload, SystemEvent},
    render::RenderInstruction,
    session::StatsSnapshot,
    state::TrialState,
    Result as ReflexResult,
};
use tracing::warn;

use crate::console::{history_glyphs, stats_line};

const MAX_LOG_ENTRIES: usize = 120;
const FRAME_POLL: Duration = Duration::from_millis(16);

pub enum UiMessage {
    Render(RenderInstruction),
    Event(SystemEvent),
}

/// Forwards render instructions to the terminal thread.
pub struct TuiPresenter {
    tx: Sender<UiMessage>,
}

impl TuiPresenter {
    pub fn new(tx: Sender<UiMessage>) -> Self {
        Self { tx }
    }

    fn forward(&mut self, instruction: RenderInstruction) -> ReflexResult<()> {
        self.tx
            .send(UiMessage::Render(instruction))
            .map_err(|_| presentation_error("terminal ui closed"))
    }
}

impl Presenter for TuiPresenter {
    fn render_state(&mut self, state: TrialState, message: &str) -> ReflexResult<()> {
        self.forward(RenderInstruction::state(state, message))
    }

    fn render_stats(&mut self, snapshot: Option<&StatsSnapshot>) -> ReflexResult<()> {
        self.forward(RenderInstruction::Stats(snapshot.copied()))
    }

    fn render_history(&mut self, filled: usize, total: usize) -> ReflexResult<()> {
        self.forward(RenderInstruction::History { filled, total })
    }

    fn render_calibration_progress(
        &mut self,
        percent: u32,
        stage_message: &str,
    ) -> ReflexResult<()> {
        self.forward(RenderInstruction::CalibrationProgress {
            percent,
            stage_message: stage_message.to_string(),
        })
    }

    fn render_final_summary(&mut self, average_ms: u32, label: &str) -> ReflexResult<()> {
        self.forward(RenderInstruction::FinalSummary {
            average_ms,
            label: label.to_string(),
        })
    }

    fn render_latency(&mut self, ms: u32) -> ReflexResult<()> {
        self.forward(RenderInstruction::Latency { ms })
    }

    fn dismiss_calibration(&mut self) -> ReflexResult<()> {
        self.forward(RenderInstruction::DismissCalibration)
    }
}

/// Everything the terminal draws, rebuilt from render instructions.
#[derive(Debug, Clone)]
pub struct UiModel {
    calibration: Option<(u32, String)>,
    state: TrialState,
    message: String,
    stats: Option<StatsSnapshot>,
    history: (usize, usize),
    latency: Option<u32>,
    summary: Option<(u32, String)>,
    dark: bool,
    logs: VecDeque<String>,
}

impl Default for UiModel {
    fn default() -> Self {
        Self {
            calibration: Some((0, String::new())),
            state: TrialState::Calibrating,
            message: String::new(),
            stats: None,
            history: (0, 0),
            latency: None,
            summary: None,
            dark: true,
            logs: VecDeque::with_capacity(MAX_LOG_ENTRIES),
        }
    }
}

impl UiModel {
    pub fn apply(&mut self, instruction: RenderInstruction) {
        match instruction {
            RenderInstruction::State { state, message } => {
                if matches!(state, TrialState::Waiting | TrialState::Ready) {
                    self.summary = None;
                }
                if state == TrialState::Waiting {
                    self.latency = None;
                }
                self.state = state;
                self.message = message;
            }
            RenderInstruction::Stats(snapshot) => self.stats = snapshot,
            RenderInstruction::History { filled, total } => self.history = (filled, total),
            RenderInstruction::CalibrationProgress {
                percent,
                stage_message,
            } => self.calibration = Some((percent, stage_message)),
            RenderInstruction::DismissCalibration => self.calibration = None,
            RenderInstruction::Latency { ms } => self.latency = Some(ms),
            RenderInstruction::FinalSummary { average_ms, label } => {
                self.summary = Some((average_ms, label))
            }
        }
    }

    pub fn push_event(&mut self, event: &SystemEvent) {
        if self.logs.len() == MAX_LOG_ENTRIES {
            self.logs.pop_front();
        }
        self.logs.push_back(format_event(event));
    }

    pub fn toggle_theme(&mut self) {
        self.dark = !self.dark;
    }

    fn base_style(&self) -> Style {
        if self.dark {
            Style::default().fg(Color::White).bg(Color::Black)
        } else {
            Style::default().fg(Color::Black).bg(Color::White)
        }
    }
}

pub fn run<C: Clock>(receiver: Receiver<UiMessage>, input: InputHandle<C>, summary: String) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.hide_cursor()?;

    let res = run_loop(&mut terminal, receiver, &input, summary.as_str());

    terminal.show_cursor()?;
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    res
}

fn run_loop<B: Backend, C: Clock>(
    terminal: &mut Terminal<B>,
    receiver: Receiver<UiMessage>,
    input: &InputHandle<C>,
    summary: &str,
) -> Result<()> {
    let mut model = UiModel::default();

    loop {
        let mut receiver_closed = false;
        loop {
            match receiver.try_recv() {
                Ok(UiMessage::Render(instruction)) => model.apply(instruction),
                Ok(UiMessage::Event(event)) => model.push_event(&event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    receiver_closed = true;
                    break;
                }
            }
        }

        terminal.draw(|f| draw(f, &model, summary))?;

        if receiver_closed {
            break;
        }

        if event::poll(FRAME_POLL)? {
            if let CEvent::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                let sent = match key.code {
                    KeyCode::Char(' ') | KeyCode::Enter => input.engage(),
                    KeyCode::Char('r') => input.reset(),
                    KeyCode::Char('t') => {
                        model.toggle_theme();
                        input.toggle_theme()
                    }
                    KeyCode::Char('q') | KeyCode::Esc => break,
                    _ => Ok(()),
                };
                if let Err(err) = sent {
                    warn!("Input dropped: {err}");
                    break;
                }
            }
        }
    }

    Ok(())
}

fn draw(f: &mut Frame, model: &UiModel, summary: &str) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(3),
                Constraint::Min(7),
                Constraint::Length(3),
                Constraint::Length(8),
            ]
            .as_ref(),
        )
        .split(f.size());
    let base = model.base_style();

    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            "Reflex",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("  "),
        Span::raw(summary.to_string()),
        Span::raw("  "),
        Span::styled("space", Style::default().fg(Color::Yellow)),
        Span::raw(" engage  "),
        Span::styled("r", Style::default().fg(Color::Yellow)),
        Span::raw(" reset  "),
        Span::styled("t", Style::default().fg(Color::Yellow)),
        Span::raw(" theme  "),
        Span::styled("q", Style::default().fg(Color::Yellow)),
        Span::raw(" quit"),
    ]))
    .style(base)
    .block(Block::default().borders(Borders::ALL).title("Reaction test"));
    f.render_widget(header, chunks[0]);

    draw_stage(f, model, chunks[1]);

    let stats = Paragraph::new(Line::from(vec![
        Span::raw(stats_line(model.stats.as_ref())),
        Span::raw("   "),
        Span::styled(
            history_glyphs(model.history.0, model.history.1),
            Style::default().fg(Color::Green),
        ),
    ]))
    .style(base)
    .block(Block::default().borders(Borders::ALL).title("Statistics"));
    f.render_widget(stats, chunks[2]);

    let items: Vec<ListItem> = model
        .logs
        .iter()
        .rev()
        .map(|entry| ListItem::new(entry.clone()))
        .collect();
    let list = List::new(items)
        .style(base)
        .block(Block::default().borders(Borders::ALL).title("Recent events"));
    f.render_widget(list, chunks[3]);
}

fn draw_stage(f: &mut Frame, model: &UiModel, area: Rect) {
    if let Some((percent, stage)) = &model.calibration {
        let gauge = Gauge::default()
            .block(Block::default().borders(Borders::ALL).title("Calibrating"))
            .style(model.base_style())
            .gauge_style(Style::default().fg(Color::Cyan))
            .percent((*percent).min(100) as u16)
            .label(stage.clone());
        f.render_widget(gauge, area);
        return;
    }

    let mut lines = vec![Line::from(Span::styled(
        model.message.clone(),
        Style::default().add_modifier(Modifier::BOLD),
    ))];
    if let Some(ms) = model.latency {
        lines.push(Line::from(format!("{ms} ms")));
    }
    if let Some((average, label)) = &model.summary {
        lines.push(Line::from(format!("average {average} ms, {label}")));
    }

    let stage = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .style(
            Style::default()
                .fg(Color::Black)
                .bg(state_color(model.state, model.dark)),
        )
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(model.state.name()),
        );
    f.render_widget(stage, area);
}

pub fn state_color(state: TrialState, dark: bool) -> Color {
    match state {
        TrialState::Waiting => Color::Red,
        TrialState::Stimulus => Color::Green,
        TrialState::TooSoon => Color::Yellow,
        TrialState::Calibrating => Color::DarkGray,
        TrialState::Ready | TrialState::Complete if dark => Color::Blue,
        TrialState::Ready | TrialState::Complete => Color::LightBlue,
    }
}

fn format_event(event: &SystemEvent) -> String {
    let timestamp = event.timestamp.format("%H:%M:%S");
    match &event.payload {
        EventPayload::Lifecycle(lifecycle) => format!(
            "[{}] Lifecycle::{:?} {}",
            timestamp,
            lifecycle.phase,
            lifecycle.details.clone().unwrap_or_default()
        ),
        EventPayload::Transition(transition) => {
            format!("[{}] {} -> {}", timestamp, transition.from, transition.to)
        }
        EventPayload::Latency(sample) => format!(
            "[{}] Latency {} ms (raw {:.1}{})",
            timestamp,
            sample.corrected_ms,
            sample.raw_elapsed_ms,
            if sample.fallback { ", default" } else { "" }
        ),
        EventPayload::Session(record) => format!(
            "[{}] Session #{} average {} ms ({})",
            timestamp, record.session_id, record.average_ms, record.label
        ),
        EventPayload::Ops(ops) => format!(
            "[{}] Ops {} [{}]",
            timestamp,
            ops.message,
            ops.tags.join(", ")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reflex_types::telemetry::LatencySample;
    use std::sync::mpsc;

    #[test]
    fn model_follows_render_instructions() {
        let mut model = UiModel::default();
        model.apply(RenderInstruction::CalibrationProgress {
            percent: 40,
            stage_message: "Optimizing visual elements...".into(),
        });
        assert_eq!(model.calibration, Some((40, "Optimizing visual elements...".into())));

        model.apply(RenderInstruction::DismissCalibration);
        model.apply(RenderInstruction::state(TrialState::Stimulus, "CLICK NOW!"));
        model.apply(RenderInstruction::Latency { ms: 210 });
        assert!(model.calibration.is_none());
        assert_eq!(model.latency, Some(210));

        model.apply(RenderInstruction::state(TrialState::Waiting, "Wait for green..."));
        assert_eq!(model.latency, None);
        assert_eq!(model.state, TrialState::Waiting);
    }

    #[test]
    fn ready_clears_a_shown_summary() {
        let mut model = UiModel::default();
        model.apply(RenderInstruction::FinalSummary {
            average_ms: 210,
            label: "very good".into(),
        });
        assert!(model.summary.is_some());
        model.apply(RenderInstruction::state(TrialState::Ready, "Click to start!"));
        assert!(model.summary.is_none());
    }

    #[test]
    fn event_log_is_bounded() {
        let mut model = UiModel::default();
        let event = SystemEvent::latency(LatencySample {
            raw_elapsed_ms: 260.0,
            corrected_ms: 210,
            fallback: false,
        });
        for _ in 0..MAX_LOG_ENTRIES + 5 {
            model.push_event(&event);
        }
        assert_eq!(model.logs.len(), MAX_LOG_ENTRIES);
        assert!(model.logs[0].ends_with("Latency 210 ms (raw 260.0)"));
    }

    #[test]
    fn theme_only_recolors_idle_states() {
        assert_eq!(state_color(TrialState::Ready, true), Color::Blue);
        assert_eq!(state_color(TrialState::Ready, false), Color::LightBlue);
        assert_eq!(state_color(TrialState::Stimulus, false), Color::Green);
    }

    #[test]
    fn presenter_forwards_instructions() {
        let (tx, rx) = mpsc::channel();
        let mut presenter = TuiPresenter::new(tx);
        presenter.apply(&RenderInstruction::Latency { ms: 180 }).unwrap();
        match rx.try_recv() {
            Ok(UiMessage::Render(instruction)) => {
                assert_eq!(instruction, RenderInstruction::Latency { ms: 180 })
            }
            _ => panic!("expected a forwarded render"),
        }
        drop(rx);
        assert!(presenter.render_latency(200).is_err());
    }
}
