//! Operational helpers: logging setup, in-memory event log, live event feed.

use std::{collections::VecDeque, fs::OpenOptions, sync::Arc};

use futures::{stream::BoxStream, StreamExt};
use reflex_types::{
    config::OpsConfig, events::SystemEvent, telemetry::SessionRecord, ReflexError, Result,
};
use tokio::sync::{broadcast, Mutex};
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

pub fn init_tracing(config: &OpsConfig) -> Result<()> {
    let filter = EnvFilter::try_new(config.log_level.clone())
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|err| ReflexError::Ops(format!("failed to create log filter: {err}")))?;

    let builder = fmt().with_env_filter(filter);
    let installed = match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|err| ReflexError::Ops(format!("failed to open log file {path}: {err}")))?;
            builder
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    installed.map_err(|err| ReflexError::Ops(format!("tracing init error: {err}")))?;
    Ok(())
}

#[derive(Default)]
struct LogState {
    events: VecDeque<SystemEvent>,
    sessions: Vec<SessionRecord>,
}

/// Bounded in-memory event log with a broadcast feed. Nothing is written to disk.
#[derive(Clone)]
pub struct SessionLog {
    state: Arc<Mutex<LogState>>,
    feed: broadcast::Sender<SystemEvent>,
    capacity: usize,
}

impl SessionLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (feed, _) = broadcast::channel(capacity);
        Self {
            state: Arc::new(Mutex::new(LogState::default())),
            feed,
            capacity,
        }
    }

    pub fn from_config(config: &OpsConfig) -> Self {
        Self::new(config.event_log_capacity)
    }

    pub async fn record_event(&self, event: SystemEvent) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.events.len() == self.capacity {
            state.events.pop_front();
        }
        state.events.push_back(event.clone());
        drop(state);
        let _ = self.feed.send(event);
        Ok(())
    }

    pub async fn record_session(&self, record: SessionRecord) -> Result<()> {
        info!(
            "Session {} complete: average {}ms ({})",
            record.session_id, record.average_ms, record.label
        );
        self.state.lock().await.sessions.push(record.clone());
        self.record_event(SystemEvent::session(record)).await
    }

    pub async fn snapshot_events(&self) -> Vec<SystemEvent> {
        self.state.lock().await.events.iter().cloned().collect()
    }

    pub async fn sessions(&self) -> Vec<SessionRecord> {
        self.state.lock().await.sessions.clone()
    }

    /// Live feed of events recorded after subscription. Lagged items are skipped.
    pub fn subscribe(&self) -> BoxStream<'static, SystemEvent> {
        BroadcastStream::new(self.feed.subscribe())
            .filter_map(|event| async move { event.ok() })
            .boxed()
    }
}
