use std::{env, io, sync::mpsc};

use anyhow::Result;
use clap::Parser;
use futures::StreamExt;
use reflex_ops::{init_tracing, SessionLog};
use reflex_orchestrator::{Orchestrator, SessionRunner};
use reflex_timer::MonotonicClock;
use reflex_types::{
    config::ReflexConfig,
    events::{EventPayload, SystemEvent},
};
use tracing::{info, warn};

mod console;
mod ui;

const DEFAULT_CONFIG_PATH: &str = "configs/default.toml";

#[derive(Debug, Parser)]
#[command(name = "reflex", about = "Visual reaction-time trainer")]
struct Args {
    /// TOML config file. Falls back to REFLEX_CONFIG, then configs/default.toml.
    #[arg(long)]
    config: Option<String>,
    /// Plain line mode: Enter engages, r resets, t toggles theme, q quits.
    #[arg(long)]
    headless: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config);
    if let Err(err) = init_tracing(&config.ops) {
        eprintln!("Logging disabled: {err}");
    }
    let log = SessionLog::from_config(&config.ops);
    let clock = MonotonicClock::new();

    if args.headless {
        run_headless(config, log, clock).await
    } else {
        run_tui(config, log, clock).await
    }
}

async fn run_tui(config: ReflexConfig, log: SessionLog, clock: MonotonicClock) -> Result<()> {
    let (ui_tx, ui_rx) = mpsc::channel();
    let mut feed = log.subscribe();
    let mut orchestrator = Orchestrator::new(
        &config,
        ui::TuiPresenter::new(ui_tx.clone()),
        clock,
        log.clone(),
    );
    let input = orchestrator.input();
    log.record_event(SystemEvent::ops("terminal presenter attached", &["cli", "tui"]))
        .await?;

    let forwarder = tokio::spawn(async move {
        while let Some(event) = feed.next().await {
            if ui_tx.send(ui::UiMessage::Event(event)).is_err() {
                break;
            }
        }
    });
    let actor = tokio::spawn(async move { orchestrator.run().await });

    let summary = config_summary(&config);
    let ui_input = input.clone();
    let ui_result =
        tokio::task::spawn_blocking(move || ui::run(ui_rx, ui_input, summary)).await?;

    if input.shutdown().is_err() {
        warn!("Trial actor already stopped");
    }
    actor.await??;
    forwarder.abort();
    ui_result
}

async fn run_headless(config: ReflexConfig, log: SessionLog, clock: MonotonicClock) -> Result<()> {
    let mut feed = log.subscribe();
    let mut orchestrator = Orchestrator::new(
        &config,
        console::ConsolePresenter::new(io::stdout()),
        clock,
        log.clone(),
    );
    log.record_event(SystemEvent::ops("console presenter attached", &["cli", "headless"]))
        .await?;

    let printer = tokio::spawn(async move {
        while let Some(event) = feed.next().await {
            if let EventPayload::Session(record) = &event.payload {
                match serde_json::to_string(record) {
                    Ok(json) => println!("session {json}"),
                    Err(err) => warn!("Failed to serialize session record: {err}"),
                }
            }
        }
    });

    println!("{}", config_summary(&config));
    console::spawn_stdin_reader(orchestrator.input());
    orchestrator.run().await?;
    printer.abort();
    info!("Headless session finished");
    Ok(())
}

fn config_summary(config: &ReflexConfig) -> String {
    let protocol = &config.protocol;
    format!(
        "{} attempts, stimulus after {}-{} ms, correction {} ms",
        protocol.max_attempts,
        protocol.min_delay_ms,
        protocol.max_delay_ms(),
        protocol.correction_ms
    )
}

fn load_config(from_args: Option<String>) -> ReflexConfig {
    let from_env = env::var("REFLEX_CONFIG").ok();
    let path = from_args
        .or(from_env)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.into());
    match ReflexConfig::from_file(&path) {
        Ok(cfg) => {
            if let Err(err) = cfg.validate() {
                eprintln!("Invalid config in '{path}': {err}. Falling back to internal defaults.");
                ReflexConfig::default()
            } else {
                cfg
            }
        }
        Err(err) => {
            eprintln!("Failed to load config from '{path}': {err}. Falling back to internal defaults.");
            ReflexConfig::default()
        }
    }
}
