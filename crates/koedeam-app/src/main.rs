//! Koedeam application binary - composition root.
//!
//! 1. Parse the CLI and load configuration from TOML
//! 2. Initialize tracing
//! 3. Run the requested subcommand:
//!    - `replay`: play a recorded engine script through the full voice
//!      session manager into an in-memory note
//!    - `config`: print the effective configuration

mod cli;

use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast;

use koedeam_core::config::KoedeamConfig;
use koedeam_voice::{
    driver_channel, CueError, DriverInput, LazyCue, ReplayEngine, ReplayFixture, ReplayMode,
    SessionDriver, StartCue, SystemClock, TextBuffer, UserCommand, VoiceNotice,
    VoiceSessionManager,
};

use cli::{CliArgs, Command};

/// Rings the terminal bell on stderr.
struct TerminalBell;

impl StartCue for TerminalBell {
    fn play(&mut self) -> Result<(), CueError> {
        let mut stderr = std::io::stderr();
        stderr
            .write_all(b"\x07")
            .and_then(|_| stderr.flush())
            .map_err(|e| CueError::Playback(e.to_string()))
    }
}

fn terminal_bell() -> LazyCue {
    LazyCue::new(|| {
        if std::io::stderr().is_terminal() {
            Ok(Box::new(TerminalBell) as Box<dyn StartCue>)
        } else {
            Err(CueError::Unavailable("stderr is not a terminal".to_string()))
        }
    })
}

/// Log notices until the manager is dropped.
async fn log_notices(mut notices: broadcast::Receiver<VoiceNotice>) {
    loop {
        match notices.recv().await {
            Ok(VoiceNotice::Failure { message }) => tracing::warn!("{}", message),
            Ok(VoiceNotice::StatusChanged { state }) => tracing::debug!(state = %state, "Status"),
            Ok(VoiceNotice::CandidatesShown { candidates }) => {
                tracing::info!(count = candidates.len(), "Candidates shown")
            }
            Ok(other) => tracing::trace!(notice = ?other, "Notice"),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::debug!(skipped = n, "Notice log lagged")
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

/// Load the config file if present, otherwise defaults.
///
/// A file that exists but does not parse is an error.
fn load_config(path: &Path) -> koedeam_core::Result<(KoedeamConfig, bool)> {
    if path.exists() {
        Ok((KoedeamConfig::load(path)?, true))
    } else {
        Ok((KoedeamConfig::default(), false))
    }
}

async fn run_replay(
    config: &KoedeamConfig,
    fixture_path: &Path,
    mode: ReplayMode,
    export: Option<Option<PathBuf>>,
    initial_text: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let fixture = ReplayFixture::load(fixture_path)?;
    tracing::info!(
        id = %fixture.id,
        events = fixture.events.len(),
        mode = %mode,
        "Replaying fixture"
    );

    let (tx, rx) = driver_channel();
    let engine = ReplayEngine::new(&fixture, mode, tx.clone());
    let host = TextBuffer::new(initial_text).with_focus(true);
    let manager = VoiceSessionManager::new(engine, host, config, Arc::new(SystemClock::new()))
        .with_cue(terminal_bell());
    let notice_task = tokio::spawn(log_notices(manager.subscribe()));

    let mut driver = SessionDriver::new(manager, rx);
    tx.send(DriverInput::User(UserCommand::Start))?;
    driver.run_until_idle().await;

    let manager = driver.into_manager();
    let snapshot = manager.export_snapshot();
    tracing::info!(
        sessions = manager.telemetry().session_count(),
        events = manager.telemetry().event_count(),
        "Replay finished"
    );
    let text = manager.into_host().into_text();
    let _ = notice_task.await;

    println!("{}", text);

    if let Some(target) = export {
        let path = target.unwrap_or_else(|| {
            cli::expand_home(&config.general.data_dir)
                .join("telemetry")
                .join(format!("{}.json", fixture.id))
        });
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, snapshot.to_json_pretty()?)?;
        tracing::info!(path = %path.display(), "Telemetry exported");
    }

    if !fixture.expected_text.is_empty() && text != fixture.expected_text {
        tracing::error!(expected = %fixture.expected_text, actual = %text, "Replay output differs");
        return Err(format!("replay {} did not produce the expected text", fixture.id).into());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let (config, from_file) = load_config(&config_file)?;

    // Tracing.
    let level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("Starting Koedeam v{}", env!("CARGO_PKG_VERSION"));
    if from_file {
        tracing::debug!(path = %config_file.display(), "Configuration loaded");
    } else {
        tracing::debug!(path = %config_file.display(), "No config file, using defaults");
    }
    config.validate()?;

    match args.command {
        Command::Replay {
            fixture,
            mode,
            export,
            text,
        } => run_replay(&config, &fixture, mode, export, text).await,
        Command::Config { print } => {
            if print {
                print!("{}", toml::to_string_pretty(&config)?);
            } else {
                println!("{}", config_file.display());
            }
            Ok(())
        }
    }
}
