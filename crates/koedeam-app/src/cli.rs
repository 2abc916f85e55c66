//! CLI argument definitions for the Koedeam voice tools.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use koedeam_voice::ReplayMode;

/// Koedeam: dictation session tooling for the note editor.
#[derive(Parser, Debug)]
#[command(name = "koedeam", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play a recorded engine script through the session manager.
    Replay {
        /// Fixture JSON with `id`, `expectedText` and `events`.
        #[arg(short = 'f', long = "fixture")]
        fixture: PathBuf,

        /// `fast` delivers each run at once, `realtime` honours `atMs`.
        #[arg(short = 'm', long = "mode", default_value = "fast")]
        mode: ReplayMode,

        /// Write the telemetry export. Without a path it goes to
        /// `<data_dir>/telemetry/<fixture id>.json`.
        #[arg(short = 'e', long = "export", num_args = 0..=1)]
        export: Option<Option<PathBuf>>,

        /// Initial note text. The caret starts at its end.
        #[arg(short = 't', long = "text", default_value = "")]
        text: String,
    },
    /// Inspect the configuration.
    Config {
        /// Print the effective configuration as TOML.
        #[arg(long = "print")]
        print: bool,
    },
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > KOEDEAM_CONFIG env var > ~/.koedeam/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("KOEDEAM_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the log filter.
    ///
    /// Priority: --log-level flag > KOEDEAM_LOG env var > config file value > info.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        if let Some(ref level) = self.log_level {
            return level.clone();
        }
        if let Ok(level) = std::env::var("KOEDEAM_LOG") {
            if !level.is_empty() {
                return level;
            }
        }
        if !config_level.is_empty() {
            return config_level.to_string();
        }
        "info".to_string()
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    home_dir()
        .map(|home| home.join(".koedeam").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("config.toml"))
}

fn home_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    let var = "USERPROFILE";
    #[cfg(not(target_os = "windows"))]
    let var = "HOME";
    std::env::var(var).ok().map(PathBuf::from)
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        if let Some(home) = home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
