use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{KoedeamError, Result};
use crate::types::{EvalSpec, IdleBehavior, InsertMode, NoConfidenceRule};

/// Top-level configuration for the Koedeam note editor.
///
/// Loaded from `~/.koedeam/config.toml` by default. Only the sections the
/// voice subsystem reads live here; fonts, toolbars and share shortcuts are
/// owned by the editor shell.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KoedeamConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl KoedeamConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: KoedeamConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject values the voice subsystem cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.voice.validate()?;
        if self.telemetry.max_events == 0 || self.telemetry.max_sessions == 0 {
            return Err(KoedeamError::Config(
                "telemetry capacities must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory for drafts and exported telemetry.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.koedeam/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Voice dictation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Where committed transcripts are inserted.
    pub insert_mode: InsertMode,
    /// Keep the engine listening across utterances.
    pub continuous: bool,
    /// BCP-47 language tag, or "auto" for the engine default.
    pub language: String,
    /// Ask the engine for interim results.
    pub interim_results: bool,
    /// Top-candidate confidence below which the candidate panel is shown.
    pub candidate_threshold: f64,
    /// Handling of a top candidate without confidence.
    pub no_confidence_rule: NoConfidenceRule,
    /// Whether an open candidate panel commits on its own.
    pub idle_behavior: IdleBehavior,
    /// Idle timeout before auto-commit, in milliseconds.
    pub idle_ms: u64,
    /// Play a short cue when the engine confirms start.
    pub start_cue: bool,
    /// Expected output used to score the next sessions.
    pub eval_spec: Option<EvalSpec>,
    /// Give up the automatic restart chain after this many attempts.
    /// Unset means retry until the guard fails or a fatal error occurs.
    pub max_restart_attempts: Option<u32>,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            insert_mode: InsertMode::Cursor,
            continuous: false,
            language: "ja-JP".to_string(),
            interim_results: true,
            candidate_threshold: 0.65,
            no_confidence_rule: NoConfidenceRule::Show,
            idle_behavior: IdleBehavior::Auto,
            idle_ms: 3500,
            start_cue: true,
            eval_spec: None,
            max_restart_attempts: None,
        }
    }
}

impl VoiceConfig {
    /// Reject out-of-range voice settings.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.candidate_threshold) {
            return Err(KoedeamError::Config(format!(
                "candidate_threshold must be within 0.0..=1.0, got {}",
                self.candidate_threshold
            )));
        }
        if self.idle_ms == 0 {
            return Err(KoedeamError::Config(
                "idle_ms must be greater than zero".to_string(),
            ));
        }
        if self.language.trim().is_empty() {
            return Err(KoedeamError::Config("language must not be empty".to_string()));
        }
        Ok(())
    }

    /// Whether switching from `self` to `other` requires a fresh engine session.
    pub fn needs_engine_restart(&self, other: &VoiceConfig) -> bool {
        self.language != other.language
            || self.continuous != other.continuous
            || self.interim_results != other.interim_results
    }
}

/// Bounds of the in-memory telemetry logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Maximum retained events; the oldest are evicted first.
    pub max_events: usize,
    /// Maximum retained closed sessions; the oldest are evicted first.
    pub max_sessions: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            max_events: 2000,
            max_sessions: 200,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = KoedeamConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.voice.insert_mode, InsertMode::Cursor);
        assert!(!config.voice.continuous);
        assert_eq!(config.voice.language, "ja-JP");
        assert!((config.voice.candidate_threshold - 0.65).abs() < f64::EPSILON);
        assert_eq!(config.voice.no_confidence_rule, NoConfidenceRule::Show);
        assert_eq!(config.voice.idle_behavior, IdleBehavior::Auto);
        assert_eq!(config.voice.idle_ms, 3500);
        assert!(config.voice.eval_spec.is_none());
        assert!(config.voice.max_restart_attempts.is_none());
        assert_eq!(config.telemetry.max_events, 2000);
        assert_eq!(config.telemetry.max_sessions, 200);
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
[general]
log_level = "debug"

[voice]
insert_mode = "append"
continuous = true
language = "en-US"
candidate_threshold = 0.8
no_confidence_rule = "direct"
idle_behavior = "hold"
idle_ms = 5000
max_restart_attempts = 5

[voice.eval_spec]
label = "quiet-01"
expectedChars = 100
expectedTail = "です。"
"#;
        let file = create_temp_config(content);
        let config = KoedeamConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.general.data_dir, "~/.koedeam/data");
        assert_eq!(config.voice.insert_mode, InsertMode::Append);
        assert!(config.voice.continuous);
        assert_eq!(config.voice.language, "en-US");
        assert_eq!(config.voice.no_confidence_rule, NoConfidenceRule::Direct);
        assert_eq!(config.voice.idle_behavior, IdleBehavior::Hold);
        assert_eq!(config.voice.idle_ms, 5000);
        assert_eq!(config.voice.max_restart_attempts, Some(5));
        let eval = config.voice.eval_spec.unwrap();
        assert_eq!(eval.expected_chars, 100);
        assert_eq!(eval.expected_tail, "です。");
        // Untouched sections keep defaults.
        assert_eq!(config.telemetry, TelemetryConfig::default());
    }

    #[test]
    fn test_legacy_replace_mode_migrates_to_cursor() {
        let file = create_temp_config("[voice]\ninsert_mode = \"replace\"\n");
        let config = KoedeamConfig::load(file.path()).unwrap();
        assert_eq!(config.voice.insert_mode, InsertMode::Cursor);
    }

    #[test]
    fn test_load_missing_file_errors() {
        let result = KoedeamConfig::load(Path::new("/nonexistent/koedeam.toml"));
        assert!(matches!(result, Err(KoedeamError::Io(_))));
    }

    #[test]
    fn test_load_or_default_on_garbage() {
        let file = create_temp_config("this is [not toml");
        let config = KoedeamConfig::load_or_default(file.path());
        assert_eq!(config.voice, VoiceConfig::default());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = KoedeamConfig::default();
        config.voice.insert_mode = InsertMode::Append;
        config.voice.eval_spec = Some(EvalSpec {
            label: "run".to_string(),
            expected_chars: 12,
            expected_tail: "。".to_string(),
        });
        config.save(&path).unwrap();

        let reloaded = KoedeamConfig::load(&path).unwrap();
        assert_eq!(reloaded.voice, config.voice);
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut config = KoedeamConfig::default();
        config.voice.candidate_threshold = 1.5;
        assert!(matches!(config.validate(), Err(KoedeamError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_idle_and_capacity() {
        let mut config = KoedeamConfig::default();
        config.voice.idle_ms = 0;
        assert!(config.validate().is_err());

        let mut config = KoedeamConfig::default();
        config.telemetry.max_events = 0;
        assert!(config.validate().is_err());

        assert!(KoedeamConfig::default().validate().is_ok());
    }

    #[test]
    fn test_needs_engine_restart() {
        let base = VoiceConfig::default();
        let mut other = base.clone();
        other.candidate_threshold = 0.9;
        assert!(!base.needs_engine_restart(&other));
        other.language = "en-US".to_string();
        assert!(base.needs_engine_restart(&other));
    }
}
