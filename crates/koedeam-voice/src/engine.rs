//! Boundary to the external speech-recognition engine.
//!
//! The engine is driven through the narrow [`RecognitionEngine`] trait and
//! reports back exclusively through [`EngineEvent`]s, which the host forwards
//! to the session manager in the order the engine emitted them.

use std::fmt;

use serde::{Deserialize, Serialize};

use koedeam_core::config::VoiceConfig;

use crate::error::EngineFailure;

/// Maximum number of alternatives considered per final result.
pub const MAX_ALTERNATIVES: usize = 3;

/// Engine configuration snapshot, taken when a session starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Recognition language; `None` lets the engine pick.
    pub lang: Option<String>,
    pub continuous: bool,
    pub interim_results: bool,
}

impl EngineConfig {
    pub fn from_voice(voice: &VoiceConfig) -> Self {
        let lang = match voice.language.trim() {
            "" | "auto" => None,
            tag => Some(tag.to_string()),
        };
        Self {
            lang,
            continuous: voice.continuous,
            interim_results: voice.interim_results,
        }
    }
}

/// A speech-recognition engine.
///
/// `start` may fail synchronously (for example when the engine is already
/// running); every other outcome arrives later as an [`EngineEvent`].
pub trait RecognitionEngine {
    /// Whether the platform offers recognition at all.
    fn is_available(&self) -> bool {
        true
    }

    fn configure(&mut self, config: &EngineConfig);

    fn start(&mut self) -> Result<(), EngineFailure>;

    fn stop(&mut self);
}

/// One alternative transcription of a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub transcript: String,
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl Alternative {
    pub fn new(transcript: impl Into<String>, confidence: Option<f64>) -> Self {
        Self {
            transcript: transcript.into(),
            confidence,
        }
    }
}

/// One recognition result, interim or final.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionResult {
    pub is_final: bool,
    pub alternatives: Vec<Alternative>,
}

impl RecognitionResult {
    pub fn final_result(alternatives: Vec<Alternative>) -> Self {
        Self {
            is_final: true,
            alternatives,
        }
    }

    pub fn interim(transcript: impl Into<String>) -> Self {
        Self {
            is_final: false,
            alternatives: vec![Alternative::new(transcript, None)],
        }
    }
}

/// Everything the engine can tell the session manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EngineEvent {
    /// Capture actually began.
    Start,
    /// New or updated results, starting at `result_index`.
    Result {
        #[serde(default, rename = "resultIndex")]
        result_index: usize,
        results: Vec<RecognitionResult>,
    },
    Error {
        error: ErrorCode,
    },
    /// Capture finished, whether requested or not.
    End,
}

impl EngineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::Start => "start",
            EngineEvent::Result { .. } => "result",
            EngineEvent::Error { .. } => "error",
            EngineEvent::End => "end",
        }
    }

    /// A single final result with the given alternatives.
    pub fn final_alternatives(alternatives: Vec<Alternative>) -> Self {
        EngineEvent::Result {
            result_index: 0,
            results: vec![RecognitionResult::final_result(alternatives)],
        }
    }
}

/// How the session manager treats an engine error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Absorbed into an automatic restart.
    Recoverable,
    /// The engine's own abort signal.
    Aborted,
    /// Ends the session; the user has to start again.
    Fatal,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Recoverable => "recoverable",
            ErrorClass::Aborted => "aborted",
            ErrorClass::Fatal => "fatal",
        }
    }
}

/// Engine error code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorCode {
    NoSpeech,
    Network,
    AudioCapture,
    Aborted,
    NotAllowed,
    ServiceNotAllowed,
    LanguageNotSupported,
    Other(String),
}

impl ErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::NoSpeech => "no-speech",
            ErrorCode::Network => "network",
            ErrorCode::AudioCapture => "audio-capture",
            ErrorCode::Aborted => "aborted",
            ErrorCode::NotAllowed => "not-allowed",
            ErrorCode::ServiceNotAllowed => "service-not-allowed",
            ErrorCode::LanguageNotSupported => "language-not-supported",
            ErrorCode::Other(code) => code,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            ErrorCode::NoSpeech | ErrorCode::Network | ErrorCode::AudioCapture => {
                ErrorClass::Recoverable
            }
            ErrorCode::Aborted => ErrorClass::Aborted,
            _ => ErrorClass::Fatal,
        }
    }
}

impl From<&str> for ErrorCode {
    fn from(code: &str) -> Self {
        match code {
            "no-speech" => ErrorCode::NoSpeech,
            "network" => ErrorCode::Network,
            "audio-capture" => ErrorCode::AudioCapture,
            "aborted" => ErrorCode::Aborted,
            "not-allowed" => ErrorCode::NotAllowed,
            "service-not-allowed" => ErrorCode::ServiceNotAllowed,
            "language-not-supported" => ErrorCode::LanguageNotSupported,
            other => ErrorCode::Other(other.to_string()),
        }
    }
}

impl From<String> for ErrorCode {
    fn from(code: String) -> Self {
        ErrorCode::from(code.as_str())
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> Self {
        code.as_str().to_string()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine double that records calls and never emits events on its own.
///
/// Tests feed events to the manager directly.
#[derive(Debug, Default)]
pub struct MockEngine {
    available: bool,
    start_calls: u32,
    stop_calls: u32,
    fail_next_start: Option<EngineFailure>,
    last_config: Option<EngineConfig>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            available: true,
            ..Self::default()
        }
    }

    /// An engine the platform does not provide.
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn fail_next_start(&mut self, failure: EngineFailure) {
        self.fail_next_start = Some(failure);
    }

    pub fn start_calls(&self) -> u32 {
        self.start_calls
    }

    pub fn stop_calls(&self) -> u32 {
        self.stop_calls
    }

    pub fn last_config(&self) -> Option<&EngineConfig> {
        self.last_config.as_ref()
    }
}

impl RecognitionEngine for MockEngine {
    fn is_available(&self) -> bool {
        self.available
    }

    fn configure(&mut self, config: &EngineConfig) {
        self.last_config = Some(config.clone());
    }

    fn start(&mut self) -> Result<(), EngineFailure> {
        self.start_calls += 1;
        match self.fail_next_start.take() {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }

    fn stop(&mut self) {
        self.stop_calls += 1;
    }
}

// =============================================================================
// Tests
// =============================================================================
