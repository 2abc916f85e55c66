//! Error types for the voice session manager.

use koedeam_core::error::KoedeamError;

use crate::state::SessionState;

/// Errors from voice session lifecycle management.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    #[error("Invalid state transition: {0} -> {1}")]
    InvalidTransition(SessionState, SessionState),
    #[error("A voice session is already active ({0})")]
    AlreadyActive(SessionState),
    #[error("Speech recognition is not available")]
    EngineUnavailable,
    #[error("Could not start speech recognition: {0}")]
    StartFailed(#[from] EngineFailure),
}

/// Synchronous failure raised by a recognition engine's `start()`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineFailure {
    #[error("engine is already started")]
    Busy,
    #[error("engine rejected start: {0}")]
    Rejected(String),
    #[error("replay script exhausted")]
    Exhausted,
}

/// Start cue failures. Always logged and swallowed.
#[derive(Debug, thiserror::Error)]
pub enum CueError {
    #[error("start cue device unavailable: {0}")]
    Unavailable(String),
    #[error("start cue playback failed: {0}")]
    Playback(String),
}

impl From<VoiceError> for KoedeamError {
    fn from(err: VoiceError) -> Self {
        match err {
            VoiceError::EngineUnavailable => KoedeamError::EngineUnavailable,
            VoiceError::StartFailed(failure) => KoedeamError::Engine(failure.to_string()),
            other => KoedeamError::Voice(other.to_string()),
        }
    }
}
