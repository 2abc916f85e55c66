//! Koedeam Voice crate - the voice dictation session manager.
//!
//! Drives a speech-recognition engine through repeated start/stop cycles:
//! STOPPED -> PERMISSION_WAIT -> RUNNING -> (RESTART_WAIT -> PERMISSION_WAIT -> RUNNING)* -> STOPPED.
//! Ambiguous final results go through the candidate resolver, committed text
//! goes through the transcript inserter, and every transition is recorded by
//! the bounded telemetry log.

pub mod candidates;
pub mod clock;
pub mod cue;
pub mod document;
pub mod driver;
pub mod engine;
pub mod error;
pub mod inserter;
pub mod manager;
pub mod notice;
pub mod replay;
pub mod scheduler;
pub mod session;
pub mod state;
pub mod telemetry;
pub mod timer;

pub use candidates::{should_show_candidates, Candidate, CandidateResolver, Resolution};
pub use clock::{Clock, ManualClock, SystemClock};
pub use cue::{LazyCue, StartCue};
pub use document::{ChangeReason, HostEditor, ScrollPosition, TextBuffer, TextRange};
pub use driver::{driver_channel, DriverInput, DriverSender, SessionDriver, UserCommand};
pub use engine::{
    Alternative, EngineConfig, EngineEvent, ErrorClass, ErrorCode, MockEngine, RecognitionEngine,
    RecognitionResult,
};
pub use error::{CueError, EngineFailure, VoiceError};
pub use inserter::TranscriptInserter;
pub use manager::VoiceSessionManager;
pub use notice::VoiceNotice;
pub use replay::{ReplayEngine, ReplayFixture, ReplayMode};
pub use scheduler::{restart_delay, RestartCause, RestartScheduler};
pub use session::{CloseReason, SessionMetrics, VoiceSession};
pub use state::{InputLock, SessionState};
pub use telemetry::{EventName, ExportSnapshot, TelemetryEvent, TelemetryRecorder};
