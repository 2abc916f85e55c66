//! Voice session state machine.
//!
//! Enforces valid transitions for the dictation lifecycle:
//! - STOPPED -> PERMISSION_WAIT (engine start requested)
//! - PERMISSION_WAIT -> RUNNING (engine confirmed start)
//! - RUNNING -> RESTART_WAIT (engine ended or failed recoverably)
//! - PERMISSION_WAIT -> RESTART_WAIT (recoverable failure before start)
//! - RESTART_WAIT -> PERMISSION_WAIT (restart timer fired)
//! - any active state -> STOPPED (manual stop, fatal error, guard failure)

use std::fmt;

use koedeam_core::types::InsertMode;
use serde::{Deserialize, Serialize};

use crate::error::VoiceError;

/// Lifecycle state of the voice session manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// Idle; no voice session active.
    #[default]
    Stopped,
    /// `engine.start()` called, waiting for the engine to confirm or fail.
    PermissionWait,
    /// Engine confirmed start; results may arrive.
    Running,
    /// Engine ended unexpectedly; a restart is scheduled.
    RestartWait,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Stopped => write!(f, "STOPPED"),
            SessionState::PermissionWait => write!(f, "PERMISSION_WAIT"),
            SessionState::Running => write!(f, "RUNNING"),
            SessionState::RestartWait => write!(f, "RESTART_WAIT"),
        }
    }
}

impl SessionState {
    /// Returns whether a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &SessionState) -> bool {
        matches!(
            (self, target),
            (SessionState::Stopped, SessionState::PermissionWait)
                | (SessionState::PermissionWait, SessionState::Running)
                | (SessionState::PermissionWait, SessionState::RestartWait)
                | (SessionState::Running, SessionState::RestartWait)
                | (SessionState::RestartWait, SessionState::PermissionWait)
                // Stop transitions
                | (SessionState::PermissionWait, SessionState::Stopped)
                | (SessionState::Running, SessionState::Stopped)
                | (SessionState::RestartWait, SessionState::Stopped)
        )
    }

    /// Whether the engine is (or is about to be) capturing speech.
    pub fn is_listening(&self) -> bool {
        matches!(self, SessionState::PermissionWait | SessionState::Running)
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, SessionState::Stopped)
    }
}

/// Insertion lock published to the host editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InputLock {
    /// Voice input off; the user types freely.
    VoiceOff,
    /// Voice appends at the end; the user may keep editing elsewhere.
    VoiceAppend,
    /// Voice writes at the caret; keyboard editing is suspended.
    VoiceLocked,
}

impl fmt::Display for InputLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputLock::VoiceOff => write!(f, "VOICE:OFF"),
            InputLock::VoiceAppend => write!(f, "VOICE:APPEND"),
            InputLock::VoiceLocked => write!(f, "VOICE:LOCKED"),
        }
    }
}

impl InputLock {
    pub fn for_state(state: SessionState, mode: InsertMode) -> Self {
        if !state.is_listening() {
            return InputLock::VoiceOff;
        }
        match mode {
            InsertMode::Append => InputLock::VoiceAppend,
            InsertMode::Cursor => InputLock::VoiceLocked,
        }
    }

    /// Whether the host editor should accept keyboard input.
    pub fn allows_typing(&self) -> bool {
        !matches!(self, InputLock::VoiceLocked)
    }
}

/// Validating holder of the current [`SessionState`].
#[derive(Debug, Clone, Default)]
pub struct StateMachine {
    state: SessionState,
}

impl StateMachine {
    /// Create a new state machine initialized to `STOPPED`.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> SessionState {
        self.state
    }

    /// Attempt to transition to the target state.
    ///
    /// Returns the previous state, or `VoiceError::InvalidTransition` if the
    /// move is not allowed from the current state.
    pub fn transition(&mut self, target: SessionState) -> Result<SessionState, VoiceError> {
        let from = self.state;
        if from.can_transition_to(&target) {
            tracing::debug!("Voice session state: {} -> {}", from, target);
            self.state = target;
            Ok(from)
        } else {
            Err(VoiceError::InvalidTransition(from, target))
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::Stopped.to_string(), "STOPPED");
        assert_eq!(SessionState::PermissionWait.to_string(), "PERMISSION_WAIT");
        assert_eq!(SessionState::Running.to_string(), "RUNNING");
        assert_eq!(SessionState::RestartWait.to_string(), "RESTART_WAIT");
    }

    #[test]
    fn test_state_serializes_like_display() {
        assert_eq!(
            serde_json::to_string(&SessionState::PermissionWait).unwrap(),
            "\"PERMISSION_WAIT\""
        );
    }

    #[test]
    fn test_valid_transitions() {
        assert!(SessionState::Stopped.can_transition_to(&SessionState::PermissionWait));
        assert!(SessionState::PermissionWait.can_transition_to(&SessionState::Running));
        assert!(SessionState::Running.can_transition_to(&SessionState::RestartWait));
        assert!(SessionState::RestartWait.can_transition_to(&SessionState::PermissionWait));

        // Stop transitions
        assert!(SessionState::PermissionWait.can_transition_to(&SessionState::Stopped));
        assert!(SessionState::Running.can_transition_to(&SessionState::Stopped));
        assert!(SessionState::RestartWait.can_transition_to(&SessionState::Stopped));
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!SessionState::Stopped.can_transition_to(&SessionState::Running));
        assert!(!SessionState::Stopped.can_transition_to(&SessionState::RestartWait));
        assert!(!SessionState::RestartWait.can_transition_to(&SessionState::Running));
        assert!(!SessionState::Running.can_transition_to(&SessionState::PermissionWait));

        for s in [
            SessionState::Stopped,
            SessionState::PermissionWait,
            SessionState::Running,
            SessionState::RestartWait,
        ] {
            assert!(!s.can_transition_to(&s));
        }
    }

    #[test]
    fn test_state_machine_restart_cycle() {
        let mut sm = StateMachine::new();
        assert_eq!(sm.current(), SessionState::Stopped);

        sm.transition(SessionState::PermissionWait).unwrap();
        sm.transition(SessionState::Running).unwrap();
        sm.transition(SessionState::RestartWait).unwrap();
        sm.transition(SessionState::PermissionWait).unwrap();
        let prev = sm.transition(SessionState::Running).unwrap();
        assert_eq!(prev, SessionState::PermissionWait);
        sm.transition(SessionState::Stopped).unwrap();
        assert_eq!(sm.current(), SessionState::Stopped);
    }

    #[test]
    fn test_state_machine_invalid_transition_keeps_state() {
        let mut sm = StateMachine::new();
        let result = sm.transition(SessionState::Running);
        match result {
            Err(VoiceError::InvalidTransition(from, to)) => {
                assert_eq!(from, SessionState::Stopped);
                assert_eq!(to, SessionState::Running);
            }
            _ => panic!("Expected InvalidTransition"),
        }
        assert_eq!(sm.current(), SessionState::Stopped);
    }

    #[test]
    fn test_input_lock_for_state() {
        assert_eq!(
            InputLock::for_state(SessionState::Running, InsertMode::Cursor),
            InputLock::VoiceLocked
        );
        assert_eq!(
            InputLock::for_state(SessionState::PermissionWait, InsertMode::Append),
            InputLock::VoiceAppend
        );
        assert_eq!(
            InputLock::for_state(SessionState::RestartWait, InsertMode::Cursor),
            InputLock::VoiceOff
        );
        assert_eq!(
            InputLock::for_state(SessionState::Stopped, InsertMode::Append),
            InputLock::VoiceOff
        );
    }

    #[test]
    fn test_input_lock_typing_policy() {
        assert!(InputLock::VoiceOff.allows_typing());
        assert!(InputLock::VoiceAppend.allows_typing());
        assert!(!InputLock::VoiceLocked.allows_typing());
        assert_eq!(InputLock::VoiceLocked.to_string(), "VOICE:LOCKED");
    }
}
