//! Automatic restart scheduling after recoverable engine failures.
//!
//! Owns the single pending restart timer and the attempt counter. The
//! session manager asks for the deadline, fires it through `take_due`, and
//! re-checks [`can_auto_restart`] before actually starting the engine.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use koedeam_core::types::TimestampMs;

use crate::engine::ErrorCode;
use crate::timer::TimerSlot;

/// Backoff after a `no-speech` timeout.
pub const NO_SPEECH_RESTART_DELAY: Duration = Duration::from_millis(300);
/// Backoff after every other restart cause.
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_millis(650);

/// Why a restart was scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartCause {
    NoSpeech,
    Network,
    AudioCapture,
    /// The engine ended on its own.
    End,
}

impl RestartCause {
    /// The restart cause for a recoverable engine error, if it is one.
    pub fn from_error(code: &ErrorCode) -> Option<Self> {
        match code {
            ErrorCode::NoSpeech => Some(RestartCause::NoSpeech),
            ErrorCode::Network => Some(RestartCause::Network),
            ErrorCode::AudioCapture => Some(RestartCause::AudioCapture),
            _ => None,
        }
    }
}

impl fmt::Display for RestartCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestartCause::NoSpeech => write!(f, "no-speech"),
            RestartCause::Network => write!(f, "network"),
            RestartCause::AudioCapture => write!(f, "audio-capture"),
            RestartCause::End => write!(f, "end"),
        }
    }
}

/// Backoff delay for a restart cause.
pub fn restart_delay(cause: RestartCause) -> Duration {
    match cause {
        RestartCause::NoSpeech => NO_SPEECH_RESTART_DELAY,
        _ => DEFAULT_RESTART_DELAY,
    }
}

/// Restart guard: only when the user has not stopped and the editing
/// surface is still in the foreground.
pub fn can_auto_restart(manual_stop: bool, surface_foreground: bool) -> bool {
    !manual_stop && surface_foreground
}

/// A restart waiting for its timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledRestart {
    pub cause: RestartCause,
    pub scheduled_at: TimestampMs,
    pub due_at: TimestampMs,
}

/// A restart whose `engine.start()` has been issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartAttempt {
    pub attempt: u32,
    pub cause: RestartCause,
    pub scheduled_at: TimestampMs,
    pub started_at: TimestampMs,
}

#[derive(Debug, Default)]
pub struct RestartScheduler {
    timer: TimerSlot<ScheduledRestart>,
    attempts: u32,
    max_attempts: Option<u32>,
    in_flight: Option<RestartAttempt>,
}

impl RestartScheduler {
    pub fn new(max_attempts: Option<u32>) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    pub fn set_max_attempts(&mut self, max_attempts: Option<u32>) {
        self.max_attempts = max_attempts;
    }

    /// Schedule a restart, replacing any pending one.
    pub fn schedule(&mut self, cause: RestartCause, now: TimestampMs) -> ScheduledRestart {
        let delay = restart_delay(cause);
        let scheduled = ScheduledRestart {
            cause,
            scheduled_at: now,
            due_at: now.add_millis(delay.as_millis() as u64),
        };
        if let Some(replaced) = self.timer.arm(scheduled.due_at, scheduled) {
            tracing::debug!(
                replaced = %replaced.cause,
                cause = %cause,
                "Pending restart replaced"
            );
        }
        scheduled
    }

    /// Cancel the pending restart. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        self.timer.cancel().is_some()
    }

    pub fn pending(&self) -> Option<ScheduledRestart> {
        self.timer.payload().copied()
    }

    pub fn is_pending(&self) -> bool {
        self.timer.is_armed()
    }

    pub fn deadline(&self) -> Option<TimestampMs> {
        self.timer.deadline()
    }

    /// The restart whose timer has elapsed at `now`, if any.
    pub fn take_due(&mut self, now: TimestampMs) -> Option<ScheduledRestart> {
        self.timer.take_due(now)
    }

    /// Count an attempt for a fired restart and remember it until the
    /// engine confirms start.
    pub fn begin_attempt(&mut self, fired: ScheduledRestart, now: TimestampMs) -> RestartAttempt {
        self.attempts += 1;
        let attempt = RestartAttempt {
            attempt: self.attempts,
            cause: fired.cause,
            scheduled_at: fired.scheduled_at,
            started_at: now,
        };
        self.in_flight = Some(attempt);
        attempt
    }

    pub fn in_flight(&self) -> Option<&RestartAttempt> {
        self.in_flight.as_ref()
    }

    /// The attempt whose start is being confirmed, consumed once.
    pub fn take_in_flight(&mut self) -> Option<RestartAttempt> {
        self.in_flight.take()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Called on every successful entry into RUNNING.
    pub fn reset_attempts(&mut self) {
        self.attempts = 0;
    }

    /// Forget everything about the current restart chain.
    pub fn clear(&mut self) {
        self.timer.cancel();
        self.in_flight = None;
        self.attempts = 0;
    }

    pub fn ceiling_reached(&self) -> bool {
        self.max_attempts
            .is_some_and(|max| self.attempts >= max)
    }
}

// =============================================================================
// Tests
// =============================================================================
