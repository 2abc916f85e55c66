//! Per-cycle voice session record and its quality metrics.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use koedeam_core::types::{EvalSpec, TimestampMs};

use crate::engine::EngineConfig;

/// Why a voice session was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CloseReason {
    /// The user stopped dictation.
    Manual,
    /// The engine ended on its own.
    AutoEnd,
    /// A fatal engine error.
    Error,
    /// A restart attempt started before the engine reported `end`.
    Restart,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Manual => write!(f, "manual"),
            CloseReason::AutoEnd => write!(f, "auto-end"),
            CloseReason::Error => write!(f, "error"),
            CloseReason::Restart => write!(f, "restart"),
        }
    }
}

/// One start -> stop cycle of the recognition engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceSession {
    pub id: Uuid,
    pub started_at: TimestampMs,
    pub ended_at: Option<TimestampMs>,
    pub close_reason: Option<CloseReason>,
    pub first_interim_at: Option<TimestampMs>,
    pub first_final_at: Option<TimestampMs>,
    /// When the restart that produced this session was scheduled.
    pub restart_scheduled_at: Option<TimestampMs>,
    /// When that restart actually called `engine.start()`.
    pub restart_started_at: Option<TimestampMs>,
    pub restart_attempt: u32,
    pub language: Option<String>,
    pub continuous: bool,
    pub candidate_threshold: f64,
    pub final_chars_total: u64,
    pub final_result_count: u64,
    /// Top transcript of every final result, in arrival order.
    pub final_text: String,
    /// Text actually inserted into the note. Lags `final_text` while a
    /// candidate set is pending and misses sets discarded unresolved.
    pub committed_text: String,
    pub no_speech_count: u32,
    pub auto_end_count: u32,
    pub eval_spec: Option<EvalSpec>,
    pub metrics: Option<SessionMetrics>,
}

impl VoiceSession {
    pub fn new(
        started_at: TimestampMs,
        engine: &EngineConfig,
        candidate_threshold: f64,
        eval_spec: Option<EvalSpec>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at,
            ended_at: None,
            close_reason: None,
            first_interim_at: None,
            first_final_at: None,
            restart_scheduled_at: None,
            restart_started_at: None,
            restart_attempt: 0,
            language: engine.lang.clone(),
            continuous: engine.continuous,
            candidate_threshold,
            final_chars_total: 0,
            final_result_count: 0,
            final_text: String::new(),
            committed_text: String::new(),
            no_speech_count: 0,
            auto_end_count: 0,
            eval_spec,
            metrics: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.ended_at.is_some()
    }

    pub fn mark_interim(&mut self, at: TimestampMs) {
        self.first_interim_at.get_or_insert(at);
    }

    /// Account for one final result. Length is counted in characters.
    pub fn record_final(&mut self, at: TimestampMs, transcript: &str) {
        self.first_final_at.get_or_insert(at);
        self.final_chars_total += transcript.chars().count() as u64;
        self.final_result_count += 1;
        self.final_text.push_str(transcript);
    }

    pub fn append_committed(&mut self, text: &str) {
        self.committed_text.push_str(text);
    }

    pub fn count_no_speech(&mut self) {
        self.no_speech_count += 1;
    }

    /// Close the session once. Returns `false` if it was already closed.
    pub fn close(&mut self, at: TimestampMs, reason: CloseReason) -> bool {
        if self.is_closed() {
            return false;
        }
        if reason == CloseReason::AutoEnd {
            self.auto_end_count += 1;
        }
        self.ended_at = Some(at);
        self.close_reason = Some(reason);
        let metrics = self
            .eval_spec
            .as_ref()
            .map(|spec| SessionMetrics::evaluate(self, spec));
        self.metrics = metrics;
        true
    }

    pub fn latency(&self) -> LatencyMetrics {
        LatencyMetrics {
            time_to_first_interim_ms: self
                .first_interim_at
                .map(|t| t.millis_since(self.started_at)),
            time_to_first_final_ms: self
                .first_final_at
                .map(|t| t.millis_since(self.started_at)),
            duration_ms: self.ended_at.map(|t| t.millis_since(self.started_at)),
            restart_delay_ms: match (self.restart_scheduled_at, self.restart_started_at) {
                (Some(scheduled), Some(started)) => Some(started.millis_since(scheduled)),
                _ => None,
            },
        }
    }
}

/// Recognition quality against an [`EvalSpec`], computed once at close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetrics {
    pub char_count: u64,
    pub stop_frequency: u32,
    /// `None` when no expected length was given.
    pub omission_rate_est: Option<f64>,
    /// `None` when no expected tail was given.
    pub tail_dropped: Option<bool>,
}

impl SessionMetrics {
    pub fn evaluate(session: &VoiceSession, spec: &EvalSpec) -> Self {
        let char_count = session.final_chars_total;
        let omission_rate_est = (spec.expected_chars > 0).then(|| {
            let missing = spec.expected_chars as f64 - char_count as f64;
            (missing / spec.expected_chars as f64).max(0.0)
        });
        let tail_dropped = (!spec.expected_tail.is_empty())
            .then(|| !session.final_text.ends_with(&spec.expected_tail));
        Self {
            char_count,
            stop_frequency: session.no_speech_count + session.auto_end_count,
            omission_rate_est,
            tail_dropped,
        }
    }
}

/// Latency figures reported per session in the telemetry export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyMetrics {
    pub time_to_first_interim_ms: Option<i64>,
    pub time_to_first_final_ms: Option<i64>,
    pub duration_ms: Option<i64>,
    /// `restart_started_at - restart_scheduled_at`.
    pub restart_delay_ms: Option<i64>,
}

// =============================================================================
// Tests
// =============================================================================
