//! Bounded telemetry log for voice sessions.
//!
//! Events and closed sessions are kept in FIFO logs; when a log is full the
//! oldest entry is evicted. Nothing is sampled or aggregated in place, so an
//! export reproduces exactly what was observed.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use koedeam_core::config::TelemetryConfig;
use koedeam_core::error::Result;
use koedeam_core::types::TimestampMs;

use crate::session::{CloseReason, LatencyMetrics, SessionMetrics, VoiceSession};

/// Export format version.
pub const EXPORT_VERSION: u32 = 1;

/// Name of an observable transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventName {
    StartRequested,
    StartFailed,
    SessionStarted,
    InterimResult,
    FinalResult,
    CandidatesShown,
    CandidatesReplaced,
    CandidateSelected,
    CandidateIdleCommit,
    TranscriptInserted,
    EngineError,
    EngineEnd,
    StopRequested,
    RestartScheduled,
    RestartAttempt,
    RestartCancelled,
    RestartAbandoned,
    SessionClosed,
    SettingsChanged,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::StartRequested => "start_requested",
            EventName::StartFailed => "start_failed",
            EventName::SessionStarted => "session_started",
            EventName::InterimResult => "interim_result",
            EventName::FinalResult => "final_result",
            EventName::CandidatesShown => "candidates_shown",
            EventName::CandidatesReplaced => "candidates_replaced",
            EventName::CandidateSelected => "candidate_selected",
            EventName::CandidateIdleCommit => "candidate_idle_commit",
            EventName::TranscriptInserted => "transcript_inserted",
            EventName::EngineError => "engine_error",
            EventName::EngineEnd => "engine_end",
            EventName::StopRequested => "stop_requested",
            EventName::RestartScheduled => "restart_scheduled",
            EventName::RestartAttempt => "restart_attempt",
            EventName::RestartCancelled => "restart_cancelled",
            EventName::RestartAbandoned => "restart_abandoned",
            EventName::SessionClosed => "session_closed",
            EventName::SettingsChanged => "settings_changed",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded event. Never modified after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryEvent {
    pub timestamp: TimestampMs,
    pub session_id: Option<Uuid>,
    pub doc_context: Option<String>,
    pub ui_context: Option<String>,
    pub event_name: EventName,
    pub payload: serde_json::Value,
}

#[derive(Debug)]
pub struct TelemetryRecorder {
    max_events: usize,
    max_sessions: usize,
    events: VecDeque<TelemetryEvent>,
    sessions: VecDeque<VoiceSession>,
    doc_context: Option<String>,
    ui_context: Option<String>,
}

impl TelemetryRecorder {
    pub fn new(config: &TelemetryConfig) -> Self {
        Self::with_capacity(config.max_events, config.max_sessions)
    }

    pub fn with_capacity(max_events: usize, max_sessions: usize) -> Self {
        Self {
            max_events,
            max_sessions,
            events: VecDeque::with_capacity(max_events.min(256)),
            sessions: VecDeque::with_capacity(max_sessions.min(64)),
            doc_context: None,
            ui_context: None,
        }
    }

    /// Document identifier attached to subsequent events.
    pub fn set_doc_context(&mut self, doc: Option<String>) {
        self.doc_context = doc;
    }

    /// UI surface attached to subsequent events.
    pub fn set_ui_context(&mut self, ui: Option<String>) {
        self.ui_context = ui;
    }

    pub fn record(
        &mut self,
        timestamp: TimestampMs,
        session_id: Option<Uuid>,
        event_name: EventName,
        payload: serde_json::Value,
    ) {
        tracing::trace!(event = %event_name, "Telemetry event");
        push_bounded(
            &mut self.events,
            self.max_events,
            TelemetryEvent {
                timestamp,
                session_id,
                doc_context: self.doc_context.clone(),
                ui_context: self.ui_context.clone(),
                event_name,
                payload,
            },
        );
    }

    /// Close `session` and archive a copy of it.
    ///
    /// Returns `false`, recording nothing, if it was already closed.
    pub fn close_session(
        &mut self,
        session: &mut VoiceSession,
        reason: CloseReason,
        at: TimestampMs,
    ) -> bool {
        if !session.close(at, reason) {
            return false;
        }
        let latency = session.latency();
        self.record(
            at,
            Some(session.id),
            EventName::SessionClosed,
            serde_json::json!({
                "reason": reason,
                "durationMs": latency.duration_ms,
                "finalChars": session.final_chars_total,
                "metrics": session.metrics,
            }),
        );
        push_bounded(&mut self.sessions, self.max_sessions, session.clone());
        true
    }

    pub fn events(&self) -> impl Iterator<Item = &TelemetryEvent> {
        self.events.iter()
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn sessions(&self) -> impl Iterator<Item = &VoiceSession> {
        self.sessions.iter()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Snapshot of everything recorded, plus the still-open session if any.
    ///
    /// The output depends only on the recorded state and `exported_at`.
    pub fn export_snapshot(
        &self,
        exported_at: TimestampMs,
        active: Option<&VoiceSession>,
    ) -> ExportSnapshot {
        let all: Vec<&VoiceSession> = self.sessions.iter().chain(active).collect();
        ExportSnapshot {
            version: EXPORT_VERSION,
            exported_at: exported_at.to_rfc3339(),
            sessions: all.iter().map(|s| SessionSummary::from_session(s)).collect(),
            events: self.events.iter().cloned().collect(),
            metrics: all
                .iter()
                .filter_map(|s| MetricsRow::from_session(s))
                .collect(),
        }
    }
}

fn push_bounded<T>(log: &mut VecDeque<T>, cap: usize, item: T) {
    if cap == 0 {
        return;
    }
    while log.len() >= cap {
        log.pop_front();
    }
    log.push_back(item);
}

/// Serializable export for offline analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSnapshot {
    pub version: u32,
    pub exported_at: String,
    pub sessions: Vec<SessionSummary>,
    pub events: Vec<TelemetryEvent>,
    pub metrics: Vec<MetricsRow>,
}

impl ExportSnapshot {
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// A session reduced to its identity and latency figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: Uuid,
    pub started_at: TimestampMs,
    pub ended_at: Option<TimestampMs>,
    pub close_reason: Option<CloseReason>,
    pub language: Option<String>,
    pub continuous: bool,
    pub candidate_threshold: f64,
    pub restart_attempt: u32,
    #[serde(flatten)]
    pub latency: LatencyMetrics,
}

impl SessionSummary {
    fn from_session(session: &VoiceSession) -> Self {
        Self {
            id: session.id,
            started_at: session.started_at,
            ended_at: session.ended_at,
            close_reason: session.close_reason,
            language: session.language.clone(),
            continuous: session.continuous,
            candidate_threshold: session.candidate_threshold,
            restart_attempt: session.restart_attempt,
            latency: session.latency(),
        }
    }
}

/// Quality metrics of one evaluated session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsRow {
    pub session_id: Uuid,
    pub label: String,
    #[serde(flatten)]
    pub metrics: SessionMetrics,
}

impl MetricsRow {
    fn from_session(session: &VoiceSession) -> Option<Self> {
        let metrics = session.metrics.clone()?;
        Some(Self {
            session_id: session.id,
            label: session
                .eval_spec
                .as_ref()
                .map(|spec| spec.label.clone())
                .unwrap_or_default(),
            metrics,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use koedeam_core::config::VoiceConfig;
    use koedeam_core::types::EvalSpec;

    fn session(start: i64, eval_spec: Option<EvalSpec>) -> VoiceSession {
        let engine = EngineConfig::from_voice(&VoiceConfig::default());
        VoiceSession::new(TimestampMs(start), &engine, 0.65, eval_spec)
    }

    #[test]
    fn test_event_log_is_fifo_bounded() {
        let mut recorder = TelemetryRecorder::new(&TelemetryConfig::default());
        for i in 0..2_050 {
            recorder.record(
                TimestampMs(i),
                None,
                EventName::InterimResult,
                serde_json::json!({ "seq": i }),
            );
        }
        assert_eq!(recorder.event_count(), 2_000);
        let first = recorder.events().next().unwrap();
        assert_eq!(first.timestamp, TimestampMs(50));
        let last = recorder.events().last().unwrap();
        assert_eq!(last.payload["seq"], 2_049);
    }

    #[test]
    fn test_session_list_is_fifo_bounded() {
        let mut recorder = TelemetryRecorder::with_capacity(10_000, 200);
        let mut ids = Vec::new();
        for i in 0..205 {
            let mut s = session(i, None);
            ids.push(s.id);
            assert!(recorder.close_session(&mut s, CloseReason::AutoEnd, TimestampMs(i + 1)));
        }
        assert_eq!(recorder.session_count(), 200);
        assert_eq!(recorder.sessions().next().unwrap().id, ids[5]);
        assert_eq!(recorder.sessions().last().unwrap().id, ids[204]);
    }

    #[test]
    fn test_close_session_only_once() {
        let mut recorder = TelemetryRecorder::with_capacity(100, 10);
        let mut s = session(0, None);
        assert!(recorder.close_session(&mut s, CloseReason::Manual, TimestampMs(5)));
        assert!(!recorder.close_session(&mut s, CloseReason::Error, TimestampMs(9)));
        assert_eq!(recorder.session_count(), 1);
        assert_eq!(s.ended_at, Some(TimestampMs(5)));
    }

    #[test]
    fn test_events_carry_context() {
        let mut recorder = TelemetryRecorder::with_capacity(100, 10);
        recorder.set_doc_context(Some("doc-1".to_string()));
        recorder.set_ui_context(Some("EDIT".to_string()));
        let id = Uuid::new_v4();
        recorder.record(TimestampMs(1), Some(id), EventName::EngineError, serde_json::json!({"code": "network"}));

        let event = recorder.events().next().unwrap();
        assert_eq!(event.session_id, Some(id));
        assert_eq!(event.doc_context.as_deref(), Some("doc-1"));
        assert_eq!(event.ui_context.as_deref(), Some("EDIT"));

        let json = serde_json::to_value(event).unwrap();
        assert_eq!(json["eventName"], "engine_error");
        assert_eq!(json["payload"]["code"], "network");
    }

    #[test]
    fn test_export_snapshot_shape() {
        let mut recorder = TelemetryRecorder::with_capacity(100, 10);
        let spec = EvalSpec {
            label: "greeting".to_string(),
            expected_chars: 10,
            expected_tail: "。".to_string(),
        };
        let mut closed = session(1_000, Some(spec));
        closed.record_final(TimestampMs(1_400), "こんにちは。");
        closed.append_committed("こんにちは。");
        recorder.close_session(&mut closed, CloseReason::AutoEnd, TimestampMs(2_000));
        let active = session(3_000, None);

        let snapshot = recorder.export_snapshot(TimestampMs(0), Some(&active));
        assert_eq!(snapshot.version, EXPORT_VERSION);
        assert_eq!(snapshot.exported_at, "1970-01-01T00:00:00.000Z");
        assert_eq!(snapshot.sessions.len(), 2);
        assert_eq!(snapshot.sessions[0].latency.time_to_first_final_ms, Some(400));
        assert_eq!(snapshot.sessions[1].ended_at, None);
        assert_eq!(snapshot.metrics.len(), 1);
        assert_eq!(snapshot.metrics[0].label, "greeting");
        assert_eq!(snapshot.metrics[0].metrics.tail_dropped, Some(false));

        let json = serde_json::to_value(&snapshot).unwrap();
        for key in ["version", "exportedAt", "sessions", "events", "metrics"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert_eq!(json["sessions"][0]["durationMs"], 1_000);
        assert_eq!(json["metrics"][0]["omissionRateEst"], 0.4);
    }

    #[test]
    fn test_export_is_deterministic() {
        let mut recorder = TelemetryRecorder::with_capacity(100, 10);
        let mut s = session(0, None);
        recorder.record(TimestampMs(1), Some(s.id), EventName::SessionStarted, serde_json::Value::Null);
        recorder.close_session(&mut s, CloseReason::Manual, TimestampMs(2));

        let a = recorder.export_snapshot(TimestampMs(10), None).to_json_pretty().unwrap();
        let b = recorder.export_snapshot(TimestampMs(10), None).to_json_pretty().unwrap();
        assert_eq!(a, b);
    }
}
