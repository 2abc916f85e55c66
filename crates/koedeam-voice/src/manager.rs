//! The voice session manager.
//!
//! Drives a [`RecognitionEngine`] through repeated start/stop cycles and
//! routes its events to the restart scheduler, the candidate resolver, the
//! transcript inserter and the telemetry recorder. Everything runs on the
//! caller's task: engine events, user commands and timer firings are plain
//! method calls, processed strictly one after another.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::broadcast;

use koedeam_core::config::{KoedeamConfig, VoiceConfig};
use koedeam_core::error::Result;
use koedeam_core::types::TimestampMs;

use crate::candidates::{Candidate, CandidateResolver, Resolution};
use crate::clock::Clock;
use crate::cue::LazyCue;
use crate::document::HostEditor;
use crate::engine::{
    EngineConfig, EngineEvent, ErrorClass, ErrorCode, RecognitionEngine, RecognitionResult,
    MAX_ALTERNATIVES,
};
use crate::error::VoiceError;
use crate::inserter::TranscriptInserter;
use crate::notice::{VoiceNotice, NOTICE_CAPACITY};
use crate::scheduler::{can_auto_restart, RestartCause, RestartScheduler, ScheduledRestart};
use crate::session::{CloseReason, VoiceSession};
use crate::state::{InputLock, SessionState, StateMachine};
use crate::telemetry::{EventName, ExportSnapshot, TelemetryRecorder};

/// Why the manager stopped the engine on its own initiative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopCause {
    User,
    Background,
    DocumentSwitched,
    Reconfigure,
}

impl StopCause {
    fn as_str(&self) -> &'static str {
        match self {
            StopCause::User => "user",
            StopCause::Background => "background",
            StopCause::DocumentSwitched => "document-switched",
            StopCause::Reconfigure => "reconfigure",
        }
    }
}

pub struct VoiceSessionManager<E: RecognitionEngine, H: HostEditor> {
    engine: E,
    host: H,
    clock: Arc<dyn Clock>,
    config: VoiceConfig,
    machine: StateMachine,
    session: Option<VoiceSession>,
    restart: RestartScheduler,
    resolver: CandidateResolver,
    inserter: TranscriptInserter,
    telemetry: TelemetryRecorder,
    manual_stop: bool,
    foreground: bool,
    /// The stopped run still owes its `end`.
    awaiting_end: bool,
    /// Start fresh once that `end` arrives.
    restart_after_stop: bool,
    cue: Option<LazyCue>,
    lock: InputLock,
    notices: broadcast::Sender<VoiceNotice>,
}

impl<E: RecognitionEngine, H: HostEditor> VoiceSessionManager<E, H> {
    pub fn new(engine: E, host: H, config: &KoedeamConfig, clock: Arc<dyn Clock>) -> Self {
        let voice = config.voice.clone();
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            engine,
            host,
            clock,
            restart: RestartScheduler::new(voice.max_restart_attempts),
            resolver: CandidateResolver::new(&voice),
            inserter: TranscriptInserter::new(voice.insert_mode),
            telemetry: TelemetryRecorder::new(&config.telemetry),
            config: voice,
            machine: StateMachine::new(),
            session: None,
            manual_stop: false,
            foreground: true,
            awaiting_end: false,
            restart_after_stop: false,
            cue: None,
            lock: InputLock::VoiceOff,
            notices,
        }
    }

    /// Attach a start cue, played on every engine start when enabled.
    pub fn with_cue(mut self, cue: LazyCue) -> Self {
        self.cue = Some(cue);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VoiceNotice> {
        self.notices.subscribe()
    }

    // -------------------------------------------------------------------------
    // User actions
    // -------------------------------------------------------------------------

    /// Start dictation from `STOPPED`.
    ///
    /// If a stopped run has not reported `end` yet, the start is deferred
    /// until it does, so that `end` is still booked as the manual stop.
    pub fn start(&mut self) -> std::result::Result<(), VoiceError> {
        let state = self.machine.current();
        if state.is_active() {
            return Err(VoiceError::AlreadyActive(state));
        }
        if !self.engine.is_available() {
            let err = VoiceError::EngineUnavailable;
            self.notify_failure(err.to_string());
            return Err(err);
        }
        if self.manual_stop && self.awaiting_end {
            tracing::debug!("Start deferred until the stopped run ends");
            self.restart_after_stop = true;
            return Ok(());
        }

        let now = self.clock.now();
        self.manual_stop = false;
        self.awaiting_end = false;
        self.restart_after_stop = false;
        self.restart.clear();

        let engine_config = EngineConfig::from_voice(&self.config);
        self.engine.configure(&engine_config);
        self.telemetry.record(
            now,
            None,
            EventName::StartRequested,
            json!({
                "language": engine_config.lang,
                "continuous": engine_config.continuous,
                "insertMode": self.config.insert_mode,
            }),
        );

        self.enter(SessionState::PermissionWait);
        if let Err(failure) = self.engine.start() {
            self.telemetry.record(
                now,
                None,
                EventName::StartFailed,
                json!({ "reason": failure.to_string(), "restart": false }),
            );
            self.enter(SessionState::Stopped);
            let err = VoiceError::StartFailed(failure);
            self.notify_failure(err.to_string());
            return Err(err);
        }
        Ok(())
    }

    /// Stop dictation. Returns `false` if nothing was active.
    ///
    /// The state drops to `STOPPED` immediately; the engine's `end` event
    /// closes the session later.
    pub fn stop(&mut self) -> bool {
        self.stop_with(StopCause::User)
    }

    /// Resolve the pending candidate set. Returns the index committed.
    pub fn select_candidate(&mut self, index: usize) -> Option<usize> {
        let selection = self.resolver.apply_selection(index)?;
        let now = self.clock.now();
        self.telemetry.record(
            now,
            self.session_id(),
            EventName::CandidateSelected,
            json!({ "requested": index, "index": selection.index }),
        );
        self.publish(VoiceNotice::CandidatesCleared);
        self.commit(&selection.candidate.text, "selection", now);
        Some(selection.index)
    }

    /// Whether the editing surface is the foreground context.
    pub fn set_foreground(&mut self, foreground: bool) {
        self.foreground = foreground;
        self.telemetry
            .set_ui_context(Some(if foreground { "edit" } else { "background" }.to_string()));
        if !foreground {
            self.stop_with(StopCause::Background);
        }
    }

    /// The host switched to another document.
    pub fn document_switched(&mut self, doc_id: Option<String>) {
        self.stop_with(StopCause::DocumentSwitched);
        self.telemetry.set_doc_context(doc_id);
    }

    /// Apply new voice settings.
    ///
    /// Changing language or continuous mode while active stops the engine
    /// and starts a fresh session with the new configuration.
    pub fn apply_settings(&mut self, config: VoiceConfig) -> Result<()> {
        config.validate()?;
        let needs_restart =
            self.machine.current().is_active() && self.config.needs_engine_restart(&config);

        self.resolver.update_config(&config);
        self.inserter.set_mode(config.insert_mode);
        self.restart.set_max_attempts(config.max_restart_attempts);
        self.config = config;
        self.telemetry.record(
            self.clock.now(),
            self.session_id(),
            EventName::SettingsChanged,
            json!({
                "language": self.config.language,
                "continuous": self.config.continuous,
                "insertMode": self.config.insert_mode,
                "candidateThreshold": self.config.candidate_threshold,
                "restartEngine": needs_restart,
            }),
        );
        self.publish_lock();

        if needs_restart {
            self.stop_with(StopCause::Reconfigure);
            self.start()?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Engine events
    // -------------------------------------------------------------------------

    pub fn handle_engine_event(&mut self, event: EngineEvent) {
        tracing::trace!(event = event.name(), state = %self.machine.current(), "Engine event");
        match event {
            EngineEvent::Start => self.on_start(),
            EngineEvent::Result {
                result_index,
                results,
            } => self.on_results(result_index, results),
            EngineEvent::Error { error } => self.on_error(error),
            EngineEvent::End => self.on_end(),
        }
    }

    fn on_start(&mut self) {
        if self.machine.current() != SessionState::PermissionWait {
            tracing::debug!(state = %self.machine.current(), "Ignoring engine start");
            return;
        }
        let now = self.clock.now();
        self.enter(SessionState::Running);
        self.restart.reset_attempts();

        // A restart that beat the previous run's `end`.
        self.close_session(CloseReason::Restart, now);

        let engine_config = EngineConfig::from_voice(&self.config);
        let mut session = VoiceSession::new(
            now,
            &engine_config,
            self.resolver.threshold(),
            self.config.eval_spec.clone(),
        );
        if let Some(attempt) = self.restart.take_in_flight() {
            session.restart_scheduled_at = Some(attempt.scheduled_at);
            session.restart_started_at = Some(attempt.started_at);
            session.restart_attempt = attempt.attempt;
        }
        tracing::info!(
            session_id = %session.id,
            language = ?session.language,
            restart_attempt = session.restart_attempt,
            "Voice session opened"
        );
        self.telemetry.record(
            now,
            Some(session.id),
            EventName::SessionStarted,
            json!({
                "language": session.language,
                "continuous": session.continuous,
                "restartAttempt": session.restart_attempt,
            }),
        );
        self.session = Some(session);

        if self.config.start_cue {
            if let Some(cue) = self.cue.as_mut() {
                cue.play();
            }
        }
    }

    fn on_results(&mut self, result_index: usize, results: Vec<RecognitionResult>) {
        if self.session.is_none() {
            tracing::debug!("Result without an open session, dropped");
            return;
        }
        for result in results.into_iter().skip(result_index) {
            if result.is_final {
                self.on_final(result);
            } else {
                self.on_interim(&result);
            }
        }
    }

    fn on_interim(&mut self, result: &RecognitionResult) {
        let now = self.clock.now();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.first_interim_at.is_some() {
            return;
        }
        session.mark_interim(now);
        let latency_ms = now.millis_since(session.started_at);
        let chars = result
            .alternatives
            .first()
            .map_or(0, |alt| alt.transcript.chars().count());
        let id = session.id;
        self.telemetry.record(
            now,
            Some(id),
            EventName::InterimResult,
            json!({ "first": true, "latencyMs": latency_ms, "chars": chars }),
        );
    }

    fn on_final(&mut self, result: RecognitionResult) {
        let now = self.clock.now();
        let mut alternatives = result.alternatives;
        alternatives.truncate(MAX_ALTERNATIVES);
        let Some(top) = alternatives.first() else {
            return;
        };
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.record_final(now, &top.transcript);
        let id = session.id;
        self.telemetry.record(
            now,
            Some(id),
            EventName::FinalResult,
            json!({
                "alternatives": alternatives.len(),
                "topConfidence": top.confidence,
                "chars": top.transcript.chars().count(),
            }),
        );

        let was_pending = self.resolver.is_pending();
        let candidates: Vec<Candidate> = alternatives.into_iter().map(Candidate::from).collect();
        let resolution = self.resolver.offer(candidates, now);
        if was_pending {
            self.telemetry
                .record(now, Some(id), EventName::CandidatesReplaced, json!({}));
        }
        match resolution {
            Resolution::Commit(candidate) => {
                if was_pending {
                    self.publish(VoiceNotice::CandidatesCleared);
                }
                self.commit(&candidate.text, "direct", now);
            }
            Resolution::Pending {
                candidates,
                idle_deadline,
            } => {
                self.telemetry.record(
                    now,
                    Some(id),
                    EventName::CandidatesShown,
                    json!({
                        "count": candidates.len(),
                        "topConfidence": candidates[0].confidence,
                        "idleDeadline": idle_deadline,
                    }),
                );
                self.publish(VoiceNotice::CandidatesShown { candidates });
            }
            Resolution::Empty => {
                if was_pending {
                    self.publish(VoiceNotice::CandidatesCleared);
                }
            }
        }
    }

    fn on_error(&mut self, code: ErrorCode) {
        let now = self.clock.now();
        let class = code.class();
        self.telemetry.record(
            now,
            self.session_id(),
            EventName::EngineError,
            json!({
                "code": code.as_str(),
                "class": class.as_str(),
                "manualStop": self.manual_stop,
            }),
        );

        if self.manual_stop && class == ErrorClass::Aborted {
            tracing::debug!("Ignoring aborted after manual stop");
            return;
        }

        match RestartCause::from_error(&code) {
            Some(cause) => {
                if code == ErrorCode::NoSpeech {
                    if let Some(session) = self.session.as_mut() {
                        session.count_no_speech();
                    }
                }
                tracing::debug!(code = %code, "Recoverable engine error");
                self.schedule_restart(cause, now);
            }
            None => self.fail_session(&code, now),
        }
    }

    fn on_end(&mut self) {
        let now = self.clock.now();
        self.telemetry.record(
            now,
            self.session_id(),
            EventName::EngineEnd,
            json!({ "manualStop": self.manual_stop }),
        );

        if self.manual_stop {
            self.manual_stop = false;
            self.awaiting_end = false;
            self.close_session(CloseReason::Manual, now);
            self.clear_candidates();
            self.enter(SessionState::Stopped);
            if std::mem::take(&mut self.restart_after_stop) {
                if let Err(e) = self.start() {
                    tracing::warn!("Deferred voice start failed: {}", e);
                }
            }
            return;
        }

        self.close_session(CloseReason::AutoEnd, now);
        self.clear_candidates();
        match self.machine.current() {
            SessionState::Running => self.schedule_restart(RestartCause::End, now),
            SessionState::PermissionWait if self.restart.in_flight().is_none() => {
                // Ended before ever confirming start.
                self.schedule_restart(RestartCause::End, now)
            }
            // Either a restart is already pending, the `end` belongs to
            // the run a restart replaced, or the manager is stopped.
            _ => {}
        }
    }

    // -------------------------------------------------------------------------
    // Timers
    // -------------------------------------------------------------------------

    /// Earliest pending timer deadline.
    pub fn next_deadline(&self) -> Option<TimestampMs> {
        match (self.restart.deadline(), self.resolver.idle_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Fire every timer whose deadline has passed.
    pub fn fire_due_timers(&mut self) {
        let now = self.clock.now();
        if let Some(candidate) = self.resolver.take_idle_commit(now) {
            self.telemetry.record(
                now,
                self.session_id(),
                EventName::CandidateIdleCommit,
                json!({ "index": 0 }),
            );
            self.publish(VoiceNotice::CandidatesCleared);
            self.commit(&candidate.text, "idle", now);
        }
        if let Some(fired) = self.restart.take_due(now) {
            self.on_restart_due(fired, now);
        }
    }

    fn schedule_restart(&mut self, cause: RestartCause, now: TimestampMs) {
        if self.manual_stop || !self.machine.current().is_active() {
            return;
        }
        let scheduled = self.restart.schedule(cause, now);
        self.telemetry.record(
            now,
            self.session_id(),
            EventName::RestartScheduled,
            json!({
                "cause": cause,
                "delayMs": scheduled.due_at.millis_since(now),
                "dueAt": scheduled.due_at,
                "attempt": self.restart.attempts() + 1,
            }),
        );
        self.enter(SessionState::RestartWait);
    }

    fn on_restart_due(&mut self, fired: ScheduledRestart, now: TimestampMs) {
        if !can_auto_restart(self.manual_stop, self.foreground) {
            self.telemetry.record(
                now,
                self.session_id(),
                EventName::RestartCancelled,
                json!({ "cause": fired.cause, "reason": "guard" }),
            );
            self.enter(SessionState::Stopped);
            return;
        }
        if self.restart.ceiling_reached() {
            self.abandon_restarts(fired, now);
            return;
        }

        let attempt = self.restart.begin_attempt(fired, now);
        tracing::debug!(attempt = attempt.attempt, cause = %fired.cause, "Restarting engine");
        self.telemetry.record(
            now,
            self.session_id(),
            EventName::RestartAttempt,
            json!({
                "attempt": attempt.attempt,
                "cause": fired.cause,
                "delayMs": now.millis_since(fired.scheduled_at),
            }),
        );

        self.engine.configure(&EngineConfig::from_voice(&self.config));
        self.enter(SessionState::PermissionWait);
        if let Err(failure) = self.engine.start() {
            self.telemetry.record(
                now,
                self.session_id(),
                EventName::StartFailed,
                json!({ "reason": failure.to_string(), "restart": true }),
            );
            self.restart.clear();
            self.close_session(CloseReason::Error, now);
            self.clear_candidates();
            self.enter(SessionState::Stopped);
            self.notify_failure(VoiceError::StartFailed(failure).to_string());
        }
    }

    fn abandon_restarts(&mut self, fired: ScheduledRestart, now: TimestampMs) {
        let attempts = self.restart.attempts();
        tracing::warn!(attempts, cause = %fired.cause, "Restart ceiling reached");
        self.telemetry.record(
            now,
            self.session_id(),
            EventName::RestartAbandoned,
            json!({ "attempts": attempts, "cause": fired.cause }),
        );
        self.restart.clear();
        self.close_session(CloseReason::Error, now);
        self.clear_candidates();
        self.enter(SessionState::Stopped);
        self.notify_failure(format!(
            "Speech recognition stopped after {} restart attempts",
            attempts
        ));
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn stop_with(&mut self, cause: StopCause) -> bool {
        let state = self.machine.current();
        if !state.is_active() {
            // Drop a start still waiting on the previous run's `end`.
            return std::mem::take(&mut self.restart_after_stop);
        }
        let now = self.clock.now();
        self.awaiting_end = self.end_expected();
        self.manual_stop = true;
        if self.restart.cancel() {
            self.telemetry.record(
                now,
                self.session_id(),
                EventName::RestartCancelled,
                json!({ "reason": "stop" }),
            );
        }
        self.restart.clear();
        self.engine.stop();
        self.telemetry.record(
            now,
            self.session_id(),
            EventName::StopRequested,
            json!({ "cause": cause.as_str(), "state": state }),
        );
        self.enter(SessionState::Stopped);
        true
    }

    /// Whether the engine still owes an `end` for the current run.
    fn end_expected(&self) -> bool {
        self.machine.current().is_listening() || self.session.is_some()
    }

    fn fail_session(&mut self, code: &ErrorCode, now: TimestampMs) {
        tracing::warn!(code = %code, "Fatal engine error");
        self.manual_stop = false;
        self.awaiting_end = false;
        self.restart_after_stop = false;
        self.restart.clear();
        self.close_session(CloseReason::Error, now);
        self.clear_candidates();
        self.enter(SessionState::Stopped);
        self.notify_failure(format!("Speech recognition error: {}", code));
    }

    fn commit(&mut self, text: &str, source: &str, now: TimestampMs) {
        let Some(insertion) = self.inserter.insert(&mut self.host, text) else {
            return;
        };
        if let Some(session) = self.session.as_mut() {
            session.append_committed(text);
        }
        self.telemetry.record(
            now,
            self.session_id(),
            EventName::TranscriptInserted,
            json!({
                "mode": insertion.mode,
                "source": source,
                "at": insertion.at,
                "chars": text.chars().count(),
            }),
        );
    }

    fn close_session(&mut self, reason: CloseReason, now: TimestampMs) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        if self.telemetry.close_session(&mut session, reason, now) {
            tracing::info!(
                session_id = %session.id,
                reason = %reason,
                final_chars = session.final_chars_total,
                "Voice session closed"
            );
        }
    }

    fn clear_candidates(&mut self) {
        if self.resolver.clear() {
            self.publish(VoiceNotice::CandidatesCleared);
        }
    }

    fn enter(&mut self, target: SessionState) {
        if self.machine.current() == target {
            return;
        }
        if let Err(e) = self.machine.transition(target) {
            tracing::warn!("{}", e);
            return;
        }
        self.publish(VoiceNotice::StatusChanged { state: target });
        self.publish_lock();
    }

    fn publish_lock(&mut self) {
        let lock = InputLock::for_state(self.machine.current(), self.config.insert_mode);
        if lock != self.lock {
            self.lock = lock;
            self.publish(VoiceNotice::InputLockChanged { lock });
        }
    }

    fn notify_failure(&self, message: String) {
        tracing::warn!("{}", message);
        self.publish(VoiceNotice::Failure { message });
    }

    fn publish(&self, notice: VoiceNotice) {
        // No subscribers is fine.
        let _ = self.notices.send(notice);
    }

    fn session_id(&self) -> Option<uuid::Uuid> {
        self.session.as_ref().map(|s| s.id)
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn state(&self) -> SessionState {
        self.machine.current()
    }

    pub fn now(&self) -> TimestampMs {
        self.clock.now()
    }

    pub fn input_lock(&self) -> InputLock {
        self.lock
    }

    pub fn active_session(&self) -> Option<&VoiceSession> {
        self.session.as_ref()
    }

    pub fn pending_candidates(&self) -> Option<&[Candidate]> {
        self.resolver.pending()
    }

    pub fn pending_restart(&self) -> Option<ScheduledRestart> {
        self.restart.pending()
    }

    pub fn restart_attempts(&self) -> u32 {
        self.restart.attempts()
    }

    pub fn manual_stop_requested(&self) -> bool {
        self.manual_stop
    }

    pub fn config(&self) -> &VoiceConfig {
        &self.config
    }

    pub fn telemetry(&self) -> &TelemetryRecorder {
        &self.telemetry
    }

    pub fn export_snapshot(&self) -> ExportSnapshot {
        self.telemetry
            .export_snapshot(self.clock.now(), self.session.as_ref())
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn into_host(self) -> H {
        self.host
    }
}

// =============================================================================
// Tests
// =============================================================================
