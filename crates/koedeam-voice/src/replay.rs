//! Deterministic replay engine.
//!
//! Plays a recorded fixture of engine events instead of listening to a
//! microphone. The script is split into runs, each ending with `end`; every
//! `start()` plays the next run into the driver channel. Once the script is
//! used up, `start()` fails, which ends the restart chain.

use std::collections::VecDeque;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use koedeam_core::error::{KoedeamError, Result};

use crate::driver::{DriverInput, DriverSender};
use crate::engine::{EngineConfig, EngineEvent, RecognitionEngine};
use crate::error::EngineFailure;

/// A recorded dictation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayFixture {
    pub id: String,
    /// Document text the replay should produce from an empty note.
    #[serde(default)]
    pub expected_text: String,
    pub events: Vec<ReplayStep>,
}

impl ReplayFixture {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let fixture: ReplayFixture = serde_json::from_str(&contents)?;
        if fixture.events.is_empty() {
            return Err(KoedeamError::Config(format!(
                "replay fixture {} has no events",
                path.display()
            )));
        }
        Ok(fixture)
    }
}

/// One scripted event and its offset from the start of its run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayStep {
    #[serde(default)]
    pub at_ms: u64,
    #[serde(flatten)]
    pub event: EngineEvent,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayMode {
    /// Deliver each run at once.
    #[default]
    Fast,
    /// Honour every step's `atMs` offset.
    Realtime,
}

impl fmt::Display for ReplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplayMode::Fast => write!(f, "fast"),
            ReplayMode::Realtime => write!(f, "realtime"),
        }
    }
}

impl FromStr for ReplayMode {
    type Err = KoedeamError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fast" => Ok(ReplayMode::Fast),
            "realtime" => Ok(ReplayMode::Realtime),
            other => Err(KoedeamError::Config(format!("unknown replay mode: {other}"))),
        }
    }
}

pub struct ReplayEngine {
    runs: VecDeque<Vec<ReplayStep>>,
    mode: ReplayMode,
    outbound: DriverSender,
    playing: Option<JoinHandle<()>>,
    config: Option<EngineConfig>,
}

impl ReplayEngine {
    pub fn new(fixture: &ReplayFixture, mode: ReplayMode, outbound: DriverSender) -> Self {
        Self {
            runs: split_runs(&fixture.events),
            mode,
            outbound,
            playing: None,
            config: None,
        }
    }

    pub fn remaining_runs(&self) -> usize {
        self.runs.len()
    }

    pub fn last_config(&self) -> Option<&EngineConfig> {
        self.config.as_ref()
    }

    fn is_playing(&self) -> bool {
        self.playing.as_ref().is_some_and(|task| !task.is_finished())
    }

    fn send(&self, event: EngineEvent) {
        if self.outbound.send(DriverInput::Engine(event)).is_err() {
            tracing::debug!("Replay driver gone, event dropped");
        }
    }
}

impl RecognitionEngine for ReplayEngine {
    fn configure(&mut self, config: &EngineConfig) {
        self.config = Some(config.clone());
    }

    fn start(&mut self) -> std::result::Result<(), EngineFailure> {
        if self.is_playing() {
            return Err(EngineFailure::Busy);
        }
        let run = self.runs.pop_front().ok_or(EngineFailure::Exhausted)?;
        tracing::debug!(steps = run.len(), remaining = self.runs.len(), mode = %self.mode, "Replaying run");

        match self.mode {
            ReplayMode::Fast => {
                for step in run {
                    self.send(step.event);
                }
            }
            ReplayMode::Realtime => {
                let handle = tokio::runtime::Handle::try_current()
                    .map_err(|e| EngineFailure::Rejected(e.to_string()))?;
                let outbound = self.outbound.clone();
                self.playing = Some(handle.spawn(async move {
                    let began = tokio::time::Instant::now();
                    for step in run {
                        tokio::time::sleep_until(began + Duration::from_millis(step.at_ms)).await;
                        if outbound.send(DriverInput::Engine(step.event)).is_err() {
                            return;
                        }
                    }
                }));
            }
        }
        Ok(())
    }

    fn stop(&mut self) {
        // A fast run is already queued in full, `end` included.
        if let Some(task) = self.playing.take() {
            if !task.is_finished() {
                task.abort();
                self.send(EngineEvent::End);
            }
        }
    }
}

/// Split a script into runs ending with `end`; a trailing run without one
/// gets it appended.
fn split_runs(events: &[ReplayStep]) -> VecDeque<Vec<ReplayStep>> {
    let mut runs = VecDeque::new();
    let mut current = Vec::new();
    for step in events {
        let is_end = step.event == EngineEvent::End;
        current.push(step.clone());
        if is_end {
            runs.push_back(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        let at_ms = current.last().map_or(0, |step: &ReplayStep| step.at_ms);
        current.push(ReplayStep {
            at_ms,
            event: EngineEvent::End,
        });
        runs.push_back(current);
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::driver_channel;

    const FIXTURE: &str = r#"{
        "id": "quiet_01",
        "expectedText": "こんにちは",
        "events": [
            {"atMs": 0, "type": "start"},
            {"atMs": 400, "type": "result", "resultIndex": 0, "results": [
                {"isFinal": true, "alternatives": [{"transcript": "こんにちは", "confidence": 0.92}]}
            ]},
            {"atMs": 900, "type": "end"},
            {"atMs": 0, "type": "start"},
            {"atMs": 3000, "type": "error", "error": "no-speech"}
        ]
    }"#;

    fn fixture() -> ReplayFixture {
        serde_json::from_str(FIXTURE).unwrap()
    }

    fn drain(rx: &mut crate::driver::DriverReceiver) -> Vec<EngineEvent> {
        std::iter::from_fn(|| rx.try_recv().ok())
            .filter_map(|input| match input {
                DriverInput::Engine(event) => Some(event),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_fixture_parses_and_splits() {
        let fixture = fixture();
        assert_eq!(fixture.expected_text, "こんにちは");
        assert_eq!(fixture.events[1].at_ms, 400);

        let runs = split_runs(&fixture.events);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].len(), 3);
        // Implicit `end` for the unterminated tail.
        assert_eq!(runs[1].last().unwrap().event, EngineEvent::End);
        assert_eq!(runs[1].last().unwrap().at_ms, 3000);
    }

    #[test]
    fn test_fast_mode_plays_one_run_per_start() {
        let (tx, mut rx) = driver_channel();
        let mut engine = ReplayEngine::new(&fixture(), ReplayMode::Fast, tx);

        engine.start().unwrap();
        let events = drain(&mut rx);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], EngineEvent::Start);
        assert_eq!(events[2], EngineEvent::End);

        engine.start().unwrap();
        assert_eq!(drain(&mut rx).len(), 3);
        assert_eq!(engine.start(), Err(EngineFailure::Exhausted));
    }

    #[tokio::test(start_paused = true)]
    async fn test_realtime_mode_honours_offsets() {
        let (tx, mut rx) = driver_channel();
        let mut engine = ReplayEngine::new(&fixture(), ReplayMode::Realtime, tx);
        let began = tokio::time::Instant::now();
        engine.start().unwrap();
        assert_eq!(engine.start(), Err(EngineFailure::Busy));

        let mut arrivals = Vec::new();
        for _ in 0..3 {
            match rx.recv().await {
                Some(DriverInput::Engine(event)) => arrivals.push((began.elapsed(), event)),
                other => panic!("unexpected input {:?}", other),
            }
        }
        assert_eq!(arrivals[1].0, Duration::from_millis(400));
        assert_eq!(arrivals[2], (Duration::from_millis(900), EngineEvent::End));
    }

    #[tokio::test(start_paused = true)]
    async fn test_realtime_stop_aborts_and_ends() {
        let (tx, mut rx) = driver_channel();
        let mut engine = ReplayEngine::new(&fixture(), ReplayMode::Realtime, tx);
        engine.start().unwrap();
        assert!(matches!(rx.recv().await, Some(DriverInput::Engine(EngineEvent::Start))));

        engine.stop();
        assert!(matches!(rx.recv().await, Some(DriverInput::Engine(EngineEvent::End))));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("realtime".parse::<ReplayMode>().unwrap(), ReplayMode::Realtime);
        assert!("slow".parse::<ReplayMode>().is_err());
    }
}
