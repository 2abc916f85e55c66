//! Arbitration between alternative transcriptions of one final result.
//!
//! A final result either commits its top alternative directly or becomes the
//! single pending candidate set, which is resolved by an explicit selection
//! or, with idle behavior `auto`, by the idle timer committing candidate 0.

use serde::{Deserialize, Serialize};

use koedeam_core::config::VoiceConfig;
use koedeam_core::types::{IdleBehavior, NoConfidenceRule, TimestampMs};

use crate::engine::{Alternative, MAX_ALTERNATIVES};
use crate::timer::TimerSlot;

/// One alternative transcription offered to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub text: String,
    pub confidence: Option<f64>,
}

impl Candidate {
    pub fn new(text: impl Into<String>, confidence: Option<f64>) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

impl From<Alternative> for Candidate {
    fn from(alt: Alternative) -> Self {
        Self {
            text: alt.transcript,
            confidence: alt.confidence,
        }
    }
}

/// Whether a candidate list needs the selection panel.
pub fn should_show_candidates(
    list: &[Candidate],
    threshold: f64,
    rule: NoConfidenceRule,
) -> bool {
    if list.len() <= 1 {
        return false;
    }
    match list[0].confidence {
        None => rule != NoConfidenceRule::Direct,
        Some(confidence) => confidence < threshold,
    }
}

/// Outcome of offering a final result to the resolver.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Commit this text right away.
    Commit(Candidate),
    /// The panel is shown; `idle_deadline` is set when the idle timer runs.
    Pending {
        candidates: Vec<Candidate>,
        idle_deadline: Option<TimestampMs>,
    },
    /// Nothing to commit.
    Empty,
}

/// A resolved selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Index actually used after falling back.
    pub index: usize,
    pub candidate: Candidate,
}

#[derive(Debug)]
pub struct CandidateResolver {
    threshold: f64,
    no_confidence_rule: NoConfidenceRule,
    idle_behavior: IdleBehavior,
    idle_ms: u64,
    pending: Option<Vec<Candidate>>,
    idle: TimerSlot<()>,
}

impl CandidateResolver {
    pub fn new(config: &VoiceConfig) -> Self {
        Self {
            threshold: config.candidate_threshold,
            no_confidence_rule: config.no_confidence_rule,
            idle_behavior: config.idle_behavior,
            idle_ms: config.idle_ms,
            pending: None,
            idle: TimerSlot::new(),
        }
    }

    /// Pick up new settings. A pending set keeps its current timer.
    pub fn update_config(&mut self, config: &VoiceConfig) {
        self.threshold = config.candidate_threshold;
        self.no_confidence_rule = config.no_confidence_rule;
        self.idle_behavior = config.idle_behavior;
        self.idle_ms = config.idle_ms;
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Decide what to do with a final result's alternatives.
    ///
    /// Any pending set is discarded first, uncommitted.
    pub fn offer(&mut self, alternatives: Vec<Candidate>, now: TimestampMs) -> Resolution {
        if self.clear() {
            tracing::debug!("Pending candidates replaced by a newer final result");
        }

        let mut candidates = alternatives;
        candidates.truncate(MAX_ALTERNATIVES);

        if !should_show_candidates(&candidates, self.threshold, self.no_confidence_rule) {
            return match candidates.into_iter().next() {
                Some(top) if !top.text.is_empty() => Resolution::Commit(top),
                _ => Resolution::Empty,
            };
        }

        let idle_deadline = match self.idle_behavior {
            IdleBehavior::Auto => {
                let deadline = now.add_millis(self.idle_ms);
                self.idle.arm(deadline, ());
                Some(deadline)
            }
            IdleBehavior::Hold => None,
        };
        self.pending = Some(candidates.clone());
        Resolution::Pending {
            candidates,
            idle_deadline,
        }
    }

    /// Resolve the pending set with the user's choice.
    ///
    /// No-op without a pending set; an out-of-range index falls back to 0.
    pub fn apply_selection(&mut self, index: usize) -> Option<Selection> {
        let mut candidates = self.pending.take()?;
        self.idle.cancel();
        let index = if index < candidates.len() { index } else { 0 };
        if candidates.is_empty() {
            return None;
        }
        Some(Selection {
            index,
            candidate: candidates.swap_remove(index),
        })
    }

    /// Candidate 0 of the pending set if the idle timer has elapsed.
    pub fn take_idle_commit(&mut self, now: TimestampMs) -> Option<Candidate> {
        self.idle.take_due(now)?;
        self.apply_selection(0).map(|selection| selection.candidate)
    }

    pub fn idle_deadline(&self) -> Option<TimestampMs> {
        self.idle.deadline()
    }

    pub fn pending(&self) -> Option<&[Candidate]> {
        self.pending.as_deref()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Drop the pending set without committing. Returns whether one existed.
    pub fn clear(&mut self) -> bool {
        self.idle.cancel();
        self.pending.take().is_some()
    }
}

// =============================================================================
// Tests
// =============================================================================
