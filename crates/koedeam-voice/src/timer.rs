//! Single-slot cancellable deadline.
//!
//! Arming a slot always replaces whatever was pending, so at most one timer
//! of a kind can ever fire. The slot does not sleep by itself; the driver
//! asks for the earliest deadline and calls `take_due` when it has passed.

use koedeam_core::types::TimestampMs;

#[derive(Debug, Clone)]
pub struct TimerSlot<T> {
    pending: Option<(TimestampMs, T)>,
}

impl<T> Default for TimerSlot<T> {
    fn default() -> Self {
        Self { pending: None }
    }
}

impl<T> TimerSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the slot, returning the payload of the timer it replaced.
    pub fn arm(&mut self, deadline: TimestampMs, payload: T) -> Option<T> {
        self.pending
            .replace((deadline, payload))
            .map(|(_, previous)| previous)
    }

    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take().map(|(_, payload)| payload)
    }

    pub fn deadline(&self) -> Option<TimestampMs> {
        self.pending.as_ref().map(|(deadline, _)| *deadline)
    }

    pub fn payload(&self) -> Option<&T> {
        self.pending.as_ref().map(|(_, payload)| payload)
    }

    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    /// Disarm and return the payload if the deadline is at or before `now`.
    pub fn take_due(&mut self, now: TimestampMs) -> Option<T> {
        match self.pending {
            Some((deadline, _)) if deadline <= now => self.cancel(),
            _ => None,
        }
    }
}
