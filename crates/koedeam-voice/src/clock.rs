//! Time sources for session timestamps and timer deadlines.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use koedeam_core::types::TimestampMs;

/// Source of epoch-millisecond timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> TimestampMs;
}

/// Wall clock anchored once, then advanced by tokio's monotonic clock.
///
/// Timestamps never go backwards, and paused tokio time (`start_paused`)
/// moves this clock together with `tokio::time::sleep`.
#[derive(Debug, Clone)]
pub struct SystemClock {
    anchor_wall: TimestampMs,
    anchor: tokio::time::Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            anchor_wall: TimestampMs::now(),
            anchor: tokio::time::Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> TimestampMs {
        let elapsed = self.anchor.elapsed().as_millis() as u64;
        self.anchor_wall.add_millis(elapsed)
    }
}

/// Hand-driven clock for deterministic tests and replays.
///
/// Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ms: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start: TimestampMs) -> Self {
        Self {
            now_ms: Arc::new(AtomicI64::new(start.0)),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now_ms.fetch_add(ms as i64, Ordering::SeqCst);
    }

    pub fn set(&self, at: TimestampMs) {
        self.now_ms.store(at.0, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> TimestampMs {
        TimestampMs(self.now_ms.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new(TimestampMs(1_000));
        let other = clock.clone();
        clock.advance(250);
        assert_eq!(other.now(), TimestampMs(1_250));
        other.set(TimestampMs(5));
        assert_eq!(clock.now(), TimestampMs(5));
    }

    #[test]
    fn test_system_clock_is_near_wall_time() {
        let clock = SystemClock::new();
        let diff = (clock.now().0 - TimestampMs::now().0).abs();
        assert!(diff < 1_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_system_clock_follows_paused_tokio_time() {
        let clock = SystemClock::new();
        let before = clock.now();
        tokio::time::sleep(std::time::Duration::from_millis(650)).await;
        assert_eq!(clock.now().millis_since(before), 650);
    }
}
