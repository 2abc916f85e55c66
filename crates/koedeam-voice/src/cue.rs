//! Optional audible cue played when capture starts.

use crate::error::CueError;

pub trait StartCue: Send {
    fn play(&mut self) -> Result<(), CueError>;
}

type CueFactory = Box<dyn FnOnce() -> Result<Box<dyn StartCue>, CueError> + Send>;

/// Builds its cue on first use and reuses it afterwards.
///
/// A failed build is not retried; every failure is logged and swallowed.
pub struct LazyCue {
    factory: Option<CueFactory>,
    cue: Option<Box<dyn StartCue>>,
}

impl LazyCue {
    pub fn new<F>(factory: F) -> Self
    where
        F: FnOnce() -> Result<Box<dyn StartCue>, CueError> + Send + 'static,
    {
        Self {
            factory: Some(Box::new(factory)),
            cue: None,
        }
    }

    /// Play the cue, best effort.
    pub fn play(&mut self) {
        if let Some(factory) = self.factory.take() {
            match factory() {
                Ok(cue) => self.cue = Some(cue),
                Err(e) => tracing::debug!("Start cue unavailable: {}", e),
            }
        }
        if let Some(cue) = self.cue.as_mut() {
            if let Err(e) = cue.play() {
                tracing::debug!("Start cue failed: {}", e);
            }
        }
    }

    pub fn is_built(&self) -> bool {
        self.cue.is_some()
    }
}

impl std::fmt::Debug for LazyCue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyCue")
            .field("built", &self.cue.is_some())
            .field("pending_build", &self.factory.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct CountingCue {
        plays: Arc<AtomicU32>,
        fail: bool,
    }

    impl StartCue for CountingCue {
        fn play(&mut self) -> Result<(), CueError> {
            self.plays.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(CueError::Playback("muted".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_builds_once_and_reuses() {
        let builds = Arc::new(AtomicU32::new(0));
        let plays = Arc::new(AtomicU32::new(0));
        let (b, p) = (builds.clone(), plays.clone());
        let mut cue = LazyCue::new(move || {
            b.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(CountingCue { plays: p, fail: false }) as Box<dyn StartCue>)
        });
        assert!(!cue.is_built());
        cue.play();
        cue.play();
        assert!(cue.is_built());
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(plays.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failures_are_swallowed() {
        let mut broken = LazyCue::new(|| Err(CueError::Unavailable("no audio".to_string())));
        broken.play();
        broken.play();
        assert!(!broken.is_built());

        let plays = Arc::new(AtomicU32::new(0));
        let p = plays.clone();
        let mut failing = LazyCue::new(move || {
            Ok(Box::new(CountingCue { plays: p, fail: true }) as Box<dyn StartCue>)
        });
        failing.play();
        assert_eq!(plays.load(Ordering::SeqCst), 1);
    }
}
