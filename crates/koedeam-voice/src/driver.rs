//! Async event loop around a [`VoiceSessionManager`].
//!
//! Engine events and user commands arrive on one inbound channel; the loop
//! sleeps until either a message arrives or the earliest timer deadline
//! passes, and handles exactly one thing at a time.

use std::time::Duration;

use tokio::sync::mpsc;

use koedeam_core::config::VoiceConfig;

use crate::document::HostEditor;
use crate::engine::{EngineEvent, RecognitionEngine};
use crate::manager::VoiceSessionManager;
use crate::state::SessionState;

pub type DriverSender = mpsc::UnboundedSender<DriverInput>;
pub type DriverReceiver = mpsc::UnboundedReceiver<DriverInput>;

/// A user action forwarded by the host UI.
#[derive(Debug, Clone, PartialEq)]
pub enum UserCommand {
    Start,
    Stop,
    SelectCandidate(usize),
    SetForeground(bool),
    SwitchDocument(Option<String>),
    ApplySettings(VoiceConfig),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DriverInput {
    Engine(EngineEvent),
    User(UserCommand),
    Shutdown,
}

pub fn driver_channel() -> (DriverSender, DriverReceiver) {
    mpsc::unbounded_channel()
}

pub struct SessionDriver<E: RecognitionEngine, H: HostEditor> {
    manager: VoiceSessionManager<E, H>,
    inbound: DriverReceiver,
}

impl<E: RecognitionEngine, H: HostEditor> SessionDriver<E, H> {
    pub fn new(manager: VoiceSessionManager<E, H>, inbound: DriverReceiver) -> Self {
        Self { manager, inbound }
    }

    pub fn manager(&self) -> &VoiceSessionManager<E, H> {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut VoiceSessionManager<E, H> {
        &mut self.manager
    }

    pub fn into_manager(self) -> VoiceSessionManager<E, H> {
        self.manager
    }

    /// Run until `Shutdown` or until every sender is gone.
    pub async fn run(mut self) -> VoiceSessionManager<E, H> {
        while self.step().await {}
        self.manager
    }

    /// Run until the manager is stopped with no timer pending and nothing
    /// is queued.
    pub async fn run_until_idle(&mut self) {
        loop {
            if self.is_idle() {
                match self.inbound.try_recv() {
                    Ok(DriverInput::Shutdown) => return,
                    Ok(input) => {
                        self.dispatch(input);
                        continue;
                    }
                    Err(_) => return,
                }
            }
            if !self.step().await {
                return;
            }
        }
    }

    /// Handle one input or one timer firing. Returns `false` on shutdown.
    pub async fn step(&mut self) -> bool {
        let wait = self.manager.next_deadline().map(|deadline| {
            let remaining = deadline.millis_since(self.manager.now()).max(0);
            Duration::from_millis(remaining as u64)
        });

        tokio::select! {
            biased;
            input = self.inbound.recv() => match input {
                Some(DriverInput::Shutdown) | None => false,
                Some(input) => {
                    self.dispatch(input);
                    true
                }
            },
            _ = tokio::time::sleep(wait.unwrap_or(Duration::ZERO)), if wait.is_some() => {
                self.manager.fire_due_timers();
                true
            }
        }
    }

    fn is_idle(&self) -> bool {
        self.manager.state() == SessionState::Stopped && self.manager.next_deadline().is_none()
    }

    fn dispatch(&mut self, input: DriverInput) {
        match input {
            DriverInput::Engine(event) => self.manager.handle_engine_event(event),
            DriverInput::User(command) => self.handle_command(command),
            DriverInput::Shutdown => {}
        }
    }

    fn handle_command(&mut self, command: UserCommand) {
        tracing::debug!(command = ?command, "User command");
        match command {
            UserCommand::Start => {
                if let Err(e) = self.manager.start() {
                    tracing::warn!("Voice start failed: {}", e);
                }
            }
            UserCommand::Stop => {
                self.manager.stop();
            }
            UserCommand::SelectCandidate(index) => {
                self.manager.select_candidate(index);
            }
            UserCommand::SetForeground(foreground) => self.manager.set_foreground(foreground),
            UserCommand::SwitchDocument(doc) => self.manager.document_switched(doc),
            UserCommand::ApplySettings(config) => {
                if let Err(e) = self.manager.apply_settings(config) {
                    tracing::warn!("Voice settings rejected: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use koedeam_core::config::KoedeamConfig;

    use crate::clock::SystemClock;
    use crate::document::TextBuffer;
    use crate::engine::{Alternative, MockEngine};

    fn driver() -> (SessionDriver<MockEngine, TextBuffer>, DriverSender) {
        let (tx, rx) = driver_channel();
        let manager = VoiceSessionManager::new(
            MockEngine::new(),
            TextBuffer::new(""),
            &KoedeamConfig::default(),
            Arc::new(SystemClock::new()),
        );
        (SessionDriver::new(manager, rx), tx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_fires_after_backoff() {
        let (mut driver, tx) = driver();
        tx.send(DriverInput::User(UserCommand::Start)).unwrap();
        tx.send(DriverInput::Engine(EngineEvent::Start)).unwrap();
        tx.send(DriverInput::Engine(EngineEvent::End)).unwrap();
        for _ in 0..3 {
            assert!(driver.step().await);
        }
        assert_eq!(driver.manager().state(), SessionState::RestartWait);

        let before = tokio::time::Instant::now();
        assert!(driver.step().await);
        assert_eq!(before.elapsed(), Duration::from_millis(650));
        assert_eq!(driver.manager().engine().start_calls(), 2);
        assert_eq!(driver.manager().state(), SessionState::PermissionWait);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_commit_through_driver() {
        let (mut driver, tx) = driver();
        tx.send(DriverInput::User(UserCommand::Start)).unwrap();
        tx.send(DriverInput::Engine(EngineEvent::Start)).unwrap();
        tx.send(DriverInput::Engine(EngineEvent::final_alternatives(vec![
            Alternative::new("一", Some(0.4)),
            Alternative::new("位置", Some(0.3)),
        ])))
        .unwrap();
        for _ in 0..3 {
            driver.step().await;
        }
        assert!(driver.manager().pending_candidates().is_some());

        driver.step().await;
        assert_eq!(driver.manager().host().text(), "一");
        assert!(driver.manager().pending_candidates().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_idle_after_stop() {
        let (mut driver, tx) = driver();
        for input in [
            DriverInput::User(UserCommand::Start),
            DriverInput::Engine(EngineEvent::Start),
            DriverInput::User(UserCommand::Stop),
            DriverInput::Engine(EngineEvent::End),
        ] {
            tx.send(input).unwrap();
        }
        driver.run_until_idle().await;
        assert_eq!(driver.manager().state(), SessionState::Stopped);
        assert_eq!(driver.manager().telemetry().session_count(), 1);
    }

    #[tokio::test]
    async fn test_run_returns_on_shutdown() {
        let (driver, tx) = driver();
        tx.send(DriverInput::Shutdown).unwrap();
        let manager = driver.run().await;
        assert_eq!(manager.state(), SessionState::Stopped);
    }
}
