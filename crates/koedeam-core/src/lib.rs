//! Koedeam core crate - shared error type, configuration and value types.

pub mod config;
pub mod error;
pub mod types;

pub use config::{KoedeamConfig, TelemetryConfig, VoiceConfig};
pub use error::{KoedeamError, Result};
pub use types::*;
