use thiserror::Error;

/// Top-level error type for Koedeam.
///
/// Subsystem crates define their own error types and implement
/// `From<SubsystemError> for KoedeamError` so that the `?` operator works
/// across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KoedeamError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Recognition engine error: {0}")]
    Engine(String),

    #[error("Recognition engine unavailable")]
    EngineUnavailable,

    #[error("Voice session error: {0}")]
    Voice(String),

    #[error("Insertion error: {0}")]
    Insertion(String),

    #[error("Telemetry error: {0}")]
    Telemetry(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for KoedeamError {
    fn from(err: toml::de::Error) -> Self {
        KoedeamError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for KoedeamError {
    fn from(err: toml::ser::Error) -> Self {
        KoedeamError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for KoedeamError {
    fn from(err: serde_json::Error) -> Self {
        KoedeamError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Koedeam operations.
pub type Result<T> = std::result::Result<T, KoedeamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = KoedeamError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");
    }

    #[test]
    fn test_error_display_all_variants() {
        let cases: Vec<(KoedeamError, &str)> = vec![
            (
                KoedeamError::Config("bad key".to_string()),
                "Configuration error: bad key",
            ),
            (
                KoedeamError::Engine("busy".to_string()),
                "Recognition engine error: busy",
            ),
            (
                KoedeamError::EngineUnavailable,
                "Recognition engine unavailable",
            ),
            (
                KoedeamError::Voice("already active".to_string()),
                "Voice session error: already active",
            ),
            (
                KoedeamError::Insertion("range".to_string()),
                "Insertion error: range",
            ),
            (
                KoedeamError::Telemetry("full".to_string()),
                "Telemetry error: full",
            ),
            (
                KoedeamError::Serialization("invalid json".to_string()),
                "Serialization error: invalid json",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: KoedeamError = io_err.into();
        assert!(matches!(err, KoedeamError::Io(_)));
        assert!(err.to_string().starts_with("I/O error:"));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let err: std::result::Result<toml::Value, _> = toml::from_str("invalid = [[[");
        let converted: KoedeamError = err.unwrap_err().into();
        assert!(matches!(converted, KoedeamError::Config(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let err: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let converted: KoedeamError = err.unwrap_err().into();
        assert!(matches!(converted, KoedeamError::Serialization(_)));
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let io_result: std::result::Result<i32, std::io::Error> = Ok(42);
            let value = io_result?;
            Ok(value.to_string())
        }

        assert_eq!(inner().unwrap(), "42");
    }
}
