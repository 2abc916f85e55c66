use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Enums
// =============================================================================

/// Where a committed transcript lands in the note.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertMode {
    /// Replace the current selection; the caret ends after the inserted text.
    ///
    /// Older settings files stored this mode as `replace`.
    #[default]
    #[serde(alias = "replace")]
    Cursor,
    /// Append at the end of the note without disturbing the user's selection.
    Append,
}

impl fmt::Display for InsertMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsertMode::Cursor => write!(f, "cursor"),
            InsertMode::Append => write!(f, "append"),
        }
    }
}

/// What to do with a final result whose top candidate carries no confidence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoConfidenceRule {
    /// Show the candidate panel.
    #[default]
    Show,
    /// Commit the top candidate directly.
    Direct,
}

/// Behavior of an open candidate panel when the user does nothing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdleBehavior {
    /// Commit the top candidate after the idle timeout.
    #[default]
    Auto,
    /// Wait for an explicit selection.
    Hold,
}

// =============================================================================
// Value objects
// =============================================================================

/// Operator-supplied expected output used to score a session after the fact.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EvalSpec {
    pub label: String,
    pub expected_chars: u64,
    pub expected_tail: String,
}

/// Milliseconds since the Unix epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimestampMs(pub i64);

impl TimestampMs {
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp_millis())
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.0).unwrap_or_default()
    }

    /// RFC 3339 rendering with millisecond precision.
    pub fn to_rfc3339(&self) -> String {
        self.to_datetime()
            .to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Milliseconds elapsed from `earlier` to `self`.
    pub fn millis_since(&self, earlier: TimestampMs) -> i64 {
        self.0 - earlier.0
    }

    pub fn add_millis(&self, ms: u64) -> Self {
        Self(self.0.saturating_add(ms as i64))
    }
}

impl fmt::Display for TimestampMs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_mode_serialization() {
        assert_eq!(
            serde_json::to_string(&InsertMode::Append).unwrap(),
            "\"append\""
        );
        assert_eq!(InsertMode::default(), InsertMode::Cursor);
    }

    #[test]
    fn test_insert_mode_legacy_replace_alias() {
        let mode: InsertMode = serde_json::from_str("\"replace\"").unwrap();
        assert_eq!(mode, InsertMode::Cursor);
    }

    #[test]
    fn test_rule_and_idle_defaults() {
        assert_eq!(NoConfidenceRule::default(), NoConfidenceRule::Show);
        assert_eq!(IdleBehavior::default(), IdleBehavior::Auto);
        let rule: NoConfidenceRule = serde_json::from_str("\"direct\"").unwrap();
        assert_eq!(rule, NoConfidenceRule::Direct);
    }

    #[test]
    fn test_eval_spec_camel_case() {
        let spec: EvalSpec = serde_json::from_str(
            r#"{"label":"quiet-01","expectedChars":100,"expectedTail":"です。"}"#,
        )
        .unwrap();
        assert_eq!(spec.expected_chars, 100);
        assert_eq!(spec.expected_tail, "です。");
    }

    #[test]
    fn test_timestamp_arithmetic() {
        let a = TimestampMs(1_000);
        let b = a.add_millis(650);
        assert_eq!(b.millis_since(a), 650);
        assert!(b > a);
    }

    #[test]
    fn test_timestamp_rfc3339() {
        let ts = TimestampMs(1_700_000_000_123);
        assert_eq!(ts.to_rfc3339(), "2023-11-14T22:13:20.123Z");
    }

    #[test]
    fn test_timestamp_serializes_as_integer() {
        assert_eq!(serde_json::to_string(&TimestampMs(42)).unwrap(), "42");
    }
}
