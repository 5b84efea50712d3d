//! Error types for session acquisition and construction-time configuration.
//!
//! Sample-level anomalies (silence, low confidence, non-finite estimates) are
//! not errors anywhere in this crate; they become "no note" for one tick.

use std::fmt;
use std::io;

/// Why a pitch source failed to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitErrorKind {
    PermissionDenied,
    DeviceUnavailable,
    ModelLoadFailed,
    Unknown,
}

impl fmt::Display for InitErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InitErrorKind::PermissionDenied => "permission denied",
            InitErrorKind::DeviceUnavailable => "device unavailable",
            InitErrorKind::ModelLoadFailed => "model load failed",
            InitErrorKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Acquisition failure from `PitchSource::start`. Fatal to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitError {
    pub kind: InitErrorKind,
    pub message: String,
}

impl InitError {
    pub fn new(kind: InitErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(InitErrorKind::PermissionDenied, message)
    }

    pub fn device_unavailable(message: impl Into<String>) -> Self {
        Self::new(InitErrorKind::DeviceUnavailable, message)
    }

    pub fn model_load_failed(message: impl Into<String>) -> Self {
        Self::new(InitErrorKind::ModelLoadFailed, message)
    }
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for InitError {}

/// Rejected configuration, lesson or catalog. Raised at construction only.
#[derive(Debug)]
pub enum ConfigError {
    EmptyLesson { lesson_id: String },
    UnknownNote { name: String },
    DuplicateChallenge { lesson_id: String, challenge_id: String },
    DuplicateLesson { lesson_id: String },
    UnknownLesson { lesson_id: String },
    InvalidValue { field: &'static str, reason: String },
    Io(io::Error),
    Parse(serde_json::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EmptyLesson { lesson_id } => {
                write!(f, "lesson '{}' has no challenges", lesson_id)
            }
            ConfigError::UnknownNote { name } => write!(f, "unknown note name '{}'", name),
            ConfigError::DuplicateChallenge {
                lesson_id,
                challenge_id,
            } => write!(
                f,
                "lesson '{}' defines challenge '{}' more than once",
                lesson_id, challenge_id
            ),
            ConfigError::DuplicateLesson { lesson_id } => {
                write!(f, "catalog defines lesson '{}' more than once", lesson_id)
            }
            ConfigError::UnknownLesson { lesson_id } => {
                write!(f, "no lesson with id '{}'", lesson_id)
            }
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "invalid {}: {}", field, reason)
            }
            ConfigError::Io(e) => write!(f, "read failed: {}", e),
            ConfigError::Parse(e) => write!(f, "parse failed: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ConfigError {
    fn from(e: io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Terminal failure of a running session.
#[derive(Debug)]
pub enum SessionError {
    Acquisition(InitError),
    Config(ConfigError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Acquisition(e) => write!(f, "could not start pitch source ({})", e),
            SessionError::Config(e) => write!(f, "invalid configuration: {}", e),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Acquisition(e) => Some(e),
            SessionError::Config(e) => Some(e),
        }
    }
}

impl From<InitError> for SessionError {
    fn from(e: InitError) -> Self {
        SessionError::Acquisition(e)
    }
}

impl From<ConfigError> for SessionError {
    fn from(e: ConfigError) -> Self {
        SessionError::Config(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_error_keeps_kind_and_message() {
        let err: SessionError = InitError::permission_denied("microphone blocked").into();
        match &err {
            SessionError::Acquisition(e) => {
                assert_eq!(e.kind, InitErrorKind::PermissionDenied);
                assert_eq!(e.message, "microphone blocked");
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(err.to_string().contains("permission denied: microphone blocked"));
    }
}
