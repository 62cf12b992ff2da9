use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A terminal failure as recorded by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub code: u16,
    pub message: String,
}

impl Failure {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// An error that must not be retried.
///
/// Returned from a handler, it is recorded as the invocation's final
/// failure output instead of being reported to the engine as a transient
/// error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("terminal error [{code}]: {message}")]
pub struct TerminalError {
    code: u16,
    message: String,
}

impl TerminalError {
    pub const DEFAULT_CODE: u16 = 500;

    pub fn new(message: impl Into<String>) -> Self {
        Self::with_code(Self::DEFAULT_CODE, message)
    }

    pub fn with_code(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<TerminalError> for Failure {
    fn from(err: TerminalError) -> Self {
        Failure::new(err.code, err.message)
    }
}

impl From<Failure> for TerminalError {
    fn from(failure: Failure) -> Self {
        TerminalError::with_code(failure.code, failure.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_error_defaults_to_500() {
        let err = TerminalError::new("boom");
        assert_eq!(err.code(), 500);
        assert_eq!(err.to_string(), "terminal error [500]: boom");

        let failure: Failure = err.into();
        assert_eq!(failure, Failure::new(500, "boom"));
    }

    #[test]
    fn test_failure_wire_shape() {
        let failure = Failure::new(404, "missing");
        let json = serde_json::to_string(&failure).unwrap();
        assert_eq!(json, r#"{"code":404,"message":"missing"}"#);
    }
}
