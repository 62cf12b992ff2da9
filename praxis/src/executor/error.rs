use crate::core::{CoreError, TerminalError};
use crate::vm::SessionError;
use thiserror::Error;

/// Error type returned by handlers and by the [`Context`](super::Context)
/// operations they call.
///
/// Only [`HandlerError::Terminal`] becomes the invocation's recorded
/// failure. [`HandlerError::Suspended`] means the engine suspended and the
/// invocation will be re-delivered. Every other variant is reported to the
/// engine as a transient error, which leads to a retry.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HandlerError {
    /// A non-retryable failure.
    #[error(transparent)]
    Terminal(#[from] TerminalError),

    /// The engine suspended the invocation while a result was awaited.
    #[error("invocation suspended")]
    Suspended,

    /// The engine call protocol was violated or the engine rejected a call.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// A durable state value could not be encoded or decoded.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Handler failed with the given reason (retryable).
    #[error("handler failed: {0}")]
    Failed(String),
}

impl HandlerError {
    pub fn terminal(message: impl Into<String>) -> Self {
        HandlerError::Terminal(TerminalError::new(message))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, HandlerError::Terminal(_))
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, HandlerError::Suspended)
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        HandlerError::Failed(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        HandlerError::Failed(message.to_string())
    }
}
