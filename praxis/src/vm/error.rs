use super::engine::AsyncHandle;
use thiserror::Error;

/// An error reported by the engine itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("engine error [{code}]: {message}")]
pub struct EngineError {
    pub code: u16,
    pub message: String,
}

impl EngineError {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Session layer error type.
///
/// Apart from [`SessionError::Engine`], every variant is a violation of the
/// engine call protocol by the caller, not a runtime condition.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    /// The engine rejected the call.
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("engine session has already ended")]
    Ended,

    /// Only `sys_end` may follow a suspension.
    #[error("engine session is suspended")]
    Suspended,

    #[error("invocation output was already written")]
    OutputAlreadyWritten,

    #[error("invocation input was already taken")]
    InputAlreadyTaken,

    #[error("request input was already closed")]
    InputAlreadyClosed,

    #[error("engine is not ready to execute")]
    NotReady,

    #[error("`{operation}` requires the invocation input to be taken first")]
    NotExecuting { operation: &'static str },

    #[error("async handle {0} was not issued by this session")]
    UnknownHandle(AsyncHandle),

    #[error("engine left handle {0} unresolved after input was closed")]
    NotReadyAfterInputClosed(AsyncHandle),

    #[error("unexpected {result} result for handle {handle}")]
    UnexpectedResult {
        handle: AsyncHandle,
        result: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, SessionError>;
