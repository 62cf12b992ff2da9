use thiserror::Error;

/// Errors raised while building or registering a handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// Neither an explicit name nor the function's own name was available.
    #[error("a handler name must be provided")]
    MissingName,

    #[error("handler {handler} must accept at least the context parameter")]
    NoParameters { handler: String },

    #[error("handler {handler} accepts {count} parameters, at most 2 are supported")]
    TooManyParameters { handler: String, count: usize },

    /// The declared parameter list does not match the callable's shape.
    #[error("handler {handler} declares {declared} parameters but its callable takes {callable}")]
    ArityMismatch {
        handler: String,
        declared: usize,
        callable: usize,
    },

    #[error("handler {handler} is already registered on service {service}")]
    Duplicate { service: String, handler: String },
}

/// Errors raised when looking up a registered handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum LookupError {
    #[error("callable is not registered as a handler")]
    NotRegistered,

    #[error("no handler {handler} on service {service}")]
    UnknownHandler { service: String, handler: String },

    /// The handler exists but with different input or output types.
    #[error("handler {handler} is registered with different input/output types")]
    TypeMismatch { handler: String },
}
