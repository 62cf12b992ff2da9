use thiserror::Error;

/// Core error type for the praxis handler SDK.
///
/// Raised by serializers and by parsing of the small closed vocabularies
/// (service kinds, handler kinds). Serializer errors keep the underlying
/// `serde_json` error as their source.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoreError {
    /// Encoding a value to bytes failed.
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),

    /// Decoding bytes to a value failed.
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] serde_json::Error),

    /// The bytes decoded, but the structured-schema model rejected the value.
    #[error("validation of {model} failed: {message}")]
    Validation { model: &'static str, message: String },

    /// An unknown service kind string was encountered during parsing.
    #[error("invalid service kind: {0}")]
    InvalidServiceKind(String),

    /// An unknown handler kind string was encountered during parsing.
    #[error("invalid handler kind: {0}")]
    InvalidHandlerKind(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
