//! Core types and utilities shared by every layer of the handler SDK.
//!
//! # Serialization
//! - [`Serde`]: Pluggable codec between a Rust type and bytes
//! - [`GeneralSerde`], [`JsonSerde`], [`BytesSerde`], [`SchemaSerde`]: Built-in codecs
//! - [`serialize_value`] / [`deserialize_value`]: The JSON rules the built-in codecs share
//!
//! # Structured Schemas
//! - [`SchemaModel`]: Capability of types with a declared schema
//! - [`TypeHint`]: Declared type of a handler input or output
//! - [`kind`]: Autoref checks behind [`type_hint!`](crate::type_hint)
//!
//! # Domain Model
//! - [`Invocation`]: Identity, headers and input of the invocation being run
//! - [`ServiceTag`], [`ServiceKind`], [`HandlerKind`]: Service classification
//! - [`Failure`], [`TerminalError`]: Non-retryable failures
//!
//! # Error Handling
//! - [`CoreError`]: Core error type with proper error chains
//! - [`Result<T>`]: Type alias for Results using CoreError
//!
//! # Example
//!
//! ```
//! use praxis::core::{GeneralSerde, Serde};
//!
//! let serde = GeneralSerde::<Option<u32>>::new();
//! assert_eq!(serde.serialize(&Some(3)).unwrap(), b"3");
//! assert!(serde.serialize(&None).unwrap().is_empty());
//! assert_eq!(serde.deserialize(b"").unwrap(), None);
//! ```

mod error;
mod failure;
mod invocation;
mod schema;
mod serialization;
mod service;

pub use error::{CoreError, Result};
pub use failure::{Failure, TerminalError};
pub use invocation::Invocation;
pub use schema::{kind, SchemaModel, TypeHint};
pub use serialization::{
    deserialize_value, serialize_value, BytesSerde, GeneralSerde, JsonSerde, SchemaSerde, Serde,
    SerdeKind, ANY_MEDIA_TYPE, APPLICATION_JSON, APPLICATION_OCTET_STREAM,
};
pub use service::{HandlerKind, ServiceKind, ServiceTag};
