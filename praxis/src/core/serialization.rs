//! Pluggable byte codecs for handler input, handler output and durable state.
//!
//! Every codec implements [`Serde`]. The JSON-backed codecs share one rule:
//! an empty buffer decodes as JSON `null`, and a value that encodes to
//! `null` is written as an empty buffer. This is what lets `()` and
//! `Option<T>` travel through an invocation with no body at all.

use super::error::{CoreError, Result};
use super::schema::SchemaModel;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;

pub const APPLICATION_JSON: &str = "application/json";
pub const APPLICATION_OCTET_STREAM: &str = "application/octet-stream";
pub const ANY_MEDIA_TYPE: &str = "*/*";

const JSON_NULL: &[u8] = b"null";

/// Identifies the built-in codec family a [`Serde`] belongs to.
///
/// Handler construction only swaps in a structured-schema codec when the
/// configured codec is [`SerdeKind::General`], so a codec chosen on purpose
/// (even another JSON one) is never replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SerdeKind {
    General,
    Json,
    Bytes,
    Schema,
    Custom,
}

/// A bidirectional codec between `T` and bytes.
pub trait Serde<T>: Send + Sync {
    fn serialize(&self, value: &T) -> Result<Vec<u8>>;

    fn deserialize(&self, buf: &[u8]) -> Result<T>;

    /// Media type this codec is willing to decode.
    fn accept(&self) -> &'static str {
        APPLICATION_JSON
    }

    /// Media type of the bytes this codec produces.
    fn content_type(&self) -> &'static str {
        APPLICATION_JSON
    }

    fn kind(&self) -> SerdeKind {
        SerdeKind::Custom
    }
}

/// Serializes a value to JSON bytes; `null` becomes an empty buffer.
///
/// # Errors
/// Returns `CoreError::Serialization` if the value cannot be serialized.
pub fn serialize_value<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let bytes = serde_json::to_vec(value).map_err(CoreError::Serialization)?;
    if bytes == JSON_NULL {
        return Ok(Vec::new());
    }
    Ok(bytes)
}

/// Deserializes JSON bytes to a value; an empty buffer reads as `null`.
///
/// # Errors
/// Returns `CoreError::Deserialization` if the bytes cannot be deserialized.
pub fn deserialize_value<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let bytes = if bytes.is_empty() { JSON_NULL } else { bytes };
    serde_json::from_slice(bytes).map_err(CoreError::Deserialization)
}

/// The default codec. Plain JSON for any serde type.
pub struct GeneralSerde<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> GeneralSerde<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for GeneralSerde<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for GeneralSerde<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for GeneralSerde<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GeneralSerde")
    }
}

impl<T: Serialize + DeserializeOwned> Serde<T> for GeneralSerde<T> {
    fn serialize(&self, value: &T) -> Result<Vec<u8>> {
        serialize_value(value)
    }

    fn deserialize(&self, buf: &[u8]) -> Result<T> {
        deserialize_value(buf)
    }

    fn kind(&self) -> SerdeKind {
        SerdeKind::General
    }
}

/// An explicitly chosen JSON codec.
///
/// Encodes exactly like [`GeneralSerde`], but reports [`SerdeKind::Json`] so
/// that handler construction leaves it in place for schema types.
pub struct JsonSerde<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonSerde<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonSerde<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonSerde<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonSerde<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JsonSerde")
    }
}

impl<T: Serialize + DeserializeOwned> Serde<T> for JsonSerde<T> {
    fn serialize(&self, value: &T) -> Result<Vec<u8>> {
        serialize_value(value)
    }

    fn deserialize(&self, buf: &[u8]) -> Result<T> {
        deserialize_value(buf)
    }

    fn kind(&self) -> SerdeKind {
        SerdeKind::Json
    }
}

/// Passes raw bytes through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesSerde;

impl Serde<Vec<u8>> for BytesSerde {
    fn serialize(&self, value: &Vec<u8>) -> Result<Vec<u8>> {
        Ok(value.clone())
    }

    fn deserialize(&self, buf: &[u8]) -> Result<Vec<u8>> {
        Ok(buf.to_vec())
    }

    fn accept(&self) -> &'static str {
        ANY_MEDIA_TYPE
    }

    fn content_type(&self) -> &'static str {
        APPLICATION_OCTET_STREAM
    }

    fn kind(&self) -> SerdeKind {
        SerdeKind::Bytes
    }
}

/// JSON codec for structured-schema models.
///
/// Decoding runs [`SchemaModel::validate`] after the JSON parse, so a value
/// that is well-formed but violates the model is rejected at the boundary.
pub struct SchemaSerde<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> SchemaSerde<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for SchemaSerde<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for SchemaSerde<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T: SchemaModel> fmt::Debug for SchemaSerde<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SchemaSerde<{}>", T::schema_name())
    }
}

impl<T: SchemaModel> Serde<T> for SchemaSerde<T> {
    fn serialize(&self, value: &T) -> Result<Vec<u8>> {
        serialize_value(value)
    }

    fn deserialize(&self, buf: &[u8]) -> Result<T> {
        let value: T = deserialize_value(buf)?;
        value
            .validate()
            .map_err(|message| CoreError::Validation {
                model: T::schema_name(),
                message,
            })?;
        Ok(value)
    }

    fn kind(&self) -> SerdeKind {
        SerdeKind::Schema
    }
}
