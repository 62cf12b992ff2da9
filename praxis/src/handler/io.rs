//! Per-handler I/O configuration.
//!
//! [`HandlerIOBuilder`] is what a service author configures; handler
//! construction freezes it into a [`HandlerIO`] once the declared input and
//! output types are known. At that point a default codec is swapped for a
//! structured-schema codec when the declared type has a schema. Explicitly
//! chosen codecs are kept.

use crate::core::{GeneralSerde, Serde, SerdeKind, TypeHint};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Frozen I/O configuration of one handler.
pub struct HandlerIO<I, O> {
    accept: String,
    content_type: String,
    input_serde: Arc<dyn Serde<I>>,
    output_serde: Arc<dyn Serde<O>>,
    input_type: Option<TypeHint<I>>,
    output_type: Option<TypeHint<O>>,
}

impl<I, O> HandlerIO<I, O> {
    pub fn accept(&self) -> &str {
        &self.accept
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn input_serde(&self) -> &dyn Serde<I> {
        self.input_serde.as_ref()
    }

    pub fn output_serde(&self) -> &dyn Serde<O> {
        self.output_serde.as_ref()
    }

    /// Declared input type; absent for handlers that take no input.
    pub fn input_type(&self) -> Option<&TypeHint<I>> {
        self.input_type.as_ref()
    }

    pub fn output_type(&self) -> Option<&TypeHint<O>> {
        self.output_type.as_ref()
    }
}

impl<I, O> fmt::Debug for HandlerIO<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerIO")
            .field("accept", &self.accept)
            .field("content_type", &self.content_type)
            .field("input_serde", &self.input_serde.kind())
            .field("output_serde", &self.output_serde.kind())
            .field("input_type", &self.input_type)
            .field("output_type", &self.output_type)
            .finish()
    }
}

/// Author-facing I/O configuration.
///
/// # Example
///
/// ```
/// use praxis::core::JsonSerde;
/// use praxis::handler::HandlerIOBuilder;
/// use std::sync::Arc;
///
/// let io = HandlerIOBuilder::<String, u64>::new()
///     .accept("application/vnd.orders+json")
///     .output_serde(Arc::new(JsonSerde::new()));
/// # let _ = io;
/// ```
pub struct HandlerIOBuilder<I, O> {
    accept: Option<String>,
    content_type: Option<String>,
    input_serde: Arc<dyn Serde<I>>,
    output_serde: Arc<dyn Serde<O>>,
}

impl<I, O> HandlerIOBuilder<I, O>
where
    I: Serialize + DeserializeOwned + 'static,
    O: Serialize + DeserializeOwned + 'static,
{
    /// A configuration using the default codec on both sides.
    pub fn new() -> Self {
        Self::with_serdes(
            Arc::new(GeneralSerde::<I>::new()),
            Arc::new(GeneralSerde::<O>::new()),
        )
    }
}

impl<I, O> Default for HandlerIOBuilder<I, O>
where
    I: Serialize + DeserializeOwned + 'static,
    O: Serialize + DeserializeOwned + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<I, O> HandlerIOBuilder<I, O> {
    pub fn with_serdes(input_serde: Arc<dyn Serde<I>>, output_serde: Arc<dyn Serde<O>>) -> Self {
        Self {
            accept: None,
            content_type: None,
            input_serde,
            output_serde,
        }
    }

    /// Overrides the accepted media type. Defaults to the input codec's.
    pub fn accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }

    /// Overrides the produced media type. Defaults to the output codec's.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn input_serde(mut self, serde: Arc<dyn Serde<I>>) -> Self {
        self.input_serde = serde;
        self
    }

    pub fn output_serde(mut self, serde: Arc<dyn Serde<O>>) -> Self {
        self.output_serde = serde;
        self
    }

    pub(crate) fn build(
        self,
        input_type: Option<TypeHint<I>>,
        output_type: Option<TypeHint<O>>,
    ) -> HandlerIO<I, O> {
        let input_serde = select_serde(self.input_serde, input_type.as_ref());
        let output_serde = select_serde(self.output_serde, output_type.as_ref());
        let accept = self
            .accept
            .unwrap_or_else(|| input_serde.accept().to_string());
        let content_type = self
            .content_type
            .unwrap_or_else(|| output_serde.content_type().to_string());

        HandlerIO {
            accept,
            content_type,
            input_serde,
            output_serde,
            input_type,
            output_type,
        }
    }
}

fn select_serde<T>(current: Arc<dyn Serde<T>>, hint: Option<&TypeHint<T>>) -> Arc<dyn Serde<T>> {
    if current.kind() != SerdeKind::General {
        return current;
    }
    hint.and_then(TypeHint::schema_serde).unwrap_or(current)
}
