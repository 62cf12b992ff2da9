//! Praxis: invocation execution layer for durable-execution handlers
//!
//! `praxis` (πρᾶξις, Greek for "action" or "doing") takes a service
//! handler written as an ordinary async function and runs it inside a
//! durable-execution protocol engine: request bytes go in, the handler's
//! input is decoded, durable state is read and written through the engine,
//! and the handler's output or failure is recorded as the invocation's
//! final result.
//!
//! # Features
//!
//! - **Pluggable codecs**: JSON by default, raw bytes, or validated structured schemas
//! - **Declarative handlers**: `#[handler]` derives name, arity and type hints
//! - **Protocol safety**: [`vm::EngineSession`] turns engine misuse into typed errors
//! - **Suspension**: handlers suspend transparently when the engine lacks data
//! - **Type-safe registry**: typed receipts and function-item lookups
//!
//! # Quick Start
//!
//! ```
//! use praxis::prelude::*;
//!
//! #[handler]
//! async fn greet(ctx: Context, name: String) -> Result<String, HandlerError> {
//!     let greeted = ctx.get::<u32>("greeted").await?.unwrap_or(0);
//!     ctx.set("greeted", &(greeted + 1))?;
//!     Ok(format!("Hello, {name}!"))
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Registry::new();
//! registry.register(
//!     ServiceTag::object("Greeter"),
//!     HandlerIOBuilder::new(),
//!     None,
//!     Some(HandlerKind::Exclusive),
//!     greet_handler(),
//! )?;
//!
//! let engine = InMemoryEngine::builder().input(br#""Ada""#.to_vec()).build();
//! let (tx, rx) = tokio::sync::mpsc::channel(1);
//! tx.send(Vec::new()).await?;
//!
//! let response = dispatch(&registry, &HandlerTarget::new("Greeter", "greet"), engine, rx).await?;
//! assert_eq!(response.body, br#""Hello, Ada!""#);
//! # Ok(())
//! # }
//! ```
//!
//! # Module Organization
//!
//! Following Parnas's information hiding principles, each module hides specific design
//! decisions that are likely to change:
//!
//! - [`core`]: Foundation types and traits (hides serialization format)
//! - [`vm`]: Engine boundary (hides the engine call protocol)
//! - [`handler`]: Handler descriptors (hides codec selection and type erasure)
//! - [`executor`]: Invocation execution (hides the await loop and outcome mapping)

// Allow the derive macro to reference ::praxis from within this crate
extern crate self as praxis;

pub mod core;
pub mod executor;
pub mod handler;
pub mod vm;

// Re-export commonly used types for convenience
pub use crate::core::{
    deserialize_value, serialize_value, CoreError, Failure, HandlerKind, Invocation,
    Result as CoreResult, SchemaModel, Serde, ServiceKind, ServiceTag, TerminalError, TypeHint,
};

pub use crate::executor::{
    dispatch, Context, HandlerError, HandlerTarget, InvocationOutcome, InvocationResponse,
};

pub use crate::handler::{
    invoke_handler, make_handler, ConfigError, Handler, HandlerIOBuilder, HandlerSignature,
    LookupError, Registry,
};

pub use crate::vm::{Engine, EngineSession, InMemoryEngine, SessionError};

// Re-export proc-macros
pub use praxis_macros::{handler, SchemaModel};

// Re-export dependencies used in public API
pub use serde;

/// Prelude module for convenient glob imports
///
/// # Example
///
/// ```
/// use praxis::prelude::*;
/// ```
pub mod prelude {
    pub use crate::core::{
        BytesSerde, GeneralSerde, HandlerKind, JsonSerde, SchemaModel, Serde, ServiceTag,
        TerminalError,
    };

    pub use crate::executor::{
        dispatch, Context, HandlerError, HandlerTarget, InvocationOutcome, InvocationResponse,
    };

    pub use crate::handler::{HandlerIOBuilder, Registry};

    pub use crate::vm::InMemoryEngine;

    pub use praxis_macros::{handler, SchemaModel};
}
