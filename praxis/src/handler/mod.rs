//! Handler descriptors and their construction, registration and invocation.
//!
//! Module organization:
//! - `io`: Hides codec selection behind [`HandlerIOBuilder`] / [`HandlerIO`]
//! - `descriptor`: The [`Handler`] descriptor and the [`HandlerSignature`] it is built from
//! - `factory`: Validation and assembly in [`make_handler`]
//! - `registry`: Ownership and lookup in [`Registry`]
//! - `invoke`: The decode / call / encode path in [`invoke_handler`]
//!
//! # Example
//!
//! ```
//! use praxis::core::ServiceTag;
//! use praxis::executor::{Context, HandlerError};
//! use praxis::handler::{HandlerFn, HandlerIOBuilder, HandlerSignature, Registry};
//!
//! async fn double(_ctx: Context, n: i32) -> Result<i32, HandlerError> {
//!     Ok(n * 2)
//! }
//!
//! let registry = Registry::new();
//! registry
//!     .register(
//!         ServiceTag::service("Math"),
//!         HandlerIOBuilder::new(),
//!         Some("double"),
//!         None,
//!         HandlerSignature::new(HandlerFn::binary(double)),
//!     )
//!     .unwrap();
//! assert!(registry.resolve("Math", "double").is_ok());
//! ```

mod descriptor;
mod error;
mod factory;
mod invoke;
mod io;
mod registry;

pub use descriptor::{Arity, Handler, HandlerFn, HandlerFuture, HandlerSignature, Parameter};
pub use error::{ConfigError, LookupError};
pub use factory::make_handler;
pub use invoke::invoke_handler;
pub use io::{HandlerIO, HandlerIOBuilder};
pub use registry::{ErasedHandler, HandlerToken, Registry};
