//! Execution layer: the context handed to handlers and the dispatcher that
//! runs an invocation end to end.
//!
//! Module organization:
//! - `context`: Hides the await loop that feeds request input to the engine
//! - `dispatch`: Hides how handler results map to engine calls
//! - `error`: The [`HandlerError`] classification handlers report through
//!
//! # Example
//!
//! ```
//! use praxis::core::ServiceTag;
//! use praxis::executor::{dispatch, Context, HandlerError, HandlerTarget, InvocationOutcome};
//! use praxis::handler::{HandlerFn, HandlerIOBuilder, HandlerSignature, Registry};
//! use praxis::vm::InMemoryEngine;
//!
//! async fn visit(ctx: Context) -> Result<u32, HandlerError> {
//!     let visits = ctx.get::<u32>("visits").await?.unwrap_or(0) + 1;
//!     ctx.set("visits", &visits)?;
//!     Ok(visits)
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let registry = Registry::new();
//! registry
//!     .register(
//!         ServiceTag::object("Counter"),
//!         HandlerIOBuilder::new(),
//!         Some("visit"),
//!         None,
//!         HandlerSignature::<(), _>::new(HandlerFn::unary(visit)),
//!     )
//!     .unwrap();
//!
//! let engine = InMemoryEngine::builder().key("home").build();
//! let (tx, rx) = tokio::sync::mpsc::channel(1);
//! drop(tx);
//!
//! let response = dispatch(&registry, &HandlerTarget::new("Counter", "visit"), engine, rx)
//!     .await
//!     .unwrap();
//! assert_eq!(response.outcome, InvocationOutcome::Completed);
//! assert_eq!(response.body, b"1");
//! # }
//! ```

mod context;
mod dispatch;
mod error;

pub use context::{Context, RequestBody};
pub use dispatch::{dispatch, HandlerTarget, InvocationOutcome, InvocationResponse};
pub use error::HandlerError;
