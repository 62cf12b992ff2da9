//! Engine layer: the protocol state machine behind every invocation.
//!
//! - [`Engine`]: Trait implemented by protocol engines
//! - [`EngineSession`]: Wrapper that enforces the engine call protocol
//! - [`InMemoryEngine`]: Scriptable engine for tests and local development
//!
//! # Example
//!
//! ```
//! use praxis::vm::{AsyncResult, EngineSession, InMemoryEngine};
//!
//! let engine = InMemoryEngine::builder()
//!     .input(b"3".to_vec())
//!     .state("count", b"41".to_vec())
//!     .build();
//! let mut session = EngineSession::new(engine);
//!
//! session.notify_input(b"").unwrap();
//! let invocation = session.sys_input().unwrap();
//! assert_eq!(invocation.input_buffer(), b"3");
//!
//! let handle = session.sys_get_state("count").unwrap();
//! assert_eq!(
//!     session.take_async_result(handle).unwrap(),
//!     AsyncResult::Bytes(b"41".to_vec())
//! );
//! session.sys_end().unwrap();
//! ```

mod engine;
mod error;
pub mod memory;
mod session;

pub use engine::{
    AsyncHandle, Engine, EngineValue, Output, ResponseHead, RetryDecision, RunRetryConfig,
};
pub use error::{EngineError, Result, SessionError};
pub use memory::{
    EngineJournal, InMemoryEngine, InMemoryEngineBuilder, JournalHandle, RunProposal,
};
pub use session::{AsyncResult, EngineSession, SessionState, SharedSession};

pub(crate) use session::lock as lock_session;
