//! Drives one invocation from request bytes to response bytes.
//!
//! [`dispatch`] feeds the request body to the engine until it is ready,
//! resolves the target handler, runs it and records the outcome. Outcomes
//! map to engine calls as follows:
//!
//! | handler result            | engine call                   |
//! |---------------------------|-------------------------------|
//! | `Ok(bytes)`               | `sys_write_output` (success)  |
//! | `HandlerError::Terminal`  | `sys_write_output` (failure)  |
//! | engine suspended          | none                          |
//! | any other error           | `notify_error`                |
//!
//! Unless the engine suspended, the rest of the request body is read and
//! the input closed before the outcome is recorded. Whatever happens,
//! `sys_end` is called exactly once before the response bytes are drained.

use super::context::{drain_body, Context, RequestBody};
use super::error::HandlerError;
use crate::core::Failure;
use crate::handler::Registry;
use crate::vm::{lock_session, Engine, EngineSession, ResponseHead, SessionError, SharedSession};
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

/// Names the handler an invocation is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandlerTarget {
    pub service: String,
    pub handler: String,
}

impl HandlerTarget {
    pub fn new(service: impl Into<String>, handler: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            handler: handler.into(),
        }
    }
}

impl fmt::Display for HandlerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.handler)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationOutcome {
    /// A success output was written.
    Completed,
    /// A terminal failure was written.
    Failed(Failure),
    /// The engine suspended; nothing was written.
    Suspended,
    /// A transient error was reported to the engine.
    Errored(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationResponse {
    pub outcome: InvocationOutcome,
    pub head: ResponseHead,
    pub body: Vec<u8>,
}

/// Runs one invocation of the handler named by `target`.
///
/// # Errors
/// Returns a `SessionError` only when the engine call protocol was
/// violated or the engine rejected a call outside of handler code. Handler
/// failures are reported through [`InvocationOutcome`].
pub async fn dispatch<E: Engine + 'static>(
    registry: &Registry,
    target: &HandlerTarget,
    engine: E,
    body: RequestBody,
) -> Result<InvocationResponse, SessionError> {
    let session: SharedSession = Arc::new(Mutex::new(EngineSession::new(
        Box::new(engine) as Box<dyn Engine>
    )));

    let outcome = run(registry, target, &session, body).await;

    let mut guard = lock_session(&session);
    let ended = guard.sys_end();
    let head = guard.get_response_head();
    let mut bytes = Vec::new();
    while let Some(frame) = guard.take_output() {
        bytes.extend_from_slice(&frame);
    }
    drop(guard);

    let outcome = outcome.map_err(|e| {
        error!("Invocation of {} violated the engine protocol: {}", target, e);
        e
    })?;
    ended?;

    Ok(InvocationResponse {
        outcome,
        head,
        body: bytes,
    })
}

async fn run(
    registry: &Registry,
    target: &HandlerTarget,
    session: &SharedSession,
    mut body: RequestBody,
) -> Result<InvocationOutcome, SessionError> {
    // Feed input until the engine has what it needs to start.
    loop {
        if lock_session(session).is_ready_to_execute()? {
            break;
        }
        match body.recv().await {
            Some(chunk) => lock_session(session).notify_input(&chunk)?,
            None => {
                let mut guard = lock_session(session);
                guard.notify_input_closed()?;
                if !guard.is_ready_to_execute()? {
                    let message = "request body ended before the invocation could start";
                    warn!("Invocation of {} aborted: {}", target, message);
                    guard.notify_error(message, None)?;
                    return Ok(InvocationOutcome::Errored(message.to_string()));
                }
                break;
            }
        }
    }

    let handler = match registry.resolve(&target.service, &target.handler) {
        Ok(handler) => handler,
        Err(e) => {
            let message = e.to_string();
            warn!("Invocation of {} rejected: {}", target, message);
            lock_session(session).notify_error(&message, None)?;
            drain_body(session, &mut body).await?;
            return Ok(InvocationOutcome::Errored(message));
        }
    };

    let invocation = lock_session(session).sys_input()?;
    let input = invocation.input_buffer().to_vec();
    let invocation_id = invocation.invocation_id().to_string();
    debug!("Invoking {} (invocation {})", target, invocation_id);

    let ctx = Context::new(invocation, Arc::clone(session), body);
    let result = handler.invoke(ctx.clone(), input).await;

    // The handler may finish without consuming the whole body.
    let suspended = lock_session(session).is_suspended();
    if !suspended {
        ctx.drain_input().await?;
    }

    let mut guard = lock_session(session);
    handle_result(&mut *guard, target, &invocation_id, result)
}

/// Records the handler result on the session.
///
/// The session's suspension flag is checked first: a handler may have
/// mapped the suspension error to something else, but the engine must
/// still see no output.
fn handle_result<E: Engine>(
    session: &mut EngineSession<E>,
    target: &HandlerTarget,
    invocation_id: &str,
    result: Result<Vec<u8>, HandlerError>,
) -> Result<InvocationOutcome, SessionError> {
    if session.is_suspended() {
        info!("Invocation {} of {} suspended", invocation_id, target);
        return Ok(InvocationOutcome::Suspended);
    }

    match result {
        Ok(output) => {
            session.sys_write_output_success(output)?;
            info!("Invocation {} of {} completed", invocation_id, target);
            Ok(InvocationOutcome::Completed)
        }
        Err(HandlerError::Terminal(terminal)) => {
            let failure = Failure::from(terminal);
            info!(
                "Invocation {} of {} failed terminally: {}",
                invocation_id, target, failure
            );
            session.sys_write_output_failure(failure.clone())?;
            Ok(InvocationOutcome::Failed(failure))
        }
        Err(e) => {
            let message = match e {
                HandlerError::Suspended => {
                    "handler reported a suspension the engine did not request".to_string()
                }
                other => other.to_string(),
            };
            warn!(
                "Invocation {} of {} errored, engine will retry: {}",
                invocation_id, target, message
            );
            session.notify_error(&message, None)?;
            Ok(InvocationOutcome::Errored(message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Invocation, ServiceTag, TerminalError};
    use crate::handler::{HandlerFn, HandlerIOBuilder, HandlerSignature};
    use crate::vm::{
        AsyncHandle, EngineError, EngineValue, InMemoryEngine, Output, RetryDecision,
        RunRetryConfig,
    };
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio::sync::mpsc;

    async fn add_one(_ctx: Context, n: i64) -> Result<i64, HandlerError> {
        Ok(n + 1)
    }

    async fn refuse(_ctx: Context, _n: i64) -> Result<i64, HandlerError> {
        Err(TerminalError::with_code(403, "forbidden").into())
    }

    fn registry() -> Registry {
        let registry = Registry::new();
        registry
            .register(
                ServiceTag::service("Calc"),
                HandlerIOBuilder::new(),
                Some("add_one"),
                None,
                HandlerSignature::new(HandlerFn::binary(add_one)),
            )
            .unwrap();
        registry
            .register(
                ServiceTag::service("Calc"),
                HandlerIOBuilder::new(),
                Some("refuse"),
                None,
                HandlerSignature::new(HandlerFn::binary(refuse)),
            )
            .unwrap();
        registry
    }

    async fn swallow(ctx: Context) -> Result<u32, HandlerError> {
        let _ = ctx.get::<u32>("slow").await;
        Ok(1)
    }

    async fn fake_suspend(_ctx: Context) -> Result<u32, HandlerError> {
        Err(HandlerError::Suspended)
    }

    async fn read_stuck(ctx: Context) -> Result<u32, HandlerError> {
        Ok(ctx.get::<u32>("stuck").await?.unwrap_or(0))
    }

    fn unary_registry() -> Registry {
        let registry = Registry::new();
        let handlers: [(&str, HandlerFn<(), u32>); 3] = [
            ("swallow", HandlerFn::unary(swallow)),
            ("fake_suspend", HandlerFn::unary(fake_suspend)),
            ("read_stuck", HandlerFn::unary(read_stuck)),
        ];
        for (name, f) in handlers {
            registry
                .register(
                    ServiceTag::object("Watcher"),
                    HandlerIOBuilder::new(),
                    Some(name),
                    None,
                    HandlerSignature::new(f),
                )
                .unwrap();
        }
        registry
    }

    /// Splits every response into a header frame, an empty frame and the
    /// inner engine's bytes.
    struct FramedEngine {
        inner: InMemoryEngine,
        frames: VecDeque<Vec<u8>>,
        framed: bool,
    }

    impl FramedEngine {
        fn new(inner: InMemoryEngine) -> Self {
            Self {
                inner,
                frames: VecDeque::new(),
                framed: false,
            }
        }
    }

    impl Engine for FramedEngine {
        fn get_response_head(&self) -> ResponseHead {
            self.inner.get_response_head()
        }

        fn notify_input(&mut self, buf: &[u8]) {
            self.inner.notify_input(buf)
        }

        fn notify_input_closed(&mut self) {
            self.inner.notify_input_closed()
        }

        fn notify_error(&mut self, message: &str, stacktrace: Option<&str>) {
            self.inner.notify_error(message, stacktrace)
        }

        fn take_output(&mut self) -> Option<Vec<u8>> {
            if !self.framed {
                self.framed = true;
                self.frames.push_back(b"hdr".to_vec());
                self.frames.push_back(Vec::new());
                while let Some(frame) = self.inner.take_output() {
                    self.frames.push_back(frame);
                }
            }
            self.frames.pop_front()
        }

        fn is_ready_to_execute(&self) -> Result<bool, EngineError> {
            self.inner.is_ready_to_execute()
        }

        fn notify_await_point(&mut self, handle: AsyncHandle) {
            self.inner.notify_await_point(handle)
        }

        fn take_async_result(
            &mut self,
            handle: AsyncHandle,
        ) -> Result<Option<EngineValue>, EngineError> {
            self.inner.take_async_result(handle)
        }

        fn sys_input(&mut self) -> Result<Invocation, EngineError> {
            self.inner.sys_input()
        }

        fn sys_get_state(&mut self, name: &str) -> Result<AsyncHandle, EngineError> {
            self.inner.sys_get_state(name)
        }

        fn sys_get_state_keys(&mut self) -> Result<AsyncHandle, EngineError> {
            self.inner.sys_get_state_keys()
        }

        fn sys_set_state(&mut self, name: &str, value: Vec<u8>) -> Result<(), EngineError> {
            self.inner.sys_set_state(name, value)
        }

        fn sys_clear_state(&mut self, name: &str) -> Result<(), EngineError> {
            self.inner.sys_clear_state(name)
        }

        fn sys_clear_all_state(&mut self) -> Result<(), EngineError> {
            self.inner.sys_clear_all_state()
        }

        fn sys_sleep(&mut self, duration: Duration) -> Result<AsyncHandle, EngineError> {
            self.inner.sys_sleep(duration)
        }

        fn sys_run(&mut self, name: &str) -> Result<AsyncHandle, EngineError> {
            self.inner.sys_run(name)
        }

        fn should_execute_run(&self, handle: AsyncHandle) -> bool {
            self.inner.should_execute_run(handle)
        }

        fn propose_run_completion_success(
            &mut self,
            handle: AsyncHandle,
            output: Vec<u8>,
        ) -> Result<(), EngineError> {
            self.inner.propose_run_completion_success(handle, output)
        }

        fn propose_run_completion_failure(
            &mut self,
            handle: AsyncHandle,
            failure: Failure,
        ) -> Result<(), EngineError> {
            self.inner.propose_run_completion_failure(handle, failure)
        }

        fn propose_run_completion_transient(
            &mut self,
            handle: AsyncHandle,
            failure: Failure,
            attempt_duration: Duration,
            config: &RunRetryConfig,
        ) -> Result<RetryDecision, EngineError> {
            self.inner
                .propose_run_completion_transient(handle, failure, attempt_duration, config)
        }

        fn sys_write_output(&mut self, output: Output) -> Result<(), EngineError> {
            self.inner.sys_write_output(output)
        }

        fn sys_end(&mut self) -> Result<(), EngineError> {
            self.inner.sys_end()
        }
    }

    fn body(chunks: &[&[u8]]) -> RequestBody {
        let (tx, rx) = mpsc::channel(chunks.len().max(1));
        for chunk in chunks {
            tx.try_send(chunk.to_vec()).unwrap();
        }
        rx
    }

    #[tokio::test]
    async fn test_success_writes_output() {
        let engine = InMemoryEngine::builder().input(b"41".to_vec()).build();
        let journal = engine.journal();

        let response = dispatch(
            &registry(),
            &HandlerTarget::new("Calc", "add_one"),
            engine,
            body(&[b"frame"]),
        )
        .await
        .unwrap();

        assert_eq!(response.outcome, InvocationOutcome::Completed);
        assert_eq!(response.body, b"42");
        assert_eq!(response.head.status_code, 200);

        let snapshot = journal.snapshot();
        assert_eq!(snapshot.outputs, vec![Output::Success(b"42".to_vec())]);
        assert_eq!(snapshot.end_calls, 1);
        // The handler never awaited, yet the whole body was read.
        assert!(snapshot.input_closed);
        assert_eq!(snapshot.input_chunks, 1);
    }

    #[tokio::test]
    async fn test_empty_frames_do_not_end_the_response() {
        let engine = InMemoryEngine::builder().input(b"41".to_vec()).build();

        let response = dispatch(
            &registry(),
            &HandlerTarget::new("Calc", "add_one"),
            FramedEngine::new(engine),
            body(&[b"frame"]),
        )
        .await
        .unwrap();

        assert_eq!(response.outcome, InvocationOutcome::Completed);
        assert_eq!(response.body, b"hdr42");
    }

    #[tokio::test]
    async fn test_terminal_error_writes_failure() {
        let engine = InMemoryEngine::builder().input(b"1".to_vec()).build();
        let journal = engine.journal();

        let response = dispatch(
            &registry(),
            &HandlerTarget::new("Calc", "refuse"),
            engine,
            body(&[]),
        )
        .await
        .unwrap();

        let failure = Failure::new(403, "forbidden");
        assert_eq!(response.outcome, InvocationOutcome::Failed(failure.clone()));
        assert_eq!(journal.snapshot().outputs, vec![Output::Failure(failure)]);
        assert_eq!(journal.snapshot().end_calls, 1);
    }

    #[tokio::test]
    async fn test_unknown_handler_is_reported() {
        let engine = InMemoryEngine::builder().build();
        let journal = engine.journal();

        let response = dispatch(
            &registry(),
            &HandlerTarget::new("Calc", "missing"),
            engine,
            body(&[b"frame"]),
        )
        .await
        .unwrap();

        assert!(matches!(response.outcome, InvocationOutcome::Errored(_)));
        assert_eq!(response.head.status_code, 500);
        let snapshot = journal.snapshot();
        assert!(snapshot.outputs.is_empty());
        assert_eq!(snapshot.errors.len(), 1);
        assert_eq!(snapshot.end_calls, 1);
        assert!(snapshot.input_closed);
    }

    #[tokio::test]
    async fn test_swallowed_suspension_writes_nothing() {
        let engine = InMemoryEngine::builder().unavailable_state("slow").build();
        let journal = engine.journal();

        let response = dispatch(
            &unary_registry(),
            &HandlerTarget::new("Watcher", "swallow"),
            engine,
            body(&[b"frame"]),
        )
        .await
        .unwrap();

        assert_eq!(response.outcome, InvocationOutcome::Suspended);
        assert!(response.body.is_empty());
        let snapshot = journal.snapshot();
        assert!(snapshot.outputs.is_empty());
        assert!(snapshot.errors.is_empty());
        assert_eq!(snapshot.end_calls, 1);
    }

    #[tokio::test]
    async fn test_spurious_suspension_is_reported() {
        let engine = InMemoryEngine::builder().build();
        let journal = engine.journal();

        let response = dispatch(
            &unary_registry(),
            &HandlerTarget::new("Watcher", "fake_suspend"),
            engine,
            body(&[b"frame"]),
        )
        .await
        .unwrap();

        assert!(matches!(response.outcome, InvocationOutcome::Errored(_)));
        let snapshot = journal.snapshot();
        assert!(snapshot.outputs.is_empty());
        assert_eq!(snapshot.errors.len(), 1);
        assert!(snapshot.errors[0].message.contains("did not request"));
        assert_eq!(snapshot.end_calls, 1);
    }

    #[tokio::test]
    async fn test_body_ends_before_ready() {
        let engine = InMemoryEngine::builder().ready_after_chunks(2).build();
        let journal = engine.journal();

        let response = dispatch(
            &registry(),
            &HandlerTarget::new("Calc", "add_one"),
            engine,
            body(&[b"only"]),
        )
        .await
        .unwrap();

        match response.outcome {
            InvocationOutcome::Errored(message) => {
                assert!(message.contains("before the invocation could start"))
            }
            other => panic!("expected an error outcome, got {other:?}"),
        }
        let snapshot = journal.snapshot();
        assert!(snapshot.input_closed);
        assert!(snapshot.outputs.is_empty());
        assert_eq!(snapshot.errors.len(), 1);
        assert_eq!(snapshot.end_calls, 1);
    }

    #[tokio::test]
    async fn test_not_ready_after_input_closed() {
        let engine = InMemoryEngine::builder().stalled_state("stuck").build();
        let journal = engine.journal();

        let response = dispatch(
            &unary_registry(),
            &HandlerTarget::new("Watcher", "read_stuck"),
            engine,
            body(&[b"frame"]),
        )
        .await
        .unwrap();

        match response.outcome {
            InvocationOutcome::Errored(message) => {
                assert!(message.contains("unresolved after input was closed"))
            }
            other => panic!("expected an error outcome, got {other:?}"),
        }
        let snapshot = journal.snapshot();
        assert!(snapshot.outputs.is_empty());
        assert_eq!(snapshot.errors.len(), 1);
    }
}
