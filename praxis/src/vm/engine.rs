use super::error::EngineError;
use crate::core::{Failure, Invocation};
use std::fmt;
use std::time::Duration;

/// Opaque token naming a pending engine result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AsyncHandle(u32);

impl AsyncHandle {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for AsyncHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A resolved result as the engine reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineValue {
    Void,
    Bytes(Vec<u8>),
    StateKeys(Vec<String>),
    Failure(Failure),
    /// The engine cannot make progress without the invocation being
    /// re-delivered later.
    Suspended,
}

/// Final output of an invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Success(Vec<u8>),
    Failure(Failure),
}

/// Exponential retry bounds for a run that failed with a transient error.
///
/// Unset fields leave the decision to the engine's defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunRetryConfig {
    pub initial_interval: Option<Duration>,
    pub max_attempts: Option<u32>,
    pub max_duration: Option<Duration>,
}

impl RunRetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = Some(interval);
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn max_duration(mut self, duration: Duration) -> Self {
        self.max_duration = Some(duration);
        self
    }
}

/// The engine's answer to a transient run failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// The invocation is torn down and the run retried on re-delivery.
    Retry,
    /// Retries are exhausted; the run handle resolves with the failure.
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status_code: u16,
    pub headers: Vec<(String, String)>,
}

/// The protocol engine that owns the invocation journal.
///
/// An engine is a synchronous state machine: it is fed request bytes,
/// answers syscalls with [`AsyncHandle`]s, resolves those handles once the
/// bytes it needs have arrived, and produces response bytes. It is driven
/// by exactly one invocation at a time, through an
/// [`EngineSession`](super::EngineSession) that enforces the call protocol.
pub trait Engine: Send {
    fn get_response_head(&self) -> ResponseHead;

    fn notify_input(&mut self, buf: &[u8]);

    fn notify_input_closed(&mut self);

    fn notify_error(&mut self, message: &str, stacktrace: Option<&str>);

    /// Next chunk of response bytes. A chunk may be empty; only `None`
    /// means the response is complete.
    fn take_output(&mut self) -> Option<Vec<u8>>;

    fn is_ready_to_execute(&self) -> Result<bool, EngineError>;

    fn notify_await_point(&mut self, handle: AsyncHandle);

    /// `Ok(None)` means the result is not available yet.
    fn take_async_result(&mut self, handle: AsyncHandle)
        -> Result<Option<EngineValue>, EngineError>;

    fn sys_input(&mut self) -> Result<Invocation, EngineError>;

    fn sys_get_state(&mut self, name: &str) -> Result<AsyncHandle, EngineError>;

    fn sys_get_state_keys(&mut self) -> Result<AsyncHandle, EngineError>;

    fn sys_set_state(&mut self, name: &str, value: Vec<u8>) -> Result<(), EngineError>;

    fn sys_clear_state(&mut self, name: &str) -> Result<(), EngineError>;

    fn sys_clear_all_state(&mut self) -> Result<(), EngineError>;

    /// A durable timer; the handle resolves empty once it fires.
    fn sys_sleep(&mut self, duration: Duration) -> Result<AsyncHandle, EngineError>;

    /// Registers a named side effect. The handle resolves with the run's
    /// journaled result.
    fn sys_run(&mut self, name: &str) -> Result<AsyncHandle, EngineError>;

    /// Whether the side effect behind `handle` must be executed now.
    /// `false` when its result is already journaled.
    fn should_execute_run(&self, handle: AsyncHandle) -> bool;

    fn propose_run_completion_success(
        &mut self,
        handle: AsyncHandle,
        output: Vec<u8>,
    ) -> Result<(), EngineError>;

    fn propose_run_completion_failure(
        &mut self,
        handle: AsyncHandle,
        failure: Failure,
    ) -> Result<(), EngineError>;

    fn propose_run_completion_transient(
        &mut self,
        handle: AsyncHandle,
        failure: Failure,
        attempt_duration: Duration,
        config: &RunRetryConfig,
    ) -> Result<RetryDecision, EngineError>;

    fn sys_write_output(&mut self, output: Output) -> Result<(), EngineError>;

    fn sys_end(&mut self) -> Result<(), EngineError>;
}

/// Implement Engine for `Box<dyn Engine>` so sessions can be type-erased.
impl Engine for Box<dyn Engine> {
    fn get_response_head(&self) -> ResponseHead {
        (**self).get_response_head()
    }

    fn notify_input(&mut self, buf: &[u8]) {
        (**self).notify_input(buf)
    }

    fn notify_input_closed(&mut self) {
        (**self).notify_input_closed()
    }

    fn notify_error(&mut self, message: &str, stacktrace: Option<&str>) {
        (**self).notify_error(message, stacktrace)
    }

    fn take_output(&mut self) -> Option<Vec<u8>> {
        (**self).take_output()
    }

    fn is_ready_to_execute(&self) -> Result<bool, EngineError> {
        (**self).is_ready_to_execute()
    }

    fn notify_await_point(&mut self, handle: AsyncHandle) {
        (**self).notify_await_point(handle)
    }

    fn take_async_result(
        &mut self,
        handle: AsyncHandle,
    ) -> Result<Option<EngineValue>, EngineError> {
        (**self).take_async_result(handle)
    }

    fn sys_input(&mut self) -> Result<Invocation, EngineError> {
        (**self).sys_input()
    }

    fn sys_get_state(&mut self, name: &str) -> Result<AsyncHandle, EngineError> {
        (**self).sys_get_state(name)
    }

    fn sys_get_state_keys(&mut self) -> Result<AsyncHandle, EngineError> {
        (**self).sys_get_state_keys()
    }

    fn sys_set_state(&mut self, name: &str, value: Vec<u8>) -> Result<(), EngineError> {
        (**self).sys_set_state(name, value)
    }

    fn sys_clear_state(&mut self, name: &str) -> Result<(), EngineError> {
        (**self).sys_clear_state(name)
    }

    fn sys_clear_all_state(&mut self) -> Result<(), EngineError> {
        (**self).sys_clear_all_state()
    }

    fn sys_sleep(&mut self, duration: Duration) -> Result<AsyncHandle, EngineError> {
        (**self).sys_sleep(duration)
    }

    fn sys_run(&mut self, name: &str) -> Result<AsyncHandle, EngineError> {
        (**self).sys_run(name)
    }

    fn should_execute_run(&self, handle: AsyncHandle) -> bool {
        (**self).should_execute_run(handle)
    }

    fn propose_run_completion_success(
        &mut self,
        handle: AsyncHandle,
        output: Vec<u8>,
    ) -> Result<(), EngineError> {
        (**self).propose_run_completion_success(handle, output)
    }

    fn propose_run_completion_failure(
        &mut self,
        handle: AsyncHandle,
        failure: Failure,
    ) -> Result<(), EngineError> {
        (**self).propose_run_completion_failure(handle, failure)
    }

    fn propose_run_completion_transient(
        &mut self,
        handle: AsyncHandle,
        failure: Failure,
        attempt_duration: Duration,
        config: &RunRetryConfig,
    ) -> Result<RetryDecision, EngineError> {
        (**self).propose_run_completion_transient(handle, failure, attempt_duration, config)
    }

    fn sys_write_output(&mut self, output: Output) -> Result<(), EngineError> {
        (**self).sys_write_output(output)
    }

    fn sys_end(&mut self) -> Result<(), EngineError> {
        (**self).sys_end()
    }
}
