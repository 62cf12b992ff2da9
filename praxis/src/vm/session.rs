//! Protocol-enforcing wrapper around an [`Engine`].
//!
//! [`EngineSession`] owns the engine for the duration of one invocation and
//! turns every misuse of the engine call protocol into a [`SessionError`]
//! instead of undefined engine behavior:
//!
//! ```text
//! Created --notify_input/notify_input_closed--> Fed
//! Fed --sys_input--> Executing
//! Executing --sys_write_output--> Completed
//! Executing --take_async_result = Suspended--> Suspended
//! Executing --propose_run_completion_transient = Retry--> Suspended
//! (any) --sys_end--> Ended
//! ```
//!
//! Resolved async results are memoized per handle, so polling a handle
//! again returns the same value without touching the engine.

use super::engine::{
    AsyncHandle, Engine, EngineValue, Output, ResponseHead, RetryDecision, RunRetryConfig,
};
use super::error::{Result, SessionError};
use crate::core::{Failure, Invocation};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

/// A session shared between the dispatcher and a handler's context.
pub type SharedSession = Arc<Mutex<EngineSession<Box<dyn Engine>>>>;

/// Locks a shared session.
///
/// # Panics
/// Panics if a previous holder panicked while holding the lock.
pub(crate) fn lock(session: &SharedSession) -> MutexGuard<'_, EngineSession<Box<dyn Engine>>> {
    session
        .lock()
        .expect("engine session mutex poisoned - unrecoverable state")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Fed,
    Executing,
    Completed,
    Suspended,
    Ended,
}

/// Result of polling an async handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsyncResult {
    /// Not available yet; the caller should feed more input.
    NotReady,
    Empty,
    Bytes(Vec<u8>),
    StateKeys(Vec<String>),
    Failure(Failure),
    Suspended,
}

impl AsyncResult {
    pub fn describe(&self) -> &'static str {
        match self {
            AsyncResult::NotReady => "not-ready",
            AsyncResult::Empty => "empty",
            AsyncResult::Bytes(_) => "bytes",
            AsyncResult::StateKeys(_) => "state-keys",
            AsyncResult::Failure(_) => "failure",
            AsyncResult::Suspended => "suspended",
        }
    }
}

impl From<EngineValue> for AsyncResult {
    fn from(value: EngineValue) -> Self {
        match value {
            EngineValue::Void => AsyncResult::Empty,
            EngineValue::Bytes(bytes) => AsyncResult::Bytes(bytes),
            EngineValue::StateKeys(keys) => AsyncResult::StateKeys(keys),
            EngineValue::Failure(failure) => AsyncResult::Failure(failure),
            EngineValue::Suspended => AsyncResult::Suspended,
        }
    }
}

pub struct EngineSession<E: Engine> {
    engine: E,
    state: SessionState,
    input_closed: bool,
    issued: HashSet<AsyncHandle>,
    resolved: HashMap<AsyncHandle, AsyncResult>,
}

impl<E: Engine> EngineSession<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            state: SessionState::Created,
            input_closed: false,
            issued: HashSet::new(),
            resolved: HashMap::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_suspended(&self) -> bool {
        self.state == SessionState::Suspended
    }

    pub fn is_ended(&self) -> bool {
        self.state == SessionState::Ended
    }

    pub fn is_input_closed(&self) -> bool {
        self.input_closed
    }

    pub fn get_response_head(&self) -> ResponseHead {
        self.engine.get_response_head()
    }

    pub fn notify_input(&mut self, buf: &[u8]) -> Result<()> {
        self.ensure_live()?;
        if self.input_closed {
            return Err(SessionError::InputAlreadyClosed);
        }
        self.engine.notify_input(buf);
        self.mark_fed();
        Ok(())
    }

    pub fn notify_input_closed(&mut self) -> Result<()> {
        self.ensure_live()?;
        if self.input_closed {
            return Err(SessionError::InputAlreadyClosed);
        }
        self.engine.notify_input_closed();
        self.input_closed = true;
        self.mark_fed();
        Ok(())
    }

    /// Reports a non-terminal error; the engine will ask for a retry.
    pub fn notify_error(&mut self, message: &str, stacktrace: Option<&str>) -> Result<()> {
        self.ensure_live()?;
        self.engine.notify_error(message, stacktrace);
        Ok(())
    }

    /// Response bytes are drainable in every state, including after the end.
    pub fn take_output(&mut self) -> Option<Vec<u8>> {
        self.engine.take_output()
    }

    pub fn is_ready_to_execute(&self) -> Result<bool> {
        self.ensure_live()?;
        Ok(self.engine.is_ready_to_execute()?)
    }

    pub fn notify_await_point(&mut self, handle: AsyncHandle) -> Result<()> {
        self.ensure_executing("notify_await_point")?;
        self.ensure_issued(handle)?;
        self.engine.notify_await_point(handle);
        Ok(())
    }

    /// Polls a handle. `NotReady` has no side effects; a resolved value is
    /// memoized and returned again on every later poll of the same handle.
    pub fn take_async_result(&mut self, handle: AsyncHandle) -> Result<AsyncResult> {
        self.ensure_executing("take_async_result")?;
        self.ensure_issued(handle)?;
        if let Some(result) = self.resolved.get(&handle) {
            return Ok(result.clone());
        }

        let Some(value) = self.engine.take_async_result(handle)? else {
            return Ok(AsyncResult::NotReady);
        };

        let result = AsyncResult::from(value);
        if result == AsyncResult::Suspended {
            debug!(%handle, "Engine suspended while awaiting handle");
            self.state = SessionState::Suspended;
        } else {
            self.resolved.insert(handle, result.clone());
        }
        Ok(result)
    }

    pub fn sys_input(&mut self) -> Result<Invocation> {
        self.ensure_live()?;
        match self.state {
            SessionState::Executing | SessionState::Completed => {
                return Err(SessionError::InputAlreadyTaken)
            }
            _ => {}
        }
        if !self.engine.is_ready_to_execute()? {
            return Err(SessionError::NotReady);
        }
        let invocation = self.engine.sys_input()?;
        self.state = SessionState::Executing;
        Ok(invocation)
    }

    pub fn sys_get_state(&mut self, name: &str) -> Result<AsyncHandle> {
        self.ensure_executing("sys_get_state")?;
        let handle = self.engine.sys_get_state(name)?;
        self.issued.insert(handle);
        Ok(handle)
    }

    pub fn sys_get_state_keys(&mut self) -> Result<AsyncHandle> {
        self.ensure_executing("sys_get_state_keys")?;
        let handle = self.engine.sys_get_state_keys()?;
        self.issued.insert(handle);
        Ok(handle)
    }

    pub fn sys_set_state(&mut self, name: &str, value: Vec<u8>) -> Result<()> {
        self.ensure_executing("sys_set_state")?;
        Ok(self.engine.sys_set_state(name, value)?)
    }

    pub fn sys_clear_state(&mut self, name: &str) -> Result<()> {
        self.ensure_executing("sys_clear_state")?;
        Ok(self.engine.sys_clear_state(name)?)
    }

    pub fn sys_clear_all_state(&mut self) -> Result<()> {
        self.ensure_executing("sys_clear_all_state")?;
        Ok(self.engine.sys_clear_all_state()?)
    }

    pub fn sys_sleep(&mut self, duration: Duration) -> Result<AsyncHandle> {
        self.ensure_executing("sys_sleep")?;
        let handle = self.engine.sys_sleep(duration)?;
        self.issued.insert(handle);
        Ok(handle)
    }

    pub fn sys_run(&mut self, name: &str) -> Result<AsyncHandle> {
        self.ensure_executing("sys_run")?;
        let handle = self.engine.sys_run(name)?;
        self.issued.insert(handle);
        Ok(handle)
    }

    pub fn should_execute_run(&self, handle: AsyncHandle) -> Result<bool> {
        self.ensure_executing("should_execute_run")?;
        self.ensure_issued(handle)?;
        Ok(self.engine.should_execute_run(handle))
    }

    pub fn propose_run_completion_success(
        &mut self,
        handle: AsyncHandle,
        output: Vec<u8>,
    ) -> Result<()> {
        self.ensure_executing("propose_run_completion_success")?;
        self.ensure_issued(handle)?;
        Ok(self.engine.propose_run_completion_success(handle, output)?)
    }

    pub fn propose_run_completion_failure(
        &mut self,
        handle: AsyncHandle,
        failure: Failure,
    ) -> Result<()> {
        self.ensure_executing("propose_run_completion_failure")?;
        self.ensure_issued(handle)?;
        Ok(self.engine.propose_run_completion_failure(handle, failure)?)
    }

    /// Proposes a transient run failure. When the engine decides to retry,
    /// the invocation is torn down: the session suspends and nothing but
    /// `sys_end` may follow.
    pub fn propose_run_completion_transient(
        &mut self,
        handle: AsyncHandle,
        failure: Failure,
        attempt_duration: Duration,
        config: &RunRetryConfig,
    ) -> Result<RetryDecision> {
        self.ensure_executing("propose_run_completion_transient")?;
        self.ensure_issued(handle)?;
        let decision =
            self.engine
                .propose_run_completion_transient(handle, failure, attempt_duration, config)?;
        if decision == RetryDecision::Retry {
            debug!(%handle, "Engine will retry the run, suspending invocation");
            self.state = SessionState::Suspended;
        }
        Ok(decision)
    }

    pub fn sys_write_output_success(&mut self, output: Vec<u8>) -> Result<()> {
        self.write_output(Output::Success(output))
    }

    pub fn sys_write_output_failure(&mut self, failure: Failure) -> Result<()> {
        self.write_output(Output::Failure(failure))
    }

    /// Ends the session. Allowed exactly once, from any state.
    pub fn sys_end(&mut self) -> Result<()> {
        if self.state == SessionState::Ended {
            return Err(SessionError::Ended);
        }
        self.state = SessionState::Ended;
        Ok(self.engine.sys_end()?)
    }

    fn write_output(&mut self, output: Output) -> Result<()> {
        match self.state {
            SessionState::Executing => {}
            SessionState::Completed => return Err(SessionError::OutputAlreadyWritten),
            SessionState::Suspended => return Err(SessionError::Suspended),
            SessionState::Ended => return Err(SessionError::Ended),
            SessionState::Created | SessionState::Fed => {
                return Err(SessionError::NotExecuting {
                    operation: "sys_write_output",
                })
            }
        }
        self.engine.sys_write_output(output)?;
        self.state = SessionState::Completed;
        Ok(())
    }

    fn mark_fed(&mut self) {
        if self.state == SessionState::Created {
            self.state = SessionState::Fed;
        }
    }

    fn ensure_live(&self) -> Result<()> {
        match self.state {
            SessionState::Ended => Err(SessionError::Ended),
            SessionState::Suspended => Err(SessionError::Suspended),
            _ => Ok(()),
        }
    }

    fn ensure_executing(&self, operation: &'static str) -> Result<()> {
        match self.state {
            SessionState::Executing => Ok(()),
            SessionState::Completed => Err(SessionError::OutputAlreadyWritten),
            SessionState::Suspended => Err(SessionError::Suspended),
            SessionState::Ended => Err(SessionError::Ended),
            SessionState::Created | SessionState::Fed => {
                Err(SessionError::NotExecuting { operation })
            }
        }
    }

    fn ensure_issued(&self, handle: AsyncHandle) -> Result<()> {
        if self.issued.contains(&handle) {
            Ok(())
        } else {
            Err(SessionError::UnknownHandle(handle))
        }
    }
}

impl<E: Engine> Drop for EngineSession<E> {
    fn drop(&mut self) {
        if self.state != SessionState::Ended {
            warn!(state = ?self.state, "Engine session dropped without sys_end, ending it now");
            self.state = SessionState::Ended;
            if let Err(e) = self.engine.sys_end() {
                warn!(error = %e, "sys_end failed while dropping engine session");
            }
        }
    }
}
