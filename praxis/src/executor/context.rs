//! Handler-facing invocation context.
//!
//! A [`Context`] is handed to every handler. It exposes the invocation's
//! identity and the durable state operations, and hides the await loop:
//! when the engine cannot resolve a handle yet, the context records an
//! await point, reads the next request chunk, feeds it to the engine and
//! polls again. If the engine suspends instead, the operation fails with
//! [`HandlerError::Suspended`] and the session remembers the suspension,
//! so it is honored even if handler code maps the error to something else.

use super::error::HandlerError;
use crate::core::{deserialize_value, serialize_value, Failure, Invocation, Serde, TerminalError};
use crate::vm::{
    lock_session, AsyncHandle, AsyncResult, RetryDecision, RunRetryConfig, SessionError,
    SharedSession,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

/// Stream of request body chunks, closed when the request body ends.
pub type RequestBody = mpsc::Receiver<Vec<u8>>;

struct ContextInner {
    invocation: Invocation,
    session: SharedSession,
    body: Mutex<RequestBody>,
}

#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    pub fn new(invocation: Invocation, session: SharedSession, body: RequestBody) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                invocation,
                session,
                body: Mutex::new(body),
            }),
        }
    }

    pub fn invocation(&self) -> &Invocation {
        &self.inner.invocation
    }

    pub fn invocation_id(&self) -> &str {
        self.inner.invocation.invocation_id()
    }

    pub fn key(&self) -> &str {
        self.inner.invocation.key()
    }

    pub fn random_seed(&self) -> u64 {
        self.inner.invocation.random_seed()
    }

    pub fn request_headers(&self) -> &[(String, String)] {
        self.inner.invocation.headers()
    }

    pub fn is_suspended(&self) -> bool {
        lock_session(&self.inner.session).is_suspended()
    }

    /// Reads a state value, `None` if it is not set.
    ///
    /// # Errors
    /// - `HandlerError::Suspended` if the engine suspended while waiting
    /// - `HandlerError::Terminal` if the engine resolved the read with a failure
    /// - `HandlerError::Core` if the stored bytes do not decode as `T`
    pub async fn get<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, HandlerError> {
        match self.get_raw(name).await? {
            Some(bytes) => Ok(Some(deserialize_value(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Like [`Context::get`], decoding with an explicit codec.
    pub async fn get_with<T>(
        &self,
        name: &str,
        serde: &dyn Serde<T>,
    ) -> Result<Option<T>, HandlerError> {
        match self.get_raw(name).await? {
            Some(bytes) => Ok(Some(serde.deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn set<T: Serialize>(&self, name: &str, value: &T) -> Result<(), HandlerError> {
        let bytes = serialize_value(value)?;
        lock_session(&self.inner.session).sys_set_state(name, bytes)?;
        Ok(())
    }

    pub fn set_with<T>(&self, name: &str, value: &T, serde: &dyn Serde<T>) -> Result<(), HandlerError> {
        let bytes = serde.serialize(value)?;
        lock_session(&self.inner.session).sys_set_state(name, bytes)?;
        Ok(())
    }

    pub fn clear(&self, name: &str) -> Result<(), HandlerError> {
        lock_session(&self.inner.session).sys_clear_state(name)?;
        Ok(())
    }

    pub fn clear_all(&self) -> Result<(), HandlerError> {
        lock_session(&self.inner.session).sys_clear_all_state()?;
        Ok(())
    }

    /// Names of all state entries of the current key.
    pub async fn state_keys(&self) -> Result<Vec<String>, HandlerError> {
        let handle = lock_session(&self.inner.session).sys_get_state_keys()?;
        match self.await_result(handle).await? {
            AsyncResult::StateKeys(keys) => Ok(keys),
            AsyncResult::Failure(failure) => Err(TerminalError::from(failure).into()),
            other => Err(SessionError::UnexpectedResult {
                handle,
                result: other.describe(),
            }
            .into()),
        }
    }

    /// Durable sleep: survives suspension and re-delivery.
    ///
    /// # Errors
    /// - `HandlerError::Suspended` if the engine suspended while waiting
    /// - `HandlerError::Terminal` if the engine failed the timer
    pub async fn sleep(&self, duration: Duration) -> Result<(), HandlerError> {
        let handle = lock_session(&self.inner.session).sys_sleep(duration)?;
        match self.await_result(handle).await? {
            AsyncResult::Empty => Ok(()),
            AsyncResult::Failure(failure) => Err(TerminalError::from(failure).into()),
            other => Err(SessionError::UnexpectedResult {
                handle,
                result: other.describe(),
            }
            .into()),
        }
    }

    /// Runs a side effect at most once per successful attempt and journals
    /// its result; on re-delivery the journaled result is returned without
    /// running `action` again.
    ///
    /// A terminal error from `action` is journaled as the run's result. Any
    /// other error is a transient failure: the engine's default retry
    /// policy decides whether the invocation is retried.
    ///
    /// # Errors
    /// - `HandlerError::Terminal` if the run's journaled result is a failure
    /// - `HandlerError::Suspended` if the engine suspended or will retry
    pub async fn run<T, F, Fut, E>(&self, name: &str, action: F) -> Result<T, HandlerError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<HandlerError>,
    {
        self.run_with_retry(name, RunRetryConfig::default(), action)
            .await
    }

    /// Like [`Context::run`], bounding transient retries with `config`.
    pub async fn run_with_retry<T, F, Fut, E>(
        &self,
        name: &str,
        config: RunRetryConfig,
        action: F,
    ) -> Result<T, HandlerError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<HandlerError>,
    {
        let (handle, execute) = {
            let mut session = lock_session(&self.inner.session);
            let handle = session.sys_run(name)?;
            (handle, session.should_execute_run(handle)?)
        };

        if execute {
            let started = Instant::now();
            let result = action().await.map_err(Into::into);
            self.propose_run_completion(handle, name, result, started.elapsed(), &config)?;
        } else {
            debug!("Replaying journaled run {} ({})", name, handle);
        }

        match self.await_result(handle).await? {
            AsyncResult::Empty => Ok(deserialize_value(&[])?),
            AsyncResult::Bytes(bytes) => Ok(deserialize_value(&bytes)?),
            AsyncResult::Failure(failure) => Err(TerminalError::from(failure).into()),
            other => Err(SessionError::UnexpectedResult {
                handle,
                result: other.describe(),
            }
            .into()),
        }
    }

    fn propose_run_completion<T: Serialize>(
        &self,
        handle: AsyncHandle,
        name: &str,
        result: Result<T, HandlerError>,
        attempt_duration: Duration,
        config: &RunRetryConfig,
    ) -> Result<(), HandlerError> {
        let mut session = lock_session(&self.inner.session);
        match result {
            Ok(value) => {
                let output = serialize_value(&value)?;
                session.propose_run_completion_success(handle, output)?;
            }
            Err(HandlerError::Terminal(terminal)) => {
                session.propose_run_completion_failure(handle, Failure::from(terminal))?;
            }
            Err(HandlerError::Suspended) => return Err(HandlerError::Suspended),
            Err(e) => {
                let failure = Failure::new(TerminalError::DEFAULT_CODE, e.to_string());
                let decision = session.propose_run_completion_transient(
                    handle,
                    failure,
                    attempt_duration,
                    config,
                )?;
                if decision == RetryDecision::Retry {
                    warn!("Run {} failed transiently, engine will retry: {}", name, e);
                    return Err(HandlerError::Suspended);
                }
            }
        }
        Ok(())
    }

    async fn get_raw(&self, name: &str) -> Result<Option<Vec<u8>>, HandlerError> {
        let handle = lock_session(&self.inner.session).sys_get_state(name)?;
        match self.await_result(handle).await? {
            AsyncResult::Empty => Ok(None),
            AsyncResult::Bytes(bytes) => Ok(Some(bytes)),
            AsyncResult::Failure(failure) => Err(TerminalError::from(failure).into()),
            other => Err(SessionError::UnexpectedResult {
                handle,
                result: other.describe(),
            }
            .into()),
        }
    }

    /// Polls `handle` until the engine resolves it, feeding request input
    /// between polls.
    async fn await_result(&self, handle: AsyncHandle) -> Result<AsyncResult, HandlerError> {
        loop {
            let result = {
                let mut session = lock_session(&self.inner.session);
                let result = session.take_async_result(handle)?;
                if result == AsyncResult::NotReady {
                    if session.is_input_closed() {
                        return Err(SessionError::NotReadyAfterInputClosed(handle).into());
                    }
                    session.notify_await_point(handle)?;
                }
                result
            };

            match result {
                AsyncResult::NotReady => self.read_input().await?,
                AsyncResult::Suspended => {
                    debug!(
                        "Invocation {} suspended awaiting {}",
                        self.invocation_id(),
                        handle
                    );
                    return Err(HandlerError::Suspended);
                }
                resolved => return Ok(resolved),
            }
        }
    }

    async fn read_input(&self) -> Result<(), SessionError> {
        let mut body = self.inner.body.lock().await;
        read_chunk(&self.inner.session, &mut body).await
    }

    /// Feeds whatever is left of the request body to the engine and closes
    /// the input.
    pub(crate) async fn drain_input(&self) -> Result<(), SessionError> {
        let mut body = self.inner.body.lock().await;
        drain_body(&self.inner.session, &mut body).await
    }
}

/// Reads one request chunk into the session; end of body closes the input.
async fn read_chunk(session: &SharedSession, body: &mut RequestBody) -> Result<(), SessionError> {
    let chunk = body.recv().await;
    let mut session = lock_session(session);
    match chunk {
        Some(buf) => session.notify_input(&buf),
        None => session.notify_input_closed(),
    }
}

/// Reads the rest of the request body into the session. A no-op once the
/// input is closed.
pub(crate) async fn drain_body(
    session: &SharedSession,
    body: &mut RequestBody,
) -> Result<(), SessionError> {
    loop {
        let closed = lock_session(session).is_input_closed();
        if closed {
            return Ok(());
        }
        read_chunk(session, body).await?;
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("invocation_id", &self.invocation_id())
            .field("key", &self.key())
            .finish()
    }
}
