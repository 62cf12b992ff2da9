use super::engine::{
    AsyncHandle, Engine, EngineValue, Output, ResponseHead, RetryDecision, RunRetryConfig,
};
use super::error::EngineError;
use crate::core::{Failure, Invocation};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

pub const JOURNAL_CONTENT_TYPE: &str = "application/x-praxis-journal";

const ERR_PROTOCOL: u16 = 571;

/// How a state entry behaves when it is read.
#[derive(Debug, Clone)]
enum StateEntry {
    /// Resolved immediately.
    Eager(Vec<u8>),
    /// Resolved once another input chunk arrives after the read.
    Deferred(Vec<u8>),
    /// Never resolved; the engine suspends once input is closed.
    Unavailable,
    /// Resolved with a terminal failure.
    Failing(Failure),
    /// Never resolved and never suspended, like a broken engine.
    Stalled,
}

#[derive(Debug, Clone)]
enum Pending {
    Ready(EngineValue),
    AfterChunk { value: EngineValue, chunk: usize },
    Never,
    Stalled,
    /// A run waiting for its completion to be proposed.
    AwaitingProposal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateWrite {
    Set { name: String, value: Vec<u8> },
    Clear(String),
    ClearAll,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunProposal {
    Success {
        name: String,
        output: Vec<u8>,
    },
    Failure {
        name: String,
        failure: Failure,
    },
    Transient {
        name: String,
        failure: Failure,
        decision: RetryDecision,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedError {
    pub message: String,
    pub stacktrace: Option<String>,
}

/// Everything an [`InMemoryEngine`] was told, for assertions in tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineJournal {
    pub input_chunks: usize,
    pub input_closed: bool,
    pub awaited: Vec<AsyncHandle>,
    pub errors: Vec<ReportedError>,
    pub state_writes: Vec<StateWrite>,
    pub sleeps: Vec<Duration>,
    pub run_proposals: Vec<RunProposal>,
    pub outputs: Vec<Output>,
    pub end_calls: usize,
}

/// Shared view of an engine's journal that outlives the engine.
#[derive(Debug, Clone, Default)]
pub struct JournalHandle(Arc<Mutex<EngineJournal>>);

impl JournalHandle {
    pub fn snapshot(&self) -> EngineJournal {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EngineJournal> {
        self.0
            .lock()
            .expect("engine journal mutex poisoned - unrecoverable state")
    }
}

/// In-memory engine for tests and local development.
///
/// Serves state from a map configured up front and records every call in a
/// [`JournalHandle`]. Ready to execute as soon as any input chunk arrives
/// or the input is closed, unless configured to wait for more chunks.
/// Results are consumed when taken, like a real protocol engine.
///
/// Sleeps fire immediately unless configured to suspend. Runs execute
/// unless a result for their name was journaled up front, in which case
/// they replay it.
pub struct InMemoryEngine {
    invocation: Invocation,
    state: BTreeMap<String, StateEntry>,
    pending: HashMap<AsyncHandle, Pending>,
    runs: HashMap<AsyncHandle, String>,
    journaled_runs: HashMap<String, EngineValue>,
    run_attempt: u32,
    sleeps_suspend: bool,
    ready_after_chunks: Option<usize>,
    next_handle: u32,
    chunks_seen: usize,
    input_closed: bool,
    input_taken: bool,
    output_written: bool,
    ended: bool,
    frames: VecDeque<Vec<u8>>,
    journal: JournalHandle,
}

impl InMemoryEngine {
    pub fn builder() -> InMemoryEngineBuilder {
        InMemoryEngineBuilder::default()
    }

    pub fn journal(&self) -> JournalHandle {
        self.journal.clone()
    }

    fn issue(&mut self, pending: Pending) -> AsyncHandle {
        let handle = AsyncHandle::new(self.next_handle);
        self.next_handle += 1;
        self.pending.insert(handle, pending);
        handle
    }

    fn run_name(&self, handle: AsyncHandle) -> Result<String, EngineError> {
        self.runs
            .get(&handle)
            .cloned()
            .ok_or_else(|| EngineError::new(ERR_PROTOCOL, format!("{handle} is not a run handle")))
    }

    /// Resolves an executed run, rejecting a second proposal.
    fn complete_run(&mut self, handle: AsyncHandle, value: EngineValue) -> Result<(), EngineError> {
        match self.pending.get_mut(&handle) {
            Some(pending) if matches!(pending, Pending::AwaitingProposal) => {
                *pending = Pending::Ready(value);
                Ok(())
            }
            _ => Err(EngineError::new(
                ERR_PROTOCOL,
                format!("run {handle} is not awaiting a completion"),
            )),
        }
    }

    fn ensure_running(&self, operation: &str) -> Result<(), EngineError> {
        if self.ended {
            return Err(EngineError::new(
                ERR_PROTOCOL,
                format!("{operation} called after end"),
            ));
        }
        if !self.input_taken {
            return Err(EngineError::new(
                ERR_PROTOCOL,
                format!("{operation} called before input was taken"),
            ));
        }
        Ok(())
    }
}

impl Engine for InMemoryEngine {
    fn get_response_head(&self) -> ResponseHead {
        let status_code = if self.journal.lock().errors.is_empty() {
            200
        } else {
            500
        };
        ResponseHead {
            status_code,
            headers: vec![(
                "content-type".to_string(),
                JOURNAL_CONTENT_TYPE.to_string(),
            )],
        }
    }

    fn notify_input(&mut self, _buf: &[u8]) {
        self.chunks_seen += 1;
        self.journal.lock().input_chunks += 1;
    }

    fn notify_input_closed(&mut self) {
        self.input_closed = true;
        self.journal.lock().input_closed = true;
    }

    fn notify_error(&mut self, message: &str, stacktrace: Option<&str>) {
        self.journal.lock().errors.push(ReportedError {
            message: message.to_string(),
            stacktrace: stacktrace.map(str::to_string),
        });
    }

    fn take_output(&mut self) -> Option<Vec<u8>> {
        match self.frames.pop_front() {
            Some(frame) => Some(frame),
            None if self.ended => None,
            None => Some(Vec::new()),
        }
    }

    fn is_ready_to_execute(&self) -> Result<bool, EngineError> {
        Ok(match self.ready_after_chunks {
            Some(chunks) => self.chunks_seen >= chunks,
            None => self.chunks_seen > 0 || self.input_closed,
        })
    }

    fn notify_await_point(&mut self, handle: AsyncHandle) {
        self.journal.lock().awaited.push(handle);
    }

    fn take_async_result(
        &mut self,
        handle: AsyncHandle,
    ) -> Result<Option<EngineValue>, EngineError> {
        let pending = self.pending.get(&handle).ok_or_else(|| {
            EngineError::new(ERR_PROTOCOL, format!("unknown async handle {handle}"))
        })?;

        let available = match pending {
            Pending::Ready(_) => true,
            Pending::AfterChunk { chunk, .. } => self.chunks_seen >= *chunk,
            Pending::Never | Pending::AwaitingProposal => false,
            Pending::Stalled => return Ok(None),
        };
        if !available {
            return Ok(self.input_closed.then_some(EngineValue::Suspended));
        }

        match self.pending.remove(&handle) {
            Some(Pending::Ready(value)) | Some(Pending::AfterChunk { value, .. }) => Ok(Some(value)),
            _ => Ok(None),
        }
    }

    fn sys_input(&mut self) -> Result<Invocation, EngineError> {
        if !self.is_ready_to_execute()? {
            return Err(EngineError::new(ERR_PROTOCOL, "input requested before ready"));
        }
        if self.input_taken {
            return Err(EngineError::new(ERR_PROTOCOL, "input already taken"));
        }
        self.input_taken = true;
        Ok(self.invocation.clone())
    }

    fn sys_get_state(&mut self, name: &str) -> Result<AsyncHandle, EngineError> {
        self.ensure_running("sys_get_state")?;
        let pending = match self.state.get(name) {
            None => Pending::Ready(EngineValue::Void),
            Some(StateEntry::Eager(value)) => Pending::Ready(EngineValue::Bytes(value.clone())),
            Some(StateEntry::Deferred(value)) => Pending::AfterChunk {
                value: EngineValue::Bytes(value.clone()),
                chunk: self.chunks_seen + 1,
            },
            Some(StateEntry::Unavailable) => Pending::Never,
            Some(StateEntry::Stalled) => Pending::Stalled,
            Some(StateEntry::Failing(failure)) => Pending::Ready(EngineValue::Failure(failure.clone())),
        };
        Ok(self.issue(pending))
    }

    fn sys_get_state_keys(&mut self) -> Result<AsyncHandle, EngineError> {
        self.ensure_running("sys_get_state_keys")?;
        let keys = self.state.keys().cloned().collect();
        Ok(self.issue(Pending::Ready(EngineValue::StateKeys(keys))))
    }

    fn sys_set_state(&mut self, name: &str, value: Vec<u8>) -> Result<(), EngineError> {
        self.ensure_running("sys_set_state")?;
        self.state
            .insert(name.to_string(), StateEntry::Eager(value.clone()));
        self.journal.lock().state_writes.push(StateWrite::Set {
            name: name.to_string(),
            value,
        });
        Ok(())
    }

    fn sys_clear_state(&mut self, name: &str) -> Result<(), EngineError> {
        self.ensure_running("sys_clear_state")?;
        self.state.remove(name);
        self.journal
            .lock()
            .state_writes
            .push(StateWrite::Clear(name.to_string()));
        Ok(())
    }

    fn sys_clear_all_state(&mut self) -> Result<(), EngineError> {
        self.ensure_running("sys_clear_all_state")?;
        self.state.clear();
        self.journal.lock().state_writes.push(StateWrite::ClearAll);
        Ok(())
    }

    fn sys_sleep(&mut self, duration: Duration) -> Result<AsyncHandle, EngineError> {
        self.ensure_running("sys_sleep")?;
        self.journal.lock().sleeps.push(duration);
        let pending = if self.sleeps_suspend {
            Pending::Never
        } else {
            Pending::Ready(EngineValue::Void)
        };
        Ok(self.issue(pending))
    }

    fn sys_run(&mut self, name: &str) -> Result<AsyncHandle, EngineError> {
        self.ensure_running("sys_run")?;
        let pending = match self.journaled_runs.get(name) {
            Some(value) => Pending::Ready(value.clone()),
            None => Pending::AwaitingProposal,
        };
        let handle = self.issue(pending);
        self.runs.insert(handle, name.to_string());
        Ok(handle)
    }

    fn should_execute_run(&self, handle: AsyncHandle) -> bool {
        matches!(self.pending.get(&handle), Some(Pending::AwaitingProposal))
    }

    fn propose_run_completion_success(
        &mut self,
        handle: AsyncHandle,
        output: Vec<u8>,
    ) -> Result<(), EngineError> {
        self.ensure_running("propose_run_completion_success")?;
        let name = self.run_name(handle)?;
        self.complete_run(handle, EngineValue::Bytes(output.clone()))?;
        self.journal
            .lock()
            .run_proposals
            .push(RunProposal::Success { name, output });
        Ok(())
    }

    fn propose_run_completion_failure(
        &mut self,
        handle: AsyncHandle,
        failure: Failure,
    ) -> Result<(), EngineError> {
        self.ensure_running("propose_run_completion_failure")?;
        let name = self.run_name(handle)?;
        self.complete_run(handle, EngineValue::Failure(failure.clone()))?;
        self.journal
            .lock()
            .run_proposals
            .push(RunProposal::Failure { name, failure });
        Ok(())
    }

    /// Gives up once the configured attempts are used, or once a single
    /// attempt took at least the configured maximum duration.
    fn propose_run_completion_transient(
        &mut self,
        handle: AsyncHandle,
        failure: Failure,
        attempt_duration: Duration,
        config: &RunRetryConfig,
    ) -> Result<RetryDecision, EngineError> {
        self.ensure_running("propose_run_completion_transient")?;
        let name = self.run_name(handle)?;
        let exhausted = config
            .max_attempts
            .is_some_and(|max| self.run_attempt >= max)
            || config
                .max_duration
                .is_some_and(|max| attempt_duration >= max);

        let decision = if exhausted {
            self.complete_run(handle, EngineValue::Failure(failure.clone()))?;
            RetryDecision::Exhausted
        } else {
            RetryDecision::Retry
        };
        self.journal.lock().run_proposals.push(RunProposal::Transient {
            name,
            failure,
            decision,
        });
        Ok(decision)
    }

    fn sys_write_output(&mut self, output: Output) -> Result<(), EngineError> {
        self.ensure_running("sys_write_output")?;
        if self.output_written {
            return Err(EngineError::new(ERR_PROTOCOL, "output already written"));
        }
        self.output_written = true;

        let frame = match &output {
            Output::Success(bytes) => bytes.clone(),
            Output::Failure(failure) => serde_json::to_vec(failure)
                .map_err(|e| EngineError::new(ERR_PROTOCOL, e.to_string()))?,
        };
        self.frames.push_back(frame);
        self.journal.lock().outputs.push(output);
        Ok(())
    }

    fn sys_end(&mut self) -> Result<(), EngineError> {
        self.journal.lock().end_calls += 1;
        if self.ended {
            return Err(EngineError::new(ERR_PROTOCOL, "end called twice"));
        }
        self.ended = true;
        Ok(())
    }
}

/// Builder for [`InMemoryEngine`].
#[derive(Debug, Default)]
pub struct InMemoryEngineBuilder {
    invocation_id: Option<String>,
    random_seed: u64,
    headers: Vec<(String, String)>,
    input: Vec<u8>,
    key: String,
    state: BTreeMap<String, StateEntry>,
    journaled_runs: HashMap<String, EngineValue>,
    run_attempt: u32,
    sleeps_suspend: bool,
    ready_after_chunks: Option<usize>,
}

impl InMemoryEngineBuilder {
    pub fn invocation_id(mut self, id: impl Into<String>) -> Self {
        self.invocation_id = Some(id.into());
        self
    }

    pub fn random_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Raw input bytes of the invocation.
    pub fn input(mut self, input: Vec<u8>) -> Self {
        self.input = input;
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn state(mut self, name: impl Into<String>, value: Vec<u8>) -> Self {
        self.state.insert(name.into(), StateEntry::Eager(value));
        self
    }

    /// State that only resolves after one more input chunk arrives.
    pub fn deferred_state(mut self, name: impl Into<String>, value: Vec<u8>) -> Self {
        self.state.insert(name.into(), StateEntry::Deferred(value));
        self
    }

    /// State that never resolves; reading it suspends once input closes.
    pub fn unavailable_state(mut self, name: impl Into<String>) -> Self {
        self.state.insert(name.into(), StateEntry::Unavailable);
        self
    }

    pub fn failing_state(mut self, name: impl Into<String>, failure: Failure) -> Self {
        self.state.insert(name.into(), StateEntry::Failing(failure));
        self
    }

    /// State that never resolves, not even by suspending once input
    /// closes. Models an engine that breaks the await protocol.
    pub fn stalled_state(mut self, name: impl Into<String>) -> Self {
        self.state.insert(name.into(), StateEntry::Stalled);
        self
    }

    /// A run result journaled by an earlier attempt; the run replays it
    /// instead of executing.
    pub fn journaled_run(mut self, name: impl Into<String>, output: Vec<u8>) -> Self {
        self.journaled_runs
            .insert(name.into(), EngineValue::Bytes(output));
        self
    }

    pub fn journaled_run_failure(mut self, name: impl Into<String>, failure: Failure) -> Self {
        self.journaled_runs
            .insert(name.into(), EngineValue::Failure(failure));
        self
    }

    /// Which delivery attempt this is, for transient run failures.
    /// Defaults to 1.
    pub fn run_attempt(mut self, attempt: u32) -> Self {
        self.run_attempt = attempt;
        self
    }

    /// Sleeps never fire; awaiting one suspends once input closes.
    pub fn suspend_on_sleep(mut self) -> Self {
        self.sleeps_suspend = true;
        self
    }

    /// Not ready until `chunks` input chunks arrived. Closing the input
    /// earlier leaves the engine never ready.
    pub fn ready_after_chunks(mut self, chunks: usize) -> Self {
        self.ready_after_chunks = Some(chunks);
        self
    }

    pub fn build(self) -> InMemoryEngine {
        let invocation_id = self
            .invocation_id
            .unwrap_or_else(|| format!("inv_{}", Uuid::new_v4().simple()));
        InMemoryEngine {
            invocation: Invocation::new(
                invocation_id,
                self.random_seed,
                self.headers,
                self.input,
                self.key,
            ),
            state: self.state,
            pending: HashMap::new(),
            runs: HashMap::new(),
            journaled_runs: self.journaled_runs,
            run_attempt: self.run_attempt.max(1),
            sleeps_suspend: self.sleeps_suspend,
            ready_after_chunks: self.ready_after_chunks,
            next_handle: 1,
            chunks_seen: 0,
            input_closed: false,
            input_taken: false,
            output_written: false,
            ended: false,
            frames: VecDeque::new(),
            journal: JournalHandle::default(),
        }
    }
}
