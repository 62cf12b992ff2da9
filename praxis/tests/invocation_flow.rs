//! End-to-end invocation tests
//!
//! These tests drive whole invocations through `dispatch` against the
//! in-memory engine and check what the engine was told:
//! 1. Exactly one output per invocation that did not suspend
//! 2. No output at all when the engine suspends
//! 3. `sys_end` exactly once, whatever the outcome
//! 4. Input decoding failures become terminal failures

use praxis::core::{BytesSerde, Failure, SerdeKind};
use praxis::handler::{HandlerFn, Parameter};
use praxis::prelude::*;
use praxis::vm::memory::StateWrite;
use praxis::vm::{Output, RunProposal};
use praxis::{ConfigError, HandlerSignature, LookupError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A request body made of `chunks`, closed after the last one.
fn body(chunks: &[&[u8]]) -> praxis::executor::RequestBody {
    let (tx, rx) = mpsc::channel(chunks.len().max(1));
    for chunk in chunks {
        tx.try_send(chunk.to_vec()).unwrap();
    }
    rx
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SchemaModel)]
#[schema(name = "order.v1", validate = Order::check)]
struct Order {
    sku: String,
    quantity: u32,
}

impl Order {
    fn check(&self) -> Result<(), String> {
        if self.quantity == 0 {
            return Err("quantity must be positive".to_string());
        }
        Ok(())
    }
}

#[handler]
async fn double(_ctx: Context, n: i32) -> Result<i32, HandlerError> {
    Ok(n * 2)
}

#[handler]
async fn place(_ctx: Context, order: Order) -> Result<u32, HandlerError> {
    Ok(order.quantity)
}

#[handler]
async fn echo(_ctx: Context, raw: Vec<u8>) -> Result<Vec<u8>, HandlerError> {
    Ok(raw)
}

#[handler]
async fn visit(ctx: Context) -> Result<u32, HandlerError> {
    let visits = ctx.get::<u32>("visits").await?.unwrap_or(0) + 1;
    ctx.set("visits", &visits)?;
    Ok(visits)
}

#[handler]
async fn reset(ctx: Context) -> Result<Vec<String>, HandlerError> {
    let keys = ctx.state_keys().await?;
    ctx.clear("visits")?;
    ctx.clear_all()?;
    Ok(keys)
}

#[handler]
async fn charge(ctx: Context, amount: u32) -> Result<String, HandlerError> {
    ctx.sleep(Duration::from_millis(5)).await?;
    let receipt: String = ctx
        .run("charge-card", || async move {
            if amount > 100 {
                return Err(HandlerError::from("card network unavailable"));
            }
            Ok(format!("receipt-{amount}"))
        })
        .await?;
    ctx.set("receipt", &receipt)?;
    Ok(receipt)
}

fn charge_registry() -> Registry {
    let registry = Registry::new();
    registry
        .register(
            ServiceTag::object("Payments"),
            HandlerIOBuilder::new(),
            None,
            None,
            charge_handler(),
        )
        .unwrap();
    registry
}

#[tokio::test]
async fn test_doubling_handler_round_trip() {
    init_tracing();
    let registry = Registry::new();
    registry
        .register(
            ServiceTag::service("Math"),
            HandlerIOBuilder::new(),
            None,
            None,
            double_handler(),
        )
        .unwrap();

    let engine = InMemoryEngine::builder().input(b"21".to_vec()).build();
    let journal = engine.journal();

    let response = dispatch(
        &registry,
        &HandlerTarget::new("Math", "double"),
        engine,
        body(&[b"start"]),
    )
    .await
    .unwrap();

    assert_eq!(response.outcome, InvocationOutcome::Completed);
    assert_eq!(response.body, b"42");

    let snapshot = journal.snapshot();
    assert_eq!(snapshot.outputs, vec![Output::Success(b"42".to_vec())]);
    assert!(snapshot.errors.is_empty());
    assert_eq!(snapshot.end_calls, 1);
}

#[tokio::test]
async fn test_malformed_input_is_a_terminal_failure() {
    init_tracing();
    let registry = Registry::new();
    registry
        .register(
            ServiceTag::service("Math"),
            HandlerIOBuilder::new(),
            None,
            None,
            double_handler(),
        )
        .unwrap();

    let engine = InMemoryEngine::builder().input(b"\"abc\"".to_vec()).build();
    let journal = engine.journal();

    let response = dispatch(
        &registry,
        &HandlerTarget::new("Math", "double"),
        engine,
        body(&[b"start"]),
    )
    .await
    .unwrap();

    let InvocationOutcome::Failed(failure) = response.outcome else {
        panic!("expected a terminal failure, got {:?}", response.outcome);
    };
    assert_eq!(failure.code, 500);
    assert!(failure.message.starts_with("Unable to parse an input argument."));

    let snapshot = journal.snapshot();
    assert_eq!(snapshot.outputs, vec![Output::Failure(failure)]);
    assert!(snapshot.errors.is_empty());
    assert_eq!(snapshot.end_calls, 1);
}

#[tokio::test]
async fn test_schema_input_is_validated() {
    init_tracing();
    let registry = Registry::new();
    let token = registry
        .register(
            ServiceTag::service("Shop"),
            HandlerIOBuilder::new(),
            None,
            None,
            place_handler(),
        )
        .unwrap();

    let handler = registry.handler(token).unwrap();
    assert_eq!(handler.handler_io().input_serde().kind(), SerdeKind::Schema);
    assert_eq!(handler.handler_io().output_serde().kind(), SerdeKind::General);

    let engine = InMemoryEngine::builder()
        .input(br#"{"sku":"tea","quantity":0}"#.to_vec())
        .build();
    let response = dispatch(
        &registry,
        &HandlerTarget::new("Shop", "place"),
        engine,
        body(&[b"start"]),
    )
    .await
    .unwrap();

    let InvocationOutcome::Failed(failure) = response.outcome else {
        panic!("expected a terminal failure, got {:?}", response.outcome);
    };
    assert!(failure.message.contains("quantity must be positive"));

    let engine = InMemoryEngine::builder()
        .input(br#"{"sku":"tea","quantity":3}"#.to_vec())
        .build();
    let response = dispatch(
        &registry,
        &HandlerTarget::new("Shop", "place"),
        engine,
        body(&[b"start"]),
    )
    .await
    .unwrap();
    assert_eq!(response.outcome, InvocationOutcome::Completed);
    assert_eq!(response.body, b"3");
}

#[tokio::test]
async fn test_explicit_codec_is_never_replaced() {
    init_tracing();
    let registry = Registry::new();
    let token = registry
        .register(
            ServiceTag::service("Shop"),
            HandlerIOBuilder::new().input_serde(Arc::new(JsonSerde::<Order>::new())),
            Some("place_unchecked"),
            None,
            place_handler(),
        )
        .unwrap();

    let handler = registry.handler(token).unwrap();
    assert_eq!(handler.handler_io().input_serde().kind(), SerdeKind::Json);

    // Without the schema codec, validation does not run.
    let engine = InMemoryEngine::builder()
        .input(br#"{"sku":"tea","quantity":0}"#.to_vec())
        .build();
    let response = dispatch(
        &registry,
        &HandlerTarget::new("Shop", "place_unchecked"),
        engine,
        body(&[b"start"]),
    )
    .await
    .unwrap();
    assert_eq!(response.outcome, InvocationOutcome::Completed);
    assert_eq!(response.body, b"0");
}

#[tokio::test]
async fn test_bytes_codec_passes_raw_input_through() {
    init_tracing();
    let registry = Registry::new();
    let token = registry
        .register(
            ServiceTag::service("Blob"),
            HandlerIOBuilder::<Vec<u8>, Vec<u8>>::with_serdes(
                Arc::new(BytesSerde),
                Arc::new(BytesSerde),
            ),
            None,
            None,
            echo_handler(),
        )
        .unwrap();

    let handler = registry.handler(token).unwrap();
    assert_eq!(handler.handler_io().accept(), "*/*");
    assert_eq!(handler.handler_io().content_type(), "application/octet-stream");

    let engine = InMemoryEngine::builder().input(vec![0, 159, 146, 150]).build();
    let response = dispatch(
        &registry,
        &HandlerTarget::new("Blob", "echo"),
        engine,
        body(&[b"start"]),
    )
    .await
    .unwrap();
    assert_eq!(response.outcome, InvocationOutcome::Completed);
    assert_eq!(response.body, vec![0, 159, 146, 150]);
}

#[tokio::test]
async fn test_context_only_handler_ignores_input() {
    init_tracing();
    let registry = Registry::new();
    registry
        .register(
            ServiceTag::object("Counter"),
            HandlerIOBuilder::new(),
            None,
            Some(HandlerKind::Exclusive),
            visit_handler(),
        )
        .unwrap();

    // Not valid JSON: a context-only handler must never decode it.
    let engine = InMemoryEngine::builder()
        .input(b"{not json".to_vec())
        .key("alice")
        .state("visits", b"4".to_vec())
        .build();
    let journal = engine.journal();

    let response = dispatch(
        &registry,
        &HandlerTarget::new("Counter", "visit"),
        engine,
        body(&[b"start"]),
    )
    .await
    .unwrap();

    assert_eq!(response.outcome, InvocationOutcome::Completed);
    assert_eq!(response.body, b"5");
    assert_eq!(
        journal.snapshot().state_writes,
        vec![StateWrite::Set {
            name: "visits".to_string(),
            value: b"5".to_vec(),
        }]
    );
}

#[tokio::test]
async fn test_state_keys_and_clears_are_recorded() {
    init_tracing();
    let registry = Registry::new();
    registry
        .register(
            ServiceTag::object("Counter"),
            HandlerIOBuilder::new(),
            None,
            None,
            reset_handler(),
        )
        .unwrap();

    let engine = InMemoryEngine::builder()
        .state("visits", b"4".to_vec())
        .state("last_seen", b"\"monday\"".to_vec())
        .build();
    let journal = engine.journal();

    let response = dispatch(
        &registry,
        &HandlerTarget::new("Counter", "reset"),
        engine,
        body(&[b"start"]),
    )
    .await
    .unwrap();

    assert_eq!(response.outcome, InvocationOutcome::Completed);
    assert_eq!(response.body, br#"["last_seen","visits"]"#);
    assert_eq!(
        journal.snapshot().state_writes,
        vec![StateWrite::Clear("visits".to_string()), StateWrite::ClearAll]
    );
}

#[tokio::test]
async fn test_deferred_state_waits_for_more_input() {
    init_tracing();
    let registry = Registry::new();
    registry
        .register(
            ServiceTag::object("Counter"),
            HandlerIOBuilder::new(),
            None,
            None,
            visit_handler(),
        )
        .unwrap();

    let engine = InMemoryEngine::builder()
        .deferred_state("visits", b"9".to_vec())
        .build();
    let journal = engine.journal();

    let response = dispatch(
        &registry,
        &HandlerTarget::new("Counter", "visit"),
        engine,
        body(&[b"start", b"state"]),
    )
    .await
    .unwrap();

    assert_eq!(response.outcome, InvocationOutcome::Completed);
    assert_eq!(response.body, b"10");

    let snapshot = journal.snapshot();
    // One await point for the single pending read, then it resolved.
    assert_eq!(snapshot.awaited.len(), 1);
    assert_eq!(snapshot.input_chunks, 2);
    assert_eq!(snapshot.outputs.len(), 1);
    assert_eq!(snapshot.end_calls, 1);
}

#[tokio::test]
async fn test_unavailable_state_suspends_without_output() {
    init_tracing();
    let registry = Registry::new();
    registry
        .register(
            ServiceTag::object("Counter"),
            HandlerIOBuilder::new(),
            None,
            None,
            visit_handler(),
        )
        .unwrap();

    let engine = InMemoryEngine::builder()
        .unavailable_state("visits")
        .build();
    let journal = engine.journal();

    let response = dispatch(
        &registry,
        &HandlerTarget::new("Counter", "visit"),
        engine,
        body(&[b"start"]),
    )
    .await
    .unwrap();

    assert_eq!(response.outcome, InvocationOutcome::Suspended);
    assert!(response.body.is_empty());

    let snapshot = journal.snapshot();
    assert!(snapshot.input_closed);
    assert!(snapshot.outputs.is_empty());
    assert!(snapshot.errors.is_empty());
    assert!(snapshot.state_writes.is_empty());
    assert_eq!(snapshot.end_calls, 1);
}

#[tokio::test]
async fn test_failed_state_read_is_terminal() {
    init_tracing();
    let registry = Registry::new();
    registry
        .register(
            ServiceTag::object("Counter"),
            HandlerIOBuilder::new(),
            None,
            None,
            visit_handler(),
        )
        .unwrap();

    let engine = InMemoryEngine::builder()
        .failing_state("visits", Failure::new(409, "state fenced"))
        .build();
    let journal = engine.journal();

    let response = dispatch(
        &registry,
        &HandlerTarget::new("Counter", "visit"),
        engine,
        body(&[b"start"]),
    )
    .await
    .unwrap();

    let failure = Failure::new(409, "state fenced");
    assert_eq!(response.outcome, InvocationOutcome::Failed(failure.clone()));
    assert_eq!(journal.snapshot().outputs, vec![Output::Failure(failure)]);
}

#[tokio::test]
async fn test_transient_error_is_reported_not_written() {
    init_tracing();

    async fn flaky(_ctx: Context) -> Result<(), HandlerError> {
        Err("downstream unavailable".into())
    }

    let registry = Registry::new();
    registry
        .register(
            ServiceTag::service("Flaky"),
            HandlerIOBuilder::new(),
            Some("call"),
            None,
            HandlerSignature::<(), _>::new(HandlerFn::unary(flaky)),
        )
        .unwrap();

    let engine = InMemoryEngine::builder().build();
    let journal = engine.journal();

    let response = dispatch(
        &registry,
        &HandlerTarget::new("Flaky", "call"),
        engine,
        body(&[b"start"]),
    )
    .await
    .unwrap();

    assert!(matches!(response.outcome, InvocationOutcome::Errored(_)));
    assert_eq!(response.head.status_code, 500);

    let snapshot = journal.snapshot();
    assert!(snapshot.outputs.is_empty());
    assert_eq!(snapshot.errors.len(), 1);
    assert!(snapshot.errors[0].message.contains("downstream unavailable"));
    assert_eq!(snapshot.end_calls, 1);
}

#[tokio::test]
async fn test_empty_body_closes_input_and_runs() {
    init_tracing();
    let registry = Registry::new();
    registry
        .register(
            ServiceTag::service("Math"),
            HandlerIOBuilder::new(),
            None,
            None,
            double_handler(),
        )
        .unwrap();

    let engine = InMemoryEngine::builder().input(b"5".to_vec()).build();
    let journal = engine.journal();

    let response = dispatch(&registry, &HandlerTarget::new("Math", "double"), engine, body(&[]))
        .await
        .unwrap();

    assert_eq!(response.outcome, InvocationOutcome::Completed);
    assert_eq!(response.body, b"10");
    assert!(journal.snapshot().input_closed);
}

#[test]
fn test_registration_rejects_malformed_handlers() {
    init_tracing();
    let registry = Registry::new();

    let no_params = double_handler().with_parameters(Vec::new());
    let err = registry
        .register(
            ServiceTag::service("Math"),
            HandlerIOBuilder::new(),
            None,
            None,
            no_params,
        )
        .unwrap_err();
    assert_eq!(
        err,
        ConfigError::NoParameters {
            handler: "double".to_string()
        }
    );

    async fn anonymous(_ctx: Context) -> Result<(), HandlerError> {
        Ok(())
    }
    let unnamed = HandlerSignature::<(), _>::new(HandlerFn::unary(anonymous))
        .with_parameters(vec![Parameter::new("ctx", None)]);
    let err = registry
        .register(
            ServiceTag::service("Math"),
            HandlerIOBuilder::new(),
            None,
            None,
            unnamed,
        )
        .unwrap_err();
    assert_eq!(err, ConfigError::MissingName);

    registry
        .register(
            ServiceTag::service("Math"),
            HandlerIOBuilder::new(),
            None,
            None,
            double_handler(),
        )
        .unwrap();
    let err = registry
        .register(
            ServiceTag::service("Math"),
            HandlerIOBuilder::new(),
            None,
            None,
            double_handler(),
        )
        .unwrap_err();
    assert!(matches!(err, ConfigError::Duplicate { .. }));
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_lookup_by_callable() {
    init_tracing();
    let registry = Registry::new();
    registry
        .register(
            ServiceTag::workflow("Signup"),
            HandlerIOBuilder::new(),
            Some("run"),
            Some(HandlerKind::Workflow),
            double_handler(),
        )
        .unwrap();

    let erased = registry.handler_from_callable(&double).unwrap();
    assert_eq!(erased.name(), "run");
    assert_eq!(erased.kind(), Some(HandlerKind::Workflow));

    let typed = registry
        .typed_handler_from_callable::<i32, i32, _>(&double)
        .unwrap();
    assert_eq!(typed.service_tag().name(), "Signup");

    assert!(matches!(
        registry.typed_handler_from_callable::<String, i32, _>(&double),
        Err(LookupError::TypeMismatch { .. })
    ));
    assert!(matches!(
        registry.handler_from_callable(&visit),
        Err(LookupError::NotRegistered)
    ));
}

#[tokio::test]
async fn test_side_effect_runs_once_and_is_journaled() {
    init_tracing();
    let engine = InMemoryEngine::builder().input(b"40".to_vec()).build();
    let journal = engine.journal();

    let response = dispatch(
        &charge_registry(),
        &HandlerTarget::new("Payments", "charge"),
        engine,
        body(&[b"start"]),
    )
    .await
    .unwrap();

    assert_eq!(response.outcome, InvocationOutcome::Completed);
    assert_eq!(response.body, br#""receipt-40""#);
    let snapshot = journal.snapshot();
    assert_eq!(snapshot.sleeps, vec![Duration::from_millis(5)]);
    assert_eq!(
        snapshot.run_proposals,
        vec![RunProposal::Success {
            name: "charge-card".to_string(),
            output: br#""receipt-40""#.to_vec(),
        }]
    );
    assert!(snapshot.input_closed);
}

#[tokio::test]
async fn test_replayed_side_effect_uses_the_journal() {
    init_tracing();
    let engine = InMemoryEngine::builder()
        .input(b"500".to_vec())
        .journaled_run("charge-card", br#""receipt-from-journal""#.to_vec())
        .build();
    let journal = engine.journal();

    let response = dispatch(
        &charge_registry(),
        &HandlerTarget::new("Payments", "charge"),
        engine,
        body(&[b"start"]),
    )
    .await
    .unwrap();

    assert_eq!(response.outcome, InvocationOutcome::Completed);
    assert_eq!(response.body, br#""receipt-from-journal""#);
    assert!(journal.snapshot().run_proposals.is_empty());
}

#[tokio::test]
async fn test_transient_side_effect_failure_suspends_the_attempt() {
    init_tracing();
    let engine = InMemoryEngine::builder().input(b"500".to_vec()).build();
    let journal = engine.journal();

    let response = dispatch(
        &charge_registry(),
        &HandlerTarget::new("Payments", "charge"),
        engine,
        body(&[b"start"]),
    )
    .await
    .unwrap();

    assert_eq!(response.outcome, InvocationOutcome::Suspended);
    assert!(response.body.is_empty());
    let snapshot = journal.snapshot();
    assert!(snapshot.outputs.is_empty());
    assert!(snapshot.errors.is_empty());
    assert!(snapshot.state_writes.is_empty());
    assert!(matches!(
        snapshot.run_proposals.as_slice(),
        [RunProposal::Transient { .. }]
    ));
    assert_eq!(snapshot.end_calls, 1);
}

#[tokio::test]
async fn test_sleep_suspends_when_the_timer_has_not_fired() {
    init_tracing();
    let engine = InMemoryEngine::builder()
        .input(b"10".to_vec())
        .suspend_on_sleep()
        .build();
    let journal = engine.journal();

    let response = dispatch(
        &charge_registry(),
        &HandlerTarget::new("Payments", "charge"),
        engine,
        body(&[b"start"]),
    )
    .await
    .unwrap();

    assert_eq!(response.outcome, InvocationOutcome::Suspended);
    let snapshot = journal.snapshot();
    assert!(snapshot.outputs.is_empty());
    assert!(snapshot.run_proposals.is_empty());
}
