use super::descriptor::{Handler, HandlerFn};
use crate::core::TerminalError;
use crate::executor::{Context, HandlerError};
use tracing::debug;

/// Runs a handler on raw input bytes and returns its encoded output.
///
/// Handlers that take an input decode `input` with the handler's input
/// codec first; a decoding failure is terminal, since retrying the same
/// bytes cannot succeed. Handlers without an input never look at `input`.
/// Errors returned by the user function are passed through unchanged.
///
/// # Errors
/// - `HandlerError::Terminal` if the input cannot be decoded or the output
///   cannot be encoded
/// - whatever the user function returns
pub async fn invoke_handler<I, O>(
    handler: &Handler<I, O>,
    ctx: Context,
    input: &[u8],
) -> Result<Vec<u8>, HandlerError> {
    let io = handler.handler_io();

    // Handler construction guarantees the function shape matches the arity.
    let output = match handler.func() {
        HandlerFn::Binary(f) => {
            let arg = io.input_serde().deserialize(input).map_err(|e| {
                debug!(
                    "Rejecting input for handler {}/{}: {}",
                    handler.service_tag().name(),
                    handler.name(),
                    e
                );
                TerminalError::new(format!("Unable to parse an input argument. {e}"))
            })?;
            f(ctx, arg).await?
        }
        HandlerFn::Unary(f) => f(ctx).await?,
    };

    io.output_serde().serialize(&output).map_err(|e| {
        TerminalError::new(format!("Unable to serialize the handler output. {e}")).into()
    })
}
