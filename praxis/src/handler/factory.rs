use super::descriptor::{Arity, Handler, HandlerSignature};
use super::error::ConfigError;
use super::io::HandlerIOBuilder;
use crate::core::{HandlerKind, ServiceTag};
use tracing::debug;

/// Builds a [`Handler`] from a function signature and its service-level
/// configuration.
///
/// The handler is named by `name` when given, otherwise by the function's
/// own name. Its arity is the number of declared parameters. For handlers
/// that take an input, a structured-schema input type replaces a default
/// input codec with a schema codec; the same applies to the output type.
///
/// # Errors
/// - `ConfigError::MissingName` if no name is available
/// - `ConfigError::NoParameters` if the function declares no parameters
/// - `ConfigError::TooManyParameters` if it declares more than two
/// - `ConfigError::ArityMismatch` if the declared parameters disagree with
///   the callable's shape
pub fn make_handler<I, O>(
    service_tag: ServiceTag,
    io: HandlerIOBuilder<I, O>,
    name: Option<&str>,
    kind: Option<HandlerKind>,
    signature: HandlerSignature<I, O>,
) -> Result<Handler<I, O>, ConfigError> {
    let handler_name = name
        .filter(|n| !n.is_empty())
        .or_else(|| signature.name().filter(|n| !n.is_empty()))
        .ok_or(ConfigError::MissingName)?
        .to_string();

    let count = signature.parameters().len();
    if count == 0 {
        return Err(ConfigError::NoParameters {
            handler: handler_name,
        });
    }
    let arity = Arity::from_parameter_count(count).ok_or_else(|| {
        ConfigError::TooManyParameters {
            handler: handler_name.clone(),
            count,
        }
    })?;
    let callable_arity = signature.func().arity();
    if arity != callable_arity {
        return Err(ConfigError::ArityMismatch {
            handler: handler_name,
            declared: count,
            callable: callable_arity.parameter_count(),
        });
    }

    let (func, input_type, output_type) = signature.into_parts();
    let input_type = arity.takes_input().then_some(input_type);
    let handler_io = io.build(input_type, Some(output_type));

    debug!(
        "Built handler {}/{} (arity {}, input serde {:?}, output serde {:?})",
        service_tag.name(),
        handler_name,
        arity.parameter_count(),
        handler_io.input_serde().kind(),
        handler_io.output_serde().kind()
    );

    Ok(Handler::new(service_tag, handler_io, kind, handler_name, func))
}
