use super::io::HandlerIO;
use crate::core::{HandlerKind, ServiceTag, TypeHint};
use crate::executor::{Context, HandlerError};
use futures::future::BoxFuture;
use std::any::TypeId;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

pub type HandlerFuture<O> = BoxFuture<'static, Result<O, HandlerError>>;

type UnaryFn<O> = dyn Fn(Context) -> HandlerFuture<O> + Send + Sync;
type BinaryFn<I, O> = dyn Fn(Context, I) -> HandlerFuture<O> + Send + Sync;

/// Number of parameters a handler function accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arity {
    /// `fn(ctx)`
    ContextOnly,
    /// `fn(ctx, input)`
    WithInput,
}

impl Arity {
    pub fn from_parameter_count(count: usize) -> Option<Self> {
        match count {
            1 => Some(Arity::ContextOnly),
            2 => Some(Arity::WithInput),
            _ => None,
        }
    }

    pub fn parameter_count(self) -> usize {
        match self {
            Arity::ContextOnly => 1,
            Arity::WithInput => 2,
        }
    }

    pub fn takes_input(self) -> bool {
        self == Arity::WithInput
    }
}

/// The user function behind a handler, with its error type erased.
pub enum HandlerFn<I, O> {
    Unary(Arc<UnaryFn<O>>),
    Binary(Arc<BinaryFn<I, O>>),
}

impl<I, O> HandlerFn<I, O> {
    pub fn unary<F, Fut, E>(f: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, E>> + Send + 'static,
        E: Into<HandlerError> + 'static,
        O: 'static,
    {
        HandlerFn::Unary(Arc::new(move |ctx: Context| -> HandlerFuture<O> {
            let fut = f(ctx);
            Box::pin(async move { fut.await.map_err(Into::into) })
        }))
    }

    pub fn binary<F, Fut, E>(f: F) -> Self
    where
        F: Fn(Context, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, E>> + Send + 'static,
        E: Into<HandlerError> + 'static,
        I: 'static,
        O: 'static,
    {
        HandlerFn::Binary(Arc::new(move |ctx: Context, input: I| -> HandlerFuture<O> {
            let fut = f(ctx, input);
            Box::pin(async move { fut.await.map_err(Into::into) })
        }))
    }

    pub fn arity(&self) -> Arity {
        match self {
            HandlerFn::Unary(_) => Arity::ContextOnly,
            HandlerFn::Binary(_) => Arity::WithInput,
        }
    }
}

impl<I, O> Clone for HandlerFn<I, O> {
    fn clone(&self) -> Self {
        match self {
            HandlerFn::Unary(f) => HandlerFn::Unary(Arc::clone(f)),
            HandlerFn::Binary(f) => HandlerFn::Binary(Arc::clone(f)),
        }
    }
}

/// A declared handler parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    name: String,
    annotation: Option<String>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, annotation: Option<&str>) -> Self {
        Self {
            name: name.into(),
            annotation: annotation.map(str::to_string),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn annotation(&self) -> Option<&str> {
        self.annotation.as_deref()
    }
}

/// Everything known about a handler function before it is bound to a
/// service: its own name, declared parameters, declared types and body.
///
/// Usually generated by `#[handler]`; can be assembled by hand.
pub struct HandlerSignature<I, O> {
    name: Option<String>,
    parameters: Vec<Parameter>,
    input_type: TypeHint<I>,
    output_type: TypeHint<O>,
    func: HandlerFn<I, O>,
    callable: Option<TypeId>,
}

impl<I, O> HandlerSignature<I, O> {
    /// A signature whose parameter list matches the function's shape.
    pub fn new(func: HandlerFn<I, O>) -> Self {
        let parameters = match func.arity() {
            Arity::ContextOnly => vec![Parameter::new("ctx", None)],
            Arity::WithInput => vec![Parameter::new("ctx", None), Parameter::new("input", None)],
        };
        Self {
            name: None,
            parameters,
            input_type: TypeHint::plain(),
            output_type: TypeHint::plain(),
            func,
            callable: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_parameters(mut self, parameters: Vec<Parameter>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_input_type(mut self, hint: TypeHint<I>) -> Self {
        self.input_type = hint;
        self
    }

    pub fn with_output_type(mut self, hint: TypeHint<O>) -> Self {
        self.output_type = hint;
        self
    }

    /// Associates the signature with a function item so the registered
    /// handler can later be found from that function.
    pub fn for_callable<F: 'static>(mut self, _callable: &F) -> Self {
        self.callable = Some(TypeId::of::<F>());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn input_type(&self) -> &TypeHint<I> {
        &self.input_type
    }

    pub fn output_type(&self) -> &TypeHint<O> {
        &self.output_type
    }

    pub fn func(&self) -> &HandlerFn<I, O> {
        &self.func
    }

    pub fn callable(&self) -> Option<TypeId> {
        self.callable
    }

    pub(crate) fn into_parts(self) -> (HandlerFn<I, O>, TypeHint<I>, TypeHint<O>) {
        (self.func, self.input_type, self.output_type)
    }
}

/// A fully configured handler bound to its service.
pub struct Handler<I, O> {
    service_tag: ServiceTag,
    handler_io: HandlerIO<I, O>,
    kind: Option<HandlerKind>,
    name: String,
    func: HandlerFn<I, O>,
    arity: Arity,
}

impl<I, O> Handler<I, O> {
    pub(crate) fn new(
        service_tag: ServiceTag,
        handler_io: HandlerIO<I, O>,
        kind: Option<HandlerKind>,
        name: String,
        func: HandlerFn<I, O>,
    ) -> Self {
        let arity = func.arity();
        Self {
            service_tag,
            handler_io,
            kind,
            name,
            func,
            arity,
        }
    }

    pub fn service_tag(&self) -> &ServiceTag {
        &self.service_tag
    }

    pub fn handler_io(&self) -> &HandlerIO<I, O> {
        &self.handler_io
    }

    pub fn kind(&self) -> Option<HandlerKind> {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn func(&self) -> &HandlerFn<I, O> {
        &self.func
    }

    pub fn arity(&self) -> Arity {
        self.arity
    }
}

impl<I, O> fmt::Debug for Handler<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("service_tag", &self.service_tag)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("arity", &self.arity)
            .field("handler_io", &self.handler_io)
            .finish()
    }
}
