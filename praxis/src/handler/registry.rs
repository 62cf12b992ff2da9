//! Registry of built handlers.
//!
//! The registry owns every [`Handler`] and indexes it three ways:
//! - by [`HandlerToken`], the typed receipt returned at registration
//! - by the function item it was built from, for `handler_from_callable`
//! - by service and handler name, for dispatch
//!
//! Dispatch only needs bytes in and bytes out, so handlers are stored
//! behind the object-safe [`ErasedHandler`] trait. Typed lookups downcast
//! back to `Handler<I, O>`.

use super::descriptor::{Arity, Handler, HandlerSignature};
use super::error::{ConfigError, LookupError};
use super::factory::make_handler;
use super::invoke::invoke_handler;
use super::io::HandlerIOBuilder;
use crate::core::{HandlerKind, ServiceTag};
use crate::executor::{Context, HandlerError};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::BoxFuture;
use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// A handler with its input and output types erased.
pub trait ErasedHandler: Send + Sync {
    fn service_tag(&self) -> &ServiceTag;

    fn name(&self) -> &str;

    fn kind(&self) -> Option<HandlerKind>;

    fn arity(&self) -> Arity;

    fn accept(&self) -> &str;

    fn content_type(&self) -> &str;

    /// Runs the handler on raw input bytes, see [`invoke_handler`].
    fn invoke(
        self: Arc<Self>,
        ctx: Context,
        input: Vec<u8>,
    ) -> BoxFuture<'static, Result<Vec<u8>, HandlerError>>;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl fmt::Debug for dyn ErasedHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedHandler")
            .field("service", &self.service_tag().name())
            .field("name", &self.name())
            .field("arity", &self.arity())
            .finish()
    }
}

impl<I, O> ErasedHandler for Handler<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    fn service_tag(&self) -> &ServiceTag {
        Handler::service_tag(self)
    }

    fn name(&self) -> &str {
        Handler::name(self)
    }

    fn kind(&self) -> Option<HandlerKind> {
        Handler::kind(self)
    }

    fn arity(&self) -> Arity {
        Handler::arity(self)
    }

    fn accept(&self) -> &str {
        self.handler_io().accept()
    }

    fn content_type(&self) -> &str {
        self.handler_io().content_type()
    }

    fn invoke(
        self: Arc<Self>,
        ctx: Context,
        input: Vec<u8>,
    ) -> BoxFuture<'static, Result<Vec<u8>, HandlerError>> {
        Box::pin(async move { invoke_handler(&self, ctx, &input).await })
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Typed receipt for a registered handler.
pub struct HandlerToken<I, O> {
    id: u64,
    _types: PhantomData<fn() -> (I, O)>,
}

impl<I, O> HandlerToken<I, O> {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl<I, O> Clone for HandlerToken<I, O> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<I, O> Copy for HandlerToken<I, O> {}

impl<I, O> fmt::Debug for HandlerToken<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HandlerToken").field(&self.id).finish()
    }
}

lazy_static::lazy_static! {
    static ref GLOBAL_REGISTRY: Registry = Registry::new();
}

#[derive(Default)]
pub struct Registry {
    handlers: DashMap<u64, Arc<dyn ErasedHandler>>,
    by_name: DashMap<(String, String), u64>,
    by_callable: DashMap<TypeId, u64>,
    next_id: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static Registry {
        &GLOBAL_REGISTRY
    }

    /// Builds a handler with [`make_handler`] and registers it.
    ///
    /// # Errors
    /// Every [`make_handler`] error, plus `ConfigError::Duplicate` if the
    /// service already has a handler with the same name.
    pub fn register<I, O>(
        &self,
        service_tag: ServiceTag,
        io: HandlerIOBuilder<I, O>,
        name: Option<&str>,
        kind: Option<HandlerKind>,
        signature: HandlerSignature<I, O>,
    ) -> Result<HandlerToken<I, O>, ConfigError>
    where
        I: Send + 'static,
        O: Send + 'static,
    {
        let callable = signature.callable();
        let handler = make_handler(service_tag, io, name, kind, signature)?;
        let service = handler.service_tag().name().to_string();
        let handler_name = handler.name().to_string();

        let id = match self.by_name.entry((service.clone(), handler_name.clone())) {
            Entry::Occupied(_) => {
                return Err(ConfigError::Duplicate {
                    service,
                    handler: handler_name,
                })
            }
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                self.handlers.insert(id, Arc::new(handler));
                slot.insert(id);
                id
            }
        };

        if let Some(type_id) = callable {
            if let Some(previous) = self.by_callable.insert(type_id, id) {
                warn!(
                    "Callable for {}/{} was already registered as handler {}, replacing",
                    service, handler_name, previous
                );
            }
        }

        info!("Registered handler {}/{}", service, handler_name);
        Ok(HandlerToken {
            id,
            _types: PhantomData,
        })
    }

    /// Typed access to a registered handler.
    pub fn handler<I, O>(&self, token: HandlerToken<I, O>) -> Result<Arc<Handler<I, O>>, LookupError>
    where
        I: Send + 'static,
        O: Send + 'static,
    {
        let erased = self.get(token.id).ok_or(LookupError::NotRegistered)?;
        downcast(erased)
    }

    /// The handler that was built from `callable`.
    ///
    /// # Errors
    /// `LookupError::NotRegistered` if `callable` was never registered.
    pub fn handler_from_callable<F: 'static>(
        &self,
        _callable: &F,
    ) -> Result<Arc<dyn ErasedHandler>, LookupError> {
        let id = self
            .by_callable
            .get(&TypeId::of::<F>())
            .map(|entry| *entry.value())
            .ok_or(LookupError::NotRegistered)?;
        self.get(id).ok_or(LookupError::NotRegistered)
    }

    /// Typed variant of [`Registry::handler_from_callable`].
    ///
    /// # Errors
    /// `LookupError::TypeMismatch` if the handler has other I/O types.
    pub fn typed_handler_from_callable<I, O, F: 'static>(
        &self,
        callable: &F,
    ) -> Result<Arc<Handler<I, O>>, LookupError>
    where
        I: Send + 'static,
        O: Send + 'static,
    {
        downcast(self.handler_from_callable(callable)?)
    }

    /// Resolves a dispatch target.
    ///
    /// # Errors
    /// `LookupError::UnknownHandler` if nothing is registered under the pair.
    pub fn resolve(&self, service: &str, handler: &str) -> Result<Arc<dyn ErasedHandler>, LookupError> {
        self.by_name
            .get(&(service.to_string(), handler.to_string()))
            .map(|entry| *entry.value())
            .and_then(|id| self.get(id))
            .ok_or_else(|| LookupError::UnknownHandler {
                service: service.to_string(),
                handler: handler.to_string(),
            })
    }

    /// All handlers of one service, in registration order.
    pub fn service_handlers(&self, service: &str) -> Vec<Arc<dyn ErasedHandler>> {
        let mut ids: Vec<u64> = self
            .by_name
            .iter()
            .filter(|entry| entry.key().0 == service)
            .map(|entry| *entry.value())
            .collect();
        ids.sort_unstable();
        ids.into_iter().filter_map(|id| self.get(id)).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    fn get(&self, id: u64) -> Option<Arc<dyn ErasedHandler>> {
        self.handlers.get(&id).map(|entry| Arc::clone(entry.value()))
    }
}

fn downcast<I, O>(erased: Arc<dyn ErasedHandler>) -> Result<Arc<Handler<I, O>>, LookupError>
where
    I: Send + 'static,
    O: Send + 'static,
{
    let name = erased.name().to_string();
    erased
        .into_any()
        .downcast::<Handler<I, O>>()
        .map_err(|_| LookupError::TypeMismatch { handler: name })
}
