use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::types::ServerEvent;

/// Context handed to the inbound-event subscriber.
///
/// The subscriber sees every successfully parsed event — including types the
/// client does not recognize — before any internal component reacts to it.
#[derive(Debug, Clone)]
pub struct ServerEventContext {
    pub event: ServerEvent,
}

/// Context handed to the volume subscriber: one capture block's mean
/// absolute amplitude in [0, 1].
#[derive(Debug, Clone, Copy)]
pub struct VolumeContext {
    pub volume: f32,
}

/// An async subscriber callback with shared application state.
pub trait EventHandlerSimple<C, S: Clone + Send + Sync + 'static>: Send + Sync {
    fn call(&self, ctx: C, state: Arc<S>) -> Pin<Box<dyn Future<Output = ()> + Send>>;
}

impl<C, S, F, Fut> EventHandlerSimple<C, S> for F
where
    C: Send + 'static,
    S: Clone + Send + Sync + 'static,
    F: Fn(C, Arc<S>) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn call(&self, ctx: C, state: Arc<S>) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(self(ctx, state))
    }
}

pub(crate) struct Handlers<S: Clone + Send + Sync + 'static> {
    pub on_event: Option<Arc<dyn EventHandlerSimple<ServerEventContext, S>>>,
    pub on_volume: Option<Arc<dyn EventHandlerSimple<VolumeContext, S>>>,
}

impl<S: Clone + Send + Sync + 'static> Default for Handlers<S> {
    fn default() -> Self {
        Self {
            on_event: None,
            on_volume: None,
        }
    }
}
