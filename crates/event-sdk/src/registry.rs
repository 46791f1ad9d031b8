//! Handler registry: maps event types to handlers.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::envelope::CanonicalEvent;
use crate::types::HandlerResult;

/// Implement this trait to handle one event type.
///
/// The client awaits each handler inline in its read loop, so a slow
/// handler delays the response for its own event.  Heartbeats keep running
/// on their own task.
///
/// # Example
///
/// ```rust,no_run
/// use lk_event_sdk::{CanonicalEvent, EventHandler, HandlerResult};
///
/// struct LogMessage;
///
/// #[async_trait::async_trait]
/// impl EventHandler for LogMessage {
///     async fn handle(&self, event: CanonicalEvent) -> HandlerResult {
///         tracing::info!(message = ?event.get("message"), "got message");
///         Ok(None)
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle(&self, event: CanonicalEvent) -> HandlerResult;
}

/// Adapter turning an async closure into an [`EventHandler`].
pub struct FnHandler<F>(F);

/// Wrap an async closure as a handler.
///
/// ```rust,no_run
/// use lk_event_sdk::{handler_fn, EventDispatcher};
///
/// let mut dispatcher = EventDispatcher::new();
/// dispatcher.register(
///     "im.message.receive_v1",
///     handler_fn(|event| async move { Ok(Some(event.to_value())) }),
/// );
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(CanonicalEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    FnHandler(f)
}

#[async_trait::async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(CanonicalEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, event: CanonicalEvent) -> HandlerResult {
        (self.0)(event).await
    }
}

/// Outcome of [`HandlerRegistry::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insert {
    Added,
    /// The key already had a handler; the new one replaced it.
    Replaced,
}

/// Event type → handler map.  Keys are unique; inserting an existing key
/// replaces the handler and reports the conflict instead of hiding it.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn EventHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, event_type: impl Into<String>, handler: Arc<dyn EventHandler>) -> Insert {
        match self.handlers.insert(event_type.into(), handler) {
            Some(_) => Insert::Replaced,
            None => Insert::Added,
        }
    }

    pub fn get(&self, event_type: &str) -> Option<Arc<dyn EventHandler>> {
        self.handlers.get(event_type).cloned()
    }

    pub fn contains(&self, event_type: &str) -> bool {
        self.handlers.contains_key(event_type)
    }

    /// All registered event types (sorted).
    pub fn event_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
