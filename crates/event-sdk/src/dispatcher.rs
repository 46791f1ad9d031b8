//! Event dispatcher: normalizes envelopes and routes them to handlers.

use std::sync::Arc;

use serde_json::Value;

use crate::envelope::{normalize, CanonicalEvent};
use crate::registry::{EventHandler, HandlerRegistry, Insert};
use crate::ticket;
use crate::types::HandlerResult;

/// Event type of the server-pushed app-ticket refresh.
pub const APP_TICKET_EVENT: &str = "app_ticket";

/// Routes canonical events to registered handlers.
///
/// A fresh dispatcher already handles `app_ticket` events by caching the
/// ticket for the event's app id (see [`crate::ticket`]).  A user handler
/// registered under `app_ticket` runs after that built-in step.
///
/// ```rust,no_run
/// use lk_event_sdk::{handler_fn, EventDispatcher};
///
/// let mut dispatcher = EventDispatcher::new();
/// dispatcher
///     .register("im.message.receive_v1", handler_fn(|ev| async move {
///         tracing::info!(chat = ?ev.get("message"), "message received");
///         Ok(None)
///     }))
///     .register("im.chat.disbanded_v1", handler_fn(|_| async { Ok(None) }));
/// ```
#[derive(Clone, Default)]
pub struct EventDispatcher {
    registry: HandlerRegistry,
    fallback: Option<Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        tracing::debug!("event dispatcher ready");
        Self::default()
    }

    /// Register `handler` for `event_type`.  Re-registering a type logs a
    /// conflict and keeps the newer handler.
    ///
    /// Returns `&mut Self` for method chaining.
    pub fn register<H: EventHandler>(&mut self, event_type: impl Into<String>, handler: H) -> &mut Self {
        self.register_arc(event_type, Arc::new(handler))
    }

    /// Register a pre-wrapped handler.
    pub fn register_arc(
        &mut self,
        event_type: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> &mut Self {
        self.try_register(event_type, handler);
        self
    }

    /// Register every `(event_type, handler)` pair.
    pub fn register_all<I, K>(&mut self, handlers: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, Arc<dyn EventHandler>)>,
        K: Into<String>,
    {
        for (event_type, handler) in handlers {
            self.try_register(event_type, handler);
        }
        self
    }

    /// Register and report whether an existing handler was replaced.
    pub fn try_register(&mut self, event_type: impl Into<String>, handler: Arc<dyn EventHandler>) -> Insert {
        let event_type = event_type.into();
        let outcome = self.registry.insert(event_type.clone(), handler);
        if outcome == Insert::Replaced && event_type != APP_TICKET_EVENT {
            tracing::error!(event_type = %event_type, "handler already registered, replacing it");
        }
        tracing::debug!(event_type = %event_type, "registered event handler");
        outcome
    }

    /// Handler for event types with no dedicated handler.  Without one,
    /// such events are answered with a "no handler" marker.
    pub fn fallback<H: EventHandler>(&mut self, handler: H) -> &mut Self {
        self.fallback = Some(Arc::new(handler));
        self
    }

    /// Event types with a handler, including the built-in `app_ticket`.
    pub fn event_types(&self) -> Vec<String> {
        let mut types = self.registry.event_types();
        if !self.registry.contains(APP_TICKET_EVENT) {
            types.push(APP_TICKET_EVENT.to_string());
            types.sort();
        }
        types
    }

    /// Normalize `raw`, run the matching handler and return its result.
    ///
    /// An unknown event type is not an error: it is logged and answered
    /// with a descriptive string.
    pub async fn invoke(&self, raw: &Value) -> HandlerResult {
        let event = normalize(raw);
        let event_type = event.event_type().unwrap_or_default().to_string();
        tracing::trace!(event_type = %event_type, event = %event.to_value(), "dispatching event");

        if event_type == APP_TICKET_EVENT {
            store_ticket(&event);
            return match self.registry.get(APP_TICKET_EVENT) {
                Some(handler) => handler.handle(event).await,
                None => Ok(None),
            };
        }

        if let Some(handler) = self.registry.get(&event_type) {
            let result = handler.handle(event).await;
            tracing::debug!(event_type = %event_type, "executed event handler");
            return result;
        }

        if let Some(fallback) = &self.fallback {
            return fallback.handle(event).await;
        }

        tracing::warn!(event_type = %event_type, "no handler registered for event type");
        Ok(Some(Value::String(format!("no {event_type} event handle"))))
    }
}

/// Built-in `app_ticket` step: cache the pushed ticket under its app id.
fn store_ticket(event: &CanonicalEvent) {
    let app_id = event.get_str("app_id").unwrap_or_default();
    match event.get_str("app_ticket") {
        Some(app_ticket) => {
            ticket::store_app_ticket(app_id, app_ticket);
            tracing::debug!(app_id = %app_id, "app ticket refreshed");
        }
        None => tracing::warn!(app_id = %app_id, "app_ticket event carries no ticket"),
    }
}
