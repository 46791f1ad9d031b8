//! Event sink: every accepted event becomes one JSON document on stdout.

use chrono::Utc;
use lk_domain::config::TriggerConfig;
use lk_event_sdk::{CanonicalEvent, EventDispatcher, EventHandler, HandlerResult};
use serde_json::{json, Value};
use tokio::sync::mpsc;

/// Handler that forwards rendered events to the printer task.
#[derive(Clone)]
pub struct EmitHandler {
    pretty: bool,
    out: mpsc::UnboundedSender<String>,
}

impl EmitHandler {
    pub fn new(pretty: bool, out: mpsc::UnboundedSender<String>) -> Self {
        Self { pretty, out }
    }
}

#[async_trait::async_trait]
impl EventHandler for EmitHandler {
    async fn handle(&self, event: CanonicalEvent) -> HandlerResult {
        let line = render(&event, self.pretty);
        if self.out.send(line).is_err() {
            tracing::warn!(event_type = event.event_type().unwrap_or_default(), "output closed, event dropped");
        }
        Ok(None)
    }
}

/// `{event_type, received_at, event}` for one canonical event.
pub fn render(event: &CanonicalEvent, pretty: bool) -> String {
    let doc = json!({
        "event_type": event.event_type(),
        "received_at": Utc::now().to_rfc3339(),
        "event": Value::Object(event.fields().clone()),
    });
    let rendered = if pretty {
        serde_json::to_string_pretty(&doc)
    } else {
        serde_json::to_string(&doc)
    };
    // A `Value` built from a JSON map always serializes.
    rendered.unwrap_or_default()
}

/// One handler per configured event type, or a catch-all when the filter
/// is empty.
pub fn build_dispatcher(trigger: &TriggerConfig, out: mpsc::UnboundedSender<String>) -> EventDispatcher {
    let handler = EmitHandler::new(trigger.pretty, out);
    let mut dispatcher = EventDispatcher::new();
    if trigger.accepts_all() {
        dispatcher.fallback(handler);
    } else {
        for event_type in &trigger.events {
            dispatcher.register(event_type.clone(), handler.clone());
        }
    }
    dispatcher
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_event() -> Value {
        json!({
            "schema": "2.0",
            "header": {"event_type": "im.message.receive_v1"},
            "event": {"message": {"text": "hi"}}
        })
    }

    #[tokio::test]
    async fn empty_filter_emits_everything() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let d = build_dispatcher(&TriggerConfig::default(), tx);

        d.invoke(&message_event()).await.unwrap();
        let line = rx.recv().await.unwrap();
        let doc: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(doc["event_type"], "im.message.receive_v1");
        assert_eq!(doc["event"]["message"]["text"], "hi");
        assert!(!line.contains('\n'));
    }

    #[tokio::test]
    async fn filter_drops_other_types() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let trigger = TriggerConfig {
            events: vec!["im.chat.disbanded_v1".into()],
            pretty: false,
        };
        let d = build_dispatcher(&trigger, tx);

        let out = d.invoke(&message_event()).await.unwrap();
        assert_eq!(out, Some(json!("no im.message.receive_v1 event handle")));
        assert!(rx.try_recv().is_err());

        d.invoke(&json!({"event": {"type": "im.chat.disbanded_v1", "chat_id": "c1"}}))
            .await
            .unwrap();
        let doc: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(doc["event"]["chat_id"], "c1");
    }

    #[test]
    fn pretty_output_spans_lines() {
        let event = lk_event_sdk::normalize(&message_event());
        assert!(render(&event, true).contains('\n'));
    }
}
