//! Event envelope normalization.
//!
//! The platform has shipped two envelope layouts.  The 2.0 layout carries a
//! `schema` marker with the type under `header.event_type`:
//!
//! ```json
//! {"schema": "2.0", "header": {"event_type": "im.message.receive_v1", ...}, "event": {...}}
//! ```
//!
//! The 1.0 layout has no marker and the type lives at `event.type`:
//!
//! ```json
//! {"uuid": "...", "token": "...", "event": {"type": "app_ticket", ...}}
//! ```
//!
//! [`normalize`] flattens either one into a [`CanonicalEvent`] so nothing
//! downstream needs to know which layout arrived.

use serde::Serialize;
use serde_json::{Map, Value};

/// An envelope flattened into a single field map plus its event type.
///
/// The event type is held outside the field map, so no payload field can
/// shadow it.  Serializes as the flat field map.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CanonicalEvent {
    #[serde(skip)]
    event_type: Option<String>,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl CanonicalEvent {
    pub fn event_type(&self) -> Option<&str> {
        self.event_type.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Field `key` as a string, if present and a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }

    /// The flattened fields as a JSON object.
    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

/// Flatten `raw` into a canonical event.  Never fails: anything that is not
/// an object, or lacks the expected sub-objects, just yields fewer fields.
pub fn normalize(raw: &Value) -> CanonicalEvent {
    let Some(obj) = raw.as_object() else {
        return CanonicalEvent::default();
    };

    let mut rest = obj.clone();
    let event = rest.remove("event");
    let event_fields = event.as_ref().and_then(Value::as_object);

    let mut fields = Map::new();
    if obj.contains_key("schema") {
        let header = rest.remove("header");
        let header_fields = header.as_ref().and_then(Value::as_object);
        let event_type = header_fields
            .and_then(|h| h.get("event_type"))
            .and_then(Value::as_str)
            .map(str::to_string);

        merge(&mut fields, &rest);
        if let Some(h) = header_fields {
            merge(&mut fields, h);
        }
        if let Some(e) = event_fields {
            merge(&mut fields, e);
        }
        CanonicalEvent { event_type, fields }
    } else {
        let event_type = event_fields
            .and_then(|e| e.get("type"))
            .and_then(Value::as_str)
            .map(str::to_string);

        if let Some(e) = event_fields {
            merge(&mut fields, e);
        }
        merge(&mut fields, &rest);
        CanonicalEvent { event_type, fields }
    }
}

/// Event type of a raw envelope, without building the canonical event.
pub fn event_type_of(raw: &Value) -> Option<&str> {
    if raw.get("schema").is_some() {
        raw.pointer("/header/event_type").and_then(Value::as_str)
    } else {
        raw.pointer("/event/type").and_then(Value::as_str)
    }
}

fn merge(into: &mut Map<String, Value>, from: &Map<String, Value>) {
    for (k, v) in from {
        into.insert(k.clone(), v.clone());
    }
}
