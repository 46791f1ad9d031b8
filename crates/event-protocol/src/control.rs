//! JSON payloads carried inside frames.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

pub const STATUS_OK: u16 = 200;
pub const STATUS_INTERNAL_ERROR: u16 = 500;

/// Server-controlled client tunables, in seconds.
///
/// Sent as `ClientConfig` in the negotiation response and as the whole
/// payload of a `pong` control frame.  Absent fields leave the client's
/// current value untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClientTunables {
    #[serde(default)]
    pub ping_interval: Option<u64>,
    /// Negative means unbounded.
    #[serde(default)]
    pub reconnect_count: Option<i64>,
    #[serde(default)]
    pub reconnect_interval: Option<u64>,
    #[serde(default)]
    pub reconnect_nonce: Option<u64>,
}

impl ClientTunables {
    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// Body of the frame sent back after an event was handled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventResponse {
    pub code: u16,
    /// Base64 of the JSON-encoded handler result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl EventResponse {
    /// Success response; `result` is embedded when present and not null.
    pub fn ok(result: Option<&serde_json::Value>) -> serde_json::Result<Self> {
        let data = match result {
            Some(v) if !v.is_null() => Some(STANDARD.encode(serde_json::to_vec(v)?)),
            _ => None,
        };
        Ok(Self {
            code: STATUS_OK,
            data,
        })
    }

    pub fn internal_error() -> Self {
        Self {
            code: STATUS_INTERNAL_ERROR,
            data: None,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        // A struct of an integer and an optional string always serializes.
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Decode `data` back into the handler's JSON result.
    pub fn decode_data(&self) -> Option<serde_json::Value> {
        let raw = STANDARD.decode(self.data.as_deref()?).ok()?;
        serde_json::from_slice(&raw).ok()
    }
}
