//! DTOs for the endpoint negotiation call that exchanges app credentials
//! for a one-time WebSocket URL.

use serde::{Deserialize, Serialize};

use crate::control::ClientTunables;

/// Gateway path, relative to the open-platform base URL.
pub const ENDPOINT_PATH: &str = "/callback/ws/endpoint";

/// Response codes of the negotiation call.
pub mod codes {
    pub const OK: i64 = 0;
    pub const SYSTEM_BUSY: i64 = 1;
    pub const FORBIDDEN: i64 = 403;
    pub const AUTH_FAILED: i64 = 514;
    pub const INTERNAL_ERROR: i64 = 1_000_040_343;
    pub const EXCEED_CONN_LIMIT: i64 = 1_000_040_350;

    /// Server-side conditions a client should retry on.
    pub fn is_retryable(code: i64) -> bool {
        code == SYSTEM_BUSY || code == INTERNAL_ERROR
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointRequest {
    #[serde(rename = "AppID")]
    pub app_id: String,
    #[serde(rename = "AppSecret")]
    pub app_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointResponse {
    pub code: i64,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub data: Option<EndpointData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointData {
    #[serde(rename = "URL", default)]
    pub url: Option<String>,
    #[serde(rename = "ClientConfig", default)]
    pub client_config: Option<ClientTunables>,
}
