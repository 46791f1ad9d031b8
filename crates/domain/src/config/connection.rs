use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Long-connection behaviour
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Client-side connection settings.
///
/// The tunables (`ping_interval_secs`, `reconnect_*`) are only the starting
/// point: every successful negotiation and every pong from the server
/// overwrites them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSettings {
    #[serde(default = "d_true")]
    pub auto_reconnect: bool,
    #[serde(default = "d_15000")]
    pub negotiate_timeout_ms: u64,
    /// Pending fragments older than this are discarded.
    #[serde(default = "d_10000")]
    pub fragment_expiry_ms: u64,
    #[serde(default = "d_locale")]
    pub locale: String,
    #[serde(default = "d_120")]
    pub ping_interval_secs: u64,
    /// Negative means retry forever.
    #[serde(default = "d_minus_one")]
    pub reconnect_count: i64,
    #[serde(default = "d_120")]
    pub reconnect_interval_secs: u64,
    /// Upper bound of the random delay before the first reconnect attempt.
    #[serde(default = "d_30")]
    pub reconnect_nonce_secs: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            negotiate_timeout_ms: 15_000,
            fragment_expiry_ms: 10_000,
            locale: d_locale(),
            ping_interval_secs: 120,
            reconnect_count: -1,
            reconnect_interval_secs: 120,
            reconnect_nonce_secs: 30,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_true() -> bool {
    true
}
fn d_15000() -> u64 {
    15_000
}
fn d_10000() -> u64 {
    10_000
}
fn d_locale() -> String {
    "zh".into()
}
fn d_120() -> u64 {
    120
}
fn d_30() -> u64 {
    30
}
fn d_minus_one() -> i64 {
    -1
}
