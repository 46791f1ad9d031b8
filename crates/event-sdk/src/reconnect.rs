//! Reconnect policy: jittered first attempt, then fixed-interval retries,
//! optionally bounded.

use std::time::Duration;

use crate::session::SessionParameters;
use crate::types::ReconnectInfo;

/// Snapshot of the retry tunables, taken once per reconnect cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay between consecutive failed attempts.
    pub interval: Duration,
    /// Upper bound of the random delay before the first attempt.
    pub nonce: Duration,
    /// Attempts per cycle before giving up.  `None` means unlimited.
    pub max_attempts: Option<u64>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_params(&SessionParameters::default())
    }
}

impl ReconnectPolicy {
    pub fn from_params(params: &SessionParameters) -> Self {
        Self {
            interval: params.reconnect_interval,
            nonce: params.reconnect_nonce,
            max_attempts: u64::try_from(params.reconnect_count).ok(),
        }
    }

    /// Random delay in `[0, nonce)`, spreading reconnect storms when many
    /// clients drop at once.
    pub fn initial_delay(&self) -> Duration {
        self.nonce.mul_f64(rand::random::<f64>())
    }

    /// Whether the cycle stops after `attempt` failed attempts (1-indexed).
    pub fn should_give_up(&self, attempt: u64) -> bool {
        self.max_attempts.is_some_and(|max| attempt >= max)
    }
}

/// Reconnect bookkeeping owned by the client.
#[derive(Debug, Clone, Default)]
pub(crate) struct ReconnectState {
    pub last_connect_ms: i64,
    pub next_connect_ms: i64,
    pub in_flight: bool,
}

impl ReconnectState {
    pub fn info(&self) -> ReconnectInfo {
        ReconnectInfo {
            last_connect_time: self.last_connect_ms,
            next_connect_time: self.next_connect_ms,
            in_flight: self.in_flight,
        }
    }
}
