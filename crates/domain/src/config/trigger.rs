use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trigger node
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TriggerConfig {
    /// Event types to emit. Empty means every event type.
    #[serde(default)]
    pub events: Vec<String>,
    /// Pretty-print emitted events instead of one JSON object per line.
    #[serde(default)]
    pub pretty: bool,
}

impl TriggerConfig {
    pub fn accepts_all(&self) -> bool {
        self.events.is_empty()
    }
}
