//! Header keys and subtype values understood on frames.

/// Frame subtype (`ping`, `pong`, `event`, `card`).
pub const TYPE: &str = "type";
/// Shared by every fragment of one logical message.
pub const MESSAGE_ID: &str = "message_id";
/// Declared number of fragments.
pub const SUM: &str = "sum";
/// Zero-based index of this fragment.
pub const SEQ: &str = "seq";
pub const TRACE_ID: &str = "trace_id";
/// Handler processing time in milliseconds, added to responses.
pub const BIZ_RT: &str = "biz_rt";

// Set on the HTTP response of a rejected WebSocket upgrade.
pub const HANDSHAKE_STATUS: &str = "handshake-status";
pub const HANDSHAKE_MSG: &str = "handshake-msg";
pub const HANDSHAKE_AUTH_ERR_CODE: &str = "handshake-autherrcode";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Event,
    Card,
    Ping,
    Pong,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Event => "event",
            MessageType::Card => "card",
            MessageType::Ping => "ping",
            MessageType::Pong => "pong",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "event" => Some(MessageType::Event),
            "card" => Some(MessageType::Card),
            "ping" => Some(MessageType::Ping),
            "pong" => Some(MessageType::Pong),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
