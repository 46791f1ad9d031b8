//! Long-connection wire protocol: the binary frame every WebSocket message
//! carries, the header vocabulary riding on it, and the JSON payloads
//! exchanged inside frames and with the endpoint negotiation call.
//!
//! Every WebSocket message in both directions is one protobuf-encoded
//! [`Frame`].  `control` frames carry heartbeats (`ping` from the client,
//! `pong` from the server, whose payload retunes the client); `data` frames
//! carry events, possibly split into several fragments sharing a
//! `message_id`.

pub mod control;
pub mod endpoint;
pub mod frame;
pub mod headers;

pub use control::{ClientTunables, EventResponse, STATUS_INTERNAL_ERROR, STATUS_OK};
pub use endpoint::{EndpointData, EndpointRequest, EndpointResponse, ENDPOINT_PATH};
pub use frame::{Frame, FrameFormatError, FrameKind, Header};
pub use headers::MessageType;
