//! Binary frame codec.
//!
//! The schema is the proto2 message the open platform speaks on its
//! long-connection gateway:
//!
//! ```text
//! message Header { required string key = 1; required string value = 2; }
//! message Frame {
//!   required uint64 SeqID = 1;    required uint64 LogID = 2;
//!   required int32 service = 3;   required int32 method = 4;
//!   repeated Header headers = 5;
//!   optional string payload_encoding = 6;  optional string payload_type = 7;
//!   optional bytes payload = 8;            optional string LogIDNew = 9;
//! }
//! ```

use std::collections::HashMap;

use prost::Message;

use crate::headers::{self, MessageType};

/// A key/value header carried on a [`Frame`].
#[derive(Clone, PartialEq, Eq, Message)]
pub struct Header {
    #[prost(string, required, tag = "1")]
    pub key: String,
    #[prost(string, required, tag = "2")]
    pub value: String,
}

impl Header {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// One WebSocket message.
#[derive(Clone, PartialEq, Message)]
pub struct Frame {
    #[prost(uint64, required, tag = "1")]
    pub seq_id: u64,
    #[prost(uint64, required, tag = "2")]
    pub log_id: u64,
    #[prost(int32, required, tag = "3")]
    pub service: i32,
    #[prost(int32, required, tag = "4")]
    pub method: i32,
    #[prost(message, repeated, tag = "5")]
    pub headers: Vec<Header>,
    #[prost(string, optional, tag = "6")]
    pub payload_encoding: Option<String>,
    #[prost(string, optional, tag = "7")]
    pub payload_type: Option<String>,
    #[prost(bytes = "vec", optional, tag = "8")]
    pub payload: Option<Vec<u8>>,
    #[prost(string, optional, tag = "9")]
    pub log_id_new: Option<String>,
}

/// Value of [`Frame::method`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Control = 0,
    Data = 1,
}

impl FrameKind {
    pub fn from_method(method: i32) -> Option<Self> {
        match method {
            0 => Some(FrameKind::Control),
            1 => Some(FrameKind::Data),
            _ => None,
        }
    }
}

/// Inbound bytes were not a valid frame.
#[derive(thiserror::Error, Debug)]
#[error("malformed frame: {0}")]
pub struct FrameFormatError(#[from] prost::DecodeError);

impl Frame {
    /// A control frame carrying only a `type` header.
    pub fn control(service: i32, kind: MessageType) -> Self {
        Self {
            service,
            method: FrameKind::Control as i32,
            headers: vec![Header::new(headers::TYPE, kind.as_str())],
            ..Default::default()
        }
    }

    /// The heartbeat the client sends every ping interval.
    pub fn ping(service: i32) -> Self {
        Self::control(service, MessageType::Ping)
    }

    pub fn encode(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, FrameFormatError> {
        Ok(<Self as Message>::decode(bytes)?)
    }

    /// `None` when the method is neither control nor data.
    pub fn kind(&self) -> Option<FrameKind> {
        FrameKind::from_method(self.method)
    }

    /// Value of the header `key`. The last occurrence wins when a key is
    /// repeated.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|h| h.key == key)
            .map(|h| h.value.as_str())
    }

    pub fn headers_map(&self) -> HashMap<&str, &str> {
        self.headers
            .iter()
            .map(|h| (h.key.as_str(), h.value.as_str()))
            .collect()
    }

    /// The `type` header parsed as a known subtype.
    pub fn message_type(&self) -> Option<MessageType> {
        self.header(headers::TYPE).and_then(MessageType::parse)
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(Header::new(key, value));
        self
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Reply to this frame: same routing fields and headers, plus the
    /// processing-time header, with `payload` replacing the original body.
    pub fn reply(&self, payload: Vec<u8>, biz_rt_ms: u64) -> Self {
        self.clone()
            .with_header(headers::BIZ_RT, biz_rt_ms.to_string())
            .with_payload(payload)
    }
}
