//! `lk-event-sdk`: long-connection event client for the Lark / Feishu open
//! platform.
//!
//! Instead of exposing a public webhook, an app can open a WebSocket to the
//! platform and receive its events over it.  This crate owns everything
//! between "here are my app credentials and handlers" and "my handler got a
//! complete event": endpoint negotiation, the socket, heartbeats,
//! reconnects, fragment reassembly, envelope normalization, dispatch, and
//! the response frame that acknowledges each event.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │  Your app                                                 │
//! │                                                           │
//! │   let mut d = EventDispatcher::new();                     │
//! │   d.register("im.message.receive_v1", OnMessage);         │
//! │                                                           │
//! │   let client = EventClientBuilder::new()                  │
//! │       .app_id("cli_xxx")                                  │
//! │       .app_secret(secret)                                 │
//! │       .build()?;                                          │
//! │   client.start(d).await?;                                 │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! # Connection flow
//!
//! 1. POST app id/secret to `/callback/ws/endpoint`, receive a one-time
//!    socket URL plus client tunables
//! 2. Open the socket; ping every ping interval
//! 3. Read loop:
//!    - `pong` control frames retune the client
//!    - `event` / `card` data frames are reassembled, dispatched, and
//!      answered with `{code, data}` plus the `biz_rt` header
//! 4. On disconnect: clear pending fragments, wait a random delay, then
//!    retry every reconnect interval (bounded or not)

pub mod builder;
pub mod client;
pub mod dispatcher;
pub mod envelope;
pub mod http;
pub mod negotiate;
pub mod reassembly;
pub mod reconnect;
pub mod registry;
pub mod session;
pub mod ticket;
pub mod types;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use builder::EventClientBuilder;
pub use client::EventClient;
pub use dispatcher::{EventDispatcher, APP_TICKET_EVENT};
pub use envelope::{normalize, CanonicalEvent};
pub use http::{HttpRequest, HttpRequester, ReqwestRequester};
pub use reassembly::{Fragment, LogicalMessage, ReassemblyCache};
pub use reconnect::ReconnectPolicy;
pub use registry::{handler_fn, EventHandler, Insert};
pub use session::SessionParameters;
pub use types::{ClientState, ConnectionConfig, HandlerError, HandlerResult, ReconnectInfo};

// Re-export domain types so apps rarely need to import lk-domain directly.
pub use lk_domain::config::Domain;
pub use lk_domain::error::{Error, Result};
