//! Shared types for the Lark long-connection workspace: the error type used
//! by every crate and the TOML configuration model.

pub mod config;
pub mod error;

pub use error::{Error, Result};
