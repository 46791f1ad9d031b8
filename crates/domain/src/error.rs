/// Shared error type used across all workspace crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("config: {0}")]
    Config(String),

    /// The endpoint negotiation call returned a failure code or an
    /// unusable body.
    #[error("negotiation failed (code {code}): {message}")]
    Negotiation {
        code: i64,
        message: String,
        retryable: bool,
    },

    #[error("transport: {0}")]
    Transport(String),

    /// Returned once from `start` when the first connection attempt fails.
    #[error("startup: {0}")]
    Startup(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the failure is one the server expects clients to retry
    /// (system busy / internal error).
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Negotiation { retryable, .. } => *retryable,
            Error::Http(_) | Error::Timeout(_) | Error::Transport(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
