use serde_json::Error as SerdeJsonError;
use std::sync::Arc;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    #[error("[{service}] upstream responded with status {status}")]
    Status { service: &'static str, status: u16 },
    #[error("[HTTP] {0}")]
    Http(#[from] reqwest::Error),
    #[error("[SERDE] Error parsing JSON: {0}")]
    SerdeJson(#[from] SerdeJsonError),
    #[error("[IO] {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Upstream(String),
    #[error("timeout")]
    Timeout,
    /// A failure shared by every caller waiting on the same cache fetch.
    #[error(transparent)]
    Shared(#[from] Arc<Error>),
}

impl Error {
    /// HTTP status reported by the upstream, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Status { status, .. } => Some(*status),
            Error::Http(err) => err.status().map(|s| s.as_u16()),
            Error::Shared(err) => err.status(),
            _ => None,
        }
    }

    /// Adapters may report quota exhaustion either as a 429 status or only
    /// in the message text; both count.
    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(429) || self.to_string().contains("429")
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
