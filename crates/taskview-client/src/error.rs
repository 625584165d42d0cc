//! Error types for the follow client.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid server URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Event stream returned {status}")]
    Status { status: u16 },

    #[error("Invalid event frame: {0}")]
    Frame(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;
