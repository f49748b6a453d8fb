use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Persisted session is missing or corrupt. Fatal; requires a fresh login.
    #[error("session storage invalid: {0}")]
    InvalidStorage(String),

    /// Missing or invalid credential material (stream token, bot account).
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Network-level failure opening or reading the event stream.
    #[error("stream connection failed: {0}")]
    Connection(String),

    /// Non-success HTTP status from the backend.
    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("no bot account available")]
    NoBotAccount,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
