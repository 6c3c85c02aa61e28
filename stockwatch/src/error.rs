//! Application-wide error types.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Observation failed for {subject} at {store}: {message}")]
    Observation {
        subject: String,
        store: String,
        message: String,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error while {op} {}: {source}", path.display())]
    IoPath {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Failure talking to an external delivery endpoint (chat webhook or SMTP).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// A retryable status was still returned after the retry budget ran out.
    #[error("transient HTTP {status} after retries: {body}")]
    Transient { status: u16, body: String },

    /// A status outside the retryable set; never retried.
    #[error("HTTP {status}: {body}")]
    Permanent { status: u16, body: String },

    /// The remote message no longer exists.
    #[error("message {message_id} no longer exists")]
    MessageGone { message_id: String },

    /// No response was ever received.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The remote accepted the request but the reply was unusable.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl Error {
    pub fn io_path(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::IoPath {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn observation(
        subject: impl Into<String>,
        store: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Observation {
            subject: subject.into(),
            store: store.into(),
            message: message.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Whether this error means the remote message was deleted out-of-band.
    pub fn is_message_gone(&self) -> bool {
        matches!(self, Self::Delivery(DeliveryError::MessageGone { .. }))
    }
}

impl DeliveryError {
    /// Classify a non-success status against the retryable set.
    pub fn from_status(status: u16, body: impl Into<String>, retryable: bool) -> Self {
        let body = truncate_body(&body.into());
        if retryable {
            Self::Transient { status, body }
        } else {
            Self::Permanent { status, body }
        }
    }
}

/// Response bodies end up in log lines and the status message; keep them short.
fn truncate_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "no response body".to_string();
    }
    trimmed.chars().take(250).collect()
}
