use std::path::PathBuf;

/// Core error type for the relay.
///
/// Adapter crates map their specific errors into this type so the engine can
/// decide consistently what is user-visible, what is counted as a delivery
/// failure and what is fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Validation(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("delivery to {target} failed: {reason}")]
    Delivery { target: i64, reason: String },

    #[error("delivery to {target} timed out")]
    Timeout { target: i64 },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid address book at {path}: {reason}")]
    AddressBook { path: PathBuf, reason: String },

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
