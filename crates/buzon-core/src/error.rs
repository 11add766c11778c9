use thiserror::Error;

/// Top-level error type for Buzón.
#[derive(Debug, Error)]
pub enum BuzonError {
    /// Error from the datastore.
    #[error("store error: {0}")]
    Store(String),

    /// Error from a messaging channel or the Graph API.
    #[error("channel error: {0}")]
    Channel(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Token encryption/decryption error.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Malformed or unrecognized webhook payload.
    #[error("payload error: {0}")]
    Payload(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
