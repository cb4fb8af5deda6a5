//! Error types for stream client and consumer operations

use thiserror::Error;

/// Errors raised while talking to the stream store or printing its entries
#[derive(Debug, Error)]
pub enum StreamError {
    /// The store could not be reached or the address is invalid
    #[error("Connection error: {0}")]
    Connection(String),

    /// The store rejected a command
    #[error("Store error: {0}")]
    Store(#[from] redis::RedisError),

    /// The request was rejected before it reached the store
    #[error("Rejected: {0}")]
    Rejected(String),

    /// A reply did not have the shape of a stream read
    #[error("Invalid reply: {0}")]
    InvalidReply(String),

    /// Writing consumed messages to the output failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A consumed message could not be encoded for output
    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type StreamResult<T> = Result<T, StreamError>;
