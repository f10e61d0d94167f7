//! Error types for keystep-netcode

use thiserror::Error;

/// Netcode error type
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to encode an outgoing packet
    #[error("Failed to encode packet: {0}")]
    Encode(String),

    /// Failed to decode an incoming packet
    #[error("Failed to decode packet: {0}")]
    Decode(String),
}

/// Result type for netcode operations
pub type Result<T> = std::result::Result<T, Error>;
