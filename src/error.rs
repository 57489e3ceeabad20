//! Error types for the gateway.

use thiserror::Error;

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Errors surfaced by the handshake path, the data path and the recognition adapter.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// A control or data message could not be parsed.
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The device asked for a transport this gateway does not serve.
    #[error("Unsupported transport: {0}")]
    UnsupportedTransport(String),

    /// The addressing context does not carry a device address.
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    /// The transport collaborator refused to allocate a session.
    #[error("Failed to allocate transport session for {0}")]
    SessionAllocation(String),

    /// A data message arrived for a device with no registered handler.
    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    /// The recognition backend connection could not be opened.
    #[error("Recognition connect error: {0}")]
    Connect(String),

    /// The recognition backend rejected the session initialization.
    #[error("Recognition init error: {0}")]
    Initialize(String),

    /// Mid-stream failure on an established recognition connection.
    #[error("Recognition stream error: {0}")]
    Stream(String),

    /// Publishing to the control plane failed.
    #[error("Publish error: {0}")]
    Publish(String),
}

impl GatewayError {
    /// Create a new stream error.
    pub fn stream<S: Into<String>>(msg: S) -> Self {
        Self::Stream(msg.into())
    }

    /// Create a new publish error.
    pub fn publish<S: Into<String>>(msg: S) -> Self {
        Self::Publish(msg.into())
    }
}
