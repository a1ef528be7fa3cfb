//! Error types for the duplex transport

use std::io;
use thiserror::Error;

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// The conversation ended: the socket is closed and no buffered messages remain
    #[error("End of stream")]
    EndOfStream,

    /// The wire adapter could not deliver a message
    #[error("Transmit failure: {0}")]
    TransmitFailure(String),

    /// Operation attempted on a socket that is closing or closed
    #[error("Socket is closed")]
    ClosedSocket,

    /// The duplex queue no longer accepts or waits for messages
    #[error("Queue is closed")]
    QueueClosed,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid state error
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Address parse error
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Frame exceeds the maximum frame size
    #[error("Message too large: {0} bytes (max: {1} bytes)")]
    MessageTooLarge(usize, usize),

    /// Other errors
    #[error("Transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Create a transmit failure
    pub fn transmit<S: Into<String>>(msg: S) -> Self {
        Self::TransmitFailure(msg.into())
    }

    /// Create a connection error
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a serialization error
    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create an invalid state error
    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create an invalid address error
    pub fn invalid_address<S: Into<String>>(msg: S) -> Self {
        Self::InvalidAddress(msg.into())
    }

    /// Create an other error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Self::Other(msg.into())
    }

    /// True for the conditions that end a conversation normally
    #[must_use]
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Self::EndOfStream | Self::QueueClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = TransportError::transmit("broken pipe");
        assert_eq!(err.to_string(), "Transmit failure: broken pipe");

        let err = TransportError::timeout("write");
        assert_eq!(err.to_string(), "Operation timed out: write");

        let err = TransportError::MessageTooLarge(1000, 512);
        assert_eq!(
            err.to_string(),
            "Message too large: 1000 bytes (max: 512 bytes)"
        );
    }

    #[test]
    fn test_end_of_stream_classification() {
        assert!(TransportError::EndOfStream.is_end_of_stream());
        assert!(TransportError::QueueClosed.is_end_of_stream());
        assert!(!TransportError::ClosedSocket.is_end_of_stream());
        assert!(!TransportError::transmit("x").is_end_of_stream());
    }
}
