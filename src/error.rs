//! Error types for the capture stream receiver

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transport errors
///
/// Every variant except `AlreadyConnected` / `NotConnected` terminates the
/// current connection.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Transport subsystem not initialized")]
    SubsystemNotInitialized,

    #[error("Address resolution failed for {0}")]
    ResolveFailed(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Peer closed the connection")]
    PeerClosed,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Not connected")]
    NotConnected,
}

/// Framing and payload errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Declared payload length exceeds the configured limit. Fatal for the
    /// connection.
    #[error("Malformed frame header: payload length {length} exceeds limit {limit}")]
    MalformedFrameHeader { length: usize, limit: usize },

    #[error("Unknown frame type: {0}")]
    UnknownFrameType(u32),

    #[error("Payload too short for {kind}: expected {expected} bytes, got {actual}")]
    PayloadTooShort {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Precondition violated: {0}")]
    PreconditionViolation(&'static str),
}

/// Codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Decoder initialization failed: {0}")]
    DecoderInit(String),

    #[error("Submit failed: {0}")]
    SubmitFailed(String),

    #[error("Retrieve failed: {0}")]
    RetrieveFailed(String),

    #[error("Unsupported pixel format: {0}")]
    UnsupportedFormat(String),

    #[error("Conversion failed: {0}")]
    ConversionFailed(String),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
