//! Error types for the AODV core crate.

use thiserror::Error;

/// AODV error type
#[derive(Error, Debug)]
pub enum AodvError {
    /// Buffer does not start with any known packet header
    #[error("unrecognized packet: {0:?}")]
    UnrecognizedPacket(String),

    /// A fixed-width field could not be parsed
    #[error("malformed {field} field: {reason}")]
    MalformedField {
        /// Field name as it appears on the wire
        field: &'static str,
        /// What was wrong with it
        reason: String,
    },

    /// Buffer is shorter than the fixed frame length for its kind
    #[error("truncated frame: expected {expected} bytes, got {actual}")]
    TruncatedFrame {
        /// Fixed frame length for the packet kind
        expected: usize,
        /// Length actually received
        actual: usize,
    },

    /// Node identifier outside the configured network
    #[error("node {id} outside network of {network_size} nodes")]
    NodeOutOfRange {
        /// Offending identifier
        id: u8,
        /// Configured network size
        network_size: u8,
    },

    /// Numeric value that does not fit the two-character wire field
    #[error("{field} value {value} is not representable on the wire (0-99)")]
    FieldOutOfRange {
        /// Field name
        field: &'static str,
        /// Offending value
        value: u32,
    },

    /// Payload longer than the fixed payload slot
    #[error("payload of {len} bytes exceeds the {max}-byte payload slot")]
    PayloadTooLong {
        /// Payload length
        len: usize,
        /// Maximum text length
        max: usize,
    },

    /// Payload contains a byte that cannot travel in the text frame
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Channel name or number that does not map to a protocol channel
    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Link layer refused or lost an outbound frame
    #[error("link error: {0}")]
    Link(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for AODV operations
pub type Result<T> = std::result::Result<T, AodvError>;
