//! Error types for the RPC layer.

use crate::wire::FrameError;

/// Errors that can occur across the RPC layer.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Malformed or truncated wire data.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Unknown service, unknown method, or missing discovery node.
    #[error("not found: {what}")]
    NotFound {
        /// Description of what was looked up.
        what: String,
    },

    /// Transport-level connect/send/receive failure.
    #[error("connect error: {message}")]
    Connect {
        /// Details about the transport failure.
        message: String,
    },

    /// Failed to deserialize a message payload.
    #[error("decode failed: {message}")]
    Decode {
        /// Details about the decode failure.
        message: String,
    },

    /// Failed to serialize a message.
    #[error("encode failed: {message}")]
    Encode {
        /// Details about the encode failure.
        message: String,
    },

    /// A live service with the same name is already registered.
    #[error("service already registered: {service}")]
    DuplicateService {
        /// The conflicting service name.
        service: String,
    },

    /// No discovery session has been established.
    #[error("discovery session not established")]
    NotConnected,
}

impl From<std::io::Error> for RpcError {
    fn from(err: std::io::Error) -> Self {
        RpcError::Connect {
            message: err.to_string(),
        }
    }
}
