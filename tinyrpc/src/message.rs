//! The message schema capability.
//!
//! Typed request/response messages are ordinarily produced by an external
//! code-generation step; at this layer all that matters is that each message
//! type can be empty-constructed, serialized to bytes and populated back from
//! bytes. [`RpcMessage`] captures exactly that, with a blanket implementation
//! for any `Serialize + DeserializeOwned + Default` type.
//!
//! # Example
//!
//! ```rust
//! use serde::{Serialize, Deserialize};
//! use tinyrpc::RpcMessage;
//!
//! #[derive(Serialize, Deserialize, Default, Debug, PartialEq)]
//! struct LoginRequest {
//!     name: String,
//!     pwd: String,
//! }
//!
//! let req = LoginRequest { name: "zhangsan".into(), pwd: "123456".into() };
//! let bytes = req.to_bytes().unwrap();
//! let back = LoginRequest::from_bytes(&bytes).unwrap();
//! assert_eq!(req, back);
//! ```

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::RpcError;

/// A schema-described request or response message.
///
/// `Default` is the empty-message factory; `from_bytes` empty-constructs and
/// populates in one step. The wire encoding is JSON.
pub trait RpcMessage: Serialize + DeserializeOwned + Default + Send + 'static {
    /// Serialize this message to bytes.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::Encode` if serialization fails.
    fn to_bytes(&self) -> Result<Vec<u8>, RpcError> {
        serde_json::to_vec(self).map_err(|e| RpcError::Encode {
            message: e.to_string(),
        })
    }

    /// Construct a message populated from serialized bytes.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::Decode` if the bytes do not deserialize.
    fn from_bytes(buf: &[u8]) -> Result<Self, RpcError> {
        serde_json::from_slice(buf).map_err(|e| RpcError::Decode {
            message: e.to_string(),
        })
    }
}

impl<T> RpcMessage for T where T: Serialize + DeserializeOwned + Default + Send + 'static {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, Default, Debug, PartialEq)]
    struct EchoMessage {
        msg: String,
    }

    #[test]
    fn test_message_roundtrip() {
        let msg = EchoMessage {
            msg: "HelloWorld!".to_string(),
        };
        let bytes = msg.to_bytes().expect("encode");
        let decoded = EchoMessage::from_bytes(&bytes).expect("decode");
        assert_eq!(msg, decoded);
    }

    #[test]
    fn test_message_default_is_empty() {
        let msg = EchoMessage::default();
        assert!(msg.msg.is_empty());
    }

    #[test]
    fn test_message_decode_error() {
        let result = EchoMessage::from_bytes(b"not json");
        assert!(matches!(result, Err(RpcError::Decode { .. })));
    }

    #[test]
    fn test_message_decode_wrong_shape() {
        let result = EchoMessage::from_bytes(b"[1,2,3]");
        assert!(matches!(result, Err(RpcError::Decode { .. })));
    }
}
