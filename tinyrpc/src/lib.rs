//! # tinyrpc
//!
//! A lightweight RPC framework over TCP with coordination-service discovery.
//!
//! This crate provides:
//! - **Wire codec**: varint-framed request/response messages
//! - **ServiceRegistry**: thread-safe dispatch of (service, method) to handlers
//! - **RpcProvider**: callee-side TCP server with discovery publication
//! - **RpcChannel**: caller-side blocking channel with lazy endpoint resolution
//! - **Discovery**: ephemeral/persistent node registration behind a trait seam
//!
//! # Example
//!
//! ```rust,ignore
//! let discovery = MemoryDiscovery::new();
//! let provider = RpcProvider::new("meha", Arc::new(discovery.session()))?;
//! provider.register_service(
//!     ServiceBuilder::new("EchoService")
//!         .method("Echo", |req: EchoRequest, done: RpcDone<EchoResponse>| {
//!             done.reply(EchoResponse { msg: req.msg });
//!         })
//!         .build(),
//! )?;
//! provider.run("127.0.0.1:8000").await?;
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

// =============================================================================
// Modules
// =============================================================================

/// Caller-side channel performing blocking round trips.
pub mod channel;

/// Process configuration from a key=value file.
pub mod config;

/// Per-call status and cancellation state.
pub mod controller;

/// Coordination-service discovery abstraction and in-memory implementation.
pub mod discovery;

/// Error types for RPC operations.
pub mod error;

/// The message schema capability.
pub mod message;

/// Callee-side server and connection handling.
pub mod provider;

/// Call dispatch registry and handler binding.
pub mod registry;

/// Varint-framed wire format.
pub mod wire;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use channel::{DEFAULT_READ_TIMEOUT, RpcChannel};
pub use config::{DEFAULT_DISCOVERY_ADDR, DEFAULT_SERVER_ADDR, RpcConfig};
pub use controller::RpcController;
pub use discovery::{CreateMode, DeletedCallback, DiscoveryClient, MemoryDiscovery, MemorySession};
pub use error::RpcError;
pub use message::RpcMessage;
pub use provider::RpcProvider;
pub use registry::{MethodHandler, RpcDone, ServiceBuilder, ServiceEntry, ServiceRegistry};
pub use wire::{
    Frame, FrameError, Header, MAX_HEADER_SIZE, MAX_PAYLOAD_SIZE, decode_frame, encode_frame,
    encode_response, try_decode_frame, try_decode_response,
};
