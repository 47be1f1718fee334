//! Caller-side channel: typed invocation → blocking network round trip.
//!
//! A channel is a state machine `unresolved → resolved+connected → closed`.
//! The first call resolves the target endpoint through the coordination
//! service, connects, and caches the connection; later calls reuse it. One
//! channel owns exactly one live connection.
//!
//! Calls never return an error: every failure (resolution, connect, send,
//! receive, decode) is recorded on the call's [`RpcController`] and the
//! caller-supplied response is left at its default. Callers check
//! [`RpcController::failed`] after every call.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::controller::RpcController;
use crate::discovery::DiscoveryClient;
use crate::error::RpcError;
use crate::message::RpcMessage;
use crate::wire::{self, Header};

/// Session establishment timeout for the discovery client.
const SESSION_TIMEOUT: Duration = Duration::from_secs(30);

/// TCP connect timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on the blocking response read.
///
/// The server's error policy is to stay silent on failed dispatch, so the
/// caller must bound its own wait.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

struct Connection {
    stream: TcpStream,
    endpoint: SocketAddr,
}

/// Blocking RPC client bound to one package root.
pub struct RpcChannel {
    package: String,
    discovery: Arc<dyn DiscoveryClient>,
    read_timeout: Duration,
    conn: Option<Connection>,
}

impl RpcChannel {
    /// Create an unresolved channel for `package`.
    pub fn new(package: impl Into<String>, discovery: Arc<dyn DiscoveryClient>) -> Self {
        Self {
            package: package.into(),
            discovery,
            read_timeout: DEFAULT_READ_TIMEOUT,
            conn: None,
        }
    }

    /// Override the per-call response read timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Whether the channel currently holds a live connection.
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Drop the cached connection; the next call resolves again.
    pub fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            debug!(endpoint = %conn.endpoint, "channel closed");
        }
    }

    /// Invoke `service_name.method_name` with `request`, populating
    /// `response` in place.
    ///
    /// Blocks the calling thread for the full round trip. On any failure the
    /// controller is marked failed with a descriptive message and `response`
    /// is left untouched.
    pub fn call<Req, Resp>(
        &mut self,
        service_name: &str,
        method_name: &str,
        request: &Req,
        response: &mut Resp,
        controller: &mut RpcController,
    ) where
        Req: RpcMessage,
        Resp: RpcMessage,
    {
        if self.conn.is_none() {
            match self.resolve_and_connect(service_name, method_name) {
                Ok(conn) => {
                    info!(endpoint = %conn.endpoint, "channel connected");
                    self.conn = Some(conn);
                }
                Err(e) => {
                    let reason = format!("resolve {service_name}/{method_name}: {e}");
                    error!("{reason}");
                    controller.set_failed(reason);
                    return;
                }
            }
        }

        let args = match request.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                controller.set_failed(format!("serialize request: {e}"));
                return;
            }
        };
        let header = Header::new(service_name, method_name, args.len() as u32);
        let frame = match wire::encode_frame(&header, &args) {
            Ok(frame) => frame,
            Err(e) => {
                controller.set_failed(format!("encode frame: {e}"));
                return;
            }
        };

        let result = match self.conn.as_mut() {
            Some(conn) => round_trip(conn, &frame),
            None => Err(RpcError::NotConnected),
        };
        let bytes = match result {
            Ok(bytes) => bytes,
            Err(e) => {
                // Socket state is unknown after a transport failure
                self.conn = None;
                let reason = format!("{service_name}.{method_name}: {e}");
                error!("{reason}");
                controller.set_failed(reason);
                return;
            }
        };

        match Resp::from_bytes(&bytes) {
            Ok(populated) => *response = populated,
            Err(e) => {
                self.conn = None;
                controller.set_failed(format!("deserialize response: {e}"));
            }
        }
    }

    /// Query the coordination service for the endpoint and connect to it.
    fn resolve_and_connect(
        &self,
        service_name: &str,
        method_name: &str,
    ) -> Result<Connection, RpcError> {
        self.discovery.start(SESSION_TIMEOUT)?;

        let method_path = format!("/{}/{}/{}", self.package, service_name, method_name);
        let host_data = self.discovery.get_node_data(&method_path)?;
        let endpoint: SocketAddr = host_data.parse().map_err(|_| RpcError::Connect {
            message: format!("{method_path} holds invalid endpoint {host_data:?}"),
        })?;
        debug!(path = %method_path, endpoint = %endpoint, "endpoint resolved");

        let stream = TcpStream::connect_timeout(&endpoint, CONNECT_TIMEOUT)?;
        stream.set_read_timeout(Some(self.read_timeout))?;
        stream.set_nodelay(true)?;
        Ok(Connection { stream, endpoint })
    }
}

/// Write one request frame and block until one complete response frame
/// arrives.
fn round_trip(conn: &mut Connection, frame: &[u8]) -> Result<Vec<u8>, RpcError> {
    conn.stream.write_all(frame)?;

    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        if let Some(bytes) = wire::try_decode_response(&mut buf)? {
            return Ok(bytes);
        }
        match conn.stream.read(&mut chunk)? {
            0 => {
                return Err(RpcError::Connect {
                    message: "connection closed before response".to_string(),
                });
            }
            n => buf.extend_from_slice(&chunk[..n]),
        }
    }
}
