//! Callee-side RPC server.
//!
//! The provider owns the dispatch registry, publishes its registered
//! (service, method) pairs into the coordination service, and serves framed
//! requests over TCP: one task per accepted connection, one request decoded,
//! dispatched and answered at a time per connection.
//!
//! Error policy at the dispatch boundary is fire-and-forget: malformed
//! frames, unknown targets and payload decode failures are logged and no
//! response is sent; the connection stays open. Callers bound the resulting
//! silence with their own read timeout.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::discovery::{CreateMode, DeletedCallback, DiscoveryClient};
use crate::error::RpcError;
use crate::registry::{ServiceEntry, ServiceRegistry};
use crate::wire::{self, Frame};

/// Session establishment timeout for the discovery client.
const SESSION_TIMEOUT: Duration = Duration::from_secs(30);

/// Read buffer size per connection.
const READ_CHUNK: usize = 4096;

/// RPC server publishing services under one package root.
pub struct RpcProvider {
    package: String,
    registry: Arc<ServiceRegistry>,
    discovery: Arc<dyn DiscoveryClient>,
}

impl RpcProvider {
    /// Create a provider for `package`.
    ///
    /// Establishes the discovery session and creates the persistent
    /// `/{package}` root node.
    ///
    /// # Errors
    ///
    /// Returns the discovery error if the session or root node cannot be
    /// created.
    pub fn new(
        package: impl Into<String>,
        discovery: Arc<dyn DiscoveryClient>,
    ) -> Result<Self, RpcError> {
        let package = package.into();
        discovery.start(SESSION_TIMEOUT)?;
        discovery.create_node(&format!("/{package}"), "", CreateMode::Persistent, None)?;
        info!(package = %package, "package root created");
        Ok(Self {
            package,
            registry: Arc::new(ServiceRegistry::new()),
            discovery,
        })
    }

    /// Register a service on this provider.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::DuplicateService` if the name is already taken.
    pub fn register_service(&self, service: ServiceEntry) -> Result<(), RpcError> {
        info!(service = %service.name(), "service registered");
        self.registry.register(service)
    }

    /// Unregister a service. Idempotent.
    ///
    /// The ephemeral discovery nodes are not deleted here: they disappear on
    /// their own when this process's session ends.
    pub fn unregister_service(&self, service_name: &str) {
        self.registry.unregister(service_name);
    }

    /// The provider's dispatch registry.
    pub fn registry(&self) -> Arc<ServiceRegistry> {
        self.registry.clone()
    }

    /// Publish every registered (service, method) pair.
    ///
    /// Persistent node per service, ephemeral node per method holding
    /// `"ip:port"`. Each ephemeral node carries a deletion callback that
    /// unregisters the corresponding service locally if the coordination
    /// layer reports the node was externally removed.
    fn publish(&self, advertised: &str) -> Result<(), RpcError> {
        for (service, methods) in self.registry.snapshot() {
            let service_path = format!("/{}/{}", self.package, service);
            self.discovery
                .create_node(&service_path, "", CreateMode::Persistent, None)?;
            for method in methods {
                let method_path = format!("{service_path}/{method}");
                let registry = self.registry.clone();
                let on_deleted: DeletedCallback = Box::new(move |path: &str| {
                    // Path layout is /{package}/{service}/{method}
                    if let Some(service) = path.split('/').nth(2) {
                        warn!(path = %path, "discovery node removed, unregistering service");
                        registry.unregister(service);
                    }
                });
                self.discovery.create_node(
                    &method_path,
                    advertised,
                    CreateMode::Ephemeral,
                    Some(on_deleted),
                )?;
                info!(path = %method_path, endpoint = %advertised, "method published");
            }
        }
        Ok(())
    }

    /// Bind `addr` and serve until the process exits.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::Connect` if the bind or a subsequent accept fails,
    /// or a discovery error if publication fails.
    pub async fn run(&self, addr: &str) -> Result<(), RpcError> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already-bound listener.
    ///
    /// Publishes the registered services under the listener's local address
    /// first, then accepts connections until an accept error occurs.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::Connect` on accept failure, or a discovery error
    /// if publication fails.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), RpcError> {
        let local = listener.local_addr()?;
        self.publish(&local.to_string())?;
        info!(addr = %local, "provider serving");

        loop {
            let (stream, peer) = listener.accept().await?;
            debug!(peer = %peer, "connection accepted");
            let registry = self.registry.clone();
            tokio::spawn(serve_connection(registry, stream, peer));
        }
    }
}

/// Per-connection loop: accumulate reads, decode complete frames, dispatch,
/// answer in receipt order.
async fn serve_connection(registry: Arc<ServiceRegistry>, mut stream: TcpStream, peer: SocketAddr) {
    let mut buf: Vec<u8> = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        loop {
            match wire::try_decode_frame(&mut buf) {
                Ok(Some(frame)) => {
                    if let Some(response) = dispatch(&registry, frame).await {
                        match wire::encode_response(&response) {
                            Ok(bytes) => {
                                if let Err(e) = stream.write_all(&bytes).await {
                                    warn!(peer = %peer, "response write failed: {e}");
                                    return;
                                }
                            }
                            Err(e) => error!(peer = %peer, "response framing failed: {e}"),
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    // Remaining buffered bytes are unusable once framing is
                    // lost; drop them and keep the connection open.
                    warn!(peer = %peer, "malformed frame: {e}");
                    buf.clear();
                    break;
                }
            }
        }

        match stream.read(&mut chunk).await {
            Ok(0) => {
                debug!(peer = %peer, "connection closed by peer");
                return;
            }
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) => {
                warn!(peer = %peer, "read failed: {e}");
                return;
            }
        }
    }
}

/// Resolve and invoke the handler for one frame.
///
/// Returns the serialized response, or `None` when the fire-and-forget error
/// policy applies (unknown target, bad payload, handler never completed).
async fn dispatch(registry: &ServiceRegistry, frame: Frame) -> Option<Vec<u8>> {
    let service = frame.header.service_name.as_str();
    let method = frame.header.method_name.as_str();

    let handler = match registry.lookup(service, method) {
        Ok(handler) => handler,
        Err(e) => {
            warn!("dispatch failed: {e}");
            return None;
        }
    };

    let (done_tx, done_rx) = oneshot::channel();
    if let Err(e) = handler.invoke(&frame.payload, done_tx) {
        error!("{service}.{method}: {e}");
        return None;
    }

    // Completion is deferred: the handler may hold the done handle across
    // nested calls of its own before replying.
    match done_rx.await {
        Ok(bytes) => Some(bytes),
        Err(_) => {
            error!("{service}.{method}: handler completed without reply");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::MemoryDiscovery;
    use crate::registry::{RpcDone, ServiceBuilder};
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, Default)]
    struct Empty {}

    fn noop_service(name: &str) -> ServiceEntry {
        ServiceBuilder::new(name)
            .method("M", |_req: Empty, done: RpcDone<Empty>| {
                done.reply(Empty {});
            })
            .build()
    }

    #[test]
    fn test_new_creates_package_root() {
        let discovery = MemoryDiscovery::new();
        let session = Arc::new(discovery.session());
        let _provider = RpcProvider::new("meha", session.clone()).expect("provider");

        assert!(session.get_node_data("/meha").is_ok());
    }

    #[test]
    fn test_publish_creates_path_hierarchy() {
        let discovery = MemoryDiscovery::new();
        let session = Arc::new(discovery.session());
        let provider = RpcProvider::new("meha", session.clone()).expect("provider");

        provider.register_service(noop_service("UserService")).expect("register");
        provider.publish("127.0.0.1:8000").expect("publish");

        assert!(session.get_node_data("/meha/UserService").is_ok());
        assert_eq!(
            session.get_node_data("/meha/UserService/M").expect("node"),
            "127.0.0.1:8000"
        );
    }

    #[test]
    fn test_external_removal_unregisters_service() {
        let discovery = MemoryDiscovery::new();
        let session = Arc::new(discovery.session());
        let provider = RpcProvider::new("meha", session).expect("provider");

        provider.register_service(noop_service("UserService")).expect("register");
        provider.publish("127.0.0.1:8000").expect("publish");
        assert!(provider.registry().lookup("UserService", "M").is_ok());

        discovery.remove_external("/meha/UserService/M");

        let result = provider.registry().lookup("UserService", "M");
        assert!(matches!(result, Err(RpcError::NotFound { .. })));
    }

    #[test]
    fn test_duplicate_service_rejected() {
        let discovery = MemoryDiscovery::new();
        let provider =
            RpcProvider::new("meha", Arc::new(discovery.session())).expect("provider");

        provider.register_service(noop_service("S")).expect("first");
        let result = provider.register_service(noop_service("S"));
        assert!(matches!(result, Err(RpcError::DuplicateService { .. })));
    }
}
