//! Service discovery against a coordination service.
//!
//! The coordination service is a hierarchical key store with persistent and
//! ephemeral nodes. Providers publish `/{package}/{service}/{method}` nodes
//! holding `"ip:port"`; channels read them back to resolve endpoints. Ephemeral
//! nodes are tied to the registering session and vanish when it ends, which is
//! how stale addresses are purged without explicit deregistration.
//!
//! The concrete client SDK is an external collaborator, abstracted behind
//! [`DiscoveryClient`]. [`MemoryDiscovery`] is an in-process implementation
//! with real session semantics, used by tests and single-process demos.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::RpcError;

/// Node lifetime mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    /// Outlives any one process; represents a service's existence.
    Persistent,
    /// Tied to the creating session; represents one live endpoint.
    Ephemeral,
}

/// Callback invoked with the node path when the coordination layer reports
/// the node was removed.
pub type DeletedCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Abstract coordination-service client.
///
/// One handle per process, with a three-phase lifecycle: construct →
/// [`start`](DiscoveryClient::start) (blocks until the session is
/// established) → implicit teardown on drop. Implementations must be safe to
/// use from multiple threads.
pub trait DiscoveryClient: Send + Sync {
    /// Establish a session, blocking until connected or timed out.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::Connect` if the session cannot be established.
    fn start(&self, timeout: Duration) -> Result<(), RpcError>;

    /// Create a node at `path` holding `data`.
    ///
    /// Idempotent if the node already exists (the existing node and its data
    /// are left untouched). Ephemeral nodes require a live session.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::NotConnected` if no session has been established.
    fn create_node(
        &self,
        path: &str,
        data: &str,
        mode: CreateMode,
        on_deleted: Option<DeletedCallback>,
    ) -> Result<(), RpcError>;

    /// Delete the node at `path`. No-op if absent.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::NotConnected` if no session has been established.
    fn delete_node(&self, path: &str) -> Result<(), RpcError>;

    /// Read the data stored at `path`.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::NotFound` if the node does not exist.
    fn get_node_data(&self, path: &str) -> Result<String, RpcError>;
}

struct NodeRecord {
    data: String,
    /// Session that created an ephemeral node; `None` for persistent nodes.
    owner: Option<u64>,
    on_deleted: Option<DeletedCallback>,
}

#[derive(Default)]
struct Store {
    nodes: BTreeMap<String, NodeRecord>,
    next_session: u64,
}

/// In-process coordination service shared by every session handle cloned
/// from it.
#[derive(Clone, Default)]
pub struct MemoryDiscovery {
    store: Arc<Mutex<Store>>,
}

impl MemoryDiscovery {
    /// Create an empty in-memory coordination service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a client handle backed by this store.
    ///
    /// Each handle gets its own session when started, so one store can serve
    /// several logical processes in a test.
    pub fn session(&self) -> MemorySession {
        MemorySession {
            store: self.store.clone(),
            session: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// End a session: every ephemeral node it owns disappears and its
    /// deletion callbacks fire.
    pub fn expire_session(&self, session_id: u64) {
        let removed: Vec<(String, Option<DeletedCallback>)> = {
            let mut store = self.lock();
            let doomed: Vec<String> = store
                .nodes
                .iter()
                .filter(|(_, record)| record.owner == Some(session_id))
                .map(|(path, _)| path.clone())
                .collect();
            doomed
                .into_iter()
                .filter_map(|path| {
                    store
                        .nodes
                        .remove(&path)
                        .map(|record| (path, record.on_deleted))
                })
                .collect()
        };
        // Callbacks run outside the lock: they may re-enter discovery.
        for (path, callback) in removed {
            info!(path = %path, "ephemeral node expired with session");
            if let Some(callback) = callback {
                callback(&path);
            }
        }
    }

    /// Remove a node as if a third party deleted it, firing its deletion
    /// callback.
    pub fn remove_external(&self, path: &str) {
        let record = self.lock().nodes.remove(path);
        if let Some(record) = record {
            if let Some(callback) = record.on_deleted {
                callback(path);
            }
        }
    }

    /// Number of nodes currently in the store.
    pub fn node_count(&self) -> usize {
        self.lock().nodes.len()
    }
}

/// One client handle against a [`MemoryDiscovery`] store.
pub struct MemorySession {
    store: Arc<Mutex<Store>>,
    session: Mutex<Option<u64>>,
}

impl MemorySession {
    /// The session id assigned by `start`, if started.
    pub fn session_id(&self) -> Option<u64> {
        *self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn current_session(&self) -> Result<u64, RpcError> {
        self.session_id().ok_or(RpcError::NotConnected)
    }

    fn lock_store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DiscoveryClient for MemorySession {
    fn start(&self, _timeout: Duration) -> Result<(), RpcError> {
        let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());
        if session.is_none() {
            let mut store = self.lock_store();
            store.next_session += 1;
            *session = Some(store.next_session);
            debug!(session = store.next_session, "discovery session established");
        }
        Ok(())
    }

    fn create_node(
        &self,
        path: &str,
        data: &str,
        mode: CreateMode,
        on_deleted: Option<DeletedCallback>,
    ) -> Result<(), RpcError> {
        let session = self.current_session()?;
        let mut store = self.lock_store();
        if store.nodes.contains_key(path) {
            debug!(path = %path, "node already exists");
            return Ok(());
        }
        let owner = match mode {
            CreateMode::Persistent => None,
            CreateMode::Ephemeral => Some(session),
        };
        store.nodes.insert(
            path.to_string(),
            NodeRecord {
                data: data.to_string(),
                owner,
                on_deleted,
            },
        );
        debug!(path = %path, ?mode, "node created");
        Ok(())
    }

    fn delete_node(&self, path: &str) -> Result<(), RpcError> {
        self.current_session()?;
        self.lock_store().nodes.remove(path);
        Ok(())
    }

    fn get_node_data(&self, path: &str) -> Result<String, RpcError> {
        let store = self.lock_store();
        store
            .nodes
            .get(path)
            .map(|record| record.data.clone())
            .ok_or_else(|| RpcError::NotFound {
                what: format!("discovery node {path}"),
            })
    }
}
