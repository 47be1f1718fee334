//! Call dispatch registry: service name → method name → handler.
//!
//! The registry is the only state shared across server tasks. Registration and
//! unregistration take the exclusive side of a reader/writer lock; lookups take
//! the shared side, so the dispatch hot path never serializes behind other
//! readers.
//!
//! Handlers are bound at registration time as type-erased capabilities: each
//! [`MethodHandler`] captures how to populate its request type from payload
//! bytes and how to serialize its response type, so dispatch needs no runtime
//! type introspection.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::oneshot;
use tracing::{error, warn};

use crate::error::RpcError;
use crate::message::RpcMessage;

/// Completion handle passed to a method handler.
///
/// The handler must call [`RpcDone::reply`] exactly once on every path;
/// `reply` consumes the handle, so double completion is unrepresentable.
/// Dropping the handle without replying is observed by the server as a closed
/// channel and logged — no response is sent for that call.
///
/// The handle is `Send`, so a handler may move it into a spawned task and
/// complete the call after performing nested RPCs of its own.
pub struct RpcDone<Resp: RpcMessage> {
    tx: oneshot::Sender<Vec<u8>>,
    _marker: PhantomData<fn(Resp)>,
}

impl<Resp: RpcMessage> RpcDone<Resp> {
    fn new(tx: oneshot::Sender<Vec<u8>>) -> Self {
        Self {
            tx,
            _marker: PhantomData,
        }
    }

    /// Complete the call with the given response.
    ///
    /// Serializes the response and hands it to the connection that dispatched
    /// the call. If serialization fails the failure is logged and no response
    /// is sent, matching the server's fire-and-forget error policy.
    pub fn reply(self, response: Resp) {
        match response.to_bytes() {
            Ok(bytes) => {
                // Receiver dropped means the connection is gone; nothing to do.
                let _ = self.tx.send(bytes);
            }
            Err(e) => error!("serialize response failed: {e}"),
        }
    }
}

type InvokeFn = dyn Fn(&[u8], oneshot::Sender<Vec<u8>>) -> Result<(), RpcError> + Send + Sync;

/// The bound capability executing one method.
///
/// Built once at registration time from a typed closure; dispatch hands it
/// raw payload bytes and a completion channel.
pub struct MethodHandler {
    invoke: Box<InvokeFn>,
}

impl MethodHandler {
    /// Bind a typed handler function into an erased method handler.
    ///
    /// The request is empty-constructed and populated from the payload before
    /// `f` runs; the response travels back through the [`RpcDone`] handle.
    pub fn new<Req, Resp, F>(f: F) -> Self
    where
        Req: RpcMessage,
        Resp: RpcMessage,
        F: Fn(Req, RpcDone<Resp>) + Send + Sync + 'static,
    {
        let invoke: Box<InvokeFn> = Box::new(
            move |payload: &[u8], tx: oneshot::Sender<Vec<u8>>| -> Result<(), RpcError> {
                let request = Req::from_bytes(payload)?;
                f(request, RpcDone::new(tx));
                Ok(())
            },
        );
        Self { invoke }
    }

    /// Invoke the handler with raw payload bytes.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::Decode` if the payload does not deserialize into
    /// the request type. The handler itself is not run in that case.
    pub fn invoke(
        &self,
        payload: &[u8],
        done: oneshot::Sender<Vec<u8>>,
    ) -> Result<(), RpcError> {
        (self.invoke)(payload, done)
    }
}

/// One registered service: a name and its method table.
pub struct ServiceEntry {
    name: String,
    methods: HashMap<String, Arc<MethodHandler>>,
}

impl ServiceEntry {
    /// The service name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of the registered methods, in arbitrary order.
    pub fn method_names(&self) -> Vec<String> {
        self.methods.keys().cloned().collect()
    }
}

/// Builder assembling a service's method table before registration.
///
/// # Example
///
/// ```rust,ignore
/// let service = ServiceBuilder::new("EchoService")
///     .method("Echo", |req: EchoRequest, done: RpcDone<EchoResponse>| {
///         done.reply(EchoResponse { msg: req.msg });
///     })
///     .build();
/// registry.register(service)?;
/// ```
pub struct ServiceBuilder {
    name: String,
    methods: HashMap<String, Arc<MethodHandler>>,
}

impl ServiceBuilder {
    /// Start building a service with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: HashMap::new(),
        }
    }

    /// Add a method handler.
    ///
    /// A method name is unique within its service; re-adding a name replaces
    /// the previous handler and logs a warning.
    pub fn method<Req, Resp, F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        Req: RpcMessage,
        Resp: RpcMessage,
        F: Fn(Req, RpcDone<Resp>) + Send + Sync + 'static,
    {
        let name = name.into();
        if self
            .methods
            .insert(name.clone(), Arc::new(MethodHandler::new(f)))
            .is_some()
        {
            warn!(service = %self.name, method = %name, "method handler replaced");
        }
        self
    }

    /// Finish building the service entry.
    pub fn build(self) -> ServiceEntry {
        ServiceEntry {
            name: self.name,
            methods: self.methods,
        }
    }
}

/// Thread-safe table of registered services.
///
/// Shared lookups, exclusive mutation: dispatch happens on every inbound call
/// while registration happens rarely, so readers are the hot path.
#[derive(Default)]
pub struct ServiceRegistry {
    services: RwLock<HashMap<String, ServiceEntry>>,
}

impl ServiceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ServiceEntry>> {
        self.services.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ServiceEntry>> {
        self.services.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a service.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::DuplicateService` if a live entry with the same
    /// name already exists. Unregister first to replace a service.
    pub fn register(&self, service: ServiceEntry) -> Result<(), RpcError> {
        let mut services = self.write();
        if services.contains_key(&service.name) {
            return Err(RpcError::DuplicateService {
                service: service.name,
            });
        }
        services.insert(service.name.clone(), service);
        Ok(())
    }

    /// Remove a service. No-op if the name is not registered.
    pub fn unregister(&self, service_name: &str) {
        if self.write().remove(service_name).is_some() {
            warn!(service = %service_name, "service unregistered");
        }
    }

    /// Look up the handler for `(service_name, method_name)`.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::NotFound` naming the missing service or method.
    pub fn lookup(
        &self,
        service_name: &str,
        method_name: &str,
    ) -> Result<Arc<MethodHandler>, RpcError> {
        let services = self.read();
        let entry = services.get(service_name).ok_or_else(|| RpcError::NotFound {
            what: format!("service {service_name}"),
        })?;
        entry
            .methods
            .get(method_name)
            .cloned()
            .ok_or_else(|| RpcError::NotFound {
                what: format!("method {service_name}.{method_name}"),
            })
    }

    /// Snapshot of every registered service and its method names.
    ///
    /// Used by the provider to publish (service, method) pairs into the
    /// coordination service at startup.
    pub fn snapshot(&self) -> Vec<(String, Vec<String>)> {
        self.read()
            .values()
            .map(|entry| (entry.name.clone(), entry.method_names()))
            .collect()
    }

    /// Number of registered services.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
