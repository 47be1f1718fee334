//! Per-call state tracking.

/// Tracks the status of one in-flight call.
///
/// The channel never returns an error from a call; every failure is recorded
/// here and the caller checks [`failed`](RpcController::failed) after the call
/// returns. One instance per call; mutated only by the call's own code path.
///
/// There is no enforced transition guard: callers must not invoke
/// `set_failed` after the call has already completed.
#[derive(Default)]
pub struct RpcController {
    failed: bool,
    canceled: bool,
    error_text: String,
    cancel_callback: Option<Box<dyn FnOnce() + Send>>,
}

impl RpcController {
    /// Create a controller in the idle state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the controller to the idle state for reuse.
    pub fn reset(&mut self) {
        self.failed = false;
        self.canceled = false;
        self.error_text.clear();
    }

    /// Whether the call failed.
    pub fn failed(&self) -> bool {
        self.failed
    }

    /// Human-readable description of the failure, empty if none.
    pub fn error_text(&self) -> &str {
        &self.error_text
    }

    /// Mark the call failed, appending `reason` to the error text.
    pub fn set_failed(&mut self, reason: impl AsRef<str>) {
        self.failed = true;
        if !self.error_text.is_empty() {
            self.error_text.push_str("; ");
        }
        self.error_text.push_str(reason.as_ref());
    }

    /// Signal cancellation and fire the registered callback, if any.
    ///
    /// This is local state propagation only: it does not tear down an
    /// in-flight network operation.
    pub fn start_cancel(&mut self) {
        self.canceled = true;
        if let Some(callback) = self.cancel_callback.take() {
            callback();
        }
    }

    /// Whether cancellation has been signaled.
    pub fn is_canceled(&self) -> bool {
        self.canceled
    }

    /// Register a callback to run when cancellation is signaled.
    ///
    /// If cancellation has already been signaled, the callback runs
    /// immediately.
    pub fn notify_on_cancel(&mut self, callback: impl FnOnce() + Send + 'static) {
        if self.canceled {
            callback();
        } else {
            self.cancel_callback = Some(Box::new(callback));
        }
    }
}
