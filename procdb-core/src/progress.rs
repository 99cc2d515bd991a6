//! Progress reporting and user cancellation

use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Progress UI as seen by procedures
pub trait Progress: Send + Sync {
    fn begin(&self, message: &str);
    fn update(&self, fraction: f64);
    fn end(&self);
    fn is_cancelled(&self) -> bool;

    /// Receiver that flips to `true` when the user cancels
    fn cancel_signal(&self) -> watch::Receiver<bool>;
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ProgressState {
    pub active: bool,
    pub message: String,
    pub fraction: f64,
}

#[derive(Debug)]
struct ProgressInner {
    state: Mutex<ProgressState>,
    cancel: watch::Sender<bool>,
}

/// Headless progress handle; cancellation is requested with `cancel`
#[derive(Debug, Clone)]
pub struct ProgressHandle {
    inner: Arc<ProgressInner>,
}

impl ProgressHandle {
    pub fn new() -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            inner: Arc::new(ProgressInner {
                state: Mutex::new(ProgressState::default()),
                cancel,
            }),
        }
    }

    /// Request cancellation of whatever is reporting through this handle
    pub fn cancel(&self) {
        self.inner.cancel.send_replace(true);
    }

    pub fn state(&self) -> ProgressState {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Default for ProgressHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl Progress for ProgressHandle {
    fn begin(&self, message: &str) {
        let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
        state.active = true;
        state.message = message.to_string();
        state.fraction = 0.0;
    }

    fn update(&self, fraction: f64) {
        let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
        state.fraction = fraction.clamp(0.0, 1.0);
    }

    fn end(&self) {
        let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
        state.active = false;
    }

    fn is_cancelled(&self) -> bool {
        *self.inner.cancel.borrow()
    }

    fn cancel_signal(&self) -> watch::Receiver<bool> {
        self.inner.cancel.subscribe()
    }
}

/// Resolves once `signal` reports cancellation; pends forever if the
/// sender goes away without cancelling.
pub async fn cancelled(mut signal: watch::Receiver<bool>) {
    loop {
        if *signal.borrow_and_update() {
            return;
        }
        if signal.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
