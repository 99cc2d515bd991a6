//! Per-invocation bookkeeping for plug-in calls
//!
//! A `ProcFrame` exists for every call into a plug-in that has not yet
//! finished. Frames are shared as `Arc<ProcFrame>` between the waiting
//! dispatcher, the plug-in process (to parent callbacks) and any nested
//! call made from it. Disposal happens in `Drop` of the last handle, so
//! every exit path runs it exactly once.

use crate::Procedure;
use procdb_core::{Context, Progress, ProgressHandle};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

type Cleanup = Box<dyn FnOnce() + Send>;

/// Number of frames alive in a session
#[derive(Debug, Clone, Default)]
pub struct FrameCounter(Arc<AtomicUsize>);

impl FrameCounter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct ProcFrame {
    procedure: Arc<Procedure>,
    plug_in: String,
    parent: Option<Arc<ProcFrame>>,
    context: Context,
    pushed: Mutex<Vec<Context>>,
    supplied_progress: Option<Arc<dyn Progress>>,
    own_progress: Mutex<Option<Arc<ProgressHandle>>>,
    cleanups: Mutex<Vec<Cleanup>>,
    live: FrameCounter,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl ProcFrame {
    pub(crate) fn new(
        live: &FrameCounter,
        procedure: Arc<Procedure>,
        plug_in: &str,
        parent: Option<Arc<ProcFrame>>,
        context: Context,
        progress: Option<Arc<dyn Progress>>,
    ) -> Arc<Self> {
        live.0.fetch_add(1, Ordering::SeqCst);
        Arc::new(Self {
            procedure,
            plug_in: plug_in.to_string(),
            parent,
            context,
            pushed: Mutex::new(Vec::new()),
            supplied_progress: progress,
            own_progress: Mutex::new(None),
            cleanups: Mutex::new(Vec::new()),
            live: live.clone(),
        })
    }

    pub fn procedure(&self) -> &Arc<Procedure> {
        &self.procedure
    }

    pub fn plug_in(&self) -> &str {
        &self.plug_in
    }

    /// Frame of the plug-in call this one was made from
    pub fn parent(&self) -> Option<&Arc<ProcFrame>> {
        self.parent.as_ref()
    }

    /// Whether this frame or any ancestor is a call into `plug_in`
    pub fn in_chain(&self, plug_in: &str) -> bool {
        let mut frame = Some(self);
        while let Some(f) = frame {
            if f.plug_in == plug_in {
                return true;
            }
            frame = f.parent.as_deref();
        }
        false
    }

    /// Context the plug-in currently works in
    pub fn context(&self) -> Context {
        lock(&self.pushed).last().cloned().unwrap_or_else(|| self.context.clone())
    }

    /// Push a child of the current context and make it current
    pub fn push_context(&self) -> Context {
        let mut pushed = lock(&self.pushed);
        let top = pushed.last().cloned().unwrap_or_else(|| self.context.clone());
        let child = top.child(format!("{} context {}", self.plug_in, pushed.len() + 1));
        pushed.push(child.clone());
        child
    }

    /// Pop the last pushed context; `false` if nothing was pushed
    pub fn pop_context(&self) -> bool {
        lock(&self.pushed).pop().is_some()
    }

    pub fn context_depth(&self) -> usize {
        lock(&self.pushed).len()
    }

    /// Progress for this call, created on first use if the caller gave none
    pub fn progress(&self) -> Arc<dyn Progress> {
        if let Some(p) = &self.supplied_progress {
            return p.clone();
        }
        let mut own = lock(&self.own_progress);
        let handle = own.get_or_insert_with(|| {
            let handle = Arc::new(ProgressHandle::new());
            handle.begin(self.procedure.name());
            handle
        });
        handle.clone()
    }

    /// Progress that exists already, without creating one
    pub(crate) fn current_progress(&self) -> Option<Arc<dyn Progress>> {
        if let Some(p) = &self.supplied_progress {
            return Some(p.clone());
        }
        lock(&self.own_progress).clone().map(|h| h as Arc<dyn Progress>)
    }

    /// Run `f` when the frame is disposed
    pub fn on_dispose(&self, f: impl FnOnce() + Send + 'static) {
        lock(&self.cleanups).push(Box::new(f));
    }
}

impl Drop for ProcFrame {
    fn drop(&mut self) {
        let leftover = lock(&self.pushed).len();
        if leftover > 0 {
            tracing::warn!(
                plug_in = %self.plug_in,
                procedure = %self.procedure.name(),
                contexts = leftover,
                "plug-in did not pop its contexts"
            );
            lock(&self.pushed).clear();
        }

        if let Some(progress) = lock(&self.own_progress).take() {
            progress.end();
        }

        let cleanups = std::mem::take(&mut *lock(&self.cleanups));
        for cleanup in cleanups {
            cleanup();
        }

        self.live.0.fetch_sub(1, Ordering::SeqCst);
    }
}
