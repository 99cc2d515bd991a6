//! Session: everything one running application shares

use crate::bridge::{Launcher, PluginManager, ProcessLauncher};
use crate::files::FileHandlers;
use crate::frame::FrameCounter;
use crate::{Invoker, PluginDef, Procedure, ProcedureRegistry, SessionConfig};
use procdb_core::{Context, ObjectStore, PdbError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

pub(crate) struct SessionInner {
    config: SessionConfig,
    registry: ProcedureRegistry,
    objects: ObjectStore,
    context: Context,
    plugins: PluginManager,
    file_handlers: FileHandlers,
    frames: FrameCounter,
    temp_counter: AtomicU64,
}

/// Shared handle to the procedure database and its collaborators
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Session whose plug-ins run as child processes
    pub fn new(config: SessionConfig) -> Self {
        Self::with_launcher(config, Arc::new(ProcessLauncher))
    }

    pub fn with_launcher(config: SessionConfig, launcher: Arc<dyn Launcher>) -> Self {
        let plugins = PluginManager::new(launcher, &config);
        Self {
            inner: Arc::new(SessionInner {
                config,
                registry: ProcedureRegistry::new(),
                objects: ObjectStore::new(),
                context: Context::root("Default"),
                plugins,
                file_handlers: FileHandlers::new(),
                frames: FrameCounter::default(),
                temp_counter: AtomicU64::new(0),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<SessionInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<SessionInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &ProcedureRegistry {
        &self.inner.registry
    }

    pub fn objects(&self) -> &ObjectStore {
        &self.inner.objects
    }

    /// Root context every caller without a frame works in
    pub fn context(&self) -> &Context {
        &self.inner.context
    }

    pub fn plugins(&self) -> &PluginManager {
        &self.inner.plugins
    }

    pub fn file_handlers(&self) -> &FileHandlers {
        &self.inner.file_handlers
    }

    pub(crate) fn frame_counter(&self) -> &FrameCounter {
        &self.inner.frames
    }

    /// Plug-in frames currently alive
    pub fn live_frames(&self) -> usize {
        self.inner.frames.get()
    }

    /// Register an internal procedure
    pub fn register<I: Invoker + 'static>(&self, invoker: I) -> Result<(), PdbError> {
        self.registry().register(Procedure::internal(invoker)).map(|_| ())
    }

    /// Query a plug-in and register its procedures
    pub async fn add_plugin(&self, def: PluginDef) -> Result<Vec<String>, PdbError> {
        self.plugins().add(self, def).await
    }

    /// Add every configured plug-in; failures are logged and skipped
    pub async fn discover(&self) -> Vec<String> {
        let mut added = Vec::new();
        for def in self.config().plugin_defs() {
            let name = def.name.clone();
            match self.add_plugin(def).await {
                Ok(_) => added.push(name),
                Err(e) => tracing::error!(plug_in = %name, error = %e, "plug-in rejected"),
            }
        }
        added
    }

    /// Stop a running plug-in; `false` if it was not running
    pub async fn terminate(&self, plug_in: &str) -> bool {
        self.plugins().terminate(self, plug_in).await
    }

    /// Stop every plug-in process
    pub async fn shutdown(&self) {
        tracing::info!("shutting down plug-ins");
        self.plugins().shutdown(self).await;
    }

    /// Unused file name in the system temp directory
    pub fn temp_name(&self, extension: &str) -> String {
        let n = self.inner.temp_counter.fetch_add(1, Ordering::SeqCst);
        let file = if extension.is_empty() {
            format!("procdb-temp-{}-{}", std::process::id(), n)
        } else {
            format!("procdb-temp-{}-{}.{}", std::process::id(), n, extension.trim_start_matches('.'))
        };
        std::env::temp_dir().join(file).to_string_lossy().into_owned()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}
