//! Plug-in process bridge
//!
//! Each running plug-in has one writer task, fed through a channel, and one
//! reader task that decodes what the child writes:
//!
//! - `ProcReturn` completes the innermost pending call (a oneshot stack)
//! - `ProcRun` is a callback into the host, dispatched on its own task with
//!   the plug-in's current frame as parent; the task dies with the process
//! - `ProcInstall` / `ProcUninstall` manage temporary procedures
//!
//! EOF or an undecodable message ends the process: every pending call
//! resolves to `ExecutionError`, its temporary procedures are unregistered
//! and the next call starts a fresh process. A call abandoned while its
//! reply is still owed also ends the process, so a late reply can never
//! reach the next caller.

use crate::session::SessionInner;
use crate::{Caller, PluginDef, ProcFrame, Procedure, Session, SessionConfig};
use async_trait::async_trait;
use procdb_core::{cancelled, PdbError, ProcDef, ProcResult, ProcedureKind, Value};
use procdb_wire::codec::{read_message, write_message, Message, WireError, PROTOCOL_VERSION};
use procdb_wire::plugin::{BoxReader, BoxWriter};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// Message of every call lost to a dead plug-in
pub const TERMINATED: &str = "plug-in terminated unexpectedly";

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Pipes to a freshly started plug-in
pub struct PluginPipes {
    pub reader: BoxReader,
    pub writer: BoxWriter,
    /// OS process behind the pipes, if there is one
    pub child: Option<Child>,
}

/// Starts plug-in programs
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self, def: &PluginDef) -> std::io::Result<PluginPipes>;
}

/// Runs plug-ins as child processes talking over stdin/stdout
pub struct ProcessLauncher;

#[async_trait]
impl Launcher for ProcessLauncher {
    async fn launch(&self, def: &PluginDef) -> std::io::Result<PluginPipes> {
        let mut child = Command::new(&def.program)
            .args(&def.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let missing = || std::io::Error::new(std::io::ErrorKind::BrokenPipe, "plug-in pipes not captured");
        let stdin = child.stdin.take().ok_or_else(missing)?;
        let stdout = child.stdout.take().ok_or_else(missing)?;

        Ok(PluginPipes {
            reader: Box::new(stdout),
            writer: Box::new(stdin),
            child: Some(child),
        })
    }
}

/// One running plug-in
pub struct PluginProcess {
    name: String,
    outgoing: mpsc::UnboundedSender<Message>,
    /// Continuations of calls in flight keyed by call id, innermost last
    pending: Mutex<Vec<(u64, oneshot::Sender<ProcResult>)>>,
    next_call: AtomicU64,
    /// Frames of calls in flight, innermost last
    frames: Mutex<Vec<Arc<ProcFrame>>>,
    /// Serializes independent top-level calls
    run_lock: tokio::sync::Mutex<()>,
    alive: AtomicBool,
    child: Mutex<Option<Child>>,
    temporaries: Mutex<Vec<String>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    exited: watch::Sender<bool>,
}

impl PluginProcess {
    fn new(name: &str, outgoing: mpsc::UnboundedSender<Message>, child: Option<Child>) -> Self {
        let (exited, _) = watch::channel(false);
        Self {
            name: name.to_string(),
            outgoing,
            pending: Mutex::new(Vec::new()),
            next_call: AtomicU64::new(1),
            frames: Mutex::new(Vec::new()),
            run_lock: tokio::sync::Mutex::new(()),
            alive: AtomicBool::new(true),
            child: Mutex::new(child),
            temporaries: Mutex::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
            exited,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Temporary procedures this process installed
    pub fn temporaries(&self) -> Vec<String> {
        lock(&self.temporaries).clone()
    }

    fn current_frame(&self) -> Option<Arc<ProcFrame>> {
        lock(&self.frames).last().cloned()
    }

    fn send(&self, message: Message) -> bool {
        self.outgoing.send(message).is_ok()
    }
}

/// Keeps a frame and a reply slot on the process for the length of a call.
///
/// Dropped with the reply still owed (the caller timed out or was aborted),
/// it stops the process.
struct ActiveCall<'a> {
    manager: &'a PluginManager,
    session: &'a Session,
    process: &'a Arc<PluginProcess>,
    frame: Arc<ProcFrame>,
    id: u64,
}

impl<'a> ActiveCall<'a> {
    fn enter(
        manager: &'a PluginManager,
        session: &'a Session,
        process: &'a Arc<PluginProcess>,
        frame: Arc<ProcFrame>,
    ) -> (Self, oneshot::Receiver<ProcResult>) {
        let id = process.next_call.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        lock(&process.frames).push(frame.clone());
        lock(&process.pending).push((id, tx));
        (Self { manager, session, process, frame, id }, rx)
    }
}

impl Drop for ActiveCall<'_> {
    fn drop(&mut self) {
        {
            let mut frames = lock(&self.process.frames);
            if let Some(pos) = frames.iter().rposition(|f| Arc::ptr_eq(f, &self.frame)) {
                frames.remove(pos);
            }
        }

        let owed = {
            let mut pending = lock(&self.process.pending);
            match pending.iter().position(|(id, _)| *id == self.id) {
                Some(pos) => {
                    pending.remove(pos);
                    true
                }
                None => false,
            }
        };
        if owed && self.process.is_alive() {
            tracing::warn!(plug_in = %self.process.name, call = self.id, "call abandoned before its reply, stopping plug-in");
            self.manager.exited(self.session, self.process);
        }
    }
}

/// Owns plug-in definitions and their running processes
pub struct PluginManager {
    launcher: Arc<dyn Launcher>,
    defs: Mutex<HashMap<String, PluginDef>>,
    processes: Mutex<HashMap<String, Arc<PluginProcess>>>,
    start_lock: tokio::sync::Mutex<()>,
    handshake_timeout: Duration,
    quit_timeout: Duration,
}

impl PluginManager {
    pub(crate) fn new(launcher: Arc<dyn Launcher>, config: &SessionConfig) -> Self {
        Self {
            launcher,
            defs: Mutex::new(HashMap::new()),
            processes: Mutex::new(HashMap::new()),
            start_lock: tokio::sync::Mutex::new(()),
            handshake_timeout: config.handshake_timeout(),
            quit_timeout: config.quit_timeout(),
        }
    }

    /// Known plug-ins, sorted by name
    pub fn definitions(&self) -> Vec<PluginDef> {
        let mut defs: Vec<PluginDef> = lock(&self.defs).values().cloned().collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn process(&self, name: &str) -> Option<Arc<PluginProcess>> {
        lock(&self.processes).get(name).cloned()
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.process(name).is_some_and(|p| p.is_alive())
    }

    /// Names of the running plug-ins, sorted
    pub fn running(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.processes).keys().cloned().collect();
        names.sort();
        names
    }

    /// Query a plug-in and register what it announces
    pub(crate) async fn add(&self, session: &Session, def: PluginDef) -> Result<Vec<String>, PdbError> {
        let (process, installed) = self.start(session, &def).await?;
        lock(&self.defs).insert(def.name.clone(), def.clone());

        let kind = if def.extension { ProcedureKind::Extension } else { ProcedureKind::Plugin };
        let mut names = Vec::new();
        for proc_def in installed {
            let proc_def = proc_def.with_kind(kind);
            let name = proc_def.name.clone();
            match session.registry().register(Procedure::plugin(proc_def, &def.name)) {
                Ok(_) => names.push(name),
                Err(e) => tracing::warn!(plug_in = %def.name, error = %e, "procedure not registered"),
            }
        }
        tracing::info!(plug_in = %def.name, procedures = names.len(), extension = def.extension, "plug-in registered");

        if def.extension {
            lock(&self.processes).insert(def.name.clone(), process);
        } else {
            self.stop(session, &process).await;
        }
        Ok(names)
    }

    /// The running process for `name`, starting it if needed
    async fn ensure_running(&self, session: &Session, name: &str) -> Result<Arc<PluginProcess>, PdbError> {
        if let Some(process) = self.process(name).filter(|p| p.is_alive()) {
            return Ok(process);
        }

        let _starting = self.start_lock.lock().await;
        if let Some(process) = self.process(name).filter(|p| p.is_alive()) {
            return Ok(process);
        }

        let def = lock(&self.defs).get(name).cloned()
            .ok_or_else(|| PdbError::plugin(format!("no plug-in named '{}'", name)))?;
        let (process, installed) = self.start(session, &def).await?;

        let kind = if def.extension { ProcedureKind::Extension } else { ProcedureKind::Plugin };
        for proc_def in installed {
            if !session.registry().contains(&proc_def.name) {
                if let Err(e) = session.registry().register(Procedure::plugin(proc_def.with_kind(kind), name)) {
                    tracing::warn!(plug_in = %name, error = %e, "procedure not registered");
                }
            }
        }

        lock(&self.processes).insert(name.to_string(), process.clone());
        Ok(process)
    }

    /// Launch, handshake, then hand the pipes to the I/O tasks
    async fn start(&self, session: &Session, def: &PluginDef) -> Result<(Arc<PluginProcess>, Vec<ProcDef>), PdbError> {
        tracing::info!(plug_in = %def.name, program = %def.program.display(), "starting plug-in");
        let mut pipes = self.launcher.launch(def).await
            .map_err(|e| PdbError::plugin(format!("cannot start plug-in '{}': {}", def.name, e)))?;

        let handshake = async {
            write_message(&mut pipes.writer, &Message::Config { protocol_version: PROTOCOL_VERSION }).await?;
            read_announcements(&mut pipes.reader).await
        };
        let installed = match tokio::time::timeout(self.handshake_timeout, handshake).await {
            Ok(Ok(installed)) => installed,
            Ok(Err(e)) => {
                kill_child(pipes.child.as_mut());
                return Err(PdbError::plugin(format!("plug-in '{}' failed the handshake: {}", def.name, e)));
            }
            Err(_) => {
                kill_child(pipes.child.as_mut());
                return Err(PdbError::plugin(format!(
                    "plug-in '{}' did not answer within {} ms", def.name, self.handshake_timeout.as_millis())));
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let process = Arc::new(PluginProcess::new(&def.name, tx, pipes.child));
        let writer = tokio::spawn(write_loop(pipes.writer, rx));
        let reader = tokio::spawn(read_loop(session.downgrade(), process.clone(), pipes.reader));
        lock(&process.tasks).extend([writer, reader]);

        Ok((process, installed))
    }

    /// Run `procedure` in its plug-in and wait for the answer
    pub(crate) async fn run(
        &self,
        session: &Session,
        caller: &Caller,
        procedure: Arc<Procedure>,
        plug_in: &str,
        args: Vec<Value>,
    ) -> ProcResult {
        let process = match self.ensure_running(session, plug_in).await {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(plug_in = %plug_in, error = %e, "plug-in unavailable");
                return ProcResult::execution_error(e.message);
            }
        };

        // A plug-in blocked in a callback can still take nested runs
        let _serial = if caller.in_plug_in(plug_in) {
            None
        } else {
            match caller.progress() {
                Some(progress) => tokio::select! {
                    guard = process.run_lock.lock() => Some(guard),
                    _ = cancelled(progress.cancel_signal()) => {
                        tracing::info!(plug_in = %plug_in, procedure = %procedure.name(), "call cancelled while queued");
                        return ProcResult::cancel();
                    }
                },
                None => Some(process.run_lock.lock().await),
            }
        };
        if !process.is_alive() {
            return ProcResult::execution_error(TERMINATED);
        }

        let frame = ProcFrame::new(
            session.frame_counter(),
            procedure.clone(),
            plug_in,
            caller.frame().cloned(),
            caller.context(session),
            caller.progress(),
        );
        let (_active, rx) = ActiveCall::enter(self, session, &process, frame);
        if !process.send(Message::ProcRun { name: procedure.name().to_string(), args }) {
            return ProcResult::execution_error(TERMINATED);
        }
        tracing::debug!(plug_in = %plug_in, procedure = %procedure.name(), "awaiting plug-in");

        let outcome = match caller.progress() {
            Some(progress) => tokio::select! {
                result = rx => Some(result),
                _ = cancelled(progress.cancel_signal()) => None,
            },
            None => Some(rx.await),
        };

        match outcome {
            Some(Ok(result)) => result,
            Some(Err(_)) => ProcResult::execution_error(TERMINATED),
            None => {
                tracing::info!(plug_in = %plug_in, procedure = %procedure.name(), "call cancelled, killing plug-in");
                self.exited(session, &process);
                ProcResult::cancel()
            }
        }
    }

    /// Ask a running plug-in to quit; `false` if it was not running
    pub(crate) async fn terminate(&self, session: &Session, name: &str) -> bool {
        match self.process(name) {
            Some(process) => {
                self.stop(session, &process).await;
                true
            }
            None => false,
        }
    }

    pub(crate) async fn shutdown(&self, session: &Session) {
        let processes: Vec<Arc<PluginProcess>> = lock(&self.processes).values().cloned().collect();
        for process in processes {
            self.stop(session, &process).await;
        }
    }

    /// Send `Quit`, wait a bounded time for the pipe to close, then kill
    async fn stop(&self, session: &Session, process: &Arc<PluginProcess>) {
        let mut exited = process.exited.subscribe();
        if process.send(Message::Quit) {
            let wait = async {
                while !*exited.borrow_and_update() {
                    if exited.changed().await.is_err() {
                        break;
                    }
                }
            };
            if tokio::time::timeout(self.quit_timeout, wait).await.is_err() {
                tracing::warn!(plug_in = %process.name, "plug-in did not quit in time, killing it");
            }
        }
        self.exited(session, process);
    }

    /// Tear down a process; runs once, whoever notices first
    fn exited(&self, session: &Session, process: &Arc<PluginProcess>) {
        if !process.alive.swap(false, Ordering::SeqCst) {
            return;
        }

        let pending = std::mem::take(&mut *lock(&process.pending));
        if pending.is_empty() {
            tracing::info!(plug_in = %process.name, "plug-in exited");
        } else {
            tracing::error!(plug_in = %process.name, calls = pending.len(), "{}", TERMINATED);
        }
        for (_, tx) in pending {
            let _ = tx.send(ProcResult::execution_error(TERMINATED));
        }

        for name in std::mem::take(&mut *lock(&process.temporaries)) {
            session.registry().unregister(&name);
            session.file_handlers().forget(&name);
        }

        {
            let mut processes = lock(&self.processes);
            if processes.get(&process.name).is_some_and(|p| Arc::ptr_eq(p, process)) {
                processes.remove(&process.name);
            }
        }

        kill_child(lock(&process.child).as_mut());
        for task in lock(&process.tasks).drain(..) {
            task.abort();
        }
        process.exited.send_replace(true);
    }
}

fn kill_child(child: Option<&mut Child>) {
    if let Some(child) = child {
        let _ = child.start_kill();
    }
}

/// Handshake answer: every `ProcInstall` up to `Ready`
async fn read_announcements(reader: &mut BoxReader) -> Result<Vec<ProcDef>, WireError> {
    let mut installed = Vec::new();
    loop {
        match read_message(reader).await? {
            Some(Message::ProcInstall(def)) => installed.push(def),
            Some(Message::Ready) => return Ok(installed),
            Some(other) => {
                return Err(WireError::Malformed(format!("unexpected {} during handshake", other.kind_name())));
            }
            None => return Err(WireError::Closed),
        }
    }
}

async fn write_loop(mut writer: BoxWriter, mut rx: mpsc::UnboundedReceiver<Message>) {
    while let Some(message) = rx.recv().await {
        let quit = matches!(message, Message::Quit);
        if let Err(e) = write_message(&mut writer, &message).await {
            tracing::debug!(error = %e, "plug-in pipe closed for writing");
            break;
        }
        if quit {
            break;
        }
    }
    let _ = writer.shutdown().await;
}

async fn read_loop(session: Weak<SessionInner>, process: Arc<PluginProcess>, mut reader: BoxReader) {
    loop {
        let message = match read_message(&mut reader).await {
            Ok(Some(message)) => message,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(plug_in = %process.name, error = %e, "unreadable message from plug-in");
                break;
            }
        };
        let Some(session) = Session::upgrade(&session) else {
            break;
        };

        match message {
            Message::ProcReturn { name, status, message, values } => {
                let waiting = lock(&process.pending).pop();
                match waiting {
                    Some((_, tx)) => {
                        let _ = tx.send(ProcResult::from_parts(status, message, values));
                    }
                    None => tracing::warn!(plug_in = %process.name, procedure = %name, "unsolicited return"),
                }
            }
            Message::ProcRun { name, args } => callback(&session, &process, name, args),
            Message::ProcInstall(def) => install_temporary(&session, &process, def),
            Message::ProcUninstall { name } => {
                let owned = {
                    let mut temporaries = lock(&process.temporaries);
                    let before = temporaries.len();
                    temporaries.retain(|t| t != &name);
                    temporaries.len() != before
                };
                if owned {
                    session.registry().unregister(&name);
                    session.file_handlers().forget(&name);
                    tracing::debug!(plug_in = %process.name, procedure = %name, "temporary procedure removed");
                } else {
                    tracing::warn!(plug_in = %process.name, procedure = %name, "uninstall of a procedure it does not own");
                }
            }
            other => {
                tracing::warn!(plug_in = %process.name, "ignoring {} from plug-in", other.kind_name());
            }
        }
    }

    match Session::upgrade(&session) {
        Some(session) => session.plugins().exited(&session, &process),
        None => process.alive.store(false, Ordering::SeqCst),
    }
}

/// A plug-in calling back into the host
fn callback(session: &Session, process: &Arc<PluginProcess>, name: String, args: Vec<Value>) {
    let caller = process.current_frame().map(Caller::from_frame).unwrap_or_default();
    let task = {
        let session = session.clone();
        let process = process.clone();
        tokio::spawn(async move {
            let result = session.execute_as(&caller, &name, args).await;
            drop(caller);
            process.send(Message::ProcReturn {
                name,
                status: result.status,
                message: result.message,
                values: result.returns,
            });
        })
    };

    let mut tasks = lock(&process.tasks);
    tasks.retain(|t| !t.is_finished());
    if process.is_alive() {
        tasks.push(task);
    } else {
        task.abort();
    }
}

fn install_temporary(session: &Session, process: &Arc<PluginProcess>, def: ProcDef) {
    let def = def.with_kind(ProcedureKind::Temporary);
    let name = def.name.clone();
    match session.registry().register(Procedure::plugin(def, &process.name)) {
        Ok(_) => {
            lock(&process.temporaries).push(name.clone());
            tracing::debug!(plug_in = %process.name, procedure = %name, "temporary procedure installed");
        }
        Err(e) => tracing::warn!(plug_in = %process.name, error = %e, "temporary procedure rejected"),
    }
}
