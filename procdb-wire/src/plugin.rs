//! Plug-in side of the protocol
//!
//! A plug-in program builds a `PluginMain` with its procedures and calls
//! `serve` (or `serve_stdio`). The host drives the conversation: it sends
//! `Config`, the plug-in announces its procedures and answers every
//! `ProcRun`. A running procedure may call back into the host through its
//! `PluginLink`; while it waits, runs the host sends the other way (for
//! example into a temporary procedure) are served recursively.

use crate::codec::{read_message, write_message, Message, WireError, PROTOCOL_VERSION};
use async_trait::async_trait;
use procdb_core::{ProcDef, ProcError, ProcResult, ProcedureKind, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

pub type BoxReader = Box<dyn AsyncRead + Unpin + Send>;
pub type BoxWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// Procedure implemented inside a plug-in process
#[async_trait]
pub trait PluginProc: Send + Sync {
    async fn run(&self, link: &mut PluginLink, args: Vec<Value>) -> Result<Vec<Value>, ProcError>;
}

/// Adapter for handlers that never call back into the host
pub struct FnProc<F>(F);

impl<F> FnProc<F>
where
    F: Fn(Vec<Value>) -> Result<Vec<Value>, ProcError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> PluginProc for FnProc<F>
where
    F: Fn(Vec<Value>) -> Result<Vec<Value>, ProcError> + Send + Sync,
{
    async fn run(&self, _link: &mut PluginLink, args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
        (self.0)(args)
    }
}

/// Connection from a plug-in to its host
pub struct PluginLink {
    reader: BoxReader,
    writer: BoxWriter,
    procs: HashMap<String, Arc<dyn PluginProc>>,
}

impl PluginLink {
    /// Run a host procedure and wait for its result
    pub async fn call(&mut self, name: &str, args: Vec<Value>) -> Result<ProcResult, WireError> {
        write_message(&mut self.writer, &Message::ProcRun { name: name.to_string(), args }).await?;
        loop {
            match read_message(&mut self.reader).await? {
                Some(Message::ProcReturn { status, message, values, .. }) => {
                    return Ok(ProcResult::from_parts(status, message, values));
                }
                Some(Message::ProcRun { name, args }) => {
                    let reply = self.run_local(name, args).await;
                    write_message(&mut self.writer, &reply).await?;
                }
                Some(Message::Quit) | None => return Err(WireError::Closed),
                Some(other) => {
                    return Err(WireError::Malformed(format!(
                        "unexpected {} while waiting for {}", other.kind_name(), name)));
                }
            }
        }
    }

    /// Install a procedure that lives as long as this process
    pub async fn install_temporary(&mut self, def: ProcDef, handler: Arc<dyn PluginProc>) -> Result<(), WireError> {
        let def = def.with_kind(ProcedureKind::Temporary);
        self.procs.insert(def.name.clone(), handler);
        write_message(&mut self.writer, &Message::ProcInstall(def)).await
    }

    pub async fn uninstall_temporary(&mut self, name: &str) -> Result<(), WireError> {
        self.procs.remove(name);
        write_message(&mut self.writer, &Message::ProcUninstall { name: name.to_string() }).await
    }

    async fn run_local(&mut self, name: String, args: Vec<Value>) -> Message {
        let result = match self.procs.get(&name).cloned() {
            Some(handler) => handler.run(self, args).await,
            None => Err(ProcError::execution(format!("procedure '{}' is not provided by this plug-in", name))),
        };
        let result: ProcResult = match result {
            Ok(values) => ProcResult::success(values),
            Err(e) => e.into(),
        };
        Message::ProcReturn {
            name,
            status: result.status,
            message: result.message,
            values: result.returns,
        }
    }

    /// Answer runs until the host sends `Quit` or hangs up
    async fn serve_loop(&mut self) -> Result<(), WireError> {
        loop {
            match read_message(&mut self.reader).await? {
                Some(Message::ProcRun { name, args }) => {
                    tracing::debug!(procedure = %name, "running");
                    let reply = self.run_local(name, args).await;
                    write_message(&mut self.writer, &reply).await?;
                }
                Some(Message::Quit) | None => return Ok(()),
                Some(other) => {
                    return Err(WireError::Malformed(format!("unexpected {} from host", other.kind_name())));
                }
            }
        }
    }
}

/// Entry point of a plug-in program
#[derive(Default)]
pub struct PluginMain {
    procs: Vec<(ProcDef, Arc<dyn PluginProc>)>,
}

impl PluginMain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn procedure<P: PluginProc + 'static>(mut self, def: ProcDef, handler: P) -> Self {
        self.procs.push((def, Arc::new(handler)));
        self
    }

    /// Handshake, then serve until told to quit
    pub async fn serve<R, W>(self, reader: R, writer: W) -> Result<(), WireError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut link = PluginLink {
            reader: Box::new(reader),
            writer: Box::new(writer),
            procs: HashMap::new(),
        };

        match read_message(&mut link.reader).await? {
            Some(Message::Config { protocol_version }) if protocol_version == PROTOCOL_VERSION => {}
            Some(Message::Config { protocol_version }) => {
                return Err(WireError::VersionMismatch { expected: PROTOCOL_VERSION, got: protocol_version });
            }
            Some(other) => {
                return Err(WireError::Malformed(format!("expected Config, got {}", other.kind_name())));
            }
            None => return Err(WireError::Closed),
        }

        for (def, handler) in self.procs {
            link.procs.insert(def.name.clone(), handler);
            write_message(&mut link.writer, &Message::ProcInstall(def)).await?;
        }
        write_message(&mut link.writer, &Message::Ready).await?;

        link.serve_loop().await
    }

    /// Serve over the process's stdin/stdout
    pub async fn serve_stdio(self) -> Result<(), WireError> {
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }
}

impl From<WireError> for ProcError {
    fn from(err: WireError) -> Self {
        ProcError::execution(format!("lost connection to host: {}", err))
    }
}
