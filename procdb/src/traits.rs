//! Handler traits for in-process procedures

use crate::{Caller, ProcFrame, Session};
use async_trait::async_trait;
use procdb_core::{Context, ObjectStore, ProcDef, ProcError, ProcResult, Progress, Value};
use std::sync::Arc;

/// In-process procedure implementation
#[async_trait]
pub trait Invoker: Send + Sync {
    /// Signature the procedure is registered under
    fn def(&self) -> ProcDef;

    /// Run with arguments that already passed validation
    async fn invoke(&self, call: &CallContext, args: Vec<Value>) -> Result<Vec<Value>, ProcError>;
}

/// What a handler sees of the call it is serving
pub struct CallContext {
    session: Session,
    caller: Caller,
    procedure: String,
}

impl CallContext {
    pub(crate) fn new(session: Session, caller: Caller, procedure: &str) -> Self {
        Self { session, caller, procedure: procedure.to_string() }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn caller(&self) -> &Caller {
        &self.caller
    }

    /// Name the procedure was called under
    pub fn procedure(&self) -> &str {
        &self.procedure
    }

    pub fn objects(&self) -> &ObjectStore {
        self.session.objects()
    }

    /// Context of the caller: its frame's top context, or the session root
    pub fn context(&self) -> Context {
        self.caller.context(&self.session)
    }

    /// Plug-in frame this call was made from, if any
    pub fn frame(&self) -> Option<&Arc<ProcFrame>> {
        self.caller.frame()
    }

    /// Progress of the caller, created on demand for plug-in frames
    pub fn progress(&self) -> Option<Arc<dyn Progress>> {
        match self.caller.frame() {
            Some(frame) => Some(frame.progress()),
            None => self.caller.progress(),
        }
    }

    /// Nested call on behalf of the same caller
    pub async fn execute(&self, name: &str, args: Vec<Value>) -> ProcResult {
        self.session.execute_as(&self.caller, name, args).await
    }

    /// Nested call with omitted trailing arguments filled in
    pub async fn execute_with_defaults(&self, name: &str, args: Vec<Value>) -> ProcResult {
        self.session.execute_with_defaults_as(&self.caller, name, args).await
    }
}

/// Closure-backed procedure, for handlers too small to deserve a type
pub struct FnInvoker<F> {
    def: ProcDef,
    f: F,
}

impl<F> FnInvoker<F>
where
    F: Fn(&CallContext, Vec<Value>) -> Result<Vec<Value>, ProcError> + Send + Sync,
{
    pub fn new(def: ProcDef, f: F) -> Self {
        Self { def, f }
    }
}

#[async_trait]
impl<F> Invoker for FnInvoker<F>
where
    F: Fn(&CallContext, Vec<Value>) -> Result<Vec<Value>, ProcError> + Send + Sync,
{
    fn def(&self) -> ProcDef {
        self.def.clone()
    }

    async fn invoke(&self, call: &CallContext, args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
        (self.f)(call, args)
    }
}
