//! Dispatcher
//!
//! `execute` is the single entry point for running a procedure. Every call
//! produces exactly one `ProcResult`: lookup and validation failures become
//! `CallingError` before any handler runs, handler failures keep the status
//! the handler chose, and plug-in failures arrive as `ExecutionError`.

use crate::{CallContext, Handler, ProcFrame, Session};
use procdb_core::{check_returns, fill_defaults, validate_args, Context, ProcResult, Progress, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future returned by the recursive entry points
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Who a call is made on behalf of
///
/// The root caller is the session itself (core code, scripts, the server).
/// Calls a plug-in makes back into the host carry that plug-in's frame.
#[derive(Clone, Default)]
pub struct Caller {
    frame: Option<Arc<ProcFrame>>,
    progress: Option<Arc<dyn Progress>>,
}

impl Caller {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_frame(frame: Arc<ProcFrame>) -> Self {
        Self { frame: Some(frame), progress: None }
    }

    /// Report through `progress`; cancelling it cancels the call
    pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn frame(&self) -> Option<&Arc<ProcFrame>> {
        self.frame.as_ref()
    }

    /// Explicit progress, else whatever the calling frame already reports to
    pub fn progress(&self) -> Option<Arc<dyn Progress>> {
        match &self.progress {
            Some(p) => Some(p.clone()),
            None => self.frame.as_ref().and_then(|f| f.current_progress()),
        }
    }

    pub fn context(&self, session: &Session) -> Context {
        match &self.frame {
            Some(frame) => frame.context(),
            None => session.context().clone(),
        }
    }

    /// Whether the call chain already runs inside `plug_in`
    pub fn in_plug_in(&self, plug_in: &str) -> bool {
        self.frame.as_ref().is_some_and(|f| f.in_chain(plug_in))
    }
}

impl Session {
    /// Run `name` as the root caller
    pub async fn execute(&self, name: &str, args: Vec<Value>) -> ProcResult {
        self.execute_as(&Caller::root(), name, args).await
    }

    /// Run `name` on behalf of `caller`
    pub fn execute_as<'a>(&'a self, caller: &'a Caller, name: &'a str, args: Vec<Value>) -> BoxFuture<'a, ProcResult> {
        Box::pin(self.dispatch(caller, name, args, false))
    }

    /// Like `execute`, padding omitted trailing arguments with defaults
    pub async fn execute_with_defaults(&self, name: &str, args: Vec<Value>) -> ProcResult {
        self.execute_with_defaults_as(&Caller::root(), name, args).await
    }

    pub fn execute_with_defaults_as<'a>(
        &'a self,
        caller: &'a Caller,
        name: &'a str,
        args: Vec<Value>,
    ) -> BoxFuture<'a, ProcResult> {
        Box::pin(self.dispatch(caller, name, args, true))
    }

    async fn dispatch(&self, caller: &Caller, name: &str, args: Vec<Value>, fill: bool) -> ProcResult {
        let procedure = match self.registry().lookup(name) {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!(procedure = %name, "unknown procedure");
                return ProcResult::calling_error(e);
            }
        };

        let args = if fill {
            match fill_defaults(name, &procedure.def.params, args) {
                Ok(args) => args,
                Err(e) => return ProcResult::calling_error(e),
            }
        } else {
            args
        };

        if let Err(e) = validate_args(name, &procedure.def.params, &args, self.objects()) {
            tracing::debug!(procedure = %name, error = %e, "rejected call");
            return ProcResult::calling_error(e);
        }

        tracing::debug!(procedure = %name, kind = %procedure.kind(), args = args.len(), "dispatch");

        let result = match &procedure.handler {
            Handler::Internal(invoker) => {
                let call = CallContext::new(self.clone(), caller.clone(), name);
                match invoker.invoke(&call, args).await {
                    Ok(values) => ProcResult::success(values),
                    Err(e) => e.into(),
                }
            }
            Handler::Plugin { plug_in } => {
                self.plugins().run(self, caller, procedure.clone(), plug_in, args).await
            }
        };

        if result.is_success() {
            for problem in check_returns(&procedure.def.returns, &result.returns) {
                tracing::warn!(procedure = %name, "return signature mismatch: {}", problem);
            }
        }

        result
    }
}
