//! Context stack procedures
//!
//! Push and pop only make sense from inside a plug-in: the pushed context
//! lives on the calling frame and is discarded with it.

use super::prelude::*;
use procdb_core::ContextKey;

pub struct ContextPush;
pub struct ContextPop;
pub struct ContextGetForeground;
pub struct ContextSetForeground;

#[async_trait]
impl Invoker for ContextPush {
    fn def(&self) -> ProcDef {
        def("context-push", "Pushes a context to the top of the plug-in's context stack")
            .help("Settings changed after the push are local to the new context")
    }

    async fn invoke(&self, call: &CallContext, _args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
        let frame = call.frame()
            .ok_or_else(|| ProcError::execution("context-push needs a calling plug-in"))?;
        let context = frame.push_context();
        tracing::debug!(plug_in = frame.plug_in(), context = context.name(), "context pushed");
        Ok(vec![])
    }
}

#[async_trait]
impl Invoker for ContextPop {
    fn def(&self) -> ProcDef {
        def("context-pop", "Pops the topmost context from the plug-in's context stack")
    }

    async fn invoke(&self, call: &CallContext, _args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
        let frame = call.frame()
            .ok_or_else(|| ProcError::execution("context-pop needs a calling plug-in"))?;
        if frame.pop_context() {
            Ok(vec![])
        } else {
            Err(ProcError::execution("context stack underflow"))
        }
    }
}

#[async_trait]
impl Invoker for ContextGetForeground {
    fn def(&self) -> ProcDef {
        def("context-get-foreground", "Get the current foreground color")
            .ret(ParamSpec::new("foreground", ArgType::Color, "The foreground color"))
    }

    async fn invoke(&self, call: &CallContext, _args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
        Ok(vec![Value::Color(call.context().foreground())])
    }
}

#[async_trait]
impl Invoker for ContextSetForeground {
    fn def(&self) -> ProcDef {
        def("context-set-foreground", "Set the current foreground color")
            .param(ParamSpec::new("foreground", ArgType::Color, "The foreground color"))
    }

    async fn invoke(&self, call: &CallContext, args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
        let color = color_arg(&args, 0)?;
        call.context().set(ContextKey::Foreground, Value::Color(color));
        Ok(vec![])
    }
}
