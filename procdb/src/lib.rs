//! procdb - Procedural Database
//!
//! Every operation of the application is a named, typed procedure. A
//! procedure is either an internal handler or lives in a plug-in process;
//! callers cannot tell the difference:
//!
//! ```ignore
//! let session = Session::default();
//! procdb_std::load_standard_procedures(&session)?;
//! let result = session.execute("image-new", vec![640.into(), 480.into()]).await;
//! ```

mod bridge;
mod config;
mod dispatch;
mod files;
mod frame;
mod registry;
mod session;
mod traits;

pub use bridge::{Launcher, PluginManager, PluginPipes, PluginProcess, ProcessLauncher, TERMINATED};
pub use config::{ConfigError, PluginDef, SessionConfig, CONFIG_ENV, PLUGIN_PATH_ENV};
pub use dispatch::{BoxFuture, Caller};
pub use files::{split_list, FileHandler, FileHandlers};
pub use frame::{FrameCounter, ProcFrame};
pub use registry::{Handler, Procedure, ProcedureRegistry};
pub use session::Session;
pub use traits::{CallContext, FnInvoker, Invoker};

pub use procdb_core::{ProcResult, Status, Value};

#[cfg(test)]
mod tests {
    use super::*;
    use procdb_core::{codes, ArgType, ParamSpec, ProcDef, ProcError, ProcedureKind};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn echo_def() -> ProcDef {
        ProcDef::new("echo-int32", ProcedureKind::Internal)
            .param(ParamSpec::int32("value", "Input"))
            .ret(ParamSpec::int32("value", "Output"))
    }

    /// Counts how often the handler body ran
    struct Spy {
        def: ProcDef,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Invoker for Spy {
        fn def(&self) -> ProcDef {
            self.def.clone()
        }

        async fn invoke(&self, _call: &CallContext, args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(args)
        }
    }

    fn session_with_spy(def: ProcDef) -> (Session, Arc<AtomicUsize>) {
        let session = Session::default();
        let calls = Arc::new(AtomicUsize::new(0));
        session.register(Spy { def, calls: calls.clone() }).unwrap();
        (session, calls)
    }

    mod dispatch_tests {
        use super::*;

        #[tokio::test]
        async fn test_echo_int32() {
            let (session, _) = session_with_spy(echo_def());
            let result = session.execute("echo-int32", vec![Value::Int32(42)]).await;
            assert_eq!(result.status, Status::Success);
            assert_eq!(result.returns, vec![Value::Int32(42)]);
        }

        #[tokio::test]
        async fn test_unknown_procedure() {
            let session = Session::default();
            let result = session.execute("nonexistent-proc", vec![]).await;
            assert_eq!(result.status, Status::CallingError);
            assert!(result.message.unwrap().contains("nonexistent-proc"));
        }

        #[tokio::test]
        async fn test_wrong_arity_never_runs_handler() {
            let (session, calls) = session_with_spy(echo_def());
            let result = session.execute("echo-int32", vec![]).await;
            assert_eq!(result.status, Status::CallingError);
            let result = session.execute("echo-int32", vec![Value::Int32(1), Value::Int32(2)]).await;
            assert_eq!(result.status, Status::CallingError);
            assert_eq!(result.error.unwrap().code, codes::ARG_COUNT);
            assert_eq!(calls.load(Ordering::SeqCst), 0);
        }

        #[tokio::test]
        async fn test_out_of_range_never_runs_handler() {
            let def = ProcDef::new("palette-set-columns", ProcedureKind::Internal)
                .param(ParamSpec::string("palette", "Palette"))
                .param(ParamSpec::int32("columns", "Columns").int_range(0, 256));
            let (session, calls) = session_with_spy(def);

            let result = session.execute("palette-set-columns", vec!["Default".into(), Value::Int32(300)]).await;
            assert_eq!(result.status, Status::CallingError);
            assert!(result.message.unwrap().contains("columns"));
            assert_eq!(calls.load(Ordering::SeqCst), 0);

            let result = session.execute("palette-set-columns", vec!["Default".into(), Value::Int32(256)]).await;
            assert!(result.is_success());
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }

        #[tokio::test]
        async fn test_dead_object_never_runs_handler() {
            let def = ProcDef::new("image-flatten", ProcedureKind::Internal)
                .param(ParamSpec::new("image", ArgType::Image, "Image"));
            let (session, calls) = session_with_spy(def);

            let image = session.objects().create_image(10, 10);
            session.objects().delete(image);
            let result = session.execute("image-flatten", vec![Value::image(image)]).await;
            assert_eq!(result.status, Status::CallingError);
            let result = session.execute("image-flatten", vec![Value::image(9999)]).await;
            assert_eq!(result.status, Status::CallingError);
            assert_eq!(calls.load(Ordering::SeqCst), 0);
        }

        #[tokio::test]
        async fn test_returns_in_declared_order() {
            let def = ProcDef::new("split", ProcedureKind::Internal)
                .ret(ParamSpec::int32("a", ""))
                .ret(ParamSpec::string("b", ""))
                .ret(ParamSpec::float("c", ""));
            let session = Session::default();
            session.register(FnInvoker::new(def, |_, _| {
                Ok(vec![Value::Int32(1), "two".into(), Value::Float(3.0)])
            })).unwrap();

            let result = session.execute("split", vec![]).await;
            assert_eq!(result.returns, vec![Value::Int32(1), "two".into(), Value::Float(3.0)]);
        }

        #[tokio::test]
        async fn test_handler_error_keeps_status() {
            let session = Session::default();
            session.register(FnInvoker::new(ProcDef::new("fail", ProcedureKind::Internal), |_, _| {
                Err(ProcError::execution("disk full"))
            })).unwrap();
            let result = session.execute("fail", vec![]).await;
            assert_eq!(result.status, Status::ExecutionError);
            assert_eq!(result.message.as_deref(), Some("disk full"));
        }

        #[tokio::test]
        async fn test_defaults_fill_trailing() {
            let def = ProcDef::new("with-defaults", ProcedureKind::Internal)
                .param(ParamSpec::int32("a", ""))
                .param(ParamSpec::int32("b", "").with_default(7));
            let (session, _) = session_with_spy(def);

            let result = session.execute_with_defaults("with-defaults", vec![Value::Int32(1)]).await;
            assert_eq!(result.returns, vec![Value::Int32(1), Value::Int32(7)]);

            let result = session.execute("with-defaults", vec![Value::Int32(1)]).await;
            assert_eq!(result.status, Status::CallingError);
        }

        #[tokio::test]
        async fn test_nested_internal_call() {
            let session = Session::default();
            session.register(FnInvoker::new(echo_def(), |_, args| Ok(args))).unwrap();
            session.register(Forward).unwrap();
            let result = session.execute("forward", vec![Value::Int32(5)]).await;
            assert_eq!(result.returns, vec![Value::Int32(5)]);
        }

        struct Forward;

        #[async_trait::async_trait]
        impl Invoker for Forward {
            fn def(&self) -> ProcDef {
                ProcDef::new("forward", ProcedureKind::Internal)
                    .param(ParamSpec::int32("value", ""))
                    .ret(ParamSpec::int32("value", ""))
            }

            async fn invoke(&self, call: &CallContext, args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
                call.execute("echo-int32", args).await.into_values()
            }
        }
    }

    mod registry_tests {
        use super::*;

        #[tokio::test]
        async fn test_second_registration_fails() {
            let (session, _) = session_with_spy(echo_def());
            let err = session.register(FnInvoker::new(echo_def(), |_, _| Ok(vec![]))).unwrap_err();
            assert_eq!(err.code, codes::ALREADY_REGISTERED);

            let result = session.execute("echo-int32", vec![Value::Int32(3)]).await;
            assert_eq!(result.returns, vec![Value::Int32(3)]);
        }

        #[test]
        fn test_internal_kind_is_forced() {
            let session = Session::default();
            let def = echo_def().with_kind(ProcedureKind::Plugin);
            session.register(FnInvoker::new(def, |_, args| Ok(args))).unwrap();
            let proc = session.registry().get("echo-int32").unwrap();
            assert_eq!(proc.kind(), ProcedureKind::Internal);
            assert!(proc.plug_in().is_none());
        }
    }
}
