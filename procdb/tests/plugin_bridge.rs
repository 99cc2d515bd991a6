//! Plug-in bridge tests with in-memory children

use async_trait::async_trait;
use procdb::{
    Caller, FnInvoker, Launcher, PluginDef, PluginPipes, Session, SessionConfig, TERMINATED,
};
use procdb_core::{ArgType, ParamSpec, ProcDef, ProcError, ProcResult, ProcedureKind, ProgressHandle, Status, Value};
use procdb_wire::codec::{read_message, write_message, Message, PROTOCOL_VERSION};
use procdb_wire::{FnProc, PluginLink, PluginMain, PluginProc};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{duplex, split, DuplexStream};

type RawChild = fn(DuplexStream) -> Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Clone, Copy)]
enum Program {
    Sdk(fn() -> PluginMain),
    Raw(RawChild),
}

/// Launches children as tasks on the other end of a duplex pipe
struct TestLauncher {
    programs: HashMap<String, Program>,
    launches: AtomicUsize,
}

impl TestLauncher {
    fn new(programs: &[(&str, Program)]) -> Arc<Self> {
        Arc::new(Self {
            programs: programs.iter().map(|(n, p)| (n.to_string(), *p)).collect(),
            launches: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Launcher for TestLauncher {
    async fn launch(&self, def: &PluginDef) -> std::io::Result<PluginPipes> {
        let program = self.programs.get(&def.name).copied().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, format!("no program {}", def.name))
        })?;
        self.launches.fetch_add(1, Ordering::SeqCst);

        let (host, child) = duplex(64 * 1024);
        match program {
            Program::Sdk(build) => {
                let (r, w) = split(child);
                tokio::spawn(async move {
                    let _ = build().serve(r, w).await;
                });
            }
            Program::Raw(run) => {
                tokio::spawn(run(child));
            }
        }
        let (r, w) = split(host);
        Ok(PluginPipes { reader: Box::new(r), writer: Box::new(w), child: None })
    }
}

fn plugin_proc(name: &str) -> ProcDef {
    ProcDef::new(name, ProcedureKind::Plugin)
        .param(ParamSpec::int32("value", "Input"))
        .ret(ParamSpec::int32("value", "Output"))
}

fn session(launcher: Arc<TestLauncher>) -> Session {
    let config = SessionConfig { handshake_timeout_ms: 500, quit_timeout_ms: 500, ..SessionConfig::default() };
    let session = Session::with_launcher(config, launcher);
    session.register(FnInvoker::new(
        ProcDef::new("echo-int32", ProcedureKind::Internal)
            .param(ParamSpec::int32("value", "Input"))
            .ret(ParamSpec::int32("value", "Output")),
        |_, args| Ok(args),
    )).unwrap();
    session.register(FnInvoker::new(
        ProcDef::new("host-live-frames", ProcedureKind::Internal).ret(ParamSpec::int32("frames", "")),
        |call, _| Ok(vec![Value::Int32(call.session().live_frames() as i32)]),
    )).unwrap();
    session
}

async fn run(session: &Session, name: &str, args: Vec<Value>) -> ProcResult {
    tokio::time::timeout(Duration::from_secs(5), session.execute(name, args))
        .await
        .expect("call hung")
}

// ========== Children ==========

struct CallHost;

#[async_trait]
impl PluginProc for CallHost {
    async fn run(&self, link: &mut PluginLink, args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
        let frames = link.call("host-live-frames", vec![]).await?.into_values()?;
        let echoed = link.call("echo-int32", args).await?.into_values()?;
        Ok(vec![echoed[0].clone(), frames[0].clone()])
    }
}

struct CallSelf;

#[async_trait]
impl PluginProc for CallSelf {
    async fn run(&self, link: &mut PluginLink, args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
        link.call("plug-in-echo", args).await?.into_values()
    }
}

struct InstallTemp;

#[async_trait]
impl PluginProc for InstallTemp {
    async fn run(&self, link: &mut PluginLink, _args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
        let def = ProcDef::new("temp-double", ProcedureKind::Temporary)
            .param(ParamSpec::int32("value", ""))
            .ret(ParamSpec::int32("value", ""));
        link.install_temporary(def, Arc::new(FnProc::new(|args: Vec<Value>| {
            let n = args[0].as_int().unwrap_or(0);
            Ok(vec![Value::Int32(n * 2)])
        }))).await?;
        Ok(vec![])
    }
}

struct CallHang;

#[async_trait]
impl PluginProc for CallHang {
    async fn run(&self, link: &mut PluginLink, args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
        link.call("plug-in-hang", args).await?.into_values()
    }
}

fn nesting_main() -> PluginMain {
    PluginMain::new().procedure(plugin_proc("plug-in-call-hang"), CallHang)
}

fn summing_main() -> PluginMain {
    let def = ProcDef::new("plug-in-sum", ProcedureKind::Plugin)
        .param(ParamSpec::int32("num-values", "Number of values"))
        .param(ParamSpec::new("values", ArgType::Int32Array, "Values").sized_by("num-values").length(1, 4))
        .ret(ParamSpec::int32("sum", "Total"));
    PluginMain::new().procedure(def, FnProc::new(|args: Vec<Value>| {
        let sum = match args.get(1) {
            Some(Value::Int32Array(values)) => values.iter().sum(),
            _ => 0,
        };
        Ok(vec![Value::Int32(sum)])
    }))
}

fn demo_main() -> PluginMain {
    PluginMain::new()
        .procedure(plugin_proc("plug-in-echo"), FnProc::new(|args| Ok(args)))
        .procedure(
            plugin_proc("plug-in-call-host").ret(ParamSpec::int32("frames", "Frames seen by the host")),
            CallHost,
        )
        .procedure(plugin_proc("plug-in-call-self"), CallSelf)
        .procedure(ProcDef::new("plug-in-install-temp", ProcedureKind::Plugin), InstallTemp)
}

/// Handshake by hand, announcing one procedure
async fn raw_handshake(stream: &mut DuplexStream, name: &str) {
    match read_message(stream).await {
        Ok(Some(Message::Config { protocol_version })) => assert_eq!(protocol_version, PROTOCOL_VERSION),
        other => panic!("expected Config, got {:?}", other),
    }
    write_message(stream, &Message::ProcInstall(plugin_proc(name))).await.unwrap();
    write_message(stream, &Message::Ready).await.unwrap();
}

/// Takes the run, then dies without answering
fn crashing_child(mut stream: DuplexStream) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        raw_handshake(&mut stream, "plug-in-crash").await;
        loop {
            match read_message(&mut stream).await {
                Ok(Some(Message::ProcRun { .. })) => return,
                Ok(Some(_)) => continue,
                _ => return,
            }
        }
    })
}

/// Takes the run and never answers
fn hanging_child(mut stream: DuplexStream) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        raw_handshake(&mut stream, "plug-in-hang").await;
        loop {
            match read_message(&mut stream).await {
                Ok(Some(Message::ProcRun { .. })) => std::future::pending::<()>().await,
                Ok(Some(_)) => continue,
                _ => return,
            }
        }
    })
}

/// Calls back into the host, then dies before the callback is answered
fn crash_in_callback_child(mut stream: DuplexStream) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        raw_handshake(&mut stream, "plug-in-crash-in-callback").await;
        loop {
            match read_message(&mut stream).await {
                Ok(Some(Message::ProcRun { .. })) => {
                    let callback = Message::ProcRun { name: "plug-in-hang".into(), args: vec![Value::Int32(1)] };
                    let _ = write_message(&mut stream, &callback).await;
                    return;
                }
                Ok(Some(_)) => continue,
                _ => return,
            }
        }
    })
}

/// Answers each run with its arguments, slowly
fn slow_echo_child(mut stream: DuplexStream) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        raw_handshake(&mut stream, "plug-in-slow").await;
        loop {
            match read_message(&mut stream).await {
                Ok(Some(Message::ProcRun { name, args })) => {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    let reply = Message::ProcReturn { name, status: Status::Success, message: None, values: args };
                    if write_message(&mut stream, &reply).await.is_err() {
                        return;
                    }
                }
                Ok(Some(_)) => continue,
                _ => return,
            }
        }
    })
}

/// Never finishes the handshake
fn silent_child(stream: DuplexStream) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        let _keep = stream;
        std::future::pending::<()>().await
    })
}

/// Frames are released by other tasks; give them a moment
async fn settle_frames(session: &Session) -> usize {
    for _ in 0..50 {
        if session.live_frames() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    session.live_frames()
}

// ========== Tests ==========

#[tokio::test]
async fn test_discovery_registers_and_quits() {
    let launcher = TestLauncher::new(&[("demo", Program::Sdk(demo_main))]);
    let session = session(launcher.clone());

    let names = session.add_plugin(PluginDef::new("demo", "/plug-ins/demo")).await.unwrap();
    assert_eq!(names.len(), 4);
    assert!(!session.plugins().is_running("demo"));

    let proc = session.registry().get("plug-in-echo").unwrap();
    assert_eq!(proc.kind(), ProcedureKind::Plugin);
    assert_eq!(proc.plug_in(), Some("demo"));
    assert_eq!(session.registry().procedures_of("demo").len(), 4);
}

#[tokio::test]
async fn test_plugin_call_and_process_reuse() {
    let launcher = TestLauncher::new(&[("demo", Program::Sdk(demo_main))]);
    let session = session(launcher.clone());
    session.add_plugin(PluginDef::new("demo", "/plug-ins/demo")).await.unwrap();

    let result = run(&session, "plug-in-echo", vec![Value::Int32(42)]).await;
    assert_eq!(result.status, Status::Success);
    assert_eq!(result.returns, vec![Value::Int32(42)]);
    assert!(session.plugins().is_running("demo"));

    let result = run(&session, "plug-in-echo", vec![Value::Int32(7)]).await;
    assert_eq!(result.returns, vec![Value::Int32(7)]);
    // one launch to query, one for both calls
    assert_eq!(launcher.launches.load(Ordering::SeqCst), 2);
    assert_eq!(session.live_frames(), 0);

    session.shutdown().await;
    assert!(!session.plugins().is_running("demo"));
}

#[tokio::test]
async fn test_validation_happens_before_the_plugin() {
    let launcher = TestLauncher::new(&[("demo", Program::Sdk(demo_main))]);
    let session = session(launcher.clone());
    session.add_plugin(PluginDef::new("demo", "/plug-ins/demo")).await.unwrap();

    let result = run(&session, "plug-in-echo", vec!["not a number".into()]).await;
    assert_eq!(result.status, Status::CallingError);
    assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_callback_frames_return_to_baseline() {
    let launcher = TestLauncher::new(&[("demo", Program::Sdk(demo_main))]);
    let session = session(launcher);
    session.add_plugin(PluginDef::new("demo", "/plug-ins/demo")).await.unwrap();
    let before = session.live_frames();

    let result = run(&session, "plug-in-call-host", vec![Value::Int32(9)]).await;
    assert_eq!(result.status, Status::Success);
    // the host saw the plug-in's frame while serving the callback
    assert_eq!(result.returns, vec![Value::Int32(9), Value::Int32(1)]);
    assert_eq!(session.live_frames(), before);
    session.shutdown().await;
}

#[tokio::test]
async fn test_reentrant_call_into_same_plugin() {
    let launcher = TestLauncher::new(&[("demo", Program::Sdk(demo_main))]);
    let session = session(launcher);
    session.add_plugin(PluginDef::new("demo", "/plug-ins/demo")).await.unwrap();

    let result = run(&session, "plug-in-call-self", vec![Value::Int32(3)]).await;
    assert_eq!(result.status, Status::Success);
    assert_eq!(result.returns, vec![Value::Int32(3)]);
    assert_eq!(session.live_frames(), 0);
    session.shutdown().await;
}

#[tokio::test]
async fn test_child_crash_is_execution_error() {
    let launcher = TestLauncher::new(&[("crash", Program::Raw(crashing_child))]);
    let session = session(launcher);
    session.add_plugin(PluginDef::new("crash", "/plug-ins/crash")).await.unwrap();

    let result = run(&session, "plug-in-crash", vec![Value::Int32(1)]).await;
    assert_eq!(result.status, Status::ExecutionError);
    assert_eq!(result.message.as_deref(), Some(TERMINATED));
    assert_eq!(session.live_frames(), 0);
    assert!(!session.plugins().is_running("crash"));

    // the procedure stays registered; the next call starts a new process
    let result = run(&session, "plug-in-crash", vec![Value::Int32(1)]).await;
    assert_eq!(result.status, Status::ExecutionError);
}

#[tokio::test]
async fn test_temporary_procedures_follow_the_process() {
    let launcher = TestLauncher::new(&[("demo", Program::Sdk(demo_main))]);
    let session = session(launcher);
    session.add_plugin(PluginDef::new("demo", "/plug-ins/demo")).await.unwrap();

    let result = run(&session, "plug-in-install-temp", vec![]).await;
    assert_eq!(result.status, Status::Success);
    let temp = session.registry().get("temp-double").unwrap();
    assert_eq!(temp.kind(), ProcedureKind::Temporary);

    let result = run(&session, "temp-double", vec![Value::Int32(21)]).await;
    assert_eq!(result.returns, vec![Value::Int32(42)]);

    assert!(session.terminate("demo").await);
    assert!(!session.registry().contains("temp-double"));
    assert!(session.registry().contains("plug-in-echo"));
    assert!(!session.terminate("demo").await);
}

#[tokio::test]
async fn test_cancel_kills_plugin() {
    let launcher = TestLauncher::new(&[("hang", Program::Raw(hanging_child))]);
    let session = session(launcher);
    session.add_plugin(PluginDef::new("hang", "/plug-ins/hang")).await.unwrap();

    let progress = ProgressHandle::new();
    let canceller = progress.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let caller = Caller::root().with_progress(Arc::new(progress));
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        session.execute_as(&caller, "plug-in-hang", vec![Value::Int32(1)]),
    ).await.expect("cancel did not resolve the call");

    assert_eq!(result.status, Status::Cancel);
    assert_eq!(session.live_frames(), 0);
    assert!(!session.plugins().is_running("hang"));
}

#[tokio::test]
async fn test_handshake_timeout_rejects_plugin() {
    let launcher = TestLauncher::new(&[("silent", Program::Raw(silent_child))]);
    let session = session(launcher);
    let err = session.add_plugin(PluginDef::new("silent", "/plug-ins/silent")).await.unwrap_err();
    assert!(err.message.contains("did not answer"));
    assert!(session.registry().procedures_of("silent").is_empty());
}

#[tokio::test]
async fn test_missing_program_is_rejected() {
    let launcher = TestLauncher::new(&[]);
    let session = session(launcher);
    let err = session.add_plugin(PluginDef::new("ghost", "/plug-ins/ghost")).await.unwrap_err();
    assert!(err.message.contains("cannot start"));
}

#[tokio::test]
async fn test_extension_stays_resident() {
    let launcher = TestLauncher::new(&[("demo", Program::Sdk(demo_main))]);
    let session = session(launcher.clone());
    session.add_plugin(PluginDef::new("demo", "/plug-ins/demo").extension()).await.unwrap();

    assert!(session.plugins().is_running("demo"));
    assert_eq!(session.registry().get("plug-in-echo").unwrap().kind(), ProcedureKind::Extension);

    let result = run(&session, "plug-in-echo", vec![Value::Int32(5)]).await;
    assert!(result.is_success());
    assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);

    session.shutdown().await;
    assert!(!session.plugins().is_running("demo"));
}

#[tokio::test]
async fn test_crash_during_callback_releases_frames() {
    let launcher = TestLauncher::new(&[
        ("crasher", Program::Raw(crash_in_callback_child)),
        ("hang", Program::Raw(hanging_child)),
    ]);
    let session = session(launcher);
    session.add_plugin(PluginDef::new("crasher", "/plug-ins/crasher")).await.unwrap();
    session.add_plugin(PluginDef::new("hang", "/plug-ins/hang")).await.unwrap();

    let result = run(&session, "plug-in-crash-in-callback", vec![Value::Int32(1)]).await;
    assert_eq!(result.status, Status::ExecutionError);
    assert_eq!(result.message.as_deref(), Some(TERMINATED));

    // the callback still being served is torn down with the crashed plug-in
    assert_eq!(settle_frames(&session).await, 0);
    assert!(!session.plugins().is_running("crasher"));
    assert!(!session.plugins().is_running("hang"));
}

#[tokio::test]
async fn test_abandoned_call_does_not_leak_its_reply() {
    let launcher = TestLauncher::new(&[("slow", Program::Raw(slow_echo_child))]);
    let session = session(launcher.clone());
    session.add_plugin(PluginDef::new("slow", "/plug-ins/slow")).await.unwrap();

    let first = tokio::time::timeout(
        Duration::from_millis(50),
        session.execute("plug-in-slow", vec![Value::Int32(111)]),
    ).await;
    assert!(first.is_err());
    assert_eq!(settle_frames(&session).await, 0);

    let result = run(&session, "plug-in-slow", vec![Value::Int32(222)]).await;
    assert_eq!(result.status, Status::Success);
    assert_eq!(result.returns, vec![Value::Int32(222)]);
    // the process owing the abandoned reply was replaced
    assert_eq!(launcher.launches.load(Ordering::SeqCst), 3);
    session.shutdown().await;
}

#[tokio::test]
async fn test_cancel_unwinds_nested_callback() {
    let launcher = TestLauncher::new(&[
        ("nesting", Program::Sdk(nesting_main)),
        ("hang", Program::Raw(hanging_child)),
    ]);
    let session = session(launcher);
    session.add_plugin(PluginDef::new("nesting", "/plug-ins/nesting")).await.unwrap();
    session.add_plugin(PluginDef::new("hang", "/plug-ins/hang")).await.unwrap();

    let progress = ProgressHandle::new();
    let canceller = progress.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let caller = Caller::root().with_progress(Arc::new(progress));
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        session.execute_as(&caller, "plug-in-call-hang", vec![Value::Int32(1)]),
    ).await.expect("cancel did not resolve the call");

    assert_eq!(result.status, Status::Cancel);
    assert_eq!(settle_frames(&session).await, 0);
    assert!(!session.plugins().is_running("nesting"));
    assert!(!session.plugins().is_running("hang"));
}

#[tokio::test]
async fn test_cancel_while_queued_behind_another_call() {
    let launcher = TestLauncher::new(&[("slow", Program::Raw(slow_echo_child))]);
    let session = session(launcher);
    session.add_plugin(PluginDef::new("slow", "/plug-ins/slow")).await.unwrap();

    let busy = {
        let session = session.clone();
        tokio::spawn(async move { session.execute("plug-in-slow", vec![Value::Int32(1)]).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let progress = ProgressHandle::new();
    progress.cancel();
    let caller = Caller::root().with_progress(Arc::new(progress));
    let result = tokio::time::timeout(
        Duration::from_millis(100),
        session.execute_as(&caller, "plug-in-slow", vec![Value::Int32(2)]),
    ).await.expect("queued call ignored its cancel");
    assert_eq!(result.status, Status::Cancel);

    // the call holding the plug-in is untouched
    let busy = busy.await.unwrap();
    assert_eq!(busy.returns, vec![Value::Int32(1)]);
    session.shutdown().await;
}

#[tokio::test]
async fn test_array_length_checked_before_the_plugin() {
    let launcher = TestLauncher::new(&[("sum", Program::Sdk(summing_main))]);
    let session = session(launcher.clone());
    session.add_plugin(PluginDef::new("sum", "/plug-ins/sum")).await.unwrap();

    let mismatched = run(&session, "plug-in-sum", vec![Value::Int32(3), Value::Int32Array(vec![1, 2])]).await;
    assert_eq!(mismatched.status, Status::CallingError);
    assert!(mismatched.message.unwrap().contains("num-values"));

    let too_long = run(&session, "plug-in-sum", vec![Value::Int32(5), Value::Int32Array(vec![1; 5])]).await;
    assert_eq!(too_long.status, Status::CallingError);
    assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);

    let result = run(&session, "plug-in-sum", vec![Value::Int32(3), Value::Int32Array(vec![1, 2, 3])]).await;
    assert_eq!(result.returns, vec![Value::Int32(6)]);
    session.shutdown().await;
}
