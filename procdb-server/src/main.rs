//! procdb JSON-RPC server
//!
//! Line-delimited JSON-RPC 2.0 over stdio. stdout carries responses only;
//! logs go to stderr.
//!
//! Methods:
//! - execute: run a procedure, arguments converted by its signature
//! - query: list procedures whose name or blurb matches a regex
//! - info: signature and documentation of one procedure
//! - run_script: evaluate an s-expression script
//! - plugins: configured and running plug-ins

use procdb::{Session, SessionConfig};
use procdb_core::{codes, Color, PdbError, ProcResult};
use procdb_script::{datum_from, marshal, Datum, Script, ScriptError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

const SERVER_NAME: &str = "procdb";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Deserialize)]
struct RpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<JsonValue>,
    method: String,
    #[serde(default)]
    params: Option<JsonValue>,
}

#[derive(Debug, Serialize)]
struct RpcResponse {
    jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
struct RpcError {
    code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<JsonValue>,
}

impl RpcError {
    fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), data: None }
    }

    fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(-32602, message)
    }
}

impl RpcResponse {
    fn new(id: Option<JsonValue>, result: Result<JsonValue, RpcError>) -> Self {
        let (result, error) = match result {
            Ok(r) => (Some(r), None),
            Err(e) => (None, Some(e)),
        };
        Self { jsonrpc: "2.0".to_string(), id, result, error }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = match SessionConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "cannot load configuration");
            std::process::exit(2);
        }
    };

    let session = Session::new(config);
    if let Err(e) = procdb_std::load_standard_procedures(&session) {
        tracing::error!(error = %e, "cannot load standard procedures");
        std::process::exit(2);
    }
    let added = session.discover().await;
    tracing::info!(version = SERVER_VERSION, plug_ins = added.len(), procedures = session.registry().len(), "{} ready", SERVER_NAME);

    let script = Arc::new(Script::new(session.clone()));
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = rx.recv().await {
            let written = async {
                stdout.write_all(line.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await
            };
            if let Err(e) = written.await {
                tracing::error!(error = %e, "cannot write response");
                break;
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut requests = JoinSet::new();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                tracing::info!("client disconnected");
                break;
            }
            Err(e) => {
                tracing::error!(error = %e, "cannot read request");
                break;
            }
        };
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }

        let request: RpcRequest = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                let response = RpcResponse::new(None, Err(RpcError::new(-32700, format!("Parse error: {}", e))));
                send(&tx, &response);
                continue;
            }
        };

        // One task per request so a slow plug-in does not hold up the others
        let script = script.clone();
        let tx = tx.clone();
        requests.spawn(async move {
            tracing::debug!(method = %request.method, "request");
            let result = handle_request(&script, &request).await;
            if request.id.is_some() {
                send(&tx, &RpcResponse::new(request.id, result));
            }
        });
    }

    session.shutdown().await;
    while requests.join_next().await.is_some() {}
    drop(tx);
    let _ = writer.await;
}

fn send(tx: &mpsc::UnboundedSender<String>, response: &RpcResponse) {
    match serde_json::to_string(response) {
        Ok(line) => {
            let _ = tx.send(line);
        }
        Err(e) => tracing::error!(error = %e, "cannot encode response"),
    }
}

async fn handle_request(script: &Script, request: &RpcRequest) -> Result<JsonValue, RpcError> {
    let params = request.params.clone().unwrap_or(JsonValue::Null);
    let session = script.session();
    match request.method.as_str() {
        "ping" => Ok(json!({})),
        "execute" => handle_execute(session, &params).await,
        "query" => {
            let pattern = params.get("pattern").and_then(|p| p.as_str()).unwrap_or("");
            let names = session.registry().query(pattern)
                .map_err(|e| RpcError::invalid_params(format!("invalid pattern: {}", e)))?;
            Ok(json!({ "procedures": names }))
        }
        "info" => {
            let name = str_param(&params, "procedure")?;
            let procedure = session.registry().lookup(name)
                .map_err(|e| RpcError::invalid_params(e.to_string()))?;
            Ok(json!({ "definition": procedure.def, "plug_in": procedure.plug_in() }))
        }
        "run_script" => {
            let source = str_param(&params, "source")?;
            match script.run(source).await {
                Ok(value) => Ok(json!({ "value": value, "text": value.to_string() })),
                Err(e) => Err(script_error(e)),
            }
        }
        "plugins" => Ok(json!({
            "configured": session.plugins().definitions(),
            "running": session.plugins().running(),
        })),
        _ => Err(RpcError::new(-32601, format!("Method not found: {}", request.method))),
    }
}

async fn handle_execute(session: &Session, params: &JsonValue) -> Result<JsonValue, RpcError> {
    let name = str_param(params, "procedure")?;
    let raw_args = match params.get("args") {
        Some(JsonValue::Array(items)) => items.clone(),
        None => Vec::new(),
        Some(_) => return Err(RpcError::invalid_params("'args' must be an array")),
    };
    let with_defaults = params.get("defaults").and_then(|d| d.as_bool()).unwrap_or(false);

    // Unknown procedures and arity problems are reported by the dispatcher;
    // an argument of the wrong type is a calling error like any other
    let mut args = Vec::with_capacity(raw_args.len());
    if let Some(procedure) = session.registry().get(name) {
        for (index, raw) in raw_args.iter().enumerate() {
            let datum = datum_from_json(raw)
                .map_err(|e| RpcError::invalid_params(format!("argument {}: {}", index + 1, e)))?;
            let Some(spec) = procedure.def.params.get(index) else {
                break;
            };
            match marshal(name, spec, datum) {
                Ok(value) => args.push(value),
                Err(e) => {
                    tracing::debug!(procedure = %name, error = %e, "argument rejected");
                    let error = PdbError::new(codes::ARG_TYPE, e.to_string())
                        .in_procedure(name)
                        .at_param(index, spec.name.as_str());
                    return Ok(result_json(ProcResult::calling_error(error)));
                }
            }
        }
        if raw_args.len() > procedure.def.params.len() {
            // Keep the count visible to the arity check
            args.resize(raw_args.len(), procdb_core::Value::Int32(0));
        }
    }

    let result = if with_defaults {
        session.execute_with_defaults(name, args).await
    } else {
        session.execute(name, args).await
    };
    Ok(result_json(result))
}

fn result_json(result: ProcResult) -> JsonValue {
    let returns: Vec<Datum> = result.returns.into_iter().map(datum_from).collect();
    json!({
        "status": result.status,
        "message": result.message,
        "returns": returns,
        "error": result.error,
    })
}

fn str_param<'a>(params: &'a JsonValue, key: &str) -> Result<&'a str, RpcError> {
    params.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| RpcError::invalid_params(format!("missing string parameter '{}'", key)))
}

fn script_error(e: ScriptError) -> RpcError {
    RpcError { code: -32000, message: e.to_string(), data: None }
}

/// JSON argument to script value: colors are objects with r, g, b and optional a
fn datum_from_json(value: &JsonValue) -> Result<Datum, String> {
    match value {
        JsonValue::Bool(b) => Ok(Datum::Bool(*b)),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Ok(Datum::Int(i)),
            None => n.as_f64().map(Datum::Float).ok_or_else(|| format!("unsupported number {}", n)),
        },
        JsonValue::String(s) => Ok(Datum::Str(s.clone())),
        JsonValue::Array(items) => items.iter().map(datum_from_json).collect::<Result<_, _>>().map(Datum::List),
        JsonValue::Object(_) => serde_json::from_value::<Color>(value.clone())
            .map(Datum::Color)
            .map_err(|e| format!("not a color: {}", e)),
        JsonValue::Null => Err("null is not a value".to_string()),
    }
}
