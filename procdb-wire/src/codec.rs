//! Message framing
//!
//! Every message is a u32 message type followed by its body. Integers and
//! floats are big-endian, strings are a u32 byte length plus UTF-8, arrays
//! an i32 count plus elements. Each value is preceded by its `ArgType`
//! code, so a decoder never has to consult a signature.

use procdb_core::{ArgType, Color, Constraint, ObjectId, ParamSpec, ProcDef, ProcedureKind, Status, Value};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Protocol version exchanged in `Config`
pub const PROTOCOL_VERSION: u32 = 1;

/// Longest string the decoder accepts (bytes)
pub const MAX_STRING_LEN: u32 = 16 * 1024 * 1024;

/// Longest array the decoder accepts (elements)
pub const MAX_ARRAY_LEN: i32 = 16 * 1024 * 1024;

mod msg {
    pub const QUIT: u32 = 0;
    pub const CONFIG: u32 = 1;
    pub const PROC_RUN: u32 = 2;
    pub const PROC_RETURN: u32 = 3;
    pub const PROC_INSTALL: u32 = 4;
    pub const PROC_UNINSTALL: u32 = 5;
    pub const READY: u32 = 6;
}

/// Errors raised while reading or writing messages
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown message type {0}")]
    UnknownMessage(u32),

    #[error("unknown type tag {0}")]
    UnknownTag(u32),

    #[error("unknown status code {0}")]
    UnknownStatus(i32),

    #[error("unknown procedure kind {0}")]
    UnknownKind(u32),

    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    #[error("{what} length {len} exceeds limit")]
    TooLarge { what: &'static str, len: i64 },

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("protocol version mismatch: expected {expected}, got {got}")]
    VersionMismatch { expected: u32, got: u32 },

    #[error("connection closed")]
    Closed,
}

/// One protocol message
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Host → plug-in, first message of the handshake
    Config { protocol_version: u32 },
    /// Plug-in → host, announces a procedure
    ProcInstall(ProcDef),
    /// Plug-in → host, removes a temporary procedure
    ProcUninstall { name: String },
    /// Plug-in → host, end of the handshake
    Ready,
    /// Either direction: run a procedure
    ProcRun { name: String, args: Vec<Value> },
    /// Either direction: outcome of the innermost pending `ProcRun`
    ProcReturn {
        name: String,
        status: Status,
        message: Option<String>,
        values: Vec<Value>,
    },
    /// Host → plug-in, exit cleanly
    Quit,
}

impl Message {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Message::Config { .. } => "Config",
            Message::ProcInstall(_) => "ProcInstall",
            Message::ProcUninstall { .. } => "ProcUninstall",
            Message::Ready => "Ready",
            Message::ProcRun { .. } => "ProcRun",
            Message::ProcReturn { .. } => "ProcReturn",
            Message::Quit => "Quit",
        }
    }
}

// ========== Encoding ==========

/// Serialize a message into a byte buffer
pub fn encode(message: &Message) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64);
    match message {
        Message::Quit => put_u32(&mut buf, msg::QUIT),
        Message::Config { protocol_version } => {
            put_u32(&mut buf, msg::CONFIG);
            put_u32(&mut buf, *protocol_version);
        }
        Message::ProcRun { name, args } => {
            put_u32(&mut buf, msg::PROC_RUN);
            put_str(&mut buf, name);
            put_values(&mut buf, args);
        }
        Message::ProcReturn { name, status, message, values } => {
            put_u32(&mut buf, msg::PROC_RETURN);
            put_str(&mut buf, name);
            put_i32(&mut buf, status.code());
            put_str(&mut buf, message.as_deref().unwrap_or(""));
            put_values(&mut buf, values);
        }
        Message::ProcInstall(def) => {
            put_u32(&mut buf, msg::PROC_INSTALL);
            put_procdef(&mut buf, def);
        }
        Message::ProcUninstall { name } => {
            put_u32(&mut buf, msg::PROC_UNINSTALL);
            put_str(&mut buf, name);
        }
        Message::Ready => put_u32(&mut buf, msg::READY),
    }
    buf
}

/// Encode and write one message, flushing the writer
pub async fn write_message<W>(writer: &mut W, message: &Message) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let buf = encode(message);
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

fn put_u32(buf: &mut Vec<u8>, n: u32) {
    buf.extend_from_slice(&n.to_be_bytes());
}

fn put_i32(buf: &mut Vec<u8>, n: i32) {
    buf.extend_from_slice(&n.to_be_bytes());
}

fn put_f64(buf: &mut Vec<u8>, x: f64) {
    buf.extend_from_slice(&x.to_be_bytes());
}

fn put_str(buf: &mut Vec<u8>, s: &str) {
    put_u32(buf, s.len() as u32);
    buf.extend_from_slice(s.as_bytes());
}

fn put_count(buf: &mut Vec<u8>, n: usize) {
    put_i32(buf, n as i32);
}

fn put_values(buf: &mut Vec<u8>, values: &[Value]) {
    put_count(buf, values.len());
    for v in values {
        put_value(buf, v);
    }
}

fn put_value(buf: &mut Vec<u8>, value: &Value) {
    put_u32(buf, value.arg_type().code());
    match value {
        Value::Int32(n) => put_i32(buf, *n),
        Value::Float(x) => put_f64(buf, *x),
        Value::String(s) => put_str(buf, s),
        Value::StringArray(items) => {
            put_count(buf, items.len());
            items.iter().for_each(|s| put_str(buf, s));
        }
        Value::Int32Array(items) => {
            put_count(buf, items.len());
            items.iter().for_each(|n| put_i32(buf, *n));
        }
        Value::FloatArray(items) => {
            put_count(buf, items.len());
            items.iter().for_each(|x| put_f64(buf, *x));
        }
        Value::Int8Array(bytes) => {
            put_count(buf, bytes.len());
            buf.extend_from_slice(bytes);
        }
        Value::Color(c) => c.components().iter().for_each(|x| put_f64(buf, *x)),
        Value::Object(o) => put_i32(buf, o.id),
    }
}

fn put_procdef(buf: &mut Vec<u8>, def: &ProcDef) {
    put_str(buf, &def.name);
    put_u32(buf, def.kind.code());
    put_str(buf, &def.blurb);
    put_str(buf, &def.help);
    put_str(buf, &def.author);
    put_str(buf, &def.copyright);
    put_str(buf, &def.date);
    put_str(buf, def.menu_path.as_deref().unwrap_or(""));
    for specs in [&def.params, &def.returns] {
        put_count(buf, specs.len());
        for spec in specs.iter() {
            put_param(buf, spec);
        }
    }
}

fn put_param(buf: &mut Vec<u8>, spec: &ParamSpec) {
    put_str(buf, &spec.name);
    put_u32(buf, spec.arg_type.code());
    put_str(buf, &spec.description);
    match &spec.constraint {
        None => put_u32(buf, 0),
        Some(Constraint::Int { min, max }) => {
            put_u32(buf, 1);
            put_i32(buf, *min);
            put_i32(buf, *max);
        }
        Some(Constraint::Float { min, max }) => {
            put_u32(buf, 2);
            put_f64(buf, *min);
            put_f64(buf, *max);
        }
        Some(Constraint::Length { min, max }) => {
            put_u32(buf, 3);
            put_u32(buf, *min as u32);
            put_u32(buf, *max as u32);
        }
        Some(Constraint::NoneOk) => put_u32(buf, 4),
    }
    put_str(buf, spec.sized_by.as_deref().unwrap_or(""));
    match &spec.default {
        None => put_u32(buf, 0),
        Some(v) => {
            put_u32(buf, 1);
            put_value(buf, v);
        }
    }
}

// ========== Decoding ==========

/// Read one message; `Ok(None)` on a clean EOF before the first byte
pub async fn read_message<R>(reader: &mut R) -> Result<Option<Message>, WireError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut head = [0u8; 4];
    let mut filled = 0;
    while filled < head.len() {
        let n = reader.read(&mut head[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(WireError::Closed);
        }
        filled += n;
    }

    let message = match u32::from_be_bytes(head) {
        msg::QUIT => Message::Quit,
        msg::CONFIG => Message::Config { protocol_version: get_u32(reader).await? },
        msg::PROC_RUN => {
            let name = get_str(reader).await?;
            let args = get_values(reader).await?;
            Message::ProcRun { name, args }
        }
        msg::PROC_RETURN => {
            let name = get_str(reader).await?;
            let code = get_i32(reader).await?;
            let status = Status::from_code(code).ok_or(WireError::UnknownStatus(code))?;
            let message = get_str(reader).await?;
            let values = get_values(reader).await?;
            Message::ProcReturn {
                name,
                status,
                message: if message.is_empty() { None } else { Some(message) },
                values,
            }
        }
        msg::PROC_INSTALL => Message::ProcInstall(get_procdef(reader).await?),
        msg::PROC_UNINSTALL => Message::ProcUninstall { name: get_str(reader).await? },
        msg::READY => Message::Ready,
        other => return Err(WireError::UnknownMessage(other)),
    };
    Ok(Some(message))
}

/// Map an EOF in the middle of a message to `Closed`
fn io_err(e: std::io::Error) -> WireError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        WireError::Closed
    } else {
        WireError::Io(e)
    }
}

async fn get_u32<R: AsyncRead + Unpin + ?Sized>(r: &mut R) -> Result<u32, WireError> {
    r.read_u32().await.map_err(io_err)
}

async fn get_i32<R: AsyncRead + Unpin + ?Sized>(r: &mut R) -> Result<i32, WireError> {
    r.read_i32().await.map_err(io_err)
}

async fn get_f64<R: AsyncRead + Unpin + ?Sized>(r: &mut R) -> Result<f64, WireError> {
    r.read_f64().await.map_err(io_err)
}

async fn get_str<R: AsyncRead + Unpin + ?Sized>(r: &mut R) -> Result<String, WireError> {
    let len = get_u32(r).await?;
    if len > MAX_STRING_LEN {
        return Err(WireError::TooLarge { what: "string", len: len as i64 });
    }
    let mut bytes = vec![0u8; len as usize];
    r.read_exact(&mut bytes).await.map_err(io_err)?;
    String::from_utf8(bytes).map_err(|_| WireError::InvalidUtf8)
}

async fn get_count<R: AsyncRead + Unpin + ?Sized>(r: &mut R, what: &'static str) -> Result<usize, WireError> {
    let n = get_i32(r).await?;
    if n < 0 {
        return Err(WireError::Malformed(format!("negative {} count {}", what, n)));
    }
    if n > MAX_ARRAY_LEN {
        return Err(WireError::TooLarge { what, len: n as i64 });
    }
    Ok(n as usize)
}

async fn get_values<R: AsyncRead + Unpin + ?Sized>(r: &mut R) -> Result<Vec<Value>, WireError> {
    let count = get_count(r, "value").await?;
    let mut values = Vec::with_capacity(count.min(64));
    for _ in 0..count {
        values.push(get_value(r).await?);
    }
    Ok(values)
}

async fn get_tag<R: AsyncRead + Unpin + ?Sized>(r: &mut R) -> Result<ArgType, WireError> {
    let code = get_u32(r).await?;
    ArgType::from_code(code).ok_or(WireError::UnknownTag(code))
}

async fn get_value<R: AsyncRead + Unpin + ?Sized>(r: &mut R) -> Result<Value, WireError> {
    let tag = get_tag(r).await?;
    let value = match tag {
        ArgType::Int32 => Value::Int32(get_i32(r).await?),
        ArgType::Float => Value::Float(get_f64(r).await?),
        ArgType::String => Value::String(get_str(r).await?),
        ArgType::StringArray => {
            let n = get_count(r, "array").await?;
            let mut items = Vec::with_capacity(n.min(1024));
            for _ in 0..n {
                items.push(get_str(r).await?);
            }
            Value::StringArray(items)
        }
        ArgType::Int32Array => {
            let n = get_count(r, "array").await?;
            let mut items = Vec::with_capacity(n.min(1024));
            for _ in 0..n {
                items.push(get_i32(r).await?);
            }
            Value::Int32Array(items)
        }
        ArgType::FloatArray => {
            let n = get_count(r, "array").await?;
            let mut items = Vec::with_capacity(n.min(1024));
            for _ in 0..n {
                items.push(get_f64(r).await?);
            }
            Value::FloatArray(items)
        }
        ArgType::Int8Array => {
            let n = get_count(r, "array").await?;
            let mut bytes = vec![0u8; n];
            r.read_exact(&mut bytes).await.map_err(io_err)?;
            Value::Int8Array(bytes)
        }
        ArgType::Color => {
            let mut c = [0.0; 4];
            for slot in c.iter_mut() {
                *slot = get_f64(r).await?;
            }
            Value::Color(Color::rgba(c[0], c[1], c[2], c[3]))
        }
        object => {
            let id = get_i32(r).await?;
            match object.object_kind() {
                Some(kind) => Value::Object(ObjectId::new(kind, id)),
                None => return Err(WireError::UnknownTag(object.code())),
            }
        }
    };
    Ok(value)
}

async fn get_procdef<R: AsyncRead + Unpin + ?Sized>(r: &mut R) -> Result<ProcDef, WireError> {
    let name = get_str(r).await?;
    let code = get_u32(r).await?;
    let kind = ProcedureKind::from_code(code).ok_or(WireError::UnknownKind(code))?;
    let mut def = ProcDef::new(name, kind);
    def.blurb = get_str(r).await?;
    def.help = get_str(r).await?;
    def.author = get_str(r).await?;
    def.copyright = get_str(r).await?;
    def.date = get_str(r).await?;
    let menu = get_str(r).await?;
    def.menu_path = if menu.is_empty() { None } else { Some(menu) };

    let n = get_count(r, "param").await?;
    for _ in 0..n {
        def.params.push(get_param(r).await?);
    }
    let n = get_count(r, "return").await?;
    for _ in 0..n {
        def.returns.push(get_param(r).await?);
    }
    Ok(def)
}

async fn get_param<R: AsyncRead + Unpin + ?Sized>(r: &mut R) -> Result<ParamSpec, WireError> {
    let name = get_str(r).await?;
    let tag = get_tag(r).await?;
    let description = get_str(r).await?;
    let mut spec = ParamSpec::new(name, tag, description);
    spec.constraint = match get_u32(r).await? {
        0 => None,
        1 => Some(Constraint::Int { min: get_i32(r).await?, max: get_i32(r).await? }),
        2 => Some(Constraint::Float { min: get_f64(r).await?, max: get_f64(r).await? }),
        3 => Some(Constraint::Length {
            min: get_u32(r).await? as usize,
            max: get_u32(r).await? as usize,
        }),
        4 => Some(Constraint::NoneOk),
        other => return Err(WireError::Malformed(format!("unknown constraint kind {}", other))),
    };
    let sized_by = get_str(r).await?;
    spec.sized_by = if sized_by.is_empty() { None } else { Some(sized_by) };
    spec.default = match get_u32(r).await? {
        0 => None,
        _ => Some(get_value(r).await?),
    };
    Ok(spec)
}
