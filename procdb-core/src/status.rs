//! Call outcomes

use crate::{PdbError, Value};
use serde::{Deserialize, Serialize};

/// Status code of a finished call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Success = 0,
    /// Malformed invocation, detected before any handler ran
    CallingError = 1,
    /// The handler ran and failed
    ExecutionError = 2,
    /// User declined an interactive procedure, caller may continue
    PassThrough = 3,
    /// User aborted the call
    Cancel = 4,
}

impl Status {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Status::Success),
            1 => Some(Status::CallingError),
            2 => Some(Status::ExecutionError),
            3 => Some(Status::PassThrough),
            4 => Some(Status::Cancel),
            _ => None,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Success => "SUCCESS",
            Status::CallingError => "CALLING_ERROR",
            Status::ExecutionError => "EXECUTION_ERROR",
            Status::PassThrough => "PASS_THROUGH",
            Status::Cancel => "CANCEL",
        };
        f.write_str(s)
    }
}

/// Result of one `execute` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcResult {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub returns: Vec<Value>,
    /// Structured detail for calling errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<PdbError>,
}

impl ProcResult {
    pub fn success(returns: Vec<Value>) -> Self {
        Self { status: Status::Success, message: None, returns, error: None }
    }

    pub fn calling_error(error: PdbError) -> Self {
        Self {
            status: Status::CallingError,
            message: Some(error.message.clone()),
            returns: Vec::new(),
            error: Some(error),
        }
    }

    pub fn execution_error(message: impl Into<String>) -> Self {
        Self {
            status: Status::ExecutionError,
            message: Some(message.into()),
            returns: Vec::new(),
            error: None,
        }
    }

    pub fn cancel() -> Self {
        Self { status: Status::Cancel, message: None, returns: Vec::new(), error: None }
    }

    pub fn pass_through() -> Self {
        Self { status: Status::PassThrough, message: None, returns: Vec::new(), error: None }
    }

    /// Rebuild a result received from elsewhere (e.g. the wire)
    pub fn from_parts(status: Status, message: Option<String>, returns: Vec<Value>) -> Self {
        Self { status, message, returns, error: None }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// Return values of a successful call, otherwise the failure as a `ProcError`
    pub fn into_values(self) -> Result<Vec<Value>, ProcError> {
        match self.status {
            Status::Success => Ok(self.returns),
            Status::CallingError => Err(ProcError::Calling(self.error.unwrap_or_else(|| {
                PdbError::new(crate::codes::ARG_TYPE, self.message.unwrap_or_default())
            }))),
            Status::ExecutionError => Err(ProcError::Execution(self.message.unwrap_or_default())),
            Status::PassThrough => Err(ProcError::PassThrough),
            Status::Cancel => Err(ProcError::Cancel),
        }
    }
}

/// Failure reported by a procedure handler
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProcError {
    /// Handler detected a malformed call the signature could not express
    #[error("{0}")]
    Calling(PdbError),

    #[error("{0}")]
    Execution(String),

    #[error("procedure was cancelled")]
    Cancel,

    #[error("procedure passed through")]
    PassThrough,
}

impl ProcError {
    pub fn execution(message: impl Into<String>) -> Self {
        ProcError::Execution(message.into())
    }
}

impl From<PdbError> for ProcError {
    fn from(err: PdbError) -> Self {
        ProcError::Calling(err)
    }
}

impl From<ProcError> for ProcResult {
    fn from(err: ProcError) -> Self {
        match err {
            ProcError::Calling(e) => ProcResult::calling_error(e),
            ProcError::Execution(msg) => ProcResult::execution_error(msg),
            ProcError::Cancel => ProcResult::cancel(),
            ProcError::PassThrough => ProcResult::pass_through(),
        }
    }
}
