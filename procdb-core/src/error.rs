//! Structured errors for procedure calls
//!
//! Errors never crash the dispatcher. They are values that travel back to
//! the caller inside a result and name the offending procedure and
//! parameter.

use serde::{Deserialize, Serialize};

/// Standard error codes (machine-readable)
pub mod codes {
    pub const UNKNOWN_PROCEDURE: &str = "UNKNOWN_PROCEDURE";
    pub const ALREADY_REGISTERED: &str = "ALREADY_REGISTERED";
    pub const ARG_COUNT: &str = "ARG_COUNT";
    pub const ARG_TYPE: &str = "ARG_TYPE";
    pub const OUT_OF_RANGE: &str = "OUT_OF_RANGE";
    pub const BAD_LENGTH: &str = "BAD_LENGTH";
    pub const INVALID_STRING: &str = "INVALID_STRING";
    pub const DEAD_OBJECT: &str = "DEAD_OBJECT";
    pub const NO_DEFAULT: &str = "NO_DEFAULT";
    pub const EXECUTION: &str = "EXECUTION";
    pub const PLUGIN: &str = "PLUGIN";
    pub const INTERNAL: &str = "INTERNAL";
}

/// Where in a call an error was detected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamRef {
    /// Zero-based position in the declared signature
    pub index: usize,
    /// Declared parameter name
    pub name: String,
}

/// Structured procedure error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdbError {
    /// Machine-readable error code
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Procedure being called when the error was raised
    #[serde(skip_serializing_if = "Option::is_none")]
    pub procedure: Option<String>,

    /// Offending parameter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<ParamRef>,

    /// Suggestion for fixing the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl PdbError {
    /// Create a new error
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            procedure: None,
            param: None,
            suggestion: None,
        }
    }

    /// Builder: add suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Builder: set procedure context
    pub fn in_procedure(mut self, name: impl Into<String>) -> Self {
        self.procedure = Some(name.into());
        self
    }

    /// Builder: set parameter context
    pub fn at_param(mut self, index: usize, name: impl Into<String>) -> Self {
        self.param = Some(ParamRef { index, name: name.into() });
        self
    }

    // ========== Common Error Constructors ==========

    pub fn unknown_procedure(name: &str) -> Self {
        Self::new(codes::UNKNOWN_PROCEDURE, format!("unknown procedure: {}", name))
            .in_procedure(name)
            .with_suggestion("Use pdb-query to list registered procedures")
    }

    pub fn already_registered(name: &str) -> Self {
        Self::new(codes::ALREADY_REGISTERED, format!("procedure '{}' already registered", name))
            .in_procedure(name)
    }

    pub fn arg_count(proc_name: &str, expected: usize, got: usize) -> Self {
        Self::new(codes::ARG_COUNT,
            format!("{} expects {} arguments, got {}", proc_name, expected, got))
            .in_procedure(proc_name)
            .with_suggestion(format!("Use pdb-proc-info '{}' for the signature", proc_name))
    }

    pub fn arg_type(proc_name: &str, index: usize, param: &str, expected: &str, got: &str) -> Self {
        Self::new(codes::ARG_TYPE,
            format!("{} argument {} '{}': expected {}, got {}", proc_name, index + 1, param, expected, got))
            .in_procedure(proc_name)
            .at_param(index, param)
    }

    pub fn out_of_range(proc_name: &str, index: usize, param: &str, details: impl Into<String>) -> Self {
        Self::new(codes::OUT_OF_RANGE,
            format!("{} argument {} '{}': {}", proc_name, index + 1, param, details.into()))
            .in_procedure(proc_name)
            .at_param(index, param)
    }

    pub fn bad_length(proc_name: &str, index: usize, param: &str, details: impl Into<String>) -> Self {
        Self::new(codes::BAD_LENGTH,
            format!("{} argument {} '{}': {}", proc_name, index + 1, param, details.into()))
            .in_procedure(proc_name)
            .at_param(index, param)
    }

    pub fn invalid_string(proc_name: &str, index: usize, param: &str) -> Self {
        Self::new(codes::INVALID_STRING,
            format!("{} argument {} '{}': string contains a NUL byte", proc_name, index + 1, param))
            .in_procedure(proc_name)
            .at_param(index, param)
    }

    pub fn dead_object(proc_name: &str, index: usize, param: &str, kind: &str, id: i32) -> Self {
        Self::new(codes::DEAD_OBJECT,
            format!("{} argument {} '{}': {} id {} does not refer to a live object",
                proc_name, index + 1, param, kind, id))
            .in_procedure(proc_name)
            .at_param(index, param)
    }

    pub fn no_default(proc_name: &str, index: usize, param: &str) -> Self {
        Self::new(codes::NO_DEFAULT,
            format!("{} argument {} '{}' was omitted and has no default", proc_name, index + 1, param))
            .in_procedure(proc_name)
            .at_param(index, param)
    }

    pub fn execution(details: impl Into<String>) -> Self {
        Self::new(codes::EXECUTION, details)
    }

    pub fn plugin(details: impl Into<String>) -> Self {
        Self::new(codes::PLUGIN, details)
    }

    pub fn internal(details: impl Into<String>) -> Self {
        Self::new(codes::INTERNAL, format!("Internal error: {}", details.into()))
            .with_suggestion("This is a bug, please report it")
    }
}

impl std::fmt::Display for PdbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, " (suggestion: {})", suggestion)?;
        }
        Ok(())
    }
}

impl std::error::Error for PdbError {}
