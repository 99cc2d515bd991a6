//! Procedure signatures
//!
//! A `ProcDef` is the data half of a procedure: everything except the
//! handler. It is what plug-ins send during the handshake and what the
//! introspection procedures report.

use crate::{ArgType, ProcedureKind, Value};
use serde::{Deserialize, Serialize};

/// Declared bound on a parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Constraint {
    /// Inclusive INT32 range
    Int { min: i32, max: i32 },
    /// Inclusive FLOAT range
    Float { min: f64, max: f64 },
    /// Inclusive string byte length or array element count
    Length { min: usize, max: usize },
    /// Object parameter also accepts the "none" id
    NoneOk,
}

/// Metadata about one parameter or return slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub arg_type: ArgType,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint: Option<Constraint>,
    /// Name of a preceding INT32 parameter holding this array's length
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sized_by: Option<String>,
    /// Value used when a trailing argument is omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, arg_type: ArgType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arg_type,
            description: description.into(),
            constraint: None,
            sized_by: None,
            default: None,
        }
    }

    pub fn int32(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ArgType::Int32, description)
    }

    pub fn float(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ArgType::Float, description)
    }

    pub fn string(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ArgType::String, description)
    }

    pub fn int_range(mut self, min: i32, max: i32) -> Self {
        self.constraint = Some(Constraint::Int { min, max });
        self
    }

    pub fn float_range(mut self, min: f64, max: f64) -> Self {
        self.constraint = Some(Constraint::Float { min, max });
        self
    }

    pub fn length(mut self, min: usize, max: usize) -> Self {
        self.constraint = Some(Constraint::Length { min, max });
        self
    }

    pub fn none_ok(mut self) -> Self {
        self.constraint = Some(Constraint::NoneOk);
        self
    }

    pub fn sized_by(mut self, count_param: impl Into<String>) -> Self {
        self.sized_by = Some(count_param.into());
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn allows_none(&self) -> bool {
        matches!(self.constraint, Some(Constraint::NoneOk))
    }
}

/// Full signature and documentation of a procedure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcDef {
    pub name: String,
    pub kind: ProcedureKind,
    #[serde(default)]
    pub blurb: String,
    #[serde(default)]
    pub help: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub copyright: String,
    #[serde(default)]
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub menu_path: Option<String>,
    #[serde(default)]
    pub params: Vec<ParamSpec>,
    #[serde(default)]
    pub returns: Vec<ParamSpec>,
}

impl ProcDef {
    pub fn new(name: impl Into<String>, kind: ProcedureKind) -> Self {
        Self {
            name: name.into(),
            kind,
            blurb: String::new(),
            help: String::new(),
            author: String::new(),
            copyright: String::new(),
            date: String::new(),
            menu_path: None,
            params: Vec::new(),
            returns: Vec::new(),
        }
    }

    pub fn blurb(mut self, blurb: impl Into<String>) -> Self {
        self.blurb = blurb.into();
        self
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = help.into();
        self
    }

    /// Author, copyright holder and date in one call
    pub fn attribution(mut self, author: &str, copyright: &str, date: &str) -> Self {
        self.author = author.to_string();
        self.copyright = copyright.to_string();
        self.date = date.to_string();
        self
    }

    pub fn menu_path(mut self, path: impl Into<String>) -> Self {
        self.menu_path = Some(path.into());
        self
    }

    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    pub fn ret(mut self, spec: ParamSpec) -> Self {
        self.returns.push(spec);
        self
    }

    pub fn with_kind(mut self, kind: ProcedureKind) -> Self {
        self.kind = kind;
        self
    }

    /// Position of a parameter by name
    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name == name)
    }

    /// One-line signature: `name (INT32 width, ...) -> (LAYER layer)`
    pub fn signature(&self) -> String {
        let fmt = |specs: &[ParamSpec]| {
            specs.iter()
                .map(|p| format!("{} {}", p.arg_type, p.name))
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!("{} ({}) -> ({})", self.name, fmt(&self.params), fmt(&self.returns))
    }
}
