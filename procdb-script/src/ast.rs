//! Script syntax tree and runtime values

use procdb_core::Color;
use serde::Serialize;

/// Parsed form
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Symbol(String),
    /// `#(r g b [a])`
    Color(Vec<Expr>),
    List(Vec<Expr>),
}

/// Value produced by evaluating a form
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Datum {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Color(Color),
    List(Vec<Datum>),
}

impl Datum {
    pub fn nil() -> Self {
        Datum::List(Vec::new())
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Datum::Int(n) => Some(*n),
            Datum::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Datum::Int(n) => Some(*n as f64),
            Datum::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Datum]> {
        match self {
            Datum::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Datum::Int(_) => "integer",
            Datum::Float(_) => "float",
            Datum::Str(_) => "string",
            Datum::Bool(_) => "boolean",
            Datum::Color(_) => "color",
            Datum::List(_) => "list",
        }
    }
}
