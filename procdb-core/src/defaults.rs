//! Default values for omitted trailing arguments
//!
//! An explicit `ParamSpec::default` always wins. Otherwise each type has a
//! fixed default: 0 for INT32 and 0.0 for FLOAT (both clamped into a
//! declared range), "" for STRING, empty arrays, opaque black for COLOR.
//! Object parameters default to "none" only when they accept it; any other
//! object parameter cannot be defaulted.

use crate::{ArgType, Color, Constraint, ObjectId, ParamSpec, PdbError, Value};

/// Default for one parameter, or `None` when it has no sensible default
pub fn default_for(spec: &ParamSpec) -> Option<Value> {
    if let Some(v) = &spec.default {
        return Some(v.clone());
    }
    let value = match spec.arg_type {
        ArgType::Int32 => match spec.constraint {
            Some(Constraint::Int { min, max }) if min <= max => Value::Int32(0.clamp(min, max)),
            _ => Value::Int32(0),
        },
        ArgType::Float => match spec.constraint {
            Some(Constraint::Float { min, max }) if min <= max => Value::Float(0.0_f64.clamp(min, max)),
            _ => Value::Float(0.0),
        },
        ArgType::String => Value::String(String::new()),
        ArgType::StringArray => Value::StringArray(Vec::new()),
        ArgType::Int32Array => Value::Int32Array(Vec::new()),
        ArgType::FloatArray => Value::FloatArray(Vec::new()),
        ArgType::Int8Array => Value::Int8Array(Vec::new()),
        ArgType::Color => Value::Color(Color::BLACK),
        tag => {
            let kind = tag.object_kind()?;
            if !spec.allows_none() {
                return None;
            }
            Value::Object(ObjectId::none(kind))
        }
    };
    Some(value)
}

/// Pad `args` with defaults for every omitted trailing parameter.
///
/// Extra arguments are left alone so arity validation still reports them.
pub fn fill_defaults(proc_name: &str, params: &[ParamSpec], mut args: Vec<Value>) -> Result<Vec<Value>, PdbError> {
    for (index, spec) in params.iter().enumerate().skip(args.len()) {
        match default_for(spec) {
            Some(v) => args.push(v),
            None => return Err(PdbError::no_default(proc_name, index, &spec.name)),
        }
    }
    Ok(args)
}
