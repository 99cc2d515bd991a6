//! Argument validation against declared signatures
//!
//! Everything here runs before a handler is invoked. The first failing
//! argument wins and the error names it by position and declared name.

use crate::{ArgType, Constraint, ObjectResolver, ParamSpec, PdbError, Value};

/// Check one argument against its parameter spec.
///
/// Covers tag match, numeric and length bounds, string contents, color
/// range and object liveness. `sized_by` needs the whole argument list and
/// is checked by `validate_args`.
pub fn validate(
    proc_name: &str,
    index: usize,
    value: &Value,
    spec: &ParamSpec,
    objects: &dyn ObjectResolver,
) -> Result<(), PdbError> {
    if !tag_matches(spec.arg_type, value) {
        return Err(PdbError::arg_type(proc_name, index, &spec.name, spec.arg_type.name(), value.type_name()));
    }

    match value {
        Value::Int32(n) => {
            if let Some(Constraint::Int { min, max }) = spec.constraint {
                if *n < min || *n > max {
                    return Err(PdbError::out_of_range(proc_name, index, &spec.name,
                        format!("{} is outside {}..={}", n, min, max)));
                }
            }
        }
        Value::Float(x) => {
            if !x.is_finite() {
                return Err(PdbError::out_of_range(proc_name, index, &spec.name, "value is not finite"));
            }
            if let Some(Constraint::Float { min, max }) = spec.constraint {
                if *x < min || *x > max {
                    return Err(PdbError::out_of_range(proc_name, index, &spec.name,
                        format!("{} is outside {}..={}", x, min, max)));
                }
            }
        }
        Value::String(s) => {
            if s.contains('\0') {
                return Err(PdbError::invalid_string(proc_name, index, &spec.name));
            }
        }
        Value::StringArray(items) => {
            if items.iter().any(|s| s.contains('\0')) {
                return Err(PdbError::invalid_string(proc_name, index, &spec.name));
            }
        }
        Value::FloatArray(items) => {
            if items.iter().any(|x| !x.is_finite()) {
                return Err(PdbError::out_of_range(proc_name, index, &spec.name, "array holds a non-finite value"));
            }
        }
        Value::Color(c) => {
            if !c.is_normalized() {
                return Err(PdbError::out_of_range(proc_name, index, &spec.name,
                    "color components must be within 0..=1"));
            }
        }
        Value::Object(obj) => {
            let requested = spec.arg_type.object_kind().unwrap_or(obj.kind);
            let none_allowed = obj.is_none() && spec.allows_none();
            if !none_allowed && !objects.is_live(requested, obj.id) {
                return Err(PdbError::dead_object(proc_name, index, &spec.name, requested.name(), obj.id));
            }
        }
        Value::Int32Array(_) | Value::Int8Array(_) => {}
    }

    if let Some(Constraint::Length { min, max }) = spec.constraint {
        if let Some(len) = value.len() {
            if len < min || len > max {
                return Err(PdbError::bad_length(proc_name, index, &spec.name,
                    format!("length {} is outside {}..={}", len, min, max)));
            }
        }
    }

    Ok(())
}

/// Whether `value` may be passed where `expected` is declared.
///
/// Object values are matched on the declared tag only: a LAYER-tagged id
/// may be passed as DRAWABLE, and callers that only know an id (scripts,
/// JSON clients) may tag it with any object kind. Liveness under the
/// declared kind is what decides.
fn tag_matches(expected: ArgType, value: &Value) -> bool {
    match (expected.object_kind(), value) {
        (Some(_), Value::Object(_)) => true,
        (Some(_), _) => false,
        (None, v) => v.arg_type() == expected,
    }
}

/// Validate a whole argument list: arity, each argument in declared
/// order, then array lengths against their count parameters.
pub fn validate_args(
    proc_name: &str,
    params: &[ParamSpec],
    args: &[Value],
    objects: &dyn ObjectResolver,
) -> Result<(), PdbError> {
    if args.len() != params.len() {
        return Err(PdbError::arg_count(proc_name, params.len(), args.len()));
    }

    for (index, (value, spec)) in args.iter().zip(params).enumerate() {
        validate(proc_name, index, value, spec, objects)?;

        if let Some(count_name) = &spec.sized_by {
            let count = params[..index].iter()
                .position(|p| &p.name == count_name)
                .and_then(|i| args[i].as_int());
            let len = value.len().unwrap_or(0);
            match count {
                Some(n) if n >= 0 && n as usize == len => {}
                Some(n) => {
                    return Err(PdbError::bad_length(proc_name, index, &spec.name,
                        format!("holds {} elements but '{}' is {}", len, count_name, n)));
                }
                None => {
                    return Err(PdbError::internal(format!(
                        "{}: '{}' is sized by unknown parameter '{}'", proc_name, spec.name, count_name)));
                }
            }
        }
    }

    Ok(())
}

/// Compare returned values against the declared return signature.
///
/// Returns one description per mismatch; callers log these rather than
/// failing the call.
pub fn check_returns(params: &[ParamSpec], values: &[Value]) -> Vec<String> {
    let mut problems = Vec::new();
    if values.len() != params.len() {
        problems.push(format!("declared {} return values, got {}", params.len(), values.len()));
    }
    for (index, (value, spec)) in values.iter().zip(params).enumerate() {
        if !tag_matches(spec.arg_type, value) {
            problems.push(format!("return {} '{}': expected {}, got {}",
                index + 1, spec.name, spec.arg_type, value.type_name()));
        }
    }
    problems
}
