//! Script evaluator
//!
//! Special forms are handled here; any other head symbol names a
//! procedure. Arguments are converted using the callee's declared
//! parameter types, so `(image-new 10 10)` passes two INT32s while
//! `(layer-new img 10 10 "bg" 100)` turns `100` into a FLOAT.

use crate::ast::{Datum, Expr};
use crate::{ScriptError, MAX_DEPTH};
use procdb::{BoxFuture, Caller, Session};
use procdb_core::{ArgType, Color, ObjectId, ParamSpec, Value};
use std::collections::HashMap;

/// Evaluation state for one script run
pub struct Evaluator {
    session: Session,
    caller: Caller,
    scopes: Vec<HashMap<String, Datum>>,
    depth: usize,
}

impl Evaluator {
    pub fn new(session: Session, caller: Caller) -> Self {
        Self { session, caller, scopes: vec![HashMap::new()], depth: 0 }
    }

    /// Evaluate forms in order, returning the last value
    pub async fn eval_all(&mut self, forms: &[Expr]) -> Result<Datum, ScriptError> {
        let mut last = Datum::nil();
        for form in forms {
            last = self.eval(form).await?;
        }
        Ok(last)
    }

    /// Innermost binding of `name`
    pub fn get(&self, name: &str) -> Option<&Datum> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    pub fn eval<'a>(&'a mut self, expr: &'a Expr) -> BoxFuture<'a, Result<Datum, ScriptError>> {
        Box::pin(async move {
            if self.depth >= MAX_DEPTH {
                return Err(ScriptError::TooDeep(MAX_DEPTH));
            }
            self.depth += 1;
            let result = self.eval_nested(expr).await;
            self.depth -= 1;
            result
        })
    }

    async fn eval_nested(&mut self, expr: &Expr) -> Result<Datum, ScriptError> {
        match expr {
            Expr::Int(n) => Ok(Datum::Int(*n)),
            Expr::Float(f) => Ok(Datum::Float(*f)),
            Expr::Str(s) => Ok(Datum::Str(s.clone())),
            Expr::Bool(b) => Ok(Datum::Bool(*b)),
            Expr::Symbol(name) => self.get(name).cloned()
                .ok_or_else(|| ScriptError::Unbound(name.clone())),
            Expr::Color(parts) => {
                let mut components = Vec::with_capacity(parts.len());
                for part in parts {
                    components.push(self.eval(part).await?);
                }
                Ok(Datum::Color(color_from(&components)?))
            }
            Expr::List(items) => match items.split_first() {
                None => Ok(Datum::nil()),
                Some((Expr::Symbol(head), rest)) => self.apply(head, rest).await,
                Some((head, _)) => Err(ScriptError::BadForm {
                    form: format!("{:?}", head),
                    reason: "only symbols can be applied".to_string(),
                }),
            },
        }
    }

    async fn apply(&mut self, head: &str, rest: &[Expr]) -> Result<Datum, ScriptError> {
        match head {
            "define" => self.define(rest).await,
            "let*" => self.let_star(rest).await,
            "begin" => self.eval_all(rest).await,
            "list" => {
                let mut items = Vec::with_capacity(rest.len());
                for item in rest {
                    items.push(self.eval(item).await?);
                }
                Ok(Datum::List(items))
            }
            "car" => {
                let list = self.list_arg(head, rest, 0, 1).await?;
                list.into_iter().next().ok_or_else(|| bad(head, "empty list"))
            }
            "cdr" => {
                let list = self.list_arg(head, rest, 0, 1).await?;
                if list.is_empty() {
                    return Err(bad(head, "empty list"));
                }
                Ok(Datum::List(list.into_iter().skip(1).collect()))
            }
            "nth" => {
                if rest.len() != 2 {
                    return Err(bad(head, "expects (nth index list)"));
                }
                let index = self.eval(&rest[0]).await?;
                let index = index.as_int().ok_or_else(|| bad(head, "index must be an integer"))?;
                let list = self.list_arg(head, rest, 1, 2).await?;
                usize::try_from(index).ok()
                    .and_then(|i| list.into_iter().nth(i))
                    .ok_or_else(|| bad(head, &format!("index {} out of range", index)))
            }
            _ => self.call(head, rest).await,
        }
    }

    async fn define(&mut self, rest: &[Expr]) -> Result<Datum, ScriptError> {
        match rest {
            [Expr::Symbol(name), value] => {
                let value = self.eval(value).await?;
                if let Some(scope) = self.scopes.last_mut() {
                    scope.insert(name.clone(), value.clone());
                }
                Ok(value)
            }
            _ => Err(bad("define", "expects (define name value)")),
        }
    }

    async fn let_star(&mut self, rest: &[Expr]) -> Result<Datum, ScriptError> {
        let (bindings, body) = match rest.split_first() {
            Some((Expr::List(bindings), body)) => (bindings, body),
            _ => return Err(bad("let*", "expects (let* ((name value) ...) body ...)")),
        };

        self.scopes.push(HashMap::new());
        let result = self.let_body(bindings, body).await;
        self.scopes.pop();
        result
    }

    async fn let_body(&mut self, bindings: &[Expr], body: &[Expr]) -> Result<Datum, ScriptError> {
        for binding in bindings {
            match binding {
                Expr::List(pair) => match pair.as_slice() {
                    [Expr::Symbol(name), value] => {
                        let value = self.eval(value).await?;
                        if let Some(scope) = self.scopes.last_mut() {
                            scope.insert(name.clone(), value);
                        }
                    }
                    _ => return Err(bad("let*", "each binding is (name value)")),
                },
                _ => return Err(bad("let*", "each binding is (name value)")),
            }
        }
        self.eval_all(body).await
    }

    async fn list_arg(&mut self, form: &str, rest: &[Expr], index: usize, arity: usize) -> Result<Vec<Datum>, ScriptError> {
        if rest.len() != arity {
            return Err(bad(form, &format!("expects {} argument(s)", arity)));
        }
        match self.eval(&rest[index]).await? {
            Datum::List(items) => Ok(items),
            other => Err(bad(form, &format!("expected a list, got {}", other.kind()))),
        }
    }

    async fn call(&mut self, name: &str, rest: &[Expr]) -> Result<Datum, ScriptError> {
        let procedure = self.session.registry().lookup(name)?;
        let params = &procedure.def.params;
        if rest.len() != params.len() {
            return Err(ScriptError::Arity {
                procedure: name.to_string(),
                expected: params.len(),
                got: rest.len(),
            });
        }

        let mut args = Vec::with_capacity(rest.len());
        for (expr, spec) in rest.iter().zip(params) {
            let datum = self.eval(expr).await?;
            args.push(marshal(name, spec, datum)?);
        }

        tracing::debug!(procedure = name, "script call");
        let result = self.session.execute_as(&self.caller, name, args).await;
        if !result.is_success() {
            return Err(ScriptError::Call {
                procedure: name.to_string(),
                status: result.status,
                message: result.message.unwrap_or_default(),
            });
        }
        Ok(Datum::List(result.returns.into_iter().map(datum_from).collect()))
    }
}

fn bad(form: &str, reason: &str) -> ScriptError {
    ScriptError::BadForm { form: form.to_string(), reason: reason.to_string() }
}

fn color_from(components: &[Datum]) -> Result<Color, ScriptError> {
    let numbers: Option<Vec<f64>> = components.iter().map(Datum::as_number).collect();
    match numbers.as_deref() {
        Some([r, g, b]) => Ok(Color::rgb(*r, *g, *b)),
        Some([r, g, b, a]) => Ok(Color::rgba(*r, *g, *b, *a)),
        _ => Err(bad("color", "expects three or four numbers")),
    }
}

/// Convert a script value to the type a parameter declares
pub fn marshal(procedure: &str, spec: &ParamSpec, datum: Datum) -> Result<Value, ScriptError> {
    let mismatch = |datum: &Datum| ScriptError::Marshal {
        procedure: procedure.to_string(),
        param: spec.name.clone(),
        reason: format!("cannot pass {} as {}", datum.kind(), spec.arg_type.name()),
    };

    if let Some(kind) = spec.arg_type.object_kind() {
        let id = datum.as_int().ok_or_else(|| mismatch(&datum))?;
        let id = i32::try_from(id).map_err(|_| mismatch(&datum))?;
        return Ok(Value::Object(ObjectId::new(kind, id)));
    }

    let value = match (spec.arg_type, &datum) {
        (ArgType::Int32, d) => d.as_int().and_then(|n| i32::try_from(n).ok()).map(Value::Int32),
        (ArgType::Float, d) => d.as_number().map(Value::Float),
        (ArgType::String, Datum::Str(s)) => Some(Value::String(s.clone())),
        (ArgType::Color, Datum::Color(c)) => Some(Value::Color(*c)),
        (ArgType::Color, Datum::List(items)) => color_from(items).ok().map(Value::Color),
        (ArgType::Int32Array, Datum::List(items)) => items.iter()
            .map(|d| d.as_int().and_then(|n| i32::try_from(n).ok()))
            .collect::<Option<Vec<_>>>()
            .map(Value::Int32Array),
        (ArgType::Int8Array, Datum::List(items)) => items.iter()
            .map(|d| d.as_int().and_then(|n| u8::try_from(n).ok()))
            .collect::<Option<Vec<_>>>()
            .map(Value::Int8Array),
        (ArgType::FloatArray, Datum::List(items)) => items.iter()
            .map(Datum::as_number)
            .collect::<Option<Vec<_>>>()
            .map(Value::FloatArray),
        (ArgType::StringArray, Datum::List(items)) => items.iter()
            .map(|d| match d {
                Datum::Str(s) => Some(s.clone()),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(Value::StringArray),
        _ => None,
    };
    value.ok_or_else(|| mismatch(&datum))
}

/// Convert a returned value back into a script value
pub fn datum_from(value: Value) -> Datum {
    match value {
        Value::Int32(n) => Datum::Int(n.into()),
        Value::Float(f) => Datum::Float(f),
        Value::String(s) => Datum::Str(s),
        Value::StringArray(items) => Datum::List(items.into_iter().map(Datum::Str).collect()),
        Value::Int32Array(items) => Datum::List(items.into_iter().map(|n| Datum::Int(n.into())).collect()),
        Value::FloatArray(items) => Datum::List(items.into_iter().map(Datum::Float).collect()),
        Value::Int8Array(items) => Datum::List(items.into_iter().map(|n| Datum::Int(n.into())).collect()),
        Value::Color(c) => Datum::Color(c),
        Value::Object(id) => Datum::Int(id.id.into()),
    }
}
