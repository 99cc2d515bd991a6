//! Introspection of the procedure database itself

use super::prelude::*;
use std::sync::Arc;

pub struct PdbProcExists;
pub struct PdbQuery;
pub struct PdbProcInfo;
pub struct PdbProcArg;
pub struct PdbProcVal;

fn procedure_name() -> ParamSpec {
    ParamSpec::string("procedure-name", "The procedure name")
}

fn find(call: &CallContext, name: &str) -> Result<Arc<procdb::Procedure>, ProcError> {
    call.session().registry().lookup(name)
        .map_err(|e| ProcError::execution(e.to_string()))
}

#[async_trait]
impl Invoker for PdbProcExists {
    fn def(&self) -> ProcDef {
        def("pdb-proc-exists", "Checks if the specified procedure exists in the procedural database")
            .param(procedure_name())
            .ret(ParamSpec::int32("exists", "Whether a procedure of that name is registered").int_range(0, 1))
    }

    async fn invoke(&self, call: &CallContext, args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
        let name = str_arg(&args, 0)?;
        Ok(vec![Value::from(call.session().registry().contains(name))])
    }
}

#[async_trait]
impl Invoker for PdbQuery {
    fn def(&self) -> ProcDef {
        def("pdb-query", "Queries the procedural database for its contents using regular expression matching")
            .help("Matches against procedure names and blurbs; an empty pattern matches everything")
            .param(ParamSpec::string("pattern", "Regular expression"))
            .ret(ParamSpec::int32("num-matches", "The number of matching procedures"))
            .ret(ParamSpec::new("procedure-names", ArgType::StringArray, "The list of procedure names")
                .sized_by("num-matches"))
    }

    async fn invoke(&self, call: &CallContext, args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
        let pattern = str_arg(&args, 0)?;
        let names = call.session().registry().query(pattern)
            .map_err(|e| ProcError::execution(format!("invalid pattern: {}", e)))?;
        Ok(vec![Value::Int32(names.len() as i32), Value::StringArray(names)])
    }
}

#[async_trait]
impl Invoker for PdbProcInfo {
    fn def(&self) -> ProcDef {
        def("pdb-proc-info", "Queries the procedural database for information on the specified procedure")
            .param(procedure_name())
            .ret(ParamSpec::string("blurb", "A short blurb"))
            .ret(ParamSpec::string("help", "Detailed procedure help"))
            .ret(ParamSpec::string("author", "Author(s) of the procedure"))
            .ret(ParamSpec::string("copyright", "The copyright"))
            .ret(ParamSpec::string("date", "Copyright date"))
            .ret(ParamSpec::int32("proc-type", "The procedure type").int_range(0, 3))
            .ret(ParamSpec::int32("num-args", "The number of input arguments"))
            .ret(ParamSpec::int32("num-values", "The number of return values"))
    }

    async fn invoke(&self, call: &CallContext, args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
        let proc = find(call, str_arg(&args, 0)?)?;
        let def = &proc.def;
        Ok(vec![
            def.blurb.clone().into(),
            def.help.clone().into(),
            def.author.clone().into(),
            def.copyright.clone().into(),
            def.date.clone().into(),
            Value::Int32(def.kind.code() as i32),
            Value::Int32(def.params.len() as i32),
            Value::Int32(def.returns.len() as i32),
        ])
    }
}

fn slot_def(name: &str, blurb: &str, which: &str) -> ProcDef {
    def(name, blurb)
        .param(procedure_name())
        .param(ParamSpec::int32(which, "The slot number, starting at 0"))
        .ret(ParamSpec::int32("type", "The type code of the slot"))
        .ret(ParamSpec::string("name", "The name of the slot"))
        .ret(ParamSpec::string("description", "A description of the slot"))
}

fn describe_slot(slots: &[ParamSpec], index: i32, procedure: &str) -> Result<Vec<Value>, ProcError> {
    let spec = usize::try_from(index).ok()
        .and_then(|i| slots.get(i))
        .ok_or_else(|| ProcError::execution(format!("{} has no slot {}", procedure, index)))?;
    Ok(vec![
        Value::Int32(spec.arg_type.code() as i32),
        spec.name.clone().into(),
        spec.description.clone().into(),
    ])
}

#[async_trait]
impl Invoker for PdbProcArg {
    fn def(&self) -> ProcDef {
        slot_def("pdb-proc-arg", "Queries the procedural database for information on one argument", "arg-num")
    }

    async fn invoke(&self, call: &CallContext, args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
        let proc = find(call, str_arg(&args, 0)?)?;
        describe_slot(&proc.def.params, int_arg(&args, 1)?, proc.name())
    }
}

#[async_trait]
impl Invoker for PdbProcVal {
    fn def(&self) -> ProcDef {
        slot_def("pdb-proc-val", "Queries the procedural database for information on one return value", "val-num")
    }

    async fn invoke(&self, call: &CallContext, args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
        let proc = find(call, str_arg(&args, 0)?)?;
        describe_slot(&proc.def.returns, int_arg(&args, 1)?, proc.name())
    }
}
