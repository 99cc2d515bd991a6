//! Named buffers

use super::prelude::*;
use regex::Regex;

pub struct BuffersGetList;
pub struct BufferRename;
pub struct BufferDelete;
pub struct BufferGetWidth;
pub struct BufferGetHeight;

fn buffer_name() -> ParamSpec {
    ParamSpec::string("buffer-name", "The buffer name")
}

fn missing(name: &str) -> ProcError {
    ProcError::execution(format!("no buffer named '{}'", name))
}

#[async_trait]
impl Invoker for BuffersGetList {
    fn def(&self) -> ProcDef {
        def("buffers-get-list", "Retrieve a complete listing of the available buffers")
            .param(ParamSpec::string("filter", "An optional regular expression used to filter the list"))
            .ret(ParamSpec::int32("num-buffers", "The number of buffers"))
            .ret(ParamSpec::new("buffer-list", ArgType::StringArray, "The list of buffer names")
                .sized_by("num-buffers"))
    }

    async fn invoke(&self, call: &CallContext, args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
        let filter = str_arg(&args, 0)?;
        let mut names = call.objects().buffer_names();
        if !filter.is_empty() {
            let re = Regex::new(filter)
                .map_err(|e| ProcError::execution(format!("invalid filter: {}", e)))?;
            names.retain(|name| re.is_match(name));
        }
        Ok(vec![Value::Int32(names.len() as i32), Value::StringArray(names)])
    }
}

#[async_trait]
impl Invoker for BufferRename {
    fn def(&self) -> ProcDef {
        def("buffer-rename", "Renames a named buffer")
            .param(buffer_name())
            .param(ParamSpec::string("new-name", "The buffer's new name"))
            .ret(ParamSpec::string("real-name", "The real name given to the buffer"))
    }

    async fn invoke(&self, call: &CallContext, args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
        let old = str_arg(&args, 0)?;
        let new = str_arg(&args, 1)?;
        if new.is_empty() {
            return Err(ProcError::execution("buffer names cannot be empty"));
        }
        let real = call.objects().rename_buffer(old, new).ok_or_else(|| missing(old))?;
        Ok(vec![Value::String(real)])
    }
}

#[async_trait]
impl Invoker for BufferDelete {
    fn def(&self) -> ProcDef {
        def("buffer-delete", "Deletes a named buffer")
            .param(buffer_name())
    }

    async fn invoke(&self, call: &CallContext, args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
        let name = str_arg(&args, 0)?;
        if call.objects().delete_buffer(name) {
            Ok(vec![])
        } else {
            Err(missing(name))
        }
    }
}

#[async_trait]
impl Invoker for BufferGetWidth {
    fn def(&self) -> ProcDef {
        def("buffer-get-width", "Retrieves the specified buffer's width")
            .param(buffer_name())
            .ret(ParamSpec::int32("width", "The buffer width"))
    }

    async fn invoke(&self, call: &CallContext, args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
        let name = str_arg(&args, 0)?;
        let buffer = call.objects().buffer(name).ok_or_else(|| missing(name))?;
        Ok(vec![Value::Int32(buffer.width)])
    }
}

#[async_trait]
impl Invoker for BufferGetHeight {
    fn def(&self) -> ProcDef {
        def("buffer-get-height", "Retrieves the specified buffer's height")
            .param(buffer_name())
            .ret(ParamSpec::int32("height", "The buffer height"))
    }

    async fn invoke(&self, call: &CallContext, args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
        let name = str_arg(&args, 0)?;
        let buffer = call.objects().buffer(name).ok_or_else(|| missing(name))?;
        Ok(vec![Value::Int32(buffer.height)])
    }
}
