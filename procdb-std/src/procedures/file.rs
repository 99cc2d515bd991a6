//! File procedures
//!
//! Loading and saving are forwarded to whichever procedure registered
//! itself for the filename. Save handlers often take extra trailing
//! options, which are filled in with their defaults.

use super::prelude::*;
use procdb::{split_list, FileHandler};

pub struct RegisterLoadHandler;
pub struct RegisterSaveHandler;
pub struct FileLoad;
pub struct FileSave;
pub struct TempName;

fn run_mode() -> ParamSpec {
    ParamSpec::int32("run-mode", "The run mode: interactive (0), non-interactive (1), last values (2)")
        .int_range(0, 2)
}

fn handler_params(def: ProcDef) -> ProcDef {
    def.param(ParamSpec::string("procedure-name", "The name of the procedure to be used"))
        .param(ParamSpec::string("extensions", "Comma separated list of extensions this handler recognizes"))
        .param(ParamSpec::string("prefixes", "Comma separated list of prefixes this handler recognizes"))
}

fn handler_from(call: &CallContext, args: &[Value]) -> Result<FileHandler, ProcError> {
    let procedure = str_arg(args, 0)?;
    if !call.session().registry().contains(procedure) {
        return Err(ProcError::execution(format!("no procedure named '{}'", procedure)));
    }
    Ok(FileHandler {
        procedure: procedure.to_string(),
        extensions: split_list(str_arg(args, 1)?),
        prefixes: split_list(str_arg(args, 2)?),
    })
}

#[async_trait]
impl Invoker for RegisterLoadHandler {
    fn def(&self) -> ProcDef {
        handler_params(def("register-load-handler", "Registers a file load handler procedure"))
    }

    async fn invoke(&self, call: &CallContext, args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
        let handler = handler_from(call, &args)?;
        tracing::info!(procedure = %handler.procedure, extensions = ?handler.extensions, "load handler registered");
        call.session().file_handlers().register_load(handler);
        Ok(vec![])
    }
}

#[async_trait]
impl Invoker for RegisterSaveHandler {
    fn def(&self) -> ProcDef {
        handler_params(def("register-save-handler", "Registers a file save handler procedure"))
    }

    async fn invoke(&self, call: &CallContext, args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
        let handler = handler_from(call, &args)?;
        tracing::info!(procedure = %handler.procedure, extensions = ?handler.extensions, "save handler registered");
        call.session().file_handlers().register_save(handler);
        Ok(vec![])
    }
}

#[async_trait]
impl Invoker for FileLoad {
    fn def(&self) -> ProcDef {
        def("file-load", "Loads an image file by invoking the right load handler")
            .help("The handler is picked from the filename's prefix or extension")
            .param(run_mode())
            .param(ParamSpec::string("filename", "The name of the file to load"))
            .param(ParamSpec::string("raw-filename", "The name as entered by the user"))
            .ret(ParamSpec::new("image", ArgType::Image, "The output image"))
    }

    async fn invoke(&self, call: &CallContext, args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
        let filename = str_arg(&args, 1)?;
        let procedure = call.session().file_handlers().find_load(filename)
            .ok_or_else(|| ProcError::execution(format!("unknown file type: {}", filename)))?;
        tracing::debug!(%procedure, filename, "forwarding load");

        let returns = call.execute_with_defaults(&procedure, args).await.into_values()?;
        match returns.into_iter().next() {
            Some(image) if image.arg_type() == ArgType::Image => Ok(vec![image]),
            _ => Err(ProcError::execution(format!("{} did not return an image", procedure))),
        }
    }
}

#[async_trait]
impl Invoker for FileSave {
    fn def(&self) -> ProcDef {
        def("file-save", "Saves a file by invoking the right save handler")
            .param(run_mode())
            .param(ParamSpec::new("image", ArgType::Image, "Input image"))
            .param(ParamSpec::new("drawable", ArgType::Drawable, "Drawable to save"))
            .param(ParamSpec::string("filename", "The name of the file to save the image in"))
            .param(ParamSpec::string("raw-filename", "The name as entered by the user"))
    }

    async fn invoke(&self, call: &CallContext, args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
        let filename = str_arg(&args, 3)?;
        let procedure = call.session().file_handlers().find_save(filename)
            .ok_or_else(|| ProcError::execution(format!("unknown file type: {}", filename)))?;
        tracing::debug!(%procedure, filename, "forwarding save");

        call.execute_with_defaults(&procedure, args).await.into_values()?;
        Ok(vec![])
    }
}

#[async_trait]
impl Invoker for TempName {
    fn def(&self) -> ProcDef {
        def("temp-name", "Generates a unique filename in the temporary directory")
            .param(ParamSpec::string("extension", "The extension the file will have"))
            .ret(ParamSpec::string("name", "The new temp filename"))
    }

    async fn invoke(&self, call: &CallContext, args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
        Ok(vec![Value::String(call.session().temp_name(str_arg(&args, 0)?))])
    }
}
