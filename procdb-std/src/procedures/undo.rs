use super::prelude::*;

pub struct ImageUndoGroupStart;
pub struct ImageUndoGroupEnd;

#[async_trait]
impl Invoker for ImageUndoGroupStart {
    fn def(&self) -> ProcDef {
        def("image-undo-group-start", "Starts a group undo")
            .help("Every call until the matching image-undo-group-end is undone as one step")
            .param(ParamSpec::new("image", ArgType::Image, "The ID of the image in which to open an undo group"))
    }

    async fn invoke(&self, call: &CallContext, args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
        let image = object_arg(&args, 0)?;
        let depth = call.objects().undo_group_start(image)
            .ok_or_else(|| ProcError::execution(format!("image {} disappeared", image)))?;
        tracing::trace!(image, depth, "undo group opened");
        Ok(vec![])
    }
}

#[async_trait]
impl Invoker for ImageUndoGroupEnd {
    fn def(&self) -> ProcDef {
        def("image-undo-group-end", "Finish a group undo")
            .param(ParamSpec::new("image", ArgType::Image, "The ID of the image in which to close an undo group"))
    }

    async fn invoke(&self, call: &CallContext, args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
        let image = object_arg(&args, 0)?;
        match call.objects().undo_group_end(image) {
            Some(_) => Ok(vec![]),
            None => Err(ProcError::execution(format!("image {} has no open undo group", image))),
        }
    }
}
