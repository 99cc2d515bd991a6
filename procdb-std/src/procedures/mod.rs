//! Standard procedures, grouped by what they act on

mod buffer;
mod context;
mod file;
mod image;
mod palette;
mod pdb;
mod undo;

pub use buffer::{BufferDelete, BufferGetHeight, BufferGetWidth, BufferRename, BuffersGetList};
pub use context::{ContextGetForeground, ContextPop, ContextPush, ContextSetForeground};
pub use file::{FileLoad, FileSave, RegisterLoadHandler, RegisterSaveHandler, TempName};
pub use image::{
    ChannelGetColor, ChannelGetOpacity, ChannelNew, ChannelSetColor, ChannelSetOpacity, ImageDelete,
    ImageList, ImageNew, ItemDelete, ItemIsValid, LayerNew,
};
pub use palette::{PaletteGetColumns, PaletteNew, PaletteSetColumns};
pub use pdb::{PdbProcArg, PdbProcExists, PdbProcInfo, PdbProcVal, PdbQuery};
pub use undo::{ImageUndoGroupEnd, ImageUndoGroupStart};

/// Common imports for procedure modules
pub(crate) mod prelude {
    pub use async_trait::async_trait;
    pub use procdb::{CallContext, Invoker};
    pub use procdb_core::{ArgType, Color, ObjectKind, ParamSpec, PdbError, ProcDef, ProcError, ProcedureKind, Value};

    pub(crate) use super::{color_arg, def, float_arg, int_arg, object_arg, str_arg};
}

use procdb_core::{Color, PdbError, ProcDef, ProcError, ProcedureKind, Value};

/// Internal procedure skeleton with the standard attribution
pub(crate) fn def(name: &str, blurb: &str) -> ProcDef {
    ProcDef::new(name, ProcedureKind::Internal)
        .blurb(blurb)
        .attribution("procdb", "procdb authors", "2026")
}

// Arguments are validated before a handler runs, so these only fail if a
// handler's signature and body disagree.

fn unexpected(args: &[Value], index: usize, expected: &str) -> ProcError {
    let got = args.get(index).map(|v| v.type_name()).unwrap_or("nothing");
    ProcError::Calling(PdbError::internal(format!(
        "argument {} should be {}, got {}", index + 1, expected, got)))
}

pub(crate) fn int_arg(args: &[Value], index: usize) -> Result<i32, ProcError> {
    args.get(index).and_then(|v| v.as_int()).ok_or_else(|| unexpected(args, index, "INT32"))
}

pub(crate) fn float_arg(args: &[Value], index: usize) -> Result<f64, ProcError> {
    args.get(index).and_then(|v| v.as_float()).ok_or_else(|| unexpected(args, index, "FLOAT"))
}

pub(crate) fn str_arg(args: &[Value], index: usize) -> Result<&str, ProcError> {
    args.get(index).and_then(|v| v.as_str()).ok_or_else(|| unexpected(args, index, "STRING"))
}

pub(crate) fn color_arg(args: &[Value], index: usize) -> Result<Color, ProcError> {
    args.get(index).and_then(|v| v.as_color()).ok_or_else(|| unexpected(args, index, "COLOR"))
}

pub(crate) fn object_arg(args: &[Value], index: usize) -> Result<i32, ProcError> {
    args.get(index).and_then(|v| v.object_id()).ok_or_else(|| unexpected(args, index, "an object"))
}
