//! procdb Core - Fundamental types
//!
//! This crate provides the type system shared by every procdb crate:
//! - `Value` / `ArgType`: tagged argument values and their wire tags
//! - `ParamSpec` / `ProcDef`: procedure signatures with constraints
//! - `validate`: contract checks run before any handler
//! - `ProcResult` / `PdbError`: call outcomes and structured errors
//! - collaborator interfaces: live objects, context, progress

mod types;
mod value;
mod procdef;
mod error;
mod status;
mod validate;
mod defaults;
mod objects;
mod context;
mod progress;

pub use types::{ArgType, ObjectKind, ProcedureKind};
pub use value::{Color, ObjectId, Value};
pub use procdef::{Constraint, ParamSpec, ProcDef};
pub use error::{codes, ParamRef, PdbError};
pub use status::{ProcError, ProcResult, Status};
pub use validate::{check_returns, validate, validate_args};
pub use defaults::{default_for, fill_defaults};
pub use objects::{Buffer, ObjectInfo, ObjectResolver, ObjectStore, Palette};
pub use context::{Context, ContextKey};
pub use progress::{cancelled, Progress, ProgressHandle, ProgressState};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        ArgType, Color, ObjectId, ObjectKind, ParamSpec, PdbError, ProcDef, ProcError,
        ProcResult, ProcedureKind, Status, Value,
    };
    pub use crate::error::codes;
}
