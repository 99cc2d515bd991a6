//! procdb-script - s-expression scripting over the procedure database
//!
//! ```ignore
//! let script = Script::new(procdb_std::standard_session()?);
//! let image = script.run("(car (image-new 640 480))").await?;
//! ```

mod ast;
mod eval;
mod parser;
mod render;

pub use ast::{Datum, Expr};
pub use eval::{datum_from, marshal, Evaluator};
pub use parser::parse;

/// Deepest list or color nesting a script may use
pub const MAX_DEPTH: usize = 256;

use procdb::{Caller, Session};
use procdb_core::{PdbError, Status};
use thiserror::Error;

/// Script failure
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("nesting deeper than {0} levels")]
    TooDeep(usize),

    #[error("unbound variable: {0}")]
    Unbound(String),

    #[error("bad {form}: {reason}")]
    BadForm { form: String, reason: String },

    #[error("{procedure} takes {expected} argument(s), got {got}")]
    Arity { procedure: String, expected: usize, got: usize },

    #[error("{procedure}: parameter '{param}': {reason}")]
    Marshal { procedure: String, param: String, reason: String },

    #[error("{procedure} failed with {status}: {message}")]
    Call { procedure: String, status: Status, message: String },

    #[error(transparent)]
    Pdb(#[from] PdbError),
}

/// Script engine bound to a session
pub struct Script {
    session: Session,
}

impl Script {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Run a script as a top-level caller, returning its last value
    pub async fn run(&self, source: &str) -> Result<Datum, ScriptError> {
        self.run_as(Caller::root(), source).await
    }

    pub async fn run_as(&self, caller: Caller, source: &str) -> Result<Datum, ScriptError> {
        let forms = parse(source)?;
        let mut evaluator = Evaluator::new(self.session.clone(), caller);
        evaluator.eval_all(&forms).await
    }
}
