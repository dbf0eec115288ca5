//! The nodus dialect engine
//!
//! A small scripting language with just enough surface for the module
//! contract: assignments, attribute access, calls, literals, `assert` and
//! `print`. The engine sits behind the loader seam; loaders compile source
//! to a [`Program`], the Context executes it inside a module namespace.

pub mod interp;
pub mod lexer;
pub mod parser;
pub mod value;

pub use interp::{execute, standard_builtins, IMPORT_STAR};
pub use parser::{parse, Expr, Program, Stmt, Target};
pub use value::{Builtin, ObjectRef, Value};

use crate::error::ExecError;

/// Compile dialect source into an executable program.
pub fn compile(source: &str) -> Result<Program, ExecError> {
    parser::parse(source)
}
