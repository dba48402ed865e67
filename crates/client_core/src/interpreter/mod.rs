//! Execution of controller-supplied scripts.
//!
//! Scripts never reach a host-language `eval`. They are parsed into a small
//! expression language whose only side effects are the DOM builtins listed
//! in [`ExpressionInterpreter`].

use serde_json::Value;
use shared::error::ExecError;

mod eval;
mod lexer;
mod parser;

pub use eval::ExpressionInterpreter;

pub trait CommandInterpreter: Send + Sync {
    /// Runs `script` and returns the value of its last statement.
    fn execute(&self, script: &str) -> Result<Value, ExecError>;
}

#[cfg(test)]
#[path = "../tests/interpreter_tests.rs"]
mod tests;
