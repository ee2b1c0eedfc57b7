//! Runtime error taxonomy.
//!
//! Runtime errors never unwind through interpreter frames as panics;
//! they propagate as `Result`s up to the caller, which logs and exits
//! non-zero (CLI) or terminates the faulting process (worker).

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Type mismatch in '{op}'")]
    TypeMismatch { op: &'static str },
    #[error("Call to unknown name '{0}'")]
    UnknownCallable(String),
    #[error("Unknown signal '{0}'")]
    UnknownSignal(String),
    #[error("Nested execute of event '{0}' while it is still running")]
    NestedExecute(String),
    #[error("Array index {index} out of bounds (length {len})")]
    IndexOutOfBounds { index: i32, len: usize },
    #[error("Value is not an array")]
    NotAnArray,
    #[error("Value is not an object")]
    NotAnObject,
    #[error("Invalid constant index {0}")]
    BadConstant(i32),
}
