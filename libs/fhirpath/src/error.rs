//! Error types for the FHIRPath evaluation core
//!
//! Only contract violations are errors. Inapplicable operands yield an empty
//! collection and semantic findings are recorded as [`crate::issue::Issue`]s.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// FHIRPath evaluation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Type error: {0}")]
    TypeError(String),

    #[error("Evaluation error: {0}")]
    EvaluationError(String),

    #[error("Function not found: {0}")]
    FunctionNotFound(String),

    #[error("Unexpected number of arguments: {actual} for function: '{name}' (expected {min}..={max})")]
    InvalidArity {
        name: String,
        min: usize,
        max: usize,
        actual: usize,
    },

    #[error("Variable not found: {0}")]
    VariableNotFound(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Context error: {0}")]
    Context(String),
}

impl Error {
    /// The standard "singleton expected" violation.
    pub(crate) fn not_singleton(function: &str, size: usize) -> Self {
        Error::InvalidArgument(format!(
            "{}: input collection has {} items, but only 1 is allowed",
            function, size
        ))
    }
}

impl From<ferrum_context::Error> for Error {
    fn from(err: ferrum_context::Error) -> Self {
        Error::Context(err.to_string())
    }
}
