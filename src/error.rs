//! Error types for the Accord engine
//!
//! Every failure is a returned value. Parse and compile errors are raised
//! before any host capability runs; runtime errors abort the current
//! top-level execution and are handed back to the caller unchanged.

use std::fmt;
use thiserror::Error;

use crate::language::ast::SourceLocation;

/// Syntax error with the exact location of the offending input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// Where the error was detected
    pub location: SourceLocation,
    /// Human-readable description
    pub message: String,
}

impl ParseError {
    /// Construct a parse error at `location`.
    pub fn new(location: SourceLocation, message: impl Into<String>) -> Self {
        Self {
            location,
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}",
            self.location.file, self.location.start_line, self.location.start_column, self.message
        )
    }
}

impl std::error::Error for ParseError {}

/// Budget dimension that ran out during an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// Evaluation step counter
    Steps,
    /// Wall-clock deadline
    Time,
    /// Nested scope depth
    ScopeDepth,
    /// Nested expression depth
    ExpressionDepth,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Steps => write!(f, "step"),
            Resource::Time => write!(f, "time"),
            Resource::ScopeDepth => write!(f, "scope depth"),
            Resource::ExpressionDepth => write!(f, "expression depth"),
        }
    }
}

/// Top-level engine error
#[derive(Debug, Error)]
pub enum Error {
    /// Source text could not be parsed
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Script could not be compiled to bytecode
    #[error("Compile error: {reason}")]
    Compile {
        /// Why compilation was rejected
        reason: String,
    },

    /// Operand or argument of the wrong type
    #[error("Type error: {0}")]
    Type(String),

    /// Variable or function name that is not bound
    #[error("'{0}' is not defined")]
    NotDefined(String),

    /// Caller lacks the permission a capability requires
    #[error("Permission denied: capability '{capability}' requires '{permission}'")]
    PermissionDenied {
        /// Fully-qualified capability name (`namespace.function`)
        capability: String,
        /// Permission that was not granted
        permission: String,
    },

    /// Division by zero, integer overflow, and similar
    #[error("Arithmetic error: {0}")]
    Arithmetic(String),

    /// Execution exceeded its resource budget
    #[error("Resource exhausted: {resource} limit of {limit} exceeded")]
    ResourceExhausted {
        /// Budget dimension that ran out
        resource: Resource,
        /// Configured limit for that dimension
        limit: u64,
    },

    /// Caller requested cancellation
    #[error("Execution cancelled")]
    Cancelled,

    /// Array or string index outside the valid range
    #[error("Index {index} out of bounds for length {len}")]
    IndexOutOfBounds {
        /// Requested index
        index: i64,
        /// Length of the indexed value
        len: usize,
    },

    /// Required template parameter was not supplied
    #[error("Template '{template}' is missing required parameter '{parameter}'")]
    MissingParameter {
        /// Template being instantiated
        template: String,
        /// Missing parameter name
        parameter: String,
    },

    /// Supplied template parameter does not match its declared type
    #[error("Parameter '{parameter}' expects {expected}, found {found}")]
    TypeMismatch {
        /// Parameter name
        parameter: String,
        /// Declared type tag
        expected: String,
        /// Description of the supplied value
        found: String,
    },

    /// Parameter supplied that the template does not declare
    #[error("Template '{template}' has no parameter '{parameter}'")]
    UnknownParameter {
        /// Template being instantiated
        template: String,
        /// Undeclared parameter name
        parameter: String,
    },

    /// Template name not registered
    #[error("Template '{0}' not found")]
    UnknownTemplate(String),

    /// Template definition failed validation
    #[error("Invalid template '{name}': {detail}")]
    InvalidTemplate {
        /// Template name
        name: String,
        /// What is wrong with it
        detail: String,
    },

    /// Name already registered
    #[error("{kind} '{name}' is already registered")]
    Conflict {
        /// Registry kind ("template", "capability")
        kind: &'static str,
        /// Conflicting name
        name: String,
    },

    /// Name that cannot be referenced from a script
    #[error("'{0}' is not a valid identifier")]
    InvalidIdentifier(String),

    /// JSON encoding or decoding failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Host capability implementation failed
    #[error("Host call {namespace}.{function} failed: {cause}")]
    HostCall {
        /// Capability namespace
        namespace: String,
        /// Capability function
        function: String,
        /// Rendered cause chain from the implementation
        cause: String,
    },
}

impl Error {
    /// Shorthand for a [`Error::Type`] error.
    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        Error::Type(message.into())
    }

    /// Shorthand for an [`Error::Arithmetic`] error.
    pub(crate) fn arithmetic(message: impl Into<String>) -> Self {
        Error::Arithmetic(message.into())
    }

    /// Shorthand for an [`Error::Compile`] error.
    pub(crate) fn compile(reason: impl Into<String>) -> Self {
        Error::Compile {
            reason: reason.into(),
        }
    }
}

/// Result type using the engine [`Error`]
pub type Result<T> = std::result::Result<T, Error>;
