//! Accord – a capability-gated policy and contract language engine
//!
//! Cooperating organizations encode governance rules and economic agreements
//! as small scripts that run under strict resource and permission limits.
//! This crate provides:
//! - A lexer and parser producing an immutable [`Script`] with source locations
//! - A lexically scoped tree-walking interpreter
//! - A deterministic bytecode compiler and stack VM with the same semantics
//! - Parameterized templates that instantiate into scripts
//! - A host API bridge that permission-checks every call into external subsystems
//!
//! Everything is reached through an explicit [`EngineContext`]:
//!
//! ```
//! use accord::{EngineConfig, EngineContext, ExecutionOptions};
//!
//! let engine = EngineContext::new(EngineConfig::default())?;
//! let script = engine.parse("x = 10\ny = 20\nprint(x + y)")?;
//! let outcome = engine.execute(&script, &ExecutionOptions::new())?;
//! assert_eq!(outcome.output, vec!["30".to_string()]);
//! # Ok::<(), accord::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Bytecode compiler and VM
pub mod compiler;
/// Engine context and execution options
pub mod engine;
/// Error types
pub mod error;
/// Resource limits and cancellation
pub mod execution;
/// Host API bridge
pub mod host;
/// Language front end, value model and interpreter
pub mod language;
/// Script templates
pub mod template;

// Re-export key types for convenience
pub use compiler::{BytecodeProgram, CompilerConfig};
pub use engine::{EngineConfig, EngineContext, ExecutionOptions, ExecutionOutcome};
pub use error::{Error, ParseError, Resource, Result};
pub use execution::{CancellationToken, ResourceLimits};
pub use host::{Capability, CapabilityRegistry, CapabilitySet, HostCallOutcome, HostCallRecord};
pub use language::{Expression, Script, SourceLocation, Statement, Value, parse, parse_named};
pub use template::{ParameterType, Template, TemplateParameter, TemplateRegistry};

/// Current version of the Accord engine
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
