//! Script to bytecode compilation
//!
//! Compilation runs in two phases: an optional optimization pass over the
//! AST, then emission of a flat instruction stream with a constant pool.
//! Host calls are validated against the declared capability set before any
//! code is emitted, so a program that compiles never reaches the bridge with
//! a capability it did not declare.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::host::{CapabilityRegistry, CapabilitySet};
use crate::language::{MAX_NESTING_DEPTH, Script, Stdlib};

/// Bytecode types
pub mod bytecode;
mod emit;
mod optimize;
pub(crate) mod vm;

pub use bytecode::{BytecodeProgram, Op, SourceMapEntry};

/// Compiler settings. Part of every program's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// 0 disables optimization; 1 and above fold constants and drop dead branches.
    pub optimization_level: u8,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            optimization_level: 1,
        }
    }
}

/// Compiles scripts against a stdlib table and capability registry.
pub struct Compiler<'a> {
    config: &'a CompilerConfig,
    stdlib: &'a Stdlib,
    host: &'a CapabilityRegistry,
}

impl<'a> Compiler<'a> {
    /// Create a compiler.
    pub fn new(config: &'a CompilerConfig, stdlib: &'a Stdlib, host: &'a CapabilityRegistry) -> Self {
        Self {
            config,
            stdlib,
            host,
        }
    }

    /// Compile `script`, declaring the permissions its host calls may use.
    ///
    /// Output is a pure function of the script, the declared set and the
    /// compiler configuration.
    pub fn compile(&self, script: &Script, capabilities: &CapabilitySet) -> Result<BytecodeProgram> {
        if script.depth() > MAX_NESTING_DEPTH {
            return Err(Error::compile(format!(
                "expression nested more than {} levels deep",
                MAX_NESTING_DEPTH
            )));
        }
        self.validate_calls(script, capabilities)?;

        let optimized;
        let source = if self.config.optimization_level > 0 {
            optimized = optimize::optimize(script);
            &optimized
        } else {
            script
        };

        let emitted = emit::Emitter::new().emit_script(source)?;
        let program = BytecodeProgram {
            name: script.name.clone(),
            config: self.config.clone(),
            capabilities: capabilities.clone(),
            code: emitted.code,
            constants: emitted.constants,
            source_map: emitted.source_map,
        };
        tracing::debug!(
            script = %program.name,
            ops = program.code.len(),
            constants = program.constants.len(),
            "compiled script"
        );
        Ok(program)
    }

    fn validate_calls(&self, script: &Script, capabilities: &CapabilitySet) -> Result<()> {
        for (name, _) in script.calls() {
            if self.stdlib.contains(name) {
                continue;
            }
            let capability = self
                .host
                .get(name)
                .ok_or_else(|| Error::compile(format!("call to unknown function '{}'", name)))?;
            if !capabilities.allows(&capability.required_permission) {
                return Err(Error::compile(format!(
                    "capability '{}' requires permission '{}', which is not declared",
                    name, capability.required_permission
                )));
            }
        }
        Ok(())
    }
}
