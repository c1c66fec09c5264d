//! Engine context
//!
//! One [`EngineContext`] is created at startup and passed explicitly to
//! every parse, execute, compile and run call. It owns the standard library,
//! the capability registry and the template registry; all three are
//! read-mostly and safe to share between threads running independent
//! executions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::compiler::{BytecodeProgram, Compiler, CompilerConfig, vm};
use crate::error::Result;
use crate::execution::{Budget, CancellationToken, ExecutionState, ResourceLimits};
use crate::host::{CapabilityRegistry, CapabilitySet, HostCallRecord};
use crate::language::interpreter::{self, Interpreter};
use crate::language::{Environment, Expression, Script, Stdlib, Value, parse, parse_named};
use crate::template::{Template, TemplateRegistry};

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default limits for every execution
    pub limits: ResourceLimits,
    /// Compiler settings
    pub compiler: CompilerConfig,
    /// Register the built-in templates at startup
    pub builtin_templates: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            limits: ResourceLimits::default(),
            compiler: CompilerConfig::default(),
            builtin_templates: true,
        }
    }
}

/// Per-execution inputs.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// Permissions granted to host calls made by this execution
    pub capabilities: CapabilitySet,
    /// Values bound in the global frame before the first statement
    pub bindings: BTreeMap<String, Value>,
    /// Overrides the configured limits when set
    pub limits: Option<ResourceLimits>,
    /// Cooperative cancellation flag
    pub cancellation: Option<CancellationToken>,
}

impl ExecutionOptions {
    /// Options granting nothing and binding nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant a permission.
    pub fn grant(mut self, permission: impl Into<String>) -> Self {
        self.capabilities.grant(permission);
        self
    }

    /// Bind a global input value.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.bindings.insert(name.into(), value.into());
        self
    }

    /// Override the resource limits.
    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = Some(limits);
        self
    }

    /// Attach a cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

/// Result of a successful execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionOutcome {
    /// Unique id, also present in log events
    pub execution_id: Uuid,
    /// Value of the last statement
    pub value: Value,
    /// Lines written by `print`
    pub output: Vec<String>,
    /// Every attempted host call, in order
    pub host_calls: Vec<HostCallRecord>,
    /// Steps consumed
    pub steps: u64,
}

/// Explicit engine state shared by all executions.
#[derive(Debug)]
pub struct EngineContext {
    config: EngineConfig,
    stdlib: Stdlib,
    capabilities: CapabilityRegistry,
    templates: TemplateRegistry,
}

impl EngineContext {
    /// Create an engine from `config`.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let templates = if config.builtin_templates {
            TemplateRegistry::with_builtins()?
        } else {
            TemplateRegistry::new()
        };
        Ok(Self {
            config,
            stdlib: Stdlib::standard(),
            capabilities: CapabilityRegistry::new(),
            templates,
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Standard-library table.
    pub fn stdlib(&self) -> &Stdlib {
        &self.stdlib
    }

    /// Host capability registry.
    pub fn capabilities(&self) -> &CapabilityRegistry {
        &self.capabilities
    }

    /// Template registry.
    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    /// Parse source text.
    pub fn parse(&self, source: &str) -> Result<Script> {
        Ok(parse(source)?)
    }

    /// Parse source text under a script name used in locations.
    pub fn parse_named(&self, name: &str, source: &str) -> Result<Script> {
        Ok(parse_named(name, source)?)
    }

    /// Interpret `script` directly.
    pub fn execute(&self, script: &Script, options: &ExecutionOptions) -> Result<ExecutionOutcome> {
        self.with_execution(&script.name, "interpret", options, |state| {
            interpreter::execute_script(script, &options.bindings, state)
        })
    }

    /// Evaluate a single expression against a caller-owned environment.
    ///
    /// Bindings the expression creates at the top level remain in `env`;
    /// `options.bindings` is ignored.
    pub fn evaluate(
        &self,
        expression: &Expression,
        env: &mut Environment,
        options: &ExecutionOptions,
    ) -> Result<ExecutionOutcome> {
        self.with_execution("expression", "evaluate", options, |state| {
            Interpreter::new(env, state).evaluate(expression)
        })
    }

    /// Compile `script`, declaring the permissions its host calls need.
    pub fn compile(&self, script: &Script, capabilities: &CapabilitySet) -> Result<BytecodeProgram> {
        Compiler::new(&self.config.compiler, &self.stdlib, &self.capabilities).compile(script, capabilities)
    }

    /// Execute a compiled program.
    pub fn run(&self, program: &BytecodeProgram, options: &ExecutionOptions) -> Result<ExecutionOutcome> {
        self.with_execution(&program.name, "bytecode", options, |state| {
            vm::run_program(program, &options.bindings, state)
        })
    }

    /// Register a template under its own name.
    pub fn register_template(&self, template: Template) -> Result<()> {
        self.templates.register(template)
    }

    /// Instantiate a registered template into a new script.
    pub fn instantiate_template(&self, name: &str, parameters: &BTreeMap<String, Value>) -> Result<Script> {
        self.templates.instantiate(name, parameters)
    }

    /// Register a host capability.
    pub fn register_capability<F>(
        &self,
        namespace: &str,
        function: &str,
        required_permission: &str,
        implementation: F,
    ) -> Result<()>
    where
        F: Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.capabilities
            .register(namespace, function, required_permission, implementation)
    }

    /// Register a host capability, overwriting an existing one of the same name.
    pub fn replace_capability<F>(
        &self,
        namespace: &str,
        function: &str,
        required_permission: &str,
        implementation: F,
    ) -> Result<()>
    where
        F: Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.capabilities
            .replace(namespace, function, required_permission, implementation)
    }

    fn with_execution<F>(
        &self,
        name: &str,
        mode: &'static str,
        options: &ExecutionOptions,
        body: F,
    ) -> Result<ExecutionOutcome>
    where
        F: FnOnce(&mut ExecutionState<'_>) -> Result<Value>,
    {
        let execution_id = Uuid::new_v4();
        let limits = options
            .limits
            .clone()
            .unwrap_or_else(|| self.config.limits.clone());
        let budget = Budget::new(limits, options.cancellation.clone());
        let mut state = ExecutionState::new(budget, &self.stdlib, &self.capabilities, &options.capabilities);

        tracing::info!(%execution_id, script = name, mode, "execution started");
        let result = body(&mut state);
        let report = state.finish();

        match result {
            Ok(value) => {
                tracing::info!(
                    %execution_id,
                    steps = report.steps,
                    host_calls = report.host_calls.len(),
                    "execution finished"
                );
                Ok(ExecutionOutcome {
                    execution_id,
                    value,
                    output: report.output,
                    host_calls: report.host_calls,
                    steps: report.steps,
                })
            }
            Err(err) => {
                tracing::warn!(
                    %execution_id,
                    steps = report.steps,
                    host_calls = report.host_calls.len(),
                    error = %err,
                    "execution failed"
                );
                Err(err)
            }
        }
    }
}
