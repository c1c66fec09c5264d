//! Per-execution state: resource budget, cancellation and call dispatch
//!
//! Both execution paths (the tree-walking interpreter and the bytecode VM)
//! run against an [`ExecutionState`], so limits, output capture and the host
//! bridge behave identically regardless of how a script is executed.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::{Error, Resource, Result};
use crate::host::{CapabilityRegistry, CapabilitySet, HostCallRecord};
use crate::language::Value;
use crate::language::stdlib::{NativeContext, Stdlib};

/// Resource limits applied to every execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// Maximum evaluation steps (`None` for unlimited)
    pub max_steps: Option<u64>,
    /// Wall-clock deadline in milliseconds (`None` for unlimited)
    pub max_duration_ms: Option<u64>,
    /// Maximum nesting of scope frames
    pub max_scope_depth: usize,
    /// Maximum nesting of expressions under evaluation
    pub max_expression_depth: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_steps: Some(1_000_000),
            max_duration_ms: Some(5_000),
            max_scope_depth: 256,
            max_expression_depth: 256,
        }
    }
}

/// Cooperative cancellation flag shared between a caller and a running script.
///
/// Checked at block entry and at every loop iteration; evaluation is never
/// interrupted mid-expression.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Create an unset token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Step counter, deadline and cancellation for one execution.
#[derive(Debug)]
pub(crate) struct Budget {
    limits: ResourceLimits,
    steps: u64,
    deadline: Option<Instant>,
    cancellation: Option<CancellationToken>,
}

impl Budget {
    pub(crate) fn new(limits: ResourceLimits, cancellation: Option<CancellationToken>) -> Self {
        let deadline = limits
            .max_duration_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms));
        Self {
            limits,
            steps: 0,
            deadline,
            cancellation,
        }
    }

    /// Charge one evaluation step.
    pub(crate) fn step(&mut self) -> Result<()> {
        self.steps += 1;
        match self.limits.max_steps {
            Some(limit) if self.steps > limit => {
                tracing::warn!(limit, "step budget exhausted");
                Err(Error::ResourceExhausted {
                    resource: Resource::Steps,
                    limit,
                })
            }
            _ => Ok(()),
        }
    }

    /// Block and loop boundary: honour cancellation and the deadline.
    pub(crate) fn checkpoint(&self) -> Result<()> {
        if self
            .cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
        {
            return Err(Error::Cancelled);
        }
        if let (Some(deadline), Some(limit)) = (self.deadline, self.limits.max_duration_ms) {
            if Instant::now() >= deadline {
                tracing::warn!(limit_ms = limit, "time budget exhausted");
                return Err(Error::ResourceExhausted {
                    resource: Resource::Time,
                    limit,
                });
            }
        }
        Ok(())
    }

    /// Fail if `depth` nested frames exceeds the configured maximum.
    pub(crate) fn check_depth(&self, depth: usize) -> Result<()> {
        if depth > self.limits.max_scope_depth {
            Err(Error::ResourceExhausted {
                resource: Resource::ScopeDepth,
                limit: self.limits.max_scope_depth as u64,
            })
        } else {
            Ok(())
        }
    }

    /// Fail if evaluation has recursed past the configured expression depth.
    pub(crate) fn check_expression_depth(&self, depth: usize) -> Result<()> {
        if depth > self.limits.max_expression_depth {
            tracing::warn!(limit = self.limits.max_expression_depth, "expression depth exhausted");
            Err(Error::ResourceExhausted {
                resource: Resource::ExpressionDepth,
                limit: self.limits.max_expression_depth as u64,
            })
        } else {
            Ok(())
        }
    }

    pub(crate) fn steps(&self) -> u64 {
        self.steps
    }
}

/// What an execution produced besides its value.
#[derive(Debug, Default)]
pub(crate) struct ExecutionReport {
    pub(crate) output: Vec<String>,
    pub(crate) host_calls: Vec<HostCallRecord>,
    pub(crate) steps: u64,
}

/// Everything one execution needs from the engine, plus what it has produced so far.
pub(crate) struct ExecutionState<'a> {
    pub(crate) budget: Budget,
    stdlib: &'a Stdlib,
    host: &'a CapabilityRegistry,
    granted: &'a CapabilitySet,
    output: Vec<String>,
    host_calls: Vec<HostCallRecord>,
}

impl<'a> ExecutionState<'a> {
    pub(crate) fn new(
        budget: Budget,
        stdlib: &'a Stdlib,
        host: &'a CapabilityRegistry,
        granted: &'a CapabilitySet,
    ) -> Self {
        Self {
            budget,
            stdlib,
            host,
            granted,
            output: Vec::new(),
            host_calls: Vec::new(),
        }
    }

    /// Resolve `name` against the standard library, then the host bridge.
    pub(crate) fn call(&mut self, name: &str, args: &[Value]) -> Result<Value> {
        if let Some(native) = self.stdlib.get(name) {
            let mut ctx = NativeContext::new(&mut self.output);
            return native(&mut ctx, args);
        }
        if name.contains('.') {
            return self
                .host
                .invoke(name, args, self.granted, &mut self.host_calls);
        }
        Err(Error::NotDefined(name.to_string()))
    }

    pub(crate) fn finish(self) -> ExecutionReport {
        ExecutionReport {
            output: self.output,
            host_calls: self.host_calls,
            steps: self.budget.steps(),
        }
    }
}
