//! Host API bridge
//!
//! The only way a script reaches outside the engine. External subsystems
//! (identity, economic, governance, network and any extension namespace)
//! register `namespace.function` capabilities, each guarded by a required
//! permission. The bridge has no namespace-specific logic: every call is
//! looked up, permission-checked, invoked and audited the same way.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::language::Value;

/// Implementation of a host capability.
pub type HostFunction = Arc<dyn Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync>;

/// A permission-gated function exposed by an external subsystem.
#[derive(Clone)]
pub struct Capability {
    /// Namespace (`economic`, `identity`, ...)
    pub namespace: String,
    /// Function name within the namespace
    pub function: String,
    /// Permission the caller must hold
    pub required_permission: String,
    implementation: HostFunction,
}

impl Capability {
    /// `namespace.function`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace, self.function)
    }

    /// Invoke the implementation directly, bypassing permission checks.
    pub fn invoke(&self, args: &[Value]) -> anyhow::Result<Value> {
        (self.implementation)(args)
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capability")
            .field("namespace", &self.namespace)
            .field("function", &self.function)
            .field("required_permission", &self.required_permission)
            .finish_non_exhaustive()
    }
}

/// Permissions granted to one execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<String>);

impl CapabilitySet {
    /// An empty set: only the standard library is callable.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style grant.
    pub fn with(mut self, permission: impl Into<String>) -> Self {
        self.grant(permission);
        self
    }

    /// Add a permission.
    pub fn grant(&mut self, permission: impl Into<String>) {
        self.0.insert(permission.into());
    }

    /// Whether `permission` has been granted.
    pub fn allows(&self, permission: &str) -> bool {
        self.0.contains(permission)
    }

    /// Granted permissions in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Number of granted permissions.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing has been granted.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// How a host call ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum HostCallOutcome {
    /// Implementation returned a value.
    Returned {
        /// Returned value
        value: Value,
    },
    /// Caller lacked the required permission; the implementation did not run.
    Denied {
        /// Permission that was missing
        permission: String,
    },
    /// Implementation returned an error.
    Failed {
        /// Rendered cause chain
        cause: String,
    },
}

/// Audit entry for one attempted host call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostCallRecord {
    /// Capability namespace
    pub namespace: String,
    /// Capability function
    pub function: String,
    /// Evaluated arguments
    pub args: Vec<Value>,
    /// Result of the attempt
    pub outcome: HostCallOutcome,
}

impl HostCallRecord {
    /// `namespace.function`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace, self.function)
    }
}

/// Name-keyed registry of host capabilities.
///
/// Read-mostly: lookups take a shared lock only long enough to clone the
/// capability out, so implementations never run under the lock.
#[derive(Default)]
pub struct CapabilityRegistry {
    capabilities: RwLock<BTreeMap<String, Capability>>,
}

impl fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.capabilities.read().keys()).finish()
    }
}

impl CapabilityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability. A second registration of the same name is a conflict.
    pub fn register<F>(
        &self,
        namespace: &str,
        function: &str,
        required_permission: &str,
        implementation: F,
    ) -> Result<()>
    where
        F: Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let capability = build(namespace, function, required_permission, Arc::new(implementation))?;
        let name = capability.qualified_name();
        let mut capabilities = self.capabilities.write();
        if capabilities.contains_key(&name) {
            return Err(Error::Conflict {
                kind: "capability",
                name,
            });
        }
        tracing::debug!(capability = %name, permission = required_permission, "registered capability");
        capabilities.insert(name, capability);
        Ok(())
    }

    /// Register a capability, overwriting any existing one with the same name.
    pub fn replace<F>(
        &self,
        namespace: &str,
        function: &str,
        required_permission: &str,
        implementation: F,
    ) -> Result<()>
    where
        F: Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let capability = build(namespace, function, required_permission, Arc::new(implementation))?;
        let name = capability.qualified_name();
        if self.capabilities.write().insert(name.clone(), capability).is_some() {
            tracing::info!(capability = %name, "replaced capability");
        }
        Ok(())
    }

    /// Remove a capability, returning it if it was registered.
    pub fn remove(&self, qualified_name: &str) -> Option<Capability> {
        self.capabilities.write().remove(qualified_name)
    }

    /// Look up a capability by `namespace.function`.
    pub fn get(&self, qualified_name: &str) -> Option<Capability> {
        self.capabilities.read().get(qualified_name).cloned()
    }

    /// Whether `namespace.function` is registered.
    pub fn contains(&self, qualified_name: &str) -> bool {
        self.capabilities.read().contains_key(qualified_name)
    }

    /// Registered capability names in sorted order.
    pub fn list(&self) -> Vec<String> {
        self.capabilities.read().keys().cloned().collect()
    }

    /// Number of registered capabilities.
    pub fn len(&self) -> usize {
        self.capabilities.read().len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.capabilities.read().is_empty()
    }

    /// Permission-check and invoke `qualified_name`, appending an audit record.
    pub(crate) fn invoke(
        &self,
        qualified_name: &str,
        args: &[Value],
        granted: &CapabilitySet,
        audit: &mut Vec<HostCallRecord>,
    ) -> Result<Value> {
        let capability = self
            .get(qualified_name)
            .ok_or_else(|| Error::NotDefined(qualified_name.to_string()))?;

        let mut record = HostCallRecord {
            namespace: capability.namespace.clone(),
            function: capability.function.clone(),
            args: args.to_vec(),
            outcome: HostCallOutcome::Denied {
                permission: capability.required_permission.clone(),
            },
        };

        if !granted.allows(&capability.required_permission) {
            tracing::warn!(
                capability = qualified_name,
                permission = %capability.required_permission,
                "host call denied"
            );
            audit.push(record);
            return Err(Error::PermissionDenied {
                capability: qualified_name.to_string(),
                permission: capability.required_permission,
            });
        }

        let result = capability.invoke(args);
        match result {
            Ok(value) => {
                tracing::debug!(capability = qualified_name, "host call returned");
                record.outcome = HostCallOutcome::Returned {
                    value: value.clone(),
                };
                audit.push(record);
                Ok(value)
            }
            Err(err) => {
                let cause = format!("{:#}", err);
                tracing::warn!(capability = qualified_name, error = %cause, "host call failed");
                record.outcome = HostCallOutcome::Failed {
                    cause: cause.clone(),
                };
                audit.push(record);
                Err(Error::HostCall {
                    namespace: capability.namespace,
                    function: capability.function,
                    cause,
                })
            }
        }
    }
}

fn build(
    namespace: &str,
    function: &str,
    required_permission: &str,
    implementation: HostFunction,
) -> Result<Capability> {
    for part in [namespace, function] {
        if !is_identifier(part) {
            return Err(Error::InvalidIdentifier(part.to_string()));
        }
    }
    Ok(Capability {
        namespace: namespace.to_string(),
        function: function.to_string(),
        required_permission: required_permission.to_string(),
        implementation,
    })
}

/// Whether `name` can be written as a bare identifier in script source.
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_') && !crate::language::is_keyword(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_registry() -> (CapabilityRegistry, Arc<AtomicUsize>) {
        let registry = CapabilityRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        registry
            .register("economic", "transfer", "economic.write", move |args| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Integer(args.len() as i64))
            })
            .unwrap();
        (registry, calls)
    }

    #[test]
    fn duplicate_registration_conflicts() {
        let (registry, _) = counting_registry();
        let err = registry
            .register("economic", "transfer", "x", |_| Ok(Value::Null))
            .unwrap_err();
        assert!(matches!(err, Error::Conflict { kind: "capability", .. }));
        registry
            .replace("economic", "transfer", "x", |_| Ok(Value::Null))
            .unwrap();
        assert_eq!(registry.get("economic.transfer").unwrap().required_permission, "x");
    }

    #[test]
    fn rejects_non_identifier_names() {
        let registry = CapabilityRegistry::new();
        let err = registry
            .register("bad name", "f", "p", |_| Ok(Value::Null))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidIdentifier(_)));
        assert!(registry.register("ns", "if", "p", |_| Ok(Value::Null)).is_err());
    }

    #[test]
    fn denied_call_never_invokes_implementation() {
        let (registry, calls) = counting_registry();
        let mut audit = Vec::new();
        let err = registry
            .invoke("economic.transfer", &[], &CapabilitySet::new(), &mut audit)
            .unwrap_err();
        assert!(matches!(err, Error::PermissionDenied { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(matches!(audit[0].outcome, HostCallOutcome::Denied { .. }));
    }

    #[test]
    fn granted_call_is_audited() {
        let (registry, calls) = counting_registry();
        let granted = CapabilitySet::new().with("economic.write");
        let mut audit = Vec::new();
        let value = registry
            .invoke("economic.transfer", &[1.into(), 2.into()], &granted, &mut audit)
            .unwrap();
        assert_eq!(value, Value::Integer(2));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(audit[0].qualified_name(), "economic.transfer");
        assert_eq!(audit[0].args.len(), 2);
    }

    #[test]
    fn implementation_errors_keep_capability_name() {
        let registry = CapabilityRegistry::new();
        registry
            .register("identity", "verify", "identity.read", |_| {
                Err(anyhow::anyhow!("credential expired"))
            })
            .unwrap();
        let granted = CapabilitySet::new().with("identity.read");
        let err = registry
            .invoke("identity.verify", &[], &granted, &mut Vec::new())
            .unwrap_err();
        match err {
            Error::HostCall {
                namespace,
                function,
                cause,
            } => {
                assert_eq!((namespace.as_str(), function.as_str()), ("identity", "verify"));
                assert!(cause.contains("credential expired"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
