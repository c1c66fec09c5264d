//! Parameterized script templates
//!
//! A template is a script blueprint with `{{name}}` placeholders and a typed
//! parameter list. Instantiation validates the supplied parameters, fills in
//! defaults, substitutes each placeholder with the literal rendering of its
//! value and parses the result. Nothing is registered or produced unless
//! every step succeeds.

use chrono::{DateTime, NaiveDate};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io;

use crate::error::{Error, Result};
use crate::host::is_identifier;
use crate::language::{Script, Value, parse_named};

/// Built-in governance and economic templates
pub mod builtin;

/// Declared type of a template parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    /// Any string
    String,
    /// Floating-point number; integers are accepted and widened
    Number,
    /// Integer
    Integer,
    /// Boolean
    Boolean,
    /// Object
    Object,
    /// Array
    Array,
    /// Decentralized identifier string (`did:...`)
    Address,
    /// RFC 3339 timestamp or `YYYY-MM-DD` date string
    Date,
    /// One of a fixed set of strings
    Select(Vec<String>),
}

impl std::fmt::Display for ParameterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParameterType::String => f.write_str("string"),
            ParameterType::Number => f.write_str("number"),
            ParameterType::Integer => f.write_str("integer"),
            ParameterType::Boolean => f.write_str("boolean"),
            ParameterType::Object => f.write_str("object"),
            ParameterType::Array => f.write_str("array"),
            ParameterType::Address => f.write_str("address"),
            ParameterType::Date => f.write_str("date"),
            ParameterType::Select(options) => write!(f, "one of [{}]", options.join(", ")),
        }
    }
}

impl ParameterType {
    /// Check `value` against this type, returning the value to substitute.
    fn accept(&self, value: &Value) -> std::result::Result<Value, String> {
        let text = value.as_str();
        let ok = match (self, value) {
            (ParameterType::String, Value::String(_))
            | (ParameterType::Integer, Value::Integer(_))
            | (ParameterType::Boolean, Value::Boolean(_))
            | (ParameterType::Object, Value::Object(_))
            | (ParameterType::Array, Value::Array(_)) => true,
            (ParameterType::Number, Value::Number(num)) => num.is_finite(),
            (ParameterType::Number, Value::Integer(num)) => return Ok(Value::Number(*num as f64)),
            (ParameterType::Address, Value::String(_)) => text.is_some_and(is_did),
            (ParameterType::Date, Value::String(_)) => text.is_some_and(is_date),
            (ParameterType::Select(options), Value::String(choice)) => options.contains(choice),
            _ => false,
        };
        if ok {
            return Ok(value.clone());
        }
        // string-shaped types report the offending text rather than its kind
        let checks_content = matches!(
            self,
            ParameterType::Address | ParameterType::Date | ParameterType::Select(_)
        );
        Err(match value {
            Value::String(_) if checks_content => value.render(),
            _ => value.type_name().to_string(),
        })
    }
}

fn is_did(text: &str) -> bool {
    text.strip_prefix("did:").is_some_and(|rest| !rest.is_empty())
}

fn is_date(text: &str) -> bool {
    DateTime::parse_from_rfc3339(text).is_ok() || NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok()
}

/// One declared template parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateParameter {
    /// Placeholder name
    pub name: String,
    /// Declared type
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    /// What the parameter means
    #[serde(default)]
    pub description: String,
    /// Whether instantiation fails without it
    #[serde(default)]
    pub required: bool,
    /// Value used when the parameter is not supplied
    #[serde(default, rename = "default", skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

impl TemplateParameter {
    /// Required parameter with no default.
    pub fn required(name: impl Into<String>, param_type: ParameterType) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: String::new(),
            required: true,
            default_value: None,
        }
    }

    /// Optional parameter, with a default if one is given.
    pub fn optional(name: impl Into<String>, param_type: ParameterType, default_value: Option<Value>) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: String::new(),
            required: false,
            default_value,
        }
    }

    /// Attach a description.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Named, parameterized script blueprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    /// Unique name
    pub name: String,
    /// One-line summary
    #[serde(default)]
    pub description: String,
    /// Declared parameters, in order
    #[serde(default)]
    pub parameters: Vec<TemplateParameter>,
    /// Script source with `{{name}}` placeholders
    pub script_template: String,
    /// Longer documentation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
    /// Categorization tags
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Template {
    /// Template with no parameters, documentation or tags.
    pub fn new(name: impl Into<String>, script_template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            parameters: Vec::new(),
            script_template: script_template.into(),
            documentation: None,
            tags: Vec::new(),
        }
    }

    /// Builder-style parameter declaration.
    pub fn with_parameter(mut self, parameter: TemplateParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Names referenced by `{{name}}` placeholders, in first-use order.
    pub fn placeholders(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut names = Vec::new();
        scan_placeholders(&self.script_template, |name| {
            if seen.insert(name.to_string()) {
                names.push(name.to_string());
            }
            None
        });
        names
    }

    /// Check the template is well-formed without registering it.
    pub fn validate(&self) -> Result<()> {
        let invalid = |detail: String| Error::InvalidTemplate {
            name: self.name.clone(),
            detail,
        };
        if !is_identifier(&self.name) {
            return Err(Error::InvalidIdentifier(self.name.clone()));
        }
        let mut declared = BTreeSet::new();
        for param in &self.parameters {
            if !is_identifier(&param.name) {
                return Err(invalid(format!("parameter name '{}' is not an identifier", param.name)));
            }
            if !declared.insert(param.name.as_str()) {
                return Err(invalid(format!("parameter '{}' declared twice", param.name)));
            }
            if let Some(default) = &param.default_value {
                param.param_type.accept(default).map_err(|found| {
                    invalid(format!(
                        "default for '{}' expects {}, found {}",
                        param.name, param.param_type, found
                    ))
                })?;
            }
        }
        for name in self.placeholders() {
            if !declared.contains(name.as_str()) {
                return Err(invalid(format!("placeholder '{{{{{}}}}}' has no parameter", name)));
            }
        }
        Ok(())
    }

    /// Produce a script from `parameters`.
    /// Checks run in order: missing required parameters, then unknown
    /// parameters, then types.
    pub fn instantiate(&self, parameters: &BTreeMap<String, Value>) -> Result<Script> {
        if let Some(missing) = self
            .parameters
            .iter()
            .find(|param| param.required && !parameters.contains_key(&param.name))
        {
            return Err(Error::MissingParameter {
                template: self.name.clone(),
                parameter: missing.name.clone(),
            });
        }
        for supplied in parameters.keys() {
            if !self.parameters.iter().any(|param| &param.name == supplied) {
                return Err(Error::UnknownParameter {
                    template: self.name.clone(),
                    parameter: supplied.clone(),
                });
            }
        }

        let mut resolved = BTreeMap::new();
        for param in &self.parameters {
            let value = match (parameters.get(&param.name), &param.default_value) {
                (Some(Value::Null), _) if !param.required => Value::Null,
                (Some(value), _) => {
                    param
                        .param_type
                        .accept(value)
                        .map_err(|found| Error::TypeMismatch {
                            parameter: param.name.clone(),
                            expected: param.param_type.to_string(),
                            found,
                        })?
                }
                (None, Some(default)) => param.param_type.accept(default).unwrap_or(Value::Null),
                (None, None) => Value::Null,
            };
            resolved.insert(param.name.clone(), value);
        }

        let source = scan_placeholders(&self.script_template, |name| {
            resolved.get(name).map(Value::render)
        });
        let mut script = parse_named(&self.name, &source)?;
        script.metadata.insert("template".to_string(), self.name.clone());
        script
            .metadata
            .insert("parameters".to_string(), serde_json::to_string(&resolved)?);
        Ok(script)
    }
}

/// Walk `text`, calling `replace` for every `{{ name }}` placeholder. Returns
/// the text with each placeholder swapped for `replace`'s result, or left
/// as-is when it returns `None`. `{{` not followed by an identifier and `}}`
/// is ordinary text.
fn scan_placeholders(text: &str, mut replace: impl FnMut(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let candidate = after
            .find("}}")
            .map(|end| (after[..end].trim(), end))
            .filter(|(name, _)| is_identifier(name));
        match candidate {
            Some((name, end)) => {
                out.push_str(&rest[..start]);
                match replace(name) {
                    Some(replacement) => out.push_str(&replacement),
                    None => out.push_str(&rest[start..start + 2 + end + 2]),
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[..start + 1]);
                rest = &rest[start + 1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Name-keyed store of templates.
#[derive(Debug, Default)]
pub struct TemplateRegistry {
    templates: RwLock<BTreeMap<String, Template>>,
}

impl TemplateRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in templates.
    pub fn with_builtins() -> Result<Self> {
        let registry = Self::new();
        for template in builtin::templates() {
            registry.register(template)?;
        }
        Ok(registry)
    }

    /// Register a new template. A name that is already taken is a conflict.
    pub fn register(&self, template: Template) -> Result<()> {
        template.validate()?;
        let mut templates = self.templates.write();
        if templates.contains_key(&template.name) {
            return Err(Error::Conflict {
                kind: "template",
                name: template.name,
            });
        }
        tracing::debug!(template = %template.name, "registered template");
        templates.insert(template.name.clone(), template);
        Ok(())
    }

    /// Register a template, replacing any existing one. Returns the replaced template.
    pub fn register_or_replace(&self, template: Template) -> Result<Option<Template>> {
        template.validate()?;
        let previous = self
            .templates
            .write()
            .insert(template.name.clone(), template);
        if let Some(old) = &previous {
            tracing::info!(template = %old.name, "replaced template");
        }
        Ok(previous)
    }

    /// Look up a template by name.
    pub fn get(&self, name: &str) -> Option<Template> {
        self.templates.read().get(name).cloned()
    }

    /// Remove a template.
    pub fn remove(&self, name: &str) -> Option<Template> {
        self.templates.write().remove(name)
    }

    /// All templates, sorted by name.
    pub fn list(&self) -> Vec<Template> {
        self.templates.read().values().cloned().collect()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.templates.read().keys().cloned().collect()
    }

    /// Instantiate the template registered as `name`.
    pub fn instantiate(&self, name: &str, parameters: &BTreeMap<String, Value>) -> Result<Script> {
        let template = self
            .get(name)
            .ok_or_else(|| Error::UnknownTemplate(name.to_string()))?;
        let script = template.instantiate(parameters)?;
        tracing::info!(template = name, statements = script.statements.len(), "instantiated template");
        Ok(script)
    }

    /// Register every template in a JSON array. Either all are registered or none.
    pub fn load_json(&self, reader: impl io::Read) -> Result<usize> {
        let incoming: Vec<Template> = serde_json::from_reader(reader)?;
        let mut names = BTreeSet::new();
        for template in &incoming {
            template.validate()?;
            if !names.insert(template.name.as_str()) {
                return Err(Error::Conflict {
                    kind: "template",
                    name: template.name.clone(),
                });
            }
        }
        let mut templates = self.templates.write();
        if let Some(taken) = incoming.iter().find(|t| templates.contains_key(&t.name)) {
            return Err(Error::Conflict {
                kind: "template",
                name: taken.name.clone(),
            });
        }
        let count = incoming.len();
        for template in incoming {
            templates.insert(template.name.clone(), template);
        }
        tracing::debug!(count, "loaded templates");
        Ok(count)
    }

    /// Write every template as a pretty-printed JSON array.
    pub fn to_json(&self, writer: impl io::Write) -> Result<()> {
        serde_json::to_writer_pretty(writer, &self.list())?;
        Ok(())
    }
}
