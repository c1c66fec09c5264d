//! User-visible standard library
//!
//! These functions need no permission and have no effects outside the
//! execution, apart from `print`, which appends to the captured output.

use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};

use crate::error::{Error, Result};

use super::value::Value;

/// Per-call view of the execution a native function runs in.
pub struct NativeContext<'a> {
    output: &'a mut Vec<String>,
}

impl<'a> NativeContext<'a> {
    pub(crate) fn new(output: &'a mut Vec<String>) -> Self {
        Self { output }
    }

    /// Append a line to the captured output.
    pub fn emit(&mut self, line: String) {
        tracing::debug!(target: "accord::print", "{}", line);
        self.output.push(line);
    }
}

/// Signature of a standard-library function.
pub type NativeFunction = fn(&mut NativeContext<'_>, &[Value]) -> Result<Value>;

/// Name-keyed table of standard-library functions.
#[derive(Clone)]
pub struct Stdlib {
    functions: BTreeMap<&'static str, NativeFunction>,
}

impl std::fmt::Debug for Stdlib {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.functions.keys()).finish()
    }
}

impl Default for Stdlib {
    fn default() -> Self {
        Self::standard()
    }
}

impl Stdlib {
    /// The standard function table.
    pub fn standard() -> Self {
        let entries: [(&'static str, NativeFunction); 16] = [
            ("print", print),
            ("len", len),
            ("type_of", type_of),
            ("to_string", to_string),
            ("to_integer", to_integer),
            ("to_number", to_number),
            ("keys", keys),
            ("values", values),
            ("has_key", has_key),
            ("contains", contains),
            ("push", push),
            ("min", min),
            ("max", max),
            ("abs", abs),
            ("round", round),
            ("now", now),
        ];
        Self {
            functions: entries.into_iter().collect(),
        }
    }

    /// Look up a function by name.
    pub fn get(&self, name: &str) -> Option<NativeFunction> {
        self.functions.get(name).copied()
    }

    /// Whether `name` is a standard-library function.
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Function names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.functions.keys().copied()
    }
}

fn arity(name: &str, args: &[Value], expected: usize) -> Result<()> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(Error::type_error(format!(
            "{}() takes {} argument{}, got {}",
            name,
            expected,
            if expected == 1 { "" } else { "s" },
            args.len()
        )))
    }
}

fn wrong_type(name: &str, value: &Value) -> Error {
    Error::type_error(format!("{}() does not accept {}", name, value.type_name()))
}

fn print(ctx: &mut NativeContext<'_>, args: &[Value]) -> Result<Value> {
    let line = args
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    ctx.emit(line);
    Ok(Value::Null)
}

fn len(_: &mut NativeContext<'_>, args: &[Value]) -> Result<Value> {
    arity("len", args, 1)?;
    let count = match &args[0] {
        Value::String(text) => text.chars().count(),
        Value::Array(items) => items.len(),
        Value::Object(entries) => entries.len(),
        other => return Err(wrong_type("len", other)),
    };
    Ok(Value::Integer(count as i64))
}

fn type_of(_: &mut NativeContext<'_>, args: &[Value]) -> Result<Value> {
    arity("type_of", args, 1)?;
    Ok(Value::from(args[0].type_name()))
}

fn to_string(_: &mut NativeContext<'_>, args: &[Value]) -> Result<Value> {
    arity("to_string", args, 1)?;
    Ok(Value::String(args[0].to_string()))
}

fn to_integer(_: &mut NativeContext<'_>, args: &[Value]) -> Result<Value> {
    arity("to_integer", args, 1)?;
    match &args[0] {
        Value::Integer(num) => Ok(Value::Integer(*num)),
        Value::Number(num) => {
            let truncated = num.trunc();
            if truncated.is_finite() && truncated >= i64::MIN as f64 && truncated < i64::MAX as f64 {
                Ok(Value::Integer(truncated as i64))
            } else {
                Err(Error::arithmetic(format!("{} does not fit in an integer", num)))
            }
        }
        Value::String(text) => text
            .trim()
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|_| Error::type_error(format!("'{}' is not an integer", text))),
        other => Err(wrong_type("to_integer", other)),
    }
}

fn to_number(_: &mut NativeContext<'_>, args: &[Value]) -> Result<Value> {
    arity("to_number", args, 1)?;
    match &args[0] {
        Value::Integer(num) => Ok(Value::Number(*num as f64)),
        Value::Number(num) => Ok(Value::Number(*num)),
        Value::String(text) => text
            .trim()
            .parse::<f64>()
            .map(Value::Number)
            .map_err(|_| Error::type_error(format!("'{}' is not a number", text))),
        other => Err(wrong_type("to_number", other)),
    }
}

fn object_arg<'v>(name: &str, value: &'v Value) -> Result<&'v BTreeMap<String, Value>> {
    value.as_object().ok_or_else(|| wrong_type(name, value))
}

fn keys(_: &mut NativeContext<'_>, args: &[Value]) -> Result<Value> {
    arity("keys", args, 1)?;
    let entries = object_arg("keys", &args[0])?;
    Ok(Value::Array(entries.keys().cloned().map(Value::String).collect()))
}

fn values(_: &mut NativeContext<'_>, args: &[Value]) -> Result<Value> {
    arity("values", args, 1)?;
    let entries = object_arg("values", &args[0])?;
    Ok(Value::Array(entries.values().cloned().collect()))
}

fn has_key(_: &mut NativeContext<'_>, args: &[Value]) -> Result<Value> {
    arity("has_key", args, 2)?;
    let entries = object_arg("has_key", &args[0])?;
    let key = args[1]
        .as_str()
        .ok_or_else(|| wrong_type("has_key", &args[1]))?;
    Ok(Value::Boolean(entries.contains_key(key)))
}

fn contains(_: &mut NativeContext<'_>, args: &[Value]) -> Result<Value> {
    arity("contains", args, 2)?;
    let found = match (&args[0], &args[1]) {
        (Value::Array(items), needle) => items.contains(needle),
        (Value::String(text), Value::String(needle)) => text.contains(needle.as_str()),
        (Value::Object(entries), Value::String(key)) => entries.contains_key(key),
        (haystack, _) => return Err(wrong_type("contains", haystack)),
    };
    Ok(Value::Boolean(found))
}

fn push(_: &mut NativeContext<'_>, args: &[Value]) -> Result<Value> {
    arity("push", args, 2)?;
    match &args[0] {
        Value::Array(items) => {
            let mut items = items.clone();
            items.push(args[1].clone());
            Ok(Value::Array(items))
        }
        other => Err(wrong_type("push", other)),
    }
}

fn extreme(name: &str, args: &[Value], prefer: std::cmp::Ordering) -> Result<Value> {
    let mut best: Option<(&Value, f64)> = None;
    for arg in args {
        let num = arg.as_f64().ok_or_else(|| wrong_type(name, arg))?;
        match best {
            Some((_, current)) if num.partial_cmp(&current) != Some(prefer) => {}
            _ => best = Some((arg, num)),
        }
    }
    best.map(|(value, _)| value.clone())
        .ok_or_else(|| Error::type_error(format!("{}() needs at least one argument", name)))
}

fn min(_: &mut NativeContext<'_>, args: &[Value]) -> Result<Value> {
    extreme("min", args, std::cmp::Ordering::Less)
}

fn max(_: &mut NativeContext<'_>, args: &[Value]) -> Result<Value> {
    extreme("max", args, std::cmp::Ordering::Greater)
}

fn abs(_: &mut NativeContext<'_>, args: &[Value]) -> Result<Value> {
    arity("abs", args, 1)?;
    match &args[0] {
        Value::Integer(num) => num
            .checked_abs()
            .map(Value::Integer)
            .ok_or_else(|| Error::arithmetic("integer overflow in abs()")),
        Value::Number(num) => Ok(Value::Number(num.abs())),
        other => Err(wrong_type("abs", other)),
    }
}

fn round(_: &mut NativeContext<'_>, args: &[Value]) -> Result<Value> {
    arity("round", args, 1)?;
    match &args[0] {
        Value::Integer(num) => Ok(Value::Integer(*num)),
        Value::Number(num) => Ok(Value::Number(num.round())),
        other => Err(wrong_type("round", other)),
    }
}

fn now(_: &mut NativeContext<'_>, args: &[Value]) -> Result<Value> {
    arity("now", args, 0)?;
    Ok(Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[Value]) -> Result<Value> {
        let mut output = Vec::new();
        let mut ctx = NativeContext::new(&mut output);
        let function = Stdlib::standard().get(name).expect("known function");
        function(&mut ctx, args)
    }

    #[test]
    fn print_joins_arguments_with_spaces() {
        let mut output = Vec::new();
        let mut ctx = NativeContext::new(&mut output);
        print(&mut ctx, &["total:".into(), 30.into()]).unwrap();
        assert_eq!(output, vec!["total: 30".to_string()]);
    }

    #[test]
    fn len_counts_characters() {
        assert_eq!(call("len", &["héllo".into()]).unwrap(), Value::Integer(5));
        assert!(call("len", &[Value::Null]).is_err());
        assert!(call("len", &[]).is_err());
    }

    #[test]
    fn conversions() {
        assert_eq!(call("to_integer", &["42".into()]).unwrap(), Value::Integer(42));
        assert_eq!(call("to_integer", &[2.9.into()]).unwrap(), Value::Integer(2));
        assert!(call("to_number", &[5.into()]).unwrap().identical(&Value::Number(5.0)));
        assert_eq!(call("to_string", &[true.into()]).unwrap(), Value::from("true"));
    }

    #[test]
    fn min_and_max_keep_the_original_kind() {
        let result = call("max", &[1.into(), 2.5.into(), 2.into()]).unwrap();
        assert!(result.identical(&Value::Number(2.5)));
        let result = call("min", &[3.into(), 1.into()]).unwrap();
        assert!(result.identical(&Value::Integer(1)));
        assert!(call("min", &[]).is_err());
    }

    #[test]
    fn collection_helpers() {
        let mut entries = BTreeMap::new();
        entries.insert("b".to_string(), Value::Integer(2));
        entries.insert("a".to_string(), Value::Integer(1));
        let object = Value::Object(entries);
        assert_eq!(
            call("keys", &[object.clone()]).unwrap(),
            Value::Array(vec!["a".into(), "b".into()])
        );
        assert_eq!(call("has_key", &[object, "a".into()]).unwrap(), Value::Boolean(true));
        let pushed = call("push", &[Value::Array(vec![]), 1.into()]).unwrap();
        assert_eq!(pushed, Value::Array(vec![1.into()]));
        assert_eq!(
            call("contains", &["cooperative".into(), "coop".into()]).unwrap(),
            Value::Boolean(true)
        );
    }

    #[test]
    fn now_is_rfc3339() {
        let stamp = call("now", &[]).unwrap();
        let text = stamp.as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(text).is_ok());
    }
}
