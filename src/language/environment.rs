//! Lexical scope chain
//!
//! Frames live in an arena and refer to their parent by index. Entering a
//! block pushes a frame, leaving it pops the frame and everything bound in it.
//! The payload is generic so the compiler can resolve names to slots with the
//! same scoping rules the interpreter uses for values.

use std::collections::HashMap;

use crate::error::{Error, Result};

use super::value::Value;

#[derive(Debug, Clone)]
struct Frame<T> {
    bindings: HashMap<String, T>,
    parent: Option<usize>,
}

impl<T> Frame<T> {
    fn new(parent: Option<usize>) -> Self {
        Self {
            bindings: HashMap::new(),
            parent,
        }
    }
}

/// Chain of scope frames rooted at the global frame.
#[derive(Debug, Clone)]
pub struct Environment<T = Value> {
    frames: Vec<Frame<T>>,
    current: usize,
}

impl<T> Default for Environment<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Environment<T> {
    /// Create an environment holding only the global frame.
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::new(None)],
            current: 0,
        }
    }

    /// Number of frames in the chain, counting the global frame.
    pub fn depth(&self) -> usize {
        let mut depth = 1;
        let mut frame = &self.frames[self.current];
        while let Some(parent) = frame.parent {
            depth += 1;
            frame = &self.frames[parent];
        }
        depth
    }

    /// Whether the innermost frame is the global frame.
    pub fn is_global(&self) -> bool {
        self.current == 0
    }

    /// Enter a new innermost frame.
    pub fn push_scope(&mut self) {
        self.frames.push(Frame::new(Some(self.current)));
        self.current = self.frames.len() - 1;
    }

    /// Leave the innermost frame, dropping its bindings. The global frame is never popped.
    pub fn pop_scope(&mut self) {
        if let Some(parent) = self.frames[self.current].parent {
            self.frames.truncate(self.current);
            self.current = parent;
        }
    }

    /// Bind `name` in the innermost frame, shadowing any outer binding.
    pub fn define(&mut self, name: impl Into<String>, value: T) {
        self.frames[self.current].bindings.insert(name.into(), value);
    }

    /// Whether `name` is bound in the innermost frame itself.
    pub fn defines_locally(&self, name: &str) -> bool {
        self.frames[self.current].bindings.contains_key(name)
    }

    /// Resolve `name`, walking from the innermost frame outward.
    pub fn get(&self, name: &str) -> Result<&T> {
        self.lookup(name)
            .map(|(_, value)| value)
            .ok_or_else(|| Error::NotDefined(name.to_string()))
    }

    /// Resolve `name` together with the number of frames walked to find it
    /// (0 for the innermost frame).
    pub fn lookup(&self, name: &str) -> Option<(usize, &T)> {
        let mut hops = 0;
        let mut index = Some(self.current);
        while let Some(idx) = index {
            let frame = &self.frames[idx];
            if let Some(value) = frame.bindings.get(name) {
                return Some((hops, value));
            }
            hops += 1;
            index = frame.parent;
        }
        None
    }

    /// Update an existing binding in the innermost frame that holds it.
    pub fn set(&mut self, name: &str, value: T) -> Result<()> {
        let mut index = Some(self.current);
        while let Some(idx) = index {
            let frame = &mut self.frames[idx];
            if let Some(slot) = frame.bindings.get_mut(name) {
                *slot = value;
                return Ok(());
            }
            index = frame.parent;
        }
        Err(Error::NotDefined(name.to_string()))
    }

    /// Number of bindings in the innermost frame.
    pub fn local_len(&self) -> usize {
        self.frames[self.current].bindings.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_definitions_shadow_and_disappear() {
        let mut env: Environment = Environment::new();
        env.define("x", Value::Integer(1));
        env.push_scope();
        env.define("x", Value::Integer(2));
        assert_eq!(env.get("x").unwrap(), &Value::Integer(2));
        env.pop_scope();
        assert_eq!(env.get("x").unwrap(), &Value::Integer(1));
    }

    #[test]
    fn set_updates_innermost_holder() {
        let mut env: Environment = Environment::new();
        env.define("total", Value::Integer(0));
        env.push_scope();
        env.set("total", Value::Integer(5)).unwrap();
        env.pop_scope();
        assert_eq!(env.get("total").unwrap(), &Value::Integer(5));
    }

    #[test]
    fn set_requires_existing_binding() {
        let mut env: Environment = Environment::new();
        let err = env.set("missing", Value::Null).unwrap_err();
        assert!(matches!(err, Error::NotDefined(name) if name == "missing"));
    }

    #[test]
    fn lookup_reports_hops() {
        let mut env: Environment<usize> = Environment::new();
        env.define("a", 0);
        env.push_scope();
        env.push_scope();
        env.define("b", 0);
        assert_eq!(env.lookup("a"), Some((2, &0)));
        assert_eq!(env.lookup("b"), Some((0, &0)));
        assert_eq!(env.depth(), 3);
    }

    #[test]
    fn global_frame_is_never_popped() {
        let mut env: Environment = Environment::new();
        env.define("g", Value::Boolean(true));
        env.pop_scope();
        assert!(env.is_global());
        assert!(env.get("g").is_ok());
    }
}
