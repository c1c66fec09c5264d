//! Tree-walking evaluator
//!
//! Evaluates expressions directly against an [`Environment`]. Each evaluated
//! node is charged one step; blocks and loop iterations are the cancellation
//! and deadline checkpoints. `break` and `continue` travel up the Rust call
//! stack as [`Unwind`] values until the nearest loop absorbs them.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::execution::ExecutionState;

use super::ast::{BinaryOperator, Expression, Script};
use super::environment::Environment;
use super::operators;
use super::value::Value;

/// Non-local exit from an expression.
#[derive(Debug)]
enum Unwind {
    Break,
    Continue,
    Error(Error),
}

impl From<Error> for Unwind {
    fn from(err: Error) -> Self {
        Unwind::Error(err)
    }
}

impl From<Unwind> for Error {
    fn from(unwind: Unwind) -> Self {
        match unwind {
            Unwind::Error(err) => err,
            Unwind::Break => Error::type_error("'break' outside of a loop"),
            Unwind::Continue => Error::type_error("'continue' outside of a loop"),
        }
    }
}

type Eval = std::result::Result<Value, Unwind>;

/// Run every statement of `script` in a fresh environment whose global frame
/// holds `bindings`. Returns the value of the last statement.
pub(crate) fn execute_script(
    script: &Script,
    bindings: &BTreeMap<String, Value>,
    state: &mut ExecutionState<'_>,
) -> Result<Value> {
    let mut env = Environment::new();
    for (name, value) in bindings {
        env.define(name.clone(), value.clone());
    }
    let mut interpreter = Interpreter::new(&mut env, state);
    let mut last = Value::Null;
    for statement in &script.statements {
        last = interpreter.evaluate(&statement.expression).inspect_err(|err| {
            if let Some(location) = &statement.location {
                tracing::debug!(%location, error = %err, "statement failed");
            }
        })?;
    }
    Ok(last)
}

/// Evaluator bound to one environment and one execution.
pub(crate) struct Interpreter<'e, 's, 'a> {
    env: &'e mut Environment,
    state: &'s mut ExecutionState<'a>,
    // expressions currently on the Rust call stack
    depth: usize,
}

impl<'e, 's, 'a> Interpreter<'e, 's, 'a> {
    pub(crate) fn new(env: &'e mut Environment, state: &'s mut ExecutionState<'a>) -> Self {
        Self { env, state, depth: 0 }
    }

    /// Evaluate one expression. Any error aborts the enclosing statement.
    pub(crate) fn evaluate(&mut self, expr: &Expression) -> Result<Value> {
        self.eval(expr).map_err(Error::from)
    }

    fn eval(&mut self, expr: &Expression) -> Eval {
        self.state.budget.step()?;
        self.state.budget.check_expression_depth(self.depth + 1)?;
        self.depth += 1;
        let result = self.eval_node(expr);
        self.depth -= 1;
        result
    }

    fn eval_node(&mut self, expr: &Expression) -> Eval {
        match expr {
            Expression::Literal(value) => Ok(value.clone()),
            Expression::VariableRef(name) => Ok(self.env.get(name)?.clone()),
            Expression::BinaryOp { left, op, right } if op.is_logical() => {
                let lhs = self.eval(left)?;
                let lhs = operators::require_bool(op.symbol(), &lhs)?;
                // short-circuit
                if (*op == BinaryOperator::And) != lhs {
                    return Ok(Value::Boolean(lhs));
                }
                let rhs = self.eval(right)?;
                Ok(Value::Boolean(operators::require_bool(op.symbol(), &rhs)?))
            }
            Expression::BinaryOp { left, op, right } => {
                let lhs = self.eval(left)?;
                let rhs = self.eval(right)?;
                Ok(operators::binary(*op, &lhs, &rhs)?)
            }
            Expression::UnaryOp { op, operand } => {
                let value = self.eval(operand)?;
                Ok(operators::unary(*op, &value)?)
            }
            Expression::Call { name, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg)?);
                }
                Ok(self.state.call(name, &values)?)
            }
            Expression::Block(items) => self.eval_block(items),
            Expression::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let flag = self.eval(condition)?;
                if operators::require_bool("if condition", &flag)? {
                    self.eval(then_branch)
                } else if let Some(branch) = else_branch {
                    self.eval(branch)
                } else {
                    Ok(Value::Null)
                }
            }
            Expression::Loop { condition, body } => {
                loop {
                    self.state.budget.checkpoint()?;
                    if let Some(condition) = condition {
                        let flag = self.eval(condition)?;
                        if !operators::require_bool("loop condition", &flag)? {
                            break;
                        }
                    }
                    match self.eval(body) {
                        Ok(_) | Err(Unwind::Continue) => {}
                        Err(Unwind::Break) => break,
                        Err(err) => return Err(err),
                    }
                }
                Ok(Value::Null)
            }
            Expression::Assignment { target, value } => {
                let value = self.eval(value)?;
                if self.env.is_global() && self.env.lookup(target).is_none() {
                    // top-level binding statement
                    self.env.define(target.clone(), value.clone());
                } else {
                    self.env.set(target, value.clone())?;
                }
                Ok(value)
            }
            Expression::Declaration { name, value } => {
                let value = self.eval(value)?;
                self.env.define(name.clone(), value.clone());
                Ok(value)
            }
            Expression::ObjectLiteral(entries) => {
                let mut object = BTreeMap::new();
                for (key, value) in entries {
                    let value = self.eval(value)?;
                    object.insert(key.clone(), value);
                }
                Ok(Value::Object(object))
            }
            Expression::ArrayLiteral(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item)?);
                }
                Ok(Value::Array(values))
            }
            Expression::PropertyAccess { object, name } => {
                let object = self.eval(object)?;
                Ok(operators::property(&object, name)?)
            }
            Expression::IndexAccess { array, index } => {
                let target = self.eval(array)?;
                let index = self.eval(index)?;
                Ok(operators::index(&target, &index)?)
            }
            Expression::Break => Err(Unwind::Break),
            Expression::Continue => Err(Unwind::Continue),
        }
    }

    fn eval_block(&mut self, items: &[Expression]) -> Eval {
        self.state.budget.checkpoint()?;
        self.env.push_scope();
        let result = self.eval_items(items);
        self.env.pop_scope();
        result
    }

    fn eval_items(&mut self, items: &[Expression]) -> Eval {
        self.state.budget.check_depth(self.env.depth())?;
        let mut last = Value::Null;
        for item in items {
            last = self.eval(item)?;
        }
        Ok(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Resource;
    use crate::execution::{Budget, ResourceLimits};
    use crate::host::{CapabilityRegistry, CapabilitySet};
    use crate::language::parser::parse;
    use crate::language::stdlib::Stdlib;

    fn run_with(source: &str, limits: ResourceLimits) -> (Result<Value>, Vec<String>) {
        let script = parse(source).expect("parse");
        let stdlib = Stdlib::standard();
        let host = CapabilityRegistry::new();
        let granted = CapabilitySet::new();
        let mut state = ExecutionState::new(Budget::new(limits, None), &stdlib, &host, &granted);
        let result = execute_script(&script, &BTreeMap::new(), &mut state);
        (result, state.finish().output)
    }

    fn run(source: &str) -> Result<Value> {
        run_with(source, ResourceLimits::default()).0
    }

    #[test]
    fn block_value_is_last_expression() {
        assert_eq!(run("{ let a = 2\n a * 21 }").unwrap(), Value::Integer(42));
        assert_eq!(run("{ }").unwrap(), Value::Object(BTreeMap::new()));
    }

    #[test]
    fn block_bindings_do_not_escape() {
        let err = run("{ let inner = 1 }\ninner").unwrap_err();
        assert!(matches!(err, Error::NotDefined(name) if name == "inner"));
    }

    #[test]
    fn shadowing_leaves_outer_binding_untouched() {
        assert_eq!(
            run("x = 1\n{ let x = 2\n x = 3 }\nx").unwrap(),
            Value::Integer(1)
        );
    }

    #[test]
    fn assignment_inside_block_updates_outer() {
        assert_eq!(run("x = 1\n{ x = x + 1 }\nx").unwrap(), Value::Integer(2));
    }

    #[test]
    fn assignment_to_undefined_name_inside_block_fails() {
        let err = run("{ fresh = 1 }").unwrap_err();
        assert!(matches!(err, Error::NotDefined(_)));
    }

    #[test]
    fn if_requires_boolean_condition() {
        assert!(matches!(run("if 1 { 2 }"), Err(Error::Type(_))));
        assert_eq!(run("if 1 < 2 { \"yes\" } else { \"no\" }").unwrap(), Value::from("yes"));
        assert_eq!(run("if false { 1 }").unwrap(), Value::Null);
    }

    #[test]
    fn logical_operators_short_circuit() {
        // the right side would be a NotDefined error if evaluated
        assert_eq!(run("false && missing").unwrap(), Value::Boolean(false));
        assert_eq!(run("true || missing").unwrap(), Value::Boolean(true));
        assert!(matches!(run("1 && true"), Err(Error::Type(_))));
    }

    #[test]
    fn while_loop_with_break_and_continue() {
        let source = "
            i = 0
            total = 0
            while i < 10 {
                i = i + 1
                if i % 2 == 0 { continue }
                if i > 7 { break }
                total = total + i
            }
            total
        ";
        assert_eq!(run(source).unwrap(), Value::Integer(1 + 3 + 5 + 7));
    }

    #[test]
    fn unbounded_loop_exhausts_step_budget() {
        let limits = ResourceLimits {
            max_steps: Some(500),
            ..ResourceLimits::default()
        };
        let (result, _) = run_with("n = 0\nloop { n = n + 1 }", limits);
        assert!(matches!(
            result,
            Err(Error::ResourceExhausted {
                resource: Resource::Steps,
                limit: 500
            })
        ));
    }

    #[test]
    fn scope_depth_is_bounded() {
        let limits = ResourceLimits {
            max_scope_depth: 3,
            ..ResourceLimits::default()
        };
        let (ok, _) = run_with("{ { 1 } }", limits.clone());
        assert!(ok.is_ok());
        let (err, _) = run_with("{ { { 1 } } }", limits);
        assert!(matches!(
            err,
            Err(Error::ResourceExhausted {
                resource: Resource::ScopeDepth,
                ..
            })
        ));
    }

    #[test]
    fn expression_depth_is_bounded() {
        use crate::language::ast::{Statement, UnaryOperator};

        let mut expr = Expression::Literal(Value::Integer(1));
        for _ in 0..20 {
            expr = Expression::UnaryOp {
                op: UnaryOperator::Negate,
                operand: Box::new(expr),
            };
        }
        let script = Script::new(
            "nested",
            "",
            vec![Statement {
                expression: expr,
                location: None,
            }],
        );
        let stdlib = Stdlib::standard();
        let host = CapabilityRegistry::new();
        let granted = CapabilitySet::new();
        let run_at = |max_expression_depth| {
            let limits = ResourceLimits {
                max_expression_depth,
                ..ResourceLimits::default()
            };
            let mut state = ExecutionState::new(Budget::new(limits, None), &stdlib, &host, &granted);
            execute_script(&script, &BTreeMap::new(), &mut state)
        };
        assert_eq!(run_at(21).unwrap(), Value::Integer(1));
        assert!(matches!(
            run_at(8),
            Err(Error::ResourceExhausted {
                resource: Resource::ExpressionDepth,
                limit: 8
            })
        ));
    }

    #[test]
    fn print_output_is_captured() {
        let (result, output) = run_with(
            "x = 10\ny = 20\nz = x + y\nprint(z)",
            ResourceLimits::default(),
        );
        assert_eq!(result.unwrap(), Value::Null);
        assert_eq!(output, vec!["30".to_string()]);
    }

    #[test]
    fn objects_and_indexing() {
        let source = r#"
            let policy = { quorum: 3, members: ["a", "b", "c"] }
            policy.members[policy.quorum - 1] + policy["missing"] == null
        "#;
        // string + null is a type error
        assert!(matches!(run(source), Err(Error::Type(_))));
        assert_eq!(
            run(r#"let p = { m: ["a", "b"] }
                   p.m[1]"#)
            .unwrap(),
            Value::from("b")
        );
        assert!(matches!(
            run("[1, 2][5]"),
            Err(Error::IndexOutOfBounds { index: 5, len: 2 })
        ));
    }

    #[test]
    fn error_aborts_remaining_statements() {
        let (result, output) = run_with(
            "print(\"before\")\nx = 1 / 0\nprint(\"after\")",
            ResourceLimits::default(),
        );
        assert!(matches!(result, Err(Error::Arithmetic(_))));
        assert_eq!(output, vec!["before".to_string()]);
    }
}
