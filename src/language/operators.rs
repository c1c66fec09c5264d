//! Operator semantics shared by the interpreter, the constant folder and the VM

use std::cmp::Ordering;

use crate::error::{Error, Result};

use super::ast::{BinaryOperator, UnaryOperator};
use super::value::Value;

/// Apply a binary operator to two evaluated operands.
///
/// Logical operators are accepted here only with boolean operands; callers
/// that need short-circuiting decide whether to evaluate the right side.
pub fn binary(op: BinaryOperator, left: &Value, right: &Value) -> Result<Value> {
    use BinaryOperator::*;
    match op {
        Add => add(left, right),
        Subtract | Multiply | Divide | Modulo => arithmetic(op, left, right),
        Equal => Ok(Value::Boolean(left == right)),
        NotEqual => Ok(Value::Boolean(left != right)),
        LessThan | LessThanOrEqual | GreaterThan | GreaterThanOrEqual => {
            let ordering = compare(op, left, right)?;
            Ok(Value::Boolean(match op {
                LessThan => ordering == Ordering::Less,
                LessThanOrEqual => ordering != Ordering::Greater,
                GreaterThan => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        And | Or => {
            let lhs = require_bool(op.symbol(), left)?;
            let rhs = require_bool(op.symbol(), right)?;
            Ok(Value::Boolean(if op == And { lhs && rhs } else { lhs || rhs }))
        }
    }
}

/// Apply a unary operator.
pub fn unary(op: UnaryOperator, operand: &Value) -> Result<Value> {
    match (op, operand) {
        (UnaryOperator::Negate, Value::Integer(num)) => num
            .checked_neg()
            .map(Value::Integer)
            .ok_or_else(|| Error::arithmetic(format!("integer overflow negating {}", num))),
        (UnaryOperator::Negate, Value::Number(num)) => Ok(Value::Number(-num)),
        (UnaryOperator::Not, Value::Boolean(flag)) => Ok(Value::Boolean(!flag)),
        (op, other) => Err(Error::type_error(format!(
            "cannot apply '{}' to {}",
            op,
            other.type_name()
        ))),
    }
}

/// Require a boolean, naming the construct that needed it in the error.
pub fn require_bool(context: &str, value: &Value) -> Result<bool> {
    value.as_bool().ok_or_else(|| {
        Error::type_error(format!(
            "{} requires a boolean, found {}",
            context,
            value.type_name()
        ))
    })
}

/// `object.name`: missing keys read as null.
pub fn property(object: &Value, name: &str) -> Result<Value> {
    match object {
        Value::Object(entries) => Ok(entries.get(name).cloned().unwrap_or(Value::Null)),
        other => Err(Error::type_error(format!(
            "cannot read property '{}' of {}",
            name,
            other.type_name()
        ))),
    }
}

/// `target[index]` for arrays and strings (by integer) and objects (by key).
pub fn index(target: &Value, index: &Value) -> Result<Value> {
    match (target, index) {
        (Value::Array(items), Value::Integer(idx)) => element(items.len(), *idx)
            .map(|pos| items[pos].clone()),
        (Value::String(text), Value::Integer(idx)) => {
            let len = text.chars().count();
            let pos = element(len, *idx)?;
            Ok(text
                .chars()
                .nth(pos)
                .map(|ch| Value::String(ch.to_string()))
                .unwrap_or(Value::Null))
        }
        (Value::Object(entries), Value::String(key)) => {
            Ok(entries.get(key).cloned().unwrap_or(Value::Null))
        }
        (target, index) => Err(Error::type_error(format!(
            "cannot index {} with {}",
            target.type_name(),
            index.type_name()
        ))),
    }
}

fn element(len: usize, idx: i64) -> Result<usize> {
    usize::try_from(idx)
        .ok()
        .filter(|pos| *pos < len)
        .ok_or(Error::IndexOutOfBounds { index: idx, len })
}

fn add(left: &Value, right: &Value) -> Result<Value> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => {
            let mut joined = String::with_capacity(a.len() + b.len());
            joined.push_str(a);
            joined.push_str(b);
            Ok(Value::String(joined))
        }
        (Value::Array(a), Value::Array(b)) => {
            Ok(Value::Array(a.iter().chain(b.iter()).cloned().collect()))
        }
        _ => arithmetic(BinaryOperator::Add, left, right),
    }
}

fn arithmetic(op: BinaryOperator, left: &Value, right: &Value) -> Result<Value> {
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => integer_arithmetic(op, *a, *b).map(Value::Integer),
        (Value::Number(a), Value::Number(b)) => number_arithmetic(op, *a, *b).map(Value::Number),
        _ => Err(Error::type_error(format!(
            "unsupported operand types for '{}': {} and {}",
            op,
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn integer_arithmetic(op: BinaryOperator, a: i64, b: i64) -> Result<i64> {
    let result = match op {
        BinaryOperator::Add => a.checked_add(b),
        BinaryOperator::Subtract => a.checked_sub(b),
        BinaryOperator::Multiply => a.checked_mul(b),
        BinaryOperator::Divide if b == 0 => return Err(Error::arithmetic("division by zero")),
        BinaryOperator::Divide => a.checked_div(b),
        BinaryOperator::Modulo if b == 0 => return Err(Error::arithmetic("modulo by zero")),
        BinaryOperator::Modulo => a.checked_rem(b),
        _ => None,
    };
    result.ok_or_else(|| Error::arithmetic(format!("integer overflow in {} {} {}", a, op, b)))
}

fn number_arithmetic(op: BinaryOperator, a: f64, b: f64) -> Result<f64> {
    match op {
        BinaryOperator::Add => Ok(a + b),
        BinaryOperator::Subtract => Ok(a - b),
        BinaryOperator::Multiply => Ok(a * b),
        BinaryOperator::Divide if b == 0.0 => Err(Error::arithmetic("division by zero")),
        BinaryOperator::Divide => Ok(a / b),
        BinaryOperator::Modulo if b == 0.0 => Err(Error::arithmetic("modulo by zero")),
        BinaryOperator::Modulo => Ok(a % b),
        _ => Err(Error::type_error(format!("'{}' is not arithmetic", op))),
    }
}

fn compare(op: BinaryOperator, left: &Value, right: &Value) -> Result<Ordering> {
    let ordering = match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => {
                return Err(Error::type_error(format!(
                    "cannot compare {} and {} with '{}'",
                    left.type_name(),
                    right.type_name(),
                    op
                )));
            }
        },
    };
    ordering.ok_or_else(|| Error::arithmetic("comparison with NaN"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addition_keeps_numeric_kind() {
        assert!(binary(BinaryOperator::Add, &2.into(), &3.into())
            .unwrap()
            .identical(&Value::Integer(5)));
        assert!(binary(BinaryOperator::Add, &1.5.into(), &1.0.into())
            .unwrap()
            .identical(&Value::Number(2.5)));
    }

    #[test]
    fn mixed_numeric_addition_is_a_type_error() {
        let err = binary(BinaryOperator::Add, &1.into(), &1.5.into()).unwrap_err();
        assert!(matches!(err, Error::Type(_)));
        let err = binary(BinaryOperator::Add, &"a".into(), &1.into()).unwrap_err();
        assert!(matches!(err, Error::Type(_)));
    }

    #[test]
    fn concatenates_strings_and_arrays() {
        assert_eq!(
            binary(BinaryOperator::Add, &"x".into(), &"y".into()).unwrap(),
            Value::from("xy")
        );
        assert_eq!(
            binary(
                BinaryOperator::Add,
                &Value::Array(vec![1.into()]),
                &Value::Array(vec![2.into()])
            )
            .unwrap(),
            Value::Array(vec![1.into(), 2.into()])
        );
    }

    #[test]
    fn division_by_zero_is_arithmetic_error() {
        for (a, b) in [(Value::Integer(1), Value::Integer(0)), (1.0.into(), 0.0.into())] {
            for op in [BinaryOperator::Divide, BinaryOperator::Modulo] {
                assert!(matches!(binary(op, &a, &b), Err(Error::Arithmetic(_))));
            }
        }
    }

    #[test]
    fn integer_overflow_is_detected() {
        let err = binary(BinaryOperator::Multiply, &i64::MAX.into(), &2.into()).unwrap_err();
        assert!(matches!(err, Error::Arithmetic(_)));
        assert!(unary(UnaryOperator::Negate, &i64::MIN.into()).is_err());
    }

    #[test]
    fn comparisons_mix_numeric_kinds() {
        assert_eq!(
            binary(BinaryOperator::LessThan, &1.into(), &1.5.into()).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            binary(BinaryOperator::GreaterThanOrEqual, &"b".into(), &"a".into()).unwrap(),
            Value::Boolean(true)
        );
        assert!(binary(BinaryOperator::LessThan, &"a".into(), &1.into()).is_err());
    }

    #[test]
    fn indexing_checks_bounds() {
        let items = Value::Array(vec![10.into(), 20.into()]);
        assert_eq!(index(&items, &1.into()).unwrap(), Value::Integer(20));
        assert!(matches!(
            index(&items, &(-1).into()),
            Err(Error::IndexOutOfBounds { index: -1, len: 2 })
        ));
        assert_eq!(index(&"héllo".into(), &1.into()).unwrap(), Value::from("é"));
    }

    #[test]
    fn missing_property_is_null() {
        let object = Value::Object(Default::default());
        assert_eq!(property(&object, "nope").unwrap(), Value::Null);
        assert!(property(&Value::Integer(1), "nope").is_err());
    }
}
