use std::collections::BTreeMap;

use crate::language::ast::{BinaryOperator, Expression, Script, Statement};
use crate::language::{Value, operators};

/// Rewrite `script` with constant folding and dead-branch elimination.
///
/// Folding reuses the runtime operator semantics; an operation that would
/// fail at runtime (division by zero, type errors) is left in place so the
/// error surfaces when the program runs.
///
/// Callers bound tree depth first; folding recurses once per level.
pub(crate) fn optimize(script: &Script) -> Script {
    Script {
        name: script.name.clone(),
        source: script.source.clone(),
        metadata: script.metadata.clone(),
        statements: script
            .statements
            .iter()
            .map(|statement| Statement {
                expression: fold(&statement.expression),
                location: statement.location.clone(),
            })
            .collect(),
    }
}

fn literal(value: Value) -> Expression {
    Expression::Literal(value)
}

fn fold(expr: &Expression) -> Expression {
    match expr {
        Expression::BinaryOp { left, op, right } => {
            let left = fold(left);
            let right = fold(right);
            if let Some(folded) = fold_binary(*op, &left, &right) {
                return folded;
            }
            Expression::BinaryOp {
                left: Box::new(left),
                op: *op,
                right: Box::new(right),
            }
        }
        Expression::UnaryOp { op, operand } => {
            let operand = fold(operand);
            if let Some(Ok(value)) = operand.as_literal().map(|value| operators::unary(*op, value)) {
                return literal(value);
            }
            Expression::UnaryOp {
                op: *op,
                operand: Box::new(operand),
            }
        }
        Expression::If {
            condition,
            then_branch,
            else_branch,
        } => {
            let condition = fold(condition);
            match condition.as_literal().and_then(Value::as_bool) {
                Some(true) => fold(then_branch),
                Some(false) => else_branch
                    .as_deref()
                    .map(fold)
                    .unwrap_or(literal(Value::Null)),
                None => Expression::If {
                    condition: Box::new(condition),
                    then_branch: Box::new(fold(then_branch)),
                    else_branch: else_branch.as_deref().map(|branch| Box::new(fold(branch))),
                },
            }
        }
        Expression::Loop { condition, body } => {
            let condition = condition.as_deref().map(fold);
            if let Some(Some(false)) = condition
                .as_ref()
                .map(|cond| cond.as_literal().and_then(Value::as_bool))
            {
                return literal(Value::Null);
            }
            Expression::Loop {
                condition: condition.map(Box::new),
                body: Box::new(fold(body)),
            }
        }
        Expression::Call { name, args } => Expression::Call {
            name: name.clone(),
            args: args.iter().map(fold).collect(),
        },
        Expression::Block(items) => Expression::Block(items.iter().map(fold).collect()),
        Expression::Assignment { target, value } => Expression::Assignment {
            target: target.clone(),
            value: Box::new(fold(value)),
        },
        Expression::Declaration { name, value } => Expression::Declaration {
            name: name.clone(),
            value: Box::new(fold(value)),
        },
        Expression::ArrayLiteral(items) => {
            let items: Vec<Expression> = items.iter().map(fold).collect();
            match items.iter().map(|item| item.as_literal().cloned()).collect::<Option<Vec<_>>>() {
                Some(values) => literal(Value::Array(values)),
                None => Expression::ArrayLiteral(items),
            }
        }
        Expression::ObjectLiteral(entries) => {
            let entries: Vec<(String, Expression)> = entries
                .iter()
                .map(|(key, value)| (key.clone(), fold(value)))
                .collect();
            let values = entries
                .iter()
                .map(|(key, value)| value.as_literal().map(|v| (key.clone(), v.clone())))
                .collect::<Option<BTreeMap<_, _>>>();
            match values {
                Some(object) => literal(Value::Object(object)),
                None => Expression::ObjectLiteral(entries),
            }
        }
        Expression::PropertyAccess { object, name } => Expression::PropertyAccess {
            object: Box::new(fold(object)),
            name: name.clone(),
        },
        Expression::IndexAccess { array, index } => Expression::IndexAccess {
            array: Box::new(fold(array)),
            index: Box::new(fold(index)),
        },
        Expression::Literal(_)
        | Expression::VariableRef(_)
        | Expression::Break
        | Expression::Continue => expr.clone(),
    }
}

fn fold_binary(op: BinaryOperator, left: &Expression, right: &Expression) -> Option<Expression> {
    let lhs = left.as_literal()?;
    if op.is_logical() {
        // `false && e` and `true || e` never evaluate `e`
        match (op, lhs.as_bool()?) {
            (BinaryOperator::And, false) => return Some(literal(Value::Boolean(false))),
            (BinaryOperator::Or, true) => return Some(literal(Value::Boolean(true))),
            _ => {}
        }
    }
    let rhs = right.as_literal()?;
    operators::binary(op, lhs, rhs).ok().map(literal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::parse;

    fn optimized(source: &str) -> Expression {
        let script = optimize(&parse(source).unwrap());
        script.statements[0].expression.clone()
    }

    #[test]
    fn folds_constant_arithmetic() {
        assert_eq!(optimized("2 * (3 + 4)"), literal(Value::Integer(14)));
        assert_eq!(optimized("\"x\" + \"y\""), literal(Value::from("xy")));
    }

    #[test]
    fn leaves_failing_operations_for_runtime() {
        assert!(matches!(optimized("1 / 0"), Expression::BinaryOp { .. }));
        assert!(matches!(optimized("1 + \"a\""), Expression::BinaryOp { .. }));
    }

    #[test]
    fn removes_statically_dead_branches() {
        assert_eq!(
            optimized("if 1 < 2 { a } else { b }"),
            Expression::Block(vec![Expression::VariableRef("a".into())])
        );
        assert_eq!(optimized("if false { a }"), literal(Value::Null));
        assert_eq!(optimized("while false { a }"), literal(Value::Null));
    }

    #[test]
    fn short_circuits_logical_literals() {
        assert_eq!(optimized("false && missing"), literal(Value::Boolean(false)));
        assert!(matches!(optimized("true && missing"), Expression::BinaryOp { .. }));
    }

    #[test]
    fn folds_literal_collections() {
        assert_eq!(
            optimized("[1, 2 + 3]"),
            literal(Value::Array(vec![1.into(), 5.into()]))
        );
        assert!(matches!(optimized("{ a: x }"), Expression::ObjectLiteral(_)));
    }
}
