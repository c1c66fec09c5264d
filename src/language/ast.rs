use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::value::Value;

/// Abstract syntax tree node. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Expression {
    /// Literal value.
    Literal(Value),
    /// Reference to a named binding.
    VariableRef(String),
    /// Binary operation.
    BinaryOp {
        /// Left operand.
        left: Box<Expression>,
        /// Operator.
        op: BinaryOperator,
        /// Right operand.
        right: Box<Expression>,
    },
    /// Unary operation.
    UnaryOp {
        /// Operator.
        op: UnaryOperator,
        /// Operand.
        operand: Box<Expression>,
    },
    /// Call of a standard-library function or a `namespace.function` capability.
    Call {
        /// Function name, dotted for host capabilities.
        name: String,
        /// Argument expressions, evaluated left to right.
        args: Vec<Expression>,
    },
    /// Scoped sequence; its value is the value of the last expression.
    Block(Vec<Expression>),
    /// Conditional with optional else branch.
    If {
        /// Condition, must evaluate to a boolean.
        condition: Box<Expression>,
        /// Branch taken when the condition is true.
        then_branch: Box<Expression>,
        /// Branch taken when the condition is false.
        else_branch: Option<Box<Expression>>,
    },
    /// Loop with an optional pre-iteration condition.
    Loop {
        /// Checked before each iteration; `None` loops until `break` or budget.
        condition: Option<Box<Expression>>,
        /// Loop body.
        body: Box<Expression>,
    },
    /// Update of an existing binding.
    Assignment {
        /// Binding name.
        target: String,
        /// New value.
        value: Box<Expression>,
    },
    /// `let` binding in the innermost scope.
    Declaration {
        /// Binding name.
        name: String,
        /// Initial value.
        value: Box<Expression>,
    },
    /// Object construction. Keys are unique; entries keep source order.
    ObjectLiteral(Vec<(String, Expression)>),
    /// Array construction.
    ArrayLiteral(Vec<Expression>),
    /// `object.name`
    PropertyAccess {
        /// Object expression.
        object: Box<Expression>,
        /// Property name.
        name: String,
    },
    /// `array[index]`
    IndexAccess {
        /// Indexed expression.
        array: Box<Expression>,
        /// Index expression.
        index: Box<Expression>,
    },
    /// Leave the innermost loop.
    Break,
    /// Skip to the next iteration of the innermost loop.
    Continue,
}

impl Expression {
    /// Literal payload, if this node is a literal.
    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Expression::Literal(value) => Some(value),
            _ => None,
        }
    }

    /// Direct sub-expressions, in evaluation order.
    pub fn children(&self) -> Vec<&Expression> {
        match self {
            Expression::Literal(_)
            | Expression::VariableRef(_)
            | Expression::Break
            | Expression::Continue => Vec::new(),
            Expression::BinaryOp { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Expression::UnaryOp { operand, .. } => vec![operand.as_ref()],
            Expression::Call { args, .. } => args.iter().collect(),
            Expression::Block(items) | Expression::ArrayLiteral(items) => items.iter().collect(),
            Expression::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let mut children = vec![condition.as_ref(), then_branch.as_ref()];
                children.extend(else_branch.as_deref());
                children
            }
            Expression::Loop { condition, body } => {
                let mut children: Vec<&Expression> = condition.as_deref().into_iter().collect();
                children.push(body.as_ref());
                children
            }
            Expression::Assignment { value, .. } | Expression::Declaration { value, .. } => {
                vec![value.as_ref()]
            }
            Expression::ObjectLiteral(entries) => entries.iter().map(|(_, value)| value).collect(),
            Expression::PropertyAccess { object, .. } => vec![object.as_ref()],
            Expression::IndexAccess { array, index } => vec![array.as_ref(), index.as_ref()],
        }
    }

    /// Visit this node and every descendant in evaluation order.
    ///
    /// Uses an explicit work list, so arbitrarily deep trees are safe to walk.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Expression)) {
        let mut pending = vec![self];
        while let Some(expr) = pending.pop() {
            visit(expr);
            pending.extend(expr.children().into_iter().rev());
        }
    }

    /// Length of the longest path from this node to a leaf, counting both ends.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut pending = vec![(self, 1)];
        while let Some((expr, level)) = pending.pop() {
            deepest = deepest.max(level);
            pending.extend(expr.children().into_iter().map(|child| (child, level + 1)));
        }
        deepest
    }
}

/// Binary operators, listed from lowest to highest precedence group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOperator {
    /// `||`
    Or,
    /// `&&`
    And,
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessThanOrEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanOrEqual,
    /// `+`
    Add,
    /// `-`
    Subtract,
    /// `*`
    Multiply,
    /// `/`
    Divide,
    /// `%`
    Modulo,
}

impl BinaryOperator {
    /// Source spelling of the operator.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Or => "||",
            BinaryOperator::And => "&&",
            BinaryOperator::Equal => "==",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessThanOrEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterThanOrEqual => ">=",
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
        }
    }

    /// Whether the operator short-circuits on its left operand.
    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOperator::And | BinaryOperator::Or)
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOperator {
    /// Numeric negation (`-`).
    Negate,
    /// Logical not (`!`).
    Not,
}

impl fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOperator::Negate => f.write_str("-"),
            UnaryOperator::Not => f.write_str("!"),
        }
    }
}

/// Source span of a statement (1-based lines and columns).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Source file or script name.
    pub file: String,
    /// Start line.
    pub start_line: usize,
    /// Start column.
    pub start_column: usize,
    /// End line.
    pub end_line: usize,
    /// End column.
    pub end_column: usize,
}

impl SourceLocation {
    /// Zero-width location at a single position.
    pub fn point(file: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            file: file.into(),
            start_line: line,
            start_column: column,
            end_line: line,
            end_column: column,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}-{}:{}",
            self.file, self.start_line, self.start_column, self.end_line, self.end_column
        )
    }
}

/// An expression annotated with where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    /// Statement expression.
    pub expression: Expression,
    /// Location information, absent for synthesized statements.
    pub location: Option<SourceLocation>,
}

/// Parsed, immutable executable unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    /// Script identifier.
    pub name: String,
    /// Statements in execution order.
    pub statements: Vec<Statement>,
    /// Original source text, retained for error reporting and debugging.
    pub source: String,
    /// Free-form metadata (template provenance and so on).
    pub metadata: BTreeMap<String, String>,
}

impl Script {
    /// Construct a script from parsed statements.
    pub fn new(name: impl Into<String>, source: impl Into<String>, statements: Vec<Statement>) -> Self {
        Self {
            name: name.into(),
            statements,
            source: source.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Deepest expression tree among the statements.
    pub fn depth(&self) -> usize {
        self.statements
            .iter()
            .map(|statement| statement.expression.depth())
            .max()
            .unwrap_or(0)
    }

    /// Every `Call` node in the script, in source order.
    pub fn calls(&self) -> Vec<(&str, &[Expression])> {
        let mut calls = Vec::new();
        for statement in &self.statements {
            statement.expression.walk(&mut |expr| {
                if let Expression::Call { name, args } = expr {
                    calls.push((name.as_str(), args.as_slice()));
                }
            });
        }
        calls
    }
}
