use crate::error::ParseError;

use super::ast::{BinaryOperator, Expression, Script, SourceLocation, Statement, UnaryOperator};
use super::lexer::{Token, TokenKind, tokenize};
use super::value::Value;

/// Name given to scripts parsed without an explicit name.
pub const DEFAULT_SCRIPT_NAME: &str = "script";

/// Deepest expression nesting a script may contain.
pub const MAX_NESTING_DEPTH: usize = 128;

/// Parse source text into a [`Script`].
pub fn parse(source: &str) -> Result<Script, ParseError> {
    parse_named(DEFAULT_SCRIPT_NAME, source)
}

/// Parse source text into a [`Script`], using `name` in source locations.
///
/// Parsing stops at the first error; no partial script is produced.
pub fn parse_named(name: &str, source: &str) -> Result<Script, ParseError> {
    let tokens = tokenize(name, source)?;
    let mut parser = Parser::new(name, tokens);
    let mut statements = Vec::new();
    while !parser.at(&TokenKind::Eof) {
        if parser.eat(&TokenKind::Semicolon) {
            continue;
        }
        statements.push(parser.parse_statement()?);
        parser.expect_statement_end()?;
    }
    Ok(Script::new(name, source, statements))
}

struct Parser<'a> {
    file: &'a str,
    tokens: Vec<Token>,
    index: usize,
    loop_depth: usize,
    // Open sub-expressions on the parse stack; bounded by MAX_NESTING_DEPTH.
    nesting: usize,
    // Inside (), [] or an object literal, line breaks never end an expression.
    grouping_depth: usize,
}

type ParseResult<T> = std::result::Result<T, ParseError>;

impl<'a> Parser<'a> {
    fn new(file: &'a str, tokens: Vec<Token>) -> Self {
        Self {
            file,
            tokens,
            index: 0,
            loop_depth: 0,
            nesting: 0,
            grouping_depth: 0,
        }
    }

    fn current(&self) -> &Token {
        // The token stream always ends with Eof and we never advance past it.
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self, offset: usize) -> &TokenKind {
        let idx = (self.index + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn at(&self, kind: &TokenKind) -> bool {
        &self.current().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if token.kind != TokenKind::Eof {
            self.index += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, context: &str) -> ParseResult<Token> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(context))
        }
    }

    /// Whether the current token may continue the expression on the previous line.
    fn continues_line(&self) -> bool {
        !self.current().newline_before || self.grouping_depth > 0
    }

    fn location_of(&self, token: &Token) -> SourceLocation {
        SourceLocation {
            file: self.file.to_string(),
            start_line: token.line,
            start_column: token.column,
            end_line: token.end_line,
            end_column: token.end_column,
        }
    }

    fn error_at(&self, token: &Token, message: impl Into<String>) -> ParseError {
        ParseError::new(self.location_of(token), message)
    }

    fn unexpected(&self, context: &str) -> ParseError {
        let token = self.current();
        self.error_at(
            token,
            format!("expected {}, found {}", context, token.kind.describe()),
        )
    }

    fn enter(&mut self) -> ParseResult<()> {
        if self.nesting >= MAX_NESTING_DEPTH {
            return Err(self.error_at(
                self.current(),
                format!("expression nested more than {} levels deep", MAX_NESTING_DEPTH),
            ));
        }
        self.nesting += 1;
        Ok(())
    }

    fn leave(&mut self, levels: usize) {
        self.nesting = self.nesting.saturating_sub(levels);
    }

    fn expect_statement_end(&mut self) -> ParseResult<()> {
        if self.eat(&TokenKind::Semicolon)
            || self.at(&TokenKind::Eof)
            || self.at(&TokenKind::RBrace)
            || self.current().newline_before
        {
            Ok(())
        } else {
            Err(self.unexpected("end of statement"))
        }
    }

    fn parse_statement(&mut self) -> ParseResult<Statement> {
        let start = self.current().clone();
        let expression = self.parse_block_item()?;
        // left-leaning operator chains are deeper than the parse stack that built them
        if expression.depth() > MAX_NESTING_DEPTH {
            return Err(self.error_at(
                &start,
                format!("expression nested more than {} levels deep", MAX_NESTING_DEPTH),
            ));
        }
        let end = &self.tokens[self.index.saturating_sub(1)];
        let location = SourceLocation {
            file: self.file.to_string(),
            start_line: start.line,
            start_column: start.column,
            end_line: end.end_line,
            end_column: end.end_column,
        };
        Ok(Statement {
            expression,
            location: Some(location),
        })
    }

    /// Statement-level forms: `let`, `break`, `continue`, or an expression.
    fn parse_block_item(&mut self) -> ParseResult<Expression> {
        match &self.current().kind {
            TokenKind::Let => {
                self.advance();
                let name_token = self.advance();
                let name = match name_token.kind {
                    TokenKind::Ident(name) => name,
                    _ => return Err(self.error_at(&name_token, "expected binding name after 'let'")),
                };
                self.expect(&TokenKind::Assign, "'=' in let binding")?;
                let value = self.parse_expression()?;
                Ok(Expression::Declaration {
                    name,
                    value: Box::new(value),
                })
            }
            TokenKind::Break | TokenKind::Continue => {
                let token = self.advance();
                if self.loop_depth == 0 {
                    return Err(self.error_at(
                        &token,
                        format!("{} outside of a loop", token.kind.describe()),
                    ));
                }
                Ok(if token.kind == TokenKind::Break {
                    Expression::Break
                } else {
                    Expression::Continue
                })
            }
            _ => self.parse_expression(),
        }
    }

    fn parse_expression(&mut self) -> ParseResult<Expression> {
        self.enter()?;
        let expr = self.parse_assignment();
        self.leave(1);
        expr
    }

    fn parse_assignment(&mut self) -> ParseResult<Expression> {
        let start = self.current().clone();
        let target = self.parse_binary(0)?;
        if self.at(&TokenKind::Assign) {
            self.advance();
            return match target {
                Expression::VariableRef(name) => {
                    // right-associative: `a = b = 1`
                    self.enter()?;
                    let value = self.parse_assignment();
                    self.leave(1);
                    let value = value?;
                    Ok(Expression::Assignment {
                        target: name,
                        value: Box::new(value),
                    })
                }
                _ => Err(self.error_at(&start, "invalid assignment target")),
            };
        }
        Ok(target)
    }

    fn parse_binary(&mut self, min_level: usize) -> ParseResult<Expression> {
        if min_level >= PRECEDENCE.len() {
            return self.parse_unary();
        }
        let mut left = self.parse_binary(min_level + 1)?;
        let mut chained = 0;
        loop {
            if !self.continues_line() {
                break;
            }
            let op = match binary_operator(&self.current().kind) {
                Some(op) if PRECEDENCE[min_level].contains(&op) => op,
                _ => break,
            };
            self.enter()?;
            chained += 1;
            self.advance();
            let right = self.parse_binary(min_level + 1)?;
            left = Expression::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        self.leave(chained);
        Ok(left)
    }

    fn parse_unary(&mut self) -> ParseResult<Expression> {
        let op = match self.current().kind {
            TokenKind::Minus => UnaryOperator::Negate,
            TokenKind::Bang => UnaryOperator::Not,
            _ => return self.parse_postfix(),
        };
        self.advance();
        self.enter()?;
        let operand = self.parse_unary();
        self.leave(1);
        let operand = operand?;
        Ok(Expression::UnaryOp {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_postfix(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_primary()?;
        let mut chained = 0;
        loop {
            if matches!(self.current().kind, TokenKind::Dot | TokenKind::LParen | TokenKind::LBracket) {
                self.enter()?;
                chained += 1;
            }
            match self.current().kind {
                TokenKind::Dot => {
                    self.advance();
                    let token = self.advance();
                    let name = match token.kind {
                        TokenKind::Ident(name) => name,
                        _ => return Err(self.error_at(&token, "expected property name after '.'")),
                    };
                    expr = Expression::PropertyAccess {
                        object: Box::new(expr),
                        name,
                    };
                }
                TokenKind::LParen if self.continues_line() => {
                    let open = self.advance();
                    let name = callee_name(&expr)
                        .ok_or_else(|| self.error_at(&open, "only named functions can be called"))?;
                    let args = self.parse_delimited(&TokenKind::RParen, "')'", Self::parse_expression)?;
                    expr = Expression::Call { name, args };
                }
                TokenKind::LBracket if self.continues_line() => {
                    self.advance();
                    self.grouping_depth += 1;
                    let index = self.parse_expression();
                    self.grouping_depth -= 1;
                    let index = index?;
                    self.expect(&TokenKind::RBracket, "']'")?;
                    expr = Expression::IndexAccess {
                        array: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                _ => {
                    self.leave(chained);
                    return Ok(expr);
                }
            }
        }
    }

    fn parse_primary(&mut self) -> ParseResult<Expression> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::Integer(num) => {
                self.advance();
                Ok(Expression::Literal(Value::Integer(num)))
            }
            TokenKind::Number(num) => {
                self.advance();
                Ok(Expression::Literal(Value::Number(num)))
            }
            TokenKind::Str(text) => {
                self.advance();
                Ok(Expression::Literal(Value::String(text)))
            }
            TokenKind::True | TokenKind::False => {
                self.advance();
                Ok(Expression::Literal(Value::Boolean(token.kind == TokenKind::True)))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expression::Literal(Value::Null))
            }
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Expression::VariableRef(name))
            }
            TokenKind::LParen => {
                self.advance();
                self.grouping_depth += 1;
                let inner = self.parse_expression();
                self.grouping_depth -= 1;
                let inner = inner?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::LBracket => {
                self.advance();
                let items = self.parse_delimited(&TokenKind::RBracket, "']'", Self::parse_expression)?;
                Ok(Expression::ArrayLiteral(items))
            }
            TokenKind::LBrace if self.object_literal_ahead() => self.parse_object(),
            TokenKind::LBrace => self.parse_block(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => {
                self.advance();
                let condition = self.parse_condition()?;
                let body = self.parse_loop_body()?;
                Ok(Expression::Loop {
                    condition: Some(Box::new(condition)),
                    body: Box::new(body),
                })
            }
            TokenKind::Loop => {
                self.advance();
                let body = self.parse_loop_body()?;
                Ok(Expression::Loop {
                    condition: None,
                    body: Box::new(body),
                })
            }
            _ => Err(self.unexpected("an expression")),
        }
    }

    /// `{}` and `{ key: ...` open object literals; any other brace opens a block.
    fn object_literal_ahead(&self) -> bool {
        match self.peek_kind(1) {
            TokenKind::RBrace => true,
            TokenKind::Ident(_) | TokenKind::Str(_) => matches!(self.peek_kind(2), TokenKind::Colon),
            _ => false,
        }
    }

    fn parse_object(&mut self) -> ParseResult<Expression> {
        self.expect(&TokenKind::LBrace, "'{'")?;
        self.grouping_depth += 1;
        let entries = self.parse_object_entries();
        self.grouping_depth -= 1;
        entries.map(Expression::ObjectLiteral)
    }

    fn parse_object_entries(&mut self) -> ParseResult<Vec<(String, Expression)>> {
        let mut entries: Vec<(String, Expression)> = Vec::new();
        loop {
            if self.eat(&TokenKind::RBrace) {
                return Ok(entries);
            }
            let key_token = self.advance();
            let key = match key_token.kind {
                TokenKind::Ident(name) | TokenKind::Str(name) => name,
                _ => return Err(self.error_at(&key_token, "expected object key")),
            };
            self.expect(&TokenKind::Colon, "':' after object key")?;
            let value = self.parse_expression()?;
            // Duplicate keys: the last occurrence wins.
            entries.retain(|(existing, _)| existing != &key);
            entries.push((key, value));
            if !self.eat(&TokenKind::Comma) {
                self.expect(&TokenKind::RBrace, "',' or '}' in object literal")?;
                return Ok(entries);
            }
        }
    }

    fn parse_block(&mut self) -> ParseResult<Expression> {
        self.expect(&TokenKind::LBrace, "'{'")?;
        // Statement separation rules apply again inside a block.
        let saved_grouping = std::mem::replace(&mut self.grouping_depth, 0);
        let items = self.parse_block_items();
        self.grouping_depth = saved_grouping;
        items.map(Expression::Block)
    }

    fn parse_block_items(&mut self) -> ParseResult<Vec<Expression>> {
        let mut items = Vec::new();
        loop {
            if self.eat(&TokenKind::Semicolon) {
                continue;
            }
            if self.eat(&TokenKind::RBrace) {
                return Ok(items);
            }
            if self.at(&TokenKind::Eof) {
                return Err(self.unexpected("'}' to close block"));
            }
            items.push(self.parse_block_item()?);
            self.expect_statement_end()?;
        }
    }

    fn parse_condition(&mut self) -> ParseResult<Expression> {
        // Conditions are not grouped: `if x\n{` still reads the brace as the body.
        let saved_grouping = std::mem::replace(&mut self.grouping_depth, 0);
        let condition = self.parse_expression();
        self.grouping_depth = saved_grouping;
        let condition = condition?;
        if !self.at(&TokenKind::LBrace) {
            return Err(self.unexpected("'{'"));
        }
        Ok(condition)
    }

    fn parse_if(&mut self) -> ParseResult<Expression> {
        self.expect(&TokenKind::If, "'if'")?;
        let condition = self.parse_condition()?;
        let then_branch = self.parse_block()?;
        let else_branch = if self.at(&TokenKind::Else) {
            self.advance();
            if self.at(&TokenKind::If) {
                Some(Box::new(self.parse_if()?))
            } else if self.at(&TokenKind::LBrace) {
                Some(Box::new(self.parse_block()?))
            } else {
                return Err(self.unexpected("'{' or 'if' after 'else'"));
            }
        } else {
            None
        };
        Ok(Expression::If {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch,
        })
    }

    fn parse_loop_body(&mut self) -> ParseResult<Expression> {
        if !self.at(&TokenKind::LBrace) {
            return Err(self.unexpected("'{' to open loop body"));
        }
        self.loop_depth += 1;
        let body = self.parse_block();
        self.loop_depth -= 1;
        body
    }

    fn parse_delimited(
        &mut self,
        close: &TokenKind,
        close_desc: &str,
        mut item: impl FnMut(&mut Self) -> ParseResult<Expression>,
    ) -> ParseResult<Vec<Expression>> {
        self.grouping_depth += 1;
        let mut items = Vec::new();
        let result = loop {
            if self.eat(close) {
                break Ok(items);
            }
            match item(self) {
                Ok(expr) => items.push(expr),
                Err(err) => break Err(err),
            }
            if !self.eat(&TokenKind::Comma) {
                break match self.expect(close, close_desc) {
                    Ok(_) => Ok(items),
                    Err(err) => Err(err),
                };
            }
        };
        self.grouping_depth -= 1;
        result
    }
}

/// Binary operator groups from lowest to highest precedence.
const PRECEDENCE: &[&[BinaryOperator]] = &[
    &[BinaryOperator::Or],
    &[BinaryOperator::And],
    &[BinaryOperator::Equal, BinaryOperator::NotEqual],
    &[
        BinaryOperator::LessThan,
        BinaryOperator::LessThanOrEqual,
        BinaryOperator::GreaterThan,
        BinaryOperator::GreaterThanOrEqual,
    ],
    &[BinaryOperator::Add, BinaryOperator::Subtract],
    &[
        BinaryOperator::Multiply,
        BinaryOperator::Divide,
        BinaryOperator::Modulo,
    ],
];

fn binary_operator(kind: &TokenKind) -> Option<BinaryOperator> {
    Some(match kind {
        TokenKind::OrOr => BinaryOperator::Or,
        TokenKind::AndAnd => BinaryOperator::And,
        TokenKind::EqEq => BinaryOperator::Equal,
        TokenKind::NotEq => BinaryOperator::NotEqual,
        TokenKind::Less => BinaryOperator::LessThan,
        TokenKind::LessEq => BinaryOperator::LessThanOrEqual,
        TokenKind::Greater => BinaryOperator::GreaterThan,
        TokenKind::GreaterEq => BinaryOperator::GreaterThanOrEqual,
        TokenKind::Plus => BinaryOperator::Add,
        TokenKind::Minus => BinaryOperator::Subtract,
        TokenKind::Star => BinaryOperator::Multiply,
        TokenKind::Slash => BinaryOperator::Divide,
        TokenKind::Percent => BinaryOperator::Modulo,
        _ => return None,
    })
}

/// Flatten `a` or `a.b.c` into a callable name.
fn callee_name(expr: &Expression) -> Option<String> {
    match expr {
        Expression::VariableRef(name) => Some(name.clone()),
        Expression::PropertyAccess { object, name } => {
            callee_name(object).map(|prefix| format!("{}.{}", prefix, name))
        }
        _ => None,
    }
}
