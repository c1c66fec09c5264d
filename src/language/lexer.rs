use crate::error::ParseError;

use super::ast::SourceLocation;

/// Lexical token categories.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Integer(i64),
    Number(f64),
    Str(String),
    Ident(String),
    // keywords
    Let,
    If,
    Else,
    While,
    Loop,
    Break,
    Continue,
    True,
    False,
    Null,
    // punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Semicolon,
    Dot,
    // operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Assign,
    EqEq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    AndAnd,
    OrOr,
    Eof,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Integer(num) => format!("integer {}", num),
            TokenKind::Number(num) => format!("number {}", num),
            TokenKind::Str(_) => "string literal".to_string(),
            TokenKind::Ident(name) => format!("identifier '{}'", name),
            TokenKind::Eof => "end of input".to_string(),
            other => format!("'{}'", other.spelling()),
        }
    }

    fn spelling(&self) -> &'static str {
        match self {
            TokenKind::Let => "let",
            TokenKind::If => "if",
            TokenKind::Else => "else",
            TokenKind::While => "while",
            TokenKind::Loop => "loop",
            TokenKind::Break => "break",
            TokenKind::Continue => "continue",
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::Null => "null",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::Semicolon => ";",
            TokenKind::Dot => ".",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Bang => "!",
            TokenKind::Assign => "=",
            TokenKind::EqEq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::Less => "<",
            TokenKind::LessEq => "<=",
            TokenKind::Greater => ">",
            TokenKind::GreaterEq => ">=",
            TokenKind::AndAnd => "&&",
            TokenKind::OrOr => "||",
            _ => "?",
        }
    }
}

/// Token with its span and whether a line break preceded it.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
    pub end_line: usize,
    pub end_column: usize,
    pub newline_before: bool,
}

/// Keyword token for `text`, if it is reserved.
pub(crate) fn keyword(text: &str) -> Option<TokenKind> {
    Some(match text {
        "let" => TokenKind::Let,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "loop" => TokenKind::Loop,
        "break" => TokenKind::Break,
        "continue" => TokenKind::Continue,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "null" => TokenKind::Null,
        _ => return None,
    })
}

/// Split source text into tokens, ending with a single `Eof` token.
pub fn tokenize(file: &str, source: &str) -> Result<Vec<Token>, ParseError> {
    let mut lexer = Lexer::new(file, source);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

struct Lexer<'a> {
    file: &'a str,
    chars: Vec<char>,
    index: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    fn new(file: &'a str, source: &str) -> Self {
        Self {
            file,
            chars: source.chars().collect(),
            index: 0,
            line: 1,
            column: 1,
        }
    }

    fn current(&self) -> Option<char> {
        self.chars.get(self.index).copied()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.index + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.current()?;
        self.index += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.current() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(
            SourceLocation::point(self.file, self.line, self.column),
            message,
        )
    }

    /// Skip whitespace and `//` comments, reporting whether a newline was crossed.
    fn skip_trivia(&mut self) -> bool {
        let mut newline = false;
        while let Some(ch) = self.current() {
            if ch == '\n' {
                newline = true;
                self.advance();
            } else if ch.is_whitespace() {
                self.advance();
            } else if ch == '/' && self.peek() == Some('/') {
                while let Some(ch) = self.current() {
                    if ch == '\n' {
                        break;
                    }
                    self.advance();
                }
            } else {
                break;
            }
        }
        newline
    }

    fn next_token(&mut self) -> Result<Token, ParseError> {
        let newline_before = self.skip_trivia();
        let line = self.line;
        let column = self.column;
        let kind = match self.current() {
            None => TokenKind::Eof,
            Some(ch) if ch.is_ascii_digit() => self.number()?,
            Some(ch) if ch == '_' || ch.is_alphabetic() => self.word(),
            Some('"') => self.string()?,
            Some(ch) => {
                self.advance();
                self.symbol(ch)?
            }
        };
        Ok(Token {
            kind,
            line,
            column,
            end_line: self.line,
            end_column: self.column,
            newline_before,
        })
    }

    fn symbol(&mut self, ch: char) -> Result<TokenKind, ParseError> {
        let kind = match ch {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            ';' => TokenKind::Semicolon,
            '.' => TokenKind::Dot,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '!' if self.eat('=') => TokenKind::NotEq,
            '!' => TokenKind::Bang,
            '=' if self.eat('=') => TokenKind::EqEq,
            '=' => TokenKind::Assign,
            '<' if self.eat('=') => TokenKind::LessEq,
            '<' => TokenKind::Less,
            '>' if self.eat('=') => TokenKind::GreaterEq,
            '>' => TokenKind::Greater,
            '&' if self.eat('&') => TokenKind::AndAnd,
            '|' if self.eat('|') => TokenKind::OrOr,
            other => {
                return Err(ParseError::new(
                    SourceLocation::point(self.file, self.line, self.column - 1),
                    format!("unexpected character '{}'", other),
                ));
            }
        };
        Ok(kind)
    }

    fn word(&mut self) -> TokenKind {
        let mut text = String::new();
        while let Some(ch) = self.current() {
            if ch == '_' || ch.is_alphanumeric() {
                text.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        keyword(&text).unwrap_or(TokenKind::Ident(text))
    }

    fn number(&mut self) -> Result<TokenKind, ParseError> {
        let start_line = self.line;
        let start_column = self.column;
        let mut text = String::new();
        let mut is_float = false;

        self.digits(&mut text);
        if self.current() == Some('.') && self.peek().is_some_and(|ch| ch.is_ascii_digit()) {
            is_float = true;
            text.push('.');
            self.advance();
            self.digits(&mut text);
        }
        if matches!(self.current(), Some('e' | 'E')) {
            let sign = matches!(self.peek(), Some('+' | '-'));
            let digit_at = if sign { self.index + 2 } else { self.index + 1 };
            if self.chars.get(digit_at).is_some_and(|ch| ch.is_ascii_digit()) {
                is_float = true;
                text.push('e');
                self.advance();
                if sign {
                    text.push(self.advance().unwrap_or('+'));
                }
                self.digits(&mut text);
            }
        }

        let location = || SourceLocation::point(self.file, start_line, start_column);
        if is_float {
            match text.parse::<f64>() {
                Ok(num) if num.is_finite() => Ok(TokenKind::Number(num)),
                Ok(_) => Err(ParseError::new(location(), "number literal out of range")),
                Err(_) => Err(ParseError::new(location(), "invalid number literal")),
            }
        } else {
            text.parse::<i64>()
                .map(TokenKind::Integer)
                .map_err(|_| ParseError::new(location(), "integer literal out of range"))
        }
    }

    fn digits(&mut self, text: &mut String) {
        while let Some(ch) = self.current() {
            if ch.is_ascii_digit() {
                text.push(ch);
                self.advance();
            } else if ch == '_' && self.peek().is_some_and(|next| next.is_ascii_digit()) {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn string(&mut self) -> Result<TokenKind, ParseError> {
        let start = SourceLocation::point(self.file, self.line, self.column);
        self.advance(); // opening quote
        let mut buf = String::new();
        loop {
            let ch = match self.advance() {
                Some(ch) => ch,
                None => return Err(ParseError::new(start, "unterminated string literal")),
            };
            match ch {
                '"' => return Ok(TokenKind::Str(buf)),
                '\\' => {
                    let escaped = self
                        .advance()
                        .ok_or_else(|| self.error_here("incomplete escape"))?;
                    let value = match escaped {
                        '"' => '"',
                        '\\' => '\\',
                        'n' => '\n',
                        'r' => '\r',
                        't' => '\t',
                        '0' => '\0',
                        'u' => self.unicode_escape()?,
                        other => {
                            return Err(self.error_here(format!("unknown escape: \\{}", other)));
                        }
                    };
                    buf.push(value);
                }
                other => buf.push(other),
            }
        }
    }

    fn unicode_escape(&mut self) -> Result<char, ParseError> {
        if !self.eat('{') {
            return Err(self.error_here("expected '{' after \\u"));
        }
        let mut hex = String::new();
        while let Some(ch) = self.current() {
            if ch == '}' {
                break;
            }
            hex.push(ch);
            self.advance();
        }
        if !self.eat('}') {
            return Err(self.error_here("unterminated unicode escape"));
        }
        u32::from_str_radix(&hex, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| self.error_here(format!("invalid unicode escape '{}'", hex)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize("test", source)
            .expect("tokenize")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn lexes_numbers() {
        assert_eq!(
            kinds("12 1.5 2e3 1_000"),
            vec![
                TokenKind::Integer(12),
                TokenKind::Number(1.5),
                TokenKind::Number(2000.0),
                TokenKind::Integer(1000),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn member_access_on_integer_is_not_a_float() {
        assert_eq!(
            kinds("xs.0"),
            vec![
                TokenKind::Ident("xs".into()),
                TokenKind::Dot,
                TokenKind::Integer(0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn skips_comments_and_tracks_newlines() {
        let tokens = tokenize("test", "a // note\nb").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Ident("a".into()));
        assert!(!tokens[0].newline_before);
        assert_eq!(tokens[1].kind, TokenKind::Ident("b".into()));
        assert!(tokens[1].newline_before);
        assert_eq!(tokens[1].line, 2);
    }

    #[test]
    fn lexes_two_character_operators() {
        assert_eq!(
            kinds("<= >= == != && || ="),
            vec![
                TokenKind::LessEq,
                TokenKind::GreaterEq,
                TokenKind::EqEq,
                TokenKind::NotEq,
                TokenKind::AndAnd,
                TokenKind::OrOr,
                TokenKind::Assign,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn reports_unterminated_string_location() {
        let err = tokenize("test", "x = \"open").unwrap_err();
        assert_eq!(err.location.start_line, 1);
        assert_eq!(err.location.start_column, 5);
    }

    #[test]
    fn decodes_unicode_escape() {
        assert_eq!(
            kinds(r#""\u{e9}""#),
            vec![TokenKind::Str("é".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn rejects_integer_overflow() {
        assert!(tokenize("test", "9223372036854775808").is_err());
    }

    #[test]
    fn rejects_float_overflow() {
        let err = tokenize("test", "x = 1e400").unwrap_err();
        assert!(err.message.contains("out of range"));
        assert_eq!(err.location.start_column, 5);
        assert!(tokenize("test", "1e308").is_ok());
    }
}
