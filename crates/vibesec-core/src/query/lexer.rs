//! Tokenizer for EQL query strings
//!
//! The lexer never fails: characters it does not understand, and literals
//! that are never closed, become [`TokenKind::Unknown`] so the parser can
//! report them with a position.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TokenKind {
    Taint,
    And,
    Or,
    Not,
    Source,
    Sink,
    Sanitizer,
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Colon,
    Comma,
    Pipe,
    Identifier(String),
    String(String),
    Regex { pattern: String, flags: String },
    Unknown(String),
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Taint => f.write_str("TAINT"),
            TokenKind::And => f.write_str("AND"),
            TokenKind::Or => f.write_str("OR"),
            TokenKind::Not => f.write_str("NOT"),
            TokenKind::Source => f.write_str("SOURCE"),
            TokenKind::Sink => f.write_str("SINK"),
            TokenKind::Sanitizer => f.write_str("SANITIZER"),
            TokenKind::LeftParen => f.write_str("'('"),
            TokenKind::RightParen => f.write_str("')'"),
            TokenKind::LeftBrace => f.write_str("'{'"),
            TokenKind::RightBrace => f.write_str("'}'"),
            TokenKind::LeftBracket => f.write_str("'['"),
            TokenKind::RightBracket => f.write_str("']'"),
            TokenKind::Colon => f.write_str("':'"),
            TokenKind::Comma => f.write_str("','"),
            TokenKind::Pipe => f.write_str("'|'"),
            TokenKind::Identifier(name) => write!(f, "identifier `{}`", name),
            TokenKind::String(value) => write!(f, "string \"{}\"", value),
            TokenKind::Regex { pattern, .. } => write!(f, "regex /{}/", pattern),
            TokenKind::Unknown(text) => write!(f, "unexpected `{}`", text),
            TokenKind::Eof => f.write_str("end of query"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

/// Splits a query into tokens. The stream always ends with [`TokenKind::Eof`].
pub fn tokenize(source: &str) -> Vec<Token> {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    source: &'a str,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.char_indices().peekable(),
            source,
            line: 1,
            column: 1,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<Token> {
        while let Some(&(offset, c)) = self.chars.peek() {
            let (line, column) = (self.line, self.column);

            let kind = match c {
                c if c.is_whitespace() => {
                    self.bump();
                    continue;
                }
                '#' => {
                    self.skip_comment();
                    continue;
                }
                '(' => self.single(TokenKind::LeftParen),
                ')' => self.single(TokenKind::RightParen),
                '{' => self.single(TokenKind::LeftBrace),
                '}' => self.single(TokenKind::RightBrace),
                '[' => self.single(TokenKind::LeftBracket),
                ']' => self.single(TokenKind::RightBracket),
                ':' => self.single(TokenKind::Colon),
                ',' => self.single(TokenKind::Comma),
                '|' => self.single(TokenKind::Pipe),
                '"' | '\'' => self.string(offset, c),
                '/' => self.regex(offset),
                c if is_ident_start(c) => self.identifier(offset),
                other => {
                    self.bump();
                    TokenKind::Unknown(other.to_string())
                }
            };

            self.tokens.push(Token {
                kind,
                offset,
                line,
                column,
            });
        }

        self.tokens.push(Token {
            kind: TokenKind::Eof,
            offset: self.source.len(),
            line: self.line,
            column: self.column,
        });
        self.tokens
    }

    fn bump(&mut self) -> Option<char> {
        let (_, c) = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.bump();
        kind
    }

    fn skip_comment(&mut self) {
        while let Some(&(_, c)) = self.chars.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn identifier(&mut self, start: usize) -> TokenKind {
        let mut end = start;
        while let Some(&(offset, c)) = self.chars.peek() {
            if !is_ident_continue(c) {
                break;
            }
            end = offset + c.len_utf8();
            self.bump();
        }

        let word = &self.source[start..end];
        keyword(word).unwrap_or_else(|| TokenKind::Identifier(word.to_string()))
    }

    fn string(&mut self, start: usize, quote: char) -> TokenKind {
        self.bump();
        let mut value = String::new();

        while let Some(c) = self.bump() {
            match c {
                c if c == quote => return TokenKind::String(value),
                '\\' => match self.bump() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some(other) => value.push(other),
                    None => break,
                },
                other => value.push(other),
            }
        }

        TokenKind::Unknown(self.source[start..].to_string())
    }

    fn regex(&mut self, start: usize) -> TokenKind {
        self.bump();
        let mut pattern = String::new();
        let mut closed = false;

        while let Some(c) = self.bump() {
            match c {
                '/' => {
                    closed = true;
                    break;
                }
                // `\/` is an escaped delimiter; other escapes belong to the regex
                '\\' => match self.bump() {
                    Some('/') => pattern.push('/'),
                    Some(other) => {
                        pattern.push('\\');
                        pattern.push(other);
                    }
                    None => break,
                },
                '\n' => break,
                other => pattern.push(other),
            }
        }

        if !closed {
            return TokenKind::Unknown(self.source[start..].trim_end().to_string());
        }

        let mut flags = String::new();
        while let Some(&(_, c)) = self.chars.peek() {
            if !c.is_ascii_alphabetic() {
                break;
            }
            flags.push(c);
            self.bump();
        }

        TokenKind::Regex { pattern, flags }
    }
}

fn keyword(word: &str) -> Option<TokenKind> {
    let kind = match word.to_ascii_uppercase().as_str() {
        "TAINT" => TokenKind::Taint,
        "AND" => TokenKind::And,
        "OR" => TokenKind::Or,
        "NOT" => TokenKind::Not,
        "SOURCE" => TokenKind::Source,
        "SINK" => TokenKind::Sink,
        "SANITIZER" => TokenKind::Sanitizer,
        _ => return None,
    };
    Some(kind)
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '$' | '.' | '-')
}
