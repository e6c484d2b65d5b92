//! Recursive-descent parser turning EQL tokens into a [`Query`]
//!
//! ```text
//! TAINT {
//!     SOURCE: { MemberExpression: /req\.(body|query)/ },
//!     SINK: { CallExpression: ["eval", /exec\(/i] },
//!     SANITIZER: [{ CallExpression: "escape" }]
//! }
//! ```

use std::collections::BTreeSet;

use super::lexer::{Token, TokenKind, tokenize};
use super::{
    LogicalExpression, LogicalOperator, NodeMatcher, PatternExpression, PatternKind, PatternSpec,
    Query, QueryExpression, TaintExpression,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("syntax error at line {line}, column {column}: {message}")]
pub struct SyntaxError {
    pub message: String,
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl SyntaxError {
    fn at(token: &Token, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            offset: token.offset,
            line: token.line,
            column: token.column,
        }
    }
}

/// Deepest allowed nesting of AND/OR/NOT.
pub const MAX_NESTING: usize = 64;

/// Tokenizes and parses a query string.
pub fn parse_query(source: &str) -> Result<Query, SyntaxError> {
    parse(&tokenize(source))
}

/// Parses a token stream. The same tokens always give the same result.
pub fn parse(tokens: &[Token]) -> Result<Query, SyntaxError> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expression = parser.expression()?;
    parser.expect_end()?;
    Ok(Query::new(expression))
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Result<&'a Token, SyntaxError> {
        self.tokens.get(self.pos).ok_or_else(|| SyntaxError {
            message: "unexpected end of query".to_string(),
            offset: self.tokens.last().map(|t| t.offset).unwrap_or(0),
            line: self.tokens.last().map(|t| t.line).unwrap_or(1),
            column: self.tokens.last().map(|t| t.column).unwrap_or(1),
        })
    }

    fn advance(&mut self) -> Result<&'a Token, SyntaxError> {
        let token = self.peek()?;
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        Ok(token)
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek().is_ok_and(|t| &t.kind == kind)
    }

    fn eat(&mut self, kind: &TokenKind) -> Result<bool, SyntaxError> {
        if self.check(kind) {
            self.advance()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn expect(&mut self, kind: &TokenKind, context: &str) -> Result<&'a Token, SyntaxError> {
        let token = self.peek()?;
        if &token.kind == kind {
            return self.advance();
        }
        Err(unexpected(token, &format!("expected {} {}", kind, context)))
    }

    fn expect_end(&mut self) -> Result<(), SyntaxError> {
        let token = self.peek()?;
        if token.kind == TokenKind::Eof {
            return Ok(());
        }
        Err(unexpected(token, "expected end of query"))
    }

    fn expression(&mut self) -> Result<QueryExpression, SyntaxError> {
        let token = self.peek()?;
        match token.kind {
            TokenKind::Taint => self.taint(),
            TokenKind::And => self.logical(LogicalOperator::And),
            TokenKind::Or => self.logical(LogicalOperator::Or),
            TokenKind::Not => self.logical(LogicalOperator::Not),
            TokenKind::LeftBrace => {
                let (matcher, reason) = self.matcher()?;
                Ok(QueryExpression::Pattern(PatternExpression { matcher, reason }))
            }
            _ => Err(unexpected(
                token,
                "expected TAINT, AND, OR, NOT or a node matcher",
            )),
        }
    }

    fn taint(&mut self) -> Result<QueryExpression, SyntaxError> {
        let keyword = self.advance()?;
        self.expect(&TokenKind::LeftBrace, "after TAINT")?;

        let mut source = None;
        let mut sink = None;
        let mut sanitizers = Vec::new();

        loop {
            if self.check(&TokenKind::RightBrace) {
                break;
            }

            let field = self.advance()?;
            match field.kind {
                TokenKind::Source => {
                    self.expect(&TokenKind::Colon, "after SOURCE")?;
                    if source.is_some() {
                        return Err(SyntaxError::at(field, "duplicate SOURCE in TAINT"));
                    }
                    source = Some(self.matcher()?.0);
                }
                TokenKind::Sink => {
                    self.expect(&TokenKind::Colon, "after SINK")?;
                    if sink.is_some() {
                        return Err(SyntaxError::at(field, "duplicate SINK in TAINT"));
                    }
                    sink = Some(self.matcher()?.0);
                }
                TokenKind::Sanitizer => {
                    self.expect(&TokenKind::Colon, "after SANITIZER")?;
                    if self.eat(&TokenKind::LeftBracket)? {
                        sanitizers.extend(self.matcher_list()?);
                    } else {
                        sanitizers.push(self.matcher()?.0);
                    }
                }
                _ => {
                    return Err(unexpected(
                        field,
                        "expected SOURCE, SINK or SANITIZER inside TAINT",
                    ));
                }
            }

            if !self.eat(&TokenKind::Comma)? {
                break;
            }
        }
        self.expect(&TokenKind::RightBrace, "to close TAINT")?;

        let source = source.ok_or_else(|| SyntaxError::at(keyword, "TAINT is missing SOURCE"))?;
        let sink = sink.ok_or_else(|| SyntaxError::at(keyword, "TAINT is missing SINK"))?;

        Ok(QueryExpression::Taint(TaintExpression {
            source,
            sink,
            sanitizers,
        }))
    }

    fn matcher_list(&mut self) -> Result<Vec<NodeMatcher>, SyntaxError> {
        let mut matchers = Vec::new();
        loop {
            if self.check(&TokenKind::RightBracket) {
                break;
            }
            matchers.push(self.matcher()?.0);
            if !self.eat(&TokenKind::Comma)? {
                break;
            }
        }
        self.expect(&TokenKind::RightBracket, "to close sanitizer list")?;
        Ok(matchers)
    }

    fn logical(&mut self, operator: LogicalOperator) -> Result<QueryExpression, SyntaxError> {
        let keyword = self.advance()?;
        if self.depth >= MAX_NESTING {
            return Err(SyntaxError::at(
                keyword,
                format!("query nests deeper than {} levels", MAX_NESTING),
            ));
        }
        self.expect(&TokenKind::LeftParen, &format!("after {}", operator.as_str()))?;

        self.depth += 1;
        let operands = self.operands();
        self.depth -= 1;
        let operands = operands?;
        self.expect(
            &TokenKind::RightParen,
            &format!("to close {}", operator.as_str()),
        )?;

        if operands.is_empty() {
            return Err(SyntaxError::at(
                keyword,
                format!("{} requires at least one operand", operator.as_str()),
            ));
        }

        Ok(QueryExpression::Logical(LogicalExpression { operator, operands }))
    }

    fn operands(&mut self) -> Result<Vec<QueryExpression>, SyntaxError> {
        let mut operands = Vec::new();
        loop {
            if self.check(&TokenKind::RightParen) {
                break;
            }
            operands.push(self.expression()?);
            if !self.eat(&TokenKind::Comma)? {
                break;
            }
        }
        Ok(operands)
    }

    fn matcher(&mut self) -> Result<(NodeMatcher, Option<String>), SyntaxError> {
        self.expect(&TokenKind::LeftBrace, "to start a node matcher")?;
        let node_kinds = self.node_kinds()?;
        self.expect(&TokenKind::Colon, "after node kinds")?;
        let patterns = self.patterns()?;

        let mut reason = None;
        while self.eat(&TokenKind::Comma)? {
            if self.check(&TokenKind::RightBrace) {
                break;
            }
            let key = self.advance()?;
            match &key.kind {
                TokenKind::Identifier(name) if name == "reason" => {
                    self.expect(&TokenKind::Colon, "after `reason`")?;
                    let value = self.advance()?;
                    match &value.kind {
                        TokenKind::String(text) => reason = Some(text.clone()),
                        _ => return Err(unexpected(value, "expected string for `reason`")),
                    }
                }
                _ => return Err(unexpected(key, "expected `reason` option or '}'")),
            }
        }
        self.expect(&TokenKind::RightBrace, "to close node matcher")?;

        Ok((
            NodeMatcher {
                node_kinds,
                patterns,
            },
            reason,
        ))
    }

    fn node_kinds(&mut self) -> Result<BTreeSet<String>, SyntaxError> {
        let mut kinds = BTreeSet::new();

        if self.eat(&TokenKind::LeftBracket)? {
            loop {
                if self.check(&TokenKind::RightBracket) {
                    break;
                }
                kinds.insert(self.identifier("node kind")?);
                if !self.eat(&TokenKind::Comma)? {
                    break;
                }
            }
            self.expect(&TokenKind::RightBracket, "to close node kind list")?;
            return Ok(kinds);
        }

        kinds.insert(self.identifier("node kind")?);
        while self.eat(&TokenKind::Pipe)? {
            kinds.insert(self.identifier("node kind after '|'")?);
        }
        Ok(kinds)
    }

    fn identifier(&mut self, what: &str) -> Result<String, SyntaxError> {
        let token = self.advance()?;
        match &token.kind {
            TokenKind::Identifier(name) => Ok(name.clone()),
            _ => Err(unexpected(token, &format!("expected {}", what))),
        }
    }

    fn patterns(&mut self) -> Result<Vec<PatternSpec>, SyntaxError> {
        if !self.eat(&TokenKind::LeftBracket)? {
            return Ok(vec![self.pattern()?]);
        }

        let mut patterns = Vec::new();
        loop {
            if self.check(&TokenKind::RightBracket) {
                break;
            }
            patterns.push(self.pattern()?);
            if !self.eat(&TokenKind::Comma)? {
                break;
            }
        }
        self.expect(&TokenKind::RightBracket, "to close pattern list")?;
        Ok(patterns)
    }

    fn pattern(&mut self) -> Result<PatternSpec, SyntaxError> {
        let token = self.advance()?;
        match &token.kind {
            TokenKind::String(value) | TokenKind::Identifier(value) => {
                Ok(PatternSpec::literal(value))
            }
            TokenKind::Regex { pattern, flags } => {
                if let Some(flag) = flags.chars().find(|f| *f != 'i') {
                    return Err(SyntaxError::at(
                        token,
                        format!("unsupported regex flag `{}`", flag),
                    ));
                }
                Ok(PatternSpec {
                    kind: PatternKind::Regex,
                    value: pattern.clone(),
                    case_sensitive: !flags.contains('i'),
                })
            }
            _ => Err(unexpected(token, "expected string, identifier or regex pattern")),
        }
    }
}

fn unexpected(token: &Token, expectation: &str) -> SyntaxError {
    let message = match &token.kind {
        TokenKind::Unknown(text) if text.starts_with(['"', '\'']) => {
            format!("unterminated string literal ({})", expectation)
        }
        TokenKind::Unknown(text) if text.starts_with('/') => {
            format!("unterminated regex literal ({})", expectation)
        }
        other => format!("{}, found {}", expectation, other),
    };
    SyntaxError::at(token, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> QueryExpression {
        parse_query(source)
            .unwrap_or_else(|e| panic!("failed to parse {source:?}: {e}"))
            .expression
    }

    #[test]
    fn parses_pattern_matcher() {
        let expr = parse_ok(r#"{ CallExpression|NewExpression: ["eval", /exec\(/i] }"#);

        let QueryExpression::Pattern(pattern) = expr else {
            panic!("expected pattern expression");
        };
        assert_eq!(pattern.matcher.node_kinds.len(), 2);
        assert_eq!(
            pattern.matcher.patterns,
            vec![
                PatternSpec::literal("eval"),
                PatternSpec::regex(r"exec\(").case_insensitive(),
            ]
        );
        assert!(pattern.reason.is_none());
    }

    #[test]
    fn parses_bracketed_kind_list_and_reason() {
        let expr = parse_ok(r#"{ [CallExpression, MemberExpression]: eval, reason: "eval call" }"#);

        let QueryExpression::Pattern(pattern) = expr else {
            panic!("expected pattern expression");
        };
        assert!(pattern.matcher.node_kinds.contains("MemberExpression"));
        assert_eq!(pattern.reason.as_deref(), Some("eval call"));
    }

    #[test]
    fn parses_taint_with_sanitizer_list() {
        let expr = parse_ok(
            r#"TAINT {
                SOURCE: { MemberExpression: "req.body" },
                SINK: { CallExpression: "eval" },
                SANITIZER: [{ CallExpression: "escape" }, { CallExpression: "validate" }],
            }"#,
        );

        let QueryExpression::Taint(taint) = expr else {
            panic!("expected taint expression");
        };
        assert_eq!(taint.sanitizers.len(), 2);
        assert!(taint.source.node_kinds.contains("MemberExpression"));
    }

    #[test]
    fn parses_single_sanitizer_without_brackets() {
        let expr = parse_ok(
            r#"taint { sink: {Call: eval}, source: {Member: x}, sanitizer: {Call: clean} }"#,
        );

        let QueryExpression::Taint(taint) = expr else {
            panic!("expected taint expression");
        };
        assert_eq!(taint.sanitizers.len(), 1);
    }

    #[test]
    fn parses_nested_logical_expressions() {
        let expr = parse_ok(r#"OR({A: a}, AND({B: b}, {C: c}), NOT({D: d}))"#);

        let QueryExpression::Logical(logical) = expr else {
            panic!("expected logical expression");
        };
        assert_eq!(logical.operator, LogicalOperator::Or);
        assert_eq!(logical.operands.len(), 3);
        assert!(matches!(
            &logical.operands[2],
            QueryExpression::Logical(inner) if inner.operator == LogicalOperator::Not
        ));
    }

    #[test]
    fn missing_sink_is_a_syntax_error() {
        let err = parse_query(r#"TAINT { SOURCE: {A: a} }"#).unwrap_err();

        assert!(err.message.contains("missing SINK"), "{}", err.message);
        assert_eq!((err.line, err.column), (1, 1));
    }

    #[test]
    fn duplicate_source_is_a_syntax_error() {
        let err = parse_query(r#"TAINT { SOURCE: {A: a}, SOURCE: {B: b}, SINK: {C: c} }"#)
            .unwrap_err();

        assert!(err.message.contains("duplicate SOURCE"));
    }

    #[test]
    fn empty_operand_list_is_a_syntax_error() {
        let err = parse_query("AND()").unwrap_err();

        assert!(err.message.contains("at least one operand"));
    }

    #[test]
    fn unbalanced_brace_reports_position() {
        let err = parse_query(r#"{ CallExpression: "eval""#).unwrap_err();

        assert!(err.message.contains("'}'"), "{}", err.message);
        assert_eq!(err.offset, 24);
    }

    #[test]
    fn unknown_character_reports_its_column() {
        let err = parse_query(r#"{ CallExpression: @ }"#).unwrap_err();

        assert_eq!(err.column, 19);
        assert!(err.message.contains("unexpected `@`"));
    }

    #[test]
    fn unterminated_string_is_named() {
        let err = parse_query(r#"{ CallExpression: "eval }"#).unwrap_err();

        assert!(err.message.contains("unterminated string literal"));
    }

    #[test]
    fn trailing_tokens_are_rejected() {
        let err = parse_query(r#"{A: a} {B: b}"#).unwrap_err();

        assert!(err.message.contains("expected end of query"));
    }

    #[test]
    fn unsupported_regex_flag_is_rejected() {
        let err = parse_query(r#"{A: /a/g}"#).unwrap_err();

        assert!(err.message.contains("unsupported regex flag `g`"));
    }

    #[test]
    fn deep_nesting_is_a_syntax_error() {
        let err = parse_query(&"AND(".repeat(10_000)).unwrap_err();

        assert!(err.message.contains("deeper than 64 levels"), "{}", err.message);
        assert_eq!(err.offset, 4 * MAX_NESTING);
    }

    #[test]
    fn nesting_up_to_the_limit_parses() {
        let depth = MAX_NESTING;
        let source = format!("{}{{A: a}}{}", "NOT(".repeat(depth), ")".repeat(depth));

        assert!(parse_query(&source).is_ok());
    }

    #[test]
    fn parsing_is_deterministic() {
        let tokens = tokenize(r#"AND({A: a}, {B: /b/})"#);

        assert_eq!(parse(&tokens), parse(&tokens));
    }
}
