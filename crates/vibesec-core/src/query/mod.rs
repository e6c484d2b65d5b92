//! EQL: the structural query language used by enhanced rules
//!
//! A query string goes through [`tokenize`], [`parse`] and [`validate`]
//! before the analyzer dispatches it. [`optimize`] may attach hints to the
//! query metadata; nothing consumes them yet.

pub mod lexer;
pub mod optimizer;
pub mod parser;
pub mod validator;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

pub use lexer::{Token, TokenKind, tokenize};
pub use optimizer::optimize;
pub use parser::{SyntaxError, parse, parse_query};
pub use validator::{ValidationOptions, ValidationReport, validate, validate_with};

pub const KEYWORDS: &[&str] = &["TAINT", "AND", "OR", "NOT", "SOURCE", "SINK", "SANITIZER"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    Literal,
    Regex,
}

/// Leaf matcher evaluated against a node's text, or its name for identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatternSpec {
    pub kind: PatternKind,
    pub value: String,
    pub case_sensitive: bool,
}

impl PatternSpec {
    pub fn literal(value: &str) -> Self {
        Self {
            kind: PatternKind::Literal,
            value: value.to_string(),
            case_sensitive: true,
        }
    }

    pub fn regex(value: &str) -> Self {
        Self {
            kind: PatternKind::Regex,
            value: value.to_string(),
            case_sensitive: true,
        }
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_sensitive = false;
        self
    }
}

impl fmt::Display for PatternSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            PatternKind::Literal => write!(f, "\"{}\"", self.value),
            PatternKind::Regex if self.case_sensitive => write!(f, "/{}/", self.value),
            PatternKind::Regex => write!(f, "/{}/i", self.value),
        }
    }
}

/// A node matches when its kind is listed and at least one pattern matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeMatcher {
    pub node_kinds: BTreeSet<String>,
    pub patterns: Vec<PatternSpec>,
}

impl NodeMatcher {
    pub fn new<I, S>(node_kinds: I, patterns: Vec<PatternSpec>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            node_kinds: node_kinds.into_iter().map(Into::into).collect(),
            patterns,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    And,
    Or,
    Not,
}

impl LogicalOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalOperator::And => "AND",
            LogicalOperator::Or => "OR",
            LogicalOperator::Not => "NOT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaintExpression {
    pub source: NodeMatcher,
    pub sink: NodeMatcher,
    pub sanitizers: Vec<NodeMatcher>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogicalExpression {
    pub operator: LogicalOperator,
    pub operands: Vec<QueryExpression>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatternExpression {
    pub matcher: NodeMatcher,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum QueryExpression {
    Taint(TaintExpression),
    Logical(LogicalExpression),
    Pattern(PatternExpression),
}

impl QueryExpression {
    pub fn kind_name(&self) -> &'static str {
        match self {
            QueryExpression::Taint(_) => "taint",
            QueryExpression::Logical(_) => "logical",
            QueryExpression::Pattern(_) => "pattern",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Query {
    pub expression: QueryExpression,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Query {
    pub fn new(expression: QueryExpression) -> Self {
        Self {
            expression,
            metadata: BTreeMap::new(),
        }
    }
}

/// Decides whether a raw rule pattern goes through the EQL pipeline.
///
/// Permissive on purpose: anything with a keyword, or with both a bracket and
/// a `:`/`|` separator, is handed to the parser, which reports its own errors.
pub fn is_eql_query(pattern: &str) -> bool {
    let has_keyword = pattern
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .any(|word| KEYWORDS.iter().any(|kw| word.eq_ignore_ascii_case(kw)));
    if has_keyword {
        return true;
    }

    let has_bracket = pattern.contains(['{', '}', '[', ']', '(', ')']);
    let has_separator = pattern.contains([':', '|']);
    has_bracket && has_separator
}
