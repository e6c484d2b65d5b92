//! Approximate syntax tree extraction
//!
//! Builds a [`SyntaxTree`] from source text with a handful of line-oriented
//! regexes. String contents and trailing comments are masked out before
//! matching so that code-looking text inside literals does not produce
//! nodes. Function declarations own the nodes of their indentation block;
//! nodes on the same line nest by span.

use std::sync::LazyLock;

use regex::Regex;

use crate::syntax::{LiteralValue, NodeId, NodeSpec, SyntaxTree};

static FUNCTION_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:export\s+)?(?:default\s+)?(?:pub(?:\([\w\s]+\))?\s+)?(?:async\s+)?(?:def|function\*?|fn|func)\s+([A-Za-z_$][\w$]*)",
    )
    .expect("Invalid regex pattern")
});

static IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^\s*(?:from\s+([\w.]+)\s+import\b|import\s+([\w.]+)|import\b|(?:const|let|var)\s+[\w${}\s,:]+=\s*require\s*\(\s*["']([^"']+)["'])"#,
    )
    .expect("Invalid regex pattern")
});

static ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:(?:const|let|var|final|auto)\s+)?([A-Za-z_$][\w$]*(?:\.[A-Za-z_$][\w$]*)*)\s*(?::\s*[^=]+?)?\s*=\s*([^=>].*)$",
    )
    .expect("Invalid regex pattern")
});

static CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z_$][\w$]*(?:\.[A-Za-z_$][\w$]*)*)\s*\(").expect("Invalid regex pattern")
});

static MEMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z_$][\w$]*(?:\.[A-Za-z_$][\w$]*)+").expect("Invalid regex pattern")
});

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_$][\w$]*$").expect("Invalid regex pattern"));

const NOT_CALLABLE: &[&str] = &[
    "if", "elif", "else", "for", "while", "switch", "catch", "return", "function", "def", "with",
    "not", "and", "or", "in", "is", "typeof", "new", "await", "yield", "lambda", "assert", "del",
    "except", "match", "case",
];

const NOT_IDENTIFIER: &[&str] = &[
    "True", "False", "None", "true", "false", "null", "undefined", "nil",
];

pub const FUNCTION_DECLARATION: &str = "FunctionDeclaration";
pub const CALL_EXPRESSION: &str = "CallExpression";
pub const MEMBER_EXPRESSION: &str = "MemberExpression";
pub const ASSIGNMENT_KIND: &str = "Assignment";
pub const STRING_LITERAL: &str = "StringLiteral";
pub const IMPORT_KIND: &str = "Import";
pub const IDENTIFIER_KIND: &str = "Identifier";

#[derive(Debug, Clone, Copy)]
pub struct TreeBuilder {
    hash_comments: bool,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self {
            hash_comments: true,
        }
    }

    /// `#` starts a comment except in languages where it does not.
    pub fn for_language(language: Option<&str>) -> Self {
        let hash_comments = !matches!(
            language,
            Some("javascript" | "typescript" | "go" | "java" | "rust")
        );
        Self { hash_comments }
    }

    pub fn build(&self, source: &str) -> SyntaxTree {
        let lines: Vec<&str> = source.lines().collect();
        let mut tree = SyntaxTree::new();
        let mut functions: Vec<OpenFunction> = Vec::new();

        for (index, line) in lines.iter().enumerate() {
            let line_number = index + 1;
            while functions.last().is_some_and(|f| f.end_line < line_number) {
                functions.pop();
            }

            let scanned = scan_line(line, self.hash_comments);
            if scanned.masked.trim().is_empty() {
                continue;
            }

            let enclosing = functions.last().map(|f| (f.id, f.name.clone()));
            let opened = self.build_line(&mut tree, &lines, index, &scanned, enclosing);
            if let Some(function) = opened {
                functions.push(function);
            }
        }

        tree
    }

    fn build_line(
        &self,
        tree: &mut SyntaxTree,
        lines: &[&str],
        index: usize,
        scanned: &ScannedLine,
        enclosing: Option<(NodeId, String)>,
    ) -> Option<OpenFunction> {
        let line = lines[index];
        let line_number = index + 1;
        let mut candidates = extract_candidates(line, scanned);
        candidates.sort_by_key(|c| (c.start, std::cmp::Reverse(c.end), c.kind_rank()));

        let mut placed: Vec<(usize, usize, NodeId)> = Vec::new();
        let mut opened = None;

        for candidate in &candidates {
            let column = column_of(line, candidate.start);
            let (end_line, text) = match candidate.kind {
                FUNCTION_DECLARATION => {
                    let end = block_end(lines, index);
                    let mut text = line[candidate.start..].to_string();
                    for next in &lines[index + 1..=end] {
                        text.push('\n');
                        text.push_str(next);
                    }
                    (end + 1, text)
                }
                _ => (line_number, line[candidate.start..candidate.end].to_string()),
            };
            let end_column = if end_line == line_number {
                column_of(line, candidate.end)
            } else {
                lines[end_line - 1].chars().count() + 1
            };

            let mut spec = NodeSpec::new(candidate.kind, line_number, column, &text)
                .with_end(end_line, end_column);
            if let Some(name) = &candidate.name {
                spec = spec.with_name(name);
            }
            if let Some((_, scope)) = &enclosing {
                spec = spec.with_scope(scope);
            }
            if let Some(value) = &candidate.value {
                spec = spec.with_value(value.clone());
            }
            if candidate.kind == ASSIGNMENT_KIND {
                spec = spec.with_operator("=");
            }

            let parent = placed
                .iter()
                .rev()
                .find(|(start, end, _)| *start <= candidate.start && candidate.end <= *end)
                .map(|(_, _, id)| *id)
                .or(enclosing.as_ref().map(|(id, _)| *id));
            let id = tree.add_node(spec, parent);
            placed.push((candidate.start, candidate.end, id));

            if candidate.kind == FUNCTION_DECLARATION {
                opened = Some(OpenFunction {
                    id,
                    name: candidate.name.clone().unwrap_or_default(),
                    end_line,
                });
            }
        }

        link_arguments(tree, &candidates, &placed);
        opened
    }
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct OpenFunction {
    id: NodeId,
    name: String,
    end_line: usize,
}

struct ScannedLine {
    /// Same byte length as the line; string contents and comments are spaces.
    masked: String,
    strings: Vec<(usize, usize)>,
}

#[derive(Debug)]
struct Candidate {
    kind: &'static str,
    start: usize,
    end: usize,
    name: Option<String>,
    value: Option<LiteralValue>,
    /// Argument spans for calls, the value span for assignments.
    operands: Vec<(usize, usize)>,
}

impl Candidate {
    fn new(kind: &'static str, start: usize, end: usize) -> Self {
        Self {
            kind,
            start,
            end,
            name: None,
            value: None,
            operands: Vec::new(),
        }
    }

    fn kind_rank(&self) -> u8 {
        match self.kind {
            FUNCTION_DECLARATION | IMPORT_KIND | ASSIGNMENT_KIND => 0,
            CALL_EXPRESSION => 1,
            MEMBER_EXPRESSION => 2,
            STRING_LITERAL => 3,
            _ => 4,
        }
    }
}

fn scan_line(line: &str, hash_comments: bool) -> ScannedLine {
    let mut masked = String::with_capacity(line.len());
    let mut strings = Vec::new();
    let mut chars = line.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            '"' | '\'' | '`' => {
                masked.push(c);
                let mut end = line.len();
                let mut escaped = false;
                for (j, d) in chars.by_ref() {
                    if escaped {
                        escaped = false;
                    } else if d == '\\' {
                        escaped = true;
                    } else if d == c {
                        masked.push(c);
                        end = j + 1;
                        break;
                    }
                    masked.extend(std::iter::repeat_n(' ', d.len_utf8()));
                }
                strings.push((string_prefix_start(line, i), end));
            }
            '#' if hash_comments => {
                masked.extend(std::iter::repeat_n(' ', line.len() - i));
                break;
            }
            '/' if chars.peek().is_some_and(|&(_, next)| next == '/') => {
                masked.extend(std::iter::repeat_n(' ', line.len() - i));
                break;
            }
            other => masked.push(other),
        }
    }

    ScannedLine { masked, strings }
}

/// Includes prefixes such as `f`, `rb` or `u` in a string literal's span.
fn string_prefix_start(line: &str, quote: usize) -> usize {
    let bytes = line.as_bytes();
    let mut start = quote;
    while start > 0 && quote - start < 2 && b"fFrRbBuU".contains(&bytes[start - 1]) {
        start -= 1;
    }
    let boundary = start == 0 || !(bytes[start - 1].is_ascii_alphanumeric() || bytes[start - 1] == b'_');
    if boundary { start } else { quote }
}

fn extract_candidates(line: &str, scanned: &ScannedLine) -> Vec<Candidate> {
    let masked = scanned.masked.as_str();
    let code_end = masked.trim_end().len();
    let code_start = masked.len() - masked.trim_start().len();
    let mut candidates = Vec::new();
    let mut declared_name = None;

    if let Some(caps) = FUNCTION_DECL.captures(masked) {
        let mut function = Candidate::new(FUNCTION_DECLARATION, code_start, code_end);
        if let Some(name) = caps.get(1) {
            function.name = Some(name.as_str().to_string());
            declared_name = Some(name.start());
        }
        candidates.push(function);
    } else if let Some(caps) = IMPORT.captures(line) {
        let mut import = Candidate::new(IMPORT_KIND, code_start, code_end);
        import.name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))
            .map(|m| m.as_str().to_string());
        candidates.push(import);
    } else if let Some(caps) = ASSIGNMENT.captures(masked) {
        if let (Some(target), Some(value)) = (caps.get(1), caps.get(2)) {
            let value_end = trim_statement_end(masked, value.end());
            let mut assignment = Candidate::new(ASSIGNMENT_KIND, target.start(), value_end);
            assignment.name = Some(target.as_str().to_string());
            assignment.value = literal_value(line[value.start()..value_end].trim());
            assignment.operands.push((value.start(), value_end));
            candidates.push(assignment);
        }
    }

    for caps in CALL.captures_iter(masked) {
        let Some(callee) = caps.get(1) else { continue };
        if NOT_CALLABLE.contains(&callee.as_str()) || declared_name == Some(callee.start()) {
            continue;
        }
        let open = caps.get(0).map_or(callee.end(), |m| m.end() - 1);
        let close = matching_paren(masked, open);
        let end = close.map_or(code_end, |c| c + 1);
        let mut call = Candidate::new(CALL_EXPRESSION, callee.start(), end);
        call.name = Some(callee.as_str().to_string());
        call.operands = split_arguments(masked, open + 1, close.unwrap_or(code_end));

        for &(arg_start, arg_end) in &call.operands {
            let arg = &masked[arg_start..arg_end];
            if IDENTIFIER.is_match(arg) && !NOT_IDENTIFIER.contains(&arg) {
                let mut identifier = Candidate::new(IDENTIFIER_KIND, arg_start, arg_end);
                identifier.name = Some(arg.to_string());
                candidates.push(identifier);
            }
        }
        candidates.push(call);
    }

    for member in MEMBER.find_iter(masked) {
        let mut candidate = Candidate::new(MEMBER_EXPRESSION, member.start(), member.end());
        candidate.name = Some(member.as_str().to_string());
        candidates.push(candidate);
    }

    for &(start, end) in &scanned.strings {
        let mut literal = Candidate::new(STRING_LITERAL, start, end);
        literal.value = Some(LiteralValue::String(string_contents(&line[start..end])));
        candidates.push(literal);
    }

    candidates
}

/// Sets call arguments and assignment values to the nodes spanning them.
fn link_arguments(tree: &mut SyntaxTree, candidates: &[Candidate], placed: &[(usize, usize, NodeId)]) {
    let node_at = |span: (usize, usize)| {
        placed
            .iter()
            .find(|(start, end, _)| (*start, *end) == span)
            .map(|(_, _, id)| *id)
    };

    for (candidate, (_, _, id)) in candidates.iter().zip(placed) {
        match candidate.kind {
            CALL_EXPRESSION => {
                for &span in &candidate.operands {
                    if let Some(argument) = node_at(span) {
                        tree.add_argument(*id, argument);
                    }
                }
            }
            ASSIGNMENT_KIND => {
                if let Some(value) = candidate.operands.first().and_then(|&span| node_at(span)) {
                    tree.set_property(*id, "value", value);
                }
            }
            _ => {}
        }
    }
}

fn matching_paren(masked: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, b) in masked.bytes().enumerate().skip(open) {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Top-level comma separated spans between `start` and `end`, trimmed.
fn split_arguments(masked: &str, start: usize, end: usize) -> Vec<(usize, usize)> {
    let bytes = masked.as_bytes();
    let mut spans = Vec::new();
    let mut depth = 0i32;
    let mut segment_start = start;

    for i in start..=end.min(bytes.len()) {
        let at_end = i == end || i == bytes.len();
        let b = if at_end { b',' } else { bytes[i] };
        match b {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            b',' if depth == 0 => {
                if let Some(span) = trim_span(masked, segment_start, i) {
                    spans.push(span);
                }
                segment_start = i + 1;
            }
            _ => {}
        }
        if at_end {
            break;
        }
    }
    spans
}

fn trim_span(text: &str, start: usize, end: usize) -> Option<(usize, usize)> {
    let slice = text.get(start..end)?;
    let leading = slice.len() - slice.trim_start().len();
    let trimmed = slice.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some((start + leading, start + leading + trimmed.len()))
}

fn trim_statement_end(masked: &str, end: usize) -> usize {
    masked[..end].trim_end().trim_end_matches(';').trim_end().len()
}

/// Last line index of the indentation block opened at `index`.
fn block_end(lines: &[&str], index: usize) -> usize {
    let indent = indentation(lines[index]);
    let mut last = index;
    for (offset, line) in lines[index + 1..].iter().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() {
            continue;
        }
        let current = indentation(line);
        if current > indent {
            last = index + 1 + offset;
        } else {
            if current == indent && trimmed.starts_with(['}', ')', ']']) {
                last = index + 1 + offset;
            }
            break;
        }
    }
    last
}

fn indentation(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

fn column_of(line: &str, byte_offset: usize) -> usize {
    line[..byte_offset].chars().count() + 1
}

fn string_contents(literal: &str) -> String {
    let body = literal.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    let mut chars = body.chars();
    let quote = chars.next();
    let inner = chars.as_str();
    match quote {
        Some(q) => inner.strip_suffix(q).unwrap_or(inner).to_string(),
        None => String::new(),
    }
}

fn literal_value(text: &str) -> Option<LiteralValue> {
    match text {
        "true" | "True" => return Some(LiteralValue::Bool(true)),
        "false" | "False" => return Some(LiteralValue::Bool(false)),
        _ => {}
    }
    if let Ok(number) = text.parse::<f64>() {
        return Some(LiteralValue::Number(number));
    }
    let starts_quoted = text
        .trim_start_matches(|c: char| c.is_ascii_alphabetic())
        .starts_with(['"', '\'', '`']);
    if starts_quoted && text.len() >= 2 {
        return Some(LiteralValue::String(string_contents(text)));
    }
    None
}
