//! Older rule pattern forms that predate EQL
//!
//! Two forms are understood:
//!
//! - `Kind` or `Kind[name=value]`: every tree node of that kind, optionally
//!   with exactly that name.
//! - `flow(source -> sink)`: a textual heuristic. A variable assigned from
//!   an expression matching `source` is reported on every later line that
//!   matches `sink` and mentions the variable.
//!
//! A pattern holding both a bracket and `:` or `|` is routed to the EQL
//! parser first, so `flow(req\.(body|query)->eval)` is rejected as a
//! malformed query and skipped with a warning. Write one flow per source
//! instead of using alternation.

use std::sync::LazyLock;

use regex::Regex;

use crate::syntax::SyntaxTree;

static SELECTOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^([A-Za-z_$][\w$]*)\s*(?:\[\s*name\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\]\s]*))\s*\])?$"#,
    )
    .expect("Invalid regex pattern")
});

static FLOW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^flow\s*\((.*)\)$").expect("Invalid regex pattern"));

static ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:(?:const|let|var|final|auto)\s+)?([A-Za-z_$][\w$]*)\s*(?::\s*[^=]+?)?\s*=\s*([^=].*)$")
        .expect("Invalid regex pattern")
});

#[derive(Debug, thiserror::Error)]
pub enum LegacyPatternError {
    #[error("invalid {role} regex in flow pattern: {source}")]
    InvalidRegex {
        role: &'static str,
        source: regex::Error,
    },
    #[error("flow pattern needs `source -> sink`")]
    MissingArrow,
    #[error("pattern is neither an EQL query nor a legacy selector or flow")]
    Unrecognized,
}

#[derive(Debug, Clone)]
pub enum LegacyPattern {
    Selector { kind: String, name: Option<String> },
    Flow { source: Regex, sink: Regex },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyMatch {
    pub line: usize,
    pub column: usize,
    pub variable: Option<String>,
    pub reason: String,
}

impl LegacyPattern {
    pub fn parse(pattern: &str) -> Result<Self, LegacyPatternError> {
        let pattern = pattern.trim();

        if let Some(caps) = FLOW.captures(pattern) {
            let body = caps.get(1).map_or("", |m| m.as_str());
            let (source, sink) = body.split_once("->").ok_or(LegacyPatternError::MissingArrow)?;
            let compile = |role, text: &str| {
                Regex::new(text.trim()).map_err(|source| LegacyPatternError::InvalidRegex { role, source })
            };
            return Ok(LegacyPattern::Flow {
                source: compile("source", source)?,
                sink: compile("sink", sink)?,
            });
        }

        let caps = SELECTOR
            .captures(pattern)
            .ok_or(LegacyPatternError::Unrecognized)?;
        let kind = caps
            .get(1)
            .map(|m| m.as_str().to_string())
            .ok_or(LegacyPatternError::Unrecognized)?;
        let name = caps
            .get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map(|m| m.as_str().to_string());
        Ok(LegacyPattern::Selector { kind, name })
    }

    pub fn run(&self, tree: &SyntaxTree, content: &str) -> Vec<LegacyMatch> {
        match self {
            LegacyPattern::Selector { kind, name } => tree
                .nodes()
                .filter(|node| &node.kind == kind)
                .filter(|node| name.is_none() || node.name == *name)
                .map(|node| LegacyMatch {
                    line: node.line,
                    column: node.column,
                    variable: None,
                    reason: match name {
                        Some(name) => format!("{kind} named `{name}`"),
                        None => format!("{kind} node"),
                    },
                })
                .collect(),
            LegacyPattern::Flow { source, sink } => run_flow(source, sink, content),
        }
    }
}

fn run_flow(source: &Regex, sink: &Regex, content: &str) -> Vec<LegacyMatch> {
    let lines: Vec<&str> = content.lines().collect();
    let mut matches = Vec::new();

    for (index, line) in lines.iter().enumerate() {
        let Some(caps) = ASSIGNMENT.captures(line) else {
            continue;
        };
        let (Some(variable), Some(value)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        if !source.is_match(value.as_str()) {
            continue;
        }

        let variable = variable.as_str();
        let Ok(mention) = Regex::new(&format!(r"(?:^|[^\w$]){}(?:[^\w$]|$)", regex::escape(variable)))
        else {
            continue;
        };

        for (offset, later) in lines[index + 1..].iter().enumerate() {
            if !sink.is_match(later) {
                continue;
            }
            let Some(found) = mention.find(later) else {
                continue;
            };
            // the match may include one leading delimiter
            let start = later[found.start()..]
                .find(variable)
                .map_or(found.start(), |i| found.start() + i);
            matches.push(LegacyMatch {
                line: index + offset + 2,
                column: later[..start].chars().count() + 1,
                variable: Some(variable.to_string()),
                reason: format!(
                    "`{}` assigned from /{}/ on line {} reaches /{}/",
                    variable,
                    source.as_str(),
                    index + 1,
                    sink.as_str()
                ),
            });
        }
    }

    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::NodeSpec;

    #[test]
    fn parses_selectors() {
        match LegacyPattern::parse("FunctionDecl[name=foo]").unwrap() {
            LegacyPattern::Selector { kind, name } => {
                assert_eq!(kind, "FunctionDecl");
                assert_eq!(name.as_deref(), Some("foo"));
            }
            other => panic!("expected selector, got {other:?}"),
        }
        assert!(matches!(
            LegacyPattern::parse("CallExpression").unwrap(),
            LegacyPattern::Selector { name: None, .. }
        ));
        assert!(matches!(
            LegacyPattern::parse(r#"CallExpression[name="pickle.loads"]"#).unwrap(),
            LegacyPattern::Selector { name: Some(n), .. } if n == "pickle.loads"
        ));
    }

    #[test]
    fn selector_requires_kind_and_name() {
        let mut tree = SyntaxTree::new();
        tree.add_node(NodeSpec::new("FunctionDecl", 1, 1, "function foo() {}").with_name("foo"), None);
        tree.add_node(NodeSpec::new("FunctionDecl", 2, 1, "function bar() {}").with_name("bar"), None);
        tree.add_node(NodeSpec::new("CallExpression", 3, 1, "foo()").with_name("foo"), None);

        let found = LegacyPattern::parse("FunctionDecl[name=foo]").unwrap().run(&tree, "");

        assert_eq!(found.len(), 1);
        assert_eq!((found[0].line, found[0].column), (1, 1));
    }

    #[test]
    fn flow_reports_variable_at_sink_line() {
        let content = "\
const express = require('express');
const app = express();

app.post('/run', (req, res) => {
  const x = req.body.code;
  log(x);
  eval(x);
});
";
        let flow = LegacyPattern::parse(r"flow(req\.body->eval)").unwrap();

        let found = flow.run(&SyntaxTree::new(), content);

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].line, 7);
        assert_eq!(found[0].column, 8);
        assert_eq!(found[0].variable.as_deref(), Some("x"));
    }

    #[test]
    fn flow_needs_whole_word_mention() {
        let content = "x = request.args['q']\neval(xs)\neval(x)\n";
        let flow = LegacyPattern::parse(r"flow(request\.args -> eval)").unwrap();

        let found = flow.run(&SyntaxTree::new(), content);

        assert_eq!(found.iter().map(|m| m.line).collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn flow_reports_every_later_sink_line() {
        let content = "data = req.query.path\nreadFile(data)\nreadFile(data + '.bak')\n";
        let flow = LegacyPattern::parse(r"flow(req\.query->readFile)").unwrap();

        assert_eq!(flow.run(&SyntaxTree::new(), content).len(), 2);
    }

    #[test]
    fn comparison_is_not_a_tainting_assignment() {
        let content = "if x == req.body:\n    eval(x)\n";
        let flow = LegacyPattern::parse(r"flow(req\.body->eval)").unwrap();

        assert!(flow.run(&SyntaxTree::new(), content).is_empty());
    }

    #[test]
    fn malformed_patterns_are_errors() {
        assert!(matches!(
            LegacyPattern::parse("flow(req.body)"),
            Err(LegacyPatternError::MissingArrow)
        ));
        assert!(matches!(
            LegacyPattern::parse("flow(( -> eval)"),
            Err(LegacyPatternError::InvalidRegex { role: "source", .. })
        ));
        assert!(matches!(
            LegacyPattern::parse("not a pattern at all"),
            Err(LegacyPatternError::Unrecognized)
        ));
    }
}
