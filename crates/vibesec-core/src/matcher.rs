//! Structural pattern matching over syntax tree nodes
//!
//! A [`NodeMatcher`] is compiled once per execution into a
//! [`CompiledMatcher`]; regexes are never cached across calls.

use regex::{Regex, RegexBuilder};
use serde::Serialize;
use tracing::trace;

use crate::query::{NodeMatcher, PatternExpression, PatternKind, PatternSpec};
use crate::syntax::{NodeId, SyntaxNode, SyntaxTree};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternMatch {
    #[serde(skip)]
    pub node: NodeId,
    pub line: usize,
    pub column: usize,
    pub confidence: f64,
    pub match_reason: String,
}

enum CompiledPattern<'a> {
    Literal { spec: &'a PatternSpec, folded: String },
    Regex { spec: &'a PatternSpec, regex: Regex },
    // a regex that failed to compile never matches
    Invalid,
}

impl CompiledPattern<'_> {
    fn matches(&self, haystack: &str) -> bool {
        match self {
            CompiledPattern::Literal { spec, folded } => {
                if spec.case_sensitive {
                    haystack.contains(spec.value.as_str())
                } else {
                    haystack.to_lowercase().contains(folded.as_str())
                }
            }
            CompiledPattern::Regex { regex, .. } => regex.is_match(haystack),
            CompiledPattern::Invalid => false,
        }
    }

    fn spec(&self) -> Option<&PatternSpec> {
        match self {
            CompiledPattern::Literal { spec, .. } | CompiledPattern::Regex { spec, .. } => {
                Some(*spec)
            }
            CompiledPattern::Invalid => None,
        }
    }
}

pub(crate) struct CompiledMatcher<'a> {
    matcher: &'a NodeMatcher,
    patterns: Vec<CompiledPattern<'a>>,
}

impl<'a> CompiledMatcher<'a> {
    pub(crate) fn compile(matcher: &'a NodeMatcher) -> Self {
        let patterns = matcher
            .patterns
            .iter()
            .map(|spec| match spec.kind {
                PatternKind::Literal => CompiledPattern::Literal {
                    spec,
                    folded: spec.value.to_lowercase(),
                },
                PatternKind::Regex => RegexBuilder::new(&spec.value)
                    .case_insensitive(!spec.case_sensitive)
                    .build()
                    .map(|regex| CompiledPattern::Regex { spec, regex })
                    .unwrap_or(CompiledPattern::Invalid),
            })
            .collect();

        Self { matcher, patterns }
    }

    /// Returns the first pattern that fires for `node`, if the kind matches.
    pub(crate) fn first_match(&self, node: &SyntaxNode) -> Option<&PatternSpec> {
        if !self.matcher.node_kinds.contains(&node.kind) {
            return None;
        }

        let haystack = match_text(node);
        self.patterns
            .iter()
            .find(|p| p.matches(haystack))
            .and_then(CompiledPattern::spec)
    }

    pub(crate) fn matches(&self, node: &SyntaxNode) -> bool {
        self.first_match(node).is_some()
    }
}

/// Identifiers are matched on their name, everything else on the source text.
fn match_text(node: &SyntaxNode) -> &str {
    match (&node.name, node.kind.as_str()) {
        (Some(name), "Identifier") => name,
        _ => &node.text,
    }
}

/// Evaluates pattern expressions against a flat scan of the tree.
#[derive(Debug, Clone, Copy)]
pub struct AdvancedPatternMatcher {
    baseline_confidence: f64,
}

impl AdvancedPatternMatcher {
    pub fn new(baseline_confidence: f64) -> Self {
        Self {
            baseline_confidence: baseline_confidence.clamp(0.0, 1.0),
        }
    }

    pub fn execute_query(&self, pattern: &PatternExpression, tree: &SyntaxTree) -> Vec<PatternMatch> {
        let compiled = CompiledMatcher::compile(&pattern.matcher);

        let matches: Vec<PatternMatch> = tree
            .nodes()
            .filter_map(|node| {
                let spec = compiled.first_match(node)?;
                Some(PatternMatch {
                    node: node.id,
                    line: node.line,
                    column: node.column,
                    confidence: self.baseline_confidence,
                    match_reason: describe_reason(pattern, node, spec),
                })
            })
            .collect();

        trace!(matches = matches.len(), "pattern query executed");
        matches
    }
}

impl Default for AdvancedPatternMatcher {
    fn default() -> Self {
        Self::new(0.8)
    }
}

fn describe_reason(pattern: &PatternExpression, node: &SyntaxNode, spec: &PatternSpec) -> String {
    match &pattern.reason {
        Some(reason) => format!("{} ({} matched {})", reason, node.kind, spec),
        None => format!("{} matched {}", node.kind, spec),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::NodeMatcher;
    use crate::syntax::NodeSpec;

    fn sample_tree() -> SyntaxTree {
        let mut tree = SyntaxTree::new();
        tree.add_node(NodeSpec::new("CallExpression", 3, 5, "eval(userInput)"), None);
        tree.add_node(NodeSpec::new("CallExpression", 4, 5, "console.log(x)"), None);
        tree.add_node(NodeSpec::new("StringLiteral", 5, 9, "\"eval\""), None);
        tree.add_node(
            NodeSpec::new("Identifier", 6, 1, "this.Eval").with_name("Eval"),
            None,
        );
        tree
    }

    fn pattern(kinds: &[&str], patterns: Vec<PatternSpec>) -> PatternExpression {
        PatternExpression {
            matcher: NodeMatcher::new(kinds.iter().copied(), patterns),
            reason: None,
        }
    }

    #[test]
    fn matches_only_listed_node_kinds() {
        let tree = sample_tree();
        let query = pattern(&["CallExpression"], vec![PatternSpec::literal("eval")]);

        let matches = AdvancedPatternMatcher::new(0.9).execute_query(&query, &tree);

        assert_eq!(matches.len(), 1);
        assert_eq!((matches[0].line, matches[0].column), (3, 5));
        assert_eq!(matches[0].confidence, 0.9);
    }

    #[test]
    fn any_pattern_in_the_list_is_enough() {
        let tree = sample_tree();
        let query = pattern(
            &["CallExpression"],
            vec![PatternSpec::literal("nope"), PatternSpec::regex(r"console\.\w+")],
        );

        let matches = AdvancedPatternMatcher::default().execute_query(&query, &tree);

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].line, 4);
        assert!(matches[0].match_reason.contains(r"/console\.\w+/"));
    }

    #[test]
    fn identifiers_match_on_name() {
        let tree = sample_tree();
        let exact = pattern(&["Identifier"], vec![PatternSpec::regex("^Eval$")]);
        let folded = pattern(&["Identifier"], vec![PatternSpec::literal("eval").case_insensitive()]);

        let matcher = AdvancedPatternMatcher::default();

        assert_eq!(matcher.execute_query(&exact, &tree).len(), 1);
        assert_eq!(matcher.execute_query(&folded, &tree).len(), 1);
    }

    #[test]
    fn literal_is_case_sensitive_by_default() {
        let tree = sample_tree();
        let query = pattern(&["CallExpression"], vec![PatternSpec::literal("EVAL")]);

        assert!(AdvancedPatternMatcher::default().execute_query(&query, &tree).is_empty());
    }

    #[test]
    fn invalid_regex_never_matches() {
        let tree = sample_tree();
        let query = pattern(&["CallExpression"], vec![PatternSpec::regex("eval(")]);

        assert!(AdvancedPatternMatcher::default().execute_query(&query, &tree).is_empty());
    }

    #[test]
    fn empty_node_kinds_match_nothing() {
        let tree = sample_tree();
        let query = pattern(&[], vec![PatternSpec::literal("eval")]);

        assert!(AdvancedPatternMatcher::default().execute_query(&query, &tree).is_empty());
    }

    #[test]
    fn reason_text_is_included() {
        let tree = sample_tree();
        let mut query = pattern(&["CallExpression"], vec![PatternSpec::literal("eval")]);
        query.reason = Some("dynamic code execution".to_string());

        let matches = AdvancedPatternMatcher::default().execute_query(&query, &tree);

        assert_eq!(
            matches[0].match_reason,
            "dynamic code execution (CallExpression matched \"eval\")"
        );
    }

    #[test]
    fn baseline_confidence_is_clamped() {
        let tree = sample_tree();
        let query = pattern(&["CallExpression"], vec![PatternSpec::literal("eval")]);

        let matches = AdvancedPatternMatcher::new(1.7).execute_query(&query, &tree);

        assert_eq!(matches[0].confidence, 1.0);
    }
}
