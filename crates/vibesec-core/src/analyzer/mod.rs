//! Enhanced analysis of structural rule patterns
//!
//! [`EnhancedAnalyzer::analyze`] runs every query pattern of a rule against
//! one file's syntax tree. EQL patterns go through lex, parse and validate;
//! anything else is tried as a [`LegacyPattern`]. A pattern that fails at any
//! stage is skipped with a warning and the rule's other patterns still run.

pub mod legacy;

use std::collections::HashSet;

use serde_json::json;
use tracing::debug;

use crate::finding::Finding;
use crate::matcher::{AdvancedPatternMatcher, PatternMatch};
use crate::query::{
    LogicalOperator, Query, QueryExpression, TaintExpression, ValidationOptions, is_eql_query,
    optimize, parse, tokenize, validate_with,
};
use crate::rules::{Rule, RulePatternKind, Severity};
use crate::syntax::SyntaxTree;
use crate::taint::{RiskThresholds, TaintAnalyzer, TaintFlowResult};

pub use legacy::{LegacyMatch, LegacyPattern, LegacyPatternError};

/// Which query features the analyzer can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// NOT is parsed and validated but never executed.
    pub negation: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyzerOptions {
    pub default_confidence: f64,
    pub legacy_confidence: f64,
    pub snippet_context: usize,
    pub optimizer_hints: bool,
    pub risk: RiskThresholds,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            default_confidence: 0.8,
            legacy_confidence: 0.6,
            snippet_context: 2,
            optimizer_hints: true,
            risk: RiskThresholds::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AnalysisOutcome {
    pub findings: Vec<Finding>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct EnhancedAnalyzer {
    options: AnalyzerOptions,
    taint: TaintAnalyzer,
}

/// Everything a single `analyze` call evaluates against.
struct FileContext<'a> {
    path: &'a str,
    content: &'a str,
    tree: &'a SyntaxTree,
    rule: &'a Rule,
    confidence: f64,
}

impl EnhancedAnalyzer {
    pub const CAPABILITIES: Capabilities = Capabilities { negation: false };

    pub fn new() -> Self {
        Self::with_options(AnalyzerOptions::default())
    }

    pub fn with_options(options: AnalyzerOptions) -> Self {
        Self {
            options,
            taint: TaintAnalyzer::with_thresholds(options.risk),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        Self::CAPABILITIES
    }

    pub fn analyze(&self, file_path: &str, content: &str, tree: &SyntaxTree, rule: &Rule) -> AnalysisOutcome {
        let ctx = FileContext {
            path: file_path,
            content,
            tree,
            rule,
            confidence: rule
                .confidence()
                .unwrap_or(self.options.default_confidence)
                .clamp(0.0, 1.0),
        };
        let mut outcome = AnalysisOutcome::default();

        let queries = rule
            .patterns
            .iter()
            .enumerate()
            .filter(|(_, p)| p.kind == RulePatternKind::Query);
        for (index, pattern) in queries {
            let result = if is_eql_query(&pattern.value) {
                self.prepare(&pattern.value)
                    .map(|query| self.evaluate(&ctx, &query.expression, &mut outcome.warnings))
            } else {
                LegacyPattern::parse(&pattern.value)
                    .map(|legacy| self.run_legacy(&ctx, &legacy, &pattern.value))
                    .map_err(|e| e.to_string())
            };

            match result {
                Ok(findings) => outcome.findings.extend(findings),
                Err(message) => outcome.warnings.push(format!(
                    "rule {}: skipping pattern {}: {}",
                    rule.id,
                    index + 1,
                    message
                )),
            }
        }

        debug!(
            rule = %rule.id,
            file = file_path,
            findings = outcome.findings.len(),
            warnings = outcome.warnings.len(),
            "enhanced analysis finished"
        );
        outcome
    }

    /// Lexes, parses and validates a query string.
    pub fn prepare(&self, source: &str) -> Result<Query, String> {
        let query = parse(&tokenize(source)).map_err(|e| e.to_string())?;

        let report = validate_with(&query, ValidationOptions { closed_world: true });
        if !report.valid {
            return Err(format!("invalid query: {}", report.errors.join("; ")));
        }

        Ok(if self.options.optimizer_hints {
            optimize(query)
        } else {
            query
        })
    }

    fn evaluate(&self, ctx: &FileContext<'_>, expression: &QueryExpression, warnings: &mut Vec<String>) -> Vec<Finding> {
        match expression {
            QueryExpression::Taint(taint) => self.run_taint(ctx, taint),
            QueryExpression::Pattern(pattern) => AdvancedPatternMatcher::new(ctx.confidence)
                .execute_query(pattern, ctx.tree)
                .into_iter()
                .map(|m| self.pattern_finding(ctx, m))
                .collect(),
            QueryExpression::Logical(logical) => match logical.operator {
                LogicalOperator::Not => {
                    warnings.push(format!(
                        "rule {}: NOT is unsupported and contributes no findings",
                        ctx.rule.id
                    ));
                    Vec::new()
                }
                LogicalOperator::And => {
                    let results: Vec<Vec<Finding>> = logical
                        .operands
                        .iter()
                        .map(|operand| self.evaluate(ctx, operand, warnings))
                        .collect();
                    intersect_by_location(results)
                }
                LogicalOperator::Or => logical
                    .operands
                    .iter()
                    .flat_map(|operand| self.evaluate(ctx, operand, warnings))
                    .collect(),
            },
        }
    }

    fn run_taint(&self, ctx: &FileContext<'_>, taint: &TaintExpression) -> Vec<Finding> {
        self.taint
            .analyze_taint_flows(
                std::slice::from_ref(&taint.source),
                std::slice::from_ref(&taint.sink),
                &taint.sanitizers,
                ctx.tree,
            )
            .into_iter()
            .map(|flow| self.taint_finding(ctx, flow))
            .collect()
    }

    fn taint_finding(&self, ctx: &FileContext<'_>, flow: TaintFlowResult) -> Finding {
        let source = ctx.tree.get(flow.source);
        let sink = ctx.tree.get(flow.sink);
        let description = format!(
            "{} Untrusted data flows from line {} to line {}.",
            ctx.rule.description, source.line, sink.line
        );

        self.finding(ctx, sink.line, sink.column, ctx.confidence)
            .with_severity(Severity::from(flow.risk_level))
            .with_description(description.trim_start().to_string())
            .with_fallback_recommendation(flow.recommendations.get(1).cloned())
            .with_extra("taintFlow", json!(flow.path))
            .with_extra("riskLevel", flow.risk_level.as_str())
            .with_extra("flowDistance", flow.flow_distance)
            .with_extra("sinkCategory", flow.sink_category.as_str())
            .with_extra("recommendations", json!(flow.recommendations))
    }

    fn pattern_finding(&self, ctx: &FileContext<'_>, m: PatternMatch) -> Finding {
        self.finding(ctx, m.line, m.column, m.confidence)
            .with_extra("matchReason", m.match_reason)
    }

    fn run_legacy(&self, ctx: &FileContext<'_>, legacy: &LegacyPattern, source: &str) -> Vec<Finding> {
        legacy
            .run(ctx.tree, ctx.content)
            .into_iter()
            .map(|m| {
                let finding = self
                    .finding(ctx, m.line, m.column, self.options.legacy_confidence)
                    .with_extra("legacyPattern", source)
                    .with_extra("matchReason", m.reason);
                match m.variable {
                    Some(variable) => finding.with_extra("variable", variable),
                    None => finding,
                }
            })
            .collect()
    }

    fn finding(&self, ctx: &FileContext<'_>, line: usize, column: usize, confidence: f64) -> Finding {
        Finding::for_rule(
            ctx.rule,
            ctx.path,
            ctx.content,
            line,
            column,
            self.options.snippet_context,
            confidence,
        )
    }
}

impl Default for EnhancedAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Findings of the first operand whose location appears in every other
/// operand's findings.
fn intersect_by_location(mut results: Vec<Vec<Finding>>) -> Vec<Finding> {
    if results.is_empty() || results.iter().any(Vec::is_empty) {
        return Vec::new();
    }

    let first = results.remove(0);
    let others: Vec<HashSet<(usize, usize)>> = results
        .iter()
        .map(|findings| findings.iter().map(Finding::position).collect())
        .collect();

    first
        .into_iter()
        .filter(|f| others.iter().all(|set| set.contains(&f.position())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::GENERIC_FIX;
    use crate::rules::{RuleMetadata, RulePattern};
    use crate::syntax::NodeSpec;

    fn rule(patterns: &[&str]) -> Rule {
        Rule {
            id: "test-rule".to_string(),
            name: "Test rule".to_string(),
            description: "Something dangerous.".to_string(),
            severity: Severity::Medium,
            category: "injection".to_string(),
            patterns: patterns.iter().map(|p| RulePattern::query(p)).collect(),
            languages: vec![],
            enabled: true,
            fix: None,
            metadata: None,
        }
    }

    fn positions(findings: &[Finding]) -> Vec<(usize, usize)> {
        findings.iter().map(Finding::position).collect()
    }

    fn call_tree() -> SyntaxTree {
        let mut tree = SyntaxTree::new();
        tree.add_node(NodeSpec::new("CallExpression", 5, 0, "eval(a)"), None);
        tree.add_node(NodeSpec::new("CallExpression", 9, 2, "eval(b)"), None);
        tree
    }

    #[test]
    fn taint_finding_is_located_at_the_sink() {
        let mut tree = SyntaxTree::new();
        tree.add_node(NodeSpec::new("MemberExpression", 8, 11, "req.body"), None);
        tree.add_node(NodeSpec::new("CallExpression", 10, 3, "eval(code)"), None);
        let r = rule(&[r#"TAINT { SOURCE: {MemberExpression: "req.body"}, SINK: {CallExpression: /^eval\(/} }"#]);

        let outcome = EnhancedAnalyzer::new().analyze("app.js", "", &tree, &r);

        assert!(outcome.warnings.is_empty(), "{:?}", outcome.warnings);
        assert_eq!(outcome.findings.len(), 1);
        let finding = &outcome.findings[0];
        assert_eq!(finding.position(), (10, 3));
        assert_eq!(finding.severity, Severity::Critical);
        assert_eq!(finding.metadata.extra["flowDistance"], 2);
        assert_eq!(finding.metadata.extra["riskLevel"], "critical");
        assert_eq!(finding.metadata.extra["taintFlow"].as_array().map(Vec::len), Some(2));
        assert!(finding.description.ends_with("from line 8 to line 10."));
        assert!(finding.fix.recommendation.contains("evaluate"));
    }

    #[test]
    fn sanitizer_between_source_and_sink_yields_nothing() {
        let mut tree = SyntaxTree::new();
        tree.add_node(NodeSpec::new("MemberExpression", 8, 11, "req.body"), None);
        tree.add_node(NodeSpec::new("CallExpression", 9, 3, "sanitize(code)"), None);
        tree.add_node(NodeSpec::new("CallExpression", 10, 3, "eval(code)"), None);
        let r = rule(&[r#"TAINT {
            SOURCE: {MemberExpression: "req.body"},
            SINK: {CallExpression: /^eval\(/},
            SANITIZER: {CallExpression: sanitize},
        }"#]);

        let outcome = EnhancedAnalyzer::new().analyze("app.js", "", &tree, &r);

        assert!(outcome.findings.is_empty());
    }

    #[test]
    fn and_intersects_by_location() {
        let r = rule(&[r#"AND({CallExpression: "eval(a)"}, {CallExpression: eval})"#]);

        let outcome = EnhancedAnalyzer::new().analyze("a.js", "", &call_tree(), &r);

        assert_eq!(positions(&outcome.findings), vec![(5, 0)]);
    }

    #[test]
    fn or_concatenates_without_dedup() {
        let r = rule(&[r#"OR({CallExpression: "eval(a)"}, {CallExpression: eval})"#]);

        let outcome = EnhancedAnalyzer::new().analyze("a.js", "", &call_tree(), &r);

        assert_eq!(positions(&outcome.findings), vec![(5, 0), (5, 0), (9, 2)]);
    }

    #[test]
    fn and_with_an_empty_operand_is_empty() {
        let r = rule(&[r#"AND({CallExpression: eval}, {CallExpression: nothing})"#]);

        let outcome = EnhancedAnalyzer::new().analyze("a.js", "", &call_tree(), &r);

        assert!(outcome.findings.is_empty());
    }

    #[test]
    fn not_is_refused_with_a_warning() {
        let r = rule(&[r#"OR({CallExpression: "eval(b)"}, NOT({CallExpression: "eval(a)"}))"#]);

        let outcome = EnhancedAnalyzer::new().analyze("a.js", "", &call_tree(), &r);

        assert_eq!(positions(&outcome.findings), vec![(9, 2)]);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("unsupported"));
        assert!(!EnhancedAnalyzer::new().capabilities().negation);
    }

    #[test]
    fn malformed_pattern_is_skipped_and_others_still_run() {
        let r = rule(&[
            r#"{CallExpression: "eval(a)"}"#,
            r#"{CallExpression: [eval }"#,
            r#"OR({Identifier: x}, {CallExpression: "eval(b)"})"#,
        ]);

        let outcome = EnhancedAnalyzer::new().analyze("a.js", "", &call_tree(), &r);

        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("pattern 2"));
        assert_eq!(positions(&outcome.findings), vec![(5, 0), (9, 2)]);
    }

    #[test]
    fn deeply_nested_pattern_is_skipped_and_others_still_run() {
        let deep = "AND(".repeat(5_000);
        let r = rule(&[r#"{CallExpression: "eval(a)"}"#, &deep]);

        let outcome = EnhancedAnalyzer::new().analyze("a.js", "", &call_tree(), &r);

        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("pattern 2"));
        assert!(outcome.warnings[0].contains("deeper than 64 levels"));
        assert_eq!(positions(&outcome.findings), vec![(5, 0)]);
    }

    #[test]
    fn flow_with_alternation_is_routed_to_eql_and_skipped() {
        let r = rule(&[r"flow(req\.(body|query)->eval)"]);

        let outcome = EnhancedAnalyzer::new().analyze("a.js", "", &call_tree(), &r);

        assert!(outcome.findings.is_empty());
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("syntax error"));
    }

    #[test]
    fn invalid_query_is_skipped_with_a_warning() {
        let r = rule(&[r#"AND({CallExpression: eval})"#]);

        let outcome = EnhancedAnalyzer::new().analyze("a.js", "", &call_tree(), &r);

        assert!(outcome.findings.is_empty());
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("at least 2 operands"));
    }

    #[test]
    fn pattern_findings_carry_rule_confidence_and_reason() {
        let mut r = rule(&[r#"{CallExpression: eval, reason: "dynamic code"}"#]);
        r.metadata = Some(RuleMetadata {
            confidence: Some(0.95),
            ..RuleMetadata::default()
        });

        let outcome = EnhancedAnalyzer::new().analyze("a.js", "", &call_tree(), &r);

        assert_eq!(outcome.findings.len(), 2);
        assert!(outcome.findings.iter().all(|f| f.metadata.confidence == 0.95));
        assert_eq!(outcome.findings[0].severity, Severity::Medium);
        assert!(outcome.findings[0].metadata.extra["matchReason"]
            .as_str()
            .is_some_and(|r| r.starts_with("dynamic code")));
        assert_eq!(outcome.findings[0].fix.recommendation, GENERIC_FIX);
    }

    #[test]
    fn legacy_flow_runs_on_file_lines() {
        let content = "\
function handler(req) {
  log(req);
  const x = req.body;
  audit(x);
  audit(x);
  audit(x);
  eval(x);
}
";
        let r = rule(&[r"flow(req\.body->eval)"]);

        let outcome = EnhancedAnalyzer::new().analyze("a.js", content, &SyntaxTree::new(), &r);

        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.findings.len(), 1);
        let finding = &outcome.findings[0];
        assert_eq!(finding.location.line, 7);
        assert_eq!(finding.metadata.extra["variable"], "x");
        assert_eq!(finding.metadata.confidence, 0.6);
        assert!(finding.snippet.contains(">"));
    }

    #[test]
    fn legacy_selector_runs_on_tree() {
        let mut tree = SyntaxTree::new();
        tree.add_node(NodeSpec::new("FunctionDecl", 1, 1, "function foo() {}").with_name("foo"), None);
        tree.add_node(NodeSpec::new("CallExpression", 2, 1, "foo()").with_name("foo"), None);
        let r = rule(&["FunctionDecl[name=foo]"]);

        let outcome = EnhancedAnalyzer::new().analyze("a.js", "", &tree, &r);

        assert_eq!(positions(&outcome.findings), vec![(1, 1)]);
    }

    #[test]
    fn unrecognized_pattern_warns() {
        let r = rule(&["this is not a pattern"]);

        let outcome = EnhancedAnalyzer::new().analyze("a.js", "", &call_tree(), &r);

        assert!(outcome.findings.is_empty());
        assert_eq!(outcome.warnings.len(), 1);
    }

    #[test]
    fn plain_patterns_are_not_evaluated_here() {
        let mut r = rule(&[]);
        r.patterns.push(RulePattern::regex("eval"));

        let outcome = EnhancedAnalyzer::new().analyze("a.js", "eval(a)", &call_tree(), &r);

        assert!(outcome.findings.is_empty());
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn confidence_stays_in_unit_range() {
        let options = AnalyzerOptions {
            default_confidence: 3.0,
            legacy_confidence: -1.0,
            ..AnalyzerOptions::default()
        };
        let r = rule(&[
            r#"{CallExpression: eval}"#,
            "CallExpression",
            r#"TAINT { SOURCE: {CallExpression: "eval(a)"}, SINK: {CallExpression: "eval(b)"} }"#,
        ]);

        let outcome = EnhancedAnalyzer::with_options(options).analyze("a.js", "", &call_tree(), &r);

        assert_eq!(outcome.findings.len(), 5);
        for finding in &outcome.findings {
            assert!((0.0..=1.0).contains(&finding.metadata.confidence));
        }
    }

    #[test]
    fn optimizer_hints_are_attached_when_enabled() {
        let query = EnhancedAnalyzer::new()
            .prepare("AND({A: a}, {B: b})")
            .unwrap();
        assert_eq!(query.metadata.len(), 3);

        let plain = EnhancedAnalyzer::with_options(AnalyzerOptions {
            optimizer_hints: false,
            ..AnalyzerOptions::default()
        })
        .prepare("AND({A: a}, {B: b})")
        .unwrap();
        assert!(plain.metadata.is_empty());
    }
}
