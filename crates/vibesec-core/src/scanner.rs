//! Per-file scanning with a loaded rule set
//!
//! A [`Scanner`] holds no mutable state, so one instance can be shared by
//! any number of threads scanning different files.

use std::path::Path;

use serde::Serialize;

use crate::analyzer::{AnalyzerOptions, EnhancedAnalyzer};
use crate::baseline::BaselineAnalyzer;
use crate::config::Config;
use crate::finding::Finding;
use crate::rules::{RuleLoadError, RuleSet, language_for_path};
use crate::syntax::SyntaxTree;
use crate::tree_builder::TreeBuilder;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub findings: Vec<Finding>,
    pub warnings: Vec<String>,
}

impl ScanReport {
    pub fn merge(&mut self, other: ScanReport) {
        self.findings.extend(other.findings);
        self.warnings.extend(other.warnings);
    }
}

#[derive(Debug, Clone)]
pub struct Scanner {
    rules: RuleSet,
    config: Config,
    analyzer: EnhancedAnalyzer,
    baseline: BaselineAnalyzer,
}

impl Scanner {
    pub fn new(rules: RuleSet, config: Config) -> Self {
        let options = AnalyzerOptions::from(&config.analysis);
        Self {
            analyzer: EnhancedAnalyzer::with_options(options),
            baseline: BaselineAnalyzer::new(options.default_confidence, options.snippet_context),
            rules,
            config,
        }
    }

    pub fn with_builtin_rules() -> Result<Self, RuleLoadError> {
        Ok(Self::new(RuleSet::builtin()?, Config::default()))
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn scan_file(&self, path: &Path) -> std::io::Result<ScanReport> {
        let content = std::fs::read_to_string(path)?;
        Ok(self.scan_source(&path.to_string_lossy(), &content))
    }

    /// Runs every applicable rule over one file's content. Findings are
    /// ordered by position; findings at the same position keep rule order.
    pub fn scan_source(&self, file_path: &str, content: &str) -> ScanReport {
        let language = language_for_path(file_path);
        let mut report = ScanReport::default();
        let mut tree: Option<SyntaxTree> = None;

        let rules = self
            .rules
            .for_language(language)
            .filter(|rule| !self.config.is_rule_disabled(&rule.id));

        for rule in rules {
            let (findings, warnings) = self.baseline.analyze(file_path, content, rule);
            report.findings.extend(findings);
            report.warnings.extend(warnings);

            if rule.has_query_patterns() {
                let tree =
                    tree.get_or_insert_with(|| TreeBuilder::for_language(language).build(content));
                let outcome = self.analyzer.analyze(file_path, content, tree, rule);
                report.findings.extend(outcome.findings);
                report.warnings.extend(outcome.warnings);
            }
        }

        for finding in &mut report.findings {
            if let Some(severity) = self.config.rules.severity.get(&finding.rule) {
                finding.severity = *severity;
            }
        }
        if let Some(min) = self.config.rules.min_confidence {
            report.findings.retain(|f| f.metadata.confidence >= min);
        }
        report.findings.sort_by_key(Finding::position);

        report
    }
}
