//! Findings reported to the rest of the scanner

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::rules::{Rule, Severity};

pub const GENERIC_FIX: &str = "Review and fix this security issue";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    pub file: String,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fix {
    pub recommendation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    pub references: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FindingMetadata {
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwe: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owasp: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub id: String,
    pub rule: String,
    pub severity: Severity,
    pub category: String,
    pub title: String,
    pub description: String,
    pub location: Location,
    pub snippet: String,
    pub fix: Fix,
    pub metadata: FindingMetadata,
}

impl Finding {
    /// Builds a finding for `rule` at a 1-based position in `content`.
    ///
    /// The id is the rule id plus a random suffix, so two findings never
    /// share an id even at the same location.
    pub fn for_rule(
        rule: &Rule,
        file: &str,
        content: &str,
        line: usize,
        column: usize,
        snippet_context: usize,
        confidence: f64,
    ) -> Self {
        let fix = match &rule.fix {
            Some(fix) => Fix {
                recommendation: fix.recommendation.clone(),
                before: fix.before.clone(),
                after: fix.after.clone(),
                references: fix.references.clone(),
            },
            None => Fix {
                recommendation: GENERIC_FIX.to_string(),
                before: None,
                after: None,
                references: Vec::new(),
            },
        };
        let metadata = rule.metadata.clone().unwrap_or_default();

        Self {
            id: format!("{}-{}", rule.id, uuid::Uuid::new_v4().simple()),
            rule: rule.id.clone(),
            severity: rule.severity,
            category: rule.category.clone(),
            title: rule.name.clone(),
            description: rule.description.clone(),
            location: Location {
                file: file.to_string(),
                line,
                column,
            },
            snippet: extract_snippet(content, line, snippet_context),
            fix,
            metadata: FindingMetadata {
                confidence: confidence.clamp(0.0, 1.0),
                cwe: metadata.cwe,
                owasp: metadata.owasp,
                extra: BTreeMap::new(),
            },
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_description(mut self, description: String) -> Self {
        self.description = description;
        self
    }

    pub fn with_extra(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.extra.insert(key.to_string(), value.into());
        self
    }

    /// Used when the rule gave no fix and the engine knows better advice.
    pub fn with_fallback_recommendation(mut self, recommendation: Option<String>) -> Self {
        if let Some(recommendation) = recommendation {
            if self.fix.recommendation == GENERIC_FIX {
                self.fix.recommendation = recommendation;
            }
        }
        self
    }

    pub fn position(&self) -> (usize, usize) {
        (self.location.line, self.location.column)
    }
}

/// A few lines around `line`, numbered, with the matched line marked by `>`.
pub fn extract_snippet(content: &str, line: usize, context: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    if line == 0 || line > lines.len() {
        return String::new();
    }

    let start = line.saturating_sub(context).max(1);
    let end = (line + context).min(lines.len());
    let width = end.to_string().len();

    (start..=end)
        .map(|n| {
            let marker = if n == line { '>' } else { ' ' };
            format!("{} {:>width$} | {}", marker, n, lines[n - 1].trim_end())
        })
        .collect::<Vec<_>>()
        .join("\n")
}
