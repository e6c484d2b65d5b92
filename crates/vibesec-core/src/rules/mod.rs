//! Declarative security rules
//!
//! Rules are data: each one carries a list of patterns that are either
//! plain regexes and literals, checked line by line, or structural queries
//! handed to the enhanced analyzer.

pub mod loader;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::taint::RiskLevel;

pub use loader::{RuleLoadError, RuleSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

impl From<RiskLevel> for Severity {
    fn from(risk: RiskLevel) -> Self {
        match risk {
            RiskLevel::Critical => Severity::Critical,
            RiskLevel::High => Severity::High,
            RiskLevel::Medium => Severity::Medium,
            RiskLevel::Low => Severity::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RulePatternKind {
    Regex,
    Literal,
    Query,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulePattern {
    pub kind: RulePatternKind,
    #[serde(alias = "pattern")]
    pub value: String,
    #[serde(default = "default_true")]
    pub case_sensitive: bool,
}

impl RulePattern {
    pub fn query(value: &str) -> Self {
        Self {
            kind: RulePatternKind::Query,
            value: value.to_string(),
            case_sensitive: true,
        }
    }

    pub fn regex(value: &str) -> Self {
        Self {
            kind: RulePatternKind::Regex,
            value: value.to_string(),
            case_sensitive: true,
        }
    }

    pub fn literal(value: &str) -> Self {
        Self {
            kind: RulePatternKind::Literal,
            value: value.to_string(),
            case_sensitive: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleFix {
    pub recommendation: String,
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub references: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleMetadata {
    pub confidence: Option<f64>,
    pub cwe: Option<String>,
    pub owasp: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub severity: Severity,
    #[serde(default = "default_category")]
    pub category: String,
    pub patterns: Vec<RulePattern>,
    /// Empty means every language.
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub fix: Option<RuleFix>,
    #[serde(default)]
    pub metadata: Option<RuleMetadata>,
}

impl Rule {
    pub fn applies_to(&self, language: Option<&str>) -> bool {
        if self.languages.is_empty() || self.languages.iter().any(|l| l == "*") {
            return true;
        }
        language.is_some_and(|lang| self.languages.iter().any(|l| l.eq_ignore_ascii_case(lang)))
    }

    pub fn has_query_patterns(&self) -> bool {
        self.patterns.iter().any(|p| p.kind == RulePatternKind::Query)
    }

    pub fn confidence(&self) -> Option<f64> {
        self.metadata.as_ref().and_then(|m| m.confidence)
    }
}

/// Language name for a file extension, as used in `Rule::languages`.
pub fn language_for_path(path: &str) -> Option<&'static str> {
    let extension = path.rsplit_once('.')?.1.to_ascii_lowercase();
    let language = match extension.as_str() {
        "py" | "pyw" => "python",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "ts" | "tsx" | "mts" | "cts" => "typescript",
        "go" => "go",
        "java" => "java",
        "rb" => "ruby",
        "php" => "php",
        "rs" => "rust",
        _ => return None,
    };
    Some(language)
}

fn default_true() -> bool {
    true
}

fn default_category() -> String {
    "security".to_string()
}
