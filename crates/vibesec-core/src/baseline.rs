//! Line-by-line detector for plain regex and literal rule patterns

use regex::{Regex, RegexBuilder};

use crate::finding::Finding;
use crate::rules::{Rule, RulePatternKind};

const COMMENT_PENALTY: f64 = 0.1;

#[derive(Debug, Clone, Copy)]
pub struct BaselineAnalyzer {
    default_confidence: f64,
    snippet_context: usize,
}

enum LinePattern {
    Literal { needle: String, case_sensitive: bool },
    Regex(Regex),
}

impl LinePattern {
    /// Byte offset of the first match in `line`.
    fn find(&self, line: &str) -> Option<usize> {
        match self {
            LinePattern::Literal {
                needle,
                case_sensitive: true,
            } => line.find(needle.as_str()),
            LinePattern::Literal { needle, .. } => line.to_lowercase().find(needle.as_str()),
            LinePattern::Regex(regex) => regex.find(line).map(|m| m.start()),
        }
    }
}

impl BaselineAnalyzer {
    pub fn new(default_confidence: f64, snippet_context: usize) -> Self {
        Self {
            default_confidence: default_confidence.clamp(0.0, 1.0),
            snippet_context,
        }
    }

    /// One finding per rule per matching line; the first pattern that
    /// matches a line wins. Query patterns are left to the enhanced analyzer.
    pub fn analyze(&self, file_path: &str, content: &str, rule: &Rule) -> (Vec<Finding>, Vec<String>) {
        let mut warnings = Vec::new();
        let patterns: Vec<LinePattern> = rule
            .patterns
            .iter()
            .filter_map(|pattern| match pattern.kind {
                RulePatternKind::Query => None,
                RulePatternKind::Literal => Some(LinePattern::Literal {
                    needle: if pattern.case_sensitive {
                        pattern.value.clone()
                    } else {
                        pattern.value.to_lowercase()
                    },
                    case_sensitive: pattern.case_sensitive,
                }),
                RulePatternKind::Regex => match RegexBuilder::new(&pattern.value)
                    .case_insensitive(!pattern.case_sensitive)
                    .build()
                {
                    Ok(regex) => Some(LinePattern::Regex(regex)),
                    Err(e) => {
                        warnings.push(format!(
                            "rule {}: skipping invalid regex '{}': {}",
                            rule.id, pattern.value, e
                        ));
                        None
                    }
                },
            })
            .collect();

        if patterns.is_empty() {
            return (Vec::new(), warnings);
        }

        let baseline = rule.confidence().unwrap_or(self.default_confidence);
        let findings = content
            .lines()
            .enumerate()
            .filter_map(|(index, line)| {
                let offset = patterns.iter().find_map(|p| p.find(line))?;
                let column = line.get(..offset).map_or(offset, |prefix| prefix.chars().count()) + 1;
                let confidence = if is_comment_line(line) {
                    baseline - COMMENT_PENALTY
                } else {
                    baseline
                };
                Some(Finding::for_rule(
                    rule,
                    file_path,
                    content,
                    index + 1,
                    column,
                    self.snippet_context,
                    confidence,
                ))
            })
            .collect();

        (findings, warnings)
    }
}

impl Default for BaselineAnalyzer {
    fn default() -> Self {
        Self::new(0.8, 2)
    }
}

fn is_comment_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    ["#", "//", "/*", "*", "--"]
        .iter()
        .any(|marker| trimmed.starts_with(marker))
}
