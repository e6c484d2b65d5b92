//! Human-readable text output

use super::SeverityCounts;
use colored::{ColoredString, Colorize};
use std::fmt::Write;
use vibesec_core::{Finding, Severity};

pub struct TextFormatter {
    show_snippets: bool,
}

impl TextFormatter {
    pub fn new(show_snippets: bool) -> Self {
        Self { show_snippets }
    }

    pub fn format(&self, findings: &[Finding], total_files: usize) -> String {
        let mut out = String::new();

        for finding in findings {
            let _ = writeln!(
                out,
                "{}:{}:{}: {} [{}] {}",
                finding.location.file,
                finding.location.line,
                finding.location.column,
                severity_label(finding.severity),
                finding.rule.dimmed(),
                finding.title
            );
            if !finding.description.is_empty() {
                let _ = writeln!(out, "  {}", finding.description);
            }
            if self.show_snippets && !finding.snippet.is_empty() {
                for line in finding.snippet.lines() {
                    let _ = writeln!(out, "    {}", line.dimmed());
                }
            }
            let _ = writeln!(out, "  {} {}", "fix:".green(), finding.fix.recommendation);
            let _ = writeln!(
                out,
                "  {} {:.2}",
                "confidence:".dimmed(),
                finding.metadata.confidence
            );
            out.push('\n');
        }

        if findings.is_empty() {
            let _ = writeln!(out, "{} No findings in {} file(s)", "ok:".green().bold(), total_files);
            return out;
        }

        let counts = SeverityCounts::from_findings(findings);
        let _ = writeln!(
            out,
            "Found {} finding(s) in {} file(s): {} critical, {} high, {} medium, {} low, {} info",
            findings.len(),
            total_files,
            counts.critical,
            counts.high,
            counts.medium,
            counts.low,
            counts.info
        );
        out
    }
}

fn severity_label(severity: Severity) -> ColoredString {
    match severity {
        Severity::Critical => severity.as_str().red().bold(),
        Severity::High => severity.as_str().red(),
        Severity::Medium => severity.as_str().yellow(),
        Severity::Low => severity.as_str().blue(),
        Severity::Info => severity.as_str().cyan(),
    }
}
