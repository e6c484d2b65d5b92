//! JSON output formatter for scan findings
//!
//! Provides a single JSON document and an NDJSON stream for programmatic
//! integration.

use super::SeverityCounts;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::io::{self, Write};
use vibesec_core::Finding;

#[derive(Serialize)]
pub struct JsonOutput<'a> {
    pub version: &'static str,
    pub metadata: JsonMetadata,
    pub summary: JsonSummary,
    pub findings: &'a [Finding],
}

#[derive(Serialize)]
pub struct JsonMetadata {
    pub vibesec_version: &'static str,
    pub working_directory: String,
    pub analyzed_path: String,
}

#[derive(Serialize)]
pub struct JsonSummary {
    pub total_files: usize,
    pub files_with_findings: usize,
    pub total_findings: usize,
    pub by_severity: SeverityCounts,
    pub by_category: BTreeMap<String, usize>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NdjsonRecord<'a> {
    Metadata(JsonMetadata),
    Finding(&'a Finding),
    Summary(JsonSummary),
}

#[derive(Debug, Default)]
pub struct JsonFormatter;

impl JsonFormatter {
    pub fn new() -> Self {
        Self
    }

    pub fn format(&self, findings: &[Finding], total_files: usize, analyzed_path: &str) -> String {
        let output = JsonOutput {
            version: "1.0",
            metadata: build_metadata(analyzed_path),
            summary: build_summary(findings, total_files),
            findings,
        };
        serde_json::to_string_pretty(&output).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn format_ndjson<W: Write>(
        &self,
        findings: &[Finding],
        total_files: usize,
        analyzed_path: &str,
        writer: &mut W,
    ) -> io::Result<()> {
        let metadata = NdjsonRecord::Metadata(build_metadata(analyzed_path));
        writeln!(writer, "{}", serde_json::to_string(&metadata)?)?;

        for finding in findings {
            writeln!(writer, "{}", serde_json::to_string(&NdjsonRecord::Finding(finding))?)?;
        }

        let summary = NdjsonRecord::Summary(build_summary(findings, total_files));
        writeln!(writer, "{}", serde_json::to_string(&summary)?)?;

        Ok(())
    }
}

fn build_metadata(analyzed_path: &str) -> JsonMetadata {
    JsonMetadata {
        vibesec_version: env!("CARGO_PKG_VERSION"),
        working_directory: std::env::current_dir()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default(),
        analyzed_path: analyzed_path.to_string(),
    }
}

fn build_summary(findings: &[Finding], total_files: usize) -> JsonSummary {
    let mut by_category: BTreeMap<String, usize> = BTreeMap::new();
    for finding in findings {
        *by_category.entry(finding.category.clone()).or_default() += 1;
    }
    let files: HashSet<&str> = findings.iter().map(|f| f.location.file.as_str()).collect();

    JsonSummary {
        total_files,
        files_with_findings: files.len(),
        total_findings: findings.len(),
        by_severity: SeverityCounts::from_findings(findings),
        by_category,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::test_support::finding;
    use serde_json::Value;
    use vibesec_core::Severity;

    #[test]
    fn json_document_has_summary_and_findings() {
        let findings = vec![
            finding("eval-injection", Severity::Critical, "app.py", 3),
            finding("weak-hash", Severity::Medium, "app.py", 9),
            finding("weak-hash", Severity::Medium, "lib.py", 1),
        ];

        let output = JsonFormatter::new().format(&findings, 4, "src");
        let json: Value = serde_json::from_str(&output).unwrap();

        assert_eq!(json["version"], "1.0");
        assert_eq!(json["metadata"]["analyzed_path"], "src");
        assert_eq!(json["summary"]["total_files"], 4);
        assert_eq!(json["summary"]["files_with_findings"], 2);
        assert_eq!(json["summary"]["total_findings"], 3);
        assert_eq!(json["summary"]["by_severity"]["critical"], 1);
        assert_eq!(json["summary"]["by_severity"]["medium"], 2);
        assert_eq!(json["summary"]["by_category"]["injection"], 3);
        assert_eq!(json["findings"][0]["rule"], "eval-injection");
        assert_eq!(json["findings"][0]["severity"], "critical");
        assert_eq!(json["findings"][0]["location"]["line"], 3);
        assert_eq!(json["findings"][0]["metadata"]["cwe"], "CWE-95");
    }

    #[test]
    fn empty_findings_produce_zero_summary() {
        let output = JsonFormatter::new().format(&[], 2, ".");
        let json: Value = serde_json::from_str(&output).unwrap();

        assert_eq!(json["summary"]["total_findings"], 0);
        assert_eq!(json["findings"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn ndjson_stream_has_metadata_findings_and_summary() {
        let findings = vec![
            finding("eval-injection", Severity::Critical, "app.py", 3),
            finding("weak-hash", Severity::Medium, "app.py", 9),
        ];
        let mut buffer = Vec::new();

        JsonFormatter::new()
            .format_ndjson(&findings, 1, ".", &mut buffer)
            .unwrap();

        let lines: Vec<Value> = String::from_utf8(buffer)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0]["type"], "metadata");
        assert_eq!(lines[1]["type"], "finding");
        assert_eq!(lines[1]["rule"], "eval-injection");
        assert_eq!(lines[3]["type"], "summary");
        assert_eq!(lines[3]["total_findings"], 2);
    }
}
