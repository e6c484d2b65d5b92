//! Scan command - runs every loaded rule over a file or directory

use crate::commands::{configure_colors, load_rules_and_config};
use crate::output::json::JsonFormatter;
use crate::output::text::TextFormatter;
use anyhow::Result;
use clap::Args;
use rayon::prelude::*;
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;
use tracing::{debug, info, warn};
use vibesec_core::config::Config;
use vibesec_core::rules::language_for_path;
use vibesec_core::{Finding, ScanReport, Scanner, Severity};
use walkdir::WalkDir;

const SKIPPED_DIRS: &[&str] = &["node_modules", "target", "vendor", "__pycache__"];

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Path to file or directory to scan
    #[arg(value_name = "PATH", default_value = ".")]
    pub path: PathBuf,

    /// Output format for findings (text, json, ndjson)
    #[arg(short, long, default_value = "text")]
    pub format: String,

    /// Additional rule file (YAML or TOML); may be repeated
    #[arg(long, value_name = "FILE")]
    pub rules: Vec<PathBuf>,

    /// Only report findings at or above this severity (info, low, medium, high, critical)
    #[arg(long, value_name = "LEVEL")]
    pub severity: Option<String>,

    /// Exit with code 1 when a finding at or above this severity is reported
    #[arg(long, value_name = "LEVEL", default_value = "high")]
    pub fail_on: String,

    /// Hide code snippets in text output
    #[arg(long)]
    pub no_snippets: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

impl ScanArgs {
    pub fn run(&self) -> Result<()> {
        configure_colors(self.no_color);
        let min_severity = parse_severity(self.severity.as_deref().unwrap_or("info"))?;
        let fail_on = parse_severity(&self.fail_on)?;

        let (rules, config) = load_rules_and_config(&self.path, &self.rules);
        info!(rule_count = rules.len(), "rules loaded");

        let files = discover_files(&self.path, &config)?;
        if files.is_empty() {
            println!("No supported source files found.");
            return Ok(());
        }

        let started = Instant::now();
        let scanner = Scanner::new(rules, config);
        let report = scan_files(&scanner, &files);
        info!(
            files = files.len(),
            findings = report.findings.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "scan complete"
        );
        for warning in &report.warnings {
            warn!("{warning}");
        }

        let findings: Vec<Finding> = report
            .findings
            .into_iter()
            .filter(|f| f.severity >= min_severity)
            .collect();

        let analyzed_path = self.path.to_string_lossy().to_string();
        match self.format.as_str() {
            "json" => {
                println!("{}", JsonFormatter::new().format(&findings, files.len(), &analyzed_path))
            }
            "ndjson" => {
                let mut stdout = io::stdout().lock();
                JsonFormatter::new().format_ndjson(&findings, files.len(), &analyzed_path, &mut stdout)?;
            }
            "text" => print!(
                "{}",
                TextFormatter::new(!self.no_snippets).format(&findings, files.len())
            ),
            other => anyhow::bail!("Invalid format '{}'. Valid values: text, json, ndjson", other),
        }

        if findings.iter().any(|f| f.severity >= fail_on) {
            process::exit(1);
        }

        Ok(())
    }
}

fn parse_severity(value: &str) -> Result<Severity> {
    value.parse::<Severity>().map_err(|_| {
        anyhow::anyhow!(
            "Invalid severity '{}'. Valid values: info, low, medium, high, critical",
            value
        )
    })
}

/// Scans files in parallel. Reports are merged in file order, so output is
/// stable across runs.
fn scan_files(scanner: &Scanner, files: &[PathBuf]) -> ScanReport {
    let reports: Vec<ScanReport> = files
        .par_iter()
        .map(|file| match scanner.scan_file(file) {
            Ok(report) => {
                debug!(file = %file.display(), findings = report.findings.len(), "scanned");
                report
            }
            Err(e) => ScanReport {
                findings: Vec::new(),
                warnings: vec![format!("skipping {}: {}", file.display(), e)],
            },
        })
        .collect();

    let mut merged = ScanReport::default();
    for report in reports {
        merged.merge(report);
    }
    merged
}

fn discover_files(path: &Path, config: &Config) -> Result<Vec<PathBuf>> {
    if !path.exists() {
        anyhow::bail!("Path does not exist: {}", path.display());
    }

    if path.is_file() {
        if is_supported_file(path) {
            return Ok(vec![path.to_path_buf()]);
        } else {
            return Ok(vec![]);
        }
    }

    let filter = config.path_filter();
    let files: Vec<PathBuf> = WalkDir::new(path)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_skipped_dir(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| is_supported_file(e.path()))
        .filter(|e| {
            let relative = e.path().strip_prefix(path).unwrap_or(e.path());
            filter.is_included(&relative.to_string_lossy().replace('\\', "/"))
        })
        .map(|e| e.path().to_path_buf())
        .collect();

    Ok(files)
}

fn is_supported_file(path: &Path) -> bool {
    language_for_path(&path.to_string_lossy()).is_some()
}

fn is_skipped_dir(entry: &walkdir::DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.') || SKIPPED_DIRS.contains(&name))
        .unwrap_or(false)
}
