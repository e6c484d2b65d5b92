//! Explain command - shows a rule in detail, or checks an EQL query

use crate::commands::{configure_colors, load_rules_and_config};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use vibesec_core::query::is_eql_query;
use vibesec_core::rules::{Rule, RulePatternKind};
use vibesec_core::{AnalyzerOptions, EnhancedAnalyzer};

#[derive(Args, Debug)]
pub struct ExplainArgs {
    #[arg(
        value_name = "RULE_ID_OR_QUERY",
        help = "Rule ID to explain (e.g. \"sql-injection\") or an EQL query to parse and validate"
    )]
    pub target: String,

    /// Additional rule file (YAML or TOML); may be repeated
    #[arg(long, value_name = "FILE")]
    pub rules: Vec<PathBuf>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

impl ExplainArgs {
    pub fn run(&self) -> Result<()> {
        configure_colors(self.no_color);
        let cwd = std::env::current_dir()?;
        let (rules, config) = load_rules_and_config(&cwd, &self.rules);
        let analyzer = EnhancedAnalyzer::with_options(AnalyzerOptions::from(&config.analysis));

        if let Some(rule) = rules.get(&self.target) {
            print_rule(rule, !config.is_rule_disabled(&rule.id), &analyzer);
            return Ok(());
        }

        if !is_eql_query(&self.target) {
            eprintln!(
                "{} '{}' is neither a known rule nor an EQL query",
                "error:".red().bold(),
                self.target
            );
            eprintln!();
            eprintln!("Available rules:");
            for rule in rules.iter() {
                eprintln!("  {} ({})", rule.id, rule.name);
            }
            std::process::exit(1);
        }

        match explain_query(&analyzer, &self.target) {
            Ok(tree) => {
                println!("{}", "valid query".green().bold());
                println!("{tree}");
                Ok(())
            }
            Err(message) => {
                eprintln!("{} {}", "error:".red().bold(), message);
                std::process::exit(1);
            }
        }
    }
}

/// Parsed and optimized query as pretty JSON, or the parse/validation error.
fn explain_query(analyzer: &EnhancedAnalyzer, source: &str) -> Result<String, String> {
    let query = analyzer.prepare(source)?;
    serde_json::to_string_pretty(&query).map_err(|e| e.to_string())
}

fn print_rule(rule: &Rule, enabled: bool, analyzer: &EnhancedAnalyzer) {
    println!();
    println!("{}", format!("Rule {}", rule.id).bold());
    println!();
    println!("  {}: {}", "Name".cyan(), rule.name);
    if !rule.description.is_empty() {
        println!("  {}: {}", "Description".cyan(), rule.description);
    }
    println!("  {}: {}", "Category".cyan(), rule.category);
    println!("  {}: {}", "Severity".cyan(), rule.severity);
    let languages = if rule.languages.is_empty() {
        "all".to_string()
    } else {
        rule.languages.join(", ")
    };
    println!("  {}: {}", "Languages".cyan(), languages);

    if let Some(metadata) = &rule.metadata {
        if let Some(cwe) = &metadata.cwe {
            println!("  {}: {}", "CWE".cyan(), cwe);
        }
        if let Some(owasp) = &metadata.owasp {
            println!("  {}: {}", "OWASP".cyan(), owasp);
        }
    }

    println!();
    println!("  {}:", "Patterns".cyan());
    for (index, pattern) in rule.patterns.iter().enumerate() {
        let kind = match pattern.kind {
            RulePatternKind::Regex => "regex",
            RulePatternKind::Literal => "literal",
            RulePatternKind::Query if is_eql_query(&pattern.value) => "eql",
            RulePatternKind::Query => "legacy",
        };
        println!("    {}. [{}]", index + 1, kind);
        for line in pattern.value.lines() {
            println!("       {}", line);
        }
        if kind == "eql" {
            if let Err(message) = analyzer.prepare(&pattern.value) {
                println!("       {} {}", "invalid:".red(), message);
            }
        }
    }

    if let Some(fix) = &rule.fix {
        println!();
        println!("  {}: {}", "Fix".cyan(), fix.recommendation);
        if let Some(before) = &fix.before {
            println!("    {} {}", "before:".red(), before);
        }
        if let Some(after) = &fix.after {
            println!("    {} {}", "after:".green(), after);
        }
        for reference in &fix.references {
            println!("    {}", reference.dimmed());
        }
    }

    println!();
    if enabled && rule.enabled {
        println!("  {}: {}", "Status".cyan(), "enabled".green());
    } else {
        println!("  {}: {}", "Status".cyan(), "disabled".red());
    }
    println!();
}
