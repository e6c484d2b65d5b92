//! Rules command - lists the rules a scan would load

use crate::commands::{configure_colors, load_rules_and_config};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use vibesec_core::config::Config;
use vibesec_core::rules::{Rule, RulePatternKind};
use vibesec_core::{RuleSet, Severity};

#[derive(Args, Debug)]
pub struct RulesArgs {
    /// Only list rules that apply to this language (e.g. python, javascript)
    #[arg(long, value_name = "LANG")]
    pub language: Option<String>,

    /// Additional rule file (YAML or TOML); may be repeated
    #[arg(long, value_name = "FILE")]
    pub rules: Vec<PathBuf>,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    pub format: String,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

#[derive(Debug, Serialize)]
struct RuleSummary<'a> {
    id: &'a str,
    name: &'a str,
    severity: Severity,
    category: &'a str,
    languages: &'a [String],
    enabled: bool,
    query_patterns: usize,
    text_patterns: usize,
}

impl<'a> RuleSummary<'a> {
    fn new(rule: &'a Rule, config: &Config) -> Self {
        let query_patterns = rule
            .patterns
            .iter()
            .filter(|p| p.kind == RulePatternKind::Query)
            .count();
        Self {
            id: &rule.id,
            name: &rule.name,
            severity: config.rules.severity.get(&rule.id).copied().unwrap_or(rule.severity),
            category: &rule.category,
            languages: &rule.languages,
            enabled: rule.enabled && !config.is_rule_disabled(&rule.id),
            query_patterns,
            text_patterns: rule.patterns.len() - query_patterns,
        }
    }
}

impl RulesArgs {
    pub fn run(&self) -> Result<()> {
        configure_colors(self.no_color);
        let cwd = std::env::current_dir()?;
        let (rules, config) = load_rules_and_config(&cwd, &self.rules);
        let summaries = summarize(&rules, &config, self.language.as_deref());

        match self.format.as_str() {
            "json" => println!("{}", serde_json::to_string_pretty(&summaries)?),
            "text" => {
                for rule in &summaries {
                    let status = if rule.enabled {
                        "enabled".green()
                    } else {
                        "disabled".red()
                    };
                    let languages = if rule.languages.is_empty() {
                        "all".to_string()
                    } else {
                        rule.languages.join(", ")
                    };
                    println!(
                        "{:<28} {:<9} {:<14} {:<8} {}",
                        rule.id.bold(),
                        rule.severity.as_str(),
                        rule.category,
                        status,
                        languages.dimmed()
                    );
                }
                println!();
                println!("{} rule(s)", summaries.len());
            }
            other => anyhow::bail!("Invalid format '{}'. Valid values: text, json", other),
        }

        Ok(())
    }
}

fn summarize<'a>(rules: &'a RuleSet, config: &Config, language: Option<&str>) -> Vec<RuleSummary<'a>> {
    rules
        .iter()
        .filter(|rule| language.is_none() || rule.applies_to(language))
        .map(|rule| RuleSummary::new(rule, config))
        .collect()
}
