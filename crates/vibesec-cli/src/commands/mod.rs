//! CLI command implementations

pub mod explain;
pub mod rules;
pub mod scan;

pub use explain::ExplainArgs;
pub use rules::RulesArgs;
pub use scan::ScanArgs;

use std::path::{Path, PathBuf};

use clap::Subcommand;
use tracing::warn;
use vibesec_core::config::{Config, load_config_or_default_with_warnings};
use vibesec_core::RuleSet;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan a file or directory for security issues
    Scan(ScanArgs),

    /// List the loaded rules
    Rules(RulesArgs),

    /// Show a rule, or parse and validate an EQL query
    Explain(ExplainArgs),
}

/// Loads `vibesec.toml` for `start` (or its parent when `start` is a file)
/// and the rule set it points to, plus any extra rule files.
///
/// Every problem along the way is logged and skipped.
pub(crate) fn load_rules_and_config(start: &Path, extra_rules: &[PathBuf]) -> (RuleSet, Config) {
    let config_dir = if start.is_file() {
        start.parent().unwrap_or(Path::new("."))
    } else {
        start
    };

    let config_result = load_config_or_default_with_warnings(config_dir);
    for warning in &config_result.warnings {
        warn!("{warning}");
    }
    let config = config_result.config;

    let mut paths = config.rules.paths.clone();
    paths.extend(extra_rules.iter().cloned());
    let (rules, warnings) = RuleSet::load(&paths);
    for warning in &warnings {
        warn!("{warning}");
    }

    (rules, config)
}

pub(crate) fn configure_colors(no_color: bool) {
    let no_color_env = std::env::var("NO_COLOR").is_ok();
    if no_color || no_color_env {
        colored::control::set_override(false);
    }
}
