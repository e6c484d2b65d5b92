//! Configuration loading and parsing for VibeSec
//!
//! Provides functionality to load and parse `vibesec.toml` configuration files.

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::analyzer::AnalyzerOptions;
use crate::rules::Severity;
use crate::taint::RiskThresholds;

pub const CONFIG_FILENAME: &str = "vibesec.toml";

const KNOWN_TOP_LEVEL_KEYS: &[&str] = &["include", "exclude", "rules", "analysis"];
const KNOWN_RULES_KEYS: &[&str] = &["disabled", "severity", "min_confidence", "paths"];
const KNOWN_ANALYSIS_KEYS: &[&str] = &[
    "default_confidence",
    "legacy_confidence",
    "snippet_context",
    "optimizer_hints",
    "risk",
];
const KNOWN_RISK_KEYS: &[&str] = &["critical", "high", "medium"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid TOML in '{path}': {message}")]
    ParseError { path: PathBuf, message: String },
}

#[derive(Debug, Clone, Default)]
pub struct ConfigResult {
    pub config: Config,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Globs of paths to scan; empty means everything.
    pub include: Vec<String>,
    /// Globs of paths to skip.
    pub exclude: Vec<String>,
    pub rules: RulesConfig,
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct RulesConfig {
    pub disabled: Vec<String>,
    pub severity: HashMap<String, Severity>,
    pub min_confidence: Option<f64>,
    /// Extra rule files, relative to the config file.
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    pub default_confidence: f64,
    pub legacy_confidence: f64,
    pub snippet_context: usize,
    pub optimizer_hints: bool,
    pub risk: RiskThresholds,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let options = AnalyzerOptions::default();
        Self {
            default_confidence: options.default_confidence,
            legacy_confidence: options.legacy_confidence,
            snippet_context: options.snippet_context,
            optimizer_hints: options.optimizer_hints,
            risk: options.risk,
        }
    }
}

impl From<&AnalysisConfig> for AnalyzerOptions {
    fn from(config: &AnalysisConfig) -> Self {
        Self {
            default_confidence: config.default_confidence,
            legacy_confidence: config.legacy_confidence,
            snippet_context: config.snippet_context,
            optimizer_hints: config.optimizer_hints,
            risk: config.risk,
        }
    }
}

impl Config {
    pub fn is_rule_disabled(&self, rule_id: &str) -> bool {
        self.rules.disabled.iter().any(|id| id == rule_id)
    }

    /// Compiles `include` and `exclude`. Build it once per scan.
    pub fn path_filter(&self) -> PathFilter {
        PathFilter::new(&self.include, &self.exclude)
    }

    /// Whether a path relative to the scan root should be scanned.
    ///
    /// Compiles the globs on every call; walkers should hold a [`PathFilter`].
    pub fn is_path_included(&self, relative: &str) -> bool {
        self.path_filter().is_included(relative)
    }

    /// Replaces out-of-range values with defaults, one warning per fix.
    fn sanitize(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();
        let defaults = AnalysisConfig::default();
        let analysis = &mut self.analysis;

        if !(0.0..=1.0).contains(&analysis.default_confidence) {
            warnings.push(format!(
                "analysis.default_confidence {} is outside [0, 1]; using {}",
                analysis.default_confidence, defaults.default_confidence
            ));
            analysis.default_confidence = defaults.default_confidence;
        }
        if !(0.0..=1.0).contains(&analysis.legacy_confidence) {
            warnings.push(format!(
                "analysis.legacy_confidence {} is outside [0, 1]; using {}",
                analysis.legacy_confidence, defaults.legacy_confidence
            ));
            analysis.legacy_confidence = defaults.legacy_confidence;
        }
        if !analysis.risk.is_monotonic() {
            warnings.push(
                "analysis.risk thresholds must satisfy critical <= high <= medium; using defaults"
                    .to_string(),
            );
            analysis.risk = defaults.risk;
        }
        for (field, patterns) in [("include", &mut self.include), ("exclude", &mut self.exclude)] {
            patterns.retain(|pattern| match Glob::new(normalize_pattern(pattern)) {
                Ok(_) => true,
                Err(e) => {
                    warnings.push(format!(
                        "{field} pattern '{pattern}' is not a valid glob ({e}); ignoring it"
                    ));
                    false
                }
            });
        }
        if let Some(min) = self.rules.min_confidence {
            if !(0.0..=1.0).contains(&min) {
                warnings.push(format!("rules.min_confidence {min} is outside [0, 1]; ignoring it"));
                self.rules.min_confidence = None;
            }
        }

        warnings
    }

    fn resolve_rule_paths(&mut self, base: &Path) {
        for path in &mut self.rules.paths {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

/// Compiled include/exclude globs.
///
/// A pattern matches the path itself and everything below it. Patterns
/// without a `/` also match at any depth, so `vendor` skips every
/// `vendor/` directory and `*.min.js` every minified file.
#[derive(Debug, Clone)]
pub struct PathFilter {
    include: Option<GlobSet>,
    exclude: GlobSet,
}

impl PathFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Self {
        Self {
            include: (!include.is_empty()).then(|| build_glob_set(include)),
            exclude: build_glob_set(exclude),
        }
    }

    pub fn is_included(&self, relative: &str) -> bool {
        let relative = relative.trim_start_matches("./");
        let included = self.include.as_ref().is_none_or(|set| set.is_match(relative));
        included && !self.exclude.is_match(relative)
    }
}

impl Default for PathFilter {
    fn default() -> Self {
        Self::new(&[], &[])
    }
}

fn normalize_pattern(pattern: &str) -> &str {
    pattern.trim_start_matches("./").trim_end_matches('/')
}

/// Invalid globs are skipped; `Config::sanitize` has already reported them.
fn build_glob_set(patterns: &[String]) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let pattern = normalize_pattern(pattern);
        if pattern.is_empty() {
            continue;
        }
        let mut variants = vec![pattern.to_string(), format!("{pattern}/**")];
        if !pattern.contains('/') {
            variants.push(format!("**/{pattern}"));
            variants.push(format!("**/{pattern}/**"));
        }
        for variant in variants {
            if let Ok(glob) = Glob::new(&variant) {
                builder.add(glob);
            }
        }
    }
    builder.build().unwrap_or_else(|_| GlobSet::empty())
}

pub fn find_config_file(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir.to_path_buf();
    loop {
        let config_path = current.join(CONFIG_FILENAME);
        if config_path.exists() {
            return Some(config_path);
        }
        if !current.pop() {
            return None;
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    load_config_with_warnings(path).map(|result| result.config)
}

pub fn load_config_with_warnings(path: &Path) -> Result<ConfigResult, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        message: e.message().to_string(),
    })?;

    let mut warnings = detect_unknown_keys(&content);
    warnings.extend(config.sanitize());
    if let Some(base) = path.parent() {
        config.resolve_rule_paths(base);
    }

    Ok(ConfigResult { config, warnings })
}

fn detect_unknown_keys(content: &str) -> Vec<String> {
    let mut warnings = Vec::new();

    let table: toml::Table = match content.parse() {
        Ok(t) => t,
        Err(_) => return warnings,
    };

    check_table_keys(&table, KNOWN_TOP_LEVEL_KEYS, None, &mut warnings);

    if let Some(toml::Value::Table(rules)) = table.get("rules") {
        check_table_keys(rules, KNOWN_RULES_KEYS, Some("rules"), &mut warnings);
    }

    if let Some(toml::Value::Table(analysis)) = table.get("analysis") {
        check_table_keys(analysis, KNOWN_ANALYSIS_KEYS, Some("analysis"), &mut warnings);
        if let Some(toml::Value::Table(risk)) = analysis.get("risk") {
            check_table_keys(risk, KNOWN_RISK_KEYS, Some("analysis.risk"), &mut warnings);
        }
    }

    warnings
}

fn check_table_keys(
    table: &toml::Table,
    known: &[&str],
    section: Option<&str>,
    warnings: &mut Vec<String>,
) {
    let known: HashSet<&str> = known.iter().copied().collect();
    for key in table.keys() {
        if known.contains(key.as_str()) {
            continue;
        }
        match section {
            Some(section) => {
                warnings.push(format!("Unknown config option in [{}]: '{}'", section, key))
            }
            None => warnings.push(format!("Unknown config option: '{}'", key)),
        }
    }
}

pub fn load_config_or_default(start_dir: &Path) -> Config {
    find_config_file(start_dir)
        .and_then(|path| load_config(&path).ok())
        .unwrap_or_default()
}

/// Like [`load_config_or_default`], but a broken config file is reported
/// as a warning instead of being silently replaced by defaults.
pub fn load_config_or_default_with_warnings(start_dir: &Path) -> ConfigResult {
    match find_config_file(start_dir) {
        Some(path) => load_config_with_warnings(&path).unwrap_or_else(|e| ConfigResult {
            config: Config::default(),
            warnings: vec![e.to_string()],
        }),
        None => ConfigResult::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn create_temp_dir() -> tempfile::TempDir {
        tempfile::tempdir().expect("Failed to create temp dir")
    }

    #[test]
    fn load_config_from_file() {
        let dir = create_temp_dir();
        let config_path = dir.path().join(CONFIG_FILENAME);
        fs::write(
            &config_path,
            r#"
include = ["src"]
exclude = ["tests/fixtures"]

[rules]
disabled = ["weak-hash"]
min_confidence = 0.5
paths = ["rules/custom.yaml"]

[rules.severity]
debug-mode-enabled = "low"

[analysis]
legacy_confidence = 0.4
snippet_context = 1

[analysis.risk]
critical = 2
"#,
        )
        .unwrap();

        let config = load_config(&config_path).unwrap();

        assert_eq!(config.include, vec!["src"]);
        assert_eq!(config.exclude, vec!["tests/fixtures"]);
        assert_eq!(config.rules.disabled, vec!["weak-hash"]);
        assert_eq!(config.rules.min_confidence, Some(0.5));
        assert_eq!(config.rules.paths, vec![dir.path().join("rules/custom.yaml")]);
        assert_eq!(
            config.rules.severity.get("debug-mode-enabled"),
            Some(&Severity::Low)
        );
        assert_eq!(config.analysis.legacy_confidence, 0.4);
        assert_eq!(config.analysis.default_confidence, 0.8);
        assert_eq!(config.analysis.snippet_context, 1);
        assert_eq!(
            config.analysis.risk,
            RiskThresholds {
                critical: 2,
                high: 10,
                medium: 25
            }
        );
    }

    #[test]
    fn default_config_when_missing() {
        let dir = create_temp_dir();
        let config = load_config_or_default(dir.path());

        assert_eq!(config, Config::default());
        assert!(config.include.is_empty());
        assert!(config.rules.disabled.is_empty());
        assert!(config.analysis.optimizer_hints);
    }

    #[test]
    fn error_on_invalid_toml() {
        let dir = create_temp_dir();
        let config_path = dir.path().join(CONFIG_FILENAME);
        fs::write(&config_path, "this is not valid { toml }").unwrap();

        let result = load_config(&config_path);

        match result {
            Err(ConfigError::ParseError { path, message }) => {
                assert_eq!(path, config_path);
                assert!(!message.is_empty());
            }
            other => panic!("Expected ParseError, got {other:?}"),
        }
    }

    #[test]
    fn unknown_severity_is_a_parse_error() {
        let dir = create_temp_dir();
        let config_path = dir.path().join(CONFIG_FILENAME);
        fs::write(&config_path, "[rules.severity]\nsql-injection = \"fatal\"\n").unwrap();

        assert!(matches!(
            load_config(&config_path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn find_config_file_in_current_directory() {
        let dir = create_temp_dir();
        let config_path = dir.path().join(CONFIG_FILENAME);
        fs::write(&config_path, "").unwrap();

        let found = find_config_file(dir.path());

        assert_eq!(found, Some(config_path));
    }

    #[test]
    fn find_config_file_in_parent_directory() {
        let parent = create_temp_dir();
        let child = parent.path().join("subdir");
        fs::create_dir(&child).unwrap();
        let config_path = parent.path().join(CONFIG_FILENAME);
        fs::write(&config_path, "").unwrap();

        let found = find_config_file(&child);

        assert_eq!(found, Some(config_path));
    }

    #[test]
    fn empty_config_file_uses_defaults() {
        let dir = create_temp_dir();
        let config_path = dir.path().join(CONFIG_FILENAME);
        fs::write(&config_path, "").unwrap();

        let config = load_config(&config_path).unwrap();

        assert_eq!(config, Config::default());
    }

    #[test]
    fn warns_on_unknown_options_in_every_section() {
        let dir = create_temp_dir();
        let config_path = dir.path().join(CONFIG_FILENAME);
        fs::write(
            &config_path,
            r#"
unknown_option = true

[rules]
enabled = ["x"]

[analysis]
speed = "fast"

[analysis.risk]
extreme = 1
"#,
        )
        .unwrap();

        let result = load_config_with_warnings(&config_path).unwrap();

        assert_eq!(result.warnings.len(), 4, "{:?}", result.warnings);
        assert!(result.warnings[0].contains("unknown_option"));
        assert!(result.warnings[1].contains("[rules]"));
        assert!(result.warnings[2].contains("[analysis]"));
        assert!(result.warnings[3].contains("[analysis.risk]"));
    }

    #[test]
    fn unordered_risk_thresholds_fall_back_with_warning() {
        let dir = create_temp_dir();
        let config_path = dir.path().join(CONFIG_FILENAME);
        fs::write(&config_path, "[analysis.risk]\ncritical = 30\nhigh = 5\n").unwrap();

        let result = load_config_with_warnings(&config_path).unwrap();

        assert_eq!(result.config.analysis.risk, RiskThresholds::default());
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("critical <= high <= medium"));
    }

    #[test]
    fn out_of_range_confidence_falls_back_with_warning() {
        let dir = create_temp_dir();
        let config_path = dir.path().join(CONFIG_FILENAME);
        fs::write(
            &config_path,
            "[rules]\nmin_confidence = 2.0\n\n[analysis]\ndefault_confidence = -0.5\n",
        )
        .unwrap();

        let result = load_config_with_warnings(&config_path).unwrap();

        assert_eq!(result.config.analysis.default_confidence, 0.8);
        assert_eq!(result.config.rules.min_confidence, None);
        assert_eq!(result.warnings.len(), 2);
    }

    #[test]
    fn no_warnings_for_valid_config() {
        let dir = create_temp_dir();
        let config_path = dir.path().join(CONFIG_FILENAME);
        fs::write(
            &config_path,
            r#"
exclude = ["node_modules"]

[rules]
disabled = ["weak-hash"]

[analysis]
optimizer_hints = false
"#,
        )
        .unwrap();

        let result = load_config_with_warnings(&config_path).unwrap();

        assert!(result.warnings.is_empty());
        assert!(!result.config.analysis.optimizer_hints);
    }

    #[test]
    fn broken_config_is_reported_not_hidden() {
        let dir = create_temp_dir();
        fs::write(dir.path().join(CONFIG_FILENAME), "[rules\n").unwrap();

        let result = load_config_or_default_with_warnings(dir.path());

        assert_eq!(result.config, Config::default());
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("Invalid TOML"));
    }

    #[test]
    fn path_filters() {
        let config = Config {
            include: vec!["src/**".to_string()],
            exclude: vec!["vendor".to_string(), "src/generated".to_string()],
            ..Config::default()
        };

        assert!(config.is_path_included("src/app.py"));
        assert!(config.is_path_included("./src/api/routes.js"));
        assert!(!config.is_path_included("scripts/deploy.py"));
        assert!(!config.is_path_included("src/vendor/lib.js"));
        assert!(!config.is_path_included("src/generated/schema.py"));
        assert!(!config.is_path_included("srcfoo/app.py"));
    }

    #[test]
    fn path_filters_accept_globs() {
        let config = Config {
            include: vec!["src/**/*.py".to_string()],
            exclude: vec!["*.min.js".to_string()],
            ..Config::default()
        };
        let filter = config.path_filter();

        assert!(filter.is_included("src/a/b.py"));
        assert!(filter.is_included("src/app.py"));
        assert!(!filter.is_included("src/a/b.js"));
        assert!(!filter.is_included("lib/app.py"));

        let minified = PathFilter::new(&[], &config.exclude);
        assert!(!minified.is_included("dist/app.min.js"));
        assert!(!minified.is_included("app.min.js"));
        assert!(minified.is_included("dist/app.js"));
    }

    #[test]
    fn invalid_globs_are_dropped_with_warning() {
        let dir = create_temp_dir();
        let config_path = dir.path().join(CONFIG_FILENAME);
        fs::write(&config_path, "include = [\"src\"]\nexclude = [\"[unclosed\", \"vendor\"]\n").unwrap();

        let result = load_config_with_warnings(&config_path).unwrap();

        assert_eq!(result.config.exclude, vec!["vendor"]);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("exclude pattern '[unclosed'"));
        assert!(!result.config.is_path_included("src/vendor/lib.py"));
    }

    #[test]
    fn analysis_config_converts_to_options() {
        let config = AnalysisConfig {
            legacy_confidence: 0.5,
            ..AnalysisConfig::default()
        };

        let options = AnalyzerOptions::from(&config);

        assert_eq!(options.legacy_confidence, 0.5);
        assert_eq!(options.default_confidence, 0.8);
    }
}
