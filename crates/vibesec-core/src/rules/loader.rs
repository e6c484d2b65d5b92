//! Rule loading from YAML and TOML rule files
//!
//! Built-in rules are embedded at compile time. User rule files are layered
//! on top; a rule whose id already exists replaces the earlier one.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use super::{Rule, RulePatternKind};

const DEFAULT_RULES: &str = include_str!("default_rules.yaml");

#[derive(Debug, thiserror::Error)]
pub enum RuleLoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yml::Error),
    #[error("Invalid rule '{id}': {message}")]
    InvalidRule { id: String, message: String },
}

pub trait RuleLoader: Send + Sync {
    fn load_rules(&self) -> Result<Vec<Rule>, RuleLoadError>;
}

#[derive(Debug, Deserialize)]
struct RulesFile {
    #[serde(default)]
    rules: Vec<Rule>,
}

pub struct BuiltinRuleLoader;

impl BuiltinRuleLoader {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BuiltinRuleLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleLoader for BuiltinRuleLoader {
    fn load_rules(&self) -> Result<Vec<Rule>, RuleLoadError> {
        let rules = parse_yaml(DEFAULT_RULES)?;
        debug!(rule_count = rules.len(), "loaded built-in rules");
        Ok(rules)
    }
}

pub struct FileRuleLoader {
    path: PathBuf,
}

impl FileRuleLoader {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl RuleLoader for FileRuleLoader {
    fn load_rules(&self) -> Result<Vec<Rule>, RuleLoadError> {
        let content = std::fs::read_to_string(&self.path)?;
        let extension = self
            .path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        let rules = match extension.as_str() {
            "yaml" | "yml" => parse_yaml(&content)?,
            _ => parse_toml(&content)?,
        };
        debug!(file = %self.path.display(), rule_count = rules.len(), "loaded rule file");
        Ok(rules)
    }
}

pub fn parse_yaml(content: &str) -> Result<Vec<Rule>, RuleLoadError> {
    let file: RulesFile = serde_yml::from_str(content)?;
    Ok(file.rules)
}

pub fn parse_toml(content: &str) -> Result<Vec<Rule>, RuleLoadError> {
    let file: RulesFile = toml::from_str(content)?;
    Ok(file.rules)
}

pub fn validate_rule(rule: &Rule) -> Result<(), RuleLoadError> {
    let invalid = |message: String| RuleLoadError::InvalidRule {
        id: rule.id.clone(),
        message,
    };

    if rule.id.trim().is_empty() {
        return Err(invalid("rule id is empty".to_string()));
    }
    if rule.patterns.is_empty() {
        return Err(invalid("rule has no patterns".to_string()));
    }
    if let Some(confidence) = rule.confidence() {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(invalid(format!("confidence {confidence} is outside [0, 1]")));
        }
    }
    for pattern in &rule.patterns {
        if pattern.value.trim().is_empty() {
            return Err(invalid("pattern is empty".to_string()));
        }
        if pattern.kind == RulePatternKind::Regex {
            regex::Regex::new(&pattern.value)
                .map_err(|e| invalid(format!("invalid regex '{}': {}", pattern.value, e)))?;
        }
    }
    Ok(())
}

/// An ordered collection of rules with unique ids.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in rules followed by every file in `paths`. A file that fails to
    /// load, or a rule that fails validation, is skipped with a warning.
    pub fn load(paths: &[PathBuf]) -> (Self, Vec<String>) {
        let mut set = Self::new();
        let mut warnings = Vec::new();

        let mut loaders: Vec<(String, Box<dyn RuleLoader>)> =
            vec![("built-in rules".to_string(), Box::new(BuiltinRuleLoader::new()))];
        for path in paths {
            loaders.push((
                path.display().to_string(),
                Box::new(FileRuleLoader::new(path)),
            ));
        }

        for (origin, loader) in loaders {
            match loader.load_rules() {
                Ok(rules) => warnings.extend(set.extend(rules)),
                Err(e) => warnings.push(format!("skipping {origin}: {e}")),
            }
        }

        (set, warnings)
    }

    pub fn builtin() -> Result<Self, RuleLoadError> {
        let mut set = Self::new();
        for rule in BuiltinRuleLoader::new().load_rules()? {
            validate_rule(&rule)?;
            set.insert(rule);
        }
        Ok(set)
    }

    /// Adds valid rules and returns a warning per rejected one.
    pub fn extend(&mut self, rules: Vec<Rule>) -> Vec<String> {
        let mut warnings = Vec::new();
        for rule in rules {
            match validate_rule(&rule) {
                Ok(()) => self.insert(rule),
                Err(e) => warnings.push(format!("skipping rule: {e}")),
            }
        }
        warnings
    }

    pub fn insert(&mut self, rule: Rule) {
        match self.rules.iter_mut().find(|r| r.id == rule.id) {
            Some(existing) => *existing = rule,
            None => self.rules.push(rule),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    /// Enabled rules that apply to `language`.
    pub fn for_language<'a>(&'a self, language: Option<&'a str>) -> impl Iterator<Item = &'a Rule> {
        self.rules
            .iter()
            .filter(move |r| r.enabled && r.applies_to(language))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
