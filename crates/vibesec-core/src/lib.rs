//! VibeSec core: rule-driven security analysis of source files
//!
//! Rules carry plain regex and literal patterns, which the baseline detector
//! checks line by line, and structural EQL queries, which the enhanced
//! analyzer evaluates against an approximate syntax tree with pattern
//! matching and taint-flow analysis.

pub mod analyzer;
pub mod baseline;
pub mod config;
pub mod finding;
pub mod matcher;
pub mod query;
pub mod rules;
pub mod scanner;
pub mod syntax;
pub mod taint;
pub mod tree_builder;

pub use analyzer::{AnalysisOutcome, AnalyzerOptions, Capabilities, EnhancedAnalyzer};
pub use config::{Config, ConfigError, ConfigResult};
pub use finding::Finding;
pub use rules::{Rule, RuleLoadError, RuleSet, Severity};
pub use scanner::{ScanReport, Scanner};
pub use syntax::{NodeId, SyntaxNode, SyntaxTree};
pub use tree_builder::TreeBuilder;
