//! Taint analysis for tracking data flow
//!
//! Finds source-to-sink pairs in document order and drops a pair only when a
//! sanitizer node sits strictly between them. Flows never go backwards: the
//! sink must be on the same line as the source or after it.

pub mod sinks;

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use sinks::TaintSinkCategory;

use crate::matcher::CompiledMatcher;
use crate::query::NodeMatcher;
use crate::syntax::{NodeId, SyntaxNode, SyntaxTree};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maximum flow distance, in lines, for each risk level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RiskThresholds {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            critical: 3,
            high: 10,
            medium: 25,
        }
    }
}

impl RiskThresholds {
    pub fn is_monotonic(&self) -> bool {
        self.critical <= self.high && self.high <= self.medium
    }

    pub fn classify(&self, flow_distance: usize) -> RiskLevel {
        if flow_distance <= self.critical {
            RiskLevel::Critical
        } else if flow_distance <= self.high {
            RiskLevel::High
        } else if flow_distance <= self.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaintFlowResult {
    #[serde(skip)]
    pub source: NodeId,
    #[serde(skip)]
    pub sink: NodeId,
    pub path: Vec<String>,
    pub risk_level: RiskLevel,
    pub flow_distance: usize,
    pub sink_category: TaintSinkCategory,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TaintAnalyzer {
    thresholds: RiskThresholds,
}

impl TaintAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Falls back to the default thresholds when `thresholds` is not ordered,
    /// so that a shorter flow can never get a lower risk.
    pub fn with_thresholds(thresholds: RiskThresholds) -> Self {
        let thresholds = if thresholds.is_monotonic() {
            thresholds
        } else {
            RiskThresholds::default()
        };
        Self { thresholds }
    }

    pub fn thresholds(&self) -> RiskThresholds {
        self.thresholds
    }

    pub fn analyze_taint_flows(
        &self,
        sources: &[NodeMatcher],
        sinks: &[NodeMatcher],
        sanitizers: &[NodeMatcher],
        tree: &SyntaxTree,
    ) -> Vec<TaintFlowResult> {
        let source_nodes = collect(sources, tree);
        let sink_nodes = collect(sinks, tree);
        let mut sanitizer_positions: Vec<(usize, usize)> = collect(sanitizers, tree)
            .iter()
            .map(|n| n.position())
            .collect();
        sanitizer_positions.sort_unstable();

        let mut flows = Vec::new();
        for source in &source_nodes {
            for sink in &sink_nodes {
                if source.line > sink.line {
                    continue;
                }
                if is_sanitized(&sanitizer_positions, source.position(), sink.position()) {
                    continue;
                }
                flows.push(self.flow(source, sink));
            }
        }

        debug!(
            sources = source_nodes.len(),
            sinks = sink_nodes.len(),
            sanitizers = sanitizer_positions.len(),
            flows = flows.len(),
            "taint analysis finished"
        );
        flows
    }

    fn flow(&self, source: &SyntaxNode, sink: &SyntaxNode) -> TaintFlowResult {
        let flow_distance = sink.line - source.line;
        let sink_category = TaintSinkCategory::classify(sink);

        TaintFlowResult {
            source: source.id,
            sink: sink.id,
            path: vec![
                format!("source: {}", source.describe()),
                format!("sink: {}", sink.describe()),
            ],
            risk_level: self.thresholds.classify(flow_distance),
            flow_distance,
            sink_category,
            recommendations: sink_category.recommendations(),
        }
    }
}

fn collect<'t>(matchers: &[NodeMatcher], tree: &'t SyntaxTree) -> Vec<&'t SyntaxNode> {
    let compiled: Vec<CompiledMatcher<'_>> = matchers.iter().map(CompiledMatcher::compile).collect();
    tree.nodes()
        .filter(|node| compiled.iter().any(|m| m.matches(node)))
        .collect()
}

/// Whether a sanitizer lies strictly between the two positions.
/// `sanitizers` must be sorted.
fn is_sanitized(sanitizers: &[(usize, usize)], a: (usize, usize), b: (usize, usize)) -> bool {
    let (start, end) = if a <= b { (a, b) } else { (b, a) };
    let first_after_start = sanitizers.partition_point(|&pos| pos <= start);
    sanitizers
        .get(first_after_start)
        .is_some_and(|&pos| pos < end)
}
