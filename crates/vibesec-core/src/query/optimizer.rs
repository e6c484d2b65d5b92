//! Execution hints attached to query metadata
//!
//! The hints describe how a query could be executed faster. No execution
//! path reads them yet; they are recorded so that an indexed or batching
//! executor can pick them up without changing the query format.

use std::collections::BTreeSet;

use serde_json::Value;

use super::{LogicalOperator, Query, QueryExpression};

pub const HINT_USE_INDEXING: &str = "useIndexing";
pub const HINT_PREFER_EARLY_EXIT: &str = "preferEarlyExit";
pub const HINT_BATCH_SIMILAR_PATTERNS: &str = "batchSimilarPatterns";

const INDEXING_PATTERN_THRESHOLD: usize = 4;

pub fn optimize(mut query: Query) -> Query {
    let pattern_count = count_patterns(&query.expression);
    let use_indexing = pattern_count >= INDEXING_PATTERN_THRESHOLD;
    let prefer_early_exit = matches!(
        &query.expression,
        QueryExpression::Logical(l) if l.operator == LogicalOperator::And
    );
    let batch_similar = has_similar_operands(&query.expression);

    query
        .metadata
        .insert(HINT_USE_INDEXING.to_string(), Value::Bool(use_indexing));
    query
        .metadata
        .insert(HINT_PREFER_EARLY_EXIT.to_string(), Value::Bool(prefer_early_exit));
    query
        .metadata
        .insert(HINT_BATCH_SIMILAR_PATTERNS.to_string(), Value::Bool(batch_similar));
    query
}

fn count_patterns(expression: &QueryExpression) -> usize {
    match expression {
        QueryExpression::Taint(taint) => {
            taint.source.patterns.len()
                + taint.sink.patterns.len()
                + taint.sanitizers.iter().map(|s| s.patterns.len()).sum::<usize>()
        }
        QueryExpression::Logical(logical) => logical.operands.iter().map(count_patterns).sum(),
        QueryExpression::Pattern(pattern) => pattern.matcher.patterns.len(),
    }
}

/// True when at least two direct pattern operands share a node kind.
fn has_similar_operands(expression: &QueryExpression) -> bool {
    let QueryExpression::Logical(logical) = expression else {
        return false;
    };

    let mut seen = BTreeSet::new();
    for operand in &logical.operands {
        if let QueryExpression::Pattern(pattern) = operand {
            for kind in &pattern.matcher.node_kinds {
                if !seen.insert(kind.as_str()) {
                    return true;
                }
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parse_query;

    fn hint(query: &Query, key: &str) -> bool {
        query.metadata.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    #[test]
    fn and_prefers_early_exit() {
        let query = optimize(parse_query("AND({A: a}, {B: b})").unwrap());

        assert!(hint(&query, HINT_PREFER_EARLY_EXIT));
        assert!(!hint(&query, HINT_BATCH_SIMILAR_PATTERNS));
    }

    #[test]
    fn operands_sharing_a_kind_are_batched() {
        let query = optimize(parse_query("OR({Call: a}, {Call|Member: b})").unwrap());

        assert!(hint(&query, HINT_BATCH_SIMILAR_PATTERNS));
        assert!(!hint(&query, HINT_PREFER_EARLY_EXIT));
    }

    #[test]
    fn many_patterns_suggest_indexing() {
        let query = optimize(parse_query("{Call: [a, b, c, d]}").unwrap());

        assert!(hint(&query, HINT_USE_INDEXING));
    }

    #[test]
    fn optimize_does_not_touch_the_expression() {
        let original = parse_query("TAINT { SOURCE: {A: a}, SINK: {B: b} }").unwrap();

        let optimized = optimize(original.clone());

        assert_eq!(optimized.expression, original.expression);
        assert_eq!(optimized.metadata.len(), 3);
    }
}
