//! Semantic checks applied to a parsed query before it is executed

use regex::RegexBuilder;
use serde::Serialize;

use super::{LogicalOperator, NodeMatcher, PatternKind, Query, QueryExpression};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationOptions {
    /// The caller evaluates NOT against a closed node set (a single file's
    /// tree). Without it NOT is rejected outright.
    pub closed_world: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

pub fn validate(query: &Query) -> ValidationReport {
    validate_with(query, ValidationOptions::default())
}

pub fn validate_with(query: &Query, options: ValidationOptions) -> ValidationReport {
    let mut errors = Vec::new();
    check_expression(&query.expression, options, "query", &mut errors);
    ValidationReport {
        valid: errors.is_empty(),
        errors,
    }
}

fn check_expression(
    expression: &QueryExpression,
    options: ValidationOptions,
    path: &str,
    errors: &mut Vec<String>,
) {
    match expression {
        QueryExpression::Taint(taint) => {
            check_matcher(&taint.source, &format!("{path}.source"), errors);
            check_matcher(&taint.sink, &format!("{path}.sink"), errors);
            for (i, sanitizer) in taint.sanitizers.iter().enumerate() {
                check_matcher(sanitizer, &format!("{path}.sanitizer[{i}]"), errors);
            }
        }
        QueryExpression::Logical(logical) => {
            let count = logical.operands.len();
            match logical.operator {
                LogicalOperator::And | LogicalOperator::Or if count < 2 => errors.push(format!(
                    "{path}: {} requires at least 2 operands, found {count}",
                    logical.operator.as_str()
                )),
                LogicalOperator::Not if count != 1 => errors.push(format!(
                    "{path}: NOT requires exactly 1 operand, found {count}"
                )),
                LogicalOperator::Not if !options.closed_world => errors.push(format!(
                    "{path}: NOT needs a closed-world node set and cannot be evaluated here"
                )),
                _ => {}
            }

            for (i, operand) in logical.operands.iter().enumerate() {
                let operand_path = format!("{path}.{}[{i}]", logical.operator.as_str());
                check_expression(operand, options, &operand_path, errors);
            }
        }
        QueryExpression::Pattern(pattern) => {
            check_matcher(&pattern.matcher, &format!("{path}.pattern"), errors);
        }
    }
}

fn check_matcher(matcher: &NodeMatcher, path: &str, errors: &mut Vec<String>) {
    if matcher.node_kinds.is_empty() {
        errors.push(format!("{path}: at least one node kind is required"));
    }
    if matcher.node_kinds.iter().any(|kind| kind.trim().is_empty()) {
        errors.push(format!("{path}: node kinds must not be blank"));
    }
    if matcher.patterns.is_empty() {
        errors.push(format!("{path}: at least one pattern is required"));
    }

    for spec in &matcher.patterns {
        match spec.kind {
            PatternKind::Literal if spec.value.is_empty() => {
                errors.push(format!("{path}: literal patterns must not be empty"));
            }
            PatternKind::Regex => {
                let compiled = RegexBuilder::new(&spec.value)
                    .case_insensitive(!spec.case_sensitive)
                    .build();
                if let Err(e) = compiled {
                    errors.push(format!("{path}: invalid regex {spec}: {e}"));
                }
            }
            PatternKind::Literal => {}
        }
    }
}
