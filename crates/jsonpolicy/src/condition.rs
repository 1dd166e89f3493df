use std::collections::HashMap;

use jsonpolicy_core::{Context, PolicyValue};
use regex::Regex;
use tracing::warn;

use crate::error::{PolicyError, PolicyResult};
use crate::expression::Expression;
use crate::marker::MarkerRegistry;
use crate::typecast::TypecastRegistry;

// ---------------------------------------------------------------------------
// Conditions — compiled condition blocks and their evaluation
// ---------------------------------------------------------------------------

/// Boolean combinator for condition groups and the condition block itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operator {
    #[default]
    And,
    Or,
    Xor,
}

impl Operator {
    fn parse(raw: &str) -> Self {
        match raw.to_uppercase().as_str() {
            "OR" => Operator::Or,
            "XOR" => Operator::Xor,
            _ => Operator::And,
        }
    }

    /// Fold the next result into an accumulator, treating `None` as "no
    /// result yet". Custom condition handlers combine their pairs with this.
    pub fn fold(self, acc: Option<bool>, next: bool) -> bool {
        match acc {
            None => next,
            Some(prev) => match self {
                Operator::And => prev && next,
                Operator::Or => prev || next,
                Operator::Xor => prev ^ next,
            },
        }
    }
}

/// One condition type's block: its combinator plus the left:right
/// expression pairs, compiled but unresolved.
#[derive(Debug, Clone)]
pub struct ConditionGroup {
    operator: Operator,
    pairs: Vec<(Expression, Expression)>,
}

/// A whole compiled `Condition` block. Groups are stored by condition type
/// name and evaluated in name order; the AND/OR/XOR folds are commutative,
/// so evaluation order never changes the outcome.
#[derive(Debug, Clone, Default)]
pub struct ConditionSet {
    operator: Operator,
    groups: Vec<(String, ConditionGroup)>,
}

impl ConditionSet {
    /// Compile a raw `Condition` value. The reserved `Operator` key is
    /// consumed at both levels and never treated as a condition type or an
    /// operand.
    pub fn parse(raw: &PolicyValue) -> Self {
        let map = match raw {
            PolicyValue::Object(map) => map,
            _ => return Self::default(),
        };

        let operator = map
            .get("Operator")
            .map(|v| Operator::parse(&v.to_scalar_string()))
            .unwrap_or_default();

        let mut groups = Vec::new();
        for (type_name, block) in map {
            if type_name == "Operator" {
                continue;
            }
            let pairs_map = match block {
                PolicyValue::Object(pairs) => pairs,
                _ => continue,
            };
            let group_operator = pairs_map
                .get("Operator")
                .map(|v| Operator::parse(&v.to_scalar_string()))
                .unwrap_or_default();
            let pairs = pairs_map
                .iter()
                .filter(|(left, _)| left.as_str() != "Operator")
                .map(|(left, right)| {
                    (
                        Expression::parse(&PolicyValue::String(left.clone())),
                        Expression::parse(right),
                    )
                })
                .collect();
            groups.push((
                type_name.clone(),
                ConditionGroup {
                    operator: group_operator,
                    pairs,
                },
            ));
        }

        Self { operator, groups }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// A fully resolved operand pair: one left value against the right-hand
/// candidate list. Scalar right operands become single-element lists so
/// every condition type sees the same any-of shape.
#[derive(Debug, Clone)]
pub struct OperandPair {
    pub left: PolicyValue,
    pub right: Vec<PolicyValue>,
}

/// Handler signature for caller-registered condition types.
pub type ConditionFn = dyn Fn(&[OperandPair], Operator) -> PolicyResult<bool> + Send + Sync;

/// Evaluates compiled condition sets against a query context.
#[derive(Default)]
pub struct ConditionEvaluator {
    custom: HashMap<String, Box<ConditionFn>>,
}

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, type_name: impl Into<String>, handler: Box<ConditionFn>) {
        self.custom.insert(type_name.into(), handler);
    }

    /// Evaluate a condition set. An empty set holds trivially; an unknown
    /// condition type fails the whole set closed.
    pub fn evaluate(
        &self,
        set: &ConditionSet,
        ctx: &Context,
        markers: &MarkerRegistry,
        typecasts: &TypecastRegistry,
    ) -> PolicyResult<bool> {
        let mut overall: Option<bool> = None;

        for (type_name, group) in &set.groups {
            let mut pairs = Vec::with_capacity(group.pairs.len());
            for (left, right) in &group.pairs {
                let left = left.resolve(ctx, markers, typecasts)?;
                let right = match right.resolve(ctx, markers, typecasts)? {
                    PolicyValue::Array(items) => items,
                    other => vec![other],
                };
                pairs.push(OperandPair { left, right });
            }
            if type_name == "Between" {
                for pair in &mut pairs {
                    wrap_flat_range(pair);
                }
            }

            let held = match builtin(type_name) {
                Some(check) => evaluate_pairs(&pairs, group.operator, check)?,
                None => match self.custom.get(type_name.as_str()) {
                    Some(handler) => handler(&pairs, group.operator)?,
                    None => {
                        warn!(condition = %type_name, "unknown condition type, denying");
                        return Ok(false);
                    }
                },
            };

            overall = Some(set.operator.fold(overall, held));
        }

        Ok(overall.unwrap_or(true))
    }
}

type PairCheck = fn(&PolicyValue, &PolicyValue) -> PolicyResult<bool>;

fn builtin(type_name: &str) -> Option<PairCheck> {
    Some(match type_name {
        "Equals" => |l, r| Ok(l == r),
        "NotEquals" => |l, r| Ok(l != r),
        "Greater" => |l, r| Ok(l.compare(r) == Some(std::cmp::Ordering::Greater)),
        "Less" => |l, r| Ok(l.compare(r) == Some(std::cmp::Ordering::Less)),
        "GreaterOrEquals" => |l, r| {
            Ok(matches!(
                l.compare(r),
                Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
            ))
        },
        "LessOrEquals" => |l, r| {
            Ok(matches!(
                l.compare(r),
                Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
            ))
        },
        "Between" => check_between,
        "In" => |l, r| Ok(check_in(l, r)),
        "NotIn" => |l, r| Ok(!check_in(l, r)),
        "Like" => |l, r| Ok(check_like(l, r)),
        "NotLike" => |l, r| Ok(!check_like(l, r)),
        "RegEx" => check_regex,
        _ => return None,
    })
}

// Each pair holds if ANY right-hand candidate satisfies the check; pair
// results combine under the group operator.
fn evaluate_pairs(
    pairs: &[OperandPair],
    operator: Operator,
    check: PairCheck,
) -> PolicyResult<bool> {
    let mut result: Option<bool> = None;
    for pair in pairs {
        let mut held = false;
        for candidate in &pair.right {
            if check(&pair.left, candidate)? {
                held = true;
                break;
            }
        }
        result = Some(operator.fold(result, held));
    }
    Ok(result.unwrap_or(true))
}

// A flat right operand like `[4, 10]` is one [min,max] range, not two
// candidates. Wrapping happens before dispatch so the checker always sees
// a list of ranges.
fn wrap_flat_range(pair: &mut OperandPair) {
    let flat = pair
        .right
        .first()
        .is_some_and(|v| !matches!(v, PolicyValue::Array(_)));
    if flat {
        pair.right = vec![PolicyValue::Array(std::mem::take(&mut pair.right))];
    }
}

// A range candidate is either a list (first element min, last element max)
// or a scalar standing for the degenerate range [v, v]. Both ends are
// inclusive.
fn check_between(left: &PolicyValue, candidate: &PolicyValue) -> PolicyResult<bool> {
    let (min, max) = match candidate {
        PolicyValue::Array(items) => match (items.first(), items.last()) {
            (Some(min), Some(max)) => (min, max),
            _ => return Ok(false),
        },
        scalar => (scalar, scalar),
    };
    let above = matches!(
        left.compare(min),
        Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
    );
    let below = matches!(
        left.compare(max),
        Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
    );
    Ok(above && below)
}

// List vs list is set equality, scalar vs list is membership, scalar vs
// scalar is plain equality.
fn check_in(left: &PolicyValue, candidate: &PolicyValue) -> bool {
    match (left, candidate) {
        (PolicyValue::Array(l), PolicyValue::Array(r)) => {
            l.len() == r.len() && l.iter().all(|item| r.contains(item))
        }
        (scalar, PolicyValue::Array(r)) => r.contains(scalar),
        (l, r) => l == r,
    }
}

// Glob-style match where `*` is the only wildcard. The pattern is anchored
// so "test*" does not match "contest".
fn check_like(left: &PolicyValue, candidate: &PolicyValue) -> bool {
    let pattern = regex::escape(&candidate.to_scalar_string()).replace(r"\*", ".*");
    match Regex::new(&format!("^{pattern}$")) {
        Ok(re) => re.is_match(&left.to_scalar_string()),
        Err(_) => false,
    }
}

fn check_regex(left: &PolicyValue, candidate: &PolicyValue) -> PolicyResult<bool> {
    let raw = candidate.to_scalar_string();
    // Accept both bare patterns and `/pattern/` delimited ones
    let pattern = if raw.len() >= 2 && raw.starts_with('/') && raw.ends_with('/') {
        &raw[1..raw.len() - 1]
    } else {
        raw.as_str()
    };
    let re = Regex::new(pattern).map_err(|e| PolicyError::InvalidRegex {
        pattern: raw.clone(),
        reason: e.to_string(),
    })?;
    Ok(re.is_match(&left.to_scalar_string()))
}
