use std::collections::BTreeMap;

use jsonpolicy_core::{Context, PolicyValue};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::condition::ConditionSet;
use crate::error::{PolicyError, PolicyResult};
use crate::expression::Expression;
use crate::marker::MarkerRegistry;
use crate::selector::Conditional;
use crate::typecast::TypecastRegistry;

// ---------------------------------------------------------------------------
// Compiler — policy documents to the indexed policy tree
// ---------------------------------------------------------------------------

/// One statement indexed under a `{resource}::{action}` key.
#[derive(Debug, Clone)]
pub struct StatementEntry {
    pub effect: String,
    pub condition: Option<ConditionSet>,
    pub enforce: bool,
}

/// One param indexed under its key. The value is resolved once at compile
/// time; only the condition is re-evaluated per query.
#[derive(Debug, Clone)]
pub struct ParamEntry {
    pub value: PolicyValue,
    pub condition: Option<ConditionSet>,
    pub enforce: bool,
}

impl Conditional for StatementEntry {
    fn condition(&self) -> Option<&ConditionSet> {
        self.condition.as_ref()
    }

    fn enforced(&self) -> bool {
        self.enforce
    }
}

impl Conditional for ParamEntry {
    fn condition(&self) -> Option<&ConditionSet> {
        self.condition.as_ref()
    }

    fn enforced(&self) -> bool {
        self.enforce
    }
}

/// The compiled, indexed form of all loaded policy documents.
///
/// Entries under one key keep document order, which is what gives the
/// selector its last-one-wins override semantics across documents.
#[derive(Debug, Clone, Default)]
pub struct PolicyTree {
    statements: BTreeMap<String, Vec<StatementEntry>>,
    params: BTreeMap<String, Vec<ParamEntry>>,
}

impl PolicyTree {
    /// All statements indexed under a key, or `None` when the key was never
    /// defined by any document. The distinction matters: a defined key with
    /// no applicable entry is still a definitive lookup stop.
    pub fn statements_for(&self, key: &str) -> Option<&[StatementEntry]> {
        self.statements.get(key).map(Vec::as_slice)
    }

    pub fn params_for(&self, key: &str) -> Option<&[ParamEntry]> {
        self.params.get(key).map(Vec::as_slice)
    }

    pub fn statement_count(&self) -> usize {
        self.statements.values().map(Vec::len).sum()
    }

    pub fn param_count(&self) -> usize {
        self.params.values().map(Vec::len).sum()
    }
}

/// Compile policy documents into the indexed tree.
///
/// Statement and param keys are expression-evaluated against the compile
/// context, so a single authored entry can fan out to several keys via the
/// map-to syntax. Any structurally malformed document fails the whole
/// compile; a half-loaded policy set is worse than no policy set.
pub fn compile(
    documents: &[JsonValue],
    ctx: &Context,
    markers: &MarkerRegistry,
    typecasts: &TypecastRegistry,
) -> PolicyResult<PolicyTree> {
    let mut tree = PolicyTree::default();

    for (index, document) in documents.iter().enumerate() {
        let document = match document {
            JsonValue::Object(map) => map,
            _ => {
                return Err(PolicyError::MalformedDocument {
                    index,
                    reason: "policy document must be a JSON object".to_string(),
                })
            }
        };

        for param in section(document, "Param", index)? {
            index_param(&param, &mut tree, index, ctx, markers, typecasts)?;
        }
        for statement in section(document, "Statement", index)? {
            index_statement(&statement, &mut tree, index, ctx, markers, typecasts)?;
        }
    }

    debug!(
        statements = tree.statement_count(),
        params = tree.param_count(),
        documents = documents.len(),
        "compiled policy tree"
    );

    Ok(tree)
}

// A section is either a single object or a list of objects; the shape is
// decided by whether element 0 exists and is an object.
fn section(
    document: &serde_json::Map<String, JsonValue>,
    name: &str,
    index: usize,
) -> PolicyResult<Vec<serde_json::Map<String, JsonValue>>> {
    let raw = match document.get(name) {
        Some(raw) => raw,
        None => return Ok(Vec::new()),
    };

    let malformed = || PolicyError::MalformedDocument {
        index,
        reason: format!("{name} must be an object or an array of objects"),
    };

    match raw {
        JsonValue::Object(single) => Ok(vec![single.clone()]),
        JsonValue::Array(items) => items
            .iter()
            .map(|item| match item {
                JsonValue::Object(map) => Ok(map.clone()),
                _ => Err(malformed()),
            })
            .collect(),
        _ => Err(malformed()),
    }
}

fn index_statement(
    statement: &serde_json::Map<String, JsonValue>,
    tree: &mut PolicyTree,
    index: usize,
    ctx: &Context,
    markers: &MarkerRegistry,
    typecasts: &TypecastRegistry,
) -> PolicyResult<()> {
    let effect = match statement.get("Effect").and_then(JsonValue::as_str) {
        Some(effect) => effect.to_string(),
        None => {
            return Err(PolicyError::MalformedDocument {
                index,
                reason: "Statement is missing a string Effect".to_string(),
            })
        }
    };

    // A statement without a resource cannot be addressed by any query
    let resources = match statement.get("Resource") {
        Some(JsonValue::Array(items)) => items.clone(),
        Some(single) => vec![single.clone()],
        None => return Ok(()),
    };

    let actions: Vec<String> = match statement.get("Action") {
        Some(JsonValue::Array(items)) => items
            .iter()
            .map(|a| a.as_str().unwrap_or_default().to_string())
            .collect(),
        Some(single) => vec![single.as_str().unwrap_or_default().to_string()],
        None => vec![String::new()],
    };

    let condition = parse_condition(statement, index)?;
    let enforce = is_enforced(statement);

    for resource in &resources {
        for id in expand_keys(resource, ctx, markers, typecasts)? {
            for action in &actions {
                let key = if action.is_empty() {
                    format!("{id}::*")
                } else {
                    format!("{id}::{action}")
                };
                tree.statements
                    .entry(key)
                    .or_default()
                    .push(StatementEntry {
                        effect: effect.clone(),
                        condition: condition.clone(),
                        enforce,
                    });
            }
        }
    }

    Ok(())
}

fn index_param(
    param: &serde_json::Map<String, JsonValue>,
    tree: &mut PolicyTree,
    index: usize,
    ctx: &Context,
    markers: &MarkerRegistry,
    typecasts: &TypecastRegistry,
) -> PolicyResult<()> {
    // A param without a key is unaddressable and silently dropped
    let key = match param.get("Key") {
        Some(key) if !key.is_null() => key,
        _ => return Ok(()),
    };

    let value = match param.get("Value") {
        Some(value) => Expression::parse(&PolicyValue::from(value))
            .resolve(ctx, markers, typecasts)?,
        None => PolicyValue::Null,
    };

    let condition = parse_condition(param, index)?;
    let enforce = is_enforced(param);

    for id in expand_keys(key, ctx, markers, typecasts)? {
        tree.params.entry(id).or_default().push(ParamEntry {
            value: value.clone(),
            condition: condition.clone(),
            enforce,
        });
    }

    Ok(())
}

// Evaluate a key expression and coerce the result to a list of key
// strings. Map-to expressions yield several keys from one entry.
fn expand_keys(
    raw: &JsonValue,
    ctx: &Context,
    markers: &MarkerRegistry,
    typecasts: &TypecastRegistry,
) -> PolicyResult<Vec<String>> {
    let resolved = Expression::parse(&PolicyValue::from(raw)).resolve(ctx, markers, typecasts)?;
    Ok(match resolved {
        PolicyValue::Array(items) => items.iter().map(PolicyValue::to_scalar_string).collect(),
        other => vec![other.to_scalar_string()],
    })
}

fn parse_condition(
    block: &serde_json::Map<String, JsonValue>,
    index: usize,
) -> PolicyResult<Option<ConditionSet>> {
    match block.get("Condition") {
        None => Ok(None),
        Some(raw @ JsonValue::Object(_)) => {
            let set = ConditionSet::parse(&PolicyValue::from(raw));
            Ok(if set.is_empty() { None } else { Some(set) })
        }
        Some(_) => Err(PolicyError::MalformedDocument {
            index,
            reason: "Condition must be a JSON object".to_string(),
        }),
    }
}

fn is_enforced(block: &serde_json::Map<String, JsonValue>) -> bool {
    block
        .get("Enforce")
        .and_then(JsonValue::as_bool)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compile_one(document: serde_json::Value) -> PolicyResult<PolicyTree> {
        compile(
            &[document],
            &Context::new(),
            &MarkerRegistry::new(),
            &TypecastRegistry::new(),
        )
    }

    #[test]
    fn test_single_statement_indexing() {
        let tree = compile_one(json!({
            "Statement": {
                "Effect": "allow",
                "Resource": "Article",
                "Action": "read"
            }
        }))
        .unwrap();

        let entries = tree.statements_for("Article::read").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].effect, "allow");
        assert!(!entries[0].enforce);
    }

    #[test]
    fn test_missing_action_indexes_wildcard() {
        let tree = compile_one(json!({
            "Statement": {"Effect": "deny", "Resource": "Article"}
        }))
        .unwrap();

        assert!(tree.statements_for("Article::*").is_some());
        assert!(tree.statements_for("Article::read").is_none());
    }

    #[test]
    fn test_resource_and_action_lists_fan_out() {
        let tree = compile_one(json!({
            "Statement": {
                "Effect": "allow",
                "Resource": ["Article", "Page"],
                "Action": ["read", "edit"]
            }
        }))
        .unwrap();

        for key in ["Article::read", "Article::edit", "Page::read", "Page::edit"] {
            assert!(tree.statements_for(key).is_some(), "missing {key}");
        }
        assert_eq!(tree.statement_count(), 4);
    }

    #[test]
    fn test_competing_statements_keep_document_order() {
        let tree = compile(
            &[
                json!({"Statement": {"Effect": "allow", "Resource": "A", "Action": "x"}}),
                json!({"Statement": {"Effect": "deny", "Resource": "A", "Action": "x"}}),
            ],
            &Context::new(),
            &MarkerRegistry::new(),
            &TypecastRegistry::new(),
        )
        .unwrap();

        let entries = tree.statements_for("A::x").unwrap();
        assert_eq!(entries[0].effect, "allow");
        assert_eq!(entries[1].effect, "deny");
    }

    #[test]
    fn test_resource_map_to_expansion_with_action() {
        let tree = compile_one(json!({
            "Statement": {
                "Effect": "allow",
                "Resource": "RecordId:%d => (*json)[1,2]",
                "Action": "delete"
            }
        }))
        .unwrap();

        assert!(tree.statements_for("RecordId:1::delete").is_some());
        assert!(tree.statements_for("RecordId:2::delete").is_some());
        assert_eq!(tree.statement_count(), 2);
    }

    #[test]
    fn test_param_key_map_to_expansion() {
        let tree = compile_one(json!({
            "Param": {
                "Key": "RecordId:%d => (*json)[1,2]",
                "Value": true
            }
        }))
        .unwrap();

        assert_eq!(tree.params_for("RecordId:1").unwrap()[0].value, PolicyValue::Bool(true));
        assert_eq!(tree.params_for("RecordId:2").unwrap()[0].value, PolicyValue::Bool(true));
        assert_eq!(tree.param_count(), 2);
    }

    #[test]
    fn test_param_value_resolved_eagerly() {
        let ctx = Context::new().with_args(PolicyValue::from(&json!({"env": "prod"})));
        let tree = compile(
            &[json!({"Param": {"Key": "deployment", "Value": "${ARGS.env}"}})],
            &ctx,
            &MarkerRegistry::new(),
            &TypecastRegistry::new(),
        )
        .unwrap();

        assert_eq!(
            tree.params_for("deployment").unwrap()[0].value,
            PolicyValue::String("prod".into())
        );
    }

    #[test]
    fn test_param_without_key_is_dropped() {
        let tree = compile_one(json!({"Param": {"Value": 1}})).unwrap();
        assert_eq!(tree.param_count(), 0);
    }

    #[test]
    fn test_statement_without_resource_is_dropped() {
        let tree = compile_one(json!({"Statement": {"Effect": "allow"}})).unwrap();
        assert_eq!(tree.statement_count(), 0);
    }

    #[test]
    fn test_missing_effect_is_malformed() {
        let err = compile_one(json!({"Statement": {"Resource": "A"}})).unwrap_err();
        assert!(matches!(err, PolicyError::MalformedDocument { index: 0, .. }));
    }

    #[test]
    fn test_malformed_section_reports_document_index() {
        let err = compile(
            &[
                json!({"Statement": {"Effect": "allow", "Resource": "A"}}),
                json!({"Statement": "nope"}),
            ],
            &Context::new(),
            &MarkerRegistry::new(),
            &TypecastRegistry::new(),
        )
        .unwrap_err();

        assert!(matches!(err, PolicyError::MalformedDocument { index: 1, .. }));
    }

    #[test]
    fn test_non_object_document_is_malformed() {
        let err = compile_one(json!([1, 2])).unwrap_err();
        assert!(matches!(err, PolicyError::MalformedDocument { index: 0, .. }));
    }

    #[test]
    fn test_enforce_flag_carried() {
        let tree = compile_one(json!({
            "Statement": {"Effect": "deny", "Resource": "A", "Action": "x", "Enforce": true}
        }))
        .unwrap();
        assert!(tree.statements_for("A::x").unwrap()[0].enforce);
    }
}
