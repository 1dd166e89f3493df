use jsonpolicy_core::Context;

use crate::condition::{ConditionEvaluator, ConditionSet};
use crate::error::PolicyResult;
use crate::marker::MarkerRegistry;
use crate::typecast::TypecastRegistry;

// ---------------------------------------------------------------------------
// Candidate selection — last-applicable-wins with enforcement lockout
// ---------------------------------------------------------------------------

/// An indexed entry that competes for selection under one key.
pub trait Conditional {
    fn condition(&self) -> Option<&ConditionSet>;
    fn enforced(&self) -> bool;
}

/// Pick the winning entry among all entries indexed under one key.
///
/// Entries are visited in document order and the last applicable one wins,
/// so later policy documents override earlier ones. Once an applicable
/// enforced entry is seen, only enforced entries can still displace it;
/// among those, again the last applicable wins.
pub fn select_candidate<'a, T: Conditional>(
    entries: &'a [T],
    evaluator: &ConditionEvaluator,
    ctx: &Context,
    markers: &MarkerRegistry,
    typecasts: &TypecastRegistry,
) -> PolicyResult<Option<&'a T>> {
    let mut selected = None;
    let mut locked = false;

    for entry in entries {
        if locked && !entry.enforced() {
            continue;
        }
        let applicable = match entry.condition() {
            Some(set) => evaluator.evaluate(set, ctx, markers, typecasts)?,
            None => true,
        };
        if applicable {
            selected = Some(entry);
            if entry.enforced() {
                locked = true;
            }
        }
    }

    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonpolicy_core::PolicyValue;
    use serde_json::json;

    struct Entry {
        label: &'static str,
        condition: Option<ConditionSet>,
        enforce: bool,
    }

    impl Conditional for Entry {
        fn condition(&self) -> Option<&ConditionSet> {
            self.condition.as_ref()
        }

        fn enforced(&self) -> bool {
            self.enforce
        }
    }

    fn entry(label: &'static str, enforce: bool) -> Entry {
        Entry {
            label,
            condition: None,
            enforce,
        }
    }

    fn conditional(label: &'static str, condition: serde_json::Value) -> Entry {
        Entry {
            label,
            condition: Some(ConditionSet::parse(&PolicyValue::from(&condition))),
            enforce: false,
        }
    }

    fn pick<'a>(entries: &'a [Entry], args: serde_json::Value) -> Option<&'a Entry> {
        let ctx = Context::new().with_args(PolicyValue::from(&args));
        select_candidate(
            entries,
            &ConditionEvaluator::new(),
            &ctx,
            &MarkerRegistry::new(),
            &TypecastRegistry::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_last_applicable_wins() {
        let entries = [entry("a", false), entry("b", false), entry("c", false)];
        assert_eq!(pick(&entries, json!({})).map(|e| e.label), Some("c"));
    }

    #[test]
    fn test_enforced_locks_out_later_plain_entries() {
        let entries = [entry("a", false), entry("b", true), entry("c", false)];
        assert_eq!(pick(&entries, json!({})).map(|e| e.label), Some("b"));
    }

    #[test]
    fn test_enforced_first_still_wins() {
        let entries = [entry("a", true), entry("b", false)];
        assert_eq!(pick(&entries, json!({})).map(|e| e.label), Some("a"));
    }

    #[test]
    fn test_last_enforced_wins_among_enforced() {
        let entries = [entry("a", true), entry("b", true)];
        assert_eq!(pick(&entries, json!({})).map(|e| e.label), Some("b"));
    }

    #[test]
    fn test_inapplicable_entries_are_skipped() {
        let entries = [
            entry("a", false),
            conditional("b", json!({"Equals": {"${ARGS.flag}": true}})),
        ];
        assert_eq!(pick(&entries, json!({"flag": false})).map(|e| e.label), Some("a"));
        assert_eq!(pick(&entries, json!({"flag": true})).map(|e| e.label), Some("b"));
    }

    #[test]
    fn test_no_applicable_entry_yields_none() {
        let entries = [conditional("a", json!({"Equals": {"${ARGS.flag}": true}}))];
        assert!(pick(&entries, json!({"flag": false})).is_none());
    }
}
