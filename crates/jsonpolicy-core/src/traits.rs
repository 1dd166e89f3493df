use crate::value::PolicyValue;

// ---------------------------------------------------------------------------
// Identity — the caller-supplied identity at the engine boundary
// ---------------------------------------------------------------------------

/// The identity on whose behalf policies are evaluated.
///
/// The engine itself only reads identity data through `${IDENTITY.xpath}`
/// markers; the attached-policy-ID list and type tag exist for the outer
/// layer that decides which policy documents reach the compiler.
pub trait Identity: Send + Sync {
    /// IDs of policy documents explicitly attached to this identity.
    fn attached_policy_ids(&self) -> Vec<String> {
        Vec::new()
    }

    /// Type tag matched against a policy document's `Assignee` list.
    fn type_tag(&self) -> &str;

    /// Identity data visible to `${IDENTITY.xpath}` markers.
    fn to_value(&self) -> PolicyValue {
        PolicyValue::Null
    }
}

/// Default identity when the caller supplies none.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnonymousIdentity;

impl Identity for AnonymousIdentity {
    fn type_tag(&self) -> &str {
        "anonymous"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_identity_defaults() {
        let identity = AnonymousIdentity;
        assert_eq!(identity.type_tag(), "anonymous");
        assert!(identity.attached_policy_ids().is_empty());
        assert_eq!(identity.to_value(), PolicyValue::Null);
    }
}
