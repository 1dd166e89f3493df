use std::collections::BTreeMap;
use std::sync::Arc;

use crate::traits::Identity;
use crate::value::PolicyValue;

// ---------------------------------------------------------------------------
// Context — the per-query bundle of resource, args and identity
// ---------------------------------------------------------------------------

/// Evaluation context assembled fresh for every query.
///
/// A closed structure rather than an open property bag: markers and
/// conditions read the resource, the caller-supplied inline args, the
/// identity, and named custom slots — nothing else. Custom marker sources
/// that need extra data receive it through [`Context::slots`].
#[derive(Clone, Default)]
pub struct Context {
    /// The object or value the query is about, when there is one. Statement
    /// conditions see it; param resolution does not.
    pub resource: Option<PolicyValue>,
    /// Alias the resource resolved to, so `${Alias.xpath}` markers can
    /// target it by name.
    pub resource_name: Option<String>,
    /// Caller-supplied inline arguments, read by `${ARGS.xpath}` markers.
    pub args: PolicyValue,
    /// Identity read by `${IDENTITY.xpath}` markers.
    pub identity: Option<Arc<dyn Identity>>,
    /// Extra named values for custom marker sources.
    pub slots: BTreeMap<String, PolicyValue>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            resource: None,
            resource_name: None,
            args: PolicyValue::Null,
            identity: None,
            slots: BTreeMap::new(),
        }
    }

    pub fn with_resource(mut self, resource: PolicyValue, name: impl Into<String>) -> Self {
        self.resource = Some(resource);
        self.resource_name = Some(name.into());
        self
    }

    pub fn with_args(mut self, args: PolicyValue) -> Self {
        self.args = args;
        self
    }

    pub fn with_identity(mut self, identity: Arc<dyn Identity>) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_slot(mut self, name: impl Into<String>, value: PolicyValue) -> Self {
        self.slots.insert(name.into(), value);
        self
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("resource", &self.resource)
            .field("resource_name", &self.resource_name)
            .field("args", &self.args)
            .field("identity", &self.identity.as_ref().map(|i| i.type_tag()))
            .field("slots", &self.slots)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::AnonymousIdentity;
    use serde_json::json;

    #[test]
    fn test_context_builder() {
        let ctx = Context::new()
            .with_resource(PolicyValue::from(&json!({"id": 1})), "Car")
            .with_args(PolicyValue::from(&json!({"limit": 10})))
            .with_identity(Arc::new(AnonymousIdentity))
            .with_slot("tenant", PolicyValue::from("acme"));

        assert_eq!(ctx.resource_name.as_deref(), Some("Car"));
        assert!(ctx.resource.is_some());
        assert_eq!(ctx.slots.get("tenant"), Some(&PolicyValue::from("acme")));
        assert_eq!(ctx.identity.unwrap().type_tag(), "anonymous");
    }

    #[test]
    fn test_default_context_is_empty() {
        let ctx = Context::new();
        assert!(ctx.resource.is_none());
        assert_eq!(ctx.args, PolicyValue::Null);
        assert!(ctx.identity.is_none());
    }
}
