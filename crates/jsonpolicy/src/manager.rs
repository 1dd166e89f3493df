use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use jsonpolicy_core::{type_name, AnonymousIdentity, Context, Identity, PolicyValue};
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use crate::compiler::{compile, PolicyTree};
use crate::condition::{ConditionEvaluator, ConditionFn};
use crate::error::PolicyResult;
use crate::marker::{MarkerFn, MarkerRegistry};
use crate::selector::select_candidate;
use crate::typecast::{TypecastFn, TypecastRegistry};

// ---------------------------------------------------------------------------
// Manager — bootstrap, decisions and params
// ---------------------------------------------------------------------------

/// Maps a resource to its policy alias. Receives the alias produced by the
/// previous namer in the chain, so namers can refine each other.
pub type ResourceNamerFn =
    dyn Fn(Option<String>, &PolicyValue) -> Option<String> + Send + Sync;

/// Everything the manager needs at bootstrap, assembled builder-style.
#[derive(Default)]
pub struct Settings {
    policies: Vec<JsonValue>,
    markers: MarkerRegistry,
    typecasts: TypecastRegistry,
    conditions: ConditionEvaluator,
    resource_namers: Vec<Box<ResourceNamerFn>>,
    effect_stems: HashMap<String, String>,
    identity: Option<Arc<dyn Identity>>,
    compile_args: PolicyValue,
    slots: BTreeMap<String, PolicyValue>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_policy(mut self, policy: JsonValue) -> Self {
        self.policies.push(policy);
        self
    }

    pub fn add_policies(mut self, policies: impl IntoIterator<Item = JsonValue>) -> Self {
        self.policies.extend(policies);
        self
    }

    /// Add a policy supplied as raw JSON text. Decoding happens here so an
    /// unreadable document is rejected before it can silently vanish.
    pub fn add_policy_text(mut self, text: &str) -> PolicyResult<Self> {
        self.policies.push(serde_json::from_str(text)?);
        Ok(self)
    }

    pub fn with_marker(mut self, source: impl Into<String>, handler: Box<MarkerFn>) -> Self {
        self.markers.register(source, handler);
        self
    }

    pub fn with_typecast(mut self, name: impl Into<String>, handler: Box<TypecastFn>) -> Self {
        self.typecasts.register(name, handler);
        self
    }

    pub fn with_condition(
        mut self,
        type_name: impl Into<String>,
        handler: Box<ConditionFn>,
    ) -> Self {
        self.conditions.register(type_name, handler);
        self
    }

    pub fn with_resource_namer(mut self, namer: Box<ResourceNamerFn>) -> Self {
        self.resource_namers.push(namer);
        self
    }

    /// Teach the decision layer an extra effect inflection, e.g.
    /// `"restricted"` stemming to `"restrict"`.
    pub fn with_effect_stem(
        mut self,
        inflected: impl Into<String>,
        stem: impl Into<String>,
    ) -> Self {
        self.effect_stems
            .insert(inflected.into().to_lowercase(), stem.into().to_lowercase());
        self
    }

    pub fn with_identity(mut self, identity: Arc<dyn Identity>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Args visible to markers during compilation, when param values and
    /// policy keys are resolved.
    pub fn with_compile_args(mut self, args: PolicyValue) -> Self {
        self.compile_args = args;
        self
    }

    pub fn with_slot(mut self, name: impl Into<String>, value: PolicyValue) -> Self {
        self.slots.insert(name.into(), value);
        self
    }
}

/// Outcome of a policy decision.
///
/// `Undetermined` means no statement addresses the query at all, which is
/// different from an addressed query whose effect disagrees. The caller
/// picks the default for the undetermined case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Affirmed,
    Rejected,
    Undetermined,
}

impl Decision {
    pub fn is_affirmed(&self) -> bool {
        matches!(self, Decision::Affirmed)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Decision::Rejected)
    }

    pub fn is_undetermined(&self) -> bool {
        matches!(self, Decision::Undetermined)
    }

    /// Collapse to a boolean, using `default` when undetermined.
    pub fn unwrap_or(&self, default: bool) -> bool {
        match self {
            Decision::Affirmed => true,
            Decision::Rejected => false,
            Decision::Undetermined => default,
        }
    }
}

/// The compiled policy engine. Immutable once bootstrapped; reloading
/// policies means bootstrapping a fresh manager and swapping the handle,
/// which is why every part of it is `Send + Sync`.
pub struct PolicyManager {
    tree: PolicyTree,
    markers: MarkerRegistry,
    typecasts: TypecastRegistry,
    conditions: ConditionEvaluator,
    resource_namers: Vec<Box<ResourceNamerFn>>,
    effect_stems: HashMap<String, String>,
    identity: Arc<dyn Identity>,
    slots: BTreeMap<String, PolicyValue>,
}

impl PolicyManager {
    /// Compile the supplied policies and assemble the manager. Fails on the
    /// first malformed document.
    pub fn bootstrap(settings: Settings) -> PolicyResult<Self> {
        let identity = settings
            .identity
            .unwrap_or_else(|| Arc::new(AnonymousIdentity));

        let mut compile_ctx = Context::new()
            .with_args(settings.compile_args)
            .with_identity(Arc::clone(&identity));
        compile_ctx.slots = settings.slots.clone();

        let tree = compile(
            &settings.policies,
            &compile_ctx,
            &settings.markers,
            &settings.typecasts,
        )?;

        info!(
            statements = tree.statement_count(),
            params = tree.param_count(),
            "policy manager bootstrapped"
        );

        Ok(Self {
            tree,
            markers: settings.markers,
            typecasts: settings.typecasts,
            conditions: settings.conditions,
            resource_namers: settings.resource_namers,
            effect_stems: settings.effect_stems,
            identity,
            slots: settings.slots,
        })
    }

    /// Decide whether `effect` is what the policies say about performing
    /// `action` on `resource`.
    ///
    /// The statement lookup tries the most specific key first and stops at
    /// the first key any document defines: `{alias}::{action}`, then
    /// `{alias}::*`, then `*::{action}`, then `*::*`. A defined key whose
    /// entries are all inapplicable is still a stop, and yields
    /// `Undetermined`.
    pub fn is(
        &self,
        resource: PolicyValue,
        effect: &str,
        action: Option<&str>,
        args: PolicyValue,
    ) -> PolicyResult<Decision> {
        let alias = self.resource_alias(&resource);
        let ctx = self.query_context(Some((resource, alias.clone())), args);

        let mut keys = Vec::with_capacity(4);
        match action {
            Some(action) => {
                keys.push(format!("{alias}::{action}"));
                keys.push(format!("{alias}::*"));
                keys.push(format!("*::{action}"));
            }
            None => keys.push(format!("{alias}::*")),
        }
        keys.push("*::*".to_string());

        let stem = self.stem_effect(effect);

        for key in &keys {
            let entries = match self.tree.statements_for(key) {
                Some(entries) => entries,
                None => continue,
            };
            let candidate = select_candidate(
                entries,
                &self.conditions,
                &ctx,
                &self.markers,
                &self.typecasts,
            )?;
            let decision = match candidate {
                Some(entry) if entry.effect.to_lowercase() == stem => Decision::Affirmed,
                Some(_) => Decision::Rejected,
                None => Decision::Undetermined,
            };
            debug!(key = %key, effect = %stem, ?decision, "policy decision");
            return Ok(decision);
        }

        debug!(alias = %alias, effect = %stem, "no statement addresses the query");
        Ok(Decision::Undetermined)
    }

    pub fn is_allowed(&self, resource: PolicyValue) -> PolicyResult<Decision> {
        self.is(resource, "allowed", None, PolicyValue::Null)
    }

    pub fn is_allowed_to(&self, resource: PolicyValue, action: &str) -> PolicyResult<Decision> {
        self.is(resource, "allowed", Some(action), PolicyValue::Null)
    }

    pub fn is_denied(&self, resource: PolicyValue) -> PolicyResult<Decision> {
        self.is(resource, "denied", None, PolicyValue::Null)
    }

    pub fn is_denied_to(&self, resource: PolicyValue, action: &str) -> PolicyResult<Decision> {
        self.is(resource, "denied", Some(action), PolicyValue::Null)
    }

    /// Fetch a param value. Params do not participate in wildcard lookup;
    /// the key must match exactly. `None` means no param with that key is
    /// applicable.
    pub fn get_param(&self, key: &str, args: PolicyValue) -> PolicyResult<Option<PolicyValue>> {
        let entries = match self.tree.params_for(key) {
            Some(entries) => entries,
            None => return Ok(None),
        };
        let ctx = self.query_context(None, args);
        let candidate = select_candidate(
            entries,
            &self.conditions,
            &ctx,
            &self.markers,
            &self.typecasts,
        )?;
        Ok(candidate.map(|entry| entry.value.clone()))
    }

    /// The compiled policy tree, for diagnostics and introspection.
    pub fn tree(&self) -> &PolicyTree {
        &self.tree
    }

    fn query_context(
        &self,
        resource: Option<(PolicyValue, String)>,
        args: PolicyValue,
    ) -> Context {
        let mut ctx = Context::new()
            .with_args(args)
            .with_identity(Arc::clone(&self.identity));
        if let Some((resource, alias)) = resource {
            ctx = ctx.with_resource(resource, alias);
        }
        ctx.slots = self.slots.clone();
        ctx
    }

    // Namers run in registration order, each seeing its predecessor's
    // answer. Strings name themselves; anything else falls back to its
    // type name.
    fn resource_alias(&self, resource: &PolicyValue) -> String {
        let named = self
            .resource_namers
            .iter()
            .fold(None, |acc, namer| namer(acc, resource));
        match named {
            Some(alias) => alias,
            None => match resource {
                PolicyValue::String(s) => s.clone(),
                other => type_name(other).to_string(),
            },
        }
    }

    fn stem_effect(&self, effect: &str) -> String {
        let lowered = effect.to_lowercase();
        match lowered.as_str() {
            "allowed" => "allow".to_string(),
            "denied" => "deny".to_string(),
            _ => self
                .effect_stems
                .get(&lowered)
                .cloned()
                .unwrap_or(lowered),
        }
    }
}

impl std::fmt::Debug for PolicyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyManager")
            .field("statements", &self.tree.statement_count())
            .field("params", &self.tree.param_count())
            .field("identity", &self.identity.type_tag())
            .finish()
    }
}
