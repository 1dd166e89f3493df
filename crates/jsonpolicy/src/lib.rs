//! JSON Policy Engine
//!
//! Authorization decisions driven by plain JSON policy documents. Each
//! document carries statements (what an effect is for a resource/action
//! pair) and params (named values), both optionally guarded by conditions
//! over a small expression language: `${SOURCE.xpath}` markers, `(*type)`
//! casts and `LEFT => RIGHT` key expansion.
//!
//! Key properties:
//! - Tri-state decisions: affirmed, rejected, or undetermined when no
//!   statement addresses the query
//! - Last-applicable-wins selection with `Enforce` lockout, so later
//!   documents override earlier ones but enforced entries stay put
//! - Most-specific-key lookup with `::*` and `*::` wildcard fallback
//! - Strictly typed condition operands; unknown condition types deny
//! - Immutable after bootstrap, safe to share across threads
//!
//! ```
//! use jsonpolicy::{PolicyManager, PolicyValue, Settings};
//! use serde_json::json;
//!
//! let manager = PolicyManager::bootstrap(Settings::new().add_policy(json!({
//!     "Statement": {
//!         "Effect": "allow",
//!         "Resource": "Article",
//!         "Action": "read"
//!     }
//! })))?;
//!
//! let decision = manager.is_allowed_to(PolicyValue::from("Article"), "read")?;
//! assert!(decision.is_affirmed());
//! # Ok::<(), jsonpolicy::PolicyError>(())
//! ```

pub mod compiler;
pub mod condition;
pub mod error;
pub mod expression;
pub mod manager;
pub mod marker;
pub mod selector;
pub mod typecast;

// Re-export primary types for convenience
pub use compiler::{ParamEntry, PolicyTree, StatementEntry};
pub use condition::{ConditionEvaluator, ConditionFn, ConditionSet, OperandPair, Operator};
pub use error::{PolicyError, PolicyResult};
pub use expression::{Entity, Expression};
pub use manager::{Decision, PolicyManager, ResourceNamerFn, Settings};
pub use marker::{MarkerFn, MarkerRegistry};
pub use typecast::{TypecastFn, TypecastRegistry};

// The foundation crate's surface, re-exported so most callers only need
// one dependency.
pub use jsonpolicy_core::{
    normalize_xpath, resolve_xpath, AnonymousIdentity, Context, Identity, PolicyValue,
};
