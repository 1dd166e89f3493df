//! Shared foundation for the jsonpolicy engine.
//!
//! This crate holds everything both the policy compiler and the runtime
//! evaluator agree on:
//! - [`PolicyValue`] — the tagged union every policy expression resolves to
//! - xpath traversal over values (`a.b`, `a[b]`, `a["b"]` paths)
//! - the per-query evaluation [`Context`]
//! - the [`Identity`] collaborator trait at the engine boundary

pub mod context;
pub mod traits;
pub mod value;
pub mod xpath;

pub use context::Context;
pub use traits::{AnonymousIdentity, Identity};
pub use value::{type_name, PolicyValue};
pub use xpath::{normalize_xpath, resolve_xpath};
