use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::format::{Item, StrftimeItems};
use chrono::Utc;
use jsonpolicy_core::{resolve_xpath, Context, PolicyValue};
use regex::Regex;
use tracing::warn;

// ---------------------------------------------------------------------------
// Markers — `${SOURCE.xpath}` dynamic value resolution
// ---------------------------------------------------------------------------

/// Handler signature for caller-registered marker sources. Receives the
/// xpath portion after the source name and the query context.
pub type MarkerFn = dyn Fn(&str, &Context) -> PolicyValue + Send + Sync;

pub static MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").unwrap());

/// Registry of marker sources: the built-in table plus custom sources.
#[derive(Default)]
pub struct MarkerRegistry {
    custom: HashMap<String, Box<MarkerFn>>,
}

impl MarkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, source: impl Into<String>, handler: Box<MarkerFn>) {
        self.custom.insert(source.into(), handler);
    }

    /// Split a marker body into its source name and the trailing xpath.
    /// `USER.profile.id` yields `("USER", "profile.id")`; a bare source
    /// name yields an empty xpath.
    pub fn split_body(body: &str) -> (&str, &str) {
        match body.find(['.', '[']) {
            Some(pos) if body.as_bytes()[pos] == b'[' => (&body[..pos], &body[pos..]),
            Some(pos) => (&body[..pos], &body[pos + 1..]),
            None => (body, ""),
        }
    }

    /// Resolve one marker source to a value. Unknown sources and missing
    /// paths resolve to null; marker resolution never errors.
    pub fn get_value(&self, source: &str, xpath: &str, ctx: &Context) -> PolicyValue {
        match source {
            "DATETIME" => {
                let format = if xpath.is_empty() { "%Y-%m-%d" } else { xpath };
                format_utc_now(format)
            }
            "ENV" => match std::env::var(xpath) {
                Ok(v) => PolicyValue::String(v),
                Err(_) => PolicyValue::Null,
            },
            "ARGS" => resolve_xpath(&ctx.args, xpath),
            "IDENTITY" => match &ctx.identity {
                Some(identity) => resolve_xpath(&identity.to_value(), xpath),
                None => PolicyValue::Null,
            },
            _ => {
                if let Some(handler) = self.custom.get(source) {
                    return handler(xpath, ctx);
                }
                if let Some(slot) = ctx.slots.get(source) {
                    return resolve_xpath(slot, xpath);
                }
                // The resource answers both to its resolved alias and as
                // the fallback for any otherwise-unknown source.
                match &ctx.resource {
                    Some(resource) => resolve_xpath(resource, xpath),
                    None => PolicyValue::Null,
                }
            }
        }
    }

    /// Resolve a full `${SOURCE.xpath}` marker string to its value.
    pub fn resolve(&self, body: &str, ctx: &Context) -> PolicyValue {
        let (source, xpath) = Self::split_body(body);
        self.get_value(source, xpath, ctx)
    }
}

// chrono's DelayedFormat aborts on display when the format string is bad,
// so the items are validated first. An unusable format resolves to null
// like any other marker miss.
fn format_utc_now(format: &str) -> PolicyValue {
    let items: Vec<Item<'_>> = StrftimeItems::new(format).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        warn!(format = %format, "invalid DATETIME format string");
        return PolicyValue::Null;
    }
    PolicyValue::String(Utc::now().format_with_items(items.into_iter()).to_string())
}
