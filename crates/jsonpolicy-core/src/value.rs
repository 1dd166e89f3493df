use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

// ---------------------------------------------------------------------------
// PolicyValue — the tagged union every policy expression resolves to
// ---------------------------------------------------------------------------

/// A single policy value.
///
/// Policy documents arrive as JSON, but evaluation also produces values JSON
/// cannot represent directly (parsed IP addresses, UTC date-times), so the
/// engine works on its own tagged union instead of `serde_json::Value`.
///
/// Equality is strict across types: `Int(5)` never equals `String("5")` and
/// never equals `Float(5.0)`. Ordering is numeric when both sides are
/// numeric, chronological for dates, and lexical otherwise — see
/// [`PolicyValue::compare`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PolicyValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<PolicyValue>),
    Object(BTreeMap<String, PolicyValue>),
    Ip(IpAddr),
    Date(DateTime<Utc>),
}

impl PolicyValue {
    /// True for values that substitute into strings without JSON encoding.
    pub fn is_scalar(&self) -> bool {
        !matches!(self, PolicyValue::Array(_) | PolicyValue::Object(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, PolicyValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PolicyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[PolicyValue]> {
        match self {
            PolicyValue::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PolicyValue::Int(i) => Some(*i as f64),
            PolicyValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Render the value the way marker substitution embeds it into a string:
    /// scalars print plainly, null becomes the empty string, arrays and
    /// objects are JSON-encoded.
    pub fn to_scalar_string(&self) -> String {
        match self {
            PolicyValue::Null => String::new(),
            PolicyValue::Bool(b) => b.to_string(),
            PolicyValue::Int(i) => i.to_string(),
            PolicyValue::Float(f) => f.to_string(),
            PolicyValue::String(s) => s.clone(),
            PolicyValue::Ip(ip) => ip.to_string(),
            PolicyValue::Date(dt) => dt.to_rfc3339(),
            PolicyValue::Array(_) | PolicyValue::Object(_) => {
                serde_json::to_string(&self.to_json()).unwrap_or_default()
            }
        }
    }

    /// Generic truthiness: null, false, zero, the empty string and the empty
    /// collection are falsy, everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            PolicyValue::Null => false,
            PolicyValue::Bool(b) => *b,
            PolicyValue::Int(i) => *i != 0,
            PolicyValue::Float(f) => *f != 0.0,
            PolicyValue::String(s) => !s.is_empty() && s != "0",
            PolicyValue::Array(items) => !items.is_empty(),
            PolicyValue::Object(map) => !map.is_empty(),
            PolicyValue::Ip(_) | PolicyValue::Date(_) => true,
        }
    }

    /// Ordinal comparison for Greater/Less/Between conditions.
    ///
    /// Numeric when both operands are numeric, chronological when both are
    /// dates, bytewise for IPs, lexical on the scalar renderings otherwise.
    /// Returns `None` when either side is a collection (collections have no
    /// ordinal position).
    pub fn compare(&self, other: &PolicyValue) -> Option<Ordering> {
        if !self.is_scalar() || !other.is_scalar() {
            return None;
        }
        if let (Some(a), Some(b)) = (self.as_f64(), other.as_f64()) {
            return a.partial_cmp(&b);
        }
        match (self, other) {
            (PolicyValue::Date(a), PolicyValue::Date(b)) => Some(a.cmp(b)),
            (PolicyValue::Ip(a), PolicyValue::Ip(b)) => Some(a.cmp(b)),
            _ => Some(self.to_scalar_string().cmp(&other.to_scalar_string())),
        }
    }

    /// Convert back into plain JSON. IPs and dates render as strings.
    pub fn to_json(&self) -> JsonValue {
        match self {
            PolicyValue::Null => JsonValue::Null,
            PolicyValue::Bool(b) => JsonValue::Bool(*b),
            PolicyValue::Int(i) => JsonValue::from(*i),
            PolicyValue::Float(f) => {
                serde_json::Number::from_f64(*f).map_or(JsonValue::Null, JsonValue::Number)
            }
            PolicyValue::String(s) => JsonValue::String(s.clone()),
            PolicyValue::Ip(ip) => JsonValue::String(ip.to_string()),
            PolicyValue::Date(dt) => JsonValue::String(dt.to_rfc3339()),
            PolicyValue::Array(items) => {
                JsonValue::Array(items.iter().map(PolicyValue::to_json).collect())
            }
            PolicyValue::Object(map) => JsonValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<&JsonValue> for PolicyValue {
    fn from(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => PolicyValue::Null,
            JsonValue::Bool(b) => PolicyValue::Bool(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    PolicyValue::Int(i)
                } else {
                    PolicyValue::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            JsonValue::String(s) => PolicyValue::String(s.clone()),
            JsonValue::Array(items) => {
                PolicyValue::Array(items.iter().map(PolicyValue::from).collect())
            }
            JsonValue::Object(map) => PolicyValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), PolicyValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<JsonValue> for PolicyValue {
    fn from(value: JsonValue) -> Self {
        PolicyValue::from(&value)
    }
}

impl From<&str> for PolicyValue {
    fn from(value: &str) -> Self {
        PolicyValue::String(value.to_string())
    }
}

impl From<String> for PolicyValue {
    fn from(value: String) -> Self {
        PolicyValue::String(value)
    }
}

impl From<i64> for PolicyValue {
    fn from(value: i64) -> Self {
        PolicyValue::Int(value)
    }
}

impl From<bool> for PolicyValue {
    fn from(value: bool) -> Self {
        PolicyValue::Bool(value)
    }
}

// Serializes through the JSON view, so IPs and dates come out as strings
// rather than enum-tagged structures.
impl serde::Serialize for PolicyValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for PolicyValue {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = JsonValue::deserialize(deserializer)?;
        Ok(PolicyValue::from(&raw))
    }
}

impl fmt::Display for PolicyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_scalar_string())
    }
}

/// Structural type name of a value, used as the resource alias fallback when
/// no naming resolver claims the resource.
pub fn type_name(value: &PolicyValue) -> &'static str {
    match value {
        PolicyValue::Null => "null",
        PolicyValue::Bool(_) => "boolean",
        PolicyValue::Int(_) => "integer",
        PolicyValue::Float(_) => "float",
        PolicyValue::String(_) => "string",
        PolicyValue::Array(_) => "array",
        PolicyValue::Object(_) => "object",
        PolicyValue::Ip(_) => "ip",
        PolicyValue::Date(_) => "date",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strict_equality_across_types() {
        assert_ne!(PolicyValue::Int(5), PolicyValue::String("5".to_string()));
        assert_ne!(PolicyValue::Int(5), PolicyValue::Float(5.0));
        assert_ne!(PolicyValue::Bool(true), PolicyValue::Int(1));
        assert_eq!(PolicyValue::Int(5), PolicyValue::Int(5));
        assert_eq!(
            PolicyValue::String("a".to_string()),
            PolicyValue::String("a".to_string())
        );
    }

    #[test]
    fn test_numeric_comparison() {
        let five = PolicyValue::Int(5);
        let five_point_five = PolicyValue::Float(5.5);
        assert_eq!(five.compare(&five_point_five), Some(Ordering::Less));
        assert_eq!(five_point_five.compare(&five), Some(Ordering::Greater));
        assert_eq!(five.compare(&PolicyValue::Int(5)), Some(Ordering::Equal));
    }

    #[test]
    fn test_lexical_comparison() {
        let a = PolicyValue::String("apple".to_string());
        let b = PolicyValue::String("banana".to_string());
        assert_eq!(a.compare(&b), Some(Ordering::Less));
    }

    #[test]
    fn test_collections_have_no_ordinal() {
        let arr = PolicyValue::Array(vec![PolicyValue::Int(1)]);
        assert_eq!(arr.compare(&PolicyValue::Int(1)), None);
    }

    #[test]
    fn test_from_json_number_kinds() {
        assert_eq!(PolicyValue::from(&json!(7)), PolicyValue::Int(7));
        assert_eq!(PolicyValue::from(&json!(7.5)), PolicyValue::Float(7.5));
    }

    #[test]
    fn test_json_roundtrip() {
        let raw = json!({"a": [1, "two", true, null], "b": {"c": 3.5}});
        let value = PolicyValue::from(&raw);
        assert_eq!(value.to_json(), raw);
    }

    #[test]
    fn test_scalar_string_rendering() {
        assert_eq!(PolicyValue::Null.to_scalar_string(), "");
        assert_eq!(PolicyValue::Bool(true).to_scalar_string(), "true");
        assert_eq!(PolicyValue::Int(42).to_scalar_string(), "42");
        assert_eq!(
            PolicyValue::Array(vec![PolicyValue::Int(1), PolicyValue::Int(2)])
                .to_scalar_string(),
            "[1,2]"
        );
    }

    #[test]
    fn test_serde_roundtrip() {
        let value = PolicyValue::from(&json!({"a": [1, "two", null], "b": 2.5}));
        let text = serde_json::to_string(&value).unwrap();
        let back: PolicyValue = serde_json::from_str(&text).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_truthiness() {
        assert!(!PolicyValue::Null.is_truthy());
        assert!(!PolicyValue::Bool(false).is_truthy());
        assert!(!PolicyValue::Int(0).is_truthy());
        assert!(!PolicyValue::String(String::new()).is_truthy());
        assert!(!PolicyValue::String("0".to_string()).is_truthy());
        assert!(PolicyValue::String("yes".to_string()).is_truthy());
        assert!(PolicyValue::Int(-1).is_truthy());
    }

    #[test]
    fn test_ip_ordering() {
        let low = PolicyValue::Ip("10.0.0.1".parse().unwrap());
        let high = PolicyValue::Ip("10.0.0.9".parse().unwrap());
        assert_eq!(low.compare(&high), Some(Ordering::Less));
    }

    #[test]
    fn test_type_name() {
        assert_eq!(type_name(&PolicyValue::Null), "null");
        assert_eq!(type_name(&PolicyValue::Object(BTreeMap::new())), "object");
        assert_eq!(type_name(&PolicyValue::Array(Vec::new())), "array");
    }
}
