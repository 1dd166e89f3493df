use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use jsonpolicy_core::PolicyValue;
use regex::Regex;

use crate::error::{PolicyError, PolicyResult};

// ---------------------------------------------------------------------------
// Typecast engine — `(*type)` prefix detection and value conversion
// ---------------------------------------------------------------------------

/// Handler signature for caller-registered cast types.
pub type TypecastFn = dyn Fn(PolicyValue) -> PolicyResult<PolicyValue> + Send + Sync;

// Anchored at the start: only one cast prefix is honored per expression.
// Chained casts make no sense since every cast consumes the whole value.
static CAST_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\(\*([A-Za-z0-9_-]+)\)").unwrap());

/// Split a `(*type)rest` expression into its cast name and remainder.
pub fn split_cast_prefix(expression: &str) -> Option<(&str, &str)> {
    let caps = CAST_PREFIX_RE.captures(expression)?;
    let whole = caps.get(0)?;
    let name = caps.get(1)?;
    Some((name.as_str(), &expression[whole.end()..]))
}

/// Registry of cast handlers: the built-in table plus custom types.
#[derive(Default)]
pub struct TypecastRegistry {
    custom: HashMap<String, Box<TypecastFn>>,
}

impl TypecastRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        handler: Box<TypecastFn>,
    ) {
        self.custom.insert(name.into().to_lowercase(), handler);
    }

    /// Cast a value that may carry a `(*type)` prefix. Values without a
    /// prefix (and non-string values) pass through untouched.
    pub fn cast(&self, value: &PolicyValue) -> PolicyResult<PolicyValue> {
        if let PolicyValue::String(s) = value {
            if let Some((type_name, rest)) = split_cast_prefix(s) {
                return self.apply(type_name, PolicyValue::String(rest.to_string()));
            }
        }
        Ok(value.clone())
    }

    /// Apply a named cast to a value. Unknown names are an authoring bug
    /// and fail hard rather than passing data through unconverted.
    pub fn apply(&self, type_name: &str, value: PolicyValue) -> PolicyResult<PolicyValue> {
        let name = type_name.to_lowercase();
        match name.as_str() {
            "string" => Ok(PolicyValue::String(value.to_scalar_string())),
            "int" => Ok(PolicyValue::Int(to_int(&value))),
            "float" => Ok(PolicyValue::Float(to_float(&value))),
            "bool" | "boolean" => Ok(PolicyValue::Bool(to_bool(&value))),
            "array" => Ok(to_array(value)),
            "json" => to_json(value),
            "null" => Ok(to_null(value)),
            "ip" => to_ip(value),
            "date" => to_date(value),
            _ => match self.custom.get(&name) {
                Some(handler) => handler(value),
                None => Err(PolicyError::UnknownTypecast(type_name.to_string())),
            },
        }
    }
}

fn to_int(value: &PolicyValue) -> i64 {
    match value {
        PolicyValue::Int(i) => *i,
        PolicyValue::Float(f) => *f as i64,
        PolicyValue::Bool(b) => *b as i64,
        PolicyValue::String(s) => leading_number(s).map(|n| n as i64).unwrap_or(0),
        _ => 0,
    }
}

fn to_float(value: &PolicyValue) -> f64 {
    match value {
        PolicyValue::Int(i) => *i as f64,
        PolicyValue::Float(f) => *f,
        PolicyValue::Bool(b) => *b as i64 as f64,
        PolicyValue::String(s) => leading_number(s).unwrap_or(0.0),
        _ => 0.0,
    }
}

// Lenient numeric parse: take the longest numeric prefix, so "42nd" is 42
// and "oops" is none.
fn leading_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    let mut end = 0;
    for (i, ch) in trimmed.char_indices() {
        let valid = ch.is_ascii_digit()
            || ((ch == '-' || ch == '+') && i == 0)
            || (ch == '.' && !trimmed[..i].contains('.'));
        if valid {
            end = i + ch.len_utf8();
        } else {
            break;
        }
    }
    trimmed[..end].parse::<f64>().ok()
}

fn to_bool(value: &PolicyValue) -> bool {
    match value {
        PolicyValue::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => true,
            "false" | "0" | "no" | "off" | "" => false,
            _ => value.is_truthy(),
        },
        other => other.is_truthy(),
    }
}

fn to_array(value: PolicyValue) -> PolicyValue {
    match value {
        PolicyValue::Array(items) => PolicyValue::Array(items),
        PolicyValue::String(s) => match serde_json::from_str::<serde_json::Value>(&s) {
            Ok(parsed) => match PolicyValue::from(&parsed) {
                PolicyValue::Array(items) => PolicyValue::Array(items),
                other => PolicyValue::Array(vec![other]),
            },
            // Undecodable input degrades to a single-element list
            Err(_) => PolicyValue::Array(vec![PolicyValue::String(s)]),
        },
        other => PolicyValue::Array(vec![other]),
    }
}

fn to_json(value: PolicyValue) -> PolicyResult<PolicyValue> {
    match value {
        PolicyValue::String(s) => serde_json::from_str::<serde_json::Value>(&s)
            .map(|parsed| PolicyValue::from(&parsed))
            .map_err(|e| PolicyError::Typecast {
                type_name: "json".to_string(),
                reason: e.to_string(),
            }),
        other => Ok(other),
    }
}

fn to_null(value: PolicyValue) -> PolicyValue {
    match value {
        PolicyValue::String(s) if s.is_empty() => PolicyValue::Null,
        other => other,
    }
}

fn to_ip(value: PolicyValue) -> PolicyResult<PolicyValue> {
    match value {
        PolicyValue::Ip(ip) => Ok(PolicyValue::Ip(ip)),
        PolicyValue::String(s) => s
            .trim()
            .parse()
            .map(PolicyValue::Ip)
            .map_err(|_| PolicyError::Typecast {
                type_name: "ip".to_string(),
                reason: format!("'{s}' is not an IPv4 or IPv6 address"),
            }),
        other => Err(PolicyError::Typecast {
            type_name: "ip".to_string(),
            reason: format!("cannot convert {other:?} to an IP address"),
        }),
    }
}

fn to_date(value: PolicyValue) -> PolicyResult<PolicyValue> {
    match value {
        PolicyValue::Date(dt) => Ok(PolicyValue::Date(dt)),
        PolicyValue::String(s) => parse_date(s.trim())
            .map(PolicyValue::Date)
            .ok_or_else(|| PolicyError::Typecast {
                type_name: "date".to_string(),
                reason: format!("'{s}' is not a recognized date/time"),
            }),
        other => Err(PolicyError::Typecast {
            type_name: "date".to_string(),
            reason: format!("cannot convert {other:?} to a date"),
        }),
    }
}

fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TypecastRegistry {
        TypecastRegistry::new()
    }

    #[test]
    fn test_split_cast_prefix() {
        assert_eq!(split_cast_prefix("(*int)42"), Some(("int", "42")));
        assert_eq!(
            split_cast_prefix("(*json)[1,2]"),
            Some(("json", "[1,2]"))
        );
        assert_eq!(split_cast_prefix("no prefix"), None);
        // Prefix must be anchored at the start
        assert_eq!(split_cast_prefix("x(*int)42"), None);
    }

    #[test]
    fn test_cast_without_prefix_passes_through() {
        let value = PolicyValue::String("hello".into());
        assert_eq!(registry().cast(&value).unwrap(), value);
        assert_eq!(
            registry().cast(&PolicyValue::Int(5)).unwrap(),
            PolicyValue::Int(5)
        );
    }

    #[test]
    fn test_cast_int() {
        let r = registry();
        assert_eq!(
            r.cast(&PolicyValue::String("(*int)42".into())).unwrap(),
            PolicyValue::Int(42)
        );
        assert_eq!(
            r.cast(&PolicyValue::String("(*int)42nd".into())).unwrap(),
            PolicyValue::Int(42)
        );
        assert_eq!(
            r.cast(&PolicyValue::String("(*int)oops".into())).unwrap(),
            PolicyValue::Int(0)
        );
        assert_eq!(
            r.cast(&PolicyValue::String("(*int)-7".into())).unwrap(),
            PolicyValue::Int(-7)
        );
    }

    #[test]
    fn test_cast_float() {
        assert_eq!(
            registry()
                .cast(&PolicyValue::String("(*float)3.25".into()))
                .unwrap(),
            PolicyValue::Float(3.25)
        );
    }

    #[test]
    fn test_cast_bool_lenient() {
        let r = registry();
        for truthy in ["true", "1", "yes", "on", "TRUE", "Yes"] {
            assert_eq!(
                r.apply("bool", PolicyValue::String(truthy.into())).unwrap(),
                PolicyValue::Bool(true),
                "expected '{truthy}' to cast true"
            );
        }
        for falsy in ["false", "0", "no", "off", ""] {
            assert_eq!(
                r.apply("bool", PolicyValue::String(falsy.into())).unwrap(),
                PolicyValue::Bool(false),
                "expected '{falsy}' to cast false"
            );
        }
        // Unrecognized strings fall back to generic truthiness
        assert_eq!(
            r.apply("bool", PolicyValue::String("whatever".into()))
                .unwrap(),
            PolicyValue::Bool(true)
        );
    }

    #[test]
    fn test_cast_array_parses_json() {
        assert_eq!(
            registry()
                .cast(&PolicyValue::String("(*array)[1,2]".into()))
                .unwrap(),
            PolicyValue::Array(vec![PolicyValue::Int(1), PolicyValue::Int(2)])
        );
    }

    #[test]
    fn test_cast_array_wraps_undecodable_scalar() {
        assert_eq!(
            registry()
                .cast(&PolicyValue::String("(*array)plain".into()))
                .unwrap(),
            PolicyValue::Array(vec![PolicyValue::String("plain".into())])
        );
    }

    #[test]
    fn test_cast_json_strict() {
        let r = registry();
        assert_eq!(
            r.cast(&PolicyValue::String("(*json){\"a\":1}".into()))
                .unwrap()
                .to_json(),
            serde_json::json!({"a": 1})
        );
        let err = r
            .cast(&PolicyValue::String("(*json)not json".into()))
            .unwrap_err();
        assert!(matches!(err, PolicyError::Typecast { .. }));
    }

    #[test]
    fn test_cast_null() {
        let r = registry();
        assert_eq!(
            r.cast(&PolicyValue::String("(*null)".into())).unwrap(),
            PolicyValue::Null
        );
        assert_eq!(
            r.cast(&PolicyValue::String("(*null)x".into())).unwrap(),
            PolicyValue::String("x".into())
        );
    }

    #[test]
    fn test_cast_ip() {
        let r = registry();
        let v4 = r
            .cast(&PolicyValue::String("(*ip)192.168.1.1".into()))
            .unwrap();
        assert!(matches!(v4, PolicyValue::Ip(std::net::IpAddr::V4(_))));
        let v6 = r.cast(&PolicyValue::String("(*ip)::1".into())).unwrap();
        assert!(matches!(v6, PolicyValue::Ip(std::net::IpAddr::V6(_))));
        assert!(r
            .cast(&PolicyValue::String("(*ip)not-an-ip".into()))
            .is_err());
    }

    #[test]
    fn test_cast_date_formats() {
        let r = registry();
        for raw in [
            "(*date)2024-06-01T12:00:00Z",
            "(*date)2024-06-01 12:00:00",
            "(*date)2024-06-01",
        ] {
            let value = r.cast(&PolicyValue::String(raw.into())).unwrap();
            assert!(matches!(value, PolicyValue::Date(_)), "failed for {raw}");
        }
        assert!(r
            .cast(&PolicyValue::String("(*date)tomorrow-ish".into()))
            .is_err());
    }

    #[test]
    fn test_unknown_typecast_is_hard_error() {
        let err = registry()
            .cast(&PolicyValue::String("(*uuid)abc".into()))
            .unwrap_err();
        assert!(matches!(err, PolicyError::UnknownTypecast(name) if name == "uuid"));
    }

    #[test]
    fn test_custom_typecast() {
        let mut r = registry();
        r.register(
            "upper",
            Box::new(|v| Ok(PolicyValue::String(v.to_scalar_string().to_uppercase()))),
        );
        assert_eq!(
            r.cast(&PolicyValue::String("(*upper)abc".into())).unwrap(),
            PolicyValue::String("ABC".into())
        );
    }

    #[test]
    fn test_only_one_prefix_honored() {
        // The second "(*int)" is part of the payload, not a chained cast
        assert_eq!(
            registry()
                .cast(&PolicyValue::String("(*string)(*int)5".into()))
                .unwrap(),
            PolicyValue::String("(*int)5".into())
        );
    }
}
