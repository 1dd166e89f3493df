use crate::value::PolicyValue;

// ---------------------------------------------------------------------------
// Xpath — dotted/bracketed path traversal over PolicyValue
// ---------------------------------------------------------------------------

/// Normalize an xpath into its individual segments.
///
/// Accepts dotted segments and bracketed subscripts in any mix: `a.b`,
/// `a[b]`, `a["b"]`, `a['b']["c"].d`. Subscripts are rewritten to dot
/// segments before splitting, so `a[b].c` and `a.b.c` traverse identically.
pub fn normalize_xpath(xpath: &str) -> Vec<String> {
    let mut normalized = String::with_capacity(xpath.len());
    let mut chars = xpath.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '[' {
            let mut segment = String::new();
            for inner in chars.by_ref() {
                if inner == ']' {
                    break;
                }
                segment.push(inner);
            }
            let trimmed = segment.trim_matches(|c| c == '"' || c == '\'');
            normalized.push('.');
            normalized.push_str(trimmed);
        } else {
            normalized.push(ch);
        }
    }

    normalized
        .split('.')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Resolve an xpath against a value, segment by segment.
///
/// Traversal stops and yields `Null` the moment any segment is absent; a
/// missing path is an expected outcome, never an error. Numeric segments
/// index into arrays.
pub fn resolve_xpath(value: &PolicyValue, xpath: &str) -> PolicyValue {
    let mut current = value;

    for segment in normalize_xpath(xpath) {
        current = match current {
            PolicyValue::Object(map) => match map.get(&segment) {
                Some(next) => next,
                None => return PolicyValue::Null,
            },
            PolicyValue::Array(items) => match segment.parse::<usize>().ok().and_then(|i| items.get(i)) {
                Some(next) => next,
                None => return PolicyValue::Null,
            },
            _ => return PolicyValue::Null,
        };
    }

    current.clone()
}
