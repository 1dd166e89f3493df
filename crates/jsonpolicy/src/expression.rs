use std::sync::LazyLock;

use jsonpolicy_core::{Context, PolicyValue};
use regex::Regex;

use crate::error::PolicyResult;
use crate::marker::{MarkerRegistry, MARKER_RE};
use crate::typecast::{split_cast_prefix, TypecastRegistry};

// ---------------------------------------------------------------------------
// Expressions — the compiled form of policy-document values
// ---------------------------------------------------------------------------

// `LEFT map to RIGHT` / `LEFT => RIGHT`: LEFT is a sprintf-style format
// applied to every element RIGHT resolves to.
static MAP_TO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(.*)\s+(?:map to|=>)\s+(.*)$").unwrap());

/// One lexical piece of a string expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Verbatim text between markers.
    Literal(String),
    /// A `${SOURCE.xpath}` marker, split into its parts.
    Marker { source: String, xpath: String },
}

/// A single compiled expression: the token stream plus the cast and format
/// directives extracted from the raw text.
///
/// Compilation happens once per policy load; resolution against a context
/// happens per query and is where markers are actually read.
#[derive(Debug, Clone)]
pub struct Entity {
    raw: PolicyValue,
    tokens: Vec<Token>,
    format: Option<String>,
    typecast: Option<String>,
    is_embedded: bool,
}

impl Entity {
    /// Compile any policy-document value into an entity. Non-string values
    /// carry no markers and resolve to themselves.
    pub fn parse(raw: &PolicyValue) -> Self {
        let text = match raw {
            PolicyValue::String(s) => s.clone(),
            other => {
                return Self {
                    raw: other.clone(),
                    tokens: Vec::new(),
                    format: None,
                    typecast: None,
                    is_embedded: false,
                }
            }
        };

        let (format, operand) = match MAP_TO_RE.captures(&text) {
            Some(caps) => (
                Some(caps[1].trim().to_string()),
                caps[2].trim().to_string(),
            ),
            None => (None, text.clone()),
        };

        let (typecast, body) = match split_cast_prefix(&operand) {
            Some((name, rest)) => (Some(name.to_string()), rest.to_string()),
            None => (None, operand),
        };

        let tokens = tokenize(&body);
        // A marker is embedded when it shares the string with anything else;
        // embedded resolution is textual, standalone resolution is typed.
        let is_embedded = match tokens.as_slice() {
            [Token::Marker { .. }] => false,
            [Token::Literal(_)] => false,
            _ => true,
        };

        Self {
            raw: PolicyValue::String(text),
            tokens,
            format,
            typecast,
            is_embedded,
        }
    }

    /// The value as authored in the policy document.
    pub fn raw(&self) -> &PolicyValue {
        &self.raw
    }

    pub fn has_format(&self) -> bool {
        self.format.is_some()
    }

    /// Resolve the entity against a query context.
    ///
    /// A standalone marker keeps the native type of whatever it resolves
    /// to; embedded markers render into the surrounding string. The cast
    /// runs after substitution, the format expansion last.
    pub fn resolve(
        &self,
        ctx: &Context,
        markers: &MarkerRegistry,
        typecasts: &TypecastRegistry,
    ) -> PolicyResult<PolicyValue> {
        let mut value = if self.tokens.is_empty() {
            self.raw.clone()
        } else if !self.is_embedded {
            match &self.tokens[0] {
                Token::Literal(s) => PolicyValue::String(s.clone()),
                Token::Marker { source, xpath } => markers.get_value(source, xpath, ctx),
            }
        } else {
            let mut rendered = String::new();
            for token in &self.tokens {
                match token {
                    Token::Literal(s) => rendered.push_str(s),
                    Token::Marker { source, xpath } => rendered
                        .push_str(&markers.get_value(source, xpath, ctx).to_scalar_string()),
                }
            }
            PolicyValue::String(rendered)
        };

        if let Some(cast) = &self.typecast {
            value = typecasts.apply(cast, value)?;
        }

        if let Some(format) = &self.format {
            let items = match value {
                PolicyValue::Array(items) => items,
                other => vec![other],
            };
            value = PolicyValue::Array(
                items
                    .into_iter()
                    .map(|item| PolicyValue::String(apply_format(format, &item)))
                    .collect(),
            );
        }

        Ok(value)
    }
}

fn tokenize(body: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut cursor = 0;

    for caps in MARKER_RE.captures_iter(body) {
        let whole = match caps.get(0) {
            Some(m) => m,
            None => continue,
        };
        if whole.start() > cursor {
            tokens.push(Token::Literal(body[cursor..whole.start()].to_string()));
        }
        let (source, xpath) = MarkerRegistry::split_body(&caps[1]);
        tokens.push(Token::Marker {
            source: source.to_string(),
            xpath: xpath.to_string(),
        });
        cursor = whole.end();
    }

    if cursor < body.len() || tokens.is_empty() {
        tokens.push(Token::Literal(body[cursor..].to_string()));
    }

    tokens
}

// Minimal sprintf: exactly one %s or %d placeholder is supported, which is
// all the map-to syntax promises.
fn apply_format(format: &str, value: &PolicyValue) -> String {
    if let Some(pos) = format.find("%s") {
        let mut out = String::with_capacity(format.len());
        out.push_str(&format[..pos]);
        out.push_str(&value.to_scalar_string());
        out.push_str(&format[pos + 2..]);
        return out;
    }
    if let Some(pos) = format.find("%d") {
        let rendered = match value {
            PolicyValue::Int(i) => i.to_string(),
            PolicyValue::Float(f) => (*f as i64).to_string(),
            PolicyValue::Bool(b) => (*b as i64).to_string(),
            other => other
                .to_scalar_string()
                .parse::<f64>()
                .map(|f| (f as i64).to_string())
                .unwrap_or_else(|_| "0".to_string()),
        };
        let mut out = String::with_capacity(format.len());
        out.push_str(&format[..pos]);
        out.push_str(&rendered);
        out.push_str(&format[pos + 2..]);
        return out;
    }
    format.to_string()
}

/// A compiled policy-document value of any shape. Lists and maps are
/// compiled element-wise so markers work at any depth.
#[derive(Debug, Clone)]
pub enum Expression {
    Entity(Entity),
    List(Vec<Expression>),
    Map(Vec<(Entity, Expression)>),
}

impl Expression {
    pub fn parse(raw: &PolicyValue) -> Self {
        match raw {
            PolicyValue::Array(items) => {
                Expression::List(items.iter().map(Expression::parse).collect())
            }
            PolicyValue::Object(map) => Expression::Map(
                map.iter()
                    .map(|(key, value)| {
                        (
                            Entity::parse(&PolicyValue::String(key.clone())),
                            Expression::parse(value),
                        )
                    })
                    .collect(),
            ),
            other => Expression::Entity(Entity::parse(other)),
        }
    }

    pub fn resolve(
        &self,
        ctx: &Context,
        markers: &MarkerRegistry,
        typecasts: &TypecastRegistry,
    ) -> PolicyResult<PolicyValue> {
        match self {
            Expression::Entity(entity) => entity.resolve(ctx, markers, typecasts),
            Expression::List(items) => {
                let mut resolved = Vec::with_capacity(items.len());
                for item in items {
                    resolved.push(item.resolve(ctx, markers, typecasts)?);
                }
                Ok(PolicyValue::Array(resolved))
            }
            Expression::Map(entries) => {
                let mut map = std::collections::BTreeMap::new();
                for (key, value) in entries {
                    let key = key.resolve(ctx, markers, typecasts)?.to_scalar_string();
                    map.insert(key, value.resolve(ctx, markers, typecasts)?);
                }
                Ok(PolicyValue::Object(map))
            }
        }
    }
}
