use thiserror::Error;

/// Single error enum for all policy engine operations.
///
/// The split between errors and non-errors is deliberate: missing marker
/// data resolves to null, an unmatched decision key is the `Undetermined`
/// outcome, and an unknown condition type fails the evaluation closed —
/// none of those surface here. Errors are reserved for genuine
/// configuration and authoring mistakes.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A supplied policy document failed structural validation. The index
    /// is zero-based within the supplied document list.
    #[error("malformed policy document #{index}: {reason}")]
    MalformedDocument { index: usize, reason: String },

    /// A policy document supplied as text could not be decoded at all.
    #[error("policy document is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// A `(*type)` cast names a type with no built-in or registered handler.
    #[error("unknown typecast type '{0}'")]
    UnknownTypecast(String),

    /// A typecast handler was invoked but could not convert its input.
    #[error("typecast (*{type_name}) failed: {reason}")]
    Typecast { type_name: String, reason: String },

    /// A RegEx condition operand is not a valid regular expression.
    #[error("invalid regular expression '{pattern}': {reason}")]
    InvalidRegex { pattern: String, reason: String },
}

pub type PolicyResult<T> = Result<T, PolicyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_identifies_document() {
        let err = PolicyError::MalformedDocument {
            index: 2,
            reason: "Statement must be an object or array of objects".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("#2"));
        assert!(msg.contains("Statement"));
    }

    #[test]
    fn test_error_variants_display() {
        let errors = vec![
            PolicyError::MalformedDocument {
                index: 0,
                reason: "bad".into(),
            },
            PolicyError::UnknownTypecast("uuid".into()),
            PolicyError::Typecast {
                type_name: "json".into(),
                reason: "expected value".into(),
            },
            PolicyError::InvalidRegex {
                pattern: "(".into(),
                reason: "unclosed group".into(),
            },
        ];
        for err in errors {
            assert!(!err.to_string().is_empty());
        }
    }
}
