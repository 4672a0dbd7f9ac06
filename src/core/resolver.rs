// LogDeck - core/resolver.rs
//
// Effective-regex resolution. Precedence: a saved override for
// (source, logical path) always wins; otherwise the source's built-in
// default for the file's kind; otherwise an empty regex, which marks the
// file as needing a custom rule.
//
// Persistence and locking of overrides live in app::overrides; this module
// only decides.

use crate::core::model::{LogKind, RegexOverride, Resolution};
use crate::core::source::SourceType;
use crate::util::constants;
use crate::util::error::PatternError;
use regex::Regex;

/// Resolve the effective regex for one logical file.
pub fn resolve(
    source: SourceType,
    kind: LogKind,
    override_entry: Option<&RegexOverride>,
) -> Resolution {
    let default_regex = source.default_regex(kind).unwrap_or("").to_string();
    match override_entry {
        Some(o) => Resolution {
            regex: o.regex.clone(),
            is_override: true,
            default_regex,
            log_type: o.log_type,
        },
        None => Resolution {
            regex: default_regex.clone(),
            is_override: false,
            default_regex,
            log_type: kind,
        },
    }
}

/// Check that `pattern` is acceptable as an override and return it compiled.
///
/// Rejects over-long patterns and anything the regex compiler
/// refuses; the compiler diagnostic is preserved in the error.
pub fn validate_pattern(pattern: &str) -> Result<Regex, PatternError> {
    if pattern.len() > constants::MAX_REGEX_PATTERN_LENGTH {
        return Err(PatternError::PatternTooLong {
            length: pattern.len(),
            max_length: constants::MAX_REGEX_PATTERN_LENGTH,
        });
    }
    Regex::new(pattern).map_err(|source| PatternError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_override_wins() {
        let o = RegexOverride {
            regex: r"^(?P<message>.*)$".to_string(),
            log_type: LogKind::Custom,
            updated_at: Utc::now(),
        };
        let r = resolve(SourceType::Nginx, LogKind::Access, Some(&o));
        assert!(r.is_override);
        assert_eq!(r.regex, o.regex);
        assert_eq!(
            r.default_regex,
            crate::core::source::COMBINED_ACCESS_REGEX,
            "default is still reported alongside the override"
        );
    }

    #[test]
    fn test_default_when_no_override() {
        let r = resolve(SourceType::Apache, LogKind::Error, None);
        assert!(!r.is_override);
        assert_eq!(r.regex, crate::core::source::APACHE_ERROR_REGEX);
        assert!(!r.needs_configuration());
    }

    #[test]
    fn test_custom_kind_needs_configuration() {
        let r = resolve(SourceType::Nginx, LogKind::Custom, None);
        assert_eq!(r.regex, "");
        assert!(r.needs_configuration());
    }

    #[test]
    fn test_validate_pattern_unbalanced_paren() {
        let err = validate_pattern("(").unwrap_err();
        let msg = err.to_string().to_lowercase();
        assert!(msg.contains("paren"), "diagnostic should mention parenthesis: {msg}");
    }

    #[test]
    fn test_validate_pattern_too_long() {
        let long = "a".repeat(constants::MAX_REGEX_PATTERN_LENGTH + 1);
        assert!(matches!(
            validate_pattern(&long),
            Err(PatternError::PatternTooLong { .. })
        ));
    }
}
