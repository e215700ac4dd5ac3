//! Resource names: defaults derived from type names and checks on explicit ones

use crate::core::error::ConfigError;
use regex::Regex;
use std::sync::OnceLock;

/// Names taken by the REST exposure's own routes
pub const RESERVED_NAMES: &[&str] = &["health", "healthz"];

/// Utility for deriving and validating resource names
pub struct ResourceNaming;

impl ResourceNaming {
    /// Convert a Rust type name to lower-case, underscore-separated words
    ///
    /// # Examples
    ///
    /// ```
    /// use exposed::core::naming::ResourceNaming;
    ///
    /// assert_eq!(ResourceNaming::snake_case("Note"), "note");
    /// assert_eq!(ResourceNaming::snake_case("OrderLine"), "order_line");
    /// assert_eq!(ResourceNaming::snake_case("HTTPRequest"), "http_request");
    /// ```
    pub fn snake_case(type_name: &str) -> String {
        let chars: Vec<char> = type_name.chars().collect();
        let mut out = String::with_capacity(type_name.len() + 4);

        for (i, c) in chars.iter().enumerate() {
            if c.is_uppercase() && i > 0 {
                let prev = chars[i - 1];
                let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
                if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower) {
                    out.push('_');
                }
            }
            out.extend(c.to_lowercase());
        }

        out
    }

    /// Check a resource name, explicit or derived
    pub fn validate(component: &str, name: &str) -> Result<(), ConfigError> {
        static NAME_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = NAME_REGEX.get_or_init(|| Regex::new(r"^[a-z0-9_-]+$").unwrap());

        let invalid = |reason: &str| ConfigError::InvalidResourceName {
            component: component.to_string(),
            name: name.to_string(),
            reason: reason.to_string(),
        };

        if name.is_empty() {
            return Err(invalid("name is empty"));
        }
        if !regex.is_match(name) {
            return Err(invalid("only lower-case letters, digits, '_' and '-' are allowed"));
        }
        if RESERVED_NAMES.contains(&name) {
            return Err(invalid("name is reserved"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake_case() {
        assert_eq!(ResourceNaming::snake_case("Note"), "note");
        assert_eq!(ResourceNaming::snake_case("OrderLine"), "order_line");
        assert_eq!(ResourceNaming::snake_case("Note2"), "note2");
        assert_eq!(ResourceNaming::snake_case("V2Item"), "v2_item");
        assert_eq!(ResourceNaming::snake_case("URLAlias"), "url_alias");
        assert_eq!(ResourceNaming::snake_case("already_snake"), "already_snake");
    }

    #[test]
    fn test_validate_accepts_simple_names() {
        for name in ["note", "order_line", "order-lines", "v2"] {
            assert!(ResourceNaming::validate("app::Note", name).is_ok(), "{}", name);
        }
    }

    #[test]
    fn test_validate_rejects_bad_names() {
        for name in ["", "Note", "order line", "notes/1", "é", "health", "healthz"] {
            let err = ResourceNaming::validate("app::Note", name).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidResourceName { .. }), "{}", name);
        }
    }
}
