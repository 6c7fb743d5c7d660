//! SQL identifier checks.
//!
//! Table and column names accepted from callers (join columns, join tables,
//! column overrides) are spliced into generated SQL, so they are checked
//! against a conservative identifier grammar first.

use std::sync::OnceLock;

use regex::Regex;

fn identifier_regex() -> Option<&'static Regex> {
    static IDENT: OnceLock<Option<Regex>> = OnceLock::new();
    IDENT
        .get_or_init(|| match Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*$") {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!(error = %e, "identifier pattern failed to compile");
                None
            }
        })
        .as_ref()
}

/// Check that `name` is a plain, unquoted SQL identifier.
///
/// # Examples
///
/// ```
/// use sqlmapper_core::is_valid_identifier;
///
/// assert!(is_valid_identifier("order_line"));
/// assert!(!is_valid_identifier("orders.id"));
/// assert!(!is_valid_identifier("id; DROP TABLE x"));
/// ```
pub fn is_valid_identifier(name: &str) -> bool {
    identifier_regex().is_some_and(|re| re.is_match(name))
}

/// Keep only ASCII letters, digits and `_`.
///
/// For names that cannot be bound as parameters, such as the table in
/// `PRAGMA table_info(...)`.
///
/// ```
/// use sqlmapper_core::sanitize_identifier;
///
/// assert_eq!(sanitize_identifier("order_line"), "order_line");
/// assert_eq!(sanitize_identifier("orders;DROP TABLE--"), "ordersDROPTABLE");
/// ```
pub fn sanitize_identifier(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifiers() {
        assert!(is_valid_identifier("id"));
        assert!(is_valid_identifier("_hidden"));
        assert!(is_valid_identifier("Order2Line"));
        assert!(is_valid_identifier("emp$no"));
    }

    #[test]
    fn test_invalid_identifiers() {
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("2col"));
        assert!(!is_valid_identifier("a b"));
        assert!(!is_valid_identifier("schema.table"));
        assert!(!is_valid_identifier("name\""));
    }

    #[test]
    fn test_sanitize_strips_everything_else() {
        assert_eq!(sanitize_identifier("a\"b"), "ab");
        assert_eq!(sanitize_identifier(";;"), "");
    }
}
