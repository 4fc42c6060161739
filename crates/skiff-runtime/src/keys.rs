//! State key rewriting for store isolation.
//!
//! Logical keys are scoped to a prefix before driver I/O; responses are
//! projected back to logical keys before surfacing. The mapping is pure.

use thiserror::Error;

use skiff_components::KeyPrefix;

/// Separator between the scope prefix and the logical key.
pub const KEY_SEPARATOR: &str = "||";

/// Rejected logical keys.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("state key cannot be empty")]
    Empty,

    #[error("state key {0} contains the reserved separator \"||\"")]
    ReservedSeparator(String),
}

/// Scopes a logical key for driver I/O.
pub fn rewrite(
    key: &str,
    store_name: &str,
    app_id: &str,
    strategy: KeyPrefix,
) -> Result<String, KeyError> {
    if key.is_empty() {
        return Err(KeyError::Empty);
    }
    if key.contains(KEY_SEPARATOR) {
        return Err(KeyError::ReservedSeparator(key.to_string()));
    }

    Ok(match strategy {
        KeyPrefix::AppId if !app_id.is_empty() => format!("{app_id}{KEY_SEPARATOR}{key}"),
        KeyPrefix::StoreName => format!("{store_name}{KEY_SEPARATOR}{key}"),
        _ => key.to_string(),
    })
}

/// Projects a driver key back to the logical key the caller submitted.
#[must_use]
pub fn reverse(key: &str) -> String {
    match key.split_once(KEY_SEPARATOR) {
        Some((_, logical)) => logical.to_string(),
        None => key.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_id_scoping_roundtrip() {
        let physical = rewrite("order-1", "kv", "checkout", KeyPrefix::AppId).unwrap();
        assert_eq!(physical, "checkout||order-1");
        assert_eq!(reverse(&physical), "order-1");
    }

    #[test]
    fn store_name_scoping() {
        let physical = rewrite("order-1", "kv", "checkout", KeyPrefix::StoreName).unwrap();
        assert_eq!(physical, "kv||order-1");
    }

    #[test]
    fn no_scoping_passes_through() {
        let physical = rewrite("order-1", "kv", "checkout", KeyPrefix::None).unwrap();
        assert_eq!(physical, "order-1");
        assert_eq!(reverse("order-1"), "order-1");
    }

    #[test]
    fn empty_app_id_disables_prefixing() {
        let physical = rewrite("order-1", "kv", "", KeyPrefix::AppId).unwrap();
        assert_eq!(physical, "order-1");
    }

    #[test]
    fn invalid_keys_are_rejected() {
        assert_eq!(
            rewrite("", "kv", "app", KeyPrefix::AppId),
            Err(KeyError::Empty)
        );
        assert!(matches!(
            rewrite("a||b", "kv", "app", KeyPrefix::AppId),
            Err(KeyError::ReservedSeparator(_))
        ));
    }
}
