//! Environment variable helpers for `MODBRIDGE_*` overrides.
//!
//! ```
//! use modbridge_types::env_utils::{env_bool_or, env_string_or};
//!
//! let meta = env_string_or("MODBRIDGE_META_PATH", "/.modmeta");
//! let cache = env_bool_or("MODBRIDGE_CALL_CACHE", true);
//! ```

use std::str::FromStr;

/// Parse a variable, or `None` when unset or unparsable.
pub fn env_var<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

pub fn env_var_or<T: FromStr>(key: &str, default: T) -> T {
    env_var(key).unwrap_or(default)
}

/// "1", "true", "yes" and "on" are truthy; any other set value is false.
pub fn env_bool_or(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// String value, falling back to `default` when unset or blank.
pub fn env_string_or(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v,
        _ => default.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // each test uses its own variable names so they can run in parallel

    #[test]
    fn test_env_var_or() {
        std::env::set_var("MODBRIDGE_TEST_NUM", " 42 ");
        assert_eq!(env_var_or("MODBRIDGE_TEST_NUM", 7u64), 42);
        std::env::set_var("MODBRIDGE_TEST_NUM_BAD", "forty-two");
        assert_eq!(env_var_or("MODBRIDGE_TEST_NUM_BAD", 7u64), 7);
        assert_eq!(env_var::<u64>("MODBRIDGE_TEST_NUM_UNSET"), None);
    }

    #[test]
    fn test_env_bool_or() {
        std::env::set_var("MODBRIDGE_TEST_BOOL_ON", "Yes");
        assert!(env_bool_or("MODBRIDGE_TEST_BOOL_ON", false));
        std::env::set_var("MODBRIDGE_TEST_BOOL_OFF", "0");
        assert!(!env_bool_or("MODBRIDGE_TEST_BOOL_OFF", true));
        assert!(env_bool_or("MODBRIDGE_TEST_BOOL_UNSET", true));
    }

    #[test]
    fn test_env_string_or() {
        std::env::set_var("MODBRIDGE_TEST_STR_BLANK", "  ");
        assert_eq!(env_string_or("MODBRIDGE_TEST_STR_BLANK", "dflt"), "dflt");
        std::env::set_var("MODBRIDGE_TEST_STR", "/meta");
        assert_eq!(env_string_or("MODBRIDGE_TEST_STR", "dflt"), "/meta");
    }
}
