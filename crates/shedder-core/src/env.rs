//! Environment variable helpers used by the configuration loaders
//!
//! ```ignore
//! use shedder_core::env::{env_get, env_get_bool};
//!
//! let threshold: i64 = env_get("SHED_CPU_THRESHOLD", 80);
//! let enabled = env_get_bool("SHED_ENABLED", false);
//! ```

use std::str::FromStr;

/// Get an environment variable parsed as `T`, or `default` when unset
/// or unparsable. Surrounding whitespace is ignored.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Get an environment variable as a boolean.
///
/// "1", "true", "yes", "on" (any case) are true; any other set value is
/// false. Unset returns `default`.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// `Some(T)` if the variable is set and parses, `None` otherwise
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Get an environment variable as a string. Unset and empty values both
/// fall back to `default`.
#[inline]
pub fn env_get_str(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(val) if !val.is_empty() => val,
        _ => default.to_string(),
    }
}
