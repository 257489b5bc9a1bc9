//! Environment variable utilities
//!
//! Provides helpers for reading environment variables with defaults.

/// Get environment variable as Option
///
/// Returns `Some(value)` if set, `None` if not set.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get environment variable as an optional boolean
///
/// `None` if unset, otherwise whether the value is "true", "1", "yes" or
/// "on" (case-insensitive).
pub fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|v| {
        let v_lower = v.to_lowercase();
        v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
    })
}

/// Get environment variable as integer
///
/// Returns `Some(value)` if set and parseable, `None` otherwise.
pub fn env_int<T>(key: &str) -> Option<T>
where
    T: std::str::FromStr,
{
    std::env::var(key).ok()?.parse().ok()
}
