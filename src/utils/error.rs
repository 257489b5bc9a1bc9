//! Error handling utilities for graceful degradation
//!
//! Provides helpers for logging non-fatal errors and for turning caught
//! panics into error text.

use std::any::Any;
use tracing::warn;

/// Execute an operation and log errors without failing
///
/// Returns `Some(T)` on success, `None` on error (after logging).
/// Useful for non-critical operations that should not stop execution.
///
/// # Example
/// ```rust
/// use modulo_runtime::utils::log_error;
///
/// let parsed = log_error(|| "42".parse::<u32>(), "Failed to parse value");
/// assert_eq!(parsed, Some(42));
/// ```
pub fn log_error<F, T, E>(operation: F, context: &str) -> Option<T>
where
    F: FnOnce() -> Result<T, E>,
    E: std::fmt::Display,
{
    match operation() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("{}: {}", context, e);
            None
        }
    }
}

/// Text of a panic payload caught with `catch_unwind`
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
