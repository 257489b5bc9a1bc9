//! Shared utilities: locking, environment, errors, logging and signals

pub mod env;
pub mod error;
pub mod lock;
pub mod logging;
pub mod signal;

// Re-export commonly used items
pub use env::{env_flag, env_int, env_opt};
pub use error::{log_error, panic_message};
pub use lock::{lock, read, write};
pub use logging::{init_logging, init_logging_from_config};
#[cfg(feature = "json-logging")]
pub use logging::init_json_logging;
pub use signal::{shutdown_when, wait_for_shutdown_signal, watcher_shutdown, Shutdown};
