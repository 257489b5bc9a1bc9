//! Module system tests
//!
//! Tests for the module system including lifecycle, dependency cascades,
//! service handles, extension activation and the artifact watcher.

pub mod test_utils;
pub mod service_tests;
pub mod activation_tests;
pub mod watcher_tests;
