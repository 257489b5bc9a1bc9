//! Module validation framework
//!
//! Provides manifest validation for module artifacts.

pub mod manifest_validator;

pub use manifest_validator::{ManifestValidator, ValidationResult};
