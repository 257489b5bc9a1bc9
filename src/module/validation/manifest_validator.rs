//! Manifest validation
//!
//! Checks artifact manifests for structure before their entries are exposed:
//! symbol names, unit kinds, marker declarations and requirement lists.

use std::collections::HashSet;
use tracing::{debug, warn};

use crate::module::activator::ACTIVATOR_FOR;
use crate::module::loader::UnitCatalog;
use crate::module::registry::manifest::{ArtifactManifest, UnitDescriptor, UNIT_SUFFIX};
use crate::module::traits::ModuleError;

/// Validation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// Manifest is valid
    Valid,
    /// Manifest is invalid with specific errors
    Invalid(Vec<String>),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }

    /// Convert into a `Result`, joining the errors into one manifest error
    pub fn into_result(self) -> Result<(), ModuleError> {
        match self {
            ValidationResult::Valid => Ok(()),
            ValidationResult::Invalid(errors) => Err(ModuleError::InvalidManifest(errors.join("; "))),
        }
    }
}

/// Manifest validator
#[derive(Debug, Clone)]
pub struct ManifestValidator {
    /// Maximum length of a symbol name
    max_symbol_len: usize,
    /// Kinds known to the host; unknown kinds are reported when set
    known_kinds: Option<HashSet<String>>,
}

impl ManifestValidator {
    /// Create a new manifest validator
    pub fn new() -> Self {
        Self {
            max_symbol_len: 256,
            known_kinds: None,
        }
    }

    /// Also reject unit kinds missing from `catalog`
    pub fn with_catalog(mut self, catalog: &UnitCatalog) -> Self {
        self.known_kinds = Some(catalog.kinds().into_iter().collect());
        self
    }

    /// Validate an artifact manifest
    pub fn validate(&self, manifest: &ArtifactManifest) -> ValidationResult {
        let mut errors = Vec::new();
        let mut seen = HashSet::new();

        for unit in &manifest.units {
            if !seen.insert(unit.name.as_str()) {
                errors.push(format!("Duplicate unit: {}", unit.name));
            }
            errors.extend(self.validate_unit(unit));
        }

        for resource in &manifest.resources {
            if resource.ends_with(UNIT_SUFFIX) {
                errors.push(format!("Resource {} uses the unit suffix", resource));
            }
        }

        let label = manifest.name.as_deref().unwrap_or("<unnamed>");
        if errors.is_empty() {
            debug!("Manifest validation passed for {}", label);
            ValidationResult::Valid
        } else {
            warn!("Manifest validation failed for {}: {:?}", label, errors);
            ValidationResult::Invalid(errors)
        }
    }

    fn validate_unit(&self, unit: &UnitDescriptor) -> Vec<String> {
        let mut errors = Vec::new();

        if !self.is_valid_symbol(&unit.name) {
            errors.push(format!(
                "Invalid unit name: '{}' (dot-separated identifiers expected)",
                unit.name
            ));
        }

        if unit.kind.is_empty() {
            errors.push(format!("Unit {} has no kind", unit.name));
        } else if let Some(known) = &self.known_kinds {
            if !known.contains(&unit.kind) {
                errors.push(format!("Unit {} has unknown kind '{}'", unit.name, unit.kind));
            }
        }

        for required in &unit.requires {
            if required == &unit.name {
                errors.push(format!("Unit {} requires itself", unit.name));
            } else if !self.is_valid_symbol(required) {
                errors.push(format!("Unit {} requires invalid symbol '{}'", unit.name, required));
            }
        }

        for marker in &unit.markers {
            if marker.marker_type.is_empty() {
                errors.push(format!("Unit {} declares a marker without a type", unit.name));
            }
            if marker.marker_type == ACTIVATOR_FOR && marker.value.as_deref().map_or(true, str::is_empty) {
                errors.push(format!(
                    "Unit {} is marked {} without naming a marker type",
                    unit.name, ACTIVATOR_FOR
                ));
            }
        }

        errors
    }

    /// Dot-separated identifiers, each starting with a letter or underscore
    #[inline]
    fn is_valid_symbol(&self, name: &str) -> bool {
        if name.is_empty() || name.len() > self.max_symbol_len {
            return false;
        }
        name.split('.').all(|part| {
            part.chars()
                .next()
                .is_some_and(|c| c.is_alphabetic() || c == '_')
                && part.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$')
        })
    }
}

impl Default for ManifestValidator {
    fn default() -> Self {
        Self::new()
    }
}
