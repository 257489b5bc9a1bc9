//! Module system traits and interfaces
//!
//! Defines the module lifecycle states, the error taxonomy shared by every
//! component, and the two seams the core talks through: state listeners and
//! the artifact source.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;

use crate::module::lifecycle::Module;
use crate::module::registry::manifest::{ArtifactManifest, UnitDescriptor};

/// Module lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModuleState {
    /// Never loaded, or the artifact is missing
    Unloaded,
    /// Current, consistent and usable
    Active,
    /// Content changed; symbols served from it are stale
    Invalidated,
    /// A required dependency became unavailable
    Frozen,
}

impl ModuleState {
    /// Whether lookups against the module are allowed
    pub fn is_active(self) -> bool {
        self == ModuleState::Active
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModuleState::Unloaded => "UNLOADED",
            ModuleState::Active => "ACTIVE",
            ModuleState::Invalidated => "INVALIDATED",
            ModuleState::Frozen => "FROZEN",
        };
        f.write_str(name)
    }
}

/// Receives state broadcasts from a module (or, through the manager, from all modules)
///
/// Delivery is synchronous: `state_changed` runs on the thread that performed
/// the transition, before the mutating call returns. `state` is the state the
/// transition wrote.
pub trait ModuleListener: Send + Sync {
    fn state_changed(&self, module: &Arc<Module>, state: ModuleState);
}

impl<F> ModuleListener for F
where
    F: Fn(&Arc<Module>, ModuleState) + Send + Sync,
{
    fn state_changed(&self, module: &Arc<Module>, state: ModuleState) {
        self(module, state)
    }
}

/// Where module artifacts come from
///
/// The core only needs existence, timestamps and one validated snapshot of
/// the artifact per module version. Directory scanning is used by the
/// watcher only.
pub trait ArtifactSource: Send + Sync {
    /// Whether the artifact currently exists
    fn exists(&self, artifact: &Path) -> bool;

    /// Last modification time, `None` if unknown or missing
    fn last_modified(&self, artifact: &Path) -> Option<SystemTime>;

    /// Parsed and validated content of the artifact as it is right now
    fn read_artifact(&self, artifact: &Path) -> Result<ArtifactManifest, ModuleError>;

    /// Ordered entry names contained in the artifact
    fn list_entries(&self, artifact: &Path) -> Result<Vec<String>, ModuleError> {
        Ok(self.read_artifact(artifact)?.entries())
    }

    /// Definition of the unit stored under `entry`, `None` if the entry is not a unit
    fn read_unit(&self, artifact: &Path, entry: &str) -> Result<Option<UnitDescriptor>, ModuleError> {
        Ok(self.read_artifact(artifact)?.unit(entry).cloned())
    }

    /// All artifacts below `root`
    fn discover(&self, root: &Path) -> Result<Vec<PathBuf>, ModuleError>;
}

/// Module system errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModuleError {
    #[error("Symbol not found: {0}")]
    NotFound(String),

    #[error("Symbol {symbol} is unavailable at the moment (owner {module})")]
    Unavailable { symbol: String, module: String },

    #[error("Illegal module state: {0}")]
    IllegalState(String),

    #[error("Unit {unit} cannot be instantiated: {reason}")]
    InstantiationFailure { unit: String, reason: String },

    #[error("Cannot open module artifact {}: {reason}", path.display())]
    ArtifactUnreadable { path: PathBuf, reason: String },

    #[error("Unit {unit} does not provide capability {capability}")]
    CapabilityMismatch { unit: String, capability: String },

    #[error("Cyclic symbol definition: {0}")]
    CyclicDefinition(String),

    #[error("Dependency cycle between modules: {0:?}")]
    DependencyCycle(Vec<PathBuf>),

    #[error("Invalid module manifest: {0}")]
    InvalidManifest(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ModuleError {
    /// Errors a caller may retry once the module graph changes
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ModuleError::NotFound(_) | ModuleError::Unavailable { .. }
        )
    }

    pub(crate) fn unreadable(path: &Path, reason: impl fmt::Display) -> Self {
        ModuleError::ArtifactUnreadable {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

impl From<toml::de::Error> for ModuleError {
    fn from(e: toml::de::Error) -> Self {
        ModuleError::InvalidManifest(e.to_string())
    }
}

impl From<serde_json::Error> for ModuleError {
    fn from(e: serde_json::Error) -> Self {
        ModuleError::Config(e.to_string())
    }
}

impl From<anyhow::Error> for ModuleError {
    fn from(e: anyhow::Error) -> Self {
        ModuleError::Config(format!("{:#}", e))
    }
}
