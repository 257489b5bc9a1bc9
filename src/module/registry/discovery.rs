//! Artifact sources
//!
//! [`FsArtifactSource`] reads manifests from disk and scans module
//! directories. [`MemoryArtifactSource`] keeps manifests in memory with a
//! logical clock, for embedding and tests.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::module::registry::manifest::ArtifactManifest;
use crate::module::traits::{ArtifactSource, ModuleError};
use crate::module::validation::ManifestValidator;
use crate::utils::lock::lock;

/// Manifests on the local filesystem
#[derive(Debug, Clone)]
pub struct FsArtifactSource {
    /// File-name suffix identifying module artifacts
    suffix: String,
    validator: ManifestValidator,
}

impl FsArtifactSource {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
            validator: ManifestValidator::new(),
        }
    }

    /// Validate manifests against the given validator before exposing entries
    pub fn with_validator(mut self, validator: ManifestValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    fn is_artifact(&self, path: &Path) -> bool {
        path.file_name()
            .map(|name| name.to_string_lossy().to_lowercase())
            .is_some_and(|name| name.len() > self.suffix.len() && name.ends_with(&self.suffix.to_lowercase()))
    }

    fn scan(&self, dir: &Path, found: &mut Vec<PathBuf>) -> Result<(), ModuleError> {
        let entries = fs::read_dir(dir)
            .map_err(|e| ModuleError::unreadable(dir, format!("failed to read directory: {}", e)))?;

        for entry in entries {
            let entry = entry
                .map_err(|e| ModuleError::unreadable(dir, format!("failed to read entry: {}", e)))?;
            let path = entry.path();
            if path.is_dir() {
                self.scan(&path, found)?;
            } else if self.is_artifact(&path) {
                found.push(path);
            }
        }
        Ok(())
    }
}

impl Default for FsArtifactSource {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_ARTIFACT_SUFFIX)
    }
}

impl ArtifactSource for FsArtifactSource {
    fn exists(&self, artifact: &Path) -> bool {
        artifact.is_file()
    }

    fn last_modified(&self, artifact: &Path) -> Option<SystemTime> {
        fs::metadata(artifact).and_then(|m| m.modified()).ok()
    }

    fn read_artifact(&self, artifact: &Path) -> Result<ArtifactManifest, ModuleError> {
        let manifest = ArtifactManifest::from_file(artifact)?;
        self.validator
            .validate(&manifest)
            .into_result()
            .map_err(|e| ModuleError::unreadable(artifact, e))?;
        Ok(manifest)
    }

    fn discover(&self, root: &Path) -> Result<Vec<PathBuf>, ModuleError> {
        if !root.exists() {
            debug!("Module root {} does not exist yet", root.display());
            return Ok(Vec::new());
        }
        if !root.is_dir() {
            return Err(ModuleError::unreadable(root, "not a directory"));
        }

        let mut found = Vec::new();
        self.scan(root, &mut found)?;
        found.sort();
        Ok(found)
    }
}

#[derive(Debug, Clone)]
struct MemoryArtifact {
    manifest: ArtifactManifest,
    modified: SystemTime,
    unreadable: bool,
}

/// In-memory artifacts keyed by path
///
/// Every mutation advances a logical clock by one second, so
/// `last_modified` changes on each `put` or `touch`.
#[derive(Debug, Default)]
pub struct MemoryArtifactSource {
    artifacts: Mutex<HashMap<PathBuf, MemoryArtifact>>,
    clock: AtomicU64,
}

impl MemoryArtifactSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn tick(&self) -> SystemTime {
        let now = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
        UNIX_EPOCH + Duration::from_secs(now)
    }

    /// Create or replace the artifact at `path`
    pub fn put(&self, path: impl AsRef<Path>, manifest: ArtifactManifest) {
        let modified = self.tick();
        lock(&self.artifacts).insert(
            path.as_ref().to_path_buf(),
            MemoryArtifact {
                manifest,
                modified,
                unreadable: false,
            },
        );
    }

    /// Delete the artifact at `path`; returns whether it existed
    pub fn remove(&self, path: impl AsRef<Path>) -> bool {
        lock(&self.artifacts).remove(path.as_ref()).is_some()
    }

    /// Advance the modification time without changing content
    pub fn touch(&self, path: impl AsRef<Path>) -> bool {
        let modified = self.tick();
        match lock(&self.artifacts).get_mut(path.as_ref()) {
            Some(artifact) => {
                artifact.modified = modified;
                true
            }
            None => false,
        }
    }

    /// Make content enumeration fail while the artifact still exists
    pub fn set_unreadable(&self, path: impl AsRef<Path>, unreadable: bool) -> bool {
        match lock(&self.artifacts).get_mut(path.as_ref()) {
            Some(artifact) => {
                artifact.unreadable = unreadable;
                true
            }
            None => false,
        }
    }
}

impl ArtifactSource for MemoryArtifactSource {
    fn exists(&self, artifact: &Path) -> bool {
        lock(&self.artifacts).contains_key(artifact)
    }

    fn last_modified(&self, artifact: &Path) -> Option<SystemTime> {
        lock(&self.artifacts).get(artifact).map(|a| a.modified)
    }

    fn read_artifact(&self, artifact: &Path) -> Result<ArtifactManifest, ModuleError> {
        match lock(&self.artifacts).get(artifact) {
            Some(a) if a.unreadable => Err(ModuleError::unreadable(artifact, "artifact is unreadable")),
            Some(a) => Ok(a.manifest.clone()),
            None => Err(ModuleError::unreadable(artifact, "artifact does not exist")),
        }
    }

    fn discover(&self, root: &Path) -> Result<Vec<PathBuf>, ModuleError> {
        let mut found: Vec<PathBuf> = lock(&self.artifacts)
            .keys()
            .filter(|path| path.starts_with(root))
            .cloned()
            .collect();
        found.sort();
        Ok(found)
    }
}
