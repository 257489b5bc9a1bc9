//! Module registry support
//!
//! Artifact manifests, artifact sources and dependency ordering.

pub mod dependencies;
pub mod discovery;
pub mod manifest;

pub use dependencies::{DependencyResolution, ModuleDependencies};
pub use discovery::{FsArtifactSource, MemoryArtifactSource};
pub use manifest::{ArtifactManifest, Marker, UnitDescriptor};
