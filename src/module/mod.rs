//! Module system
//!
//! Loads, hot-reloads and unloads modules from artifacts, tracks which
//! modules resolved symbols from which others, and cascades availability
//! changes through that dependency graph.
//!
//! ## Architecture
//!
//! - **Module**: one artifact; a state machine with a per-version symbol table
//! - **Dispatcher**: the manager resolves symbols across active modules and
//!   records a dependency edge from the calling module to the defining one
//! - **Cascade**: dependents invalidate or freeze when a dependency changes
//! - **Service handles**: lazily bound, rebound after reloads
//! - **Activation**: marker-driven extension points, themselves registered
//!   through markers

pub mod activator;
pub mod api;
pub mod builtins;
pub mod lifecycle;
pub mod loader;
pub mod manager;
pub mod registry;
pub mod service;
pub mod traits;
pub mod validation;
pub mod watcher;

pub use activator::{Activator, ActivatorRepository, ModuleActivator, ACTIVATOR_FOR};
pub use builtins::Callable;
pub use lifecycle::Module;
pub use loader::{ResolveContext, Symbol, UnitCatalog, UnitContext};
pub use manager::ModuleManager;
pub use registry::{ArtifactManifest, FsArtifactSource, Marker, MemoryArtifactSource, UnitDescriptor};
pub use service::ServiceHandle;
pub use traits::{ArtifactSource, ModuleError, ModuleListener, ModuleState};
pub use watcher::{ModuleWatcher, PollReport};
