//! Modulo runtime - dynamic modules with hot reload
//!
//! Loads modules from artifacts, resolves symbols across them, records which
//! module depends on which, and cascades reloads and removals through that
//! graph so dependents never run against stale or missing code.
//!
//! ## Components
//!
//! 1. [`module::ModuleManager`]: registry and shared resolution dispatcher
//! 2. [`module::Module`]: per-artifact state machine (UNLOADED, ACTIVE,
//!    INVALIDATED, FROZEN)
//! 3. [`module::ServiceHandle`]: lazy reference that rebinds after reloads
//! 4. [`module::activator`]: marker-driven extension activation
//! 5. [`module::ModuleWatcher`]: artifact polling loop
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use modulo_runtime::module::{
//!     ArtifactManifest, Callable, MemoryArtifactSource, ModuleManager, UnitCatalog,
//!     UnitDescriptor,
//! };
//!
//! let source = Arc::new(MemoryArtifactSource::new());
//! source.put(
//!     "/modules/greeter.mod.toml",
//!     ArtifactManifest::default().with_unit(
//!         UnitDescriptor::new("svc.Greeter", "template").with_config("template", "Hello!"),
//!     ),
//! );
//!
//! let manager = ModuleManager::new(source, UnitCatalog::with_builtins());
//! manager.load_module("/modules/greeter.mod.toml");
//!
//! let greeter = manager.service::<dyn Callable>("svc.Greeter");
//! let greeting = greeter.call(|svc| svc.call()).unwrap().unwrap();
//! assert_eq!(greeting, "Hello!");
//! ```

pub mod config;
pub mod module;
pub mod utils;

pub use config::{LoggingConfig, ModuleConfig, RuntimeConfig, WatcherConfig};
pub use module::{ModuleError, ModuleManager, ModuleState};
