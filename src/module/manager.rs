//! Module manager for orchestrating all modules
//!
//! Owns the module registry, the shared resolution dispatcher, the activator
//! repository and the manager-wide listener set every module state change is
//! re-broadcast on.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, Weak};
use tracing::{debug, info, warn};

use crate::config::ModuleConfig;
use crate::module::activator::{ActivatorRepository, ModuleActivator};
use crate::module::api::events::{ListenerId, ListenerSet};
use crate::module::lifecycle::Module;
use crate::module::loader::{ResolveContext, Symbol, UnitCatalog};
use crate::module::registry::manifest::entry_name;
use crate::module::registry::ModuleDependencies;
use crate::module::service::ServiceHandle;
use crate::module::traits::{ArtifactSource, ModuleError, ModuleListener, ModuleState};
use crate::utils::lock::{read, write};

/// Module manager coordinates all loaded modules
pub struct ModuleManager {
    self_ref: Weak<ModuleManager>,
    config: ModuleConfig,
    /// Artifact access
    source: Arc<dyn ArtifactSource>,
    /// Unit factories linked into the host
    catalog: UnitCatalog,
    /// Every module ever observed, in registration order
    modules: RwLock<Vec<Arc<Module>>>,
    /// Manager-wide subscribers
    listeners: ListenerSet,
    /// Subscribed to each module; forwards into `listeners`
    rebroadcast: Arc<dyn ModuleListener>,
    activators: Arc<ActivatorRepository>,
    activation: Option<Arc<ModuleActivator>>,
}

struct Rebroadcast {
    manager: Weak<ModuleManager>,
}

impl ModuleListener for Rebroadcast {
    fn state_changed(&self, module: &Arc<Module>, state: ModuleState) {
        if let Some(manager) = self.manager.upgrade() {
            manager.listeners.broadcast(module, state);
        }
    }
}

impl ModuleManager {
    /// Create a new module manager with default configuration
    pub fn new(source: Arc<dyn ArtifactSource>, catalog: UnitCatalog) -> Arc<Self> {
        Self::with_config(source, catalog, ModuleConfig::default())
    }

    pub fn with_config(
        source: Arc<dyn ArtifactSource>,
        catalog: UnitCatalog,
        config: ModuleConfig,
    ) -> Arc<Self> {
        let activators = ActivatorRepository::new();
        let activation = config
            .auto_activate
            .then(|| Arc::new(ModuleActivator::new(Arc::clone(&activators))));

        let manager = Arc::new_cyclic(|weak: &Weak<ModuleManager>| ModuleManager {
            self_ref: weak.clone(),
            config,
            source,
            catalog,
            modules: RwLock::new(Vec::new()),
            listeners: ListenerSet::new(),
            rebroadcast: Arc::new(Rebroadcast {
                manager: weak.clone(),
            }),
            activators,
            activation,
        });

        if let Some(activation) = &manager.activation {
            manager.add_listener(Arc::clone(activation) as Arc<dyn ModuleListener>);
        }
        debug!(
            "Module manager ready ({} unit kinds, auto-activate: {})",
            manager.catalog.len(),
            manager.activation.is_some()
        );
        manager
    }

    pub fn config(&self) -> &ModuleConfig {
        &self.config
    }

    pub fn source(&self) -> &Arc<dyn ArtifactSource> {
        &self.source
    }

    pub fn catalog(&self) -> &UnitCatalog {
        &self.catalog
    }

    pub fn activators(&self) -> &Arc<ActivatorRepository> {
        &self.activators
    }

    /// Return the module registered for `path`, creating and loading it first if needed
    pub fn load_module(&self, path: impl AsRef<Path>) -> Arc<Module> {
        let path = path.as_ref();
        let created = {
            let mut modules = write(&self.modules);
            if let Some(existing) = modules.iter().find(|m| m.path() == path) {
                return Arc::clone(existing);
            }
            let module = Module::new(
                self.self_ref.clone(),
                path.to_path_buf(),
                &self.config.artifact_suffix,
            );
            module.add_listener(Arc::clone(&self.rebroadcast));
            modules.push(Arc::clone(&module));
            module
        };

        info!("Registered module {}", path.display());
        if let Err(e) = created.update() {
            warn!("Module {} failed to load: {}", path.display(), e);
        }
        created
    }

    /// Registered module for `path`
    pub fn module(&self, path: impl AsRef<Path>) -> Option<Arc<Module>> {
        let path = path.as_ref();
        read(&self.modules).iter().find(|m| m.path() == path).cloned()
    }

    /// Snapshot of every registered module, in registration order
    pub fn modules(&self) -> Vec<Arc<Module>> {
        read(&self.modules).clone()
    }

    pub fn is_registered(&self, path: impl AsRef<Path>) -> bool {
        self.module(path).is_some()
    }

    /// Whether an ACTIVE module's artifact exports `name`; defines nothing
    pub fn is_known(&self, name: &str) -> bool {
        let entry = entry_name(name);
        self.modules()
            .iter()
            .any(|module| module.is_active() && exports(module, &entry))
    }

    /// Resolve `name` from application code
    pub fn resolve(&self, name: &str) -> Result<Symbol, ModuleError> {
        self.resolve_with(name, &ResolveContext::root())
    }

    /// Shared dispatcher: search every ACTIVE module other than the caller
    ///
    /// Modules are tried in registration order. When the caller is a module,
    /// the module the symbol was found in becomes one of its dependencies.
    pub fn resolve_with(&self, name: &str, ctx: &ResolveContext) -> Result<Symbol, ModuleError> {
        let caller = ctx.caller();
        for module in self.modules() {
            if !module.is_active() {
                continue;
            }
            if caller.is_some_and(|c| c.path() == module.path()) {
                continue;
            }
            let Some(table) = module.table() else {
                continue;
            };

            match table.lookup_local(name, ctx) {
                Ok(Some(symbol)) => {
                    if let Some(caller) = caller {
                        caller.add_dependency(&module, name);
                    }
                    return Ok(symbol);
                }
                Ok(None) => {}
                // Module left ACTIVE (or was reloaded) after the check above
                Err(ModuleError::IllegalState(reason)) => {
                    debug!("Skipping {} while resolving {}: {}", module, name, reason);
                }
                Err(e) => return Err(e),
            }
        }
        Err(ModuleError::NotFound(name.to_string()))
    }

    /// Module whose current table has defined `name`, active or not
    pub fn find_owner(&self, name: &str) -> Option<Arc<Module>> {
        self.modules().into_iter().find(|module| {
            module
                .table()
                .is_some_and(|table| table.is_source_of(name))
        })
    }

    /// First module, in registration order, whose current table lists `name`
    /// as a unit entry, whatever its state
    pub fn find_exporter(&self, name: &str) -> Option<Arc<Module>> {
        let entry = entry_name(name);
        self.modules().into_iter().find(|module| exports(module, &entry))
    }

    /// Lazy handle to the service exported as `name`
    pub fn service<C>(&self, name: impl Into<String>) -> ServiceHandle<C>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        ServiceHandle::new(self.self_ref.clone(), name.into())
    }

    /// Subscribe to the state changes of every module
    pub fn add_listener(&self, listener: Arc<dyn ModuleListener>) -> ListenerId {
        self.listeners.subscribe(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    /// Units currently activated for `module`
    pub fn activated_units(&self, module: &Module) -> Vec<Symbol> {
        self.activation
            .as_ref()
            .map(|activation| activation.activated_units(module.path()))
            .unwrap_or_default()
    }

    /// Modules ordered so that dependencies come before their dependents
    pub fn dependency_order(&self) -> Result<Vec<Arc<Module>>, ModuleError> {
        let modules = self.modules();
        let graph: Vec<(PathBuf, Vec<PathBuf>)> = modules
            .iter()
            .map(|module| {
                let dependencies = module
                    .dependencies()
                    .iter()
                    .map(|d| d.path().to_path_buf())
                    .collect();
                (module.path().to_path_buf(), dependencies)
            })
            .collect();

        let order = ModuleDependencies::resolve(&graph)?.load_order;
        Ok(order
            .iter()
            .filter_map(|path| modules.iter().find(|m| m.path() == path.as_path()).cloned())
            .collect())
    }
}

fn exports(module: &Module, entry: &str) -> bool {
    module
        .table()
        .is_some_and(|table| table.entries().iter().any(|e| e == entry))
}
