//! Module lifecycle
//!
//! A [`Module`] is one artifact under management. It owns the symbol table of
//! its current version, the dependency edges recorded by resolution and the
//! listener set its state changes are broadcast on. Every transition is
//! applied under the module's lock and broadcast after the lock is released,
//! so listeners may call back into the module.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, error, info};

use crate::module::api::events::{ListenerId, ListenerSet};
use crate::module::loader::{ResolveContext, Symbol, SymbolTable};
use crate::module::manager::ModuleManager;
use crate::module::traits::{ModuleError, ModuleListener, ModuleState};
use crate::utils::lock::lock;

pub struct Module {
    path: PathBuf,
    name: String,
    manager: Weak<ModuleManager>,
    self_ref: Weak<Module>,
    inner: Mutex<ModuleInner>,
    listeners: ListenerSet,
    dependency_listener: Arc<dyn ModuleListener>,
}

struct ModuleInner {
    state: ModuleState,
    version: u64,
    table: Option<Arc<SymbolTable>>,
    dependencies: BTreeMap<PathBuf, DependencyEdge>,
}

struct DependencyEdge {
    module: Arc<Module>,
    symbols: BTreeSet<String>,
    subscription: ListenerId,
}

/// Forwards a dependency's broadcasts to the dependent module
struct DependencyListener {
    dependent: Weak<Module>,
}

impl ModuleListener for DependencyListener {
    fn state_changed(&self, dependency: &Arc<Module>, state: ModuleState) {
        if let Some(dependent) = self.dependent.upgrade() {
            dependent.dependency_changed(dependency, state);
        }
    }
}

impl Module {
    pub(crate) fn new(manager: Weak<ModuleManager>, path: PathBuf, suffix: &str) -> Arc<Self> {
        let name = display_name(&path, suffix);
        Arc::new_cyclic(|weak: &Weak<Module>| Module {
            path,
            name,
            manager,
            self_ref: weak.clone(),
            inner: Mutex::new(ModuleInner {
                state: ModuleState::Unloaded,
                version: 0,
                table: None,
                dependencies: BTreeMap::new(),
            }),
            listeners: ListenerSet::new(),
            dependency_listener: Arc::new(DependencyListener {
                dependent: weak.clone(),
            }),
        })
    }

    /// Artifact location; the module's identity
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Artifact file name without the artifact suffix
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ModuleState {
        lock(&self.inner).state
    }

    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    /// Number of successful updates so far
    pub fn version(&self) -> u64 {
        lock(&self.inner).version
    }

    /// Symbol table of the current version, if the module was ever loaded
    pub fn table(&self) -> Option<Arc<SymbolTable>> {
        lock(&self.inner).table.clone()
    }

    pub(crate) fn manager(&self) -> Result<Arc<ModuleManager>, ModuleError> {
        self.manager.upgrade().ok_or_else(|| {
            ModuleError::IllegalState(format!("{} outlived its manager", self.path.display()))
        })
    }

    pub fn add_listener(&self, listener: Arc<dyn ModuleListener>) -> ListenerId {
        self.listeners.subscribe(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    /// Resolve `name` through this module's current symbol table
    pub fn lookup(&self, name: &str, ctx: &ResolveContext) -> Result<Symbol, ModuleError> {
        let table = self.table().ok_or_else(|| {
            ModuleError::IllegalState(format!("{} has never been loaded", self))
        })?;
        table.lookup(name, ctx)
    }

    /// (Re)load the module from its artifact
    ///
    /// A missing artifact unloads the module. An unreadable one unloads it and
    /// reports the failure. Otherwise the version is bumped, a fresh symbol
    /// table replaces the old one, every dependency edge is dropped and the
    /// module becomes ACTIVE. Reloading an ACTIVE module first invalidates it
    /// so dependents and listeners observe the content change.
    pub fn update(&self) -> Result<ModuleState, ModuleError> {
        let manager = self.manager()?;
        let source = manager.source();

        if !source.exists(&self.path) {
            info!("Module artifact {} is missing, unloading", self.path.display());
            self.unload();
            return Ok(ModuleState::Unloaded);
        }

        let artifact = match source.read_artifact(&self.path) {
            Ok(artifact) => artifact,
            Err(e) => {
                error!("Cannot scan module {}: {}", self.path.display(), e);
                self.unload();
                return Err(e);
            }
        };

        self.transition(|state| (state == ModuleState::Active).then_some(ModuleState::Invalidated));

        let released = {
            let mut inner = lock(&self.inner);
            inner.version += 1;
            inner.table = Some(Arc::new(SymbolTable::new(
                self.self_ref.clone(),
                self.path.clone(),
                inner.version,
                artifact,
            )));
            std::mem::take(&mut inner.dependencies)
        };
        for edge in released.into_values() {
            edge.module.remove_listener(edge.subscription);
        }

        self.transition(|_| Some(ModuleState::Active));
        info!("Loaded module {}", self);
        Ok(ModuleState::Active)
    }

    /// Mark the module's content as changed; no-op when FROZEN or UNLOADED
    pub fn invalidate(&self) {
        self.transition(|state| match state {
            ModuleState::Active | ModuleState::Invalidated => Some(ModuleState::Invalidated),
            ModuleState::Frozen | ModuleState::Unloaded => None,
        });
    }

    /// Take the module out of service
    pub fn unload(&self) {
        self.transition(|_| Some(ModuleState::Unloaded));
    }

    /// Recompute the state from the current dependency states
    ///
    /// Any UNLOADED or FROZEN dependency freezes the module. Otherwise an
    /// INVALIDATED dependency, or the module itself being FROZEN, makes it
    /// INVALIDATED. An UNLOADED module is left alone.
    pub fn evaluate_state(&self) -> ModuleState {
        let dependencies: Vec<Arc<Module>> = lock(&self.inner)
            .dependencies
            .values()
            .map(|edge| Arc::clone(&edge.module))
            .collect();
        let states: HashSet<ModuleState> = dependencies.iter().map(|d| d.state()).collect();

        let blocked = states.contains(&ModuleState::Unloaded) || states.contains(&ModuleState::Frozen);
        let stale = states.contains(&ModuleState::Invalidated);

        self.transition(|state| match state {
            ModuleState::Unloaded => None,
            _ if blocked => Some(ModuleState::Frozen),
            ModuleState::Frozen => Some(ModuleState::Invalidated),
            _ if stale => Some(ModuleState::Invalidated),
            _ => None,
        });
        self.state()
    }

    /// Record that this module resolved `symbol` from `dependency`
    ///
    /// The first edge to a dependency subscribes to its broadcasts; later
    /// calls only add to the edge's symbol set (when symbol collection is
    /// enabled). Self-edges are never recorded.
    pub(crate) fn add_dependency(&self, dependency: &Arc<Module>, symbol: &str) {
        if dependency.path == self.path {
            return;
        }
        let collect = self
            .manager
            .upgrade()
            .map_or(true, |manager| manager.config().collect_symbols);

        let created = {
            let mut inner = lock(&self.inner);
            let created = !inner.dependencies.contains_key(&dependency.path);
            if created {
                let subscription = dependency.add_listener(Arc::clone(&self.dependency_listener));
                inner.dependencies.insert(
                    dependency.path.clone(),
                    DependencyEdge {
                        module: Arc::clone(dependency),
                        symbols: BTreeSet::new(),
                        subscription,
                    },
                );
            }
            if collect {
                if let Some(edge) = inner.dependencies.get_mut(&dependency.path) {
                    edge.symbols.insert(symbol.to_string());
                }
            }
            created
        };

        if created {
            debug!("{} now depends on {} (via {})", self, dependency, symbol);
        }
    }

    /// Modules this module resolved symbols from, ordered by path
    pub fn dependencies(&self) -> Vec<Arc<Module>> {
        lock(&self.inner)
            .dependencies
            .values()
            .map(|edge| Arc::clone(&edge.module))
            .collect()
    }

    /// Symbols resolved from `dependency`, sorted; empty when collection is off
    pub fn dependency_symbols(&self, dependency: &Module) -> Vec<String> {
        lock(&self.inner)
            .dependencies
            .get(&dependency.path)
            .map(|edge| edge.symbols.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn depends_on(&self, dependency: &Module) -> bool {
        lock(&self.inner).dependencies.contains_key(&dependency.path)
    }

    fn dependency_changed(&self, dependency: &Arc<Module>, state: ModuleState) {
        match state {
            ModuleState::Invalidated => {
                if self.state() == ModuleState::Frozen {
                    self.evaluate_state();
                } else {
                    self.invalidate();
                }
            }
            // The edge stays: an UNLOADED module is revived in place by its
            // next update, and evaluate_state reads the edge to thaw
            ModuleState::Unloaded => {
                let frozen = self.transition(|current| {
                    (current != ModuleState::Unloaded).then_some(ModuleState::Frozen)
                });
                if frozen {
                    debug!("{} frozen: dependency {} unloaded", self, dependency);
                }
            }
            ModuleState::Active | ModuleState::Frozen => {}
        }
    }

    /// Apply `next` to the current state under the lock and broadcast the
    /// result if the state changed. Returns whether it did.
    fn transition<F>(&self, next: F) -> bool
    where
        F: FnOnce(ModuleState) -> Option<ModuleState>,
    {
        let changed = {
            let mut inner = lock(&self.inner);
            match next(inner.state) {
                Some(state) if state != inner.state => {
                    let previous = inner.state;
                    inner.state = state;
                    Some((previous, state))
                }
                _ => None,
            }
        };

        match changed {
            Some((previous, state)) => {
                debug!("{}: {} -> {}", self.path.display(), previous, state);
                if let Some(me) = self.self_ref.upgrade() {
                    self.listeners.broadcast(&me, state);
                }
                true
            }
            None => false,
        }
    }
}

fn display_name(path: &Path, suffix: &str) -> String {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let cut = file_name.len().saturating_sub(suffix.len());
    match file_name.get(cut..) {
        Some(tail) if cut > 0 && tail.eq_ignore_ascii_case(suffix) => file_name[..cut].to_string(),
        _ => file_name,
    }
}

impl PartialEq for Module {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for Module {}

impl Hash for Module {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (version, state) = {
            let inner = lock(&self.inner);
            (inner.version, inner.state)
        };
        write!(f, "{}:{}({})", self.name, version, state)
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (version, state) = {
            let inner = lock(&self.inner);
            (inner.version, inner.state)
        };
        f.debug_struct("Module")
            .field("path", &self.path)
            .field("version", &version)
            .field("state", &state)
            .finish()
    }
}
