//! Unit catalog
//!
//! Module artifacts cannot carry executable code, so the behavior behind a
//! unit is linked into the host and selected by the unit's `kind`. Each
//! factory builds one capability type, usually a trait object such as
//! `dyn Callable`, and receives a [`UnitContext`] scoped to the owning module.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::module::lifecycle::Module;
use crate::module::loader::context::ResolveContext;
use crate::module::loader::symbol::Symbol;
use crate::module::traits::ModuleError;

/// Type-erased unit instance; holds an `Arc<C>` for the factory's capability `C`
pub type Instance = Box<dyn Any + Send + Sync>;

type BuildFn = dyn Fn(&UnitContext<'_>) -> Result<Instance, ModuleError> + Send + Sync;

/// Constructor for one unit kind
#[derive(Clone)]
pub struct UnitFactory {
    capability: &'static str,
    build: Arc<BuildFn>,
}

impl UnitFactory {
    /// Name of the capability type the factory produces
    pub fn capability(&self) -> &'static str {
        self.capability
    }

    pub fn build(&self, ctx: &UnitContext<'_>) -> Result<Instance, ModuleError> {
        (self.build)(ctx)
    }
}

impl std::fmt::Debug for UnitFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitFactory")
            .field("capability", &self.capability)
            .finish()
    }
}

/// Registry of unit kinds known to the host
#[derive(Clone, Default)]
pub struct UnitCatalog {
    factories: HashMap<String, UnitFactory>,
}

impl UnitCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog pre-populated with the built-in unit kinds
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        crate::module::builtins::register_builtins(&mut catalog);
        catalog
    }

    /// Register the factory for `kind`, replacing any previous one
    pub fn register<C, F>(&mut self, kind: impl Into<String>, build: F) -> &mut Self
    where
        C: ?Sized + Send + Sync + 'static,
        F: Fn(&UnitContext<'_>) -> anyhow::Result<Arc<C>> + Send + Sync + 'static,
    {
        let kind = kind.into();
        let build: Arc<BuildFn> = Arc::new(move |ctx: &UnitContext<'_>| match build(ctx) {
            Ok(instance) => Ok(Box::new(instance) as Instance),
            Err(e) => Err(ModuleError::InstantiationFailure {
                unit: ctx.symbol().name().to_string(),
                reason: format!("{:#}", e),
            }),
        });
        let factory = UnitFactory {
            capability: type_name::<C>(),
            build,
        };
        if self.factories.insert(kind.clone(), factory).is_some() {
            warn!("Replacing factory for unit kind {}", kind);
        }
        self
    }

    /// Builder form of [`UnitCatalog::register`]
    pub fn with<C, F>(mut self, kind: impl Into<String>, build: F) -> Self
    where
        C: ?Sized + Send + Sync + 'static,
        F: Fn(&UnitContext<'_>) -> anyhow::Result<Arc<C>> + Send + Sync + 'static,
    {
        self.register(kind, build);
        self
    }

    pub fn factory(&self, kind: &str) -> Option<UnitFactory> {
        self.factories.get(kind).cloned()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.factories.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

/// What a factory sees while building a unit
pub struct UnitContext<'a> {
    symbol: &'a Symbol,
    owner: Arc<Module>,
}

impl<'a> UnitContext<'a> {
    pub(crate) fn new(symbol: &'a Symbol, owner: Arc<Module>) -> Self {
        Self { symbol, owner }
    }

    pub fn symbol(&self) -> &Symbol {
        self.symbol
    }

    /// Module the unit belongs to
    pub fn owner(&self) -> &Arc<Module> {
        &self.owner
    }

    /// Get a configuration value
    pub fn get_config(&self, key: &str) -> Option<&str> {
        self.symbol.config().get(key).map(String::as_str)
    }

    /// Get a configuration value with default
    pub fn get_config_or(&self, key: &str, default: &str) -> String {
        self.get_config(key).unwrap_or(default).to_string()
    }

    /// Resolve a symbol through the owning module: its own units first, then
    /// every other active module. Symbols found elsewhere become dependencies
    /// of the owning module.
    pub fn resolve(&self, name: &str) -> Result<Symbol, ModuleError> {
        if self.owner.version() != self.symbol.version() {
            return Err(ModuleError::IllegalState(format!(
                "{} belongs to version {} of {}",
                self.symbol.name(),
                self.symbol.version(),
                self.owner
            )));
        }
        self.owner.lookup(name, &ResolveContext::root())
    }

    /// Resolve and instantiate a symbol as capability `C`
    pub fn require<C>(&self, name: &str) -> Result<Arc<C>, ModuleError>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        self.resolve(name)?.instantiate::<C>()
    }
}
