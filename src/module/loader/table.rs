//! Per-version symbol table
//!
//! Each successful update of a module installs a fresh table. Lookups go to
//! the module's own units first and then to the manager's dispatcher, which
//! records a dependency edge for whatever it finds elsewhere. A table only
//! serves lookups while its module is ACTIVE and still at the table's
//! version, and it defines units from the artifact snapshot taken when that
//! version was loaded.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};
use tracing::debug;

use crate::module::lifecycle::Module;
use crate::module::loader::context::ResolveContext;
use crate::module::loader::symbol::Symbol;
use crate::module::registry::manifest::{entry_name, symbol_name, ArtifactManifest};
use crate::module::traits::ModuleError;
use crate::utils::lock::lock;

pub struct SymbolTable {
    module: Weak<Module>,
    path: PathBuf,
    version: u64,
    artifact: ArtifactManifest,
    entries: Vec<String>,
    symbols: Mutex<HashMap<String, Symbol>>,
}

impl SymbolTable {
    pub(crate) fn new(module: Weak<Module>, path: PathBuf, version: u64, artifact: ArtifactManifest) -> Self {
        Self {
            module,
            path,
            version,
            entries: artifact.entries(),
            artifact,
            symbols: Mutex::new(HashMap::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Entries of the artifact, in artifact order
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Symbol names of the unit entries, in artifact order
    pub fn unit_names(&self) -> Vec<String> {
        self.entries.iter().filter_map(|e| symbol_name(e)).collect()
    }

    /// Whether `name` has been defined by this table
    pub fn is_source_of(&self, name: &str) -> bool {
        lock(&self.symbols).contains_key(name)
    }

    /// Names defined so far, sorted
    pub fn defined_symbols(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.symbols).keys().cloned().collect();
        names.sort();
        names
    }

    /// Resolve `name`: own units first, then every other active module
    pub fn lookup(&self, name: &str, ctx: &ResolveContext) -> Result<Symbol, ModuleError> {
        let module = self.ensure_current()?;
        if let Some(symbol) = self.define(&module, name, ctx)? {
            return Ok(symbol);
        }
        module.manager()?.resolve_with(name, &ctx.on_behalf_of(&module))
    }

    /// Resolve `name` against this table's own units only
    pub fn lookup_local(&self, name: &str, ctx: &ResolveContext) -> Result<Option<Symbol>, ModuleError> {
        let module = self.ensure_current()?;
        self.define(&module, name, ctx)
    }

    fn ensure_current(&self) -> Result<Arc<Module>, ModuleError> {
        let module = self.module.upgrade().ok_or_else(|| {
            ModuleError::IllegalState(format!("module {} was dropped", self.path.display()))
        })?;
        if !module.is_active() || module.version() != self.version {
            return Err(ModuleError::IllegalState(format!(
                "lookup against {} through table version {}",
                module, self.version
            )));
        }
        Ok(module)
    }

    fn define(
        &self,
        module: &Arc<Module>,
        name: &str,
        ctx: &ResolveContext,
    ) -> Result<Option<Symbol>, ModuleError> {
        if let Some(symbol) = lock(&self.symbols).get(name) {
            return Ok(Some(symbol.clone()));
        }

        let Some(descriptor) = self.artifact.unit(&entry_name(name)) else {
            return Ok(None);
        };

        let ctx = ctx.defining(&self.path, name)?;
        let manager = module.manager()?;

        // Link required symbols before publishing the definition
        for required in &descriptor.requires {
            self.lookup(required, &ctx)?;
        }

        let factory = manager.catalog().factory(&descriptor.kind);
        let symbol = Symbol::new(
            descriptor.clone(),
            Arc::downgrade(module),
            self.path.clone(),
            self.version,
            factory,
        );

        let mut symbols = lock(&self.symbols);
        let defined = symbols.entry(name.to_string()).or_insert(symbol).clone();
        drop(symbols);
        debug!("Defined {} in {}", name, module);
        Ok(Some(defined))
    }
}

impl std::fmt::Debug for SymbolTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolTable")
            .field("path", &self.path)
            .field("version", &self.version)
            .field("entries", &self.entries.len())
            .finish()
    }
}
