//! Defined symbols
//!
//! A [`Symbol`] is a unit definition bound to one version of one module.
//! Definitions are cached per symbol table, so two lookups against the same
//! table yield the same symbol and [`Symbol::same_as`] holds. After a reload
//! the new table defines fresh symbols.

use std::any::type_name;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use crate::module::lifecycle::Module;
use crate::module::loader::catalog::{Instance, UnitContext, UnitFactory};
use crate::module::registry::manifest::{Marker, UnitDescriptor};
use crate::module::traits::ModuleError;
use crate::utils::error::panic_message;

#[derive(Clone)]
pub struct Symbol {
    inner: Arc<SymbolInner>,
}

struct SymbolInner {
    descriptor: UnitDescriptor,
    owner: Weak<Module>,
    owner_path: PathBuf,
    version: u64,
    factory: Option<UnitFactory>,
}

impl Symbol {
    pub(crate) fn new(
        descriptor: UnitDescriptor,
        owner: Weak<Module>,
        owner_path: PathBuf,
        version: u64,
        factory: Option<UnitFactory>,
    ) -> Self {
        Self {
            inner: Arc::new(SymbolInner {
                descriptor,
                owner,
                owner_path,
                version,
                factory,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.descriptor.name
    }

    pub fn kind(&self) -> &str {
        &self.inner.descriptor.kind
    }

    pub fn descriptor(&self) -> &UnitDescriptor {
        &self.inner.descriptor
    }

    pub fn markers(&self) -> &[Marker] {
        &self.inner.descriptor.markers
    }

    /// First marker of the given type
    pub fn marker(&self, marker_type: &str) -> Option<&Marker> {
        self.markers().iter().find(|m| m.marker_type == marker_type)
    }

    pub fn has_marker(&self, marker_type: &str) -> bool {
        self.marker(marker_type).is_some()
    }

    pub fn config(&self) -> &HashMap<String, String> {
        &self.inner.descriptor.config
    }

    pub fn requires(&self) -> &[String] {
        &self.inner.descriptor.requires
    }

    /// Owning module, if it is still registered
    pub fn owner(&self) -> Option<Arc<Module>> {
        self.inner.owner.upgrade()
    }

    pub fn owner_path(&self) -> &Path {
        &self.inner.owner_path
    }

    /// Version of the owning module this symbol was defined from
    pub fn version(&self) -> u64 {
        self.inner.version
    }

    /// Capability type produced by the unit's factory, if its kind is known
    pub fn capability(&self) -> Option<&'static str> {
        self.inner.factory.as_ref().map(UnitFactory::capability)
    }

    /// Identity comparison: both handles refer to the same definition
    pub fn same_as(&self, other: &Symbol) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Build a fresh instance of the unit as capability `C`
    pub fn instantiate<C>(&self) -> Result<Arc<C>, ModuleError>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        self.instantiate_any()?
            .downcast::<Arc<C>>()
            .map(|instance| *instance)
            .map_err(|_| ModuleError::CapabilityMismatch {
                unit: self.name().to_string(),
                capability: type_name::<C>().to_string(),
            })
    }

    /// Build a fresh, type-erased instance of the unit
    pub fn instantiate_any(&self) -> Result<Instance, ModuleError> {
        let factory = self
            .inner
            .factory
            .as_ref()
            .ok_or_else(|| ModuleError::InstantiationFailure {
                unit: self.name().to_string(),
                reason: format!("no factory registered for kind '{}'", self.kind()),
            })?;
        let owner = self.owner().ok_or_else(|| {
            ModuleError::IllegalState(format!(
                "owner {} of {} is gone",
                self.inner.owner_path.display(),
                self.name()
            ))
        })?;

        let ctx = UnitContext::new(self, owner);
        match catch_unwind(AssertUnwindSafe(|| factory.build(&ctx))) {
            Ok(result) => result,
            Err(panic) => Err(ModuleError::InstantiationFailure {
                unit: self.name().to_string(),
                reason: format!("factory panicked: {}", panic_message(panic.as_ref())),
            }),
        }
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Symbol")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .field("owner", &self.inner.owner_path)
            .field("version", &self.inner.version)
            .finish()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}:{}",
            self.name(),
            self.inner.owner_path.display(),
            self.inner.version
        )
    }
}
