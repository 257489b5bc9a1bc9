//! Activation lifecycle adapter
//!
//! Subscribed to the manager's broadcasts. When a module becomes ACTIVE every
//! unit in its artifact is resolved through the module's own table and
//! offered to the activator repository; accepted units are remembered per
//! module. Any other state deactivates exactly the remembered units.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::module::activator::ActivatorRepository;
use crate::module::lifecycle::Module;
use crate::module::loader::{ResolveContext, Symbol};
use crate::module::traits::{ModuleError, ModuleListener, ModuleState};
use crate::utils::error::panic_message;
use crate::utils::lock::lock;

// TODO: units of modules that are already ACTIVE are not offered to an
// activator registered later; they only see it on their next activation.
pub struct ModuleActivator {
    repository: Arc<ActivatorRepository>,
    /// Activated units per module; each set has its own lock
    activated: Mutex<HashMap<PathBuf, Arc<Mutex<Vec<Symbol>>>>>,
}

impl ModuleActivator {
    pub fn new(repository: Arc<ActivatorRepository>) -> Self {
        Self {
            repository,
            activated: Mutex::new(HashMap::new()),
        }
    }

    pub fn repository(&self) -> &Arc<ActivatorRepository> {
        &self.repository
    }

    fn slot(&self, path: &Path) -> Arc<Mutex<Vec<Symbol>>> {
        let mut activated = lock(&self.activated);
        Arc::clone(activated.entry(path.to_path_buf()).or_default())
    }

    /// Units currently activated for the module at `path`
    pub fn activated_units(&self, path: &Path) -> Vec<Symbol> {
        let slot = lock(&self.activated).get(path).cloned();
        slot.map(|units| lock(&units).clone()).unwrap_or_default()
    }

    /// Offer every unit of `module` to the repository; returns how many were accepted
    ///
    /// A unit that fails to resolve or whose activator panics is skipped. The
    /// pass stops early if the module stops being current.
    pub fn activate_module(&self, module: &Arc<Module>) -> usize {
        let slot = self.slot(module.path());
        let mut activated = lock(&slot);
        self.release(module, &mut activated);

        let Some(table) = module.table() else {
            return 0;
        };
        for name in table.unit_names() {
            let unit = match table.lookup(&name, &ResolveContext::root()) {
                Ok(unit) => unit,
                Err(ModuleError::IllegalState(reason)) => {
                    debug!("Stopped activating {}: {}", module, reason);
                    break;
                }
                Err(e) => {
                    warn!("Cannot activate {} from {}: {}", name, module, e);
                    continue;
                }
            };

            match catch_unwind(AssertUnwindSafe(|| self.repository.activate(&unit))) {
                Ok(true) => activated.push(unit),
                Ok(false) => {}
                Err(panic) => {
                    warn!("Activator panicked on {}: {}", name, panic_message(panic.as_ref()));
                }
            }
        }
        activated.len()
    }

    /// Deactivate every remembered unit of `module`; returns how many there were
    pub fn deactivate_module(&self, module: &Module) -> usize {
        let slot = self.slot(module.path());
        let mut activated = lock(&slot);
        self.release(module, &mut activated)
    }

    fn release(&self, module: &Module, activated: &mut Vec<Symbol>) -> usize {
        let units = std::mem::take(activated);
        for unit in &units {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| self.repository.deactivate(unit))) {
                warn!(
                    "Activator panicked deactivating {} of {}: {}",
                    unit.name(),
                    module.name(),
                    panic_message(panic.as_ref())
                );
            }
        }
        units.len()
    }
}

impl ModuleListener for ModuleActivator {
    fn state_changed(&self, module: &Arc<Module>, state: ModuleState) {
        if state.is_active() {
            let count = self.activate_module(module);
            if count > 0 {
                info!("Activated {} units of {}", count, module);
            }
        } else {
            let count = self.deactivate_module(module);
            if count > 0 {
                info!("Deactivated {} units of {}", count, module);
            }
        }
    }
}
