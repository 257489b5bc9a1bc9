//! Lazy service handles
//!
//! A [`ServiceHandle`] stands in for a symbol exported by some module. It
//! resolves and instantiates on first use, then keeps the instance until the
//! owning module leaves ACTIVE or moves to another version, at which point
//! the next call resolves again. Callers never see the rebinding.

use std::any::type_name;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use tracing::debug;

use crate::module::api::events::ListenerId;
use crate::module::lifecycle::Module;
use crate::module::manager::ModuleManager;
use crate::module::traits::{ModuleError, ModuleListener, ModuleState};
use crate::utils::lock::lock;

/// Lazily-bound reference to the service exported as a symbol
///
/// Clones share one binding.
pub struct ServiceHandle<C>
where
    C: ?Sized + Send + Sync + 'static,
{
    shared: Arc<HandleShared<C>>,
}

struct HandleShared<C>
where
    C: ?Sized + Send + Sync + 'static,
{
    manager: Weak<ModuleManager>,
    symbol: String,
    binding: Mutex<Option<Binding<C>>>,
}

struct Binding<C>
where
    C: ?Sized + Send + Sync + 'static,
{
    instance: Arc<C>,
    owner: Arc<Module>,
    version: u64,
    subscription: ListenerId,
}

/// Drops the binding once its owner leaves ACTIVE
struct OwnerListener<C>
where
    C: ?Sized + Send + Sync + 'static,
{
    handle: Weak<HandleShared<C>>,
}

impl<C> ModuleListener for OwnerListener<C>
where
    C: ?Sized + Send + Sync + 'static,
{
    fn state_changed(&self, module: &Arc<Module>, state: ModuleState) {
        if state.is_active() {
            return;
        }
        if let Some(handle) = self.handle.upgrade() {
            handle.release_if_owned_by(module);
        }
    }
}

impl<C> HandleShared<C>
where
    C: ?Sized + Send + Sync + 'static,
{
    /// Instance of a still-valid binding; a stale binding is dropped
    fn current(&self) -> Option<Arc<C>> {
        let mut binding = lock(&self.binding);
        let valid = binding
            .as_ref()
            .map(|b| b.owner.is_active() && b.owner.version() == b.version)?;
        if valid {
            return binding.as_ref().map(|b| Arc::clone(&b.instance));
        }
        let stale = binding.take();
        drop(binding);
        if let Some(stale) = stale {
            stale.owner.remove_listener(stale.subscription);
        }
        None
    }

    fn release_if_owned_by(&self, module: &Module) {
        let released = {
            let mut binding = lock(&self.binding);
            match binding.as_ref() {
                Some(b) if b.owner.path() == module.path() => binding.take(),
                _ => None,
            }
        };
        if let Some(released) = released {
            released.owner.remove_listener(released.subscription);
            debug!("Service {} released from {}", self.symbol, module);
        }
    }

    fn release(&self) {
        let released = lock(&self.binding).take();
        if let Some(released) = released {
            released.owner.remove_listener(released.subscription);
        }
    }
}

impl<C> Drop for HandleShared<C>
where
    C: ?Sized + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.release();
    }
}

impl<C> ServiceHandle<C>
where
    C: ?Sized + Send + Sync + 'static,
{
    pub(crate) fn new(manager: Weak<ModuleManager>, symbol: String) -> Self {
        Self {
            shared: Arc::new(HandleShared {
                manager,
                symbol,
                binding: Mutex::new(None),
            }),
        }
    }

    /// Symbol this handle stands for
    pub fn symbol(&self) -> &str {
        &self.shared.symbol
    }

    /// Whether an instance is currently bound
    pub fn is_bound(&self) -> bool {
        lock(&self.shared.binding).is_some()
    }

    /// Module the current instance came from
    pub fn owner(&self) -> Option<Arc<Module>> {
        lock(&self.shared.binding)
            .as_ref()
            .map(|b| Arc::clone(&b.owner))
    }

    /// Drop the current binding; the next call resolves again
    pub fn invalidate(&self) {
        self.shared.release();
    }

    /// Current instance, resolving and instantiating if needed
    pub fn get(&self) -> Result<Arc<C>, ModuleError> {
        if let Some(instance) = self.shared.current() {
            return Ok(instance);
        }

        let manager = self.shared.manager.upgrade().ok_or_else(|| {
            ModuleError::IllegalState("module manager was dropped".to_string())
        })?;
        let symbol = manager
            .resolve(&self.shared.symbol)
            .map_err(|e| self.explain(&manager, e))?;
        let owner = symbol.owner().ok_or_else(|| {
            ModuleError::IllegalState(format!("owner of {} is gone", symbol.name()))
        })?;
        let instance = symbol.instantiate::<C>()?;

        let listener: Arc<dyn ModuleListener> = Arc::new(OwnerListener {
            handle: Arc::downgrade(&self.shared),
        });
        let subscription = owner.add_listener(listener);
        let binding = Binding {
            instance: Arc::clone(&instance),
            owner: Arc::clone(&owner),
            version: symbol.version(),
            subscription,
        };

        let previous = lock(&self.shared.binding).replace(binding);
        if let Some(previous) = previous {
            previous.owner.remove_listener(previous.subscription);
        }
        debug!("Service {} bound to {}", self.shared.symbol, owner);
        Ok(instance)
    }

    /// Run `op` against the current instance
    pub fn call<R, F>(&self, op: F) -> Result<R, ModuleError>
    where
        F: FnOnce(&C) -> R,
    {
        let instance = self.get()?;
        Ok(op(&instance))
    }

    /// A missing symbol whose owner is inactive is unavailable, not unknown
    ///
    /// The owner is the module that defined the symbol or, when a reload left
    /// it undefined, the module whose entries still export it.
    fn explain(&self, manager: &ModuleManager, error: ModuleError) -> ModuleError {
        if !matches!(error, ModuleError::NotFound(_)) {
            return error;
        }
        let owner = manager
            .find_owner(&self.shared.symbol)
            .or_else(|| manager.find_exporter(&self.shared.symbol));
        match owner {
            Some(owner) if !owner.is_active() => ModuleError::Unavailable {
                symbol: self.shared.symbol.clone(),
                module: owner.to_string(),
            },
            _ => error,
        }
    }
}

impl<C> Clone for ServiceHandle<C>
where
    C: ?Sized + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C> fmt::Debug for ServiceHandle<C>
where
    C: ?Sized + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("symbol", &self.shared.symbol)
            .field("capability", &type_name::<C>())
            .field("bound", &self.is_bound())
            .finish()
    }
}
