//! Marker type to activator registry

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use crate::module::activator::{Activator, DefaultActivator, ACTIVATOR_FOR};
use crate::module::loader::Symbol;
use crate::utils::lock::{read, write};

struct Registration {
    activator: Arc<dyn Activator>,
    /// Unit the activator was instantiated from, if any
    origin: Option<Symbol>,
}

/// Registry of activators keyed by marker type
///
/// Owned by the module manager. Created with the built-in
/// [`DefaultActivator`] registered for [`ACTIVATOR_FOR`].
pub struct ActivatorRepository {
    activators: RwLock<HashMap<String, Registration>>,
}

impl ActivatorRepository {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak| {
            let mut activators = HashMap::new();
            activators.insert(
                ACTIVATOR_FOR.to_string(),
                Registration {
                    activator: Arc::new(DefaultActivator::new(weak.clone())) as Arc<dyn Activator>,
                    origin: None,
                },
            );
            ActivatorRepository {
                activators: RwLock::new(activators),
            }
        })
    }

    /// Register `activator` for `marker_type`, replacing any previous one
    pub fn register(&self, marker_type: impl Into<String>, activator: Arc<dyn Activator>) {
        self.insert(marker_type.into(), activator, None);
    }

    pub(crate) fn register_from(&self, marker_type: &str, activator: Arc<dyn Activator>, origin: Symbol) {
        self.insert(marker_type.to_string(), activator, Some(origin));
    }

    fn insert(&self, marker_type: String, activator: Arc<dyn Activator>, origin: Option<Symbol>) {
        let replaced = write(&self.activators)
            .insert(marker_type.clone(), Registration { activator, origin })
            .is_some();
        if replaced {
            warn!("Replaced activator for marker type {}", marker_type);
        } else {
            info!("Registered activator for marker type {}", marker_type);
        }
    }

    /// Remove the activator for `marker_type`
    pub fn unregister(&self, marker_type: &str) -> bool {
        write(&self.activators).remove(marker_type).is_some()
    }

    /// Remove the registration for `marker_type` only if it came from `origin`
    pub(crate) fn unregister_from(&self, marker_type: &str, origin: &Symbol) -> bool {
        let mut activators = write(&self.activators);
        let owned = activators
            .get(marker_type)
            .and_then(|r| r.origin.as_ref())
            .is_some_and(|o| o.same_as(origin));
        if owned {
            activators.remove(marker_type);
        }
        owned
    }

    pub fn get(&self, marker_type: &str) -> Option<Arc<dyn Activator>> {
        read(&self.activators)
            .get(marker_type)
            .map(|r| Arc::clone(&r.activator))
    }

    pub fn contains(&self, marker_type: &str) -> bool {
        read(&self.activators).contains_key(marker_type)
    }

    /// Registered marker types, sorted
    pub fn marker_types(&self) -> Vec<String> {
        let mut types: Vec<String> = read(&self.activators).keys().cloned().collect();
        types.sort();
        types
    }

    /// Offer `unit` to the activator of each of its markers
    ///
    /// Returns whether at least one activator accepted the unit.
    pub fn activate(&self, unit: &Symbol) -> bool {
        let mut accepted = false;
        for marker in unit.markers() {
            let Some(activator) = self.get(&marker.marker_type) else {
                continue;
            };
            if activator.activate(unit, marker) {
                debug!("{} activated for marker {}", unit.name(), marker.marker_type);
                accepted = true;
            }
        }
        accepted
    }

    /// Call every registered activator's `deactivate` for the unit's markers
    pub fn deactivate(&self, unit: &Symbol) {
        for marker in unit.markers() {
            if let Some(activator) = self.get(&marker.marker_type) {
                activator.deactivate(unit, marker);
            }
        }
    }
}
