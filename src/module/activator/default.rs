//! Built-in activator for activator units

use std::sync::Weak;
use tracing::{info, warn};

use crate::module::activator::{Activator, ActivatorRepository};
use crate::module::loader::Symbol;
use crate::module::registry::manifest::Marker;

/// Registers units marked [`ACTIVATOR_FOR`](crate::module::activator::ACTIVATOR_FOR)
/// as the activator for the marker type named by the marker's value
pub struct DefaultActivator {
    repository: Weak<ActivatorRepository>,
}

impl DefaultActivator {
    pub(crate) fn new(repository: Weak<ActivatorRepository>) -> Self {
        Self { repository }
    }
}

impl Activator for DefaultActivator {
    fn activate(&self, unit: &Symbol, marker: &Marker) -> bool {
        let Some(target) = marker.value.as_deref().filter(|v| !v.is_empty()) else {
            warn!("{} is marked as an activator without a marker type", unit.name());
            return false;
        };
        let Some(repository) = self.repository.upgrade() else {
            return false;
        };

        match unit.instantiate::<dyn Activator>() {
            Ok(activator) => {
                repository.register_from(target, activator, unit.clone());
                info!("{} now handles marker type {}", unit, target);
                true
            }
            Err(e) => {
                warn!("Cannot instantiate activator {}: {}", unit.name(), e);
                false
            }
        }
    }

    fn deactivate(&self, unit: &Symbol, marker: &Marker) {
        let (Some(target), Some(repository)) = (marker.value.as_deref(), self.repository.upgrade()) else {
            return;
        };
        if repository.unregister_from(target, unit) {
            info!("{} no longer handles marker type {}", unit, target);
        }
    }
}
