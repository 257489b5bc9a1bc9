//! Extension activation
//!
//! Units declare markers; an [`Activator`] registered for a marker type turns
//! marker-bearing units on and off. The repository of activators is itself
//! filled through markers: a unit carrying [`ACTIVATOR_FOR`] is instantiated
//! and registered for the marker type named in the marker's value.

pub mod default;
pub mod lifecycle;
pub mod repository;

use crate::module::loader::Symbol;
use crate::module::registry::manifest::Marker;

pub use default::DefaultActivator;
pub use lifecycle::ModuleActivator;
pub use repository::ActivatorRepository;

/// Marker type designating a unit as the activator for another marker type
pub const ACTIVATOR_FOR: &str = "activator_for";

/// Handler for one marker type
pub trait Activator: Send + Sync {
    /// Turn `unit` on for `marker`; returns whether the unit was accepted
    fn activate(&self, unit: &Symbol, marker: &Marker) -> bool;

    /// Turn `unit` off for `marker`
    fn deactivate(&self, unit: &Symbol, marker: &Marker);
}
