//! Listener plumbing shared by modules and the manager

pub mod events;

pub use events::{ListenerId, ListenerSet};
