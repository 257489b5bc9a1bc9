//! Symbol definition and resolution
//!
//! Per-module symbol tables, the resolve context threaded through lookups
//! and the catalog of unit factories linked into the host.

pub mod catalog;
pub mod context;
pub mod symbol;
pub mod table;

pub use catalog::{Instance, UnitCatalog, UnitContext, UnitFactory};
pub use context::ResolveContext;
pub use symbol::Symbol;
pub use table::SymbolTable;
