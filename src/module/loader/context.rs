//! Resolution context
//!
//! Threaded explicitly through every resolve call instead of living in
//! thread-local state: it names the module on whose behalf the lookup runs
//! (the module that gets the dependency edge) and the chain of definitions
//! currently in progress, so a symbol that requires itself is reported
//! rather than recursed into.

use std::path::Path;
use std::sync::Arc;

use crate::module::lifecycle::Module;
use crate::module::traits::ModuleError;

#[derive(Debug, Clone, Default)]
pub struct ResolveContext {
    caller: Option<Arc<Module>>,
    chain: Vec<String>,
}

impl ResolveContext {
    /// Context for a lookup that no module initiated (application code)
    pub fn root() -> Self {
        Self::default()
    }

    /// Context for a lookup initiated by `module`
    pub fn for_caller(module: &Arc<Module>) -> Self {
        Self {
            caller: Some(Arc::clone(module)),
            chain: Vec::new(),
        }
    }

    pub fn caller(&self) -> Option<&Arc<Module>> {
        self.caller.as_ref()
    }

    /// Number of definitions in progress along this chain
    pub fn depth(&self) -> usize {
        self.chain.len()
    }

    pub(crate) fn on_behalf_of(&self, module: &Arc<Module>) -> Self {
        Self {
            caller: Some(Arc::clone(module)),
            chain: self.chain.clone(),
        }
    }

    pub(crate) fn defining(&self, artifact: &Path, symbol: &str) -> Result<Self, ModuleError> {
        let key = format!("{}#{}", artifact.display(), symbol);
        if self.chain.contains(&key) {
            let mut cycle = self.chain.clone();
            cycle.push(key);
            return Err(ModuleError::CyclicDefinition(cycle.join(" -> ")));
        }
        let mut chain = self.chain.clone();
        chain.push(key);
        Ok(Self {
            caller: self.caller.clone(),
            chain,
        })
    }
}
