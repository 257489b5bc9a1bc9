//! Module dependency ordering
//!
//! Orders registered modules so dependencies come before their dependents.
//! Used by the watcher to reload invalidated modules bottom-up. Cycles are
//! reported, never broken.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use tracing::debug;

use crate::module::traits::ModuleError;

/// Dependency resolution result
#[derive(Debug, Clone)]
pub struct DependencyResolution {
    /// Modules in load order (dependencies first)
    pub load_order: Vec<PathBuf>,
    /// Module dependencies map, restricted to known modules
    pub dependencies: HashMap<PathBuf, Vec<PathBuf>>,
}

/// Dependency resolver
pub struct ModuleDependencies;

impl ModuleDependencies {
    /// Determine load order for `graph`, a list of (module, dependencies)
    ///
    /// Ties keep the input order. Dependencies on modules absent from the
    /// graph are ignored. Fails with [`ModuleError::DependencyCycle`] naming
    /// every module on or behind a cycle.
    pub fn resolve(graph: &[(PathBuf, Vec<PathBuf>)]) -> Result<DependencyResolution, ModuleError> {
        let known: HashMap<&PathBuf, usize> = graph
            .iter()
            .enumerate()
            .map(|(index, (module, _))| (module, index))
            .collect();

        let mut dependencies: HashMap<PathBuf, Vec<PathBuf>> = HashMap::new();
        for (module, deps) in graph {
            let deps: Vec<PathBuf> = deps
                .iter()
                .filter(|dep| known.contains_key(dep) && *dep != module)
                .cloned()
                .collect();
            dependencies.insert(module.clone(), deps);
        }

        let load_order = Self::topological_sort(graph, &known, &dependencies)
            .map_err(ModuleError::DependencyCycle)?;

        debug!("Dependency resolution complete: {:?}", load_order);

        Ok(DependencyResolution {
            load_order,
            dependencies,
        })
    }

    /// Kahn's algorithm; on failure returns the modules that could not be placed
    fn topological_sort(
        graph: &[(PathBuf, Vec<PathBuf>)],
        known: &HashMap<&PathBuf, usize>,
        dependencies: &HashMap<PathBuf, Vec<PathBuf>>,
    ) -> Result<Vec<PathBuf>, Vec<PathBuf>> {
        let mut in_degree = vec![0usize; graph.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); graph.len()];

        for (index, (module, _)) in graph.iter().enumerate() {
            for dep in dependencies.get(module).into_iter().flatten() {
                if let Some(&dep_index) = known.get(dep) {
                    dependents[dep_index].push(index);
                    in_degree[index] += 1;
                }
            }
        }

        let mut queue: VecDeque<usize> = (0..graph.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut result = Vec::with_capacity(graph.len());

        while let Some(index) = queue.pop_front() {
            result.push(graph[index].0.clone());
            for &dependent in &dependents[index] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    queue.push_back(dependent);
                }
            }
        }

        if result.len() != graph.len() {
            return Err((0..graph.len())
                .filter(|&i| in_degree[i] > 0)
                .map(|i| graph[i].0.clone())
                .collect());
        }

        Ok(result)
    }
}
