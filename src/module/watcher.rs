//! Artifact watcher
//!
//! Polls the artifact source for new, changed and vanished artifacts and
//! feeds the results into the module core. One poll runs five steps in
//! order: scan roots (load new artifacts, invalidate changed ones), unload
//! vanished ones, re-evaluate FROZEN modules, reload INVALIDATED modules with
//! dependencies first, and report dependency cycles.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::WatcherConfig;
use crate::module::lifecycle::Module;
use crate::module::manager::ModuleManager;
use crate::module::traits::{ModuleError, ModuleState};

/// Outcome of one poll
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Artifacts seen for the first time (or again after vanishing)
    pub added: Vec<PathBuf>,
    /// Artifacts whose modification time changed
    pub changed: Vec<PathBuf>,
    /// Artifacts that vanished
    pub removed: Vec<PathBuf>,
    /// Modules that left FROZEN
    pub thawed: Vec<PathBuf>,
    /// Modules reloaded from INVALIDATED
    pub reloaded: Vec<PathBuf>,
}

impl PollReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.changed.is_empty()
            && self.removed.is_empty()
            && self.thawed.is_empty()
            && self.reloaded.is_empty()
    }
}

pub struct ModuleWatcher {
    manager: Arc<ModuleManager>,
    roots: Vec<PathBuf>,
    /// Last seen modification time per artifact
    tracked: HashMap<PathBuf, Option<SystemTime>>,
    report_cycles: bool,
}

impl ModuleWatcher {
    pub fn new(manager: Arc<ModuleManager>) -> Self {
        Self {
            manager,
            roots: Vec::new(),
            tracked: HashMap::new(),
            report_cycles: true,
        }
    }

    pub fn from_config(manager: Arc<ModuleManager>, config: &WatcherConfig) -> Self {
        let mut watcher = Self::new(manager);
        watcher.report_cycles = config.report_cycles;
        watcher
    }

    /// Add a directory to scan
    pub fn watch(&mut self, root: impl Into<PathBuf>) {
        let root = root.into();
        if !self.roots.contains(&root) {
            info!("Watching {} for module artifacts", root.display());
            self.roots.push(root);
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn manager(&self) -> &Arc<ModuleManager> {
        &self.manager
    }

    /// Run one poll cycle
    pub fn poll(&mut self) -> PollReport {
        let mut report = PollReport::default();
        let failed_roots = self.scan(&mut report);
        self.unload_vanished(&failed_roots, &mut report);
        self.thaw(&mut report);
        self.reload(&mut report);

        if !report.is_empty() {
            debug!("Poll report: {:?}", report);
        }
        report
    }

    /// Step 1; returns the roots that could not be scanned
    fn scan(&mut self, report: &mut PollReport) -> Vec<PathBuf> {
        let source = Arc::clone(self.manager.source());
        let mut failed = Vec::new();

        for root in &self.roots {
            let artifacts = match source.discover(root) {
                Ok(artifacts) => artifacts,
                Err(e) => {
                    warn!("Cannot scan {}: {}", root.display(), e);
                    failed.push(root.clone());
                    continue;
                }
            };

            for path in artifacts {
                let modified = source.last_modified(&path);
                match self.tracked.insert(path.clone(), modified) {
                    None => {
                        let known = self.manager.is_registered(&path);
                        let module = self.manager.load_module(&path);
                        if known {
                            refresh(&module);
                        }
                        report.added.push(path);
                    }
                    Some(previous) if previous != modified => {
                        if let Some(module) = self.manager.module(&path) {
                            refresh(&module);
                        }
                        report.changed.push(path);
                    }
                    Some(_) => {}
                }
            }
        }
        failed
    }

    /// Step 2
    fn unload_vanished(&mut self, failed_roots: &[PathBuf], report: &mut PollReport) {
        let source = Arc::clone(self.manager.source());
        let vanished: Vec<PathBuf> = self
            .tracked
            .keys()
            .filter(|path| !failed_roots.iter().any(|root| path.starts_with(root)))
            .filter(|path| !source.exists(path))
            .cloned()
            .collect();

        for path in vanished {
            self.tracked.remove(&path);
            if let Some(module) = self.manager.module(&path) {
                module.unload();
            }
            info!("Module artifact {} vanished", path.display());
            report.removed.push(path);
        }
    }

    /// Step 3: repeat until no FROZEN module changes
    fn thaw(&self, report: &mut PollReport) {
        loop {
            let mut progressed = false;
            for module in self.manager.modules() {
                if module.state() == ModuleState::Frozen
                    && module.evaluate_state() != ModuleState::Frozen
                {
                    report.thawed.push(module.path().to_path_buf());
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }
    }

    /// Steps 4 and 5
    fn reload(&self, report: &mut PollReport) {
        let order = match self.manager.dependency_order() {
            Ok(order) => order,
            Err(ModuleError::DependencyCycle(stuck)) => {
                if self.report_cycles {
                    warn!("Module dependency cycle, reload order is arbitrary: {:?}", stuck);
                }
                self.manager.modules()
            }
            Err(e) => {
                warn!("Cannot order modules for reload: {}", e);
                self.manager.modules()
            }
        };

        for module in order {
            if module.state() != ModuleState::Invalidated {
                continue;
            }
            match module.update() {
                Ok(ModuleState::Active) => report.reloaded.push(module.path().to_path_buf()),
                Ok(state) => debug!("{} reload ended in {}", module, state),
                Err(e) => warn!("Reload of {} failed: {}", module.path().display(), e),
            }
        }
    }

    /// Poll every `interval` until `shutdown` turns true or its sender is dropped
    pub async fn run(self, interval: Duration, shutdown: watch::Receiver<bool>) {
        self.run_with(interval, shutdown, |_| {}).await
    }

    /// Like [`run`](Self::run), calling `on_change` after every poll that
    /// changed something
    pub async fn run_with<F>(
        mut self,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
        mut on_change: F,
    ) where
        F: FnMut(&PollReport),
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.poll();
                    if !report.is_empty() {
                        info!(
                            "Modules: {} added, {} changed, {} removed, {} thawed, {} reloaded",
                            report.added.len(),
                            report.changed.len(),
                            report.removed.len(),
                            report.thawed.len(),
                            report.reloaded.len()
                        );
                        on_change(&report);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Module watcher stopping");
                        break;
                    }
                }
            }
        }
    }
}

/// Reconcile a known module with a new or changed artifact
fn refresh(module: &Arc<Module>) {
    if module.state() == ModuleState::Unloaded {
        if let Err(e) = module.update() {
            warn!("Cannot revive {}: {}", module.path().display(), e);
        }
    } else {
        module.invalidate();
    }
}
