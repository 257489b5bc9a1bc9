//! Test utilities for module system testing
//!
//! Provides fixtures backed by a temporary directory or by in-memory
//! artifacts, a recording listener and counting activators.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use modulo_runtime::config::ModuleConfig;
use modulo_runtime::module::{
    Activator, ArtifactManifest, FsArtifactSource, Marker, MemoryArtifactSource, Module,
    ModuleListener, ModuleManager, ModuleState, Symbol, UnitCatalog, UnitDescriptor,
};

/// Test fixture with modules stored on disk
pub struct ModuleTestFixture {
    /// Temporary directory for test data
    pub temp_dir: TempDir,
    /// Modules directory path
    pub modules_dir: PathBuf,
    /// Module manager instance
    pub manager: Arc<ModuleManager>,
}

impl ModuleTestFixture {
    /// Create a new test fixture with an isolated modules directory
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        let modules_dir = temp_dir.path().join("modules");
        std::fs::create_dir_all(&modules_dir)?;

        let manager = ModuleManager::new(
            Arc::new(FsArtifactSource::default()),
            UnitCatalog::with_builtins(),
        );

        Ok(Self {
            temp_dir,
            modules_dir,
            manager,
        })
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.modules_dir.join(format!("{}.mod.toml", name))
    }

    /// Write (or overwrite) the artifact for module `name`
    pub fn write_module(
        &self,
        name: &str,
        manifest: &ArtifactManifest,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let path = self.path(name);
        std::fs::write(&path, manifest.to_toml()?)?;
        Ok(path)
    }

    pub fn load(&self, name: &str) -> Arc<Module> {
        self.manager.load_module(self.path(name))
    }
}

/// Test fixture with in-memory artifacts under `/modules`
pub struct MemoryFixture {
    pub source: Arc<MemoryArtifactSource>,
    pub manager: Arc<ModuleManager>,
}

impl MemoryFixture {
    pub fn new() -> Self {
        Self::with(UnitCatalog::with_builtins(), ModuleConfig::default())
    }

    pub fn with(catalog: UnitCatalog, config: ModuleConfig) -> Self {
        let source = Arc::new(MemoryArtifactSource::new());
        let manager = ModuleManager::with_config(source.clone(), catalog, config);
        Self { source, manager }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        PathBuf::from(format!("/modules/{}.mod.toml", name))
    }

    pub fn put(&self, name: &str, manifest: ArtifactManifest) -> PathBuf {
        let path = self.path(name);
        self.source.put(&path, manifest);
        path
    }

    pub fn load(&self, name: &str) -> Arc<Module> {
        self.manager.load_module(self.path(name))
    }

    /// Put and load in one step
    pub fn install(&self, name: &str, manifest: ArtifactManifest) -> Arc<Module> {
        self.put(name, manifest);
        self.load(name)
    }
}

impl Default for MemoryFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// `template` unit returning a fixed text
pub fn template(symbol: &str, text: &str) -> UnitDescriptor {
    UnitDescriptor::new(symbol, "template").with_config("template", text)
}

/// `template` unit that wraps the output of `source`
pub fn wrapping(symbol: &str, text: &str, source: &str) -> UnitDescriptor {
    template(symbol, text).with_config("source", source)
}

pub fn manifest(units: Vec<UnitDescriptor>) -> ArtifactManifest {
    units
        .into_iter()
        .fold(ArtifactManifest::default(), ArtifactManifest::with_unit)
}

/// Records every broadcast it receives
#[derive(Default)]
pub struct StateRecorder {
    events: Mutex<Vec<(String, ModuleState)>>,
}

impl StateRecorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<(String, ModuleState)> {
        self.events.lock().unwrap().clone()
    }

    /// States broadcast by the module named `name`, in order
    pub fn states_of(&self, name: &str) -> Vec<ModuleState> {
        self.events()
            .into_iter()
            .filter(|(module, _)| module == name)
            .map(|(_, state)| state)
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl ModuleListener for StateRecorder {
    fn state_changed(&self, module: &Arc<Module>, state: ModuleState) {
        self.events
            .lock()
            .unwrap()
            .push((module.name().to_string(), state));
    }
}

/// Shared counters for activators built by [`counting_catalog`]
#[derive(Default)]
pub struct ActivationCounters {
    pub activations: AtomicUsize,
    pub accepted: AtomicUsize,
    pub deactivations: AtomicUsize,
    pub instances: AtomicUsize,
}

impl ActivationCounters {
    pub fn activations(&self) -> usize {
        self.activations.load(Ordering::SeqCst)
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn deactivations(&self) -> usize {
        self.deactivations.load(Ordering::SeqCst)
    }

    pub fn instances(&self) -> usize {
        self.instances.load(Ordering::SeqCst)
    }
}

/// Accepts units whose marker value is not "reject"
pub struct CountingActivator {
    counters: Arc<ActivationCounters>,
}

impl CountingActivator {
    pub fn new(counters: Arc<ActivationCounters>) -> Self {
        Self { counters }
    }
}

impl Activator for CountingActivator {
    fn activate(&self, _unit: &Symbol, marker: &Marker) -> bool {
        self.counters.activations.fetch_add(1, Ordering::SeqCst);
        let accept = marker.value.as_deref() != Some("reject");
        if accept {
            self.counters.accepted.fetch_add(1, Ordering::SeqCst);
        }
        accept
    }

    fn deactivate(&self, _unit: &Symbol, _marker: &Marker) {
        self.counters.deactivations.fetch_add(1, Ordering::SeqCst);
    }
}

/// Built-in kinds plus `counting_activator`, `failing` and `panicking`
pub fn counting_catalog(counters: Arc<ActivationCounters>) -> UnitCatalog {
    let mut catalog = UnitCatalog::with_builtins();
    catalog.register::<dyn Activator, _>("counting_activator", move |_ctx| {
        counters.instances.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(CountingActivator::new(Arc::clone(&counters))) as Arc<dyn Activator>)
    });
    catalog.register::<dyn Activator, _>("failing", |ctx| {
        Err(anyhow::anyhow!("{} refuses to start", ctx.symbol().name()))
    });
    catalog.register::<dyn Activator, _>("panicking", |_ctx| -> anyhow::Result<Arc<dyn Activator>> {
        panic!("constructor blew up")
    });
    catalog
}
