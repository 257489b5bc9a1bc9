//! Modulo runtime binary
//!
//! Watches module directories, keeps modules loaded and reloaded as their
//! artifacts change, and optionally invokes a service by symbol name. The
//! service is called again, and the module graph printed, after every poll
//! that changed something.
//!
//! Usage:
//!   modulo --modules-dir <dir> [--service <symbol>] [--once]

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use modulo_runtime::config::RuntimeConfig;
use modulo_runtime::module::validation::ManifestValidator;
use modulo_runtime::module::{
    Callable, FsArtifactSource, ModuleManager, ModuleWatcher, ServiceHandle, UnitCatalog,
};
use modulo_runtime::utils::{init_logging_from_config, log_error, watcher_shutdown};

#[cfg(not(target_os = "windows"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser, Debug)]
#[command(name = "modulo", version, about = "Dynamic module runtime with hot reload")]
struct Args {
    /// Configuration file (TOML, or JSON with a .json extension)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Module directory to watch; repeatable, replaces configured roots
    #[arg(long = "modules-dir", short = 'm')]
    modules_dirs: Vec<PathBuf>,

    /// Symbol of a callable service to invoke after loading
    #[arg(long, short)]
    service: Option<String>,

    /// Poll interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Log filter (RUST_LOG takes precedence)
    #[arg(long)]
    log_filter: Option<String>,

    /// Load once, report and exit instead of watching
    #[arg(long)]
    once: bool,
}

fn load_config(args: &Args) -> anyhow::Result<RuntimeConfig> {
    let mut config = match &args.config {
        Some(path) => RuntimeConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => RuntimeConfig::default(),
    };
    config.apply_env_overrides();

    if !args.modules_dirs.is_empty() {
        config.modules.roots = args.modules_dirs.clone();
    }
    if let Some(interval) = args.interval_ms {
        config.watcher.poll_interval_ms = interval;
    }
    if let Some(filter) = &args.log_filter {
        config.logging.get_or_insert_with(Default::default).filter = Some(filter.clone());
    }

    config.validate()?;
    Ok(config)
}

fn invoke(handle: &ServiceHandle<dyn Callable>) -> anyhow::Result<Option<String>> {
    match handle.get() {
        Ok(service) => Ok(Some(service.call()?)),
        Err(e) if e.is_recoverable() => {
            info!("Service {} is not available yet: {}", handle.symbol(), e);
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// One line per module: `name:version(STATE) -> [dep {symbols}, ...]`
fn print_modules(manager: &ModuleManager) {
    for module in manager.modules() {
        let dependencies: Vec<String> = module
            .dependencies()
            .iter()
            .map(|dependency| {
                let symbols = module.dependency_symbols(dependency);
                if symbols.is_empty() {
                    dependency.name().to_string()
                } else {
                    format!("{} {{{}}}", dependency.name(), symbols.join(", "))
                }
            })
            .collect();
        println!("{} -> [{}]", module, dependencies.join(", "));
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    init_logging_from_config(config.logging.as_ref());

    let catalog = UnitCatalog::with_builtins();
    let source = FsArtifactSource::new(config.modules.artifact_suffix.clone())
        .with_validator(ManifestValidator::new().with_catalog(&catalog));
    let manager = ModuleManager::with_config(Arc::new(source), catalog, config.modules.clone());

    let mut watcher = ModuleWatcher::from_config(Arc::clone(&manager), &config.watcher);
    for root in &config.modules.roots {
        watcher.watch(root.clone());
    }

    let report = watcher.poll();
    info!(
        "Loaded {} modules from {} roots",
        report.added.len(),
        watcher.roots().len()
    );

    // The same handle is reused across polls and rebinds after reloads
    let handle = args
        .service
        .as_deref()
        .map(|symbol| manager.service::<dyn Callable>(symbol));
    let report_state = move |manager: &ModuleManager| {
        if let Some(handle) = &handle {
            let context = format!("Service {} failed", handle.symbol());
            if let Some(Some(output)) = log_error(|| invoke(handle), &context) {
                println!("{}", output);
            }
        }
        print_modules(manager);
    };

    report_state(manager.as_ref());
    if args.once {
        return Ok(());
    }

    let interval = Duration::from_millis(config.watcher.poll_interval_ms);
    let polled = Arc::clone(&manager);
    watcher
        .run_with(interval, watcher_shutdown(), move |_| report_state(polled.as_ref()))
        .await;
    info!("Modulo runtime stopped");
    Ok(())
}
