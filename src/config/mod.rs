//! Configuration management for the module runtime
//!
//! Handles configuration loading (TOML or JSON), environment overrides and
//! validation.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::utils::env::{env_flag, env_int, env_opt};

/// Default file-name suffix of module artifacts
pub const DEFAULT_ARTIFACT_SUFFIX: &str = ".mod.toml";

/// Module system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Directories scanned for module artifacts
    #[serde(default = "default_roots")]
    pub roots: Vec<PathBuf>,

    /// File-name suffix identifying module artifacts
    #[serde(default = "default_artifact_suffix")]
    pub artifact_suffix: String,

    /// Record which symbols each dependency edge was created for
    #[serde(default = "default_true")]
    pub collect_symbols: bool,

    /// Run the activation adapter on every module state change
    #[serde(default = "default_true")]
    pub auto_activate: bool,
}

fn default_true() -> bool {
    true
}

fn default_roots() -> Vec<PathBuf> {
    vec![PathBuf::from("modules")]
}

fn default_artifact_suffix() -> String {
    DEFAULT_ARTIFACT_SUFFIX.to_string()
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            roots: default_roots(),
            artifact_suffix: default_artifact_suffix(),
            collect_symbols: true,
            auto_activate: true,
        }
    }
}

/// Artifact watcher configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Poll interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Warn when the dependency graph contains a cycle
    #[serde(default = "default_true")]
    pub report_cycles: bool,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            report_cycles: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter (e.g. "info", "modulo_runtime::module=debug"); RUST_LOG wins when set
    #[serde(default)]
    pub filter: Option<String>,

    /// Emit JSON lines (requires the `json-logging` feature)
    #[serde(default)]
    pub json_format: bool,
}

/// Runtime configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub modules: ModuleConfig,

    #[serde(default)]
    pub watcher: WatcherConfig,

    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

impl RuntimeConfig {
    /// Load configuration from a TOML file
    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RuntimeConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RuntimeConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration, picking the format from the file extension
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_file(path),
            _ => Self::from_toml_file(path),
        }
    }

    /// Save configuration to JSON file
    pub fn to_json_file(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `MODULO_*` environment overrides
    ///
    /// `MODULO_MODULES_DIR` replaces the roots (colon-separated),
    /// `MODULO_COLLECT_SYMBOLS` and `MODULO_AUTO_ACTIVATE` set the flags,
    /// `MODULO_POLL_INTERVAL_MS` sets the poll interval and
    /// `MODULO_LOG_FILTER` sets the log filter.
    pub fn apply_env_overrides(&mut self) {
        if let Some(dirs) = env_opt("MODULO_MODULES_DIR") {
            self.modules.roots = std::env::split_paths(&dirs).collect();
        }
        if let Some(collect) = env_flag("MODULO_COLLECT_SYMBOLS") {
            self.modules.collect_symbols = collect;
        }
        if let Some(activate) = env_flag("MODULO_AUTO_ACTIVATE") {
            self.modules.auto_activate = activate;
        }
        if let Some(interval) = env_int::<u64>("MODULO_POLL_INTERVAL_MS") {
            self.watcher.poll_interval_ms = interval;
        }
        if let Some(filter) = env_opt("MODULO_LOG_FILTER") {
            self.logging.get_or_insert_with(LoggingConfig::default).filter = Some(filter);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.modules.roots.is_empty() {
            return Err(anyhow::anyhow!("at least one module root is required"));
        }

        let suffix = &self.modules.artifact_suffix;
        if suffix.is_empty() || !suffix.starts_with('.') {
            return Err(anyhow::anyhow!(
                "artifact_suffix must start with '.', got '{}'",
                suffix
            ));
        }

        if self.watcher.poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("poll_interval_ms must be greater than 0"));
        }

        Ok(())
    }
}
