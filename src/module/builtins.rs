//! Built-in unit kinds
//!
//! `template` units implement [`Callable`] by filling a template, optionally
//! with the output of another callable resolved through the owning module.
//! `log_activator` units are activators that log what they are offered.

use std::sync::Arc;
use tracing::info;

use crate::module::activator::Activator;
use crate::module::loader::{Symbol, UnitCatalog, UnitContext};
use crate::module::registry::manifest::Marker;

pub const TEMPLATE_KIND: &str = "template";
pub const LOG_ACTIVATOR_KIND: &str = "log_activator";

/// Capability of services invoked by name
pub trait Callable: Send + Sync {
    fn call(&self) -> anyhow::Result<String>;
}

/// Register every built-in kind in `catalog`
pub fn register_builtins(catalog: &mut UnitCatalog) {
    catalog.register::<dyn Callable, _>(TEMPLATE_KIND, build_template);
    catalog.register::<dyn Activator, _>(LOG_ACTIVATOR_KIND, |ctx| {
        Ok(Arc::new(LoggingActivator::from_context(ctx)) as Arc<dyn Activator>)
    });
}

/// Fills `template`, replacing each `{}` with the output of `source`
struct TemplateService {
    template: String,
    source: Option<Arc<dyn Callable>>,
}

fn build_template(ctx: &UnitContext<'_>) -> anyhow::Result<Arc<dyn Callable>> {
    let source = match ctx.get_config("source") {
        Some(name) => Some(ctx.require::<dyn Callable>(name)?),
        None => None,
    };
    Ok(Arc::new(TemplateService {
        template: ctx.get_config_or("template", ctx.symbol().name()),
        source,
    }))
}

impl Callable for TemplateService {
    fn call(&self) -> anyhow::Result<String> {
        match &self.source {
            Some(source) if self.template.contains("{}") => {
                let value = source.call()?;
                Ok(self.template.replace("{}", &value))
            }
            _ => Ok(self.template.clone()),
        }
    }
}

/// Activator that accepts units only when configured with `accept = true`
pub struct LoggingActivator {
    name: String,
    accept: bool,
}

impl LoggingActivator {
    fn from_context(ctx: &UnitContext<'_>) -> Self {
        Self {
            name: ctx.symbol().name().to_string(),
            accept: ctx.get_config("accept") == Some("true"),
        }
    }
}

impl Activator for LoggingActivator {
    fn activate(&self, unit: &Symbol, marker: &Marker) -> bool {
        let value = marker.value.as_deref().unwrap_or_default();
        info!(
            "[{}] activate {} ({} {}) accepted={}",
            self.name, unit.name(), marker.marker_type, value, self.accept
        );
        self.accept
    }

    fn deactivate(&self, unit: &Symbol, marker: &Marker) {
        info!("[{}] deactivate {} ({})", self.name, unit.name(), marker.marker_type);
    }
}
