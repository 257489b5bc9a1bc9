//! Module artifact manifest parsing
//!
//! A module artifact is a TOML manifest listing the units the module exports.
//! Each unit names the catalog `kind` that implements it, the symbols it
//! requires, its extension markers and a free-form config table.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::module::traits::ModuleError;

/// Entry-name suffix that marks a compiled unit inside an artifact
pub const UNIT_SUFFIX: &str = ".unit";

/// Module artifact manifest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    /// Display name (defaults to the artifact file name)
    #[serde(default)]
    pub name: Option<String>,
    /// Human-readable description
    #[serde(default)]
    pub description: Option<String>,
    /// Non-unit entries carried by the artifact
    #[serde(default)]
    pub resources: Vec<String>,
    /// Exported units
    #[serde(default)]
    pub units: Vec<UnitDescriptor>,
}

/// One exported unit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitDescriptor {
    /// Fully-qualified symbol name (e.g. `svc.Greeter`)
    pub name: String,
    /// Factory key in the unit catalog
    pub kind: String,
    /// Symbols linked when the unit is first defined
    #[serde(default)]
    pub requires: Vec<String>,
    /// Extension markers declared on the unit
    #[serde(default)]
    pub markers: Vec<Marker>,
    /// Unit configuration, flattened to dotted string keys
    #[serde(default, deserialize_with = "flatten_config")]
    pub config: HashMap<String, String>,
}

/// Declarative extension marker
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Marker {
    /// Marker type; selects the activator
    #[serde(rename = "type")]
    pub marker_type: String,
    /// Marker argument
    #[serde(default)]
    pub value: Option<String>,
}

impl Marker {
    pub fn new(marker_type: impl Into<String>) -> Self {
        Self {
            marker_type: marker_type.into(),
            value: None,
        }
    }

    pub fn with_value(marker_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            marker_type: marker_type.into(),
            value: Some(value.into()),
        }
    }
}

impl UnitDescriptor {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            ..Default::default()
        }
    }

    pub fn with_marker(mut self, marker: Marker) -> Self {
        self.markers.push(marker);
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn requiring(mut self, symbol: impl Into<String>) -> Self {
        self.requires.push(symbol.into());
        self
    }

    /// Entry name this unit is stored under
    pub fn entry_name(&self) -> String {
        entry_name(&self.name)
    }
}

/// `svc.Greeter` -> `svc/Greeter.unit`
pub fn entry_name(symbol: &str) -> String {
    format!("{}{}", symbol.replace('.', "/"), UNIT_SUFFIX)
}

/// `svc/Greeter.unit` -> `svc.Greeter`; `None` for entries without the unit suffix
pub fn symbol_name(entry: &str) -> Option<String> {
    entry
        .strip_suffix(UNIT_SUFFIX)
        .filter(|stem| !stem.is_empty())
        .map(|stem| stem.replace(['/', '\\'], "."))
}

impl ArtifactManifest {
    /// Load manifest from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ModuleError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ModuleError::unreadable(path, format!("failed to read manifest: {}", e)))?;
        Self::parse(&contents)
            .map_err(|e| ModuleError::unreadable(path, format!("failed to parse manifest: {}", e)))
    }

    /// Parse manifest TOML
    pub fn parse(contents: &str) -> Result<Self, ModuleError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn with_unit(mut self, unit: UnitDescriptor) -> Self {
        self.units.push(unit);
        self
    }

    /// Ordered entries: units first, then resources
    pub fn entries(&self) -> Vec<String> {
        self.units
            .iter()
            .map(UnitDescriptor::entry_name)
            .chain(self.resources.iter().cloned())
            .collect()
    }

    /// Unit stored under `entry`; the first definition wins on duplicates
    pub fn unit(&self, entry: &str) -> Option<&UnitDescriptor> {
        self.units.iter().find(|unit| unit.entry_name() == entry)
    }

    pub fn to_toml(&self) -> Result<String, ModuleError> {
        toml::to_string_pretty(self).map_err(|e| ModuleError::InvalidManifest(e.to_string()))
    }
}

fn flatten_config<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let table = toml::Table::deserialize(deserializer)?;
    let mut result = HashMap::new();
    for (key, value) in &table {
        flatten_toml_value(key.clone(), value, &mut result);
    }
    Ok(result)
}

/// Flatten TOML value to string hashmap
fn flatten_toml_value(prefix: String, value: &toml::Value, result: &mut HashMap<String, String>) {
    use toml::Value;

    match value {
        Value::String(s) => {
            result.insert(prefix, s.clone());
        }
        Value::Integer(i) => {
            result.insert(prefix, i.to_string());
        }
        Value::Float(f) => {
            result.insert(prefix, f.to_string());
        }
        Value::Boolean(b) => {
            result.insert(prefix, b.to_string());
        }
        Value::Array(arr) => {
            let values: Vec<String> = arr
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    _ => v.to_string(),
                })
                .collect();
            result.insert(prefix, values.join(","));
        }
        Value::Table(table) => {
            for (key, val) in table {
                let new_prefix = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_toml_value(new_prefix, val, result);
            }
        }
        Value::Datetime(dt) => {
            result.insert(prefix, dt.to_string());
        }
    }
}
