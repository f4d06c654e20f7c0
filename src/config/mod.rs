//! Property sources the dev service reads its configuration from.
//!
//! The rest of the crate only sees the [`PropertySource`] trait. Three
//! implementations are provided:
//!
//! - [`PropertyMap`]: an in-memory map, usually loaded from a TOML file whose
//!   nested tables flatten into dotted property names
//! - [`EnvPropertySource`]: process environment, looked up with the
//!   MicroProfile name mapping (`amqp-host` also matches `AMQP_HOST`)
//! - [`LayeredPropertySource`]: several sources, first one wins

pub mod devservices;

pub use devservices::{DevServicesConfig, LaunchMode};

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::error::ConfigError;

/// Read access to the resolved configuration properties of the application.
pub trait PropertySource: Send + Sync {
    /// Every property name this source knows about.
    fn property_names(&self) -> BTreeSet<String>;

    /// Value of a property, if set.
    fn value(&self, name: &str) -> Option<String>;

    /// Whether a property is set. Empty values count as absent.
    fn is_present(&self, name: &str) -> bool {
        self.value(name).is_some_and(|v| !v.is_empty())
    }
}

/// In-memory property source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyMap {
    entries: BTreeMap<String, String>,
}

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a property, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.entries.insert(name.into(), value.into());
        self
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.entries.remove(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse TOML text into dotted properties.
    ///
    /// `[mp.messaging.incoming.prices] connector = "smallrye-amqp"` becomes
    /// `mp.messaging.incoming.prices.connector`. Quoted keys keep their dots,
    /// so `"amqp-host" = "broker"` stays a single name. Arrays are joined with
    /// commas.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        let table: toml::Table = text.parse()?;
        let mut map = Self::new();
        flatten_table("", &table, &mut map.entries);
        Ok(map)
    }

    /// Load a TOML property file.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PropertyMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl PropertySource for PropertyMap {
    fn property_names(&self) -> BTreeSet<String> {
        self.entries.keys().cloned().collect()
    }

    fn value(&self, name: &str) -> Option<String> {
        self.entries.get(name).cloned()
    }
}

fn flatten_table(prefix: &str, table: &toml::Table, out: &mut BTreeMap<String, String>) {
    for (key, value) in table {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            toml::Value::Table(inner) => flatten_table(&name, inner, out),
            other => {
                out.insert(name, scalar_to_string(other));
            }
        }
    }
}

fn scalar_to_string(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Integer(i) => i.to_string(),
        toml::Value::Float(f) => f.to_string(),
        toml::Value::Boolean(b) => b.to_string(),
        toml::Value::Datetime(d) => d.to_string(),
        toml::Value::Array(items) => items
            .iter()
            .map(scalar_to_string)
            .collect::<Vec<_>>()
            .join(","),
        toml::Value::Table(_) => String::new(),
    }
}

/// Process environment as a property source.
///
/// Lookups try the exact name, then the name with every non-alphanumeric
/// character replaced by `_`, then that upper-cased.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvPropertySource;

impl EnvPropertySource {
    fn candidates(name: &str) -> [String; 3] {
        let sanitized: String = name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let upper = sanitized.to_ascii_uppercase();
        [name.to_string(), sanitized, upper]
    }
}

impl PropertySource for EnvPropertySource {
    fn property_names(&self) -> BTreeSet<String> {
        std::env::vars_os()
            .filter_map(|(k, _)| k.into_string().ok())
            .collect()
    }

    fn value(&self, name: &str) -> Option<String> {
        Self::candidates(name)
            .iter()
            .find_map(|candidate| std::env::var(candidate).ok())
    }
}

/// Ordered stack of property sources. Earlier layers override later ones.
#[derive(Default)]
pub struct LayeredPropertySource {
    layers: Vec<Box<dyn PropertySource>>,
}

impl LayeredPropertySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a layer with lower priority than every layer added so far.
    pub fn with_layer(mut self, source: impl PropertySource + 'static) -> Self {
        self.layers.push(Box::new(source));
        self
    }
}

impl PropertySource for LayeredPropertySource {
    fn property_names(&self) -> BTreeSet<String> {
        self.layers
            .iter()
            .flat_map(|layer| layer.property_names())
            .collect()
    }

    fn value(&self, name: &str) -> Option<String> {
        self.layers.iter().find_map(|layer| layer.value(name))
    }

    // Same layer as `value`, so an empty override hides lower layers.
    fn is_present(&self, name: &str) -> bool {
        self.layers
            .iter()
            .find(|layer| layer.value(name).is_some())
            .is_some_and(|layer| layer.is_present(name))
    }
}
