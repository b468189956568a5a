//! Dynamic option values from remotely delivered config files.

use std::collections::HashMap;
use std::sync::Mutex;

use super::provider::{ConfigFiles, OptionValueProvider};

/// Serves the `dynamic` precedence level from config files pushed by the
/// remote-configuration client.
///
/// Files arrive as opaque filename → content blobs. Any file whose content
/// parses as TOML contributes its top-level scalar entries to the dynamic
/// table, keyed by the option's dynamic name; everything else stays opaque.
#[derive(Default)]
pub struct RemoteConfigProvider {
    values: Mutex<HashMap<String, String>>,
    files: Mutex<ConfigFiles>,
}

impl RemoteConfigProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stash freshly delivered files. The dynamic table refreshes on the
    /// next `update` fan-out, before any lookup observes the new values.
    pub fn store_config_files(&self, config_files: &ConfigFiles) {
        tracing::debug!(files = config_files.len(), "remote config files received");
        *self.files.lock().expect("config files lock poisoned") = config_files.clone();
    }

    /// The raw files as last delivered.
    pub fn config_files(&self) -> ConfigFiles {
        self.files.lock().expect("config files lock poisoned").clone()
    }

    fn parse(config_files: &ConfigFiles) -> HashMap<String, String> {
        let mut values = HashMap::new();
        for (filename, content) in config_files {
            let table = match content.parse::<toml::Table>() {
                Ok(table) => table,
                Err(err) => {
                    tracing::debug!(filename = %filename, error = %err, "config file is not TOML, leaving opaque");
                    continue;
                }
            };
            for (key, value) in table {
                let rendered = match value {
                    toml::Value::String(s) => s,
                    toml::Value::Integer(i) => i.to_string(),
                    toml::Value::Float(f) => f.to_string(),
                    toml::Value::Boolean(b) => b.to_string(),
                    _ => continue,
                };
                values.insert(key, rendered);
            }
        }
        values
    }
}

impl OptionValueProvider for RemoteConfigProvider {
    fn environment_value(&self, _name: &str) -> Option<String> {
        None
    }

    fn ini_value(&self, _name: &str) -> Option<String> {
        None
    }

    fn dynamic_value(&self, name: &str) -> Option<String> {
        self.values
            .lock()
            .expect("dynamic value lock poisoned")
            .get(name)
            .cloned()
    }

    fn update(&self, config_files: &ConfigFiles) {
        let merged = if config_files.is_empty() {
            // Fan-out with no files re-reads the last delivery.
            Self::parse(&self.config_files())
        } else {
            *self.files.lock().expect("config files lock poisoned") = config_files.clone();
            Self::parse(config_files)
        };
        let parsed = merged.len();
        *self.values.lock().expect("dynamic value lock poisoned") = merged;
        tracing::debug!(values = parsed, "dynamic option table refreshed");
    }
}
