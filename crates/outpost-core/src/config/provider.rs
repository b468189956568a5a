//! Option value sources.

use std::collections::HashMap;

/// Config file blobs delivered by remote configuration, filename → content.
/// Opaque to the chain; parsed only by providers that opt in.
pub type ConfigFiles = HashMap<String, String>;

/// A source of option values.
///
/// Each lookup method addresses one precedence level and is queried with
/// that level's key from the option metadata. Returning `None` passes the
/// query to the next provider in the chain.
pub trait OptionValueProvider: Send + Sync {
    fn environment_value(&self, name: &str) -> Option<String>;
    fn ini_value(&self, name: &str) -> Option<String>;
    fn dynamic_value(&self, name: &str) -> Option<String>;

    /// Called when new config files arrive, before any lookup observes the
    /// new values. Providers without dynamic state ignore it.
    fn update(&self, config_files: &ConfigFiles);
}

/// The default provider: process environment plus a host-supplied ini reader.
pub struct EnvIniProvider {
    read_ini: Box<dyn Fn(&str) -> Option<String> + Send + Sync>,
}

impl EnvIniProvider {
    pub fn new(read_ini: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        Self {
            read_ini: Box::new(read_ini),
        }
    }

    /// For processes with no ini surface (the standalone daemon).
    pub fn env_only() -> Self {
        Self::new(|_| None)
    }
}

impl OptionValueProvider for EnvIniProvider {
    fn environment_value(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn ini_value(&self, name: &str) -> Option<String> {
        (self.read_ini)(name)
    }

    fn dynamic_value(&self, _name: &str) -> Option<String> {
        None
    }

    fn update(&self, _config_files: &ConfigFiles) {}
}
