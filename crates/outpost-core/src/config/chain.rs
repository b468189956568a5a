//! Priority-ordered provider fallback.

use std::sync::Arc;

use super::provider::{ConfigFiles, OptionValueProvider};

/// Wraps an ordered list of providers; for each query the first `Some` from
/// the highest-priority provider wins. `update` fans out to every provider.
pub struct ProviderChain {
    providers: Vec<(i32, Arc<dyn OptionValueProvider>)>,
}

impl ProviderChain {
    /// Sorts descending by priority. Registration order breaks ties.
    pub fn new(mut providers: Vec<(i32, Arc<dyn OptionValueProvider>)>) -> Self {
        providers.sort_by_key(|(priority, _)| std::cmp::Reverse(*priority));
        Self { providers }
    }

    fn first<F>(&self, lookup: F) -> Option<String>
    where
        F: Fn(&dyn OptionValueProvider) -> Option<String>,
    {
        self.providers
            .iter()
            .find_map(|(_, provider)| lookup(provider.as_ref()))
    }
}

impl OptionValueProvider for ProviderChain {
    fn environment_value(&self, name: &str) -> Option<String> {
        self.first(|p| p.environment_value(name))
    }

    fn ini_value(&self, name: &str) -> Option<String> {
        self.first(|p| p.ini_value(name))
    }

    fn dynamic_value(&self, name: &str) -> Option<String> {
        self.first(|p| p.dynamic_value(name))
    }

    fn update(&self, config_files: &ConfigFiles) {
        for (_, provider) in &self.providers {
            provider.update(config_files);
        }
    }
}
