//! Option resolution against the provider chain.

use std::sync::atomic::{AtomicU64, Ordering};

use super::chain::ProviderChain;
use super::provider::{ConfigFiles, OptionValueProvider};
use super::snapshot::{
    apply_option, display_option, option_metadata, ConfigurationSnapshot, OptionMetadata,
};

/// Recomputes option values from the chain and rewrites snapshots when, and
/// only when, something actually changed.
pub struct ConfigurationManager {
    chain: ProviderChain,
    updates: AtomicU64,
}

impl ConfigurationManager {
    pub fn new(chain: ProviderChain) -> Self {
        Self {
            chain,
            updates: AtomicU64::new(0),
        }
    }

    /// Refresh provider state from newly delivered config files. Does not
    /// touch any snapshot; the next `update_if_changed` observes the new
    /// provider state.
    pub fn update(&self, config_files: &ConfigFiles) {
        let update = self.updates.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(update, files = config_files.len(), "refreshing option providers");
        self.chain.update(config_files);
    }

    /// Recompute every option and rewrite `snapshot` if any value differs.
    ///
    /// The revision bumps by one per actual change; identical provider
    /// output leaves the snapshot untouched. The first call on a fresh
    /// snapshot always populates it and sets revision 1.
    pub fn update_if_changed(&self, snapshot: &mut ConfigurationSnapshot) -> bool {
        let mut next = ConfigurationSnapshot {
            revision: snapshot.revision,
            ..ConfigurationSnapshot::default()
        };

        for option in option_metadata() {
            let Some(raw) = self.resolve(option) else {
                continue;
            };
            if let Err(err) = apply_option(&mut next, option, &raw) {
                if option.secret {
                    tracing::warn!(option = option.key, "ignoring unparseable option value");
                } else {
                    tracing::warn!(option = option.key, value = %raw, error = %err, "ignoring unparseable option value");
                }
            }
        }

        if next == *snapshot && snapshot.revision != 0 {
            return false;
        }

        next.revision = snapshot.revision + 1;
        tracing::debug!(revision = next.revision, "configuration changed");
        *snapshot = next;
        true
    }

    /// One option, highest-precedence source first. A source that answers
    /// stops the lookup; lower-precedence sources are not consulted.
    fn resolve(&self, option: &OptionMetadata) -> Option<String> {
        self.chain
            .dynamic_value(option.dynamic_name)
            .or_else(|| self.chain.ini_value(option.ini_name))
            .or_else(|| self.chain.environment_value(option.env_name))
    }

    /// Effective value of one option, rendered for display. `None` for
    /// unknown keys. Secret masking is the caller's concern.
    pub fn display_value(&self, key: &str, snapshot: &ConfigurationSnapshot) -> Option<String> {
        option_metadata()
            .iter()
            .any(|option| option.key == key)
            .then(|| display_option(snapshot, key))
    }

    pub fn chain(&self) -> &ProviderChain {
        &self.chain
    }
}
