//! Remote-configuration (OpAMP) client seam.
//!
//! The protocol client lives outside this crate; the coordinator only needs
//! to start it, subscribe to delivered config files, and carry it through
//! forks.

use outpost_core::config::ConfigFiles;

use crate::forkable::Forkable;

/// Invoked with each config-file delivery from the remote side.
pub type ConfigFilesWatcher = Box<dyn Fn(&ConfigFiles) + Send + Sync>;

pub trait OpAmpClient: Forkable {
    fn start_communication(&self);

    fn add_config_update_watcher(&self, watcher: ConfigFilesWatcher);

    fn remove_all_config_update_watchers(&self);
}

/// Stands in when no remote-configuration endpoint is configured.
#[derive(Default)]
pub struct OpAmpDisabled;

impl Forkable for OpAmpDisabled {
    fn prefork(&self) {}
    fn postfork(&self, _child: bool) {}
}

impl OpAmpClient for OpAmpDisabled {
    fn start_communication(&self) {
        tracing::debug!("remote configuration is disabled");
    }

    fn add_config_update_watcher(&self, _watcher: ConfigFilesWatcher) {}

    fn remove_all_config_update_watchers(&self) {}
}
