//! Snapshot publication and change notification.

use std::sync::{Arc, Mutex, RwLock};

use super::snapshot::ConfigurationSnapshot;

/// Runs on every published snapshot. Watchers must not mutate the storage
/// from inside the callback.
pub type UpdateWatcher = Box<dyn Fn(&ConfigurationSnapshot) + Send + Sync>;

type UpdateFn = Box<dyn Fn(&mut ConfigurationSnapshot) -> bool + Send + Sync>;

/// Holds the current snapshot and tells watchers when it moves.
///
/// Readers grab an `Arc` to the published snapshot and only ever contend
/// on the pointer swap at publication; writers serialize on an internal
/// lock and recompute while holding it.
pub struct ConfigurationStorage {
    current: RwLock<Arc<ConfigurationSnapshot>>,
    watchers: Mutex<Vec<UpdateWatcher>>,
    update_fn: UpdateFn,
    write_lock: Mutex<()>,
}

impl ConfigurationStorage {
    pub fn new(update_fn: impl Fn(&mut ConfigurationSnapshot) -> bool + Send + Sync + 'static) -> Self {
        Self {
            current: RwLock::new(Arc::new(ConfigurationSnapshot::default())),
            watchers: Mutex::new(Vec::new()),
            update_fn: Box::new(update_fn),
            write_lock: Mutex::new(()),
        }
    }

    /// The currently published snapshot.
    pub fn get(&self) -> Arc<ConfigurationSnapshot> {
        self.current.read().expect("snapshot lock poisoned").clone()
    }

    /// Recompute the snapshot; publish and notify watchers if the revision
    /// moved.
    pub fn update(&self) {
        let _writing = self.write_lock.lock().expect("write lock poisoned");

        let mut working = ConfigurationSnapshot::clone(&self.get());
        if !(self.update_fn)(&mut working) {
            return;
        }

        let published = Arc::new(working);
        *self.current.write().expect("snapshot lock poisoned") = published.clone();

        let watchers = self.watchers.lock().expect("watcher lock poisoned");
        for watcher in watchers.iter() {
            watcher(&published);
        }
    }

    pub fn add_update_watcher(&self, watcher: UpdateWatcher) {
        self.watchers
            .lock()
            .expect("watcher lock poisoned")
            .push(watcher);
    }

    pub fn remove_all_update_watchers(&self) {
        self.watchers.lock().expect("watcher lock poisoned").clear();
    }
}
