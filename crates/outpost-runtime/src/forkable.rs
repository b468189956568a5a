//! Fork-survival protocol for components owning threads or kernel handles.

use std::sync::{Arc, Mutex};

/// Implemented by components whose state would not survive `fork()` —
/// background threads, open sockets, timers.
///
/// `prefork` must leave the component fully quiescent before the syscall:
/// threads joined, buffers flushed. Destructors are never part of the
/// protocol. `postfork` restores the component on both sides of the fork.
pub trait Forkable: Send + Sync {
    fn prefork(&self);
    fn postfork(&self, child: bool);
}

/// Holds registered forkables and replays the hooks in registration order,
/// the same order on both sides of the fork.
#[derive(Default)]
pub struct ForkableRegistry {
    forkables: Mutex<Vec<Arc<dyn Forkable>>>,
}

impl ForkableRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, forkable: Arc<dyn Forkable>) {
        self.forkables
            .lock()
            .expect("forkable registry lock poisoned")
            .push(forkable);
    }

    pub fn prefork(&self) {
        let forkables = self
            .forkables
            .lock()
            .expect("forkable registry lock poisoned");
        for forkable in forkables.iter() {
            forkable.prefork();
        }
    }

    pub fn postfork(&self, child: bool) {
        let forkables = self
            .forkables
            .lock()
            .expect("forkable registry lock poisoned");
        for forkable in forkables.iter() {
            forkable.postfork(child);
        }
    }

    /// Teardown: drop every registration.
    pub fn clear(&self) {
        self.forkables
            .lock()
            .expect("forkable registry lock poisoned")
            .clear();
    }
}
