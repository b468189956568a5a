//! The coordinator sidecar process.
//!
//! Constructed in the host parent, forked off before any worker exists.
//! The child drains the shared queue and dispatches commands; a periodic
//! tick decides when the coordinator may exit (original parent gone and no
//! live workers left) and garbage-collects stalled reassembly state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use nix::unistd::{fork, getpid, getppid, ForkResult};

use outpost_core::config::{
    ConfigFiles, ConfigurationManager, ConfigurationStorage, OptionValueProvider, ProviderChain,
    RemoteConfigProvider, UpdateWatcher,
};
use outpost_core::vendor::vendor_customizations;

use crate::chunked::ChunkedProcessor;
use crate::dispatch::CommandDispatcher;
use crate::forkable::Forkable;
use crate::opamp::OpAmpClient;
use crate::periodic::{block_host_signals, PeriodicTaskExecutor};
use crate::queue::SharedQueue;
use crate::registry::WorkerRegistry;
use crate::transport::HttpTransport;

/// Cadence of the coordinator's periodic tick.
const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// How often stalled reassembly state is garbage collected.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// A partial message untouched for this long is abandoned.
pub const ABANDONED_MAX_AGE: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("fork failed: {0}")]
    ForkFailed(nix::Error),
}

// ── Periodic tick ────────────────────────────────────────────────────────────

/// State for the coordinator's 100 ms tick. Holds interface handles only,
/// never the owning process, so the periodic closure creates no cycle.
pub struct CoordinatorTick {
    parent_pid: i32,
    working: Arc<AtomicBool>,
    registry: Arc<WorkerRegistry>,
    processor: Arc<ChunkedProcessor>,
    last_cleanup: Mutex<Instant>,
}

impl CoordinatorTick {
    pub fn new(
        parent_pid: i32,
        working: Arc<AtomicBool>,
        registry: Arc<WorkerRegistry>,
        processor: Arc<ChunkedProcessor>,
    ) -> Self {
        Self {
            parent_pid,
            working,
            registry,
            processor,
            last_cleanup: Mutex::new(Instant::now()),
        }
    }

    pub fn run(&self, now: Instant) {
        // A changed ppid means the original parent is gone; once the last
        // worker disappears too, there is nobody left to coordinate for.
        if getppid().as_raw() != self.parent_pid {
            tracing::debug!("parent process has exited, checking whether workers remain");
            self.registry.prune_dead();
            let workers = self.registry.count();
            if workers == 0 {
                self.working.store(false, Ordering::Relaxed);
            } else {
                tracing::debug!(workers, "workers still alive, continuing");
            }
        }

        let mut last_cleanup = self.last_cleanup.lock().expect("cleanup clock poisoned");
        if now.saturating_duration_since(*last_cleanup) >= CLEANUP_INTERVAL {
            self.processor.cleanup_abandoned(now, ABANDONED_MAX_AGE);
            *last_cleanup = now;
        }
    }
}

// ── Coordinator process ──────────────────────────────────────────────────────

pub struct CoordinatorProcess {
    working: Arc<AtomicBool>,
    registry: Arc<WorkerRegistry>,
    processor: Arc<ChunkedProcessor>,
    transport: Arc<dyn HttpTransport>,
    opamp: Arc<dyn OpAmpClient>,
    config_manager: Arc<ConfigurationManager>,
    config: Arc<ConfigurationStorage>,
    tick: Arc<CoordinatorTick>,
    periodic: Mutex<Option<Arc<PeriodicTaskExecutor>>>,
}

impl CoordinatorProcess {
    /// Wires the full coordinator graph. The provider chain is the default
    /// provider, the remote-config provider, and the vendor's provider when
    /// one is registered. The optional watcher observes every published
    /// snapshot (the host hooks its logger reconfiguration in here).
    pub fn new(
        queue: Arc<SharedQueue>,
        transport: Arc<dyn HttpTransport>,
        opamp: Arc<dyn OpAmpClient>,
        default_provider: Arc<dyn OptionValueProvider>,
        remote_config: Arc<RemoteConfigProvider>,
        config_watcher: Option<UpdateWatcher>,
    ) -> Self {
        let mut providers: Vec<(i32, Arc<dyn OptionValueProvider>)> = vec![
            (0, default_provider),
            (10, remote_config.clone()),
        ];
        if let Some(vendor) = vendor_customizations() {
            if let Some((priority, provider)) = vendor.option_value_provider() {
                providers.push((priority, provider));
            }
        }

        let config_manager = Arc::new(ConfigurationManager::new(ProviderChain::new(providers)));
        let config = Arc::new(ConfigurationStorage::new({
            let manager = config_manager.clone();
            move |snapshot| manager.update_if_changed(snapshot)
        }));
        if let Some(watcher) = config_watcher {
            config.add_update_watcher(watcher);
        }

        let working = Arc::new(AtomicBool::new(true));
        let registry = Arc::new(WorkerRegistry::new());
        let dispatcher = Arc::new(CommandDispatcher::new(transport.clone(), registry.clone()));
        let processor = Arc::new(ChunkedProcessor::new(queue, {
            let dispatcher = dispatcher.clone();
            Box::new(move |message| dispatcher.process_message(&message))
        }));

        // Lift remotely delivered config files into the next snapshot.
        opamp.add_config_update_watcher({
            let remote_config = remote_config.clone();
            let manager = config_manager.clone();
            let storage = config.clone();
            Box::new(move |config_files| {
                remote_config.store_config_files(config_files);
                manager.update(config_files);
                storage.update();
            })
        });

        config_manager.update(&ConfigFiles::new());
        config.update();

        let tick = Arc::new(CoordinatorTick::new(
            getpid().as_raw(),
            working.clone(),
            registry.clone(),
            processor.clone(),
        ));

        Self {
            working,
            registry,
            processor,
            transport,
            opamp,
            config_manager,
            config,
            tick,
            periodic: Mutex::new(None),
        }
    }

    /// Fork the coordinator. Returns `Ok(true)` in the forked coordinator
    /// process, after its loop has finished; `Ok(false)` in the parent,
    /// which continues host initialization. On fork failure the host runs
    /// without coordination.
    ///
    /// The caller quiesces its forkables around this call.
    pub fn start(&self) -> Result<bool, CoordinatorError> {
        // Safety: the host's prefork hooks have joined every background
        // thread, so the process is single-threaded at the point of fork.
        match unsafe { fork() } {
            Err(err) => {
                tracing::debug!(error = %err, "fork failed, host continues without coordinator");
                Err(CoordinatorError::ForkFailed(err))
            }
            Ok(ForkResult::Child) => {
                tracing::debug!("coordinator process starting");
                self.coordinator_loop();
                tracing::debug!("coordinator process is going to finish");
                Ok(true)
            }
            Ok(ForkResult::Parent { child }) => {
                tracing::debug!(
                    coordinator_pid = child.as_raw(),
                    "parent process continues initialization"
                );
                Ok(false)
            }
        }
    }

    fn coordinator_loop(&self) {
        self.opamp.start_communication();
        let periodic = self.setup_periodic_tasks();
        periodic.resume();

        while self.working.load(Ordering::Relaxed) {
            if let Err(err) = self.processor.try_receive() {
                tracing::warn!(error = %err, "error in coordinator loop");
            }
        }
        tracing::debug!("coordinator loop exiting");
    }

    fn setup_periodic_tasks(&self) -> Arc<PeriodicTaskExecutor> {
        let executor = Arc::new(PeriodicTaskExecutor::new(
            vec![{
                let tick = self.tick.clone();
                Box::new(move |now| tick.run(now))
            }],
            Some(Box::new(block_host_signals)),
        ));
        executor.set_interval(TICK_INTERVAL);
        *self.periodic.lock().expect("periodic lock poisoned") = Some(executor.clone());
        executor
    }

    pub fn registry(&self) -> Arc<WorkerRegistry> {
        self.registry.clone()
    }

    pub fn processor(&self) -> Arc<ChunkedProcessor> {
        self.processor.clone()
    }

    pub fn config(&self) -> Arc<ConfigurationStorage> {
        self.config.clone()
    }

    pub fn config_manager(&self) -> Arc<ConfigurationManager> {
        self.config_manager.clone()
    }
}

impl Forkable for CoordinatorProcess {
    fn prefork(&self) {
        if let Some(periodic) = &*self.periodic.lock().expect("periodic lock poisoned") {
            periodic.prefork();
        }
        self.opamp.prefork();
        self.transport.prefork();
    }

    fn postfork(&self, child: bool) {
        if let Some(periodic) = &*self.periodic.lock().expect("periodic lock poisoned") {
            periodic.postfork(child);
        }
        self.opamp.postfork(child);
        self.transport.postfork(child);
    }
}

impl Drop for CoordinatorProcess {
    fn drop(&mut self) {
        tracing::debug!("coordinator process shutting down");
        self.opamp.remove_all_config_update_watchers();
        self.config.remove_all_update_watchers();
    }
}
