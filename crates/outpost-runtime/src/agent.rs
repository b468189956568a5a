//! Worker-side subsystem container.
//!
//! The host constructs one `Agent` at module init and installs it in the
//! process-wide cell; entry points receive the handle instead of reaching
//! into globals. Subsystems get interfaces at construction and never a
//! reference back to the container, so the graph is cycle-free. Teardown is
//! explicit and releases in reverse construction order.

use std::sync::{Arc, Mutex};

use outpost_core::config::{
    ConfigFiles, ConfigurationManager, ConfigurationStorage, OptionValueProvider, ProviderChain,
    RemoteConfigProvider, UpdateWatcher,
};
use outpost_core::vendor::vendor_customizations;

use crate::chunked::{ChunkedProcessor, PayloadSender};
use crate::forkable::ForkableRegistry;
use crate::periodic::{block_host_signals, PeriodicTask, PeriodicTaskExecutor};
use crate::queue::SharedQueue;
use crate::registrar::WorkerRegistrar;
use crate::signals::CoordinatorSignalsSender;

pub struct Agent {
    forkables: Arc<ForkableRegistry>,
    config_manager: Arc<ConfigurationManager>,
    config: Arc<ConfigurationStorage>,
    processor: Arc<ChunkedProcessor>,
    signals: Arc<CoordinatorSignalsSender>,
    registrar: Arc<WorkerRegistrar>,
    periodic: Mutex<Option<Arc<PeriodicTaskExecutor>>>,
    periodic_tasks: Mutex<Vec<PeriodicTask>>,
}

impl Agent {
    /// `periodic_tasks` run on the lazily created periodic executor; they
    /// are handed over on its first use.
    pub fn new(
        queue: Arc<SharedQueue>,
        default_provider: Arc<dyn OptionValueProvider>,
        remote_config: Arc<RemoteConfigProvider>,
        config_watcher: Option<UpdateWatcher>,
        periodic_tasks: Vec<PeriodicTask>,
    ) -> Arc<Self> {
        let mut providers: Vec<(i32, Arc<dyn OptionValueProvider>)> =
            vec![(0, default_provider), (10, remote_config)];
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

        // Workers only send; nothing in a worker drains the queue.
        let processor = Arc::new(ChunkedProcessor::new(queue, Box::new(|_message| {})));
        let send_payload: PayloadSender = {
            let processor = processor.clone();
            Arc::new(move |payload: &[u8]| processor.send_payload(payload))
        };

        let signals = Arc::new(CoordinatorSignalsSender::new(send_payload.clone()));
        let registrar = Arc::new(WorkerRegistrar::new(send_payload));

        let forkables = ForkableRegistry::new();
        forkables.register(registrar.clone());

        config_manager.update(&ConfigFiles::new());
        config.update();

        Arc::new(Self {
            forkables,
            config_manager,
            config,
            processor,
            signals,
            registrar,
            periodic: Mutex::new(None),
            periodic_tasks: Mutex::new(periodic_tasks),
        })
    }

    /// The periodic executor, created on first use. Its thread blocks the
    /// host's signals and it joins the fork protocol on creation.
    pub fn periodic_task_executor(&self) -> Arc<PeriodicTaskExecutor> {
        let mut periodic = self.periodic.lock().expect("periodic lock poisoned");
        if let Some(executor) = &*periodic {
            return executor.clone();
        }

        let tasks = std::mem::take(
            &mut *self
                .periodic_tasks
                .lock()
                .expect("periodic tasks lock poisoned"),
        );
        let executor = Arc::new(PeriodicTaskExecutor::new(
            tasks,
            Some(Box::new(block_host_signals)),
        ));
        self.forkables.register(executor.clone());
        *periodic = Some(executor.clone());
        executor
    }

    pub fn forkables(&self) -> Arc<ForkableRegistry> {
        self.forkables.clone()
    }

    pub fn config(&self) -> Arc<ConfigurationStorage> {
        self.config.clone()
    }

    pub fn config_manager(&self) -> Arc<ConfigurationManager> {
        self.config_manager.clone()
    }

    pub fn processor(&self) -> Arc<ChunkedProcessor> {
        self.processor.clone()
    }

    pub fn signals(&self) -> Arc<CoordinatorSignalsSender> {
        self.signals.clone()
    }

    pub fn registrar(&self) -> Arc<WorkerRegistrar> {
        self.registrar.clone()
    }

    /// Explicit teardown, reverse of construction. Safe to call more than
    /// once.
    pub fn shutdown(&self) {
        tracing::debug!("agent shutting down");
        self.registrar.unregister_worker();
        if let Some(executor) = self
            .periodic
            .lock()
            .expect("periodic lock poisoned")
            .take()
        {
            executor.pause();
        }
        self.config.remove_all_update_watchers();
        self.forkables.clear();
    }
}

// ── Process-wide cell ────────────────────────────────────────────────────────

static AGENT: Mutex<Option<Arc<Agent>>> = Mutex::new(None);

/// Install the process-wide agent. First installation wins; returns false
/// when one is already installed.
pub fn install(agent: Arc<Agent>) -> bool {
    let mut cell = AGENT.lock().expect("agent cell poisoned");
    if cell.is_some() {
        return false;
    }
    *cell = Some(agent);
    true
}

/// The installed agent, if any.
pub fn global() -> Option<Arc<Agent>> {
    AGENT.lock().expect("agent cell poisoned").clone()
}

/// Tear down and remove the installed agent.
pub fn shutdown_global() {
    let agent = AGENT.lock().expect("agent cell poisoned").take();
    if let Some(agent) = agent {
        agent.shutdown();
    }
}
