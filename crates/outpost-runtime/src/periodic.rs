//! Periodic task execution on a dedicated background thread.
//!
//! Tasks run serially at a fixed interval. The executor participates in the
//! fork protocol: `prefork` joins the thread so nothing runs across the
//! syscall, `postfork` respawns it on both sides. The thread-init hook runs
//! first on every (re)spawned thread; the usual hook blocks the host's
//! signals so they keep landing on the host's main thread.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use nix::sys::signal::{pthread_sigmask, SigSet, SigmaskHow, Signal};

use crate::forkable::Forkable;

/// One registered task, invoked with the tick's timestamp.
pub type PeriodicTask = Box<dyn Fn(Instant) + Send + Sync>;

/// Runs once on the worker thread before the first tick.
pub type ThreadInit = Box<dyn Fn() + Send + Sync>;

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

struct State {
    interval: Duration,
    running: bool,
    quit: bool,
}

struct Shared {
    state: Mutex<State>,
    wake: Condvar,
    tasks: Vec<PeriodicTask>,
    thread_init: Option<ThreadInit>,
}

pub struct PeriodicTaskExecutor {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PeriodicTaskExecutor {
    /// Tasks are fixed at construction. The executor starts paused; call
    /// `resume` once setup is done.
    pub fn new(tasks: Vec<PeriodicTask>, thread_init: Option<ThreadInit>) -> Self {
        let executor = Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    interval: DEFAULT_INTERVAL,
                    running: false,
                    quit: false,
                }),
                wake: Condvar::new(),
                tasks,
                thread_init,
            }),
            worker: Mutex::new(None),
        };
        executor.spawn();
        executor
    }

    pub fn set_interval(&self, interval: Duration) {
        self.shared.state.lock().expect("state lock poisoned").interval = interval;
        self.shared.wake.notify_all();
    }

    /// Start executing tasks.
    pub fn resume(&self) {
        self.shared.state.lock().expect("state lock poisoned").running = true;
        self.shared.wake.notify_all();
    }

    /// Stop executing tasks; the thread stays parked on its interval.
    pub fn pause(&self) {
        self.shared.state.lock().expect("state lock poisoned").running = false;
        self.shared.wake.notify_all();
    }

    fn spawn(&self) {
        let mut worker = self.worker.lock().expect("worker handle lock poisoned");
        if worker.is_some() {
            return;
        }
        let shared = self.shared.clone();
        let handle = std::thread::Builder::new()
            .name("outpost-periodic".into())
            .spawn(move || run_loop(shared))
            .expect("failed to spawn periodic task thread");
        *worker = Some(handle);
    }

    fn stop(&self) {
        let handle = self
            .worker
            .lock()
            .expect("worker handle lock poisoned")
            .take();
        let Some(handle) = handle else { return };

        self.shared.state.lock().expect("state lock poisoned").quit = true;
        self.shared.wake.notify_all();
        let _ = handle.join();
        self.shared.state.lock().expect("state lock poisoned").quit = false;
    }
}

impl Forkable for PeriodicTaskExecutor {
    /// Joins the worker thread; no thread exists across the fork syscall.
    fn prefork(&self) {
        self.stop();
    }

    /// Respawns the worker; the running/paused state carries over.
    fn postfork(&self, _child: bool) {
        self.spawn();
    }
}

impl Drop for PeriodicTaskExecutor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(shared: Arc<Shared>) {
    if let Some(init) = &shared.thread_init {
        init();
    }

    let mut state = shared.state.lock().expect("state lock poisoned");
    loop {
        let interval = state.interval;
        let (guard, _timed_out) = shared
            .wake
            .wait_timeout(state, interval)
            .expect("state lock poisoned");
        state = guard;

        if state.quit {
            break;
        }
        if !state.running {
            continue;
        }

        drop(state);
        let now = Instant::now();
        for task in &shared.tasks {
            task(now);
        }
        state = shared.state.lock().expect("state lock poisoned");
    }
}

/// Block the host's lifecycle signals on the calling thread so they are
/// delivered to the host's main thread only. SIGPROF is the host's request
/// timeout signal.
pub fn block_host_signals() {
    let mut set = SigSet::empty();
    for signal in [
        Signal::SIGTERM,
        Signal::SIGHUP,
        Signal::SIGINT,
        Signal::SIGWINCH,
        Signal::SIGUSR1,
        Signal::SIGPROF,
    ] {
        set.add(signal);
    }
    if let Err(err) = pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&set), None) {
        tracing::warn!(error = %err, "failed to block host signals on background thread");
    }
}
