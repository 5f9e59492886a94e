//! Lifecycle handle shared by all background services.

use crate::{
    shutdown::{signal, Shutdown, Signal},
    TaskSpawner,
};
use futures_util::future::BoxFuture;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Owns the [`Signal`] that stops a service and the tasks spawned for it.
///
/// Dropping the handle fires the signal, so a service never outlives its owner. Closing is
/// idempotent: every call after the first is a no-op.
#[derive(Debug)]
pub struct ServiceHandle {
    name: &'static str,
    signal: Signal,
    shutdown: Shutdown,
    tasks: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl ServiceHandle {
    /// Creates a new handle for the service with the given name.
    pub fn new(name: &'static str) -> Self {
        let (signal, shutdown) = signal();
        Self {
            name,
            signal,
            shutdown,
            tasks: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    /// Returns the name of the service.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Returns a [`Shutdown`] future that resolves once the service is closed.
    pub fn on_shutdown(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Spawns a service loop with the given executor and tracks its join handle.
    ///
    /// The closure receives the [`Shutdown`] the loop must observe.
    pub fn spawn<F>(&mut self, executor: &dyn TaskSpawner, task: &'static str, f: F)
    where
        F: FnOnce(Shutdown) -> BoxFuture<'static, ()>,
    {
        let fut = f(self.shutdown.clone());
        let handle = executor.spawn_critical_task(task, fut);
        self.tasks.get_mut().push(handle);
    }

    /// Returns `true` once the service has been told to stop.
    pub fn is_closed(&self) -> bool {
        self.signal.is_fired()
    }

    /// Fires the shutdown signal without waiting for the tasks to exit.
    pub fn fire(&self) {
        if self.signal.fire() {
            debug!(target: "tasks", service = self.name, "fired shutdown signal");
        }
    }

    /// Fires the shutdown signal and waits until every spawned task has exited.
    ///
    /// A concurrent second caller waits for the first one to finish, later calls return
    /// immediately.
    pub async fn close(&self) {
        self.fire();
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            if let Err(err) = task.await {
                warn!(target: "tasks", service = self.name, %err, "service task failed to join");
            }
        }
    }
}
