//! Task management for filsync services.
//!
//! Every long running subsystem (ask cache, deal watchers, reputation engine) owns a
//! [`ServiceHandle`]: the [`Signal`] that stops its loops plus the join handles of the tasks it
//! spawned through a [`TaskSpawner`].

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

use dyn_clone::DynClone;
use futures_util::{future::BoxFuture, FutureExt};
use std::{any::Any, panic::AssertUnwindSafe};
use tokio::task::JoinHandle;
use tracing::{debug, error};

pub mod service;
pub mod shutdown;

pub use service::ServiceHandle;
pub use shutdown::{signal, Shutdown, Signal};

/// A type that can spawn tasks.
///
/// The main purpose of this type is to abstract over the tokio runtime so it's more convenient to
/// provide different executors in tests.
///
/// # Examples
///
/// Use the [`TokioTaskExecutor`] that spawns with [`tokio::task::spawn`]
///
/// ```
/// # async fn t() {
/// use filsync_tasks::{TaskSpawner, TokioTaskExecutor};
/// let executor = TokioTaskExecutor::default();
///
/// let task = executor.spawn_task(Box::pin(async {
///     // -- snip --
/// }));
/// task.await.unwrap();
/// # }
/// ```
///
/// The [`TaskSpawner`] trait is [`DynClone`] so `Box<dyn TaskSpawner>` are also `Clone`.
#[auto_impl::auto_impl(&, Arc)]
pub trait TaskSpawner: Send + Sync + Unpin + std::fmt::Debug + DynClone {
    /// Spawns the task onto the runtime.
    /// See also [`tokio::runtime::Handle::spawn`].
    fn spawn_task(&self, fut: BoxFuture<'static, ()>) -> JoinHandle<()>;

    /// Spawns a long lived service loop onto the runtime.
    ///
    /// A panic inside the loop is caught and logged with the task's name instead of silently
    /// killing the task.
    fn spawn_critical_task(
        &self,
        name: &'static str,
        fut: BoxFuture<'static, ()>,
    ) -> JoinHandle<()>;
}

dyn_clone::clone_trait_object!(TaskSpawner);

/// An [`TaskSpawner`] that uses [`tokio::task::spawn`] to execute tasks
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct TokioTaskExecutor;

impl TokioTaskExecutor {
    /// Converts the instance to a boxed [`TaskSpawner`].
    pub fn boxed(self) -> Box<dyn TaskSpawner + 'static> {
        Box::new(self)
    }
}

impl TaskSpawner for TokioTaskExecutor {
    fn spawn_task(&self, fut: BoxFuture<'static, ()>) -> JoinHandle<()> {
        tokio::task::spawn(fut)
    }

    fn spawn_critical_task(
        &self,
        name: &'static str,
        fut: BoxFuture<'static, ()>,
    ) -> JoinHandle<()> {
        tokio::task::spawn(async move {
            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(()) => debug!(target: "tasks", task = name, "critical task finished"),
                Err(panic) => {
                    error!(
                        target: "tasks",
                        task = name,
                        error = panic_message(&*panic).unwrap_or("<unknown>"),
                        "critical task panicked"
                    );
                }
            }
        })
    }
}

/// Downcasts a panic payload to its message, if it carries one.
fn panic_message(panic: &(dyn Any + Send)) -> Option<&str> {
    if let Some(msg) = panic.downcast_ref::<String>() {
        Some(msg.as_str())
    } else {
        panic.downcast_ref::<&'static str>().copied()
    }
}
