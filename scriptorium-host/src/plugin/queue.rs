//! FIFO launch queue.
//!
//! Launch requests are sent over an unbounded channel to one dedicated
//! `plugin-launcher` thread, which runs them strictly in submission order.
//! Callers never block on submission; completion arrives on a
//! [`LaunchTicket`] and is broadcast to registered [`LaunchObserver`]s.

use scriptorium_plugin_api::{
    LaunchContext, LaunchReport, PluginCatalog, PluginError, PluginLauncher, PluginResult,
};
use scriptorium_runtime::{CancellationFlag, ErrorKind, RuntimeError};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Callbacks fired by the launch worker.
pub trait LaunchObserver: Send + Sync {
    /// A queued launch is about to run.
    fn on_launch_started(&self, _plugin_id: &str) {}

    /// A launch finished, successfully or not.
    fn on_launch_finished(&self, report: &LaunchReport);
}

pub(crate) type Observers = Arc<RwLock<Vec<Arc<dyn LaunchObserver>>>>;

struct LaunchJob {
    catalog: Arc<PluginCatalog>,
    plugin_id: String,
    context: LaunchContext,
    reply: oneshot::Sender<LaunchReport>,
}

/// Handle to a queued launch.
#[derive(Debug)]
pub struct LaunchTicket {
    plugin_id: String,
    cancel: CancellationFlag,
    receiver: oneshot::Receiver<LaunchReport>,
}

impl LaunchTicket {
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// Ask the plugin to stop. Scripts observe this via `ctx.is_cancelled()`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the launch to finish.
    pub async fn wait(self) -> PluginResult<LaunchReport> {
        self.receiver.await.map_err(|_| worker_gone())
    }

    /// Wait for the launch to finish from synchronous code.
    ///
    /// Panics if called from within an async runtime; use [`wait`](Self::wait)
    /// there.
    pub fn blocking_wait(self) -> PluginResult<LaunchReport> {
        self.receiver.blocking_recv().map_err(|_| worker_gone())
    }
}

fn worker_gone() -> PluginError {
    PluginError::Runtime(RuntimeError::Unavailable(
        "launch worker stopped before the launch finished".to_string(),
    ))
}

pub(crate) struct LaunchQueue {
    sender: mpsc::UnboundedSender<LaunchJob>,
    worker: JoinHandle<()>,
}

impl LaunchQueue {
    /// Spawn the worker thread.
    pub(crate) fn start(
        launcher: PluginLauncher,
        observers: Observers,
        unavailable: Arc<AtomicBool>,
    ) -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = thread::Builder::new()
            .name("plugin-launcher".to_string())
            .spawn(move || run_worker(receiver, launcher, observers, unavailable))?;

        Ok(Self { sender, worker })
    }

    pub(crate) fn submit(
        &self,
        catalog: Arc<PluginCatalog>,
        plugin_id: &str,
        context: LaunchContext,
    ) -> PluginResult<LaunchTicket> {
        let (reply, receiver) = oneshot::channel();
        let cancel = context.cancel.clone();

        self.sender
            .send(LaunchJob {
                catalog,
                plugin_id: plugin_id.to_string(),
                context,
                reply,
            })
            .map_err(|_| worker_gone())?;

        debug!(plugin = %plugin_id, "Launch queued");
        Ok(LaunchTicket {
            plugin_id: plugin_id.to_string(),
            cancel,
            receiver,
        })
    }

    /// Stop accepting launches, drain the queue and join the worker.
    pub(crate) fn shutdown(self) {
        let LaunchQueue { sender, worker } = self;
        drop(sender);
        if worker.join().is_err() {
            error!("Launch worker panicked");
        }
    }
}

fn run_worker(
    mut receiver: mpsc::UnboundedReceiver<LaunchJob>,
    launcher: PluginLauncher,
    observers: Observers,
    unavailable: Arc<AtomicBool>,
) {
    info!("Launch worker started");

    while let Some(job) = receiver.blocking_recv() {
        let Some(descriptor) = job.catalog.find_by_id(&job.plugin_id) else {
            warn!(plugin = %job.plugin_id, "Plugin vanished from its catalog snapshot");
            continue;
        };

        notify(&observers, "on_launch_started", |observer| {
            observer.on_launch_started(&descriptor.id)
        });

        let report = launcher.run(descriptor, &job.context);

        if report.outcome.error_kind() == Some(ErrorKind::RuntimeUnavailable) {
            error!("Embedded runtime is unavailable; refusing further launches");
            unavailable.store(true, Ordering::SeqCst);
        }

        notify(&observers, "on_launch_finished", |observer| {
            observer.on_launch_finished(&report)
        });

        if job.reply.send(report).is_err() {
            debug!(plugin = %job.plugin_id, "Launch ticket dropped before completion");
        }
    }

    info!("Launch worker stopped");
}

/// Call every observer. A panicking observer is logged and skipped.
fn notify(observers: &Observers, callback: &str, call: impl Fn(&dyn LaunchObserver)) {
    for observer in snapshot(observers) {
        if panic::catch_unwind(AssertUnwindSafe(|| call(observer.as_ref()))).is_err() {
            error!("Launch observer panicked in {}", callback);
        }
    }
}

fn snapshot(observers: &Observers) -> Vec<Arc<dyn LaunchObserver>> {
    observers
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}
