use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bgloc_core::{Disposition, LocationId, LocationRecord, SyncConfig, SyncFields};
use bgloc_storage::LocationStore;
use bgloc_transport::Transport;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::listener::SyncEventListener;
use crate::worker::{Job, Worker};

pub const DEFAULT_SHUTDOWN_WAIT: Duration = Duration::from_secs(60);

/// State reachable from both the caller side and the worker.
pub(crate) struct Shared {
    pub(crate) store: Arc<dyn LocationStore>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) listener: Arc<dyn SyncEventListener>,
    config: watch::Sender<Option<Arc<SyncConfig>>>,
    has_connectivity: AtomicBool,
}

impl Shared {
    pub(crate) fn config(&self) -> Option<Arc<SyncConfig>> {
        self.config.borrow().clone()
    }

    pub(crate) fn has_connectivity(&self) -> bool {
        self.has_connectivity.load(Ordering::Acquire)
    }

    pub(crate) fn set_connectivity(&self, up: bool) {
        self.has_connectivity.store(up, Ordering::Release);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShutdownReport {
    /// All submitted work finished within the wait budget.
    pub completed: bool,
    /// Undelivered records deleted because the wait budget ran out.
    pub discarded: u64,
}

/// Durable location upload queue.
///
/// Every location is persisted on the caller's thread; delivery, batch
/// bookkeeping and queue resets run on one worker task, strictly in
/// submission order.
pub struct SyncQueueEngine {
    shared: Arc<Shared>,
    jobs: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SyncQueueEngine {
    /// Spawns the worker on the current tokio runtime.
    pub fn start(
        store: Arc<dyn LocationStore>,
        transport: Arc<dyn Transport>,
        listener: Arc<dyn SyncEventListener>,
    ) -> Self {
        info!("starting sync queue engine");
        let (config, _) = watch::channel(None);
        let shared = Arc::new(Shared {
            store,
            transport,
            listener,
            config,
            has_connectivity: AtomicBool::new(true),
        });
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(Worker::new(shared.clone()).run(rx));
        Self {
            shared,
            jobs: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Takes effect for the next job the worker picks up.
    pub fn set_config(&self, config: SyncConfig) {
        self.shared.config.send_replace(Some(Arc::new(config)));
    }

    pub fn config(&self) -> Option<Arc<SyncConfig>> {
        self.shared.config()
    }

    pub fn set_connectivity(&self, has_connectivity: bool) {
        self.shared.set_connectivity(has_connectivity);
    }

    pub fn has_connectivity(&self) -> bool {
        self.shared.has_connectivity()
    }

    /// False once `shutdown` has been called.
    pub fn is_accepting(&self) -> bool {
        lock(&self.jobs).is_some()
    }

    /// Persist `location` and schedule its delivery.
    ///
    /// Returns the persisted record as soon as the store has it; the delivery
    /// outcome is never reported here. Without a config nothing is written.
    pub fn enqueue(&self, location: LocationRecord) -> Result<LocationRecord, EngineError> {
        if self.shared.config().is_none() {
            warn!("sync queue has no config. Did you call set_config? Skipping location.");
            return Err(EngineError::ConfigMissing);
        }

        let id = self.shared.store.insert(&location).map_err(EngineError::Store)?;
        let mut persisted = location;
        persisted.id = Some(id);
        persisted.disposition = Disposition::Pending;

        if !self.submit(Job::Post(id)) {
            // worker gone: keep the record for the next batch
            debug!("worker not accepting; location {id} marked for sync");
            self.shared.store.mark_for_sync(id, None).map_err(EngineError::Store)?;
            persisted.disposition = Disposition::AwaitingSync;
        }
        Ok(persisted)
    }

    /// Write enrichment fields onto a stored record, queue it for batch sync
    /// and raise the batch signal if this crosses the threshold.
    pub fn update_for_sync(&self, id: LocationId, fields: SyncFields) {
        if !self.submit(Job::UpdateForSync(id, fields)) {
            warn!("worker not accepting; update for location {id} dropped");
        }
    }

    /// Delete every record not yet delivered.
    pub fn clear_queue(&self) {
        if !self.submit(Job::ClearQueue) {
            warn!("worker not accepting; clear_queue dropped");
        }
    }

    /// Deliver all records awaiting sync to the sync URL in one batch.
    pub fn sync_batch(&self) {
        if !self.submit(Job::SyncBatch) {
            warn!("worker not accepting; sync_batch dropped");
        }
    }

    /// Resolves once every job submitted before this call has run.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.submit(Job::Flush(tx)) {
            let _ = rx.await;
        }
    }

    /// Stop accepting work and let the worker finish what was submitted.
    ///
    /// If the worker is still busy after `wait` it is aborted and every
    /// undelivered record is deleted: a queue abandoned this way is treated
    /// as stale on the next launch.
    pub async fn shutdown(&self, wait: Duration) -> ShutdownReport {
        drop(lock(&self.jobs).take());
        let handle = lock(&self.worker).take();
        let Some(mut handle) = handle else {
            return ShutdownReport { completed: true, discarded: 0 };
        };

        match tokio::time::timeout(wait, &mut handle).await {
            Ok(res) => {
                if let Err(e) = res {
                    warn!("sync worker ended abnormally: {e}");
                }
                info!("sync queue engine stopped");
                ShutdownReport { completed: true, discarded: 0 }
            }
            Err(_) => {
                handle.abort();
                let discarded = match self.shared.store.delete_all_unposted() {
                    Ok(n) => n,
                    Err(e) => {
                        warn!("failed to discard undelivered locations: {e:#}");
                        0
                    }
                };
                warn!("sync worker did not finish within {wait:?}; discarded {discarded} undelivered location(s)");
                ShutdownReport { completed: false, discarded }
            }
        }
    }

    fn submit(&self, job: Job) -> bool {
        match lock(&self.jobs).as_ref() {
            Some(tx) => tx.send(job).is_ok(),
            None => false,
        }
    }
}
