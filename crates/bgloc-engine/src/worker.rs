use std::sync::Arc;

use bgloc_core::{now_ms, LocationId, LocationRecord, PostDecision, PostOutcome, StatusClass, SyncConfig, SyncFields, SyncVerdict};
use bgloc_policy::{classify_status, decide_after_post, decide_before_post, decide_deferred, threshold_reached, ThresholdLatch};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::engine::Shared;

pub(crate) enum Job {
    Post(LocationId),
    UpdateForSync(LocationId, SyncFields),
    ClearQueue,
    SyncBatch,
    Flush(oneshot::Sender<()>),
}

/// The single serialized consumer of queue jobs. Owns the threshold latch,
/// so batch signals never race.
pub(crate) struct Worker {
    shared: Arc<Shared>,
    latch: ThresholdLatch,
}

impl Worker {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            latch: ThresholdLatch::new(),
        }
    }

    pub(crate) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Job>) {
        while let Some(job) = rx.recv().await {
            match job {
                Job::Post(id) => self.post(id).await,
                Job::UpdateForSync(id, fields) => self.update_for_sync(id, &fields),
                Job::ClearQueue => self.clear_queue(),
                Job::SyncBatch => self.sync_batch().await,
                Job::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
        debug!("sync worker drained");
    }

    fn pending_sync_count(&self) -> u64 {
        match self.shared.store.count_pending_sync(now_ms()) {
            Ok(n) => n,
            Err(e) => {
                warn!("failed to count locations awaiting sync: {e:#}");
                0
            }
        }
    }

    async fn post(&mut self, id: LocationId) {
        let Some(config) = self.shared.config() else {
            warn!("sync queue has no config; location {id} left as persisted");
            return;
        };
        let location = match self.shared.store.get_by_id(id) {
            Ok(Some(l)) => l,
            Ok(None) => {
                debug!("location {id} no longer stored; nothing to post");
                return;
            }
            Err(e) => {
                warn!("failed to load location {id}: {e:#}");
                return;
            }
        };

        let verdict = match decide_before_post(Some(config.as_ref()), self.shared.has_connectivity()) {
            PostDecision::Skip | PostDecision::PersistOnly => SyncVerdict::PersistOnly,
            PostDecision::Defer => decide_deferred(&config, self.pending_sync_count()),
            PostDecision::PostNow => {
                let outcome = self.post_location(&config, &location).await;
                decide_after_post(&config, outcome, self.pending_sync_count())
            }
        };
        debug!("location {id}: {verdict:?}");
        self.apply(id, verdict).await;
    }

    async fn post_location(&self, config: &SyncConfig, location: &LocationRecord) -> PostOutcome {
        let Some(url) = config.immediate_post_url() else {
            return PostOutcome::TransportFailure;
        };
        let payload = match config.template().render(location) {
            Ok(p) => p,
            Err(e) => {
                warn!("location to payload failed: {e}");
                return PostOutcome::Unrenderable;
            }
        };
        debug!("posting location to {url} headers: {:?}", config.http_headers().keys().collect::<Vec<_>>());

        match self.shared.transport.post_batch(url, &[payload], config.http_headers()).await {
            Ok(code) => {
                if classify_status(code) == StatusClass::Rejected {
                    warn!("server error while posting location, status: {code}");
                }
                PostOutcome::Status(code)
            }
            Err(e) => {
                warn!("error while posting location: {e}");
                PostOutcome::TransportFailure
            }
        }
    }

    async fn apply(&mut self, id: LocationId, verdict: SyncVerdict) {
        let stored = if verdict.deletes_record() {
            self.shared.store.delete_by_id(id)
        } else if verdict.marks_for_sync() {
            self.shared.store.mark_for_sync(id, None)
        } else {
            Ok(())
        };
        if let Err(e) = stored {
            warn!("failed to apply {verdict:?} to location {id}: {e:#}");
        }

        if verdict.reprobe_connectivity() {
            let up = self.shared.transport.probe_connectivity().await;
            self.shared.set_connectivity(up);
        }

        match verdict {
            SyncVerdict::AbortUpdatesRequested => {
                debug!("location {id} delivered; server answered 285 updates not required");
                self.shared.listener.on_abort_updates_requested();
            }
            SyncVerdict::ReauthRequired => {
                debug!("location {id} consumed with 401");
                self.shared.listener.on_reauth_required();
            }
            _ => {}
        }

        if verdict.marks_for_sync() && self.latch.observe(verdict.signals_batch()) {
            info!("locations awaiting sync reached threshold; requesting sync");
            self.shared.listener.on_sync_requested();
        }
    }

    fn update_for_sync(&mut self, id: LocationId, fields: &SyncFields) {
        let Some(config) = self.shared.config() else {
            warn!("sync queue has no config; update for location {id} skipped");
            return;
        };
        if let Err(e) = self.shared.store.mark_for_sync(id, Some(fields)) {
            warn!("failed to update location {id} for sync: {e:#}");
            return;
        }
        let count = self.pending_sync_count();
        if self.latch.observe(threshold_reached(&config, count)) {
            info!("attempt to sync locations: {count} threshold: {}", config.sync_threshold());
            self.shared.listener.on_sync_requested();
        }
    }

    fn clear_queue(&mut self) {
        match self.shared.store.delete_all_unposted() {
            Ok(n) => info!("cleared {n} undelivered location(s)"),
            Err(e) => warn!("failed to clear location queue: {e:#}"),
        }
        self.latch.reset();
    }

    async fn sync_batch(&mut self) {
        let Some(config) = self.shared.config() else {
            warn!("sync queue has no config; batch sync skipped");
            return;
        };
        let Some(url) = config.sync_url().filter(|_| config.has_valid_sync_url()) else {
            debug!("no valid sync url; batch sync skipped");
            return;
        };
        let pending = match self.shared.store.list_pending_sync() {
            Ok(p) => p,
            Err(e) => {
                warn!("failed to list locations awaiting sync: {e:#}");
                return;
            }
        };

        let mut ids = Vec::with_capacity(pending.len());
        let mut payloads = Vec::with_capacity(pending.len());
        for location in &pending {
            let Some(id) = location.id else { continue };
            match config.template().render(location) {
                Ok(p) => {
                    ids.push(id);
                    payloads.push(p);
                }
                Err(e) => warn!("location {id} to payload failed, left queued: {e}"),
            }
        }
        if payloads.is_empty() {
            return;
        }

        info!("syncing {} location(s) to {url}", payloads.len());
        let result = self.shared.transport.post_batch(url, &payloads, config.http_headers()).await;
        // any answer ends the crossing; records left behind re-signal on the next mark
        self.latch.reset();
        let code = match result {
            Ok(code) => code,
            Err(e) => {
                warn!("error while syncing locations: {e}");
                let up = self.shared.transport.probe_connectivity().await;
                self.shared.set_connectivity(up);
                return;
            }
        };

        let class = classify_status(code);
        if !class.is_delivered() {
            warn!("server error while syncing locations, status: {code}");
            return;
        }
        for id in &ids {
            if let Err(e) = self.shared.store.delete_by_id(*id) {
                warn!("failed to delete synced location {id}: {e:#}");
            }
        }
        match class {
            StatusClass::DeliveredStopUpdates => self.shared.listener.on_abort_updates_requested(),
            StatusClass::DeliveredReauth => self.shared.listener.on_reauth_required(),
            _ => {}
        }
    }
}
