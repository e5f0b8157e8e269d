use bgloc_core::{
    PostDecision, PostOutcome, StatusClass, SyncConfig, SyncVerdict, HTTP_UNAUTHORIZED, HTTP_UPDATES_NOT_REQUIRED,
};

/// Posting policy. Stays pure and testable; the engine applies the verdicts
/// to the store and the listener.
///
/// - every location is persisted before anything here is consulted
/// - immediate post only with connectivity and a valid immediate URL
/// - 2xx, 285 and 401 all consume the record; 285/401 also raise a signal
/// - anything else queues the record for batch sync
pub fn decide_before_post(config: Option<&SyncConfig>, has_connectivity: bool) -> PostDecision {
    let Some(config) = config else {
        return PostDecision::Skip;
    };
    if config.is_persist_only() {
        return PostDecision::PersistOnly;
    }
    if has_connectivity && config.has_valid_url() {
        PostDecision::PostNow
    } else {
        PostDecision::Defer
    }
}

pub fn classify_status(status: u16) -> StatusClass {
    match status {
        HTTP_UPDATES_NOT_REQUIRED => StatusClass::DeliveredStopUpdates,
        HTTP_UNAUTHORIZED => StatusClass::DeliveredReauth,
        200..=299 => StatusClass::Delivered,
        _ => StatusClass::Rejected,
    }
}

/// Verdict after an immediate post attempt.
///
/// `pending_sync_count` is the number of records already awaiting sync before
/// this attempt; a marking verdict adds this record to it.
pub fn decide_after_post(config: &SyncConfig, outcome: PostOutcome, pending_sync_count: u64) -> SyncVerdict {
    let base = match outcome {
        PostOutcome::Status(code) => match classify_status(code) {
            StatusClass::Delivered => SyncVerdict::Delete,
            StatusClass::DeliveredStopUpdates => SyncVerdict::AbortUpdatesRequested,
            StatusClass::DeliveredReauth => SyncVerdict::ReauthRequired,
            StatusClass::Rejected => SyncVerdict::MarkForSync { reprobe_connectivity: false },
        },
        PostOutcome::TransportFailure => SyncVerdict::MarkForSync { reprobe_connectivity: true },
        PostOutcome::Unrenderable => SyncVerdict::MarkForSync { reprobe_connectivity: false },
    };
    with_threshold(config, base, pending_sync_count)
}

/// Verdict for a location that skipped the immediate post.
pub fn decide_deferred(config: &SyncConfig, pending_sync_count: u64) -> SyncVerdict {
    with_threshold(config, SyncVerdict::MarkForSync { reprobe_connectivity: false }, pending_sync_count)
}

/// `pending_sync_count` already includes the record that was just marked.
pub fn threshold_reached(config: &SyncConfig, pending_sync_count: u64) -> bool {
    config.has_valid_sync_url() && pending_sync_count >= u64::from(config.sync_threshold())
}

// Deleting verdicts never carry the batch flag.
fn with_threshold(config: &SyncConfig, base: SyncVerdict, pending_sync_count: u64) -> SyncVerdict {
    if base.marks_for_sync() && threshold_reached(config, pending_sync_count.saturating_add(1)) {
        base.with_batch_signal()
    } else {
        base
    }
}

/// Collapses repeated "threshold reached" observations into one signal per
/// crossing. Observing a count below the threshold re-arms it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ThresholdLatch {
    fired: bool,
}

impl ThresholdLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true only on the not-reached -> reached transition.
    pub fn observe(&mut self, reached: bool) -> bool {
        if !reached {
            self.fired = false;
            return false;
        }
        if self.fired {
            return false;
        }
        self.fired = true;
        true
    }

    pub fn reset(&mut self) {
        self.fired = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(immediate: Option<&str>, sync: Option<&str>, threshold: u32) -> SyncConfig {
        let mut b = SyncConfig::builder().sync_threshold(threshold);
        if let Some(u) = immediate {
            b = b.immediate_post_url(u);
        }
        if let Some(u) = sync {
            b = b.sync_url(u);
        }
        b.build().unwrap()
    }

    const POST: &str = "https://example.com/post";
    const SYNC: &str = "https://example.com/sync";

    #[test]
    fn no_config_skips() {
        assert_eq!(decide_before_post(None, true), PostDecision::Skip);
    }

    #[test]
    fn before_post_needs_connectivity_and_url() {
        let full = cfg(Some(POST), Some(SYNC), 10);
        assert_eq!(decide_before_post(Some(&full), true), PostDecision::PostNow);
        assert_eq!(decide_before_post(Some(&full), false), PostDecision::Defer);

        let sync_only = cfg(None, Some(SYNC), 10);
        assert_eq!(decide_before_post(Some(&sync_only), true), PostDecision::Defer);

        let bad_url = cfg(Some(""), None, 10);
        assert_eq!(decide_before_post(Some(&bad_url), true), PostDecision::PersistOnly);
    }

    #[test]
    fn status_table() {
        let c = cfg(Some(POST), None, 10);
        for code in [200, 201, 204, 299] {
            assert_eq!(decide_after_post(&c, PostOutcome::Status(code), 0), SyncVerdict::Delete);
        }
        assert_eq!(decide_after_post(&c, PostOutcome::Status(285), 0), SyncVerdict::AbortUpdatesRequested);
        assert_eq!(decide_after_post(&c, PostOutcome::Status(401), 0), SyncVerdict::ReauthRequired);
        for code in [199, 300, 400, 403, 500, 503] {
            assert_eq!(
                decide_after_post(&c, PostOutcome::Status(code), 0),
                SyncVerdict::MarkForSync { reprobe_connectivity: false },
                "status {code}"
            );
        }
    }

    #[test]
    fn transport_failure_requests_reprobe() {
        let c = cfg(Some(POST), None, 10);
        let v = decide_after_post(&c, PostOutcome::TransportFailure, 0);
        assert_eq!(v, SyncVerdict::MarkForSync { reprobe_connectivity: true });
        let v = decide_after_post(&c, PostOutcome::Unrenderable, 0);
        assert_eq!(v, SyncVerdict::MarkForSync { reprobe_connectivity: false });
    }

    #[test]
    fn threshold_counts_the_record_being_marked() {
        let c = cfg(Some(POST), Some(SYNC), 3);
        assert!(!decide_after_post(&c, PostOutcome::Status(500), 1).signals_batch());
        assert!(decide_after_post(&c, PostOutcome::Status(500), 2).signals_batch());
        assert!(decide_deferred(&c, 2).signals_batch());
        assert!(!decide_deferred(&c, 0).signals_batch());
    }

    #[test]
    fn threshold_requires_sync_url() {
        let c = cfg(Some(POST), None, 1);
        assert!(!decide_after_post(&c, PostOutcome::Status(500), 50).signals_batch());
        assert!(!threshold_reached(&c, 50));
    }

    #[test]
    fn delete_wins_over_queueing() {
        let c = cfg(Some(POST), Some(SYNC), 1);
        assert_eq!(decide_after_post(&c, PostOutcome::Status(200), 99), SyncVerdict::Delete);
        assert_eq!(decide_after_post(&c, PostOutcome::Status(285), 99), SyncVerdict::AbortUpdatesRequested);
    }

    #[test]
    fn latch_fires_once_per_crossing() {
        let mut latch = ThresholdLatch::new();
        assert!(!latch.observe(false));
        assert!(latch.observe(true));
        assert!(!latch.observe(true));
        assert!(!latch.observe(true));
        assert!(!latch.observe(false));
        assert!(latch.observe(true));
        latch.reset();
        assert!(latch.observe(true));
    }
}
