/// Non-standard status a server returns to say "delivered, stop sending".
pub const HTTP_UPDATES_NOT_REQUIRED: u16 = 285;
pub const HTTP_UNAUTHORIZED: u16 = 401;

/// What happened when a payload was handed to the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PostOutcome {
    /// The server answered with this status code.
    Status(u16),
    /// No status code was obtained (timeout, DNS, TLS, connect).
    TransportFailure,
    /// The payload template could not render the record.
    Unrenderable,
}

/// Decision taken before any I/O for a freshly persisted location.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PostDecision {
    /// No config set yet: nothing is attempted.
    Skip,
    /// Config has no usable endpoint.
    PersistOnly,
    PostNow,
    /// Go straight to the mark-for-sync path.
    Defer,
}

impl PostDecision {
    pub fn should_attempt_immediate_post(&self) -> bool {
        matches!(self, PostDecision::PostNow)
    }
}

/// Outcome of one posting attempt. Exactly one per attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncVerdict {
    PersistOnly,
    Delete,
    MarkForSync { reprobe_connectivity: bool },
    MarkForSyncAndSignalBatch { reprobe_connectivity: bool },
    /// Delivered (285); the server asks for no further updates.
    AbortUpdatesRequested,
    /// Consumed by the server (401); credentials need refreshing.
    ReauthRequired,
}

impl SyncVerdict {
    pub fn deletes_record(&self) -> bool {
        matches!(
            self,
            SyncVerdict::Delete | SyncVerdict::AbortUpdatesRequested | SyncVerdict::ReauthRequired
        )
    }

    pub fn marks_for_sync(&self) -> bool {
        matches!(
            self,
            SyncVerdict::MarkForSync { .. } | SyncVerdict::MarkForSyncAndSignalBatch { .. }
        )
    }

    pub fn signals_batch(&self) -> bool {
        matches!(self, SyncVerdict::MarkForSyncAndSignalBatch { .. })
    }

    pub fn reprobe_connectivity(&self) -> bool {
        match self {
            SyncVerdict::MarkForSync { reprobe_connectivity }
            | SyncVerdict::MarkForSyncAndSignalBatch { reprobe_connectivity } => *reprobe_connectivity,
            _ => false,
        }
    }

    /// Upgrade a marking verdict to also raise the batch signal.
    pub fn with_batch_signal(self) -> Self {
        match self {
            SyncVerdict::MarkForSync { reprobe_connectivity } => {
                SyncVerdict::MarkForSyncAndSignalBatch { reprobe_connectivity }
            }
            other => other,
        }
    }
}

/// How a status code is read by this protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusClass {
    Delivered,
    DeliveredStopUpdates,
    DeliveredReauth,
    Rejected,
}

impl StatusClass {
    pub fn is_delivered(&self) -> bool {
        !matches!(self, StatusClass::Rejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_signal_only_upgrades_marking_verdicts() {
        let v = SyncVerdict::MarkForSync { reprobe_connectivity: true }.with_batch_signal();
        assert_eq!(v, SyncVerdict::MarkForSyncAndSignalBatch { reprobe_connectivity: true });
        assert!(v.reprobe_connectivity());
        assert_eq!(SyncVerdict::Delete.with_batch_signal(), SyncVerdict::Delete);
        assert_eq!(SyncVerdict::PersistOnly.with_batch_signal(), SyncVerdict::PersistOnly);
    }

    #[test]
    fn sentinel_verdicts_delete() {
        assert!(SyncVerdict::AbortUpdatesRequested.deletes_record());
        assert!(SyncVerdict::ReauthRequired.deletes_record());
        assert!(!SyncVerdict::PersistOnly.deletes_record());
        assert!(!SyncVerdict::PersistOnly.marks_for_sync());
    }
}
