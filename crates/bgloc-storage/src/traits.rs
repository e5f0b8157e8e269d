use bgloc_core::{EpochMs, LocationId, LocationRecord, SyncFields};

/// Durable keyed storage for location records.
///
/// The engine only calls this from one context at a time for mutations; the
/// synchronous persist in `enqueue` may run concurrently with the worker, so
/// `insert` must be atomic and hand out unique ids.
pub trait LocationStore: Send + Sync {
    fn insert(&self, location: &LocationRecord) -> anyhow::Result<LocationId>;
    fn get_by_id(&self, id: LocationId) -> anyhow::Result<Option<LocationRecord>>;

    /// Every record not yet delivered (pending or awaiting sync), in id order.
    fn list_unposted(&self) -> anyhow::Result<Vec<LocationRecord>>;
    /// Records awaiting batch sync, in id order.
    fn list_pending_sync(&self) -> anyhow::Result<Vec<LocationRecord>>;

    /// Records awaiting sync recorded at or before `since_ms`.
    fn count_pending_sync(&self, since_ms: EpochMs) -> anyhow::Result<u64>;
    fn count_unposted(&self) -> anyhow::Result<u64>;

    fn delete_by_id(&self, id: LocationId) -> anyhow::Result<()>;
    /// Move a record to awaiting-sync, writing enrichment fields when given.
    fn mark_for_sync(&self, id: LocationId, fields: Option<&SyncFields>) -> anyhow::Result<()>;
    /// Returns the number of deleted records.
    fn delete_all_unposted(&self) -> anyhow::Result<u64>;
}
