use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::anyhow;
use bgloc_core::{Disposition, EpochMs, LocationId, LocationRecord, SyncFields};

use crate::traits::LocationStore;

/// In-memory storage for tests. Not durable, but good for unit/small scenario tests.
#[derive(Default)]
pub struct InMemoryLocationStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    records: BTreeMap<i64, LocationRecord>,
}

impl InMemoryLocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| anyhow!("in-memory location store poisoned"))
    }

    /// Number of stored records regardless of disposition.
    pub fn len(&self) -> usize {
        self.lock().map(|i| i.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LocationStore for InMemoryLocationStore {
    fn insert(&self, location: &LocationRecord) -> anyhow::Result<LocationId> {
        let mut inner = self.lock()?;
        inner.next_id += 1;
        let id = LocationId(inner.next_id);
        let mut rec = location.clone();
        rec.id = Some(id);
        inner.records.insert(id.0, rec);
        Ok(id)
    }

    fn get_by_id(&self, id: LocationId) -> anyhow::Result<Option<LocationRecord>> {
        Ok(self.lock()?.records.get(&id.0).cloned())
    }

    fn list_unposted(&self) -> anyhow::Result<Vec<LocationRecord>> {
        Ok(self.lock()?.records.values().cloned().collect())
    }

    fn list_pending_sync(&self) -> anyhow::Result<Vec<LocationRecord>> {
        let inner = self.lock()?;
        Ok(inner
            .records
            .values()
            .filter(|r| r.disposition == Disposition::AwaitingSync)
            .cloned()
            .collect())
    }

    fn count_pending_sync(&self, since_ms: EpochMs) -> anyhow::Result<u64> {
        let inner = self.lock()?;
        let n = inner
            .records
            .values()
            .filter(|r| r.disposition == Disposition::AwaitingSync && r.recorded_at_ms <= since_ms)
            .count();
        Ok(n as u64)
    }

    fn count_unposted(&self) -> anyhow::Result<u64> {
        Ok(self.lock()?.records.len() as u64)
    }

    fn delete_by_id(&self, id: LocationId) -> anyhow::Result<()> {
        self.lock()?.records.remove(&id.0);
        Ok(())
    }

    fn mark_for_sync(&self, id: LocationId, fields: Option<&SyncFields>) -> anyhow::Result<()> {
        let mut inner = self.lock()?;
        if let Some(r) = inner.records.get_mut(&id.0) {
            r.disposition = Disposition::AwaitingSync;
            if let Some(f) = fields {
                r.apply_sync_fields(f);
            }
        }
        Ok(())
    }

    fn delete_all_unposted(&self) -> anyhow::Result<u64> {
        let mut inner = self.lock()?;
        let n = inner.records.len() as u64;
        inner.records.clear();
        Ok(n)
    }
}
