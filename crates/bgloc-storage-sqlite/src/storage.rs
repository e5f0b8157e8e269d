use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use bgloc_core::{Disposition, EpochMs, LocationId, LocationRecord, SyncFields};
use bgloc_storage::LocationStore;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

const SELECT_COLUMNS: &str = "id, recorded_at, latitude, longitude, speed, bearing, accuracy, altitude, provider, position, direction, estimate_miles, disposition";

pub struct SqliteLocationStore {
    conn: Mutex<Connection>,
}

impl SqliteLocationStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(db_path).with_context(|| format!("open sqlite db {}", db_path.display()))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().context("open in-memory sqlite db")?)
    }

    fn init(conn: Connection) -> Result<Self> {
        // init schema
        let init_sql = include_str!("../migrations/0001_init.sql");
        conn.execute_batch(init_sql)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("sqlite connection mutex poisoned"))
    }

    fn row_to_record(r: &Row<'_>) -> rusqlite::Result<LocationRecord> {
        let disposition: String = r.get(12)?;
        Ok(LocationRecord {
            id: Some(LocationId(r.get(0)?)),
            recorded_at_ms: r.get(1)?,
            latitude: r.get(2)?,
            longitude: r.get(3)?,
            speed: r.get::<_, Option<f64>>(4)?.map(|v| v as f32),
            bearing: r.get::<_, Option<f64>>(5)?.map(|v| v as f32),
            accuracy: r.get::<_, Option<f64>>(6)?.map(|v| v as f32),
            altitude: r.get(7)?,
            provider: r.get(8)?,
            position: r.get(9)?,
            direction: r.get(10)?,
            estimate_miles: r.get(11)?,
            disposition: Disposition::parse(&disposition).unwrap_or_default(),
        })
    }

    fn query_records(&self, sql: &str, disposition: Option<Disposition>) -> Result<Vec<LocationRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = match disposition {
            Some(d) => stmt.query_map(params![d.as_str()], Self::row_to_record)?,
            None => stmt.query_map([], Self::row_to_record)?,
        };
        let mut out = vec![];
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

impl LocationStore for SqliteLocationStore {
    fn insert(&self, location: &LocationRecord) -> Result<LocationId> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO locations(recorded_at, latitude, longitude, speed, bearing, accuracy, altitude, provider, position, direction, estimate_miles, disposition)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                location.recorded_at_ms,
                location.latitude,
                location.longitude,
                location.speed.map(f64::from),
                location.bearing.map(f64::from),
                location.accuracy.map(f64::from),
                location.altitude,
                location.provider,
                location.position,
                location.direction,
                location.estimate_miles,
                location.disposition.as_str()
            ],
        )?;
        Ok(LocationId(conn.last_insert_rowid()))
    }

    fn get_by_id(&self, id: LocationId) -> Result<Option<LocationRecord>> {
        let conn = self.conn()?;
        let rec = conn
            .query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM locations WHERE id=?1"),
                params![id.as_i64()],
                Self::row_to_record,
            )
            .optional()?;
        Ok(rec)
    }

    fn list_unposted(&self) -> Result<Vec<LocationRecord>> {
        self.query_records(&format!("SELECT {SELECT_COLUMNS} FROM locations ORDER BY id"), None)
    }

    fn list_pending_sync(&self) -> Result<Vec<LocationRecord>> {
        self.query_records(
            &format!("SELECT {SELECT_COLUMNS} FROM locations WHERE disposition=?1 ORDER BY id"),
            Some(Disposition::AwaitingSync),
        )
    }

    fn count_pending_sync(&self, since_ms: EpochMs) -> Result<u64> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(1) FROM locations WHERE disposition=?1 AND recorded_at <= ?2",
            params![Disposition::AwaitingSync.as_str(), since_ms],
            |r| r.get(0),
        )?;
        Ok(n as u64)
    }

    fn count_unposted(&self) -> Result<u64> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row("SELECT COUNT(1) FROM locations", [], |r| r.get(0))?;
        Ok(n as u64)
    }

    fn delete_by_id(&self, id: LocationId) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM locations WHERE id=?1", params![id.as_i64()])?;
        Ok(())
    }

    fn mark_for_sync(&self, id: LocationId, fields: Option<&SyncFields>) -> Result<()> {
        let conn = self.conn()?;
        let changed = match fields {
            None => conn.execute(
                "UPDATE locations SET disposition=?1 WHERE id=?2",
                params![Disposition::AwaitingSync.as_str(), id.as_i64()],
            )?,
            Some(f) => conn.execute(
                "UPDATE locations SET disposition=?1,
                    position=COALESCE(?2, position),
                    direction=COALESCE(?3, direction),
                    estimate_miles=COALESCE(?4, estimate_miles),
                    speed=COALESCE(?5, speed)
                 WHERE id=?6",
                params![
                    Disposition::AwaitingSync.as_str(),
                    f.position,
                    f.direction,
                    f.estimate_miles,
                    f.speed.map(f64::from),
                    id.as_i64()
                ],
            )?,
        };
        if changed == 0 {
            debug!("mark_for_sync: location {} not found", id);
        }
        Ok(())
    }

    fn delete_all_unposted(&self) -> Result<u64> {
        let conn = self.conn()?;
        let n = conn.execute("DELETE FROM locations", [])?;
        Ok(n as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fix(ts: i64) -> LocationRecord {
        LocationRecord::new(ts, 25.0330, 121.5654).with_speed(12.5).with_accuracy(8.0)
    }

    #[test]
    fn sqlite_open_and_migrate() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("bgloc.db");
        let _ = SqliteLocationStore::open(&db_path).unwrap();
        // reopening runs the idempotent schema again
        let _ = SqliteLocationStore::open(&db_path).unwrap();
    }

    #[test]
    fn insert_then_get_preserves_fields() {
        let store = SqliteLocationStore::open_in_memory().unwrap();
        let id = store.insert(&fix(1_000)).unwrap();
        let got = store.get_by_id(id).unwrap().unwrap();
        assert_eq!(got.id, Some(id));
        assert_eq!(got.recorded_at_ms, 1_000);
        assert_eq!(got.speed, Some(12.5));
        assert_eq!(got.bearing, None);
        assert_eq!(got.disposition, Disposition::Pending);
        assert!(store.get_by_id(LocationId(id.0 + 100)).unwrap().is_none());
    }

    #[test]
    fn mark_for_sync_writes_enrichment() {
        let store = SqliteLocationStore::open_in_memory().unwrap();
        let id = store.insert(&fix(1)).unwrap();
        store
            .mark_for_sync(
                id,
                Some(&SyncFields {
                    position: Some("Xinyi District".into()),
                    direction: Some("N".into()),
                    estimate_miles: Some(0.4),
                    speed: None,
                }),
            )
            .unwrap();
        let got = store.get_by_id(id).unwrap().unwrap();
        assert_eq!(got.disposition, Disposition::AwaitingSync);
        assert_eq!(got.position.as_deref(), Some("Xinyi District"));
        assert_eq!(got.speed, Some(12.5));
        assert_eq!(store.list_pending_sync().unwrap().len(), 1);
    }

    #[test]
    fn counts_respect_disposition_and_time() {
        let store = SqliteLocationStore::open_in_memory().unwrap();
        let a = store.insert(&fix(100)).unwrap();
        let b = store.insert(&fix(200)).unwrap();
        store.insert(&fix(300)).unwrap();
        store.mark_for_sync(a, None).unwrap();
        store.mark_for_sync(b, None).unwrap();
        assert_eq!(store.count_unposted().unwrap(), 3);
        assert_eq!(store.count_pending_sync(150).unwrap(), 1);
        assert_eq!(store.count_pending_sync(i64::MAX).unwrap(), 2);
    }

    #[test]
    fn delete_paths() {
        let store = SqliteLocationStore::open_in_memory().unwrap();
        let a = store.insert(&fix(1)).unwrap();
        store.insert(&fix(2)).unwrap();
        store.insert(&fix(3)).unwrap();
        store.delete_by_id(a).unwrap();
        assert_eq!(store.list_unposted().unwrap().len(), 2);
        assert_eq!(store.delete_all_unposted().unwrap(), 2);
        assert_eq!(store.count_unposted().unwrap(), 0);
    }
}
