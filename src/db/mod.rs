// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/squadpulse

//! Durable key-value storage and the roster snapshot bridge

use parking_lot::{Condvar, Mutex};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::{StorageBackend, StorageConfig};
use crate::core::EventBus;
use crate::error::{Result, WearablesError};
use crate::roster::Athlete;

/// Durable key-value storage
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Overwrite the value stored under `key`
    fn put(&self, key: &str, value: &str) -> Result<()>;
}

/// SQLite-backed store
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create database
    pub fn open(config: &StorageConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| WearablesError::Persistence(e.to_string()))?;
            }
        }

        let conn = Connection::open(&config.path)?;

        conn.execute_batch(r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
        "#)?;

        let db = Self {
            conn: Mutex::new(conn),
        };

        db.create_tables()?;

        info!("Database opened at {:?}", config.path);
        Ok(db)
    }

    fn create_tables(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP
            );
        "#)?;

        Ok(())
    }
}

impl KeyValueStore for Database {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();

        let value = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        Ok(value)
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![key, value, Utc::now().to_rfc3339()],
        )?;

        Ok(())
    }
}

/// Process-local store, used for tests and ephemeral runs
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Open the backend selected in the storage configuration
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn KeyValueStore>> {
    match config.backend {
        StorageBackend::Sqlite => Ok(Arc::new(Database::open(config)?)),
        StorageBackend::Memory => {
            info!("Using in-memory roster storage");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// Serializes the roster to a single key and restores it
#[derive(Clone)]
pub struct RosterPersistence {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl RosterPersistence {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Write the full roster, replacing the previous snapshot
    pub fn save(&self, roster: &[Athlete]) -> Result<()> {
        self.save_encoded(&Self::encode(roster)?)?;
        debug!("Saved roster snapshot ({} athletes)", roster.len());
        Ok(())
    }

    pub fn encode(roster: &[Athlete]) -> Result<String> {
        Ok(serde_json::to_string(roster)?)
    }

    /// Write an already encoded snapshot
    pub fn save_encoded(&self, json: &str) -> Result<()> {
        self.store.put(&self.key, json)
    }

    /// Read the roster snapshot.
    ///
    /// Missing, unreadable or corrupt snapshots yield an empty roster.
    pub fn load(&self) -> Vec<Athlete> {
        let raw = match self.store.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!("Failed to read roster snapshot '{}': {}", self.key, e);
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<Athlete>>(&raw) {
            Ok(roster) => {
                debug!("Loaded roster snapshot ({} athletes)", roster.len());
                roster
            }
            Err(e) => {
                warn!("Discarding corrupt roster snapshot '{}': {}", self.key, e);
                Vec::new()
            }
        }
    }
}

/// Longest a flush waits on the writer before giving up
const FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Default)]
struct WriteProgress {
    written: Mutex<u64>,
    done: Condvar,
}

impl WriteProgress {
    fn mark(&self, seq: u64) {
        let mut written = self.written.lock();
        if seq > *written {
            *written = seq;
        }
        self.done.notify_all();
    }
}

/// Applies roster snapshots on a dedicated thread so callers never wait on
/// storage.
///
/// Snapshots are written in submission order; when several queue up only
/// the newest is written. Failures are logged and published on the event
/// bus.
pub struct SnapshotWriter {
    persistence: RosterPersistence,
    events: Arc<EventBus>,
    tx: Option<mpsc::UnboundedSender<(u64, String)>>,
    queued: AtomicU64,
    progress: Arc<WriteProgress>,
    worker: Option<JoinHandle<()>>,
}

impl SnapshotWriter {
    pub fn spawn(persistence: RosterPersistence, events: Arc<EventBus>) -> Self {
        let progress = Arc::new(WriteProgress::default());
        let (tx, rx) = mpsc::unbounded_channel();

        let worker = {
            let persistence = persistence.clone();
            let events = events.clone();
            let progress = progress.clone();
            std::thread::Builder::new()
                .name("roster-writer".to_string())
                .spawn(move || run_writer(rx, persistence, events, progress))
        };

        let (tx, worker) = match worker {
            Ok(worker) => (Some(tx), Some(worker)),
            Err(e) => {
                error!("Roster writer thread not started, writing inline: {}", e);
                (None, None)
            }
        };

        Self {
            persistence,
            events,
            tx,
            queued: AtomicU64::new(0),
            progress,
            worker,
        }
    }

    pub fn key(&self) -> &str {
        self.persistence.key()
    }

    /// Queue a snapshot and return its sequence number
    pub fn submit(&self, json: String) -> u64 {
        let seq = self.queued.fetch_add(1, Ordering::SeqCst) + 1;
        let unsent = match &self.tx {
            Some(tx) => tx.send((seq, json)).err().map(|e| e.0 .1),
            None => Some(json),
        };
        if let Some(json) = unsent {
            write_snapshot(&self.persistence, &self.events, &json);
            self.progress.mark(seq);
        }
        seq
    }

    /// Block until snapshot `seq` (or a newer one) has been written
    pub fn wait_for(&self, seq: u64) {
        let mut written = self.progress.written.lock();
        while *written < seq {
            if self.progress.done.wait_for(&mut written, FLUSH_TIMEOUT).timed_out() {
                warn!("Roster snapshot {} still pending after {:?}", seq, FLUSH_TIMEOUT);
                return;
            }
        }
    }

    /// Block until everything submitted so far has been written
    pub fn flush(&self) {
        self.wait_for(self.queued.load(Ordering::SeqCst));
    }
}

impl Drop for SnapshotWriter {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Roster writer thread panicked");
            }
        }
    }
}

fn run_writer(
    mut rx: mpsc::UnboundedReceiver<(u64, String)>,
    persistence: RosterPersistence,
    events: Arc<EventBus>,
    progress: Arc<WriteProgress>,
) {
    while let Some(mut next) = rx.blocking_recv() {
        while let Ok(newer) = rx.try_recv() {
            next = newer;
        }
        let (seq, json) = next;
        write_snapshot(&persistence, &events, &json);
        progress.mark(seq);
    }
    debug!("Roster writer for '{}' stopped", persistence.key());
}

fn write_snapshot(persistence: &RosterPersistence, events: &EventBus, json: &str) {
    match persistence.save_encoded(json) {
        Ok(()) => debug!("Roster snapshot saved under '{}'", persistence.key()),
        Err(e) => {
            warn!("Roster snapshot not saved: {}", e);
            events.publish_persistence_failure(&e.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::{AthleteId, TimeInZones};
    use crate::zones::{ZoneBoundaries, ZoneRange};

    fn athlete(id: &str, name: &str) -> Athlete {
        Athlete {
            id: AthleteId::from(id),
            name: name.to_string(),
            nickname: None,
            sensor_id: None,
            connected: false,
            current_hr: None,
            avg_hr: None,
            max_hr: None,
            zone_boundaries: ZoneBoundaries::default(),
            time_in_zones: TimeInZones::default(),
        }
    }

    fn memory_bridge() -> RosterPersistence {
        RosterPersistence::new(Arc::new(MemoryStore::new()), "players")
    }

    #[test]
    fn test_load_without_snapshot_is_empty() {
        assert!(memory_bridge().load().is_empty());
    }

    #[test]
    fn test_roundtrip_empty_single_and_many() {
        let bridge = memory_bridge();

        bridge.save(&[]).unwrap();
        assert!(bridge.load().is_empty());

        let mut alice = athlete("p_1", "Alice");
        alice.nickname = Some("Al".to_string());
        alice.sensor_id = Some("H10-1234".to_string());
        alice.connected = true;
        alice.current_hr = Some(131);
        alice.avg_hr = Some(118);
        alice.max_hr = Some(195);
        alice.zone_boundaries.z2 = ZoneRange::new(115, 150);
        alice.time_in_zones = TimeInZones { z1: 12, z2: 7, z3: 0, z4: 3 };
        bridge.save(std::slice::from_ref(&alice)).unwrap();
        assert_eq!(bridge.load(), vec![alice.clone()]);

        let roster = vec![alice, athlete("p_2", "Bob"), athlete("p_3", "Chen")];
        bridge.save(&roster).unwrap();
        assert_eq!(bridge.load(), roster);
    }

    #[test]
    fn test_corrupt_snapshot_loads_empty() {
        let store = Arc::new(MemoryStore::new());
        store.put("players", "{not json").unwrap();
        let bridge = RosterPersistence::new(store, "players");
        assert!(bridge.load().is_empty());
    }

    #[test]
    fn test_snapshot_uses_original_field_names() {
        let store = Arc::new(MemoryStore::new());
        let bridge = RosterPersistence::new(store.clone(), "players");
        let mut a = athlete("p_9", "Dana");
        a.current_hr = Some(100);
        bridge.save(&[a]).unwrap();

        let raw = store.get("players").unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value[0]["currentHR"], 100);
        assert_eq!(value[0]["zonesBoundaries"]["z1"], serde_json::json!([90, 120]));
        assert_eq!(value[0]["timeInZones"]["z3"], 0);
    }

    #[test]
    fn test_loads_snapshot_written_by_web_dashboard() {
        let store = Arc::new(MemoryStore::new());
        store
            .put(
                "players",
                r#"[{"id":"p_1700000000000","name":"Alice","nickname":"","sensorId":"",
                    "connected":true,"maxHR":190,
                    "zonesBoundaries":{"z1":[90,120],"z2":[121,140],"z3":[141,160],"z4":[161,190]},
                    "timeInZones":{"z1":4,"z2":0,"z3":0,"z4":0}}]"#,
            )
            .unwrap();
        let roster = RosterPersistence::new(store, "players").load();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].name, "Alice");
        assert_eq!(roster[0].current_hr, None);
        assert_eq!(roster[0].time_in_zones.z1, 4);
    }

    #[test]
    fn test_sqlite_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            backend: StorageBackend::Sqlite,
            path: dir.path().join("nested").join("roster.db"),
            roster_key: "players".to_string(),
        };

        {
            let db = Database::open(&config).unwrap();
            assert_eq!(db.get("players").unwrap(), None);
            db.put("players", "[]").unwrap();
            db.put("players", "[1]").unwrap();
        }

        let db = Database::open(&config).unwrap();
        assert_eq!(db.get("players").unwrap().as_deref(), Some("[1]"));
    }

    #[test]
    fn test_writer_keeps_latest_snapshot() {
        let store = Arc::new(MemoryStore::new());
        let writer = SnapshotWriter::spawn(
            RosterPersistence::new(store.clone(), "players"),
            Arc::new(EventBus::new(8)),
        );

        for n in 1..=50 {
            writer.submit(format!("[{}]", n));
        }
        writer.flush();
        assert_eq!(store.get("players").unwrap().as_deref(), Some("[50]"));

        let seq = writer.submit("[51]".to_string());
        assert_eq!(seq, 51);
        writer.wait_for(seq);
        assert_eq!(store.get("players").unwrap().as_deref(), Some("[51]"));
    }

    #[test]
    fn test_writer_drains_on_drop() {
        let store = Arc::new(MemoryStore::new());
        {
            let writer = SnapshotWriter::spawn(
                RosterPersistence::new(store.clone(), "players"),
                Arc::new(EventBus::new(8)),
            );
            writer.submit("[1]".to_string());
            writer.submit("[2]".to_string());
        }
        assert_eq!(store.get("players").unwrap().as_deref(), Some("[2]"));
    }

    #[test]
    fn test_open_store_memory_backend() {
        let config = StorageConfig {
            backend: StorageBackend::Memory,
            ..StorageConfig::default()
        };
        let store = open_store(&config).unwrap();
        store.put("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    }
}
