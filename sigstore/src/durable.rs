//! Durable tier: WAL-mode SQLite, write-behind via a bounded queue (§4.A, §9).
//!
//! Grounded on `context/src/stream_journal.rs`'s `StreamJournal` (schema +
//! `PRAGMA journal_mode=WAL` preamble) and on `context/src/sqlite_util.rs`'s
//! secure-file-open helper, adapted here into `crate::sqlite_util`. The
//! write queue itself — bounded, drop-oldest on overflow, batched flush —
//! has no direct teacher analogue (the journal writes synchronously on the
//! caller's thread); it is modeled from the queue shape in §5
//! ("Shared mutable state") and §9's explicit design note.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use gateway_types::{FingerprintKind, SignatureId, SignatureRecord};
use rusqlite::{Connection, params};
use tracing::{debug, warn};

use crate::error::SigStoreError;
use crate::sqlite_util::open_secure_db;

const QUEUE_CAPACITY: usize = 1024;
const BATCH_MAX: usize = 64;
const BATCH_INTERVAL: Duration = Duration::from_millis(500);
const DURABLE_OP_TIMEOUT: Duration = Duration::from_millis(250);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS signatures (
    id INTEGER PRIMARY KEY,
    signature BLOB NOT NULL,
    text BLOB NOT NULL,
    client_kind TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    last_access INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS by_text (key TEXT PRIMARY KEY, sig_id INTEGER NOT NULL REFERENCES signatures(id));
CREATE TABLE IF NOT EXISTS by_prefix (key TEXT PRIMARY KEY, sig_id INTEGER NOT NULL REFERENCES signatures(id));
CREATE TABLE IF NOT EXISTS by_suffix (key TEXT PRIMARY KEY, sig_id INTEGER NOT NULL REFERENCES signatures(id));
CREATE TABLE IF NOT EXISTS by_last_n (key TEXT PRIMARY KEY, sig_id INTEGER NOT NULL REFERENCES signatures(id));
CREATE TABLE IF NOT EXISTS by_session (key TEXT PRIMARY KEY, sig_id INTEGER NOT NULL REFERENCES signatures(id));
CREATE TABLE IF NOT EXISTS by_tool (key TEXT NOT NULL, sig_id INTEGER NOT NULL REFERENCES signatures(id), PRIMARY KEY (key, sig_id));
";

struct PendingWrite {
    record: SignatureRecord,
    keys: Vec<(FingerprintKind, String)>,
}

struct WriteQueue {
    items: Mutex<VecDeque<PendingWrite>>,
    condvar: Condvar,
    dropped: std::sync::atomic::AtomicU64,
}

impl WriteQueue {
    fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
            dropped: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Non-blocking enqueue. On overflow, drops the *oldest* queued write
    /// (not the new one) per the design note's drop-oldest policy, and
    /// counts the drop.
    fn enqueue(&self, write: PendingWrite) {
        let mut items = self.items.lock().unwrap();
        if items.len() >= QUEUE_CAPACITY {
            items.pop_front();
            self.dropped.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            warn!("sigstore durable write queue full, dropped oldest pending write");
        }
        items.push_back(write);
        self.condvar.notify_one();
    }

    /// Drain up to `BATCH_MAX` items, waiting up to `BATCH_INTERVAL` for the
    /// first one if the queue is empty.
    fn drain_batch(&self) -> Vec<PendingWrite> {
        let mut items = self.items.lock().unwrap();
        if items.is_empty() {
            let (guard, _timeout) = self
                .condvar
                .wait_timeout(items, BATCH_INTERVAL)
                .unwrap();
            items = guard;
        }
        let mut batch = Vec::new();
        while let Some(item) = items.pop_front() {
            batch.push(item);
            if batch.len() >= BATCH_MAX {
                break;
            }
        }
        batch
    }

    fn queue_depth(&self) -> usize {
        self.items.lock().unwrap().len()
    }
}

/// The durable tier: an open connection used synchronously for reads, and a
/// background thread that flushes queued writes in batches.
pub struct DurableTier {
    queue: Arc<WriteQueue>,
    shutdown: Arc<std::sync::atomic::AtomicBool>,
    worker: Option<std::thread::JoinHandle<()>>,
    read_conn: Mutex<Connection>,
}

impl DurableTier {
    pub fn open(path: &std::path::Path) -> Result<Self, SigStoreError> {
        let write_conn = open_secure_db(path)?;
        initialize(&write_conn)?;
        let read_conn = open_secure_db(path)?;

        let queue = Arc::new(WriteQueue::new());
        let shutdown = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let worker_queue = Arc::clone(&queue);
        let worker_shutdown = Arc::clone(&shutdown);
        let worker = std::thread::spawn(move || {
            run_writer(write_conn, worker_queue, worker_shutdown);
        });

        Ok(Self {
            queue,
            shutdown,
            worker: Some(worker),
            read_conn: Mutex::new(read_conn),
        })
    }

    #[must_use]
    pub fn open_in_memory() -> Result<Self, SigStoreError> {
        let write_conn = Connection::open_in_memory().map_err(SigStoreError::Sqlite)?;
        initialize(&write_conn)?;
        let read_conn = Connection::open_in_memory().map_err(SigStoreError::Sqlite)?;
        initialize(&read_conn)?;
        // in-memory connections do not share storage across handles; run the
        // writer against the same connection as reads for tests.
        let queue = Arc::new(WriteQueue::new());
        let shutdown = Arc::new(std::sync::atomic::AtomicBool::new(false));
        Ok(Self {
            queue,
            shutdown,
            worker: None,
            read_conn: Mutex::new(read_conn),
        })
    }

    /// Enqueue a record for write-behind persistence. Never blocks the
    /// caller; on queue overflow the oldest pending write is dropped.
    pub fn put(&self, record: SignatureRecord, keys: Vec<(FingerprintKind, String)>) {
        if self.worker.is_none() {
            // synchronous path used by `open_in_memory` test doubles
            let conn = self.read_conn.lock().unwrap();
            if let Err(err) = write_one(&conn, &record, &keys) {
                warn!(error = %err, "durable write failed, dropping");
            }
            return;
        }
        self.queue.enqueue(PendingWrite { record, keys });
    }

    pub fn get_by(&self, kind: FingerprintKind, key: &str) -> Option<SignatureRecord> {
        let started = Instant::now();
        let conn = self.read_conn.lock().ok()?;
        if started.elapsed() > DURABLE_OP_TIMEOUT {
            return None;
        }
        read_by_key(&conn, kind, key).ok().flatten()
    }

    pub fn recent_within(&self, now: u64, window_seconds: u64) -> Option<SignatureRecord> {
        let conn = self.read_conn.lock().ok()?;
        read_recent_within(&conn, now, window_seconds).ok().flatten()
    }

    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.queue.queue_depth()
    }

    #[must_use]
    pub fn dropped_writes(&self) -> u64 {
        self.queue.dropped.load(std::sync::atomic::Ordering::Relaxed)
    }
}

impl Drop for DurableTier {
    fn drop(&mut self) {
        self.shutdown.store(true, std::sync::atomic::Ordering::Relaxed);
        self.queue.condvar.notify_all();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn initialize(conn: &Connection) -> Result<(), SigStoreError> {
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL;")
        .map_err(SigStoreError::Sqlite)?;
    conn.execute_batch(SCHEMA).map_err(SigStoreError::Sqlite)?;
    Ok(())
}

fn run_writer(conn: Connection, queue: Arc<WriteQueue>, shutdown: Arc<std::sync::atomic::AtomicBool>) {
    loop {
        let batch = queue.drain_batch();
        if batch.is_empty() {
            if shutdown.load(std::sync::atomic::Ordering::Relaxed) {
                return;
            }
            continue;
        }
        if let Err(err) = write_batch(&conn, &batch) {
            warn!(error = %err, "durable-tier batch write failed, dropping batch");
        } else {
            debug!(count = batch.len(), "flushed signature batch to durable tier");
        }
        if shutdown.load(std::sync::atomic::Ordering::Relaxed) && queue.queue_depth() == 0 {
            return;
        }
    }
}

fn write_batch(conn: &Connection, batch: &[PendingWrite]) -> rusqlite::Result<()> {
    for item in batch {
        write_one(conn, &item.record, &item.keys)?;
    }
    Ok(())
}

fn write_one(
    conn: &Connection,
    record: &SignatureRecord,
    keys: &[(FingerprintKind, String)],
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO signatures (id, signature, text, client_kind, created_at, last_access)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET last_access = excluded.last_access",
        params![
            record.id.value(),
            record.signature.as_str(),
            record.text,
            record.client_kind.as_str(),
            record.created_at as i64,
            record.last_access as i64,
        ],
    )?;
    for (kind, key) in keys {
        let table = kind.table_name();
        let sql = if matches!(kind, FingerprintKind::Tool) {
            // `by_tool` is one-to-many (`key` is not unique, per
            // `base_tool_id` collisions, §3.2/§4.B layer 6): every record
            // written under this key is kept, not just the latest.
            format!("INSERT OR IGNORE INTO {table} (key, sig_id) VALUES (?1, ?2)")
        } else {
            format!(
                "INSERT INTO {table} (key, sig_id) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET sig_id = excluded.sig_id"
            )
        };
        conn.execute(&sql, params![key, record.id.value()])?;
    }
    Ok(())
}

fn read_by_key(
    conn: &Connection,
    kind: FingerprintKind,
    key: &str,
) -> rusqlite::Result<Option<SignatureRecord>> {
    let table = kind.table_name();
    if matches!(kind, FingerprintKind::Tool) {
        // Several sig_ids may share this key (`base_tool_id` collisions);
        // the newest by `created_at` wins (§4.B layer 6, S3).
        return conn
            .query_row(
                &format!(
                    "SELECT s.id, s.signature, s.text, s.client_kind, s.created_at, s.last_access
                     FROM {table} t JOIN signatures s ON s.id = t.sig_id
                     WHERE t.key = ?1
                     ORDER BY s.created_at DESC LIMIT 1"
                ),
                params![key],
                row_to_record,
            )
            .map(Some)
            .or_else(|err| {
                if matches!(err, rusqlite::Error::QueryReturnedNoRows) {
                    Ok(None)
                } else {
                    Err(err)
                }
            });
    }
    let sig_id: Option<i64> = conn
        .query_row(
            &format!("SELECT sig_id FROM {table} WHERE key = ?1"),
            params![key],
            |row| row.get(0),
        )
        .ok();
    let Some(sig_id) = sig_id else { return Ok(None) };
    read_record(conn, sig_id)
}

fn read_record(conn: &Connection, id: i64) -> rusqlite::Result<Option<SignatureRecord>> {
    conn.query_row(
        "SELECT id, signature, text, client_kind, created_at, last_access FROM signatures WHERE id = ?1",
        params![id],
        row_to_record,
    )
    .map(Some)
    .or_else(|err| {
        if matches!(err, rusqlite::Error::QueryReturnedNoRows) {
            Ok(None)
        } else {
            Err(err)
        }
    })
}

fn read_recent_within(
    conn: &Connection,
    now: u64,
    window_seconds: u64,
) -> rusqlite::Result<Option<SignatureRecord>> {
    let cutoff = now.saturating_sub(window_seconds) as i64;
    conn.query_row(
        "SELECT id, signature, text, client_kind, created_at, last_access FROM signatures
         WHERE created_at >= ?1 ORDER BY created_at DESC LIMIT 1",
        params![cutoff],
        row_to_record,
    )
    .map(Some)
    .or_else(|err| {
        if matches!(err, rusqlite::Error::QueryReturnedNoRows) {
            Ok(None)
        } else {
            Err(err)
        }
    })
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<SignatureRecord> {
    let id: i64 = row.get(0)?;
    let signature: String = row.get(1)?;
    let text: String = row.get(2)?;
    let client_kind: String = row.get(3)?;
    let created_at: i64 = row.get(4)?;
    let last_access: i64 = row.get(5)?;
    Ok(SignatureRecord {
        id: SignatureId::new(id),
        signature: gateway_types::Signature::new(signature),
        text,
        client_kind: parse_client_kind(&client_kind),
        created_at: created_at as u64,
        last_access: last_access as u64,
    })
}

fn parse_client_kind(s: &str) -> gateway_types::ClientKind {
    match s {
        "cursor" => gateway_types::ClientKind::Cursor,
        "windsurf" => gateway_types::ClientKind::Windsurf,
        "augment" => gateway_types::ClientKind::Augment,
        _ => gateway_types::ClientKind::Generic,
    }
}
