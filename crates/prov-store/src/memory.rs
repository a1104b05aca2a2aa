use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::record::StoredRecord;
use crate::traits::{Store, Transaction};

const SNAPSHOT_FORMAT: &str = "prov-store-v1";

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Row {
    /// Commit sequence that last wrote this row.
    version: u64,
    body: StoredRecord,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Table {
    /// Commit sequence that last wrote any row of this kind.
    version: u64,
    rows: BTreeMap<String, Row>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct StoreState {
    commit_seq: u64,
    tables: BTreeMap<String, Table>,
}

impl StoreState {
    fn row(&self, kind: &str, id: &str) -> Option<&Row> {
        self.tables.get(kind).and_then(|t| t.rows.get(id))
    }

    /// Version of a row; 0 when absent.
    fn row_version(&self, kind: &str, id: &str) -> u64 {
        self.row(kind, id).map_or(0, |r| r.version)
    }

    fn table_version(&self, kind: &str) -> u64 {
        self.tables.get(kind).map_or(0, |t| t.version)
    }
}

#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    format: String,
    state: StoreState,
}

type Shared = Arc<RwLock<Arc<StoreState>>>;

/// In-memory record store with snapshot isolation.
///
/// Committed state lives behind an `Arc`; each transaction holds its own
/// `Arc` to the state current at `begin_transaction`, so readers never block
/// writers and never observe a half-applied commit. Commits are
/// copy-on-write and validated optimistically.
///
/// Cloning the store yields another handle onto the same state.
///
/// A store opened from a snapshot remembers the commit sequence it loaded.
/// [`save`](Self::save) refuses to overwrite a snapshot that another handle
/// or process has saved since, so two writers sharing one file cannot
/// silently drop each other's commits.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    shared: Shared,
    /// Commit sequence of the snapshot this handle last loaded or saved.
    persisted: Arc<AtomicU64>,
}

impl InMemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store from a JSON snapshot, or start empty if the file does
    /// not exist.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let Some(file) = read_snapshot(path)? else {
            debug!(path = %path.display(), "no snapshot found, starting empty");
            return Ok(Self::new());
        };

        let commit_seq = file.state.commit_seq;
        debug!(path = %path.display(), commit_seq, "loaded snapshot");
        Ok(Self {
            shared: Arc::new(RwLock::new(Arc::new(file.state))),
            persisted: Arc::new(AtomicU64::new(commit_seq)),
        })
    }

    /// Write the latest committed state to `path` atomically (write to a
    /// temporary file in the same directory, then rename).
    ///
    /// Holds an exclusive lock on `<path>.lock` while checking and replacing
    /// the file. Fails with [`StoreError::Conflict`] if the snapshot on disk
    /// is no longer the one this handle loaded; nothing is written then.
    pub fn save(&self, path: impl AsRef<Path>) -> StoreResult<()> {
        let path = path.as_ref();
        let lock = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(lock_path(path))?;
        lock.lock_exclusive()?;

        let expected = self.persisted.load(Ordering::SeqCst);
        let on_disk = read_snapshot(path)?.map_or(0, |f| f.state.commit_seq);
        if on_disk != expected {
            warn!(
                path = %path.display(),
                expected,
                on_disk,
                "snapshot changed since it was loaded, refusing to overwrite"
            );
            return Err(StoreError::Conflict {
                kind: "snapshot".to_string(),
                id: path.display().to_string(),
            });
        }

        let state = self.current()?;
        let file = SnapshotFile {
            format: SNAPSHOT_FORMAT.to_string(),
            state: (*state).clone(),
        };

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, &file)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
        self.persisted.store(state.commit_seq, Ordering::SeqCst);

        debug!(path = %path.display(), commit_seq = state.commit_seq, "saved snapshot");
        Ok(())
    }

    /// Sequence number of the latest commit (0 for a fresh store).
    pub fn commit_seq(&self) -> StoreResult<u64> {
        Ok(self.current()?.commit_seq)
    }

    /// Total number of records across all kinds.
    pub fn record_count(&self) -> StoreResult<usize> {
        Ok(self
            .current()?
            .tables
            .values()
            .map(|t| t.rows.len())
            .sum())
    }

    fn current(&self) -> StoreResult<Arc<StoreState>> {
        let guard = self.shared.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(Arc::clone(&guard))
    }
}

/// Decode the snapshot at `path`; `None` if there is no file.
fn read_snapshot(path: &Path) -> StoreResult<Option<SnapshotFile>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let file: SnapshotFile = serde_json::from_slice(&bytes)
        .map_err(|e| StoreError::CorruptSnapshot(e.to_string()))?;
    if file.format != SNAPSHOT_FORMAT {
        return Err(StoreError::CorruptSnapshot(format!(
            "unsupported format {:?}",
            file.format
        )));
    }
    Ok(Some(file))
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}

impl Store for InMemoryStore {
    type Tx = InMemoryTransaction;

    fn begin_transaction(&self) -> StoreResult<Self::Tx> {
        Ok(InMemoryTransaction {
            shared: Arc::clone(&self.shared),
            snapshot: self.current()?,
            read_set: HashMap::new(),
            scanned: HashMap::new(),
            writes: BTreeMap::new(),
        })
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let commit_seq = self.commit_seq().unwrap_or_default();
        let records = self.record_count().unwrap_or_default();
        f.debug_struct("InMemoryStore")
            .field("commit_seq", &commit_seq)
            .field("records", &records)
            .finish()
    }
}

type Key = (String, String);

/// A transaction against an [`InMemoryStore`].
pub struct InMemoryTransaction {
    shared: Shared,
    snapshot: Arc<StoreState>,
    /// Row versions observed in the snapshot, for every row read or written.
    read_set: HashMap<Key, u64>,
    /// Table versions observed in the snapshot, for every kind scanned.
    scanned: HashMap<String, u64>,
    writes: BTreeMap<Key, StoredRecord>,
}

impl InMemoryTransaction {
    fn observe(&mut self, kind: &str, id: &str) {
        let version = self.snapshot.row_version(kind, id);
        self.read_set
            .entry((kind.to_string(), id.to_string()))
            .or_insert(version);
    }

    fn validate(&self, current: &StoreState) -> StoreResult<()> {
        for ((kind, id), seen) in &self.read_set {
            if current.row_version(kind, id) != *seen {
                return Err(StoreError::Conflict {
                    kind: kind.clone(),
                    id: id.clone(),
                });
            }
        }
        for (kind, seen) in &self.scanned {
            if current.table_version(kind) != *seen {
                return Err(StoreError::Conflict {
                    kind: kind.clone(),
                    id: "*".to_string(),
                });
            }
        }
        Ok(())
    }
}

impl Transaction for InMemoryTransaction {
    fn read(&mut self, kind: &str, id: &str) -> StoreResult<Option<StoredRecord>> {
        let key = (kind.to_string(), id.to_string());
        if let Some(pending) = self.writes.get(&key) {
            return Ok(Some(pending.clone()));
        }
        self.observe(kind, id);
        Ok(self.snapshot.row(kind, id).map(|r| r.body.clone()))
    }

    fn write(&mut self, kind: &str, id: &str, record: StoredRecord) -> StoreResult<()> {
        self.observe(kind, id);
        self.writes
            .insert((kind.to_string(), id.to_string()), record);
        Ok(())
    }

    fn scan(&mut self, kind: &str) -> StoreResult<Vec<(String, StoredRecord)>> {
        let version = self.snapshot.table_version(kind);
        self.scanned.entry(kind.to_string()).or_insert(version);

        let mut merged: BTreeMap<String, StoredRecord> = self
            .snapshot
            .tables
            .get(kind)
            .map(|t| {
                t.rows
                    .iter()
                    .map(|(id, row)| (id.clone(), row.body.clone()))
                    .collect()
            })
            .unwrap_or_default();
        for ((k, id), pending) in &self.writes {
            if k == kind {
                merged.insert(id.clone(), pending.clone());
            }
        }
        Ok(merged.into_iter().collect())
    }

    fn commit(self) -> StoreResult<u64> {
        if self.writes.is_empty() {
            return Ok(self.snapshot.commit_seq);
        }

        let shared = Arc::clone(&self.shared);
        let mut guard = shared.write().map_err(|_| StoreError::LockPoisoned)?;
        if let Err(e) = self.validate(&guard) {
            warn!(error = %e, "commit rejected");
            return Err(e);
        }

        let state = Arc::make_mut(&mut guard);
        state.commit_seq += 1;
        let seq = state.commit_seq;
        let written = self.writes.len();
        for ((kind, id), body) in self.writes {
            let table = state.tables.entry(kind).or_default();
            table.version = seq;
            table.rows.insert(id, Row { version: seq, body });
        }

        debug!(commit_seq = seq, records = written, "transaction committed");
        Ok(seq)
    }

    fn rollback(self) {
        debug!(pending = self.writes.len(), "transaction rolled back");
    }
}
