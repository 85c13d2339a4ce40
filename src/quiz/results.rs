use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use thiserror::Error;

/// One finished attempt. Never changed after it has been appended.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ResultRecord {
    pub name: String,
    pub score: u32,
    pub total: u32,
    /// Absent in files written before timestamps were recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("result store I/O failed on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("result store {path} holds invalid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("result store lock poisoned: {0}")]
    Poisoned(String),
}

/// Append-only log of finished attempts, shared by every session.
///
/// Implementations must serialize writers: two sessions completing at the
/// same time must both end up in `list_all`.
pub trait ResultStore: Send + Sync {
    fn append(&self, record: ResultRecord) -> Result<(), StoreError>;

    /// All records in insertion order.
    fn list_all(&self) -> Result<Vec<ResultRecord>, StoreError>;

    /// Drops every record. Used to start a new tournament.
    fn reset(&self) -> Result<(), StoreError>;
}

/// Keeps the results as a pretty-printed JSON array in a single file.
///
/// Every write goes to a temporary file next to the target and is renamed
/// over it, so readers never observe a half-written array.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn json_error(&self, source: serde_json::Error) -> StoreError {
        StoreError::Json {
            path: self.path.clone(),
            source,
        }
    }

    fn read(&self) -> Result<Vec<ResultRecord>, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        serde_json::from_slice(&bytes).map_err(|e| self.json_error(e))
    }

    fn write(&self, records: &[ResultRecord]) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| self.io_error(e))?;
        serde_json::to_writer_pretty(&mut tmp, records).map_err(|e| self.json_error(e))?;
        tmp.write_all(b"\n").map_err(|e| self.io_error(e))?;
        tmp.as_file().sync_all().map_err(|e| self.io_error(e))?;
        tmp.persist(&self.path).map_err(|e| self.io_error(e.error))?;
        Ok(())
    }
}

impl ResultStore for JsonFileStore {
    fn append(&self, record: ResultRecord) -> Result<(), StoreError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        let mut records = self.read()?;
        records.push(record);
        self.write(&records)
    }

    fn list_all(&self) -> Result<Vec<ResultRecord>, StoreError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        self.read()
    }

    fn reset(&self) -> Result<(), StoreError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        self.write(&[])
    }
}

/// Volatile store, handy for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<ResultRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultStore for MemoryStore {
    fn append(&self, record: ResultRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?
            .push(record);
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<ResultRecord>, StoreError> {
        let guard = self
            .records
            .lock()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        Ok(guard.clone())
    }

    fn reset(&self) -> Result<(), StoreError> {
        self.records
            .lock()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?
            .clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;
    use std::thread;

    fn record(name: &str, score: u32, total: u32) -> ResultRecord {
        ResultRecord {
            name: name.to_string(),
            score,
            total,
            completed_at: Some(Utc.timestamp_opt(1_700_000_000, 0).unwrap()),
        }
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("results.json"));
        assert!(store.list_all().unwrap().is_empty());
    }

    #[test]
    fn appends_survive_reopen_in_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");

        let store = JsonFileStore::new(&path);
        store.append(record("Anna", 3, 5)).unwrap();
        store.append(record("Bohdan", 5, 5)).unwrap();
        drop(store);

        let reopened = JsonFileStore::new(&path);
        let names: Vec<_> = reopened
            .list_all()
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, ["Anna", "Bohdan"]);
    }

    #[test]
    fn writes_the_documented_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        let store = JsonFileStore::new(&path);
        store.append(record("Grandpa", 2, 3)).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw[0]["name"], "Grandpa");
        assert_eq!(raw[0]["score"], 2);
        assert_eq!(raw[0]["total"], 3);
        assert_eq!(raw[0]["completed_at"], "2023-11-14T22:13:20Z");
    }

    #[test]
    fn reads_records_without_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        fs::write(&path, r#"[{"name": "Дед", "score": 4, "total": 5}]"#).unwrap();

        let store = JsonFileStore::new(&path);
        store.append(record("Grandpa", 2, 3)).unwrap();

        let records = store.list_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "Дед");
        assert_eq!((records[0].score, records[0].total), (4, 5));
        assert_eq!(records[0].completed_at, None);
        assert!(records[1].completed_at.is_some());

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw[0].get("completed_at").is_none());
    }

    #[test]
    fn reset_clears_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("results.json"));
        store.append(record("Anna", 1, 5)).unwrap();
        store.reset().unwrap();
        assert!(store.list_all().unwrap().is_empty());

        store.append(record("Anna", 2, 5)).unwrap();
        assert_eq!(store.list_all().unwrap().len(), 1);
    }

    #[test]
    fn corrupt_file_is_an_error_not_an_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        fs::write(&path, "{ not json").unwrap();

        let store = JsonFileStore::new(&path);
        assert!(matches!(store.list_all(), Err(StoreError::Json { .. })));
        assert!(matches!(
            store.append(record("Anna", 1, 1)),
            Err(StoreError::Json { .. })
        ));
    }

    #[test]
    fn concurrent_appends_lose_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonFileStore::new(dir.path().join("results.json")));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for j in 0..5 {
                        store.append(record(&format!("player-{i}-{j}"), j, 5)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.list_all().unwrap().len(), 40);
    }

    #[test]
    fn memory_store_keeps_order_and_resets() {
        let store = MemoryStore::new();
        store.append(record("B", 1, 2)).unwrap();
        store.append(record("A", 2, 2)).unwrap();
        let names: Vec<_> = store.list_all().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, ["B", "A"]);

        store.reset().unwrap();
        assert!(store.list_all().unwrap().is_empty());
    }
}
