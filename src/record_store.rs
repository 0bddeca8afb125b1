use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::content_store::write_json_atomic;
use crate::errors::{CourseError, CourseResult};

// Import logging macros
use crate::log_store_operation;

/// The four append-only record families kept per course
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Queries,
    History,
    Difficulties,
    Context,
}

impl RecordKind {
    pub const ALL: [RecordKind; 4] = [
        RecordKind::Queries,
        RecordKind::History,
        RecordKind::Difficulties,
        RecordKind::Context,
    ];

    pub fn dir_name(&self) -> &'static str {
        match self {
            RecordKind::Queries => "queries",
            RecordKind::History => "history",
            RecordKind::Difficulties => "difficulties",
            RecordKind::Context => "context",
        }
    }
}

/// Key-indexed JSON record lists. `append` never rewrites existing records.
pub trait RecordStore: Send + Sync {
    fn get(&self, kind: RecordKind, key: &str) -> CourseResult<Vec<Value>>;
    fn put(&self, kind: RecordKind, key: &str, records: &[Value]) -> CourseResult<()>;
    fn append(&self, kind: RecordKind, key: &str, record: Value) -> CourseResult<()>;
}

fn validate_key(key: &str) -> CourseResult<()> {
    if key.trim().is_empty()
        || key.starts_with('.')
        || key.contains(['/', '\\'])
    {
        return Err(CourseError::Validation(format!("invalid record key '{}'", key)));
    }
    Ok(())
}

/// One JSON array per (kind, key) at `<data_root>/<kind>/<key>.json`
pub struct JsonFileRecordStore {
    data_root: PathBuf,
    // Serializes read-modify-write appends within this process
    write_lock: Mutex<()>,
}

impl JsonFileRecordStore {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    fn path_for(&self, kind: RecordKind, key: &str) -> PathBuf {
        self.data_root.join(kind.dir_name()).join(format!("{}.json", key))
    }

    fn read_records(path: &Path) -> CourseResult<Vec<Value>> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CourseError::filesystem(path, e)),
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&raw).map_err(|e| CourseError::serialization(path, e))
    }
}

impl RecordStore for JsonFileRecordStore {
    fn get(&self, kind: RecordKind, key: &str) -> CourseResult<Vec<Value>> {
        validate_key(key)?;
        let records = Self::read_records(&self.path_for(kind, key))?;
        log_store_operation!(debug, "get_records", count = records.len());
        Ok(records)
    }

    fn put(&self, kind: RecordKind, key: &str, records: &[Value]) -> CourseResult<()> {
        validate_key(key)?;
        let _guard = self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        write_json_atomic(&self.path_for(kind, key), &records)
    }

    fn append(&self, kind: RecordKind, key: &str, record: Value) -> CourseResult<()> {
        validate_key(key)?;
        let _guard = self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let path = self.path_for(kind, key);
        let mut records = Self::read_records(&path)?;
        records.push(record);
        write_json_atomic(&path, &records)
    }
}

/// Process-local backend for tests and ephemeral runs
#[derive(Default)]
pub struct InMemoryRecordStore {
    records: Mutex<HashMap<(RecordKind, String), Vec<Value>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn get(&self, kind: RecordKind, key: &str) -> CourseResult<Vec<Value>> {
        validate_key(key)?;
        let records = self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(records.get(&(kind, key.to_string())).cloned().unwrap_or_default())
    }

    fn put(&self, kind: RecordKind, key: &str, values: &[Value]) -> CourseResult<()> {
        validate_key(key)?;
        let mut records = self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        records.insert((kind, key.to_string()), values.to_vec());
        Ok(())
    }

    fn append(&self, kind: RecordKind, key: &str, record: Value) -> CourseResult<()> {
        validate_key(key)?;
        let mut records = self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        records.entry((kind, key.to_string())).or_default().push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn exercise(store: &dyn RecordStore) {
        assert!(store.get(RecordKind::History, "Korean").unwrap().is_empty());

        store.append(RecordKind::History, "Korean", json!({"query": "first"})).unwrap();
        store.append(RecordKind::History, "Korean", json!({"query": "second"})).unwrap();
        store.append(RecordKind::Queries, "Korean", json!({"query": "other kind"})).unwrap();

        let history = store.get(RecordKind::History, "Korean").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0]["query"], "first");
        assert_eq!(history[1]["query"], "second");
        assert_eq!(store.get(RecordKind::Queries, "Korean").unwrap().len(), 1);
        assert!(store.get(RecordKind::History, "Spanish").unwrap().is_empty());

        store.put(RecordKind::Context, "Korean", &[json!(1), json!(2)]).unwrap();
        assert_eq!(store.get(RecordKind::Context, "Korean").unwrap(), vec![json!(1), json!(2)]);

        assert!(matches!(
            store.get(RecordKind::History, "../escape"),
            Err(CourseError::Validation(_))
        ));
    }

    #[test]
    fn test_in_memory_store() {
        exercise(&InMemoryRecordStore::new());
    }

    #[test]
    fn test_json_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileRecordStore::new(dir.path());
        exercise(&store);

        let on_disk = fs::read_to_string(dir.path().join("history").join("Korean.json")).unwrap();
        let parsed: Vec<Value> = serde_json::from_str(&on_disk).unwrap();
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("history")).unwrap();
        fs::write(dir.path().join("history").join("Korean.json"), "{not json").unwrap();

        let store = JsonFileRecordStore::new(dir.path());
        assert!(matches!(
            store.get(RecordKind::History, "Korean"),
            Err(CourseError::Serialization { .. })
        ));
    }
}
