//! Local persistence of named sheet records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Saved sheet, identified by `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// When the sheet was first stored.
    pub created: DateTime<Utc>,
    /// When the sheet was last written.
    pub modified: DateTime<Utc>,
    /// URI-component encoded sheet serialization.
    pub content: String,
    /// Unique sheet name.
    pub name: String,
}

impl FileRecord {
    /// Builds a record whose `created` and `modified` stamps are both `now`.
    pub fn new(name: impl Into<String>, content: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            created: now,
            modified: now,
            content: content.into(),
            name: name.into(),
        }
    }

    /// Decodes [`content`](Self::content) back into the raw sheet text.
    pub fn decoded_content(&self) -> Result<String, StoreError> {
        decode_content(&self.content)
    }
}

/// Percent-encodes raw sheet text for storage.
pub fn encode_content(raw: &str) -> String {
    urlencoding::encode(raw).into_owned()
}

/// Reverses [`encode_content`].
pub fn decode_content(encoded: &str) -> Result<String, StoreError> {
    urlencoding::decode(encoded)
        .map(|text| text.into_owned())
        .map_err(|err| StoreError::Decode(err.to_string()))
}

/// Errors raised by a [`FileStore`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("store io error: {0}")]
    Io(String),
    /// Stored data could not be decoded.
    #[error("store decode error: {0}")]
    Decode(String),
    /// Store lock was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    Poisoned,
}

/// Named record storage.
pub trait FileStore: Send + Sync {
    /// Fetches the record called `name`, if any.
    fn get(&self, name: &str) -> Result<Option<FileRecord>, StoreError>;

    /// Inserts or replaces the record with the same name.
    fn save(&self, record: FileRecord) -> Result<(), StoreError>;

    /// All records, ordered by name.
    fn list(&self) -> Result<Vec<FileRecord>, StoreError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    files: BTreeMap<String, FileRecord>,
}

/// JSON-file backed store; a missing file reads as empty.
#[derive(Debug)]
pub struct LocalStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl LocalStore {
    /// Store persisted at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<StoreFile, StoreError> {
        if !self.path.exists() {
            return Ok(StoreFile::default());
        }
        let bytes = fs::read(&self.path).map_err(|e| StoreError::Io(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| StoreError::Decode(e.to_string()))
    }

    fn persist(&self, data: &StoreFile) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
        }
        let bytes =
            serde_json::to_vec_pretty(data).map_err(|e| StoreError::Decode(e.to_string()))?;
        fs::write(&self.path, bytes).map_err(|e| StoreError::Io(e.to_string()))
    }
}

impl FileStore for LocalStore {
    fn get(&self, name: &str) -> Result<Option<FileRecord>, StoreError> {
        Ok(self.load()?.files.remove(name))
    }

    fn save(&self, record: FileRecord) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut data = self.load()?;
        data.files.insert(record.name.clone(), record);
        self.persist(&data)
    }

    fn list(&self) -> Result<Vec<FileRecord>, StoreError> {
        Ok(self.load()?.files.into_values().collect())
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: Mutex<HashMap<String, FileRecord>>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl FileStore for MemoryStore {
    fn get(&self, name: &str) -> Result<Option<FileRecord>, StoreError> {
        let files = self.files.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(files.get(name).cloned())
    }

    fn save(&self, record: FileRecord) -> Result<(), StoreError> {
        let mut files = self.files.lock().map_err(|_| StoreError::Poisoned)?;
        files.insert(record.name.clone(), record);
        Ok(())
    }

    fn list(&self) -> Result<Vec<FileRecord>, StoreError> {
        let files = self.files.lock().map_err(|_| StoreError::Poisoned)?;
        let mut out: Vec<_> = files.values().cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn stamp(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    #[test]
    fn content_encoding_round_trips() {
        let raw = "version:1.5\ncell:A1:t:Total & fees 100%";
        let encoded = encode_content(raw);
        assert!(!encoded.contains('\n'));
        assert!(!encoded.contains('&'));
        assert_eq!(decode_content(&encoded).unwrap(), raw);
    }

    #[test]
    fn local_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path().join("files.json"));
        assert_eq!(store.get("anything").unwrap(), None);
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn local_store_persists_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("files.json");
        let store = LocalStore::new(&path);
        store
            .save(FileRecord::new("invoice", "a%20b", stamp(10)))
            .unwrap();
        let mut updated = FileRecord::new("invoice", "c", stamp(10));
        updated.modified = stamp(20);
        store.save(updated.clone()).unwrap();
        store
            .save(FileRecord::new("another", "x", stamp(30)))
            .unwrap();

        let reopened = LocalStore::new(&path);
        assert_eq!(reopened.get("invoice").unwrap(), Some(updated));
        let names: Vec<_> = reopened
            .list()
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, ["another", "invoice"]);
    }

    #[test]
    fn corrupt_store_reports_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("files.json");
        fs::write(&path, b"not json").unwrap();
        let store = LocalStore::new(&path);
        assert!(matches!(store.get("x"), Err(StoreError::Decode(_))));
    }

    #[test]
    fn memory_store_lists_sorted() {
        let store = MemoryStore::new();
        store.save(FileRecord::new("b", "", stamp(1))).unwrap();
        store.save(FileRecord::new("a", "", stamp(1))).unwrap();
        let names: Vec<_> = store.list().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, ["a", "b"]);
    }
}
