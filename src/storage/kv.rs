//! Key-value store backends
//!
//! `FileStore` keeps one file per key on disk. `SessionStore` keeps entries in
//! memory for the lifetime of the process.

use crate::storage::{get_data_dir, KeyValueStore, StorageError};
use dashmap::DashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Durable store backed by a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store rooted at `<data_dir>/store`
    pub fn open_default() -> Result<Self, StorageError> {
        Ok(Self::new(get_data_dir()?.join("store")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", sanitize_key(key)))
    }
}

/// Map a key onto a file name that is valid on every platform
fn sanitize_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for ch in key.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() || out.starts_with('.') {
        out.insert(0, '_');
    }
    out
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;

        let path = self.path_for(key);
        let temp_path = path.with_extension("json.tmp");

        // Write to temp file first, then rename over the old value
        fs::write(&temp_path, value)?;
        fs::rename(&temp_path, &path)?;

        tracing::debug!("Stored key {} at {:?}", key, path);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Volatile store scoped to the running process
#[derive(Debug, Default)]
pub struct SessionStore {
    entries: DashMap<String, String>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for SessionStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_roundtrip_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("store"));

        assert_eq!(store.get("messages").unwrap(), None);
        store.set("messages", "[1,2]").unwrap();
        assert_eq!(store.get("messages").unwrap().as_deref(), Some("[1,2]"));

        store.set("messages", "[3]").unwrap();
        assert_eq!(store.get("messages").unwrap().as_deref(), Some("[3]"));

        store.remove("messages").unwrap();
        assert_eq!(store.get("messages").unwrap(), None);
        // Removing twice is fine
        store.remove("messages").unwrap();
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        FileStore::new(dir.path()).set("k", "v").unwrap();
        let reopened = FileStore::new(dir.path());
        assert_eq!(reopened.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_sanitize_key() {
        assert_eq!(sanitize_key("chat-messages"), "chat-messages");
        assert_eq!(sanitize_key("a/b:c"), "a_b_c");
        assert_eq!(sanitize_key("../etc"), "_.._etc");
        assert_eq!(sanitize_key(""), "_");
    }

    #[test]
    fn test_session_store() {
        let store = SessionStore::new();
        assert_eq!(store.get("flag").unwrap(), None);
        store.set("flag", "1").unwrap();
        assert_eq!(store.get("flag").unwrap().as_deref(), Some("1"));
        store.remove("flag").unwrap();
        assert_eq!(store.get("flag").unwrap(), None);
    }
}
