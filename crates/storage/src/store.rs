//! Durable key-value namespaces.
//!
//! Each namespace is written and cleared as a whole: a save replaces every key
//! of the namespace, a clear removes all of them. Readers never observe a
//! half-written namespace.

use async_trait::async_trait;
use outreach_core::{Error, Paths, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::debug;

pub type Entries = Map<String, Value>;

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load a namespace. `None` when it was never saved or has been cleared.
    async fn load(&self, namespace: &str) -> Result<Option<Entries>>;

    /// Replace the whole namespace with `entries`.
    async fn save(&self, namespace: &str, entries: Entries) -> Result<()>;

    /// Remove the namespace. Clearing a missing namespace is not an error.
    async fn clear(&self, namespace: &str) -> Result<()>;
}

/// One JSON file per namespace under `~/.outreach/state/`.
pub struct FileStateStore {
    paths: Paths,
    write_lock: Mutex<()>,
}

impl FileStateStore {
    pub fn new(paths: Paths) -> Self {
        Self {
            paths,
            write_lock: Mutex::new(()),
        }
    }

    fn file(&self, namespace: &str) -> PathBuf {
        self.paths.namespace_file(namespace)
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self, namespace: &str) -> Result<Option<Entries>> {
        let path = self.file(namespace);
        if !path.exists() {
            return Ok(None);
        }

        let content = tokio::fs::read_to_string(&path).await?;
        if content.trim().is_empty() {
            return Ok(None);
        }
        match serde_json::from_str::<Value>(&content)? {
            Value::Object(map) => Ok(Some(map)),
            other => Err(Error::Storage(format!(
                "namespace '{}' is not a JSON object (found {})",
                namespace,
                json_kind(&other)
            ))),
        }
    }

    async fn save(&self, namespace: &str, entries: Entries) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.file(namespace);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write to a sibling temp file then rename so the namespace flips atomically.
        let tmp_path = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(&Value::Object(entries))?;
        tokio::fs::write(&tmp_path, content).await?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(Error::Storage(format!(
                "failed to commit namespace '{}': {}",
                namespace, e
            )));
        }
        debug!(namespace, path = %path.display(), "Saved state namespace");
        Ok(())
    }

    async fn clear(&self, namespace: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.file(namespace);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(namespace, "Cleared state namespace");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Process-local store, used by tests and dry runs.
#[derive(Default)]
pub struct MemoryStateStore {
    namespaces: Mutex<HashMap<String, Entries>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of a namespace for inspection.
    pub async fn snapshot(&self, namespace: &str) -> Option<Entries> {
        self.namespaces.lock().await.get(namespace).cloned()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self, namespace: &str) -> Result<Option<Entries>> {
        Ok(self.namespaces.lock().await.get(namespace).cloned())
    }

    async fn save(&self, namespace: &str, entries: Entries) -> Result<()> {
        self.namespaces
            .lock()
            .await
            .insert(namespace.to_string(), entries);
        Ok(())
    }

    async fn clear(&self, namespace: &str) -> Result<()> {
        self.namespaces.lock().await.remove(namespace);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entries(value: Value) -> Entries {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_file_store_save_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(Paths::with_base(dir.path().to_path_buf()));

        assert!(store.load("engagement").await.unwrap().is_none());

        store
            .save("engagement", entries(json!({"status": "started", "currentIndex": 2})))
            .await
            .unwrap();
        let loaded = store.load("engagement").await.unwrap().unwrap();
        assert_eq!(loaded.get("currentIndex"), Some(&json!(2)));

        // A second save replaces, never merges.
        store
            .save("engagement", entries(json!({"listId": "L"})))
            .await
            .unwrap();
        let loaded = store.load("engagement").await.unwrap().unwrap();
        assert!(loaded.get("status").is_none());
        assert_eq!(loaded.get("listId"), Some(&json!("L")));

        store.clear("engagement").await.unwrap();
        store.clear("engagement").await.unwrap();
        assert!(store.load("engagement").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_rejects_non_object() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_base(dir.path().to_path_buf());
        std::fs::create_dir_all(paths.state_dir()).unwrap();
        std::fs::write(paths.namespace_file("engagement"), "[1,2]").unwrap();

        let store = FileStateStore::new(paths);
        assert!(matches!(
            store.load("engagement").await,
            Err(Error::Storage(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_store_namespaces_are_isolated() {
        let store = MemoryStateStore::new();
        store.save("a", entries(json!({"k": 1}))).await.unwrap();
        store.save("b", entries(json!({"k": 2}))).await.unwrap();
        store.clear("a").await.unwrap();
        assert!(store.load("a").await.unwrap().is_none());
        assert_eq!(store.snapshot("b").await.unwrap().get("k"), Some(&json!(2)));
    }
}
