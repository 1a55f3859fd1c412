use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::{broadcast, Mutex};

use super::{KeyValueStore, StoreChange, Subscribers, Updater};
use crate::error::Result;

/// Keeps all records in one JSON object on disk. Every write rewrites the
/// file through a temporary sibling and a rename.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
    subscribers: Subscribers,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
            subscribers: Subscribers::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn init(&self) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn load(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let content = fs::read_to_string(&self.path).await?;
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&content)? {
            Value::Object(map) => Ok(map),
            other => {
                log::warn!(
                    "Store file {:?} does not hold an object ({}), starting empty",
                    self.path,
                    other
                );
                Ok(Map::new())
            }
        }
    }

    async fn save(&self, records: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let serialized = serde_json::to_string_pretty(records)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serialized).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        {
            let _guard = self.lock.lock().await;
            let mut records = self.load().await?;
            records.insert(key.to_string(), value.clone());
            self.save(&records).await?;
        }
        self.subscribers.notify(key, Some(value));
        Ok(())
    }

    async fn update(&self, key: &str, updater: Updater) -> Result<Option<Value>> {
        let next = {
            let _guard = self.lock.lock().await;
            let mut records = self.load().await?;
            let next = updater(records.get(key).cloned());
            match &next {
                Some(value) => {
                    records.insert(key.to_string(), value.clone());
                }
                None => {
                    records.remove(key);
                }
            }
            self.save(&records).await?;
            next
        };
        self.subscribers.notify(key, next.clone());
        Ok(next)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let removed = {
            let _guard = self.lock.lock().await;
            let mut records = self.load().await?;
            let removed = records.remove(key);
            if removed.is_some() {
                self.save(&records).await?;
            }
            removed
        };
        if removed.is_some() {
            self.subscribers.notify(key, None);
        }
        Ok(())
    }

    fn subscribe(&self, key: &str) -> broadcast::Receiver<StoreChange> {
        self.subscribers.subscribe(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn records_survive_a_new_instance() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("store.json");

        let store = JsonFileStore::new(&path);
        store.init().await.expect("init");
        store.set("github_token", json!("tok")).await.unwrap();
        store
            .set("repository_target", json!({"owner": "u", "repo": "r"}))
            .await
            .unwrap();

        let reopened = JsonFileStore::new(&path);
        assert_eq!(reopened.get("github_token").await.unwrap(), Some(json!("tok")));
        assert_eq!(
            reopened.get("repository_target").await.unwrap(),
            Some(json!({"owner": "u", "repo": "r"}))
        );
    }

    #[tokio::test]
    async fn remove_deletes_only_the_key() {
        let dir = tempdir().expect("tempdir");
        let store = JsonFileStore::new(dir.path().join("store.json"));
        store.set("a", json!(1)).await.unwrap();
        store.set("b", json!(2)).await.unwrap();

        store.remove("a").await.unwrap();

        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.get("b").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn missing_or_blank_file_reads_as_empty() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("store.json");
        let store = JsonFileStore::new(&path);
        assert_eq!(store.get("anything").await.unwrap(), None);

        std::fs::write(&path, "  \n").expect("write blank");
        assert_eq!(store.get("anything").await.unwrap(), None);
    }
}
