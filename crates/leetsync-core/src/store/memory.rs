use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};

use super::{KeyValueStore, StoreChange, Subscribers, Updater};
use crate::error::Result;

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, Value>>,
    subscribers: Subscribers,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.records
            .write()
            .await
            .insert(key.to_string(), value.clone());
        self.subscribers.notify(key, Some(value));
        Ok(())
    }

    async fn update(&self, key: &str, updater: Updater) -> Result<Option<Value>> {
        let next = {
            let mut records = self.records.write().await;
            let next = updater(records.get(key).cloned());
            match &next {
                Some(value) => {
                    records.insert(key.to_string(), value.clone());
                }
                None => {
                    records.remove(key);
                }
            }
            next
        };
        self.subscribers.notify(key, next.clone());
        Ok(next)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let removed = self.records.write().await.remove(key);
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

    #[tokio::test]
    async fn get_missing_key_is_none() {
        let store = MemoryStore::new();
        assert_eq!(store.get("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn update_sees_current_value() {
        let store = MemoryStore::new();
        store.set("count", json!(1)).await.unwrap();

        let next = store
            .update(
                "count",
                Box::new(|current| {
                    let n = current.and_then(|v| v.as_i64()).unwrap_or(0);
                    Some(json!(n + 1))
                }),
            )
            .await
            .unwrap();

        assert_eq!(next, Some(json!(2)));
        assert_eq!(store.get("count").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn subscribers_observe_set_and_remove() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe("github_token");

        store.set("github_token", json!("tok")).await.unwrap();
        store.remove("github_token").await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.value, Some(json!("tok")));
        let second = rx.recv().await.unwrap();
        assert_eq!(second.value, None);
    }

    #[tokio::test]
    async fn removing_absent_key_does_not_notify() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe("device_flow");
        store.remove("device_flow").await.unwrap();
        assert!(rx.try_recv().is_err());
    }
}
