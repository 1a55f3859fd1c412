//! Persistent key-value storage with change notification.
//!
//! The core only depends on [`KeyValueStore`]. Two adapters ship with it:
//! [`MemoryStore`] for tests and embedding, and [`JsonFileStore`] which keeps
//! every record in a single JSON document on disk.

mod file;
mod memory;
mod state;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use state::SyncState;

use crate::error::Result;

pub const CREDENTIAL_KEY: &str = "github_token";
pub const REPOSITORY_TARGET_KEY: &str = "repository_target";
pub const DEVICE_FLOW_KEY: &str = "device_flow";

/// Computes the next value of a record from its current one. Returning
/// `None` removes the record.
pub type Updater = Box<dyn FnOnce(Option<Value>) -> Option<Value> + Send>;

#[derive(Debug, Clone, PartialEq)]
pub struct StoreChange {
    pub key: String,
    pub value: Option<Value>,
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Read-modify-write under the store's own lock; returns the new value.
    async fn update(&self, key: &str, updater: Updater) -> Result<Option<Value>>;

    async fn remove(&self, key: &str) -> Result<()>;

    /// Dropping the receiver unsubscribes.
    fn subscribe(&self, key: &str) -> broadcast::Receiver<StoreChange>;
}

/// Per-key broadcast channels shared by the adapters.
#[derive(Debug, Default)]
pub(crate) struct Subscribers {
    channels: Mutex<HashMap<String, broadcast::Sender<StoreChange>>>,
}

impl Subscribers {
    const CAPACITY: usize = 16;

    pub(crate) fn subscribe(&self, key: &str) -> broadcast::Receiver<StoreChange> {
        let mut channels = match self.channels.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        channels
            .entry(key.to_string())
            .or_insert_with(|| broadcast::channel(Self::CAPACITY).0)
            .subscribe()
    }

    pub(crate) fn notify(&self, key: &str, value: Option<Value>) {
        let mut channels = match self.channels.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(sender) = channels.get(key) {
            if sender
                .send(StoreChange {
                    key: key.to_string(),
                    value,
                })
                .is_err()
            {
                // Every receiver is gone.
                channels.remove(key);
            }
        }
    }
}
