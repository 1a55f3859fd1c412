use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::{Arc, Mutex};

use super::{KeyValueStore, CREDENTIAL_KEY, DEVICE_FLOW_KEY, REPOSITORY_TARGET_KEY};
use crate::error::{Result, SyncError};
use crate::model::{DeviceFlowSession, RepositoryTarget};

/// Typed view over the three records the core persists.
#[derive(Clone)]
pub struct SyncState {
    store: Arc<dyn KeyValueStore>,
}

impl SyncState {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub async fn credential(&self) -> Result<Option<String>> {
        let value = self.store.get(CREDENTIAL_KEY).await?;
        Ok(value
            .as_ref()
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string))
    }

    pub async fn set_credential(&self, token: &str) -> Result<()> {
        self.store
            .set(CREDENTIAL_KEY, Value::String(token.trim().to_string()))
            .await
    }

    pub async fn clear_credential(&self) -> Result<()> {
        self.store.remove(CREDENTIAL_KEY).await
    }

    pub async fn repository_target(&self) -> Result<Option<RepositoryTarget>> {
        match self.store.get(REPOSITORY_TARGET_KEY).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn save_repository_target(&self, target: &RepositoryTarget) -> Result<()> {
        self.store
            .set(REPOSITORY_TARGET_KEY, serde_json::to_value(target)?)
            .await
    }

    /// Changes only the path prefix, keeping owner/repo/branch. With nothing
    /// saved yet, an incomplete target holding just the path is stored.
    pub async fn update_path_prefix(&self, path_prefix: &str) -> Result<RepositoryTarget> {
        let path_prefix = path_prefix.trim().to_string();
        let next = self
            .store
            .update(
                REPOSITORY_TARGET_KEY,
                Box::new(move |current| {
                    let mut target = current
                        .and_then(|value| serde_json::from_value::<RepositoryTarget>(value).ok())
                        .unwrap_or_else(|| RepositoryTarget::new("", ""));
                    target.path_prefix = path_prefix;
                    serde_json::to_value(target).ok()
                }),
            )
            .await?;

        let value = next.ok_or_else(|| {
            SyncError::Store("Failed to serialize repository target".to_string())
        })?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn device_flow(&self) -> Result<Option<DeviceFlowSession>> {
        match self.store.get(DEVICE_FLOW_KEY).await? {
            Some(value) => match serde_json::from_value(value) {
                Ok(session) => Ok(Some(session)),
                Err(e) => {
                    log::warn!("Discarding unreadable device flow record: {}", e);
                    self.clear_device_flow().await?;
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// Persists `session` unless a live session is already stored, in which
    /// case that one is returned as the `Err` value and nothing is written.
    pub async fn store_device_flow_if_idle(
        &self,
        session: &DeviceFlowSession,
        now: DateTime<Utc>,
    ) -> Result<std::result::Result<(), DeviceFlowSession>> {
        let candidate = serde_json::to_value(session)?;
        let existing: Arc<Mutex<Option<DeviceFlowSession>>> = Arc::new(Mutex::new(None));
        let seen = existing.clone();

        self.store
            .update(
                DEVICE_FLOW_KEY,
                Box::new(move |current| {
                    let live = current
                        .clone()
                        .and_then(|value| serde_json::from_value::<DeviceFlowSession>(value).ok())
                        .filter(|stored| !stored.is_expired_at(now));
                    match live {
                        Some(stored) => {
                            if let Ok(mut slot) = seen.lock() {
                                *slot = Some(stored);
                            }
                            current
                        }
                        None => Some(candidate),
                    }
                }),
            )
            .await?;

        let existing = existing.lock().ok().and_then(|mut slot| slot.take());
        Ok(match existing {
            Some(stored) => Err(stored),
            None => Ok(()),
        })
    }

    pub async fn clear_device_flow(&self) -> Result<()> {
        self.store.remove(DEVICE_FLOW_KEY).await
    }

    /// Clears the stored session only if it still belongs to `device_code`,
    /// so a finishing poller never wipes a newer flow.
    pub async fn clear_device_flow_for(&self, device_code: &str) -> Result<()> {
        let device_code = device_code.to_string();
        self.store
            .update(
                DEVICE_FLOW_KEY,
                Box::new(move |current| {
                    let owned = current
                        .as_ref()
                        .and_then(|value| value.get("device_code"))
                        .and_then(Value::as_str)
                        == Some(device_code.as_str());
                    if owned {
                        None
                    } else {
                        current
                    }
                }),
            )
            .await?;
        Ok(())
    }
}
