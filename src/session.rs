// Durable key-value storage and the typed session context built on it.

use std::{path::PathBuf, sync::Arc};
use async_trait::async_trait;
use log::{debug, warn};
use tokio::sync::RwLock;

use crate::error::ClientError;
use crate::types::{DeviceType, StorageMap};

pub const KEY_AUTH_TOKEN: &str = "auth_token";
pub const KEY_LANGUAGE: &str = "language";
pub const KEY_PUSH_TOKEN: &str = "fcm_token";
pub const KEY_DEVICE_TYPE: &str = "device_type";

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: &str) -> Result<(), ClientError>;
    async fn remove(&self, key: &str) -> Result<(), ClientError>;
}

#[derive(Default)]
pub struct MemoryStore {
    values: RwLock<StorageMap>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, key: &str) -> Option<String> {
        self.values.read().await.get(key).cloned()
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), ClientError> {
        self.values.write().await.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), ClientError> {
        self.values.write().await.remove(key);
        Ok(())
    }
}

/// JSON file backed store, rewritten on every mutation.
pub struct FileStore {
    path: PathBuf,
    values: RwLock<StorageMap>,
}

impl FileStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<FileStore, ClientError> {
        let path = path.into();
        let values = match tokio::fs::read_to_string(&path).await {
            Ok(raw) if raw.trim().is_empty() => StorageMap::new(),
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                ClientError::Storage(format!("{} is not a valid session file: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("session:: no session file at {}, starting empty", path.display());
                StorageMap::new()
            }
            Err(e) => return Err(ClientError::Storage(format!("failed to read {}: {e}", path.display()))),
        };
        Ok(FileStore { path, values: RwLock::new(values) })
    }

    async fn persist(&self, values: &StorageMap) -> Result<(), ClientError> {
        let raw = serde_json::to_string_pretty(values).map_err(|e| ClientError::Storage(e.to_string()))?;
        tokio::fs::write(&self.path, raw)
            .await
            .map_err(|e| ClientError::Storage(format!("failed to write {}: {e}", self.path.display())))
    }
}

#[async_trait]
impl SessionStore for FileStore {
    async fn get(&self, key: &str) -> Option<String> {
        self.values.read().await.get(key).cloned()
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), ClientError> {
        let mut values = self.values.write().await;
        let mut next = values.clone();
        next.insert(key.to_string(), value.to_string());
        self.persist(&next).await?;
        *values = next;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), ClientError> {
        let mut values = self.values.write().await;
        if !values.contains_key(key) {
            return Ok(());
        }
        let mut next = values.clone();
        next.remove(key);
        self.persist(&next).await?;
        *values = next;
        Ok(())
    }
}

/// Session context handed to the API client and the push token manager.
#[derive(Clone)]
pub struct Session {
    store: Arc<dyn SessionStore>,
}

impl Session {
    pub fn new(store: Arc<dyn SessionStore>) -> Session {
        Session { store }
    }

    pub fn in_memory() -> Session {
        Session::new(Arc::new(MemoryStore::new()))
    }

    pub async fn auth_token(&self) -> Option<String> {
        self.store.get(KEY_AUTH_TOKEN).await
    }

    pub async fn set_auth_token(&self, token: &str) -> Result<(), ClientError> {
        self.store.set(KEY_AUTH_TOKEN, token).await
    }

    pub async fn clear_auth_token(&self) -> Result<(), ClientError> {
        self.store.remove(KEY_AUTH_TOKEN).await
    }

    pub async fn language(&self) -> String {
        self.store.get(KEY_LANGUAGE).await.unwrap_or_else(|| "en".to_string())
    }

    pub async fn set_language(&self, language: &str) -> Result<(), ClientError> {
        self.store.set(KEY_LANGUAGE, language).await
    }

    pub async fn push_token(&self) -> Option<String> {
        self.store.get(KEY_PUSH_TOKEN).await.filter(|t| !t.is_empty())
    }

    pub async fn set_push_token(&self, token: &str, device_type: DeviceType) -> Result<(), ClientError> {
        self.store.set(KEY_PUSH_TOKEN, token).await?;
        self.store.set(KEY_DEVICE_TYPE, device_type.as_str()).await
    }

    pub async fn device_type(&self) -> Option<DeviceType> {
        let raw = self.store.get(KEY_DEVICE_TYPE).await?;
        match raw.parse() {
            Ok(device_type) => Some(device_type),
            Err(e) => {
                warn!("session:: ignoring stored device type: {e}");
                None
            }
        }
    }

    pub async fn clear_push_token(&self) -> Result<(), ClientError> {
        self.store.remove(KEY_PUSH_TOKEN).await?;
        self.store.remove(KEY_DEVICE_TYPE).await
    }
}
