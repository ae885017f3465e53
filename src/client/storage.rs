use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::client::ClientError;
use crate::types::TOKEN_KEY;

/// Durable key-value storage for the client's bearer token
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn load(&self) -> Result<Option<String>, ClientError>;
    async fn store(&self, token: &str) -> Result<(), ClientError>;
    async fn clear(&self) -> Result<(), ClientError>;
}

/// Keeps the token for the life of the process only
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.token.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Result<Option<String>, ClientError> {
        Ok(self.slot().clone())
    }

    async fn store(&self, token: &str) -> Result<(), ClientError> {
        *self.slot() = Some(token.to_string());
        Ok(())
    }

    async fn clear(&self) -> Result<(), ClientError> {
        *self.slot() = None;
        Ok(())
    }
}

/// JSON file holding `{"@resi-token": "Bearer ..."}`, shared across runs
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `token.json` under `RESI_CONFIG_DIR`, or `~/.config/resi`
    pub fn in_config_dir() -> Result<Self, ClientError> {
        let dir = match std::env::var("RESI_CONFIG_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => {
                let home = std::env::var("HOME")
                    .map_err(|_| ClientError::Storage("HOME environment variable not set".to_string()))?;
                PathBuf::from(home).join(".config").join("resi")
            }
        };
        Ok(Self::new(dir.join("token.json")))
    }

    async fn read_entries(&self) -> Result<HashMap<String, String>, ClientError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_entries(&self, entries: &HashMap<String, String>) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, serde_json::to_string_pretty(entries)?).await?;
        Ok(())
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<Option<String>, ClientError> {
        Ok(self.read_entries().await?.remove(TOKEN_KEY))
    }

    async fn store(&self, token: &str) -> Result<(), ClientError> {
        let mut entries = self.read_entries().await?;
        entries.insert(TOKEN_KEY.to_string(), token.to_string());
        self.write_entries(&entries).await
    }

    async fn clear(&self) -> Result<(), ClientError> {
        let mut entries = self.read_entries().await?;
        if entries.remove(TOKEN_KEY).is_some() {
            self.write_entries(&entries).await?;
        }
        Ok(())
    }
}
