//! Durable API key store
//!
//! Persists the whole key set as a single JSON array on disk. Every save is a
//! full rewrite of the backing file; there is no incremental append or
//! write-ahead log. A missing or empty file loads as an empty store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use crate::error::KeyError;
use crate::models::ApiKey;

/// File-backed store holding the durable mirror of the key map
pub struct KeyStore {
    path: PathBuf,
}

impl KeyStore {
    /// Create a store backed by the given file path
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// The backing file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all keys from the backing file
    ///
    /// A missing or empty file yields an empty map, not an error.
    pub async fn load(&self) -> Result<HashMap<String, ApiKey>, KeyError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "Key store file absent, starting empty");
            return Ok(HashMap::new());
        }

        let content = fs::read_to_string(&self.path)
            .await
            .map_err(|e| KeyError::Persistence(format!("failed to read key store: {}", e)))?;

        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }

        let list: Vec<ApiKey> = serde_json::from_str(&content)
            .map_err(|e| KeyError::Persistence(format!("failed to parse key store: {}", e)))?;

        Ok(list.into_iter().map(|k| (k.key.clone(), k)).collect())
    }

    /// Rewrite the backing file with the full key set
    ///
    /// Returns only after the write has completed; callers must not report
    /// success to their own callers before this does.
    pub async fn save_all(&self, keys: &HashMap<String, ApiKey>) -> Result<(), KeyError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                KeyError::Persistence(format!("failed to create store directory: {}", e))
            })?;
        }

        let mut list: Vec<&ApiKey> = keys.values().collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.key.cmp(&b.key)));

        let content = serde_json::to_string_pretty(&list)
            .map_err(|e| KeyError::Persistence(format!("failed to serialize key store: {}", e)))?;

        fs::write(&self.path, content)
            .await
            .map_err(|e| KeyError::Persistence(format!("failed to write key store: {}", e)))?;

        debug!(path = %self.path.display(), count = keys.len(), "Key store saved");
        Ok(())
    }
}
