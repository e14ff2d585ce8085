//! API key lifecycle service
//!
//! Owns the in-memory key map and its durable mirror. All mutations follow
//! the same discipline: mutate the map under the write lock, persist the full
//! set, and roll the map back if the persist fails. A caller never observes a
//! success that is not already on disk.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::KeyError;
use crate::models::{ApiKey, BatchItemResult, BatchResult, KEY_PREFIX, KEY_RANDOM_BYTES};

use super::store::KeyStore;

/// Upper bound on keys per batch request
pub const BATCH_MAX: usize = 100;

/// Concurrent generators used by batch generation
const GENERATE_POOL_WIDTH: usize = 10;

/// Generate a fresh key value from the OS random source
pub fn generate_key_value() -> Result<String, KeyError> {
    let mut bytes = [0u8; KEY_RANDOM_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| KeyError::Persistence(format!("random source unavailable: {}", e)))?;
    Ok(format!("{}{}", KEY_PREFIX, hex::encode(bytes)))
}

/// Check whether a string has the shape of an API key
///
/// Shape only; says nothing about whether the key exists.
pub fn is_api_key_format(value: &str) -> bool {
    value.len() == KEY_PREFIX.len() + KEY_RANDOM_BYTES * 2
        && value.starts_with(KEY_PREFIX)
        && value[KEY_PREFIX.len()..]
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// In-memory key map with a file-backed durable mirror
pub struct ApiKeyService {
    store: KeyStore,
    keys: RwLock<HashMap<String, ApiKey>>,
}

impl ApiKeyService {
    /// Create a service backed by the given store file, loading existing keys
    pub async fn new<P: AsRef<Path>>(store_path: P) -> Result<Self, KeyError> {
        let store = KeyStore::new(store_path);
        let keys = store.load().await?;
        info!(count = keys.len(), "API key store loaded");
        Ok(Self {
            store,
            keys: RwLock::new(keys),
        })
    }

    /// Generate and persist a new dormant key
    pub async fn generate_key(
        &self,
        ttl_hours: i64,
        description: &str,
    ) -> Result<ApiKey, KeyError> {
        if ttl_hours <= 0 {
            return Err(KeyError::Validation(
                "ttl_hours must be at least 1".to_string(),
            ));
        }

        let value = generate_key_value()?;
        let record = ApiKey::new(value, ttl_hours, description);

        let mut keys = self.keys.write().await;
        keys.insert(record.key.clone(), record.clone());

        if let Err(e) = self.store.save_all(&keys).await {
            keys.remove(&record.key);
            return Err(e);
        }

        info!(key = %record.key, ttl_hours, "API key generated");
        Ok(record)
    }

    /// Validate a key, activating it on first use
    ///
    /// Returns Ok(false) for unknown, disabled, or expired keys. Activation
    /// mutates the record, so the whole check runs under the write lock and
    /// the rebased expiry is persisted before the caller sees `true`.
    pub async fn validate_key(&self, key: &str) -> Result<bool, KeyError> {
        let mut keys = self.keys.write().await;

        let record = match keys.get_mut(key) {
            Some(r) => r,
            None => return Ok(false),
        };

        if !record.is_valid() {
            return Ok(false);
        }

        let dormant = record.clone();
        if record.activate_if_needed() {
            let activated = record.clone();
            if let Err(e) = self.store.save_all(&keys).await {
                keys.insert(dormant.key.clone(), dormant);
                warn!(key, "Failed to persist key activation");
                return Err(e);
            }
            info!(key = %activated.key, expires_at = %activated.expires_at, "API key activated");
        }

        Ok(true)
    }

    /// Look up a single key record
    pub async fn get_key(&self, key: &str) -> Result<ApiKey, KeyError> {
        self.keys
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or(KeyError::NotFound)
    }

    /// List all key records, oldest first
    pub async fn list_keys(&self) -> Vec<ApiKey> {
        let keys = self.keys.read().await;
        let mut list: Vec<ApiKey> = keys.values().cloned().collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.key.cmp(&b.key)));
        list
    }

    /// Delete a key permanently
    pub async fn revoke_key(&self, key: &str) -> Result<(), KeyError> {
        let mut keys = self.keys.write().await;

        let removed = keys.remove(key).ok_or(KeyError::NotFound)?;

        if let Err(e) = self.store.save_all(&keys).await {
            keys.insert(removed.key.clone(), removed);
            return Err(e);
        }

        info!(key, "API key deleted");
        Ok(())
    }

    /// Update a key's expiry
    ///
    /// Exactly one mode applies: an absolute `expires_at` wins when both are
    /// given, otherwise `extend_hours` pushes the current expiry forward.
    /// Supplying neither is a validation error.
    pub async fn update_key_expiry(
        &self,
        key: &str,
        expires_at: Option<DateTime<Utc>>,
        extend_hours: Option<i64>,
    ) -> Result<ApiKey, KeyError> {
        if expires_at.is_none() && extend_hours.is_none() {
            return Err(KeyError::Validation(
                "either expires_at or extend_hours is required".to_string(),
            ));
        }
        if expires_at.is_none() {
            if let Some(hours) = extend_hours {
                if hours <= 0 {
                    return Err(KeyError::Validation(
                        "extend_hours must be at least 1".to_string(),
                    ));
                }
            }
        }

        let mut keys = self.keys.write().await;
        let record = keys.get_mut(key).ok_or(KeyError::NotFound)?;
        let previous = record.expires_at;

        record.expires_at = match expires_at {
            Some(at) => at,
            None => previous + Duration::hours(extend_hours.unwrap_or(0)),
        };
        let updated = record.clone();

        if let Err(e) = self.store.save_all(&keys).await {
            if let Some(r) = keys.get_mut(key) {
                r.expires_at = previous;
            }
            return Err(e);
        }

        info!(key, expires_at = %updated.expires_at, "API key expiry updated");
        Ok(updated)
    }

    /// Generate a batch of keys in one atomic operation
    ///
    /// Key values are produced by a small worker pool; records are inserted
    /// and persisted with a single store write. On persist failure none of
    /// the new keys survive.
    pub async fn batch_generate_keys(
        &self,
        count: usize,
        ttl_hours: i64,
        description_prefix: &str,
    ) -> Result<Vec<ApiKey>, KeyError> {
        if count == 0 || count > BATCH_MAX {
            return Err(KeyError::Validation(format!(
                "count must be between 1 and {}",
                BATCH_MAX
            )));
        }
        if ttl_hours <= 0 {
            return Err(KeyError::Validation(
                "ttl_hours must be at least 1".to_string(),
            ));
        }

        let mut keys = self.keys.write().await;

        let slots: Arc<Mutex<Vec<Option<String>>>> = Arc::new(Mutex::new(vec![None; count]));
        let next = Arc::new(AtomicUsize::new(0));
        let width = GENERATE_POOL_WIDTH.min(count);

        let mut workers = Vec::with_capacity(width);
        for _ in 0..width {
            let slots = Arc::clone(&slots);
            let next = Arc::clone(&next);
            workers.push(tokio::spawn(async move {
                loop {
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    if index >= count {
                        return Ok::<(), KeyError>(());
                    }
                    let value = generate_key_value()?;
                    slots
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())[index] = Some(value);
                }
            }));
        }
        for worker in workers {
            worker
                .await
                .map_err(|e| KeyError::Persistence(format!("key generation task failed: {}", e)))??;
        }

        let values = Arc::try_unwrap(slots)
            .map_err(|_| KeyError::Persistence("key generation slots still shared".to_string()))?
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut generated = Vec::with_capacity(count);
        for (index, value) in values.into_iter().enumerate() {
            let value = value.ok_or_else(|| {
                KeyError::Persistence("key generation left an empty slot".to_string())
            })?;
            let description = format!("{}-{}", description_prefix, index + 1);
            let record = ApiKey::new(value, ttl_hours, description);
            keys.insert(record.key.clone(), record.clone());
            generated.push(record);
        }

        if let Err(e) = self.store.save_all(&keys).await {
            for record in &generated {
                keys.remove(&record.key);
            }
            warn!(count, "Batch key generation rolled back");
            return Err(e);
        }

        info!(count, ttl_hours, "Batch of API keys generated");
        Ok(generated)
    }

    /// Extend the expiry of many keys, reporting per-key outcomes
    ///
    /// Missing keys fail individually without aborting the rest. One store
    /// write covers the whole batch; on persist failure every extension is
    /// undone.
    pub async fn batch_extend_keys(
        &self,
        targets: &[String],
        extend_hours: i64,
    ) -> Result<BatchResult, KeyError> {
        if targets.is_empty() || targets.len() > BATCH_MAX {
            return Err(KeyError::Validation(format!(
                "keys must contain between 1 and {} entries",
                BATCH_MAX
            )));
        }
        if extend_hours <= 0 {
            return Err(KeyError::Validation(
                "extend_hours must be at least 1".to_string(),
            ));
        }

        let mut keys = self.keys.write().await;

        let mut items = Vec::with_capacity(targets.len());
        let mut previous: Vec<(String, DateTime<Utc>)> = Vec::new();
        for target in targets {
            match keys.get_mut(target) {
                Some(record) => {
                    previous.push((target.clone(), record.expires_at));
                    record.expires_at += Duration::hours(extend_hours);
                    items.push(BatchItemResult::ok(target));
                }
                None => items.push(BatchItemResult::failed(target, "API key not found")),
            }
        }

        if let Err(e) = self.store.save_all(&keys).await {
            // Reverse order so a key listed twice ends on its oldest snapshot
            for (target, expires_at) in previous.into_iter().rev() {
                if let Some(record) = keys.get_mut(&target) {
                    record.expires_at = expires_at;
                }
            }
            warn!("Batch key extension rolled back");
            return Err(e);
        }

        let result = BatchResult::from_items(items);
        info!(
            succeeded = result.succeeded,
            failed = result.failed,
            extend_hours,
            "Batch of API keys extended"
        );
        Ok(result)
    }

    /// Delete many keys, reporting per-key outcomes
    pub async fn batch_delete_keys(&self, targets: &[String]) -> Result<BatchResult, KeyError> {
        if targets.is_empty() || targets.len() > BATCH_MAX {
            return Err(KeyError::Validation(format!(
                "keys must contain between 1 and {} entries",
                BATCH_MAX
            )));
        }

        let mut keys = self.keys.write().await;

        let mut items = Vec::with_capacity(targets.len());
        let mut removed = Vec::new();
        for target in targets {
            match keys.remove(target) {
                Some(record) => {
                    removed.push(record);
                    items.push(BatchItemResult::ok(target));
                }
                None => items.push(BatchItemResult::failed(target, "API key not found")),
            }
        }

        if let Err(e) = self.store.save_all(&keys).await {
            for record in removed {
                keys.insert(record.key.clone(), record);
            }
            warn!("Batch key deletion rolled back");
            return Err(e);
        }

        let result = BatchResult::from_items(items);
        info!(
            succeeded = result.succeeded,
            failed = result.failed,
            "Batch of API keys deleted"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    async fn test_service(dir: &TempDir) -> ApiKeyService {
        ApiKeyService::new(dir.path().join("apikeys.json"))
            .await
            .unwrap()
    }

    /// Service whose store path sits under a regular file, so every save fails
    async fn broken_service(dir: &TempDir) -> ApiKeyService {
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        ApiKeyService::new(blocker.join("apikeys.json"))
            .await
            .unwrap()
    }

    #[test]
    fn test_generated_value_format() {
        let value = generate_key_value().unwrap();
        assert!(is_api_key_format(&value));
        assert_eq!(value.len(), 43);
        assert!(value.starts_with("sk-"));
    }

    #[test]
    fn test_generated_values_unique() {
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(generate_key_value().unwrap()));
        }
    }

    #[test]
    fn test_key_format_check() {
        assert!(is_api_key_format(
            "sk-0123456789abcdef0123456789abcdef01234567"
        ));
        assert!(!is_api_key_format("sk-short"));
        assert!(!is_api_key_format(
            "pk-0123456789abcdef0123456789abcdef01234567"
        ));
        assert!(!is_api_key_format(
            "sk-0123456789ABCDEF0123456789abcdef01234567"
        ));
        assert!(!is_api_key_format(""));
    }

    #[tokio::test]
    async fn test_generate_key_persists() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir).await;

        let record = service.generate_key(24, "ci pipeline").await.unwrap();
        assert!(is_api_key_format(&record.key));
        assert!(record.first_used_at.is_none());
        assert_eq!(record.description, "ci pipeline");

        // A fresh service on the same path must see the key
        let reopened = test_service(&dir).await;
        let loaded = reopened.get_key(&record.key).await.unwrap();
        assert_eq!(loaded, record);
    }

    #[tokio::test]
    async fn test_generate_key_rejects_bad_ttl() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir).await;

        assert!(matches!(
            service.generate_key(0, "x").await,
            Err(KeyError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_generate_key_rolls_back_on_save_failure() {
        let dir = TempDir::new().unwrap();
        let service = broken_service(&dir).await;

        let result = service.generate_key(24, "x").await;
        assert!(matches!(result, Err(KeyError::Persistence(_))));
        assert!(service.list_keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_validate_unknown_key() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir).await;

        let valid = service
            .validate_key("sk-0000000000000000000000000000000000000000")
            .await
            .unwrap();
        assert!(!valid);
    }

    #[tokio::test]
    async fn test_validate_activates_once() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir).await;

        let record = service.generate_key(24, "x").await.unwrap();

        assert!(service.validate_key(&record.key).await.unwrap());
        let activated = service.get_key(&record.key).await.unwrap();
        let first_used = activated.first_used_at.expect("should be activated");
        assert_eq!(activated.expires_at, first_used + Duration::hours(24));

        // Second validation must not move the window
        assert!(service.validate_key(&record.key).await.unwrap());
        let replay = service.get_key(&record.key).await.unwrap();
        assert_eq!(replay.first_used_at, activated.first_used_at);
        assert_eq!(replay.expires_at, activated.expires_at);
    }

    #[tokio::test]
    async fn test_validate_activation_survives_restart() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir).await;

        let record = service.generate_key(24, "x").await.unwrap();
        service.validate_key(&record.key).await.unwrap();

        let reopened = test_service(&dir).await;
        let loaded = reopened.get_key(&record.key).await.unwrap();
        assert!(loaded.first_used_at.is_some());
    }

    #[tokio::test]
    async fn test_validate_dormant_key_with_past_expiry() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir).await;

        let record = service.generate_key(24, "x").await.unwrap();
        service
            .update_key_expiry(&record.key, Some(Utc::now() - Duration::days(30)), None)
            .await
            .unwrap();

        // Dormant, so the provisional expiry does not count
        assert!(service.validate_key(&record.key).await.unwrap());
    }

    #[tokio::test]
    async fn test_validate_expired_activated_key() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir).await;

        let record = service.generate_key(24, "x").await.unwrap();
        assert!(service.validate_key(&record.key).await.unwrap());

        service
            .update_key_expiry(&record.key, Some(Utc::now() - Duration::hours(1)), None)
            .await
            .unwrap();

        assert!(!service.validate_key(&record.key).await.unwrap());
    }

    #[tokio::test]
    async fn test_revoke_key() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir).await;

        let record = service.generate_key(24, "x").await.unwrap();
        service.revoke_key(&record.key).await.unwrap();

        assert_eq!(service.get_key(&record.key).await, Err(KeyError::NotFound));
        assert!(!service.validate_key(&record.key).await.unwrap());
        assert_eq!(service.revoke_key(&record.key).await, Err(KeyError::NotFound));
    }

    #[tokio::test]
    async fn test_update_expiry_requires_a_mode() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir).await;

        let record = service.generate_key(24, "x").await.unwrap();
        let result = service.update_key_expiry(&record.key, None, None).await;
        assert!(matches!(result, Err(KeyError::Validation(_))));

        let unchanged = service.get_key(&record.key).await.unwrap();
        assert_eq!(unchanged, record);
    }

    #[tokio::test]
    async fn test_update_expiry_absolute_wins() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir).await;

        let record = service.generate_key(24, "x").await.unwrap();
        let target = Utc::now() + Duration::days(7);

        let updated = service
            .update_key_expiry(&record.key, Some(target), Some(1000))
            .await
            .unwrap();
        assert_eq!(updated.expires_at, target);
    }

    #[tokio::test]
    async fn test_update_expiry_extend() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir).await;

        let record = service.generate_key(24, "x").await.unwrap();
        let updated = service
            .update_key_expiry(&record.key, None, Some(48))
            .await
            .unwrap();
        assert_eq!(updated.expires_at, record.expires_at + Duration::hours(48));

        let result = service
            .update_key_expiry(&record.key, None, Some(0))
            .await;
        assert!(matches!(result, Err(KeyError::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_expiry_unknown_key() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir).await;

        let result = service
            .update_key_expiry(
                "sk-0000000000000000000000000000000000000000",
                None,
                Some(1),
            )
            .await;
        assert_eq!(result, Err(KeyError::NotFound));
    }

    #[tokio::test]
    async fn test_batch_generate() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir).await;

        let generated = service.batch_generate_keys(50, 24, "load-test").await.unwrap();
        assert_eq!(generated.len(), 50);
        assert_eq!(generated[0].description, "load-test-1");
        assert_eq!(generated[49].description, "load-test-50");

        let unique: HashSet<&str> = generated.iter().map(|k| k.key.as_str()).collect();
        assert_eq!(unique.len(), 50);

        let reopened = test_service(&dir).await;
        assert_eq!(reopened.list_keys().await.len(), 50);
    }

    #[tokio::test]
    async fn test_batch_generate_count_bounds() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir).await;

        assert!(matches!(
            service.batch_generate_keys(0, 24, "x").await,
            Err(KeyError::Validation(_))
        ));
        assert!(matches!(
            service.batch_generate_keys(BATCH_MAX + 1, 24, "x").await,
            Err(KeyError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_batch_generate_rolls_back_on_save_failure() {
        let dir = TempDir::new().unwrap();
        let service = broken_service(&dir).await;

        let result = service.batch_generate_keys(10, 24, "x").await;
        assert!(matches!(result, Err(KeyError::Persistence(_))));
        assert!(service.list_keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_batch_extend_mixed() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir).await;

        let a = service.generate_key(24, "a").await.unwrap();
        let b = service.generate_key(24, "b").await.unwrap();
        let missing = "sk-0000000000000000000000000000000000000000".to_string();

        let result = service
            .batch_extend_keys(&[a.key.clone(), missing.clone(), b.key.clone()], 12)
            .await
            .unwrap();

        assert_eq!(result.succeeded, 2);
        assert_eq!(result.failed, 1);
        assert!(!result.results[1].success);
        assert_eq!(result.results[1].key, missing);

        let extended = service.get_key(&a.key).await.unwrap();
        assert_eq!(extended.expires_at, a.expires_at + Duration::hours(12));
    }

    #[tokio::test]
    async fn test_batch_extend_rollback_with_duplicate_key() {
        let dir = TempDir::new().unwrap();
        let store_path = dir.path().join("apikeys.json");
        let service = ApiKeyService::new(&store_path).await.unwrap();

        let record = service.generate_key(24, "x").await.unwrap();

        // Replace the store file with a directory so the next save fails
        std::fs::remove_file(&store_path).unwrap();
        std::fs::create_dir(&store_path).unwrap();

        let result = service
            .batch_extend_keys(&[record.key.clone(), record.key.clone()], 12)
            .await;
        assert!(matches!(result, Err(KeyError::Persistence(_))));

        let unchanged = service.get_key(&record.key).await.unwrap();
        assert_eq!(unchanged.expires_at, record.expires_at);
    }

    #[tokio::test]
    async fn test_batch_extend_save_failure_is_persistence_error() {
        let dir = TempDir::new().unwrap();
        let service = broken_service(&dir).await;

        let missing = "sk-0000000000000000000000000000000000000000".to_string();
        let result = service.batch_extend_keys(&[missing], 12).await;
        assert!(matches!(result, Err(KeyError::Persistence(_))));
    }

    #[tokio::test]
    async fn test_batch_delete_mixed() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir).await;

        let a = service.generate_key(24, "a").await.unwrap();
        let b = service.generate_key(24, "b").await.unwrap();
        let missing = "sk-0000000000000000000000000000000000000000".to_string();

        let result = service
            .batch_delete_keys(&[a.key.clone(), missing.clone()])
            .await
            .unwrap();

        assert_eq!(result.succeeded, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(
            result.results[1].error.as_deref(),
            Some("API key not found")
        );

        assert_eq!(service.get_key(&a.key).await, Err(KeyError::NotFound));
        assert!(service.get_key(&b.key).await.is_ok());
    }

    #[tokio::test]
    async fn test_batch_delete_empty_is_invalid() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir).await;

        assert!(matches!(
            service.batch_delete_keys(&[]).await,
            Err(KeyError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_list_keys_oldest_first() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir).await;

        for i in 0..3 {
            service.generate_key(24, &format!("key {}", i)).await.unwrap();
        }

        let list = service.list_keys().await;
        assert_eq!(list.len(), 3);
        assert!(list.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }
}
