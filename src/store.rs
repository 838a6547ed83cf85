//! Persistence Service contracts and backends.
//!
//! The draw engine depends only on [`ConfigStore`] and [`ResultStore`]. Two
//! backends are provided: [`InMemoryStore`] and, with the `std` feature,
//! [`JsonFileStore`], which keeps everything in one JSON document shared with
//! the rest of the festival application.

use crate::engine::LotteryError;
use crate::model::{now_millis, LotteryConfig, LotteryConfigPatch, LotteryResult, Number, ResultId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

/// Document key holding the result history.
pub const RESULTS_KEY: &str = "lotteryResults";

/// Pre-history layouts stored a single result under this key.
pub const LEGACY_RESULT_KEY: &str = "lotteryResult";

// ============================================================================
// CONTRACTS
// ============================================================================

/// Durable lottery configuration.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Returns the current configuration.
    async fn config(&self) -> Result<LotteryConfig, LotteryError>;

    /// Merges `patch` into the stored configuration.
    ///
    /// The merged configuration is validated before anything is written;
    /// an invalid merge leaves the stored value untouched.
    async fn update_config(&self, patch: LotteryConfigPatch) -> Result<LotteryConfig, LotteryError>;
}

/// Append-only result history.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Returns every stored result in storage (append) order.
    async fn history(&self) -> Result<Vec<LotteryResult>, LotteryError>;

    /// Appends a result. The store assigns `id` and `timestamp`.
    async fn append_result(&self, title: &str, numbers: &[Number]) -> Result<LotteryResult, LotteryError>;

    /// Deletes one result. Returns `false` if `id` is unknown.
    async fn delete_result(&self, id: &str) -> Result<bool, LotteryError>;

    /// Removes all results. Idempotent.
    async fn clear_results(&self) -> Result<(), LotteryError>;

    /// Returns the most recently appended result, if any.
    async fn latest_result(&self) -> Result<Option<LotteryResult>, LotteryError> {
        Ok(self.history().await?.pop())
    }
}

/// A store serving both configuration and history.
pub trait LotteryStore: ConfigStore + ResultStore {}

impl<T: ConfigStore + ResultStore + ?Sized> LotteryStore for T {}

// ============================================================================
// DOCUMENT
// ============================================================================

/// The persisted document.
///
/// Keys owned by other parts of the application are carried in `other` and
/// written back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreDocument {
    #[serde(default)]
    pub lottery_config: LotteryConfig,
    #[serde(default)]
    pub lottery_results: Vec<LotteryResult>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl StoreDocument {
    /// Parses a raw document, hoisting a legacy single result if present.
    ///
    /// Returns the document and whether a migration took place.
    pub fn from_value(mut value: Value) -> Result<(Self, bool), LotteryError> {
        let migrated = migrate_legacy(&mut value);
        let document = serde_json::from_value(value)
            .map_err(|e| LotteryError::Serialization(e.to_string()))?;
        Ok((document, migrated))
    }

    fn update_config(&mut self, patch: &LotteryConfigPatch) -> Result<LotteryConfig, LotteryError> {
        let merged = self.lottery_config.merged(patch);
        merged.validate()?;
        self.lottery_config = merged.clone();
        Ok(merged)
    }

    fn append_result(&mut self, title: &str, numbers: &[Number]) -> LotteryResult {
        let timestamp = now_millis();
        let result = LotteryResult {
            id: self.next_id(timestamp),
            title: title.to_string(),
            numbers: numbers.to_vec(),
            timestamp,
        };
        self.lottery_results.push(result.clone());
        result
    }

    fn delete_result(&mut self, id: &str) -> bool {
        match self.lottery_results.iter().position(|r| r.id == id) {
            Some(index) => {
                self.lottery_results.remove(index);
                true
            }
            None => false,
        }
    }

    /// Millisecond timestamp, suffixed when two results land in the same millisecond.
    fn next_id(&self, timestamp: i64) -> ResultId {
        let taken = |id: &str| self.lottery_results.iter().any(|r| r.id == id);
        let base = timestamp.to_string();
        if !taken(base.as_str()) {
            return base;
        }
        (1u64..)
            .map(|n| format!("{base}-{n}"))
            .find(|id| !taken(id.as_str()))
            .unwrap_or(base)
    }
}

/// Rewrites a legacy `lotteryResult` field into a one-element `lotteryResults` array.
///
/// Only applies when `lotteryResults` is absent. A null legacy value becomes an
/// empty history. Returns true if the document changed.
pub fn migrate_legacy(document: &mut Value) -> bool {
    let Some(object) = document.as_object_mut() else {
        return false;
    };
    if !object.contains_key(LEGACY_RESULT_KEY) || object.contains_key(RESULTS_KEY) {
        return false;
    }

    let legacy = object.remove(LEGACY_RESULT_KEY).unwrap_or(Value::Null);
    let hoisted = if legacy.is_null() { Vec::new() } else { vec![legacy] };
    object.insert(RESULTS_KEY.to_string(), Value::Array(hoisted));

    tracing::warn!(event = "legacy_migrated", "Hoisted legacy lotteryResult into lotteryResults");
    true
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// Volatile store for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    document: RwLock<StoreDocument>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: LotteryConfig) -> Self {
        Self::from_document(StoreDocument {
            lottery_config: config,
            ..Default::default()
        })
    }

    pub fn from_document(document: StoreDocument) -> Self {
        Self {
            document: RwLock::new(document),
        }
    }

    /// Returns a copy of the current document.
    pub async fn document(&self) -> StoreDocument {
        self.document.read().await.clone()
    }
}

#[async_trait]
impl ConfigStore for InMemoryStore {
    async fn config(&self) -> Result<LotteryConfig, LotteryError> {
        Ok(self.document.read().await.lottery_config.clone())
    }

    async fn update_config(&self, patch: LotteryConfigPatch) -> Result<LotteryConfig, LotteryError> {
        self.document.write().await.update_config(&patch)
    }
}

#[async_trait]
impl ResultStore for InMemoryStore {
    async fn history(&self) -> Result<Vec<LotteryResult>, LotteryError> {
        Ok(self.document.read().await.lottery_results.clone())
    }

    async fn append_result(&self, title: &str, numbers: &[Number]) -> Result<LotteryResult, LotteryError> {
        Ok(self.document.write().await.append_result(title, numbers))
    }

    async fn delete_result(&self, id: &str) -> Result<bool, LotteryError> {
        Ok(self.document.write().await.delete_result(id))
    }

    async fn clear_results(&self) -> Result<(), LotteryError> {
        self.document.write().await.lottery_results.clear();
        Ok(())
    }

    async fn latest_result(&self) -> Result<Option<LotteryResult>, LotteryError> {
        Ok(self.document.read().await.lottery_results.last().cloned())
    }
}

// ============================================================================
// JSON FILE STORE
// ============================================================================

#[cfg(feature = "std")]
pub use file::JsonFileStore;

#[cfg(feature = "std")]
mod file {
    use super::*;
    use crate::metrics::LotteryMetrics;
    use std::path::{Path, PathBuf};
    use std::time::Instant;
    use tokio::sync::Mutex;

    /// Store backed by a single JSON document on disk.
    ///
    /// The file is re-read on every operation so that writes made by other
    /// handlers are always visible. Writes go through a temporary file and a
    /// rename. Within one instance operations are serialized; across processes
    /// the last writer wins.
    #[derive(Debug)]
    pub struct JsonFileStore {
        path: PathBuf,
        lock: Mutex<()>,
        metrics: Option<LotteryMetrics>,
    }

    impl JsonFileStore {
        /// Opens the document at `path`, creating it with defaults on first boot.
        ///
        /// # Errors
        ///
        /// Returns `LotteryError::Storage` if the file cannot be read or created and
        /// `LotteryError::Serialization` if an existing document is not valid JSON.
        /// A corrupt document is never overwritten.
        pub async fn open(path: impl Into<PathBuf>) -> Result<Self, LotteryError> {
            Self::open_with_metrics(path, None).await
        }

        pub async fn open_with_metrics(
            path: impl Into<PathBuf>,
            metrics: Option<LotteryMetrics>,
        ) -> Result<Self, LotteryError> {
            let store = Self {
                path: path.into(),
                lock: Mutex::new(()),
                metrics,
            };

            if let Some(parent) = store.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| storage_error(parent, e))?;
            }

            let exists = tokio::fs::try_exists(&store.path)
                .await
                .map_err(|e| storage_error(&store.path, e))?;

            let guard = store.lock.lock().await;
            if exists {
                let document = store.load().await?;
                tracing::info!(
                    path = %store.path.display(),
                    results = document.lottery_results.len(),
                    "Loaded lottery store"
                );
            } else {
                store.save(&StoreDocument::default()).await?;
                tracing::info!(path = %store.path.display(), "Created lottery store with defaults");
            }
            drop(guard);

            Ok(store)
        }

        pub fn path(&self) -> &Path {
            &self.path
        }

        /// Reads the document, persisting any migration. Caller holds the lock.
        async fn load(&self) -> Result<StoreDocument, LotteryError> {
            let raw = tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|e| storage_error(&self.path, e))?;
            let value: Value = serde_json::from_str(&raw).map_err(|e| {
                tracing::error!(path = %self.path.display(), error = %e, "Corrupt lottery store");
                LotteryError::Serialization(e.to_string())
            })?;

            let (document, migrated) = StoreDocument::from_value(value)?;
            if migrated {
                self.save(&document).await?;
            }
            Ok(document)
        }

        /// Writes the document atomically. Caller holds the lock.
        async fn save(&self, document: &StoreDocument) -> Result<(), LotteryError> {
            let started = Instant::now();
            let bytes = serde_json::to_vec_pretty(document)
                .map_err(|e| LotteryError::Serialization(e.to_string()))?;

            let tmp = self.path.with_extension("json.tmp");
            tokio::fs::write(&tmp, &bytes)
                .await
                .map_err(|e| storage_error(&tmp, e))?;
            tokio::fs::rename(&tmp, &self.path)
                .await
                .map_err(|e| storage_error(&self.path, e))?;

            if let Some(metrics) = &self.metrics {
                metrics.observe_store_write(started.elapsed());
            }
            tracing::debug!(path = %self.path.display(), bytes = bytes.len(), "Saved lottery store");
            Ok(())
        }

        async fn read<T>(&self, f: impl FnOnce(&StoreDocument) -> T) -> Result<T, LotteryError> {
            let _guard = self.lock.lock().await;
            let document = self.load().await?;
            Ok(f(&document))
        }

        async fn modify<T>(
            &self,
            f: impl FnOnce(&mut StoreDocument) -> Result<T, LotteryError>,
        ) -> Result<T, LotteryError> {
            let _guard = self.lock.lock().await;
            let mut document = self.load().await?;
            let output = f(&mut document)?;
            self.save(&document).await?;
            Ok(output)
        }
    }

    fn storage_error(path: &Path, e: std::io::Error) -> LotteryError {
        LotteryError::Storage(format!("{}: {}", path.display(), e))
    }

    #[async_trait]
    impl ConfigStore for JsonFileStore {
        async fn config(&self) -> Result<LotteryConfig, LotteryError> {
            self.read(|d| d.lottery_config.clone()).await
        }

        async fn update_config(&self, patch: LotteryConfigPatch) -> Result<LotteryConfig, LotteryError> {
            self.modify(|d| d.update_config(&patch)).await
        }
    }

    #[async_trait]
    impl ResultStore for JsonFileStore {
        async fn history(&self) -> Result<Vec<LotteryResult>, LotteryError> {
            self.read(|d| d.lottery_results.clone()).await
        }

        async fn append_result(&self, title: &str, numbers: &[Number]) -> Result<LotteryResult, LotteryError> {
            let result = self.modify(|d| Ok(d.append_result(title, numbers))).await?;
            tracing::info!(id = %result.id, title = %result.title, "Saved lottery result");
            Ok(result)
        }

        async fn delete_result(&self, id: &str) -> Result<bool, LotteryError> {
            let _guard = self.lock.lock().await;
            let mut document = self.load().await?;
            if !document.delete_result(id) {
                return Ok(false);
            }
            self.save(&document).await?;
            tracing::info!(id = id, "Deleted lottery result");
            Ok(true)
        }

        async fn clear_results(&self) -> Result<(), LotteryError> {
            self.modify(|d| {
                d.lottery_results.clear();
                Ok(())
            })
            .await?;
            tracing::info!("Cleared lottery history");
            Ok(())
        }

        async fn latest_result(&self) -> Result<Option<LotteryResult>, LotteryError> {
            self.read(|d| d.lottery_results.last().cloned()).await
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ConfigError;
    use serde_json::json;

    #[tokio::test]
    async fn test_update_config_merges() {
        let store = InMemoryStore::new();
        let updated = store
            .update_config(LotteryConfigPatch::default().title("二等奖"))
            .await
            .unwrap();

        assert_eq!(updated.title, "二等奖");
        assert_eq!(updated.count, 5);
        assert_eq!(store.config().await.unwrap(), updated);
    }

    #[tokio::test]
    async fn test_invalid_update_rejected_and_not_written() {
        let store = InMemoryStore::with_config(LotteryConfig::new(1, 5, 2, "一等奖"));
        let result = store
            .update_config(LotteryConfigPatch::default().count(10))
            .await;

        assert_eq!(
            result,
            Err(LotteryError::InvalidConfig(ConfigError::CountOutOfRange { count: 10, span: 5 }))
        );
        assert_eq!(store.config().await.unwrap().count, 2);
    }

    #[tokio::test]
    async fn test_append_assigns_id_and_timestamp() {
        let store = InMemoryStore::new();
        let a = store.append_result("一等奖", &[1, 2, 3]).await.unwrap();
        let b = store.append_result("一等奖", &[4, 5, 6]).await.unwrap();

        assert_ne!(a.id, b.id);
        assert!(a.timestamp > 0);
        assert_eq!(store.latest_result().await.unwrap(), Some(b));
    }

    #[tokio::test]
    async fn test_delete_removes_exactly_one() {
        let store = InMemoryStore::new();
        let a = store.append_result("一等奖", &[1]).await.unwrap();
        let b = store.append_result("二等奖", &[2]).await.unwrap();
        let c = store.append_result("三等奖", &[3]).await.unwrap();

        let before = serde_json::to_string(&[&a, &c]).unwrap();
        assert!(store.delete_result(&b.id).await.unwrap());

        let remaining = store.history().await.unwrap();
        assert_eq!(serde_json::to_string(&remaining).unwrap(), before);
    }

    #[tokio::test]
    async fn test_delete_unknown_is_not_found() {
        let store = InMemoryStore::new();
        store.append_result("一等奖", &[1]).await.unwrap();
        assert!(!store.delete_result("no-such-id").await.unwrap());
        assert_eq!(store.history().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let store = InMemoryStore::new();
        store.append_result("一等奖", &[1]).await.unwrap();

        store.clear_results().await.unwrap();
        store.clear_results().await.unwrap();

        assert!(store.history().await.unwrap().is_empty());
        assert_eq!(store.latest_result().await.unwrap(), None);
    }

    #[test]
    fn test_next_id_suffixes_collisions() {
        let mut document = StoreDocument::default();
        document.lottery_results.push(LotteryResult {
            id: "1000".to_string(),
            title: "一等奖".to_string(),
            numbers: vec![1],
            timestamp: 1000,
        });

        assert_eq!(document.next_id(1000), "1000-1");
        assert_eq!(document.next_id(1001), "1001");
    }

    #[test]
    fn test_migrate_legacy_result() {
        let legacy = json!({ "id": "1", "title": "一等奖", "numbers": [3, 9], "timestamp": 1 });
        let mut document = json!({ "lotteryResult": legacy.clone(), "programs": [] });

        assert!(migrate_legacy(&mut document));
        assert_eq!(document["lotteryResults"], json!([legacy]));
        assert!(document.get("lotteryResult").is_none());
    }

    #[test]
    fn test_migrate_null_legacy_result() {
        let mut document = json!({ "lotteryResult": null });
        assert!(migrate_legacy(&mut document));
        assert_eq!(document["lotteryResults"], json!([]));
    }

    #[test]
    fn test_migrate_skips_current_layout() {
        let mut document = json!({ "lotteryResults": [] });
        assert!(!migrate_legacy(&mut document));
    }

    #[test]
    fn test_document_preserves_foreign_keys() {
        let raw = json!({
            "programs": [{ "id": "1", "title": "开场舞" }],
            "danmakus": [],
            "lotteryConfig": { "minNumber": 1, "maxNumber": 50, "count": 3, "title": "二等奖" },
            "lotteryResults": []
        });

        let (document, migrated) = StoreDocument::from_value(raw.clone()).unwrap();
        assert!(!migrated);
        assert_eq!(document.lottery_config.max_number, 50);
        assert_eq!(serde_json::to_value(&document).unwrap(), raw);
    }

    #[cfg(feature = "std")]
    mod file_tests {
        use super::*;
        use std::path::PathBuf;

        fn temp_path(name: &str) -> PathBuf {
            std::env::temp_dir()
                .join(format!("gala-lottery-{}-{}", name, now_millis()))
                .join("store.json")
        }

        #[tokio::test]
        async fn test_first_boot_writes_defaults() {
            let path = temp_path("boot");
            let store = JsonFileStore::open(&path).await.unwrap();

            assert!(path.exists());
            assert_eq!(store.config().await.unwrap(), LotteryConfig::default());
            assert!(store.history().await.unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_writes_survive_reopen() {
            let path = temp_path("reopen");
            let store = JsonFileStore::open(&path).await.unwrap();
            store
                .update_config(LotteryConfigPatch::default().range(1, 10).count(3))
                .await
                .unwrap();
            let saved = store.append_result("一等奖", &[2, 4, 6]).await.unwrap();

            let reopened = JsonFileStore::open(&path).await.unwrap();
            assert_eq!(reopened.config().await.unwrap().count, 3);
            assert_eq!(reopened.history().await.unwrap(), vec![saved]);
        }

        #[tokio::test]
        async fn test_open_migrates_legacy_document() {
            let path = temp_path("legacy");
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            let legacy = json!({ "id": "7", "title": "一等奖", "numbers": [1, 2], "timestamp": 7 });
            std::fs::write(
                &path,
                serde_json::to_vec(&json!({ "lotteryResult": legacy, "programs": [] })).unwrap(),
            )
            .unwrap();

            let store = JsonFileStore::open(&path).await.unwrap();
            let history = store.history().await.unwrap();
            assert_eq!(history.len(), 1);
            assert_eq!(history[0].numbers, vec![1, 2]);

            let on_disk: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
            assert!(on_disk.get("lotteryResult").is_none());
            assert_eq!(on_disk["lotteryResults"].as_array().unwrap().len(), 1);
            assert_eq!(on_disk["programs"], json!([]));
        }

        #[tokio::test]
        async fn test_corrupt_document_is_not_overwritten() {
            let path = temp_path("corrupt");
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, b"{ not json").unwrap();

            let result = JsonFileStore::open(&path).await;
            assert!(matches!(result, Err(LotteryError::Serialization(_))));
            assert_eq!(std::fs::read(&path).unwrap(), b"{ not json");
        }

        #[tokio::test]
        async fn test_sees_external_writes() {
            let path = temp_path("external");
            let store = JsonFileStore::open(&path).await.unwrap();

            let mut document: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
            document["lotteryConfig"]["count"] = json!(9);
            std::fs::write(&path, serde_json::to_vec(&document).unwrap()).unwrap();

            assert_eq!(store.config().await.unwrap().count, 9);
        }
    }
}
