//! Persistence boundary for CouponFinder.
//!
//! Everything the app persists goes through the generic [`KeyValueStore`]
//! trait: a flat map of string keys to JSON values, namespaced by key prefix
//! (`cache:<domain>`, `credential:api_key`, `settings:model`).
//!
//! Two implementations are provided:
//! - [`Storage`], a libSQL database file used by the CLI
//! - [`MemoryStore`], an in-process map for tests and embedding

mod memory;
mod migrations;

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use couponfinder_shared::{CouponFinderError, Result};
use libsql::{Connection, Database, params};
use serde_json::Value;

pub use memory::MemoryStore;

/// Generic key-value persistence.
///
/// Mirrors a browser-extension style storage area: batch `get`, `set` and
/// `remove`, plus `get_all` for prefix scans done by the caller.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch the given keys. Missing keys are simply absent from the map.
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>>;

    /// Insert or overwrite every entry in `items`.
    async fn set(&self, items: HashMap<String, Value>) -> Result<()>;

    /// Remove the given keys. Removing a missing key is not an error.
    async fn remove(&self, keys: &[&str]) -> Result<()>;

    /// Fetch every stored entry.
    async fn get_all(&self) -> Result<HashMap<String, Value>>;
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path` and bring its schema up to date.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CouponFinderError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| CouponFinderError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| CouponFinderError::Storage(e.to_string()))?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        CouponFinderError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }
}

#[async_trait]
impl KeyValueStore for Storage {
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>> {
        let mut found = HashMap::new();
        for key in keys {
            let mut rows = self
                .conn
                .query(
                    "SELECT value_json FROM kv_store WHERE key = ?1",
                    params![*key],
                )
                .await
                .map_err(|e| CouponFinderError::Storage(e.to_string()))?;

            match rows.next().await {
                Ok(Some(row)) => {
                    let raw: String = row
                        .get(0)
                        .map_err(|e| CouponFinderError::Storage(e.to_string()))?;
                    found.insert((*key).to_string(), decode_value(key, &raw)?);
                }
                Ok(None) => {}
                Err(e) => return Err(CouponFinderError::Storage(e.to_string())),
            }
        }
        Ok(found)
    }

    async fn set(&self, items: HashMap<String, Value>) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        for (key, value) in items {
            let json = serde_json::to_string(&value)
                .map_err(|e| CouponFinderError::Serialization(e.to_string()))?;
            self.conn
                .execute(
                    "INSERT INTO kv_store (key, value_json, updated_at)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET
                       value_json = excluded.value_json,
                       updated_at = excluded.updated_at",
                    params![key.as_str(), json.as_str(), now.as_str()],
                )
                .await
                .map_err(|e| CouponFinderError::Storage(e.to_string()))?;
        }
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.conn
                .execute("DELETE FROM kv_store WHERE key = ?1", params![*key])
                .await
                .map_err(|e| CouponFinderError::Storage(e.to_string()))?;
        }
        Ok(())
    }

    async fn get_all(&self) -> Result<HashMap<String, Value>> {
        let mut rows = self
            .conn
            .query("SELECT key, value_json FROM kv_store", params![])
            .await
            .map_err(|e| CouponFinderError::Storage(e.to_string()))?;

        let mut results = HashMap::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| CouponFinderError::Storage(e.to_string()))?
        {
            let key: String = row
                .get(0)
                .map_err(|e| CouponFinderError::Storage(e.to_string()))?;
            let raw: String = row
                .get(1)
                .map_err(|e| CouponFinderError::Storage(e.to_string()))?;
            let value = decode_value(&key, &raw)?;
            results.insert(key, value);
        }
        Ok(results)
    }
}

/// Parse a stored JSON document.
fn decode_value(key: &str, raw: &str) -> Result<Value> {
    serde_json::from_str(raw)
        .map_err(|e| CouponFinderError::Serialization(format!("value at {key}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("cf_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn items(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        let version = storage.get_schema_version().await;
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("cf_test_{}.db", Uuid::now_v7()));
        let _s1 = Storage::open(&tmp).await.expect("first open");
        drop(_s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn set_get_overwrite() {
        let storage = test_storage().await;

        let missing = storage.get(&["cache:kohls.com"]).await.expect("get miss");
        assert!(missing.is_empty());

        storage
            .set(items(&[("cache:kohls.com", json!({"records": []}))]))
            .await
            .expect("set");
        let found = storage.get(&["cache:kohls.com"]).await.expect("get hit");
        assert_eq!(found["cache:kohls.com"], json!({"records": []}));

        storage
            .set(items(&[("cache:kohls.com", json!({"records": ["x"]}))]))
            .await
            .expect("overwrite");
        let found = storage.get(&["cache:kohls.com"]).await.expect("get again");
        assert_eq!(found["cache:kohls.com"], json!({"records": ["x"]}));
    }

    #[tokio::test]
    async fn batch_get_returns_only_present_keys() {
        let storage = test_storage().await;
        storage
            .set(items(&[
                ("credential:api_key", json!("c2VjcmV0")),
                ("settings:model", json!("gemini-1.5-pro")),
            ]))
            .await
            .expect("set");

        let found = storage
            .get(&["credential:api_key", "settings:model", "cache:nope.com"])
            .await
            .expect("get");
        assert_eq!(found.len(), 2);
        assert_eq!(found["settings:model"], json!("gemini-1.5-pro"));
    }

    #[tokio::test]
    async fn remove_and_get_all() {
        let storage = test_storage().await;
        storage
            .set(items(&[
                ("cache:a.com", json!(1)),
                ("cache:b.com", json!(2)),
                ("settings:model", json!("m")),
            ]))
            .await
            .expect("set");

        storage
            .remove(&["cache:a.com", "cache:never-stored.com"])
            .await
            .expect("remove");

        let all = storage.get_all().await.expect("get all");
        assert_eq!(all.len(), 2);
        assert!(all.contains_key("cache:b.com"));
        assert!(all.contains_key("settings:model"));
    }

    #[tokio::test]
    async fn data_survives_reopen() {
        let tmp = std::env::temp_dir().join(format!("cf_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.unwrap();
        s1.set(items(&[("settings:model", json!("gemini-1.5-pro"))]))
            .await
            .unwrap();
        drop(s1);

        let s2 = Storage::open(&tmp).await.unwrap();
        let found = s2.get(&["settings:model"]).await.unwrap();
        assert_eq!(found["settings:model"], json!("gemini-1.5-pro"));
    }

    #[tokio::test]
    async fn get_all_fails_instead_of_returning_partial_map() {
        let storage = test_storage().await;
        storage
            .set(items(&[("cache:a.com", json!([]))]))
            .await
            .unwrap();
        storage
            .conn
            .execute(
                "INSERT INTO kv_store (key, value_json, updated_at) VALUES (?1, ?2, ?3)",
                params!["cache:b.com", "{not json", "2024-01-01T00:00:00Z"],
            )
            .await
            .unwrap();

        let err = storage.get_all().await.unwrap_err();
        assert!(err.to_string().contains("cache:b.com"));
    }
}
