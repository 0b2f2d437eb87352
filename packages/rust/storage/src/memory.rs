//! In-process [`KeyValueStore`] backed by a `HashMap`.

use std::collections::HashMap;

use async_trait::async_trait;
use couponfinder_shared::Result;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::KeyValueStore;

/// Non-persistent key-value store. Safe to share across tasks.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>> {
        let entries = self.entries.read().await;
        Ok(keys
            .iter()
            .filter_map(|k| entries.get(*k).map(|v| ((*k).to_string(), v.clone())))
            .collect())
    }

    async fn set(&self, items: HashMap<String, Value>) -> Result<()> {
        self.entries.write().await.extend(items);
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<()> {
        let mut entries = self.entries.write().await;
        for key in keys {
            entries.remove(*key);
        }
        Ok(())
    }

    async fn get_all(&self) -> Result<HashMap<String, Value>> {
        Ok(self.entries.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_get_remove() {
        let store = MemoryStore::new();
        assert!(store.is_empty().await);

        store
            .set(HashMap::from([
                ("cache:a.com".to_string(), json!([1, 2])),
                ("settings:model".to_string(), json!("m")),
            ]))
            .await
            .unwrap();
        assert_eq!(store.len().await, 2);

        let found = store.get(&["cache:a.com", "cache:b.com"]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found["cache:a.com"], json!([1, 2]));

        store.remove(&["cache:a.com", "cache:b.com"]).await.unwrap();
        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all.contains_key("settings:model"));
    }
}
