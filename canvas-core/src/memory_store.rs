use crate::store::KeyValueStore;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// In-process key-value store. Clones share the same map.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<HashMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        let inner = self.inner.read().map_err(|_| anyhow!("memory store lock poisoned"))?;
        let mut keys: Vec<String> = inner.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    /// Put a raw value, bypassing any structural checks. Used to seed
    /// corrupt records.
    pub fn insert_raw(&self, key: &str, value: Value) -> Result<()> {
        let mut inner = self.inner.write().map_err(|_| anyhow!("memory store lock poisoned"))?;
        inner.insert(key.to_string(), value);
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: Option<&str>) -> Result<HashMap<String, Value>> {
        let inner = self.inner.read().map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(match key {
            Some(key) => inner
                .get(key)
                .map(|v| HashMap::from([(key.to_string(), v.clone())]))
                .unwrap_or_default(),
            None => inner.clone(),
        })
    }

    async fn set(&self, items: HashMap<String, Value>) -> Result<()> {
        let mut inner = self.inner.write().map_err(|_| anyhow!("memory store lock poisoned"))?;
        inner.extend(items);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut inner = self.inner.write().map_err(|_| anyhow!("memory store lock poisoned"))?;
        inner.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_set_remove() {
        let store = MemoryStore::new();
        store
            .set(HashMap::from([
                ("a".to_string(), json!(1)),
                ("b".to_string(), json!({"x": true})),
            ]))
            .await
            .unwrap();

        let one = store.get(Some("a")).await.unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one["a"], json!(1));

        assert_eq!(store.get(None).await.unwrap().len(), 2);
        assert!(store.get(Some("missing")).await.unwrap().is_empty());

        store.remove("a").await.unwrap();
        assert_eq!(store.keys().unwrap(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = MemoryStore::new();
        let other = store.clone();
        store.insert_raw("k", json!("v")).unwrap();
        assert_eq!(other.get(Some("k")).await.unwrap()["k"], json!("v"));
    }
}
