//! Stockage en mémoire, pour les tests et l'exécution locale

use crate::error::{Result, StoreError};
use crate::DurableStore;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

/// Base par défaut des URLs "signées" du stockage mémoire
pub const DEFAULT_BASE_URL: &str = "memory://audra";

/// Objet stocké
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_type: String,
}

/// Stockage volatil
///
/// Les URLs de lecture ont la forme `{base_url}/{key}?expires={secs}`. Chaque
/// opération peut être forcée en échec pour simuler une panne du stockage.
#[derive(Debug)]
pub struct MemoryStore {
    base_url: String,
    objects: RwLock<HashMap<String, StoredObject>>,
    fail_exists: AtomicBool,
    fail_presign: AtomicBool,
    fail_put: AtomicBool,
    put_count: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Crée un stockage dont les URLs de lecture pointent vers `base_url`
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: RwLock::new(HashMap::new()),
            fail_exists: AtomicBool::new(false),
            fail_presign: AtomicBool::new(false),
            fail_put: AtomicBool::new(false),
            put_count: AtomicUsize::new(0),
        }
    }

    /// Lit un objet
    pub async fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.read().await.get(key).cloned()
    }

    /// Nombre d'objets stockés
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    /// Nombre d'appels à `put`, réussis ou non
    pub fn put_count(&self) -> usize {
        self.put_count.load(Ordering::SeqCst)
    }

    pub fn set_fail_exists(&self, fail: bool) {
        self.fail_exists.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_presign(&self, fail: bool) {
        self.fail_presign.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_put(&self, fail: bool) {
        self.fail_put.store(fail, Ordering::SeqCst);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        if self.fail_exists.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("existence check failed".into()));
        }
        Ok(self.objects.read().await.contains_key(key))
    }

    async fn presigned_read_url(&self, key: &str, ttl: Duration) -> Result<String> {
        if self.fail_presign.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("signing failed".into()));
        }
        if !self.objects.read().await.contains_key(key) {
            return Err(StoreError::NotFound(key.to_string()));
        }
        Ok(format!("{}/{}?expires={}", self.base_url, key, ttl.as_secs()))
    }

    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<()> {
        self.put_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("write failed".into()));
        }
        self.objects.write().await.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_then_exists_and_presign() {
        let store = MemoryStore::new();
        assert!(!store.exists("audio/a.webm").await.unwrap());

        store
            .put("audio/a.webm", Bytes::from_static(b"OggS"), "audio/webm")
            .await
            .unwrap();

        assert!(store.exists("audio/a.webm").await.unwrap());
        let url = store
            .presigned_read_url("audio/a.webm", Duration::from_secs(86_400))
            .await
            .unwrap();
        assert_eq!(url, "memory://audra/audio/a.webm?expires=86400");

        let object = store.get("audio/a.webm").await.unwrap();
        assert_eq!(object.data, Bytes::from_static(b"OggS"));
        assert_eq!(object.content_type, "audio/webm");
        assert_eq!(store.put_count(), 1);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MemoryStore::new();
        store.set_fail_exists(true);
        store.set_fail_put(true);

        assert!(store.exists("k").await.is_err());
        assert!(store.put("k", Bytes::new(), "audio/mp4").await.is_err());
        assert_eq!(store.put_count(), 1);
        assert!(store.is_empty().await);
    }
}
