//! # audracache - Cache des résolutions de pistes
//!
//! Les URLs renvoyées par les backends amont expirent au bout de quelques
//! heures. Ce cache garde, par identifiant de piste, la dernière liste de
//! renditions résolue jusqu'à son échéance, pour éviter de réinterroger les
//! backends à chaque requête.
//!
//! L'échéance est propre à chaque entrée (elle dépend du backend qui a
//! répondu) et n'est vérifiée qu'à la lecture : aucune tâche de fond ne purge
//! le cache.

use async_trait::async_trait;
use audraresolver::{ResolutionResult, TrackId};
use moka::future::Cache as MokaCache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Capacité par défaut du cache mémoire
pub const DEFAULT_MAX_ENTRIES: u64 = 10_000;

/// Cache des résolutions, injecté dans le résolveur de flux
#[async_trait]
pub trait ResolutionCache: Send + Sync {
    /// Résultat non expiré pour cette piste, s'il existe
    ///
    /// Une entrée expirée est retirée au passage et `None` est renvoyé.
    async fn get(&self, track_id: &TrackId) -> Option<ResolutionResult>;

    /// Enregistre un résultat valable `ttl` à partir de maintenant
    ///
    /// Remplace toute entrée existante pour la même piste.
    async fn put(&self, track_id: TrackId, result: ResolutionResult, ttl: Duration);

    /// Retire l'entrée d'une piste
    async fn invalidate(&self, track_id: &TrackId);

    /// Vide le cache
    async fn clear(&self);

    /// Nombre d'entrées actuellement stockées
    async fn stats(&self) -> CacheStats;
}

/// Statistiques du cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Nombre d'entrées (y compris celles expirées mais pas encore relues)
    pub entries: u64,
}

#[derive(Debug, Clone)]
struct Entry {
    result: ResolutionResult,
    expires_at: Instant,
}

/// Cache en mémoire basé sur moka
#[derive(Clone)]
pub struct MemoryResolutionCache {
    entries: Arc<MokaCache<TrackId, Entry>>,
}

impl MemoryResolutionCache {
    /// Crée un cache avec la capacité par défaut
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_ENTRIES)
    }

    /// Crée un cache borné à `max_entries` entrées
    pub fn with_capacity(max_entries: u64) -> Self {
        Self {
            entries: Arc::new(MokaCache::builder().max_capacity(max_entries).build()),
        }
    }
}

impl Default for MemoryResolutionCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResolutionCache for MemoryResolutionCache {
    async fn get(&self, track_id: &TrackId) -> Option<ResolutionResult> {
        let entry = self.entries.get(track_id).await?;
        if Instant::now() >= entry.expires_at {
            debug!(track_id = %track_id, "Resolution cache entry expired");
            self.entries.invalidate(track_id).await;
            return None;
        }
        trace!(track_id = %track_id, "Resolution cache hit");
        Some(entry.result)
    }

    async fn put(&self, track_id: TrackId, result: ResolutionResult, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.entries
            .insert(track_id, Entry { result, expires_at })
            .await;
    }

    async fn invalidate(&self, track_id: &TrackId) {
        self.entries.invalidate(track_id).await;
    }

    async fn clear(&self) {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks().await;
    }

    async fn stats(&self) -> CacheStats {
        self.entries.run_pending_tasks().await;
        CacheStats {
            entries: self.entries.entry_count(),
        }
    }
}

/// Cache désactivé : ne retient rien
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopResolutionCache;

#[async_trait]
impl ResolutionCache for NoopResolutionCache {
    async fn get(&self, _track_id: &TrackId) -> Option<ResolutionResult> {
        None
    }

    async fn put(&self, _track_id: TrackId, _result: ResolutionResult, _ttl: Duration) {}

    async fn invalidate(&self, _track_id: &TrackId) {}

    async fn clear(&self) {}

    async fn stats(&self) -> CacheStats {
        CacheStats::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audraresolver::Rendition;

    fn id(s: &str) -> TrackId {
        TrackId::new(s).unwrap()
    }

    fn result(url: &str, bitrate: u64) -> ResolutionResult {
        ResolutionResult::new(vec![Rendition::new(url, Some(bitrate), "opus", "webm")])
    }

    #[tokio::test]
    async fn test_put_then_get_returns_identical_result() {
        let cache = MemoryResolutionCache::new();
        let stored = result("https://a", 160_000);

        cache
            .put(id("abc"), stored.clone(), Duration::from_secs(3600))
            .await;

        assert_eq!(cache.get(&id("abc")).await, Some(stored));
        // Les identifiants sont sensibles à la casse
        assert_eq!(cache.get(&id("ABC")).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache = MemoryResolutionCache::new();
        cache
            .put(id("abc"), result("https://a", 1), Duration::from_secs(14_400))
            .await;

        tokio::time::advance(Duration::from_secs(14_399)).await;
        assert!(cache.get(&id("abc")).await.is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get(&id("abc")).await.is_none());
        assert_eq!(cache.stats().await.entries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_resets_expiry() {
        let cache = MemoryResolutionCache::new();
        cache
            .put(id("abc"), result("https://old", 1), Duration::from_secs(10))
            .await;
        tokio::time::advance(Duration::from_secs(8)).await;

        cache
            .put(id("abc"), result("https://new", 2), Duration::from_secs(10))
            .await;
        tokio::time::advance(Duration::from_secs(8)).await;

        let cached = cache.get(&id("abc")).await.unwrap();
        assert_eq!(cached.renditions()[0].url, "https://new");
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let cache = MemoryResolutionCache::new();
        let ttl = Duration::from_secs(60);
        cache.put(id("a"), result("https://a", 1), ttl).await;
        cache.put(id("b"), result("https://b", 1), ttl).await;
        assert_eq!(cache.stats().await.entries, 2);

        cache.invalidate(&id("a")).await;
        assert!(cache.get(&id("a")).await.is_none());
        assert!(cache.get(&id("b")).await.is_some());

        cache.clear().await;
        assert_eq!(cache.stats().await.entries, 0);
    }

    #[tokio::test]
    async fn test_noop_cache_never_hits() {
        let cache = NoopResolutionCache;
        cache
            .put(id("abc"), result("https://a", 1), Duration::from_secs(60))
            .await;
        assert!(cache.get(&id("abc")).await.is_none());
        assert_eq!(cache.stats().await, CacheStats::default());
    }
}
