//! Résolution d'une piste : cache de résolution puis backends amont

use audracache::ResolutionCache;
use audraresolver::{BackendPool, ResolutionResult, TrackId};
use std::sync::Arc;
use tracing::debug;

/// Chaîne cache → backends
///
/// Seuls les résultats non vides sont mis en cache, avec la durée de vie
/// annoncée par le backend qui les a produits. Une piste introuvable est donc
/// réinterrogée à chaque requête.
#[derive(Clone)]
pub struct StreamResolver {
    cache: Arc<dyn ResolutionCache>,
    pool: BackendPool,
}

impl StreamResolver {
    pub fn new(cache: Arc<dyn ResolutionCache>, pool: BackendPool) -> Self {
        Self { cache, pool }
    }

    pub fn cache(&self) -> &Arc<dyn ResolutionCache> {
        &self.cache
    }

    pub fn pool(&self) -> &BackendPool {
        &self.pool
    }

    /// Renditions de la piste, ou `None` si aucun backend n'en a trouvé
    pub async fn resolve(&self, track_id: &TrackId) -> Option<ResolutionResult> {
        if let Some(cached) = self.cache.get(track_id).await {
            debug!(track_id = %track_id, "Resolved from cache");
            return Some(cached);
        }

        let resolution = self.pool.resolve(track_id).await?;
        self.cache
            .put(track_id.clone(), resolution.result.clone(), resolution.ttl)
            .await;
        Some(resolution.result)
    }
}
