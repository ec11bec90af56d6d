//! Extension pour intégrer le moteur de livraison dans audraserver

use crate::delivery::DeliveryEngine;
use crate::http::{create_cache_admin_router, create_stream_router, service_status};
use anyhow::Result;
use audraserver::Server;
use std::sync::Arc;
use tracing::info;

/// Trait d'extension pour ajouter les routes de streaming au serveur
pub trait StreamingExt {
    /// Enregistre les routes HTTP du moteur
    ///
    /// # Routes enregistrées
    ///
    /// - `GET /` - statut du service
    /// - `GET /stream/{track_id}?quality=best|medium|low` - audio ou redirection
    /// - `GET /api/resolution_cache` - nombre d'entrées du cache de résolution
    /// - `DELETE /api/resolution_cache/{track_id}` - invalide une entrée
    ///
    /// ```rust,ignore
    /// use audraserver::ServerBuilder;
    /// use audrastream::StreamingExt;
    ///
    /// let mut server = ServerBuilder::new_configured().build();
    /// server.init_streaming(engine).await?;
    /// server.start().await?;
    /// ```
    async fn init_streaming(&mut self, engine: Arc<DeliveryEngine>) -> Result<()>;
}

impl StreamingExt for Server {
    async fn init_streaming(&mut self, engine: Arc<DeliveryEngine>) -> Result<()> {
        self.add_route("/", || async { service_status() }).await;
        self.add_router("/", create_stream_router(engine.clone()))
            .await;
        self.add_router("/", create_cache_admin_router(engine)).await;

        info!("Streaming routes registered");
        Ok(())
    }
}
